//! Scripted scenarios against an in-memory canvas
//!
//! Each scenario seeds a [`MemoryHost`], drives a [`SyncEngine`] through a
//! sequence of selections and edits, and records named checks together with
//! the metadata left behind.

use annotate_core::config::{ANNOTATION_KEY, INDICATOR_KEY};
use annotate_core::prelude::*;
use annotate_core::{marker_bounds, SectionId};
use annotate_host::{CanvasObject, HostCallStats, MemoryHost, Rect, WidgetId};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Scenario names accepted by `run`
pub(crate) const NAMES: &[&str] = &["hello", "stale-switch", "oversize", "sections", "burst", "marker"];

const OWNER: &str = "alice";
const COLLABORATOR: &str = "bob";

/// One named expectation
#[derive(Debug, Clone, Serialize)]
pub(crate) struct Check {
    name: &'static str,
    passed: bool,
}

/// Outcome of one scenario
#[derive(Debug, Serialize)]
pub(crate) struct ScenarioReport {
    scenario: &'static str,
    checks: Vec<Check>,
    panel: PanelState,
    host: HostCallStats,
    metadata: BTreeMap<String, Value>,
}

impl ScenarioReport {
    pub(crate) fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub(crate) fn render_text(&self) -> String {
        let mut out = format!("scenario: {}\n", self.scenario);
        for check in &self.checks {
            let mark = if check.passed { "ok" } else { "FAIL" };
            out.push_str(&format!("  [{mark}] {}\n", check.name));
        }
        let stats = &self.host;
        out.push_str(&format!(
            "  host: {} reads, {} writes, {} markers created, {} moves, {} removed\n",
            stats.metadata_reads,
            stats.metadata_writes,
            stats.markers_created,
            stats.widget_moves,
            stats.widgets_removed
        ));
        for (object, namespace) in &self.metadata {
            let pretty = serde_json::to_string_pretty(namespace).unwrap_or_default();
            out.push_str(&format!("  metadata[{object}]:\n"));
            for line in pretty.lines() {
                out.push_str(&format!("    {line}\n"));
            }
        }
        out
    }
}

/// Run one scenario by name
pub(crate) async fn run(name: &str, config: &EngineConfig) -> anyhow::Result<ScenarioReport> {
    tracing::info!(scenario = name, "running scenario");
    match name {
        "hello" => Ok(hello(config).await),
        "stale-switch" => Ok(stale_switch(config).await),
        "oversize" => Ok(oversize(config).await),
        "sections" => sections(config).await,
        "burst" => Ok(burst(config).await),
        "marker" => marker(config).await,
        other => anyhow::bail!("unknown scenario `{other}` (known: {})", NAMES.join(", ")),
    }
}

struct Run {
    host: Arc<MemoryHost>,
    engine: Arc<SyncEngine<MemoryHost>>,
    namespace: String,
    objects: Vec<ObjectId>,
    checks: Vec<Check>,
}

impl Run {
    fn new(config: EngineConfig, ids: &[&str]) -> Self {
        let host = Arc::new(MemoryHost::with_user(OWNER));
        for id in ids {
            host.add_object(
                CanvasObject::new(*id, "sticky_note", Rect::new(100.0, 100.0, 200.0, 200.0))
                    .with_creator(OWNER)
                    .with_title(format!("Sticky {id}")),
            );
        }
        let namespace = config.namespace.clone();
        let engine = SyncEngine::new(Arc::clone(&host), config);
        Self {
            host,
            engine,
            namespace,
            objects: ids.iter().map(|id| ObjectId::new(*id)).collect(),
            checks: Vec::new(),
        }
    }

    fn check(&mut self, name: &'static str, passed: bool) {
        if passed {
            tracing::debug!(check = name, "check passed");
        } else {
            tracing::warn!(check = name, "check failed");
        }
        self.checks.push(Check { name, passed });
    }

    async fn settle_edits(&self) {
        tokio::time::sleep(self.engine.config().edit_debounce() + Duration::from_millis(50)).await;
    }

    async fn settle_selection(&self) {
        tokio::time::sleep(self.engine.config().selection_debounce() + Duration::from_millis(50)).await;
    }

    fn namespace_of(&self, id: &str) -> Option<Value> {
        self.host.peek_metadata(&ObjectId::new(id), &self.namespace)
    }

    fn stored_content(&self, id: &str) -> Option<String> {
        self.namespace_of(id)
            .and_then(|ns| ns.get(ANNOTATION_KEY)?.get("content")?.as_str().map(str::to_string))
    }

    fn stored_indicator(&self, id: &str) -> Option<WidgetId> {
        self.namespace_of(id)
            .and_then(|ns| ns.get(INDICATOR_KEY)?.as_str().map(WidgetId::new))
    }

    fn finish(self, scenario: &'static str) -> ScenarioReport {
        let metadata = self
            .objects
            .iter()
            .filter_map(|id| {
                self.host
                    .peek_metadata(id, &self.namespace)
                    .map(|ns| (id.to_string(), ns))
            })
            .collect();
        ScenarioReport {
            scenario,
            checks: self.checks,
            panel: self.engine.panel(),
            host: self.host.stats(),
            metadata,
        }
    }
}

async fn hello(config: &EngineConfig) -> ScenarioReport {
    let mut run = Run::new(config.clone().with_variant(AnnotationVariant::Single), &["x"]);
    let x = ObjectId::new("x");

    run.engine.apply_selection(&[x.clone()]).await;
    let staged = run.engine.edit_content("Hello").is_ok();
    run.check("owner edit accepted", staged);
    run.settle_edits().await;
    run.check("content persisted", run.stored_content("x").as_deref() == Some("Hello"));
    run.check("indicator recorded", run.stored_indicator("x").is_some());

    let reads = run.host.stats().metadata_reads;
    run.engine.apply_selection(&[]).await;
    run.engine.apply_selection(&[x.clone()]).await;
    run.check("reselect served from cache", run.host.stats().metadata_reads == reads);

    run.host.set_user(Some(COLLABORATOR.into()));
    run.engine.apply_selection(&[x.clone()]).await;
    let writes = run.host.stats().metadata_writes;
    let editor = run.engine.is_editor(&x).await;
    let rejected = matches!(run.engine.edit_content("Hijack"), Err(SyncError::NotEditor(_)));
    run.settle_edits().await;
    run.check("collaborator is not editor", !editor);
    run.check("collaborator write skipped", rejected && run.host.stats().metadata_writes == writes);

    run.finish("hello")
}

async fn stale_switch(config: &EngineConfig) -> ScenarioReport {
    let mut run = Run::new(config.clone().with_variant(AnnotationVariant::Single), &["a", "b"]);
    let (a, b) = (ObjectId::new("a"), ObjectId::new("b"));

    run.engine.apply_selection(&[a]).await;
    let staged = run.engine.edit_content("typed on A").is_ok();
    tokio::time::sleep(run.engine.config().edit_debounce() / 4).await;
    run.engine.apply_selection(&[b.clone()]).await;
    run.settle_edits().await;

    run.check("edit staged on A", staged);
    run.check("A left untouched", run.namespace_of("a").is_none());
    run.check("B loaded independently", run.engine.panel().active == Some(b));
    run.finish("stale-switch")
}

async fn oversize(config: &EngineConfig) -> ScenarioReport {
    let mut run = Run::new(config.clone().with_variant(AnnotationVariant::Single), &["x"]);
    let ceiling = run.engine.config().max_payload_bytes;

    run.engine.apply_selection(&[ObjectId::new("x")]).await;
    // Three bytes per char: over the ceiling with a third as many chars
    let _ = run.engine.edit_content("\u{20AC}".repeat(ceiling / 3 + 1));
    run.settle_edits().await;

    let panel = run.engine.panel();
    run.check("store unmodified", run.host.stats().metadata_writes == 0);
    run.check("save flagged unsaved", panel.save == SaveStatus::Unsaved);
    run.check("editing still enabled", panel.can_edit);
    run.check("size reported", panel.bytes_used > ceiling && panel.notice.is_some());
    run.finish("oversize")
}

async fn sections(config: &EngineConfig) -> anyhow::Result<ScenarioReport> {
    let mut run = Run::new(config.clone().with_variant(AnnotationVariant::Sections), &["x"]);
    let x = ObjectId::new("x");
    run.engine.apply_selection(&[x.clone()]).await;

    let general: SectionId = run
        .engine
        .panel()
        .record
        .as_ref()
        .and_then(|r| r.sections().map(|book| book.sections()[0].id.clone()))
        .ok_or_else(|| anyhow::anyhow!("sections record not loaded"))?;

    let note = run.engine.edit_sections(|book| {
        let ideas = book.add_section("Ideas")?;
        let later = book.add_section("Later")?;
        book.swap_sections(&ideas, &later)?;
        book.add_note(
            &general,
            NoteDraft {
                heading: "Headline".into(),
                body: "<p>Tighten the copy</p>".into(),
                item_id: x.clone(),
                item_name: "Sticky x".into(),
                item_type: "sticky_note".into(),
                author_id: None,
            },
        )
    })?;
    run.settle_edits().await;

    let orders: Vec<u32> = run
        .engine
        .load(&x)
        .await?
        .sections()
        .map(|book| book.sections().iter().map(|s| s.order).collect())
        .unwrap_or_default();
    run.check("section orders dense", orders == vec![0, 1, 2]);
    run.check("indicator created for note", run.stored_indicator("x").is_some());

    run.engine
        .edit_sections(|book| book.update_note(&note, " ", ""))?;
    run.settle_edits().await;
    run.check("indicator removed when cleared", run.stored_indicator("x").is_none());
    run.check("no widgets left", run.host.widget_count() == 0);

    Ok(run.finish("sections"))
}

async fn burst(config: &EngineConfig) -> ScenarioReport {
    let mut run = Run::new(config.clone(), &["a", "b", "c"]);
    let events = run.engine.spawn();

    run.host.select(&[ObjectId::new("a")]);
    run.host.select(&[ObjectId::new("a"), ObjectId::new("b")]);
    run.host.select(&[ObjectId::new("c")]);
    run.settle_selection().await;

    run.check("last selection wins", run.engine.panel().active == Some(ObjectId::new("c")));
    run.check("one metadata read", run.host.stats().metadata_reads == 1);
    events.abort();
    run.finish("burst")
}

async fn marker(config: &EngineConfig) -> anyhow::Result<ScenarioReport> {
    let mut run = Run::new(config.clone().with_variant(AnnotationVariant::Single), &["x"]);
    let x = ObjectId::new("x");

    run.engine.apply_selection(&[x.clone()]).await;
    run.engine.edit_content("pinned")?;
    run.settle_edits().await;

    for step in 1..=5 {
        run.host.move_object(&x, f64::from(step) * 20.0, 150.0)?;
        run.engine.on_geometry_change(&x);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(run.engine.config().reposition_throttle() * 2).await;

    let moves = run.host.stats().widget_moves;
    run.check("moves throttled", (1..5).contains(&moves));

    let expected = marker_bounds(&Rect::new(100.0, 150.0, 200.0, 200.0), &run.engine.config().marker);
    let placed = run
        .stored_indicator("x")
        .and_then(|w| run.host.peek_widget(&w))
        .map(|w| (w.bounds.x, w.bounds.y));
    run.check("marker follows object", placed == Some((expected.x, expected.y)));

    Ok(run.finish("marker"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn every_scenario_passes_with_defaults() {
        let config = EngineConfig::default();
        for name in NAMES {
            let report = run(name, &config).await.unwrap();
            assert!(report.passed(), "{}", report.render_text());
        }
    }

    #[tokio::test]
    async fn unknown_scenario_is_an_error() {
        assert!(run("nope", &EngineConfig::default()).await.is_err());
    }
}
