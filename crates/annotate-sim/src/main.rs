//! Annotation sync simulator
//!
//! Drives the sync engine against an in-memory canvas with scripted
//! scenarios and prints what ended up in object metadata.
//!
//! ## Usage
//!
//! ```bash
//! # Run every scenario
//! annotate-sim run all
//!
//! # One scenario, JSON output, custom config
//! annotate-sim --config annotate.toml run hello --json
//!
//! # Print the effective configuration
//! annotate-sim config
//! ```

mod scenarios;

use annotate_core::EngineConfig;
use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    let mut names = vec!["all"];
    names.extend_from_slice(scenarios::NAMES);

    Command::new("annotate-sim")
        .version(annotate_core::VERSION)
        .about("Scripted scenarios for the annotation sync engine")
        .arg(
            Arg::new("config")
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("TOML engine configuration"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Debug logging unless RUST_LOG is set"),
        )
        .subcommand(
            Command::new("run")
                .about("Run a scenario")
                .arg(
                    Arg::new("scenario")
                        .default_value("all")
                        .value_parser(PossibleValuesParser::new(names))
                        .help("Scenario to run"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(Command::new("list").about("List scenarios"))
        .subcommand(Command::new("config").about("Print the effective configuration"))
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate().context("validating config")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"));
    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    match matches.subcommand() {
        Some(("run", args)) => {
            let json = args.get_flag("json");
            let selected = args
                .get_one::<String>("scenario")
                .map_or("all", String::as_str);
            let names: Vec<&str> = if selected == "all" {
                scenarios::NAMES.to_vec()
            } else {
                vec![selected]
            };

            let mut reports = Vec::with_capacity(names.len());
            for name in names {
                reports.push(scenarios::run(name, &config).await?);
            }
            let passed = reports.iter().all(scenarios::ScenarioReport::passed);

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    print!("{}", report.render_text());
                }
                println!("{}", if passed { "PASSED" } else { "FAILED" });
            }
            std::process::exit(if passed { 0 } else { 1 });
        }
        Some(("list", _)) => {
            for name in scenarios::NAMES {
                println!("{name}");
            }
        }
        Some(("config", _)) => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        _ => {
            cli().print_help()?;
            println!();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn run_defaults_to_all() {
        let matches = cli().try_get_matches_from(["annotate-sim", "run"]).unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<String>("scenario").map(String::as_str), Some("all"));
    }

    #[test]
    fn unknown_scenario_rejected_by_parser() {
        assert!(cli().try_get_matches_from(["annotate-sim", "run", "nope"]).is_err());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(&PathBuf::from("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("loading config"));
    }
}
