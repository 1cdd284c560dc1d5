//! Engine configuration
//!
//! All windows, limits and geometry the engine uses. Every field has a
//! default so a partial TOML file is enough:
//!
//! ```toml
//! namespace = "annotate-app"
//! variant = "sections"
//!
//! [timing]
//! edit_debounce_ms = 400
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default metadata namespace on canvas objects
pub const DEFAULT_NAMESPACE: &str = "annotate-app";
/// Sub-key holding the annotation payload inside the namespace
pub const ANNOTATION_KEY: &str = "annotate";
/// Sibling key holding the indicator widget back-reference
pub const INDICATOR_KEY: &str = "indicatorWidgetId";
/// Schema tag written with every payload
pub const SCHEMA_VERSION: &str = "1.0.0";
/// Byte ceiling for the encoded payload
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 6144;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File that failed to read
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Which payload shape a fresh record uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationVariant {
    /// One rich-text body per object
    #[default]
    Single,
    /// Ordered sections of notes per object
    Sections,
}

/// Debounce and throttle windows, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet window before an edit is written
    pub edit_debounce_ms: u64,
    /// Quiet window before a selection burst is processed
    pub selection_debounce_ms: u64,
    /// Minimum spacing between marker moves for one object
    pub reposition_throttle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            edit_debounce_ms: 400,
            selection_debounce_ms: 150,
            reposition_throttle_ms: 100,
        }
    }
}

/// Marker placement relative to the bound object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerGeometry {
    /// Edge length of the square marker
    pub size: f64,
    /// Distance outward from the top-right corner, on both axes
    pub offset: f64,
    /// Glyph rendered inside the marker
    pub glyph: String,
}

impl Default for MarkerGeometry {
    fn default() -> Self {
        Self {
            size: 24.0,
            offset: 8.0,
            glyph: "\u{1F4DD}".to_string(),
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application namespace on canvas objects
    pub namespace: String,
    /// Schema tag stamped on written payloads
    pub schema_version: String,
    /// Byte ceiling for the encoded payload
    pub max_payload_bytes: usize,
    /// Shape of new records
    pub variant: AnnotationVariant,
    /// Timer windows
    pub timing: TimingConfig,
    /// Marker placement
    pub marker: MarkerGeometry,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// With payload ceiling
    #[inline]
    #[must_use]
    pub fn with_max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = bytes;
        self
    }

    /// With record variant
    #[inline]
    #[must_use]
    pub fn with_variant(mut self, variant: AnnotationVariant) -> Self {
        self.variant = variant;
        self
    }

    /// With timer windows
    #[inline]
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Edit debounce window
    #[inline]
    #[must_use]
    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.timing.edit_debounce_ms)
    }

    /// Selection debounce window
    #[inline]
    #[must_use]
    pub fn selection_debounce(&self) -> Duration {
        Duration::from_millis(self.timing.selection_debounce_ms)
    }

    /// Reposition throttle window
    #[inline]
    #[must_use]
    pub fn reposition_throttle(&self) -> Duration {
        Duration::from_millis(self.timing.reposition_throttle_ms)
    }

    /// Parse and validate from TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// out-of-range values
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a TOML file
    ///
    /// # Errors
    /// See [`EngineConfig::from_toml_str`]; also `ConfigError::Io`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "namespace",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_payload_bytes < 256 {
            return Err(ConfigError::Invalid {
                field: "max_payload_bytes",
                reason: format!("{} is below the 256 byte minimum", self.max_payload_bytes),
            });
        }
        let windows = [
            ("timing.edit_debounce_ms", self.timing.edit_debounce_ms),
            ("timing.selection_debounce_ms", self.timing.selection_debounce_ms),
            ("timing.reposition_throttle_ms", self.timing.reposition_throttle_ms),
        ];
        for (field, value) in windows {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "window must be non-zero".to_string(),
                });
            }
        }
        if self.marker.size <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "marker.size",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            variant: AnnotationVariant::default(),
            timing: TimingConfig::default(),
            marker: MarkerGeometry::default(),
        }
    }
}
