//! Configuration loading using Figment
//!
//! Configuration is layered:
//! 1. `config/ringfilter.toml` (or a file given on the command line)
//! 2. Environment variables prefixed with `RINGFILTER_`, sections separated
//!    by a double underscore (`RINGFILTER_PIPELINE__SKIP=100`)
//! 3. Command-line flags, applied by the binary on top of the loaded value
//!
//! Every field has a default, so a missing file yields a usable
//! configuration that copies standard input to standard output.
//!
//! # Example
//! ```no_run
//! use ringfilter::config::RingFilterConfig;
//!
//! let config = RingFilterConfig::load()?;
//! config.validate()?;
//! println!("reading {}", config.pipeline.source);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::record::{FormatVersion, RecordKind};
use crate::transport::Endpoint;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/ringfilter.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingFilterConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Filter pipeline settings
    pub pipeline: PipelineConfig,
    /// Fragment decomposition settings
    pub unglom: UnglomSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Filter pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source URI (`-`, `file:///path` or a bare path)
    pub source: String,
    /// Sink URI
    pub sink: String,
    /// Wire generation of the stream
    pub format: FormatVersion,
    /// Records to skip before processing starts
    pub skip: u64,
    /// Records to process after skipping (0 = unlimited)
    pub count: u64,
    /// Stop after one run ended by this many sources
    pub one_shot_sources: Option<usize>,
    /// Kind names dropped before the filter chain
    pub exclude: Vec<String>,
    /// Optional sampling of selected kinds
    pub sample: Option<SampleConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: default_endpoint(),
            sink: default_endpoint(),
            format: FormatVersion::default(),
            skip: 0,
            count: 0,
            one_shot_sources: None,
            exclude: Vec::new(),
            sample: None,
        }
    }
}

/// Keep one record in `every` for the listed kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Kind names to sample
    pub kinds: Vec<String>,
    /// Sampling period
    #[serde(default = "default_sample_every")]
    pub every: u64,
}

/// Fragment decomposition configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnglomSettings {
    /// Source id for records without a body header
    pub default_source_id: u32,
    /// Split event-built physics events into their fragments
    pub split_built_events: bool,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_endpoint() -> String {
    "-".to_string()
}

fn default_sample_every() -> u64 {
    1
}

impl RingFilterConfig {
    /// Load configuration from `config/ringfilter.toml` and environment variables
    ///
    /// Environment variables override file values with prefix RINGFILTER_
    /// Example: RINGFILTER_APPLICATION__LOG_LEVEL=debug
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    /// The layered provider, for callers that want to merge more sources
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(RingFilterConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RINGFILTER_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        // Validate endpoints
        for (role, uri) in [
            ("source", &self.pipeline.source),
            ("sink", &self.pipeline.sink),
        ] {
            Endpoint::parse(uri).map_err(|e| format!("Invalid {} URI: {}", role, e))?;
        }

        if self.pipeline.one_shot_sources == Some(0) {
            return Err("one_shot_sources must be at least 1".to_string());
        }

        self.exclude_kinds()?;
        if let Some(sample) = &self.pipeline.sample {
            if sample.every == 0 {
                return Err("sample.every must be at least 1".to_string());
            }
            parse_kinds(&sample.kinds)?;
        }

        Ok(())
    }

    /// Parsed exclusion list
    pub fn exclude_kinds(&self) -> Result<Vec<RecordKind>, String> {
        parse_kinds(&self.pipeline.exclude)
    }

    /// Parsed sampling settings, if sampling is configured
    pub fn sample_kinds(&self) -> Result<Option<(Vec<RecordKind>, u64)>, String> {
        self.pipeline
            .sample
            .as_ref()
            .map(|sample| Ok((parse_kinds(&sample.kinds)?, sample.every)))
            .transpose()
    }

    /// Render the effective configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn parse_kinds(names: &[String]) -> Result<Vec<RecordKind>, String> {
    names
        .iter()
        .map(|name| name.trim().parse::<RecordKind>())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RingFilterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.source, "-");
        assert_eq!(config.pipeline.format, FormatVersion::V11);
        assert_eq!(config.pipeline.count, 0);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = RingFilterConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ring_uri_rejected() {
        let mut config = RingFilterConfig::default();
        config.pipeline.source = "tcp://localhost/fox".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("source"));
    }

    #[test]
    fn test_unknown_kind_name_rejected() {
        let mut config = RingFilterConfig::default();
        config.pipeline.exclude = vec!["SCALERZ".to_string()];
        assert!(config.validate().is_err());

        config.pipeline.exclude = vec!["PERIODIC_SCALERS".to_string(), "12".to_string()];
        assert_eq!(
            config.exclude_kinds().unwrap(),
            vec![RecordKind::Scaler, RecordKind::DataFormat]
        );
    }

    #[test]
    fn test_zero_one_shot_sources_rejected() {
        let mut config = RingFilterConfig::default();
        config.pipeline.one_shot_sources = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_rendering_parses_back() {
        let mut config = RingFilterConfig::default();
        config.pipeline.skip = 10;
        config.pipeline.sample = Some(SampleConfig {
            kinds: vec!["PHYSICS_EVENT".to_string()],
            every: 4,
        });
        let text = config.to_toml_string().unwrap();
        let back: RingFilterConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
