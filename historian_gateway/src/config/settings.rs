use crate::archive::ArchiveConfig;
use crate::drivers::address::parse_address;
use crate::drivers::resilient::RetryPolicy;
use crate::drivers::traits::PlcConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::health::HealthConfig;
use crate::history::HistoryConfig;
use crate::sampling::SamplingConfig;
use crate::tags::structures::{DataType, FieldType, TagDefinition};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides, e.g. `HISTORIAN__PLC__IP=10.0.0.5`.
pub const ENV_PREFIX: &str = "HISTORIAN";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TagConfig {
    pub name: String,            // Unique tag name used by sampling and history
    pub address: String,         // Controller address, e.g. "DB1.DBD4"
    pub field_type: FieldType,   // Wire type of the field
    #[serde(default = "default_count")]
    pub count: usize,            // Repetition count (string capacity for strings)
    #[serde(default = "default_connection")]
    pub connection: String,      // Must match `plc.name`
    #[serde(default)]
    pub tag_id: Option<i64>,     // Catalog id stored next to the name
    #[serde(default)]
    pub archive: Option<ArchiveConfig>, // No archive section = not archived
}

fn default_count() -> usize {
    1
}

fn default_connection() -> String {
    "plc1".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommunicationConfig {
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

fn default_max_retry_count() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_operation_timeout_ms() -> u64 {
    2000
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        CommunicationConfig {
            max_retry_count: default_max_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl CommunicationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retry_count: self.max_retry_count,
            retry_delay_ms: self.retry_delay_ms,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_diagnostics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_diagnostics_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        DiagnosticsConfig {
            enabled: default_diagnostics_enabled(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String, // Overridden by RUST_LOG when set
    pub plc: PlcConfig,
    #[serde(default)]
    pub communication: CommunicationConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub runtime: HealthConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)] // Make tags optional in the config file
    pub tags: Vec<TagConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load from a TOML file, then apply `HISTORIAN__SECTION__KEY` overrides.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(config_path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn save(&self, config_path: &Path) -> io::Result<()> {
        let toml_string = toml::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(config_path, toml_string)
    }

    /// Reject duplicate names, unparsable addresses and tags bound to an
    /// unknown connection.
    pub fn validate(&self) -> GatewayResult<()> {
        let mut seen = HashSet::new();
        for tag in &self.tags {
            if !seen.insert(tag.name.as_str()) {
                return Err(GatewayError::InvalidConfig(format!("duplicate tag name '{}'", tag.name)));
            }
            parse_address(&tag.address)?;
            if tag.connection != self.plc.name {
                return Err(GatewayError::InvalidConfig(format!(
                    "tag '{}' refers to unknown connection '{}'",
                    tag.name, tag.connection
                )));
            }
        }
        for name in &self.sampling.sampled_tags {
            if !seen.contains(name.as_str()) {
                return Err(GatewayError::TagNotFound(name.clone()));
            }
        }
        Ok(())
    }

    /// Finalized tag list handed to the channel.
    pub fn tag_definitions(&self) -> Vec<TagDefinition> {
        self.tags
            .iter()
            .map(|t| {
                let mut def = TagDefinition::new(&t.name, &t.address, t.field_type, t.count);
                def.connection = t.connection.clone();
                def
            })
            .collect()
    }

    /// Archive policies keyed by tag name. The tag's `tag_id` fills in a
    /// missing catalog id.
    pub fn archive_configs(&self) -> HashMap<String, ArchiveConfig> {
        self.tags
            .iter()
            .filter_map(|t| {
                let mut archive = t.archive.clone()?;
                if archive.tag_id.is_none() {
                    archive.tag_id = t.tag_id;
                }
                Some((t.name.clone(), archive))
            })
            .collect()
    }

    pub fn data_types(&self) -> HashMap<String, DataType> {
        self.tags
            .iter()
            .map(|t| (t.name.clone(), t.field_type.data_type()))
            .collect()
    }
}
