//! Archive decision engine: decides which samples are worth persisting.

use crate::history::SamplePoint;
use crate::tags::structures::{DataType, Quality, ValueVariant};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ArchiveMode {
    /// Write every sample.
    Always,
    /// Write only when the value changes.
    #[default]
    ChangeOnly,
    /// Write when a numeric value moves by at least the deadband.
    Deadband,
}

/// Per-tag archive policy, owned by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub mode: ArchiveMode,
    /// Absolute deadband, e.g. 0.5.
    #[serde(default)]
    pub deadband_abs: Option<f64>,
    /// Relative deadband as a fraction of the last value, e.g. 0.01 = 1%.
    #[serde(default)]
    pub deadband_percent: Option<f64>,
    /// Catalog id written alongside the tag name.
    #[serde(default)]
    pub tag_id: Option<i64>,
}

impl ArchiveConfig {
    pub fn always() -> Self {
        ArchiveConfig {
            mode: ArchiveMode::Always,
            ..Default::default()
        }
    }

    pub fn change_only() -> Self {
        ArchiveConfig::default()
    }

    pub fn deadband(abs: f64, percent: f64) -> Self {
        ArchiveConfig {
            mode: ArchiveMode::Deadband,
            deadband_abs: Some(abs),
            deadband_percent: Some(percent),
            tag_id: None,
        }
    }
}

/// Last archived value of one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveState {
    pub data_type: DataType,
    pub last_value: ValueVariant,
}

/// Stateful per-tag filter. The cache is only touched for accepted samples
/// (and on first observation).
#[derive(Debug, Default)]
pub struct ArchiveEngine {
    last: DashMap<String, ArchiveState>,
}

impl ArchiveEngine {
    pub fn new() -> Self {
        ArchiveEngine {
            last: DashMap::new(),
        }
    }

    /// Decide whether `value` is archived and update the cache if so.
    pub fn should_write(&self, tag: &str, data_type: DataType, config: &ArchiveConfig, value: &ValueVariant) -> bool {
        let accept = |state: Option<&ArchiveState>| -> bool {
            let Some(state) = state else {
                return true; // first observation
            };
            match config.mode {
                ArchiveMode::Always => true,
                ArchiveMode::ChangeOnly => changed(&state.last_value, value),
                ArchiveMode::Deadband if data_type.is_numeric() => {
                    match (state.last_value.as_f64(), value.as_f64()) {
                        (Some(last), Some(new)) => exceeds_deadband(last, new, config),
                        // Nothing numeric to compare against
                        _ => changed(&state.last_value, value),
                    }
                }
                ArchiveMode::Deadband => changed(&state.last_value, value),
            }
        };

        let state = || ArchiveState {
            data_type,
            last_value: value.clone(),
        };
        // The entry guard keeps decide-and-update atomic per tag.
        match self.last.entry(tag.to_string()) {
            Entry::Occupied(mut o) => {
                if accept(Some(o.get())) {
                    o.insert(state());
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(v) => {
                v.insert(state());
                accept(None)
            }
        }
    }

    /// Turn one tick's read results into the samples worth writing, in tag
    /// name order. Failed reads and tags without an archive config are skipped.
    pub fn filter(
        &self,
        results: &BTreeMap<String, Option<ValueVariant>>,
        data_types: &HashMap<String, DataType>,
        configs: &HashMap<String, ArchiveConfig>,
        timestamp: DateTime<Utc>,
    ) -> Vec<SamplePoint> {
        let mut accepted = Vec::new();
        for (name, value) in results {
            let (Some(value), Some(config), Some(data_type)) = (value, configs.get(name), data_types.get(name)) else {
                continue;
            };
            if self.should_write(name, *data_type, config, value) {
                accepted.push(SamplePoint::new(
                    timestamp,
                    name,
                    config.tag_id,
                    *data_type,
                    value,
                    Quality::Good,
                ));
            }
        }
        debug!("Archive filter accepted {}/{} samples", accepted.len(), results.len());
        accepted
    }

    /// Diagnostic copy of a tag's cached state.
    pub fn state(&self, tag: &str) -> Option<ArchiveState> {
        self.last.get(tag).map(|s| s.value().clone())
    }

    /// Drop cached state, e.g. when a tag is removed.
    pub fn forget(&self, tag: &str) -> bool {
        self.last.remove(tag).is_some()
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

fn changed(last: &ValueVariant, new: &ValueVariant) -> bool {
    last != new
}

fn exceeds_deadband(last: f64, new: f64, config: &ArchiveConfig) -> bool {
    let diff = (new - last).abs();
    let abs = config.deadband_abs.unwrap_or(0.0);
    let pct = config.deadband_percent.unwrap_or(0.0) * last.abs();
    diff >= abs.max(pct)
}
