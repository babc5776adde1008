//! Sample queueing and batched persistence to the historian store.

pub mod queue;
pub mod store;
pub mod writer;

use crate::tags::structures::{DataType, Quality, ValueVariant};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use queue::{OverflowPolicy, SampleQueue};
pub use store::{HistoryStore, NullHistoryStore, SqliteHistoryStore, StoredSample};
pub use writer::{HistoryConfig, HistoryWriter};

/// One row waiting to be written. At most one value column is set, chosen by
/// `data_type`; array values of numeric tags are carried as text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplePoint {
    pub utc: DateTime<Utc>,
    pub tag: String,
    pub tag_id: Option<i64>,
    pub data_type: DataType,
    pub value_numeric: Option<f64>,
    pub value_text: Option<String>,
    pub value_bool: Option<bool>,
    pub quality: Quality,
}

impl SamplePoint {
    pub fn new(
        utc: DateTime<Utc>,
        tag: &str,
        tag_id: Option<i64>,
        data_type: DataType,
        value: &ValueVariant,
        quality: Quality,
    ) -> Self {
        let mut point = SamplePoint {
            utc,
            tag: tag.to_string(),
            tag_id,
            data_type,
            value_numeric: None,
            value_text: None,
            value_bool: None,
            quality,
        };
        if value.is_null() {
            return point;
        }
        match data_type {
            DataType::Bool => {
                point.value_bool = match value {
                    ValueVariant::Bool(b) => Some(*b),
                    other => other.as_f64().map(|f| f != 0.0),
                }
            }
            DataType::Int | DataType::Float => match value.as_f64() {
                Some(f) => point.value_numeric = Some(f),
                // Arrays and other composites are kept as text
                None => point.value_text = Some(value.to_text()),
            },
            DataType::String | DataType::Date => point.value_text = Some(value.to_text()),
        }
        point
    }
}
