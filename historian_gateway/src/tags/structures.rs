use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the quality of a tag's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Quality {
    Good,
    Uncertain,
    #[default]
    Bad,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "Good",
            Quality::Uncertain => "Uncertain",
            Quality::Bad => "Bad",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Historian data types. Stored as a small integer next to each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool = 0,
    Int = 1,
    Float = 2,
    String = 3,
    Date = 4,
}

impl DataType {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }
}

/// Controller field types a tag can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[serde(alias = "bool")]
    Bit,
    Byte,
    Word,
    #[serde(alias = "int16")]
    Int,
    Dword,
    #[serde(alias = "int32")]
    Dint,
    #[serde(alias = "float32", alias = "float")]
    Real,
    #[serde(alias = "float64", alias = "double")]
    Lreal,
    String,
    Wstring,
    Date,
}

impl FieldType {
    /// Width in bytes of one element. Strings report their header size only.
    pub fn element_width(&self) -> usize {
        match self {
            FieldType::Bit | FieldType::Byte => 1,
            FieldType::Word | FieldType::Int | FieldType::Date => 2,
            FieldType::Dword | FieldType::Dint | FieldType::Real => 4,
            FieldType::Lreal => 8,
            FieldType::String => 2,
            FieldType::Wstring => 4,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            FieldType::Bit => DataType::Bool,
            FieldType::Byte
            | FieldType::Word
            | FieldType::Int
            | FieldType::Dword
            | FieldType::Dint => DataType::Int,
            FieldType::Real | FieldType::Lreal => DataType::Float,
            FieldType::String | FieldType::Wstring => DataType::String,
            FieldType::Date => DataType::Date,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Wstring)
    }
}

/// Possible data types for a tag's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueVariant {
    Null, // Failed read or no value yet
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<ValueVariant>), // Repetition count > 1
}

impl ValueVariant {
    pub fn is_null(&self) -> bool {
        matches!(self, ValueVariant::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ValueVariant::Int(i) => Some(*i as f64),
            ValueVariant::Float(f) => Some(*f),
            ValueVariant::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Text rendering used for string/date columns and diagnostics.
    pub fn to_text(&self) -> String {
        match self {
            ValueVariant::Null => String::new(),
            ValueVariant::Bool(b) => b.to_string(),
            ValueVariant::Int(i) => i.to_string(),
            ValueVariant::Float(f) => f.to_string(),
            ValueVariant::String(s) => s.clone(),
            ValueVariant::Date(d) => d.to_rfc3339(),
            ValueVariant::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_text()).collect();
                format!("[{}]", parts.join(","))
            }
        }
    }
}

/// Represents the value, quality, and timestamp of a tag read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagValue {
    pub value: ValueVariant,
    pub quality: Quality,
    pub timestamp: DateTime<Utc>,
}

impl TagValue {
    pub fn new(value: ValueVariant, quality: Quality) -> Self {
        TagValue {
            value,
            quality,
            timestamp: Utc::now(),
        }
    }

    pub fn good(value: ValueVariant) -> Self {
        Self::new(value, Quality::Good)
    }

    // Helper for bad quality
    pub fn bad() -> Self {
        Self::new(ValueVariant::Null, Quality::Bad)
    }
}

/// Static definition of a controller tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    /// Unique tag name (e.g. "Line1/Temperature").
    pub name: String,
    /// Controller location, e.g. "DB1.DBD4" or "DB1.DBX0.3".
    pub address: String,
    pub field_type: FieldType,
    /// Element count, or character capacity for strings.
    #[serde(default = "default_count")]
    pub count: usize,
    /// Name of the connection this tag is read through.
    #[serde(default)]
    pub connection: String,
}

fn default_count() -> usize {
    1
}

impl TagDefinition {
    pub fn new(name: &str, address: &str, field_type: FieldType, count: usize) -> Self {
        TagDefinition {
            name: name.to_string(),
            address: address.to_string(),
            field_type,
            count: count.max(1),
            connection: String::new(),
        }
    }
}

/// Conversion out of a dynamically typed read result.
pub trait FromValue: Sized {
    fn from_value(value: ValueVariant) -> Option<Self>;
}

impl FromValue for ValueVariant {
    fn from_value(value: ValueVariant) -> Option<Self> {
        Some(value)
    }
}

impl FromValue for bool {
    fn from_value(value: ValueVariant) -> Option<Self> {
        match value {
            ValueVariant::Bool(b) => Some(b),
            ValueVariant::Int(i) => Some(i != 0),
            _ => None,
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: ValueVariant) -> Option<Self> {
        value.as_f64()
    }
}

impl FromValue for f32 {
    fn from_value(value: ValueVariant) -> Option<Self> {
        value.as_f64().map(|f| f as f32)
    }
}

impl FromValue for String {
    fn from_value(value: ValueVariant) -> Option<Self> {
        match value {
            ValueVariant::Null => None,
            other => Some(other.to_text()),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: ValueVariant) -> Option<Self> {
        match value {
            ValueVariant::Date(d) => Some(d),
            _ => None,
        }
    }
}

macro_rules! int_from_value {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(value: ValueVariant) -> Option<Self> {
                    match value {
                        ValueVariant::Int(i) => <$t>::try_from(i).ok(),
                        ValueVariant::Bool(b) => Some(b as $t),
                        _ => None,
                    }
                }
            }
        )*
    };
}

int_from_value!(u8, u16, u32, i16, i32, i64);
