pub mod registry;
pub mod structures;

pub use registry::TagRegistry;
pub use structures::{DataType, FieldType, FromValue, Quality, TagDefinition, TagValue, ValueVariant};
