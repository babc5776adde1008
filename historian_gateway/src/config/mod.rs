pub mod settings;

pub use settings::{CommunicationConfig, DiagnosticsConfig, Settings, TagConfig};
