pub mod diagnostics;

pub use diagnostics::{create_diagnostics_routes, DiagnosticsState};
