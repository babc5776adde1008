use thiserror::Error;

/// Errors surfaced by the acquisition and history pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// No tag with this name is registered on the channel.
    #[error("tag '{0}' not found")]
    TagNotFound(String),

    /// The tag address could not be parsed into a controller location.
    #[error("invalid address '{address}': {reason}")]
    AddressParse { address: String, reason: String },

    /// Protocol round-trip failed (timeout, disconnect, malformed response).
    #[error("transport error: {0}")]
    Transport(String),

    /// The link is not open and could not be opened.
    #[error("not connected")]
    NotConnected,

    /// A buffer was shorter than the declared field width.
    #[error("buffer too short: needed {needed} bytes, got {available}")]
    Encoding { needed: usize, available: usize },

    /// A value could not be coerced into the tag's field type.
    #[error("cannot convert value for tag '{tag}': {reason}")]
    Conversion { tag: String, reason: String },

    /// Settings are inconsistent (duplicate names, unknown connection).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The history store is unavailable or rejected the statement.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl GatewayError {
    pub fn address(address: &str, reason: impl Into<String>) -> Self {
        GatewayError::AddressParse {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Transport failures are the only ones worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transport(_) | GatewayError::NotConnected)
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Persistence(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
