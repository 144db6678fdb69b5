use thiserror::Error;

/// Matched exactly: the lowercase `"context deadline exceeded"` wording must
/// not count, only the driver-internal spelling does.
pub const DEADLINE_MARKER: &str = "DeadlineExceeded";

/// Substrings that mark a failure as connection-level and worth one reconnect.
/// Matched ignoring case; OS socket errors come through as `Connection reset ...`.
pub const TRANSIENT_MARKERS: [&str; 5] = [
    "connection",
    "timeout",
    "network",
    "closed",
    "disconnected",
];

#[derive(Error, Debug)]
pub enum DbError {
    #[error("unable to connect to primary or secondary, primary: {primary}, secondary: {secondary}")]
    Connectivity { primary: String, secondary: String },

    #[error("database session is unavailable")]
    NotConnected,

    #[error("no documents in result")]
    NotFound,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Driver(#[from] mongodb::error::Error),

    #[error("{0}")]
    Operation(String),
}

impl DbError {
    pub fn operation(message: impl Into<String>) -> Self {
        DbError::Operation(message.into())
    }

    /// A "not found" outcome is a valid answer, not a failed operation.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound)
    }

    /// Coarse string match over the error text. False positives cost one
    /// extra round-trip; false negatives surface the original error.
    pub fn is_transient(&self) -> bool {
        is_transient_message(&self.to_string())
    }
}

pub fn is_transient_message(message: &str) -> bool {
    if message.contains(DEADLINE_MARKER) {
        return true;
    }
    let lowered = message.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

pub type Result<T> = std::result::Result<T, DbError>;
