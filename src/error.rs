//! Error types for the localizer

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Localizer error types
///
/// Framing errors and aborted revolutions never show up here: they are normal
/// stream conditions and are only counted in the pipeline statistics.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected at construction, never at runtime
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Odometry input that cannot be integrated
    #[error("Invalid motion input: {0}")]
    InvalidMotion(String),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The byte source went away (as opposed to "no data yet")
    #[error("Transport disconnected")]
    Disconnected,

    #[error("Localizer lock poisoned")]
    LockPoisoned,
}
