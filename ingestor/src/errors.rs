use thiserror::Error;

/// Store-level and startup failures. Absence of a device is not an error;
/// lookups report it as `None`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt metrics stored for device {device_id}: {reason}")]
    CorruptMetrics { device_id: String, reason: String },

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
