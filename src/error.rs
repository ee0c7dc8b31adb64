//! Error types for the paperdash server.

use thiserror::Error;

/// Top-level errors: configuration, rendering, and server startup.
///
/// Failures inside a refresh cycle never surface here. Those are recovered
/// at the narrowest applicable tier instead: a bad event instance is
/// skipped, a bad CalDAV source becomes a [`crate::SourceError`] shown as
/// one agenda line, a bad user keeps their previous snapshot.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file missing, unreadable, or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem or socket I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Headless Chrome could not produce a screenshot.
    #[error("render failed: {0}")]
    Render(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
