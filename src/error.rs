use std::error::Error as StdError;

use thiserror::Error;

use crate::state::PlaybackState;

/// Playout's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Playout's crate-wide error type.
///
/// The first four variants are the fatal setup failures `Player::play` can report. Everything
/// after decoding started is fatal for the session but still goes through teardown first.
///
/// This is intentionally decoupled from `anyhow` so downstream libraries aren't forced to
/// adopt `anyhow` in their own public APIs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    #[error("no audio track found")]
    NoAudioTrackFound,

    #[error("no decoder available for track format '{mime}'")]
    UnsupportedTrackFormat { mime: String },

    #[error("sink configuration failed: {reason}")]
    SinkConfigurationFailed { reason: String },

    #[error("invalid playback state transition {from:?} -> {to:?}")]
    InvalidState {
        from: PlaybackState,
        to: PlaybackState,
    },

    #[error("buffer slot misuse: {0}")]
    SlotDiscipline(String),

    #[error("decoder failure: {0}")]
    Decoder(String),

    #[error("sink failure: {0}")]
    Sink(String),

    #[error("teardown failed: {}", .0.join("; "))]
    Teardown(Vec<String>),

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn decoder(err: impl std::fmt::Display) -> Self {
        Self::Decoder(format!("{err:#}"))
    }

    pub(crate) fn sink(err: impl std::fmt::Display) -> Self {
        Self::Sink(format!("{err:#}"))
    }

    /// Whether this error aborts `play()` before any decoding starts.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. }
                | Self::NoAudioTrackFound
                | Self::UnsupportedTrackFormat { .. }
                | Self::SinkConfigurationFailed { .. }
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
