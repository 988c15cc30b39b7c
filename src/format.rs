//! Shared media descriptions passed across the collaborator boundary.

use std::fmt;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::CodecParameters;

/// MIME prefix that marks a track as audio.
pub const AUDIO_MIME_PREFIX: &str = "audio/";

/// Identifies the file or stream a session plays. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    location: String,
}

impl MediaSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Local filesystem path, if the location is a plain path or a `file://` URI.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.location.strip_prefix("file://") {
            return Some(PathBuf::from(rest));
        }
        if self.location.contains("://") {
            return None;
        }
        Some(PathBuf::from(&self.location))
    }

    /// File extension of the location, lower-cased (used as a probe hint).
    pub fn extension(&self) -> Option<String> {
        self.local_path()
            .as_deref()
            .and_then(Path::extension)
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

impl From<&str> for MediaSource {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

impl From<String> for MediaSource {
    fn from(location: String) -> Self {
        Self::new(location)
    }
}

impl From<&Path> for MediaSource {
    fn from(path: &Path) -> Self {
        Self::new(path.to_string_lossy().into_owned())
    }
}

/// Per-track metadata reported by a demuxer, and the format a codec is configured with.
///
/// Fields a container does not declare are `None`.
#[derive(Debug, Clone, Default)]
pub struct TrackFormat {
    pub mime: String,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub max_input_size: Option<usize>,
    pub duration_us: Option<u64>,

    /// Codec parameters for the symphonia-backed codec. Other backends leave this empty.
    pub codec_params: Option<CodecParameters>,
}

impl TrackFormat {
    pub fn audio(mime: impl Into<String>, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            mime: mime.into(),
            sample_rate: Some(sample_rate),
            channel_count: Some(channel_count),
            ..Self::default()
        }
    }

    pub fn with_max_input_size(mut self, bytes: usize) -> Self {
        self.max_input_size = Some(bytes);
        self
    }

    pub fn is_audio(&self) -> bool {
        self.mime.starts_with(AUDIO_MIME_PREFIX)
    }
}

/// Flags attached to a queued input chunk or a dequeued output chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    pub end_of_stream: bool,
}

impl BufferFlags {
    pub const NONE: Self = Self {
        end_of_stream: false,
    };

    pub const END_OF_STREAM: Self = Self {
        end_of_stream: true,
    };
}

/// Describes the valid region of a dequeued output slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}
