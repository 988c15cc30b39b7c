//! Track selection and output configuration.
//!
//! Policy: the first track (in the demuxer's enumeration order) whose MIME type starts with
//! `audio/` wins, even if more audio tracks follow. Its sample rate and channel count map 1:1
//! onto the sink configuration; PCM framing is always 16-bit and the sink streams.

use serde::Serialize;

use crate::backend::Backend;
use crate::demux::Demuxer;
use crate::error::{Error, Result};
use crate::format::TrackFormat;
use crate::opts::Opts;
use crate::sink::{SampleEncoding, SinkConfig, SinkMode, StreamType};

/// Fallback for containers that do not declare a maximum sample size.
pub const DEFAULT_MAX_INPUT_CHUNK_BYTES: usize = 64 * 1024;

/// The audio track a session plays.
#[derive(Debug, Clone, Serialize)]
pub struct TrackDescriptor {
    pub index: usize,
    pub mime: String,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub max_input_chunk_bytes: usize,

    #[serde(skip)]
    pub format: TrackFormat,
}

impl TrackDescriptor {
    fn from_format(index: usize, format: TrackFormat) -> Result<Self> {
        let sample_rate_hz = format
            .sample_rate
            .ok_or_else(|| Error::SinkConfigurationFailed {
                reason: format!("audio track {index} declares no sample rate"),
            })?;
        let channel_count = format
            .channel_count
            .ok_or_else(|| Error::SinkConfigurationFailed {
                reason: format!("audio track {index} declares no channel count"),
            })?;

        Ok(Self {
            index,
            mime: format.mime.clone(),
            sample_rate_hz,
            channel_count,
            max_input_chunk_bytes: format
                .max_input_size
                .unwrap_or(DEFAULT_MAX_INPUT_CHUNK_BYTES),
            format,
        })
    }

    /// Sink configuration derived from this track.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            stream_type: StreamType::Music,
            sample_rate_hz: self.sample_rate_hz,
            channel_count: self.channel_count,
            encoding: SampleEncoding::Pcm16Bit,
            buffer_size_bytes: self.max_input_chunk_bytes,
            mode: SinkMode::Streaming,
        }
    }
}

/// Select the first audio track on `demuxer` and describe it.
///
/// Exactly one track is marked active on the demuxer when this succeeds.
pub fn select_audio_track<D>(demuxer: &mut D) -> Result<TrackDescriptor>
where
    D: Demuxer + ?Sized,
{
    for index in 0..demuxer.track_count() {
        let format = demuxer.track_format(index)?;
        if !format.is_audio() {
            tracing::debug!(index, mime = %format.mime, "skipping non-audio track");
            continue;
        }

        let descriptor = TrackDescriptor::from_format(index, format)?;
        demuxer.select_track(index)?;

        tracing::info!(
            index,
            mime = %descriptor.mime,
            sample_rate_hz = descriptor.sample_rate_hz,
            channel_count = descriptor.channel_count,
            "selected audio track"
        );
        return Ok(descriptor);
    }

    Err(Error::NoAudioTrackFound)
}

/// Construct the sink for a selected track.
pub fn create_sink_for<B: Backend>(
    backend: &B,
    track: &TrackDescriptor,
    opts: &Opts,
) -> Result<B::Sink> {
    let config = track.sink_config();
    config.validate()?;
    backend.create_sink(&config, opts)
}
