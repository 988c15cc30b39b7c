//! Audio sink collaborator interface and its configuration.

use serde::Serialize;

use crate::error::{Error, Result};

/// Lowest and highest sample rates a sink accepts.
pub const MIN_SAMPLE_RATE_HZ: u32 = 4_000;
pub const MAX_SAMPLE_RATE_HZ: u32 = 192_000;

/// Most channels a sink accepts.
pub const MAX_CHANNELS: u16 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum StreamType {
    #[default]
    Music,
    Voice,
    Notification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SampleEncoding {
    /// Interleaved signed 16-bit little-endian PCM.
    #[default]
    Pcm16Bit,
}

impl SampleEncoding {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::Pcm16Bit => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SinkMode {
    /// PCM arrives incrementally through `write`.
    #[default]
    Streaming,
    /// The whole clip is written once before playback.
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkConfig {
    pub stream_type: StreamType,
    pub sample_rate_hz: u32,
    pub channel_count: u16,
    pub encoding: SampleEncoding,
    pub buffer_size_bytes: usize,
    pub mode: SinkMode,
}

impl SinkConfig {
    /// Reject sample-rate/channel/buffer combinations no sink can honor.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| Err(Error::SinkConfigurationFailed { reason });

        if !(MIN_SAMPLE_RATE_HZ..=MAX_SAMPLE_RATE_HZ).contains(&self.sample_rate_hz) {
            return fail(format!(
                "sample rate {} Hz outside {MIN_SAMPLE_RATE_HZ}..={MAX_SAMPLE_RATE_HZ}",
                self.sample_rate_hz
            ));
        }
        if self.channel_count == 0 || self.channel_count > MAX_CHANNELS {
            return fail(format!(
                "channel count {} outside 1..={MAX_CHANNELS}",
                self.channel_count
            ));
        }
        if self.buffer_size_bytes == 0 {
            return fail("buffer size must be non-zero".to_string());
        }
        if self.buffer_size_bytes % self.bytes_per_frame() != 0 {
            tracing::debug!(
                buffer_size_bytes = self.buffer_size_bytes,
                frame = self.bytes_per_frame(),
                "sink buffer is not a whole number of frames"
            );
        }
        Ok(())
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channel_count as usize
    }

    /// Bytes needed to hold `ms` milliseconds of audio.
    pub fn bytes_for_millis(&self, ms: u64) -> usize {
        let frames = self.sample_rate_hz as u64 * ms / 1000;
        frames as usize * self.bytes_per_frame()
    }
}

/// Renders PCM in real time.
pub trait AudioSink: Send {
    /// Begin playback.
    fn play(&mut self) -> Result<()>;

    /// Reconfigure the rate PCM is rendered at.
    fn set_playback_rate(&mut self, sample_rate_hz: u32) -> Result<()>;

    /// Write PCM bytes. Blocks until all of `pcm` has been accepted.
    fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Release the sink. Called exactly once, during teardown.
    fn release(&mut self) -> Result<()>;
}

/// Reassembles little-endian `i16` samples from a byte stream that may split samples across
/// writes.
#[derive(Debug, Default)]
pub(crate) struct Pcm16Assembler {
    carry: Option<u8>,
}

impl Pcm16Assembler {
    pub(crate) fn push(&mut self, bytes: &[u8], out: &mut Vec<i16>) {
        let mut rest = bytes;
        if let Some(lo) = self.carry.take() {
            match rest.split_first() {
                Some((hi, tail)) => {
                    out.push(i16::from_le_bytes([lo, *hi]));
                    rest = tail;
                }
                None => {
                    self.carry = Some(lo);
                    return;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        out.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
        self.carry = pairs.remainder().first().copied();
    }
}
