//! Container demuxing on top of symphonia's format readers.
//!
//! Exposes the reader as an extractor-style cursor: after `select_track` the demuxer holds the
//! selected track's first packet as the "current sample"; `advance` replaces it with the next
//! packet of that track. Packets of other tracks are skipped.

use std::fs::File;

use anyhow::{Context, anyhow};
use symphonia::core::codecs::CodecParameters;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;

use super::mime::mime_for_codec;
use crate::demux::Demuxer;
use crate::error::{Error, Result};
use crate::format::{MediaSource, TrackFormat};
use crate::track::DEFAULT_MAX_INPUT_CHUNK_BYTES;

/// Room for frame and subframe headers plus checksums on top of an uncompressed block.
///
/// FLAC verbatim frames and ALAC escape frames carry the raw samples and this overhead.
const FRAME_OVERHEAD_BYTES: usize = 1024;

pub struct SymphoniaDemuxer {
    reader: Option<Box<dyn FormatReader>>,
    tracks: Vec<TrackEntry>,
    selected: Option<usize>,
    current: Option<Packet>,
}

struct TrackEntry {
    id: u32,
    time_base: Option<TimeBase>,
    format: TrackFormat,
}

impl SymphoniaDemuxer {
    /// Probe a local file.
    ///
    /// `hint_extension` can improve probe accuracy for ambiguous inputs (e.g. "m4a", "ogg").
    pub fn open(source: &MediaSource, hint_extension: Option<&str>) -> Result<Self> {
        let unavailable = |reason: String| Error::SourceUnavailable {
            source_id: source.to_string(),
            reason,
        };

        let path = source
            .local_path()
            .ok_or_else(|| unavailable("only local files can be opened".to_string()))?;
        let file = File::open(&path).map_err(|e| unavailable(e.to_string()))?;

        let mss = MediaSourceStream::new(
            Box::new(file),
            MediaSourceStreamOptions {
                // Symphonia expects a power-of-two buffer > 32KiB for good probing behavior.
                buffer_len: 256 * 1024,
            },
        );

        let mut hint = Hint::new();
        if let Some(ext) = hint_extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| anyhow!(e))
            .context("failed to probe media stream")
            .map_err(|e| unavailable(format!("{e:#}")))?;

        let tracks: Vec<TrackEntry> = probed
            .format
            .tracks()
            .iter()
            .map(|track| TrackEntry {
                id: track.id,
                time_base: track.codec_params.time_base,
                format: track_format(&track.codec_params),
            })
            .collect();

        tracing::debug!(source = %source, tracks = tracks.len(), "container probed");

        Ok(Self {
            reader: Some(probed.format),
            tracks,
            selected: None,
            current: None,
        })
    }

    fn load_next_packet(&mut self) -> anyhow::Result<()> {
        self.current = None;
        let Some(track) = self.selected.map(|i| &self.tracks[i]) else {
            return Ok(());
        };
        let track_id = track.id;
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        loop {
            match reader.next_packet() {
                Ok(packet) if packet.track_id() == track_id => {
                    self.current = Some(packet);
                    return Ok(());
                }
                Ok(_) => continue,
                // IO errors end the stream.
                Err(SymphoniaError::IoError(_)) => return Ok(()),
                Err(SymphoniaError::ResetRequired) => {
                    return Err(anyhow!("container requires a decoder reset mid-stream"));
                }
                Err(e) => return Err(anyhow!(e)).context("failed reading packet"),
            }
        }
    }
}

impl Demuxer for SymphoniaDemuxer {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<TrackFormat> {
        self.tracks
            .get(index)
            .map(|t| t.format.clone())
            .ok_or_else(|| Error::msg(format!("track {index} does not exist")))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        if index >= self.tracks.len() {
            return Err(Error::msg(format!("track {index} does not exist")));
        }
        self.selected = Some(index);
        self.load_next_packet()
            .with_context(|| format!("failed loading the first sample of track {index}"))?;
        Ok(())
    }

    fn read_sample_data(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(packet) = self.current.as_ref() else {
            return Ok(None);
        };

        let data = packet.buf();
        let buf_len = buf.len();
        let dst = buf.get_mut(..data.len()).ok_or_else(|| {
            Error::msg(format!(
                "sample of {} bytes does not fit a {} byte input slot",
                data.len(),
                buf_len
            ))
        })?;
        dst.copy_from_slice(data);
        Ok(Some(data.len()))
    }

    fn sample_time_us(&self) -> Option<i64> {
        let packet = self.current.as_ref()?;
        let track = &self.tracks[self.selected?];
        Some(ts_to_micros(
            packet.ts(),
            track.time_base,
            track.format.sample_rate,
        ))
    }

    fn advance(&mut self) -> Result<bool> {
        self.load_next_packet()?;
        Ok(self.current.is_some())
    }

    fn release(&mut self) -> Result<()> {
        self.current = None;
        self.reader = None;
        Ok(())
    }
}

fn track_format(params: &CodecParameters) -> TrackFormat {
    let channel_count = params.channels.map(|c| c.count() as u16);

    // An uncompressed block is a lower bound only; some frames store it verbatim plus framing.
    let max_input_size = match (params.max_frames_per_packet, params.bits_per_sample) {
        (Some(frames), Some(bits)) => {
            let channels = channel_count.unwrap_or(1) as u64;
            let block = (frames * channels * bits.div_ceil(8) as u64) as usize;
            Some((block + FRAME_OVERHEAD_BYTES).max(DEFAULT_MAX_INPUT_CHUNK_BYTES))
        }
        _ => None,
    };

    let duration_us = params.n_frames.map(|frames| {
        ts_to_micros(frames, params.time_base, params.sample_rate).max(0) as u64
    });

    TrackFormat {
        mime: mime_for_codec(params.codec).to_string(),
        sample_rate: params.sample_rate,
        channel_count,
        max_input_size,
        duration_us,
        codec_params: Some(params.clone()),
    }
}

/// Convert a timestamp in track time-base units to microseconds.
fn ts_to_micros(ts: u64, time_base: Option<TimeBase>, sample_rate: Option<u32>) -> i64 {
    match (time_base, sample_rate) {
        (Some(tb), _) => {
            let t = tb.calc_time(ts);
            (t.seconds as i64) * 1_000_000 + (t.frac * 1_000_000.0).round() as i64
        }
        (None, Some(rate)) if rate > 0 => (ts as i128 * 1_000_000 / rate as i128) as i64,
        _ => ts as i64,
    }
}
