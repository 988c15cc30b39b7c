//! Real-time rendering into a 16-bit PCM WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Context;
use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{Error, Result};
use crate::sink::{AudioSink, Pcm16Assembler, SinkConfig};

type Writer = WavWriter<BufWriter<File>>;

pub struct WavFileSink {
    path: PathBuf,
    channels: u16,
    sample_rate_hz: u32,
    writer: Option<Writer>,
    playing: bool,
    samples_written: u64,
    assembler: Pcm16Assembler,
    scratch: Vec<i16>,
}

impl WavFileSink {
    /// Create the output file for `config`. Nothing is rendered until `play`.
    pub fn create(path: impl Into<PathBuf>, config: &SinkConfig) -> Result<Self> {
        let path = path.into();
        let writer = open_writer(&path, config.sample_rate_hz, config.channel_count)
            .with_context(|| format!("cannot create {}", path.display()))
            .map_err(|e| Error::SinkConfigurationFailed {
                reason: format!("{e:#}"),
            })?;

        Ok(Self {
            path,
            channels: config.channel_count,
            sample_rate_hz: config.sample_rate_hz,
            writer: Some(writer),
            playing: false,
            samples_written: 0,
            assembler: Pcm16Assembler::default(),
            scratch: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }
}

impl AudioSink for WavFileSink {
    fn play(&mut self) -> Result<()> {
        if self.writer.is_none() {
            return Err(Error::sink("sink was released"));
        }
        self.playing = true;
        Ok(())
    }

    fn set_playback_rate(&mut self, sample_rate_hz: u32) -> Result<()> {
        if sample_rate_hz == self.sample_rate_hz {
            return Ok(());
        }
        if self.samples_written > 0 {
            tracing::warn!(
                current = self.sample_rate_hz,
                requested = sample_rate_hz,
                "wav output cannot change rate mid-file; keeping the current rate"
            );
            return Ok(());
        }

        // Finalize before reopening so the old writer does not rewrite the header afterwards.
        if let Some(old) = self.writer.take() {
            old.finalize()
                .context("failed finalizing before reopen")
                .map_err(Error::sink)?;
        }
        let writer = open_writer(&self.path, sample_rate_hz, self.channels)
            .with_context(|| format!("failed reopening {}", self.path.display()))
            .map_err(Error::sink)?;
        self.writer = Some(writer);
        self.sample_rate_hz = sample_rate_hz;
        tracing::debug!(sample_rate_hz, "wav output reopened");
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        if !self.playing {
            return Err(Error::sink("write before play"));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::sink("sink was released"))?;

        self.scratch.clear();
        self.assembler.push(pcm, &mut self.scratch);
        for sample in &self.scratch {
            writer.write_sample(*sample).map_err(Error::sink)?;
        }
        self.samples_written += self.scratch.len() as u64;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.playing = false;
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .finalize()
            .context("failed finalizing wav output")
            .map_err(Error::sink)?;
        tracing::debug!(
            path = %self.path.display(),
            samples = self.samples_written,
            "wav output finalized"
        );
        Ok(())
    }
}

fn open_writer(path: &Path, sample_rate: u32, channels: u16) -> hound::Result<Writer> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    WavWriter::create(path, spec)
}
