//! Built-in backends.
//!
//! Both decode with symphonia; they differ in where the PCM goes.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::backend::Backend;
use crate::format::MediaSource;
use crate::opts::Opts;
use crate::sink::SinkConfig;

/// Symphonia demuxing and decoding.
pub mod symphonia;

/// 16-bit PCM WAV file output.
pub mod wav_sink;

/// Audio device output.
#[cfg(feature = "device-output")]
pub mod cpal_sink;

use self::symphonia::{SymphoniaCodec, SymphoniaDemuxer};
use self::wav_sink::WavFileSink;

fn open_symphonia(source: &MediaSource, opts: &Opts) -> Result<SymphoniaDemuxer> {
    let hint = opts.hint_extension.clone().or_else(|| source.extension());
    SymphoniaDemuxer::open(source, hint.as_deref())
}

/// Renders in real time into a WAV file.
#[derive(Debug, Clone)]
pub struct SymphoniaBackend {
    output: PathBuf,
}

impl SymphoniaBackend {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }
}

impl Backend for SymphoniaBackend {
    type Demuxer = SymphoniaDemuxer;
    type Codec = SymphoniaCodec;
    type Sink = WavFileSink;

    fn open_demuxer(&self, source: &MediaSource, opts: &Opts) -> Result<Self::Demuxer> {
        open_symphonia(source, opts)
    }

    fn create_codec(&self, mime: &str) -> Result<Self::Codec> {
        SymphoniaCodec::create(mime)
    }

    fn create_sink(&self, config: &SinkConfig, _opts: &Opts) -> Result<Self::Sink> {
        WavFileSink::create(&self.output, config)
    }
}

/// Plays through an audio device (the default one unless `Opts::device_name` is set).
#[cfg(feature = "device-output")]
#[derive(Debug, Clone, Default)]
pub struct DeviceBackend;

#[cfg(feature = "device-output")]
impl Backend for DeviceBackend {
    type Demuxer = SymphoniaDemuxer;
    type Codec = SymphoniaCodec;
    type Sink = cpal_sink::CpalSink;

    fn open_demuxer(&self, source: &MediaSource, opts: &Opts) -> Result<Self::Demuxer> {
        open_symphonia(source, opts)
    }

    fn create_codec(&self, mime: &str) -> Result<Self::Codec> {
        SymphoniaCodec::create(mime)
    }

    fn create_sink(&self, config: &SinkConfig, opts: &Opts) -> Result<Self::Sink> {
        cpal_sink::CpalSink::create(config, opts)
    }
}
