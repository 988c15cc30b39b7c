use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use playout::backend::Backend;
use playout::backends::SymphoniaBackend;
use playout::logging;
use playout::opts::Opts;
use playout::{PlaybackReport, Player};

fn main() -> Result<()> {
    logging::init();
    let params = Params::parse();
    let opts = params.opts()?;

    let report = match &params.output_wav {
        Some(path) => play(SymphoniaBackend::new(path), opts, &params)?,
        None => play_on_device(opts, &params)?,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report)?;
    writeln!(out)?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "playout")]
#[command(about = "Decode an audio file and play it in real time")]
struct Params {
    /// Audio file to play.
    #[arg(short = 'i', long = "input")]
    pub input: String,

    /// Render into this WAV file instead of an audio device.
    #[arg(short = 'o', long = "output-wav")]
    pub output_wav: Option<PathBuf>,

    /// Container hint (e.g. "mp3", "m4a") when the file extension is missing or misleading.
    #[arg(long = "hint")]
    pub hint: Option<String>,

    /// JSON file with playback options.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Request a stop after this many milliseconds.
    #[arg(long = "stop-after-ms")]
    pub stop_after_ms: Option<u64>,

    #[arg(long = "poll-timeout-ms")]
    pub poll_timeout_ms: Option<u64>,

    /// Output device name (device output only).
    #[arg(short = 'd', long = "device")]
    pub device: Option<String>,
}

impl Params {
    fn opts(&self) -> Result<Opts> {
        let mut opts = match &self.config {
            Some(path) => Opts::from_json_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => Opts::default(),
        };

        if let Some(hint) = &self.hint {
            opts.hint_extension = Some(hint.clone());
        }
        if let Some(ms) = self.poll_timeout_ms {
            opts.poll_timeout_ms = ms;
        }
        if let Some(device) = &self.device {
            opts.device_name = Some(device.clone());
        }
        Ok(opts)
    }
}

fn play<B: Backend>(backend: B, opts: Opts, params: &Params) -> Result<PlaybackReport> {
    let mut player = Player::new(backend, opts);
    player
        .play(params.input.as_str())
        .with_context(|| format!("failed to start playback of {}", params.input))?;

    if let Some(ms) = params.stop_after_ms {
        let handle = player.stop_handle();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            handle.stop();
        });
    }

    Ok(player.wait()?)
}

#[cfg(feature = "device-output")]
fn play_on_device(opts: Opts, params: &Params) -> Result<PlaybackReport> {
    play(playout::backends::DeviceBackend, opts, params)
}

#[cfg(not(feature = "device-output"))]
fn play_on_device(_opts: Opts, _params: &Params) -> Result<PlaybackReport> {
    anyhow::bail!("built without device output; pass --output-wav <path>")
}
