//! Real-time rendering to an audio device through cpal.
//!
//! PCM flows through a lock-free ring of `i16` samples: `write` pushes into it (blocking while
//! it is full), the device callback pops from it and plays silence on underrun. cpal streams
//! are not `Send`, so the stream itself lives on a dedicated device thread that rebuilds it on
//! command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::sink::{AudioSink, Pcm16Assembler, SinkConfig};

const WRITE_BACKPRESSURE_SLEEP: Duration = Duration::from_millis(1);
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_SLACK: Duration = Duration::from_millis(100);

type SharedConsumer = Arc<Mutex<HeapCons<i16>>>;

enum Command {
    Open {
        sample_rate_hz: u32,
        start: bool,
        reply: Sender<Result<()>>,
    },
    Play {
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

struct DeviceThread {
    commands: Sender<Command>,
    handle: JoinHandle<()>,
}

pub struct CpalSink {
    channels: u16,
    sample_rate_hz: u32,
    ring_capacity: usize,
    producer: HeapProd<i16>,
    device: Option<DeviceThread>,
    failed: Arc<AtomicBool>,
    playing: bool,
    assembler: Pcm16Assembler,
    scratch: Vec<i16>,
}

impl CpalSink {
    /// Open the output device and build a (paused) stream for `config`.
    pub fn create(config: &SinkConfig, opts: &Opts) -> Result<Self> {
        let ring_bytes = (config.buffer_size_bytes / 2)
            .max(config.bytes_for_millis(opts.min_sink_buffer_ms));
        let ring_capacity = (ring_bytes / config.encoding.bytes_per_sample()).max(1024);

        let (producer, consumer) = HeapRb::<i16>::new(ring_capacity).split();
        let consumer: SharedConsumer = Arc::new(Mutex::new(consumer));
        let failed = Arc::new(AtomicBool::new(false));

        let (commands, commands_rx) = mpsc::channel();
        let worker = DeviceWorker {
            device_name: opts.device_name.clone(),
            channels: config.channel_count,
            consumer,
            failed: failed.clone(),
            stream: None,
        };
        let handle = std::thread::Builder::new()
            .name("playout-device".to_string())
            .spawn(move || worker.run(commands_rx))?;

        let mut sink = Self {
            channels: config.channel_count,
            sample_rate_hz: config.sample_rate_hz,
            ring_capacity,
            producer,
            device: Some(DeviceThread { commands, handle }),
            failed,
            playing: false,
            assembler: Pcm16Assembler::default(),
            scratch: Vec::new(),
        };

        if let Err(err) = sink.open_stream(config.sample_rate_hz) {
            let _ = sink.release();
            return Err(Error::SinkConfigurationFailed {
                reason: err.to_string(),
            });
        }

        tracing::info!(
            sample_rate_hz = config.sample_rate_hz,
            channels = config.channel_count,
            ring_samples = ring_capacity,
            "device sink ready"
        );
        Ok(sink)
    }

    fn request(&self, build: impl FnOnce(Sender<Result<()>>) -> Command) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::sink("sink was released"))?;

        let (reply, reply_rx) = mpsc::channel();
        device
            .commands
            .send(build(reply))
            .map_err(|_| Error::sink("device thread exited"))?;
        reply_rx
            .recv()
            .map_err(|_| Error::sink("device thread exited"))?
    }

    fn open_stream(&self, sample_rate_hz: u32) -> Result<()> {
        let start = self.playing;
        self.request(|reply| Command::Open {
            sample_rate_hz,
            start,
            reply,
        })
    }

    /// Wait (bounded by the ring's duration) for queued audio to reach the device.
    fn drain(&self) {
        let frames = self.ring_capacity / self.channels.max(1) as usize;
        let ring_ms = frames as u64 * 1000 / self.sample_rate_hz.max(1) as u64;
        let deadline = Instant::now() + Duration::from_millis(ring_ms) + DRAIN_SLACK;

        while self.producer.occupied_len() > 0 && !self.failed.load(Ordering::Relaxed) {
            if Instant::now() >= deadline {
                tracing::debug!(
                    pending = self.producer.occupied_len(),
                    "device drain timed out"
                );
                break;
            }
            std::thread::sleep(WRITE_BACKPRESSURE_SLEEP);
        }
    }
}

impl AudioSink for CpalSink {
    fn play(&mut self) -> Result<()> {
        self.request(|reply| Command::Play { reply })?;
        self.playing = true;
        Ok(())
    }

    fn set_playback_rate(&mut self, sample_rate_hz: u32) -> Result<()> {
        if sample_rate_hz == self.sample_rate_hz {
            return Ok(());
        }
        self.open_stream(sample_rate_hz)?;
        self.sample_rate_hz = sample_rate_hz;
        tracing::info!(sample_rate_hz, "device stream rebuilt");
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        self.scratch.clear();
        self.assembler.push(pcm, &mut self.scratch);

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < self.scratch.len() {
            if self.failed.load(Ordering::Relaxed) {
                return Err(Error::sink("output stream failed"));
            }

            let pushed = self.producer.push_slice(&self.scratch[offset..]);
            if pushed > 0 {
                offset += pushed;
                last_progress = Instant::now();
                continue;
            }
            if last_progress.elapsed() >= WRITE_STALL_TIMEOUT {
                return Err(Error::sink("output device stopped consuming audio"));
            }
            std::thread::sleep(WRITE_BACKPRESSURE_SLEEP);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let Some(device) = self.device.take() else {
            return Ok(());
        };
        if self.playing {
            self.drain();
        }
        self.playing = false;

        let _ = device.commands.send(Command::Shutdown);
        device
            .handle
            .join()
            .map_err(|_| Error::sink("device thread panicked"))?;
        tracing::debug!("device sink released");
        Ok(())
    }
}

/// Owns the cpal stream. Runs on the device thread.
struct DeviceWorker {
    device_name: Option<String>,
    channels: u16,
    consumer: SharedConsumer,
    failed: Arc<AtomicBool>,
    stream: Option<cpal::Stream>,
}

impl DeviceWorker {
    fn run(mut self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Open {
                    sample_rate_hz,
                    start,
                    reply,
                } => {
                    self.stream = None;
                    let built = self.build_stream(sample_rate_hz).map_err(Error::sink);
                    let opened = built.and_then(|stream| {
                        if start {
                            stream.play().map_err(Error::sink)?;
                        } else {
                            // Some hosts start streams on creation.
                            let _ = stream.pause();
                        }
                        self.stream = Some(stream);
                        Ok(())
                    });
                    let _ = reply.send(opened);
                }
                Command::Play { reply } => {
                    let played = match self.stream.as_ref() {
                        Some(stream) => stream.play().map_err(Error::sink),
                        None => Err(Error::sink("no output stream")),
                    };
                    let _ = reply.send(played);
                }
                Command::Shutdown => break,
            }
        }
        self.stream = None;
    }

    fn build_stream(&self, sample_rate_hz: u32) -> anyhow::Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = select_device(&host, self.device_name.as_deref())?;

        let sample_format = device
            .default_output_config()
            .context("failed to get default config")?
            .sample_format();
        let config = cpal::StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(sample_rate_hz),
            buffer_size: cpal::BufferSize::Default,
        };

        let failed = self.failed.clone();
        let on_error = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "output stream error");
            failed.store(true, Ordering::SeqCst);
        };

        let consumer = self.consumer.clone();
        let stream = match sample_format {
            cpal::SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let filled = pop_into(&consumer, data);
                    data[filled..].fill(0);
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::F32 => {
                let mut pcm = Vec::<i16>::new();
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        pcm.resize(data.len(), 0);
                        let filled = pop_into(&consumer, &mut pcm);
                        pcm[filled..].fill(0);
                        for (out, sample) in data.iter_mut().zip(&pcm) {
                            *out = *sample as f32 / 32768.0;
                        }
                    },
                    on_error,
                    None,
                )
            }
            other => {
                return Err(anyhow!("unsupported output sample format: {other:?}"));
            }
        }
        .context("failed to build output stream")?;

        Ok(stream)
    }
}

fn pop_into(consumer: &SharedConsumer, data: &mut [i16]) -> usize {
    match consumer.lock() {
        Ok(mut consumer) => consumer.pop_slice(data),
        Err(_) => 0,
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> anyhow::Result<cpal::Device> {
    if let Some(name) = name {
        let mut devices = host
            .output_devices()
            .context("failed to enumerate devices")?;
        if let Some(device) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            return Ok(device);
        }
        tracing::warn!(device = name, "requested device not found, using the default");
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}
