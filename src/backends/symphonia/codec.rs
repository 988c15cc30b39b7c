//! A slot-based decoder driven by a symphonia `Decoder` on a worker thread.
//!
//! The playback thread talks to the worker through channels only:
//! - queued input slots go to the worker, which hands each slot back as soon as it copied it
//! - the worker publishes output events (data, format change, new slot table, failure)
//! - released output slots go back to the worker
//!
//! Decoded audio is converted to interleaved signed 16-bit little-endian PCM.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, anyhow};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use super::mime::{MIME_RAW, is_decodable};
use crate::codec::{Codec, DequeueOutput, SlotMemory, allocate_slots};
use crate::error::{Error, Result};
use crate::format::{BufferFlags, BufferInfo, TrackFormat};
use crate::track::DEFAULT_MAX_INPUT_CHUNK_BYTES;

pub const INPUT_SLOTS: usize = 4;
pub const OUTPUT_SLOTS: usize = 4;

/// Frames per output slot when the container does not declare a packet size.
const DEFAULT_OUTPUT_FRAMES: usize = 4096;

struct InputWork {
    index: usize,
    offset: usize,
    size: usize,
    presentation_time_us: i64,
    end_of_stream: bool,
}

enum WorkerEvent {
    Output { index: usize, info: BufferInfo },
    FormatChanged(TrackFormat),
    BuffersChanged(Vec<SlotMemory>),
    Failed(String),
}

struct WorkerLink {
    work_tx: Sender<InputWork>,
    released_tx: Sender<usize>,
    free_inputs_rx: Receiver<usize>,
    events_rx: Receiver<WorkerEvent>,
    handle: JoinHandle<()>,
}

pub struct SymphoniaCodec {
    mime: String,
    decoder: Option<Box<dyn Decoder>>,
    configured: Option<TrackFormat>,
    output_format: TrackFormat,
    input_slots: Vec<SlotMemory>,
    output_slots: Vec<SlotMemory>,
    worker: Option<WorkerLink>,
    released: bool,
}

impl SymphoniaCodec {
    /// Look up a decoder for `mime`.
    pub fn create(mime: &str) -> Result<Self> {
        if !is_decodable(mime) {
            return Err(Error::UnsupportedTrackFormat {
                mime: mime.to_string(),
            });
        }

        Ok(Self {
            mime: mime.to_string(),
            decoder: None,
            configured: None,
            output_format: TrackFormat::default(),
            input_slots: Vec::new(),
            output_slots: Vec::new(),
            worker: None,
            released: false,
        })
    }

    fn worker(&self) -> Result<&WorkerLink> {
        self.worker
            .as_ref()
            .ok_or_else(|| Error::decoder("decoder is not running"))
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.released {
            return Err(Error::decoder("decoder was released"));
        }
        Ok(())
    }
}

impl Codec for SymphoniaCodec {
    fn configure(&mut self, format: &TrackFormat) -> Result<()> {
        self.ensure_usable()?;
        if self.worker.is_some() {
            return Err(Error::decoder("cannot configure a running decoder"));
        }

        let unsupported = || Error::UnsupportedTrackFormat {
            mime: format.mime.clone(),
        };
        let params = format.codec_params.as_ref().ok_or_else(unsupported)?;

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| anyhow!(e))
            .context("failed to create decoder for audio track")
            .map_err(|e| {
                tracing::warn!(mime = %format.mime, error = ?e, "decoder unavailable");
                unsupported()
            })?;

        let channels = format.channel_count.unwrap_or(1).max(1) as usize;
        let frames = params
            .max_frames_per_packet
            .map(|f| f as usize)
            .unwrap_or(DEFAULT_OUTPUT_FRAMES);
        let input_capacity = format
            .max_input_size
            .unwrap_or(DEFAULT_MAX_INPUT_CHUNK_BYTES);

        self.input_slots = allocate_slots(INPUT_SLOTS, input_capacity);
        self.output_slots = allocate_slots(OUTPUT_SLOTS, frames * channels * 2);
        self.output_format = pcm_format(
            format.sample_rate.unwrap_or_default(),
            format.channel_count.unwrap_or_default(),
        );
        self.configured = Some(format.clone());
        self.decoder = Some(decoder);

        tracing::debug!(
            mime = %self.mime,
            input_capacity,
            output_capacity = frames * channels * 2,
            "decoder configured"
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.ensure_usable()?;
        if self.worker.is_some() {
            return Err(Error::decoder("decoder already started"));
        }
        let decoder = self
            .decoder
            .take()
            .ok_or_else(|| Error::decoder("decoder must be configured before start"))?;

        let (work_tx, work_rx) = mpsc::channel();
        let (released_tx, released_rx) = mpsc::channel();
        let (free_inputs_tx, free_inputs_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();

        for index in 0..self.input_slots.len() {
            free_inputs_tx
                .send(index)
                .map_err(|_| Error::decoder("input slot channel closed"))?;
        }

        let worker = DecodeWorker {
            decoder,
            input_slots: self.input_slots.clone(),
            output_slots: self.output_slots.clone(),
            free_outputs: (0..self.output_slots.len()).collect(),
            announced: (
                self.output_format.sample_rate.unwrap_or_default(),
                self.output_format.channel_count.unwrap_or_default(),
            ),
            sample_buf: None,
            work_rx,
            released_rx,
            free_inputs_tx,
            events_tx,
        };

        let handle = std::thread::Builder::new()
            .name("playout-decoder".to_string())
            .spawn(move || worker.run())?;

        self.worker = Some(WorkerLink {
            work_tx,
            released_tx,
            free_inputs_rx,
            events_rx,
            handle,
        });
        Ok(())
    }

    fn input_buffers(&self) -> Result<Vec<SlotMemory>> {
        Ok(self.input_slots.clone())
    }

    fn output_buffers(&self) -> Result<Vec<SlotMemory>> {
        Ok(self.output_slots.clone())
    }

    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>> {
        match self.worker()?.free_inputs_rx.recv_timeout(timeout) {
            Ok(index) => Ok(Some(index)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::decoder("decoder worker exited")),
        }
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        let capacity = self
            .input_slots
            .get(index)
            .and_then(|slot| slot.lock().ok().map(|m| m.len()))
            .ok_or_else(|| Error::decoder(format!("no input slot {index}")))?;
        if offset + size > capacity {
            return Err(Error::decoder(format!(
                "input range {offset}..{} exceeds slot capacity {capacity}",
                offset + size
            )));
        }

        self.worker()?
            .work_tx
            .send(InputWork {
                index,
                offset,
                size,
                presentation_time_us,
                end_of_stream: flags.end_of_stream,
            })
            .map_err(|_| Error::decoder("decoder worker exited"))
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<DequeueOutput> {
        let event = match self.worker()?.events_rx.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => return Ok(DequeueOutput::TryAgainLater),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::decoder("decoder worker exited"));
            }
        };

        match event {
            WorkerEvent::Output { index, info } => Ok(DequeueOutput::Buffer { index, info }),
            WorkerEvent::FormatChanged(format) => {
                self.output_format = format;
                Ok(DequeueOutput::OutputFormatChanged)
            }
            WorkerEvent::BuffersChanged(slots) => {
                self.output_slots = slots;
                Ok(DequeueOutput::OutputBuffersChanged)
            }
            WorkerEvent::Failed(reason) => Err(Error::Decoder(reason)),
        }
    }

    fn output_format(&self) -> Result<TrackFormat> {
        Ok(self.output_format.clone())
    }

    fn release_output_buffer(&mut self, index: usize, _render: bool) -> Result<()> {
        self.worker()?
            .released_tx
            .send(index)
            .map_err(|_| Error::decoder("decoder worker exited"))
    }

    fn stop(&mut self) -> Result<()> {
        let Some(link) = self.worker.take() else {
            return Ok(());
        };

        let WorkerLink {
            work_tx,
            released_tx,
            handle,
            ..
        } = link;
        drop(work_tx);
        drop(released_tx);

        handle
            .join()
            .map_err(|_| Error::decoder("decoder worker panicked"))?;
        tracing::debug!(mime = %self.mime, "decoder stopped");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let stopped = self.stop();
        self.released = true;
        self.decoder = None;
        self.configured = None;
        self.input_slots.clear();
        self.output_slots.clear();
        stopped
    }
}

fn pcm_format(sample_rate: u32, channel_count: u16) -> TrackFormat {
    TrackFormat::audio(MIME_RAW, sample_rate, channel_count)
}

/// Worker-side state. Lives on the decoder thread.
struct DecodeWorker {
    decoder: Box<dyn Decoder>,
    input_slots: Vec<SlotMemory>,
    output_slots: Vec<SlotMemory>,
    free_outputs: VecDeque<usize>,
    announced: (u32, u16),
    sample_buf: Option<(usize, SignalSpec, SampleBuffer<i16>)>,
    work_rx: Receiver<InputWork>,
    released_rx: Receiver<usize>,
    free_inputs_tx: Sender<usize>,
    events_tx: Sender<WorkerEvent>,
}

impl DecodeWorker {
    fn run(mut self) {
        // The work channel closes when the codec is stopped.
        while let Ok(work) = self.work_rx.recv() {
            match self.handle(work) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    tracing::error!(error = %err, "decoder worker failed");
                    let _ = self.events_tx.send(WorkerEvent::Failed(err.to_string()));
                    break;
                }
            }
        }
        tracing::debug!("decoder worker exiting");
    }

    /// Process one queued input slot. `Ok(false)` means the codec side went away.
    fn handle(&mut self, work: InputWork) -> Result<bool> {
        let data = {
            let slot = self.input_slots[work.index]
                .lock()
                .map_err(|_| Error::decoder("input slot mutex poisoned"))?;
            slot[work.offset..work.offset + work.size].to_vec()
        };
        if self.free_inputs_tx.send(work.index).is_err() {
            return Ok(false);
        }

        if work.end_of_stream {
            let info = BufferInfo {
                offset: 0,
                size: 0,
                presentation_time_us: work.presentation_time_us,
                flags: BufferFlags::END_OF_STREAM,
            };
            return self.publish(&[], info);
        }

        let packet = Packet::new_from_boxed_slice(0, 0, 0, data.into_boxed_slice());
        let pcm = match self.decoder.decode(&packet) {
            Ok(decoded) => {
                if let Some(format) = layout_change(&mut self.announced, *decoded.spec()) {
                    send(&self.events_tx, WorkerEvent::FormatChanged(format))?;
                }
                interleave(&mut self.sample_buf, decoded)
            }
            // Recoverable: corrupted frame, but decoding can continue.
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::warn!(reason, "skipping undecodable frame");
                return Ok(true);
            }
            Err(SymphoniaError::IoError(e)) => {
                tracing::debug!(error = %e, "decoder io error, frame skipped");
                return Ok(true);
            }
            Err(SymphoniaError::ResetRequired) => {
                self.decoder.reset();
                return Ok(true);
            }
            Err(e) => return Err(Error::decoder(anyhow!(e).context("decoder failure"))),
        };

        if pcm.is_empty() {
            return Ok(true);
        }
        let info = BufferInfo {
            offset: 0,
            size: pcm.len(),
            presentation_time_us: work.presentation_time_us,
            flags: BufferFlags::NONE,
        };
        self.publish(&pcm, info)
    }

    /// Copy `pcm` into a free output slot and publish it. `Ok(false)` if the codec side is gone.
    fn publish(&mut self, pcm: &[u8], info: BufferInfo) -> Result<bool> {
        let capacity = self.slot_capacity();
        if pcm.len() > capacity && !self.grow_output_slots(pcm.len())? {
            return Ok(false);
        }

        let Some(index) = self.next_free_output() else {
            return Ok(false);
        };
        {
            let mut slot = self.output_slots[index]
                .lock()
                .map_err(|_| Error::decoder("output slot mutex poisoned"))?;
            slot[..pcm.len()].copy_from_slice(pcm);
        }

        send(&self.events_tx, WorkerEvent::Output { index, info })?;
        Ok(true)
    }

    fn slot_capacity(&self) -> usize {
        self.output_slots
            .first()
            .and_then(|slot| slot.lock().ok().map(|m| m.len()))
            .unwrap_or(0)
    }

    fn next_free_output(&mut self) -> Option<usize> {
        if let Some(index) = self.free_outputs.pop_front() {
            return Some(index);
        }
        self.released_rx.recv().ok()
    }

    /// Swap in a larger slot table once every current slot is back.
    fn grow_output_slots(&mut self, needed: usize) -> Result<bool> {
        while self.free_outputs.len() < self.output_slots.len() {
            match self.released_rx.recv() {
                Ok(index) => self.free_outputs.push_back(index),
                Err(_) => return Ok(false),
            }
        }

        let count = self.output_slots.len();
        self.output_slots = allocate_slots(count, needed);
        self.free_outputs = (0..count).collect();
        tracing::debug!(capacity = needed, "output slots grown");

        send(
            &self.events_tx,
            WorkerEvent::BuffersChanged(self.output_slots.clone()),
        )?;
        Ok(true)
    }
}

fn send(events_tx: &Sender<WorkerEvent>, event: WorkerEvent) -> Result<()> {
    events_tx
        .send(event)
        .map_err(|_| Error::decoder("codec side closed the event channel"))
}

/// The new output format, if decoded audio stopped matching the announced layout.
fn layout_change(announced: &mut (u32, u16), spec: SignalSpec) -> Option<TrackFormat> {
    let layout = (spec.rate, spec.channels.count() as u16);
    if layout == *announced {
        return None;
    }
    *announced = layout;
    tracing::info!(
        sample_rate = layout.0,
        channels = layout.1,
        "decoded layout changed"
    );
    Some(pcm_format(layout.0, layout.1))
}

/// Convert a decoded buffer to interleaved i16 little-endian bytes.
fn interleave(
    sample_buf: &mut Option<(usize, SignalSpec, SampleBuffer<i16>)>,
    decoded: AudioBufferRef<'_>,
) -> Vec<u8> {
    let spec = *decoded.spec();
    let capacity = decoded.capacity();

    let stale = match sample_buf {
        Some((cap, buf_spec, _)) => *cap < capacity || *buf_spec != spec,
        None => true,
    };
    if stale {
        *sample_buf = Some((
            capacity,
            spec,
            SampleBuffer::<i16>::new(capacity as u64, spec),
        ));
    }

    let Some((_, _, buf)) = sample_buf.as_mut() else {
        return Vec::new();
    };
    buf.copy_interleaved_ref(decoded);
    buf.samples()
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect()
}
