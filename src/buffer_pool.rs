//! Slot-level adapter over a [`Codec`].
//!
//! Responsibilities:
//! - cache the codec's input/output slot tables and refresh the output table when the codec
//!   invalidates it
//! - turn raw dequeue results into an exhaustive [`OutputEvent`]
//! - enforce slot discipline: an index may only be filled/read between its dequeue and its
//!   queue/release, and never handed back twice
//!
//! Every acquire call waits at most the configured poll timeout, so callers stay responsive to
//! a stop request.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::codec::{Codec, DequeueOutput, SlotMemory};
use crate::error::{Error, Result};
use crate::format::{BufferFlags, BufferInfo, TrackFormat};

/// What a single output acquire produced.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// Output slot `index` holds decoded PCM described by `info`.
    Data { index: usize, info: BufferInfo },
    /// The decoder revealed a new output format.
    FormatChanged(TrackFormat),
    /// The output slot table was replaced (the adapter has already refreshed its cache).
    SlotsInvalidated,
    /// Nothing was ready within the wait budget.
    Timeout,
}

pub struct BufferPool<C: Codec> {
    codec: C,
    timeout: Duration,
    input_slots: Vec<SlotMemory>,
    output_slots: Vec<SlotMemory>,
    held_inputs: BTreeSet<usize>,
    held_outputs: BTreeSet<usize>,
}

impl<C: Codec> BufferPool<C> {
    /// Wrap a started codec. Call [`BufferPool::load_slots`] before acquiring anything.
    pub fn new(codec: C, timeout: Duration) -> Self {
        Self {
            codec,
            timeout,
            input_slots: Vec::new(),
            output_slots: Vec::new(),
            held_inputs: BTreeSet::new(),
            held_outputs: BTreeSet::new(),
        }
    }

    /// Fetch the codec's slot tables.
    pub fn load_slots(&mut self) -> Result<()> {
        self.input_slots = self.codec.input_buffers()?;
        self.output_slots = self.codec.output_buffers()?;

        tracing::debug!(
            inputs = self.input_slots.len(),
            outputs = self.output_slots.len(),
            "buffer pool ready"
        );
        Ok(())
    }

    /// Give the codec back (for teardown).
    pub fn into_codec(self) -> C {
        self.codec
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Dequeue a free input slot, or `None` if none freed up within the wait budget.
    pub fn acquire_input_slot(&mut self) -> Result<Option<usize>> {
        let Some(index) = self.codec.dequeue_input_buffer(self.timeout)? else {
            return Ok(None);
        };

        if index >= self.input_slots.len() {
            return Err(Error::SlotDiscipline(format!(
                "decoder returned input slot {index} but only {} exist",
                self.input_slots.len()
            )));
        }
        if !self.held_inputs.insert(index) {
            return Err(Error::SlotDiscipline(format!(
                "input slot {index} dequeued twice without being queued"
            )));
        }
        Ok(Some(index))
    }

    /// Run `fill` over the memory of held input slot `index`.
    pub fn fill_input<T>(
        &mut self,
        index: usize,
        fill: impl FnOnce(&mut [u8]) -> Result<T>,
    ) -> Result<T> {
        if !self.held_inputs.contains(&index) {
            return Err(Error::SlotDiscipline(format!(
                "input slot {index} is not held"
            )));
        }
        let slot = &self.input_slots[index];
        let mut memory = slot
            .lock()
            .map_err(|_| Error::decoder(format!("input slot {index} mutex poisoned")))?;
        fill(memory.as_mut_slice())
    }

    /// Hand a filled input slot back to the decoder.
    pub fn commit_input(
        &mut self,
        index: usize,
        byte_count: usize,
        presentation_time_us: i64,
        end_of_stream: bool,
    ) -> Result<()> {
        if !self.held_inputs.remove(&index) {
            return Err(Error::SlotDiscipline(format!(
                "input slot {index} committed without being acquired"
            )));
        }

        let flags = if end_of_stream {
            BufferFlags::END_OF_STREAM
        } else {
            BufferFlags::NONE
        };
        self.codec
            .queue_input_buffer(index, 0, byte_count, presentation_time_us, flags)
    }

    /// Dequeue one output event.
    pub fn acquire_output_slot(&mut self) -> Result<OutputEvent> {
        match self.codec.dequeue_output_buffer(self.timeout)? {
            DequeueOutput::Buffer { index, info } => {
                if index >= self.output_slots.len() {
                    return Err(Error::SlotDiscipline(format!(
                        "decoder returned output slot {index} but only {} exist",
                        self.output_slots.len()
                    )));
                }
                if !self.held_outputs.insert(index) {
                    return Err(Error::SlotDiscipline(format!(
                        "output slot {index} dequeued twice without being released"
                    )));
                }
                Ok(OutputEvent::Data { index, info })
            }
            DequeueOutput::OutputFormatChanged => {
                let format = self.codec.output_format()?;
                tracing::debug!(
                    mime = %format.mime,
                    sample_rate = ?format.sample_rate,
                    channels = ?format.channel_count,
                    "decoder output format changed"
                );
                Ok(OutputEvent::FormatChanged(format))
            }
            DequeueOutput::OutputBuffersChanged => {
                self.refresh_output_slots()?;
                Ok(OutputEvent::SlotsInvalidated)
            }
            DequeueOutput::TryAgainLater => Ok(OutputEvent::Timeout),
        }
    }

    /// Copy exactly `info.size` bytes out of held output slot `index`.
    pub fn copy_output(&self, index: usize, info: &BufferInfo) -> Result<Vec<u8>> {
        if !self.held_outputs.contains(&index) {
            return Err(Error::SlotDiscipline(format!(
                "output slot {index} read while not held"
            )));
        }

        let memory = self.output_slots[index]
            .lock()
            .map_err(|_| Error::decoder(format!("output slot {index} mutex poisoned")))?;

        let end = info.offset + info.size;
        let bytes = memory.get(info.offset..end).ok_or_else(|| {
            Error::decoder(format!(
                "output slot {index} holds {} bytes, decoder reported {}..{end}",
                memory.len(),
                info.offset
            ))
        })?;
        Ok(bytes.to_vec())
    }

    /// Release a held output slot back to the decoder (without rendering it).
    pub fn release_output(&mut self, index: usize) -> Result<()> {
        if !self.held_outputs.remove(&index) {
            return Err(Error::SlotDiscipline(format!(
                "output slot {index} released while not held"
            )));
        }
        self.codec.release_output_buffer(index, false)
    }

    fn refresh_output_slots(&mut self) -> Result<()> {
        if !self.held_outputs.is_empty() {
            tracing::warn!(
                held = ?self.held_outputs,
                "decoder replaced output slots while some were still held"
            );
            self.held_outputs.clear();
        }
        self.output_slots = self.codec.output_buffers()?;
        tracing::debug!(outputs = self.output_slots.len(), "output slots refreshed");
        Ok(())
    }
}
