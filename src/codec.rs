//! Decoder collaborator interface.
//!
//! The decoder is a black box that owns two pools of indexed memory slots. Compressed input is
//! written into an input slot and queued; decoded PCM shows up later in an output slot. Dequeue
//! calls take a timeout because decoding may happen on the decoder's own threads.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Result;
use crate::format::{BufferFlags, BufferInfo, TrackFormat};

/// Raw memory backing one slot. The `Vec` length is the slot capacity.
pub type SlotMemory = Arc<Mutex<Vec<u8>>>;

/// Allocate `count` zeroed slots of `capacity` bytes each.
pub fn allocate_slots(count: usize, capacity: usize) -> Vec<SlotMemory> {
    (0..count)
        .map(|_| Arc::new(Mutex::new(vec![0u8; capacity])))
        .collect()
}

/// Outcome of [`Codec::dequeue_output_buffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueOutput {
    /// Output slot `index` holds decoded data described by `info`.
    Buffer { index: usize, info: BufferInfo },
    /// Previously fetched output slots are stale; fetch them again.
    OutputBuffersChanged,
    /// The output format changed; see [`Codec::output_format`].
    OutputFormatChanged,
    /// Nothing became ready within the timeout.
    TryAgainLater,
}

pub trait Codec: Send {
    /// Configure with the selected track's format. No codec-specific extra data, no surface.
    fn configure(&mut self, format: &TrackFormat) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn input_buffers(&self) -> Result<Vec<SlotMemory>>;

    fn output_buffers(&self) -> Result<Vec<SlotMemory>>;

    /// Index of a free input slot, or `None` if none became free within `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>>;

    fn queue_input_buffer(
        &mut self,
        index: usize,
        offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<DequeueOutput>;

    /// Current output format (valid after `OutputFormatChanged`).
    fn output_format(&self) -> Result<TrackFormat>;

    fn release_output_buffer(&mut self, index: usize, render: bool) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn release(&mut self) -> Result<()>;
}
