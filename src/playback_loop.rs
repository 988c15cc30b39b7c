//! The decode/playback control loop.
//!
//! One iteration ("tick"):
//! 1. If end-of-stream has not been submitted yet, try to acquire an input slot and feed it the
//!    demuxer's current sample (or an empty end-of-stream chunk once the demuxer runs dry).
//!    After a real chunk, advance the demuxer and let the pacer hold the loop until the new
//!    sample is due.
//! 2. Drain one output event into the sink.
//! 3. Exit once a drained output carries the end-of-stream flag.
//!
//! The stop signal is checked at the top of every tick and inside the pacer wait; when it is
//! raised the loop returns without draining further.

use std::time::Duration;

use serde::Serialize;

use crate::buffer_pool::{BufferPool, OutputEvent};
use crate::codec::Codec;
use crate::demux::Demuxer;
use crate::error::Result;
use crate::pacer::{PaceOutcome, Pacer};
use crate::sink::AudioSink;
use crate::stop::StopSignal;

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopExit {
    /// Demuxer exhausted and the decoder emitted its end-of-stream output.
    EndOfStream,
    /// The stop signal was raised.
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Exit(LoopExit),
}

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub ticks: u64,
    pub input_chunks: u64,
    pub input_bytes: u64,
    pub output_chunks: u64,
    pub bytes_written: u64,
    pub format_changes: u64,
    pub slot_refreshes: u64,
    pub end_of_stream_submitted: bool,
}

pub struct PlaybackLoop<'a, C, D, S>
where
    C: Codec,
    D: Demuxer + ?Sized,
    S: AudioSink + ?Sized,
{
    pool: &'a mut BufferPool<C>,
    demuxer: &'a mut D,
    sink: &'a mut S,
    pacer: Pacer,
    stop: StopSignal,
    session_start: Duration,
    stats: LoopStats,
}

impl<'a, C, D, S> PlaybackLoop<'a, C, D, S>
where
    C: Codec,
    D: Demuxer + ?Sized,
    S: AudioSink + ?Sized,
{
    pub fn new(
        pool: &'a mut BufferPool<C>,
        demuxer: &'a mut D,
        sink: &'a mut S,
        pacer: Pacer,
        stop: StopSignal,
    ) -> Self {
        let session_start = pacer.now();
        Self {
            pool,
            demuxer,
            sink,
            pacer,
            stop,
            session_start,
            stats: LoopStats::default(),
        }
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run ticks until the stream ends or a stop is requested.
    pub fn run(&mut self) -> Result<LoopExit> {
        self.session_start = self.pacer.now();
        if let Some(first_us) = self.demuxer.sample_time_us() {
            self.pacer.anchor(first_us);
        }

        loop {
            if let TickOutcome::Exit(exit) = self.tick()? {
                tracing::info!(
                    ?exit,
                    ticks = self.stats.ticks,
                    input_chunks = self.stats.input_chunks,
                    output_chunks = self.stats.output_chunks,
                    bytes_written = self.stats.bytes_written,
                    "playback loop finished"
                );
                return Ok(exit);
            }
        }
    }

    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.stop.is_raised() {
            return Ok(TickOutcome::Exit(LoopExit::Stopped));
        }
        self.stats.ticks += 1;

        if !self.stats.end_of_stream_submitted {
            if let Some(index) = self.pool.acquire_input_slot()? {
                if self.feed_input(index)? == PaceOutcome::Stopped {
                    return Ok(TickOutcome::Exit(LoopExit::Stopped));
                }
            }
        }

        if self.drain_output()? {
            return Ok(TickOutcome::Exit(LoopExit::EndOfStream));
        }
        Ok(TickOutcome::Continue)
    }

    fn feed_input(&mut self, index: usize) -> Result<PaceOutcome> {
        let demuxer = &mut *self.demuxer;
        let size = self
            .pool
            .fill_input(index, |buf| demuxer.read_sample_data(buf))?;

        let Some(size) = size else {
            self.pool.commit_input(index, 0, 0, true)?;
            self.stats.end_of_stream_submitted = true;
            tracing::debug!("input end-of-stream submitted");
            return Ok(PaceOutcome::Ready);
        };

        let presentation_time_us = self.demuxer.sample_time_us().unwrap_or(0);
        self.pool
            .commit_input(index, size, presentation_time_us, false)?;
        self.stats.input_chunks += 1;
        self.stats.input_bytes += size as u64;
        tracing::trace!(size, presentation_time_us, "input chunk submitted");

        if !self.demuxer.advance()? {
            return Ok(PaceOutcome::Ready);
        }
        match self.demuxer.sample_time_us() {
            Some(next_us) => {
                Ok(self
                    .pacer
                    .throttle_before_advance(next_us, self.session_start, &self.stop))
            }
            None => Ok(PaceOutcome::Ready),
        }
    }

    /// Drain one output event. Returns `true` if it carried end-of-stream.
    fn drain_output(&mut self) -> Result<bool> {
        match self.pool.acquire_output_slot()? {
            OutputEvent::Data { index, info } => {
                let chunk = self.pool.copy_output(index, &info)?;
                if !chunk.is_empty() {
                    self.sink.write(&chunk)?;
                    self.stats.bytes_written += chunk.len() as u64;
                }
                self.pool.release_output(index)?;
                self.stats.output_chunks += 1;

                if info.flags.end_of_stream {
                    tracing::debug!("output end-of-stream observed");
                }
                Ok(info.flags.end_of_stream)
            }
            OutputEvent::FormatChanged(format) => {
                self.stats.format_changes += 1;
                if let Some(rate) = format.sample_rate {
                    tracing::info!(sample_rate = rate, "reconfiguring sink playback rate");
                    self.sink.set_playback_rate(rate)?;
                }
                Ok(false)
            }
            OutputEvent::SlotsInvalidated => {
                self.stats.slot_refreshes += 1;
                Ok(false)
            }
            OutputEvent::Timeout => Ok(false),
        }
    }
}
