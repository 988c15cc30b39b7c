//! Scripted in-memory backend shared by the integration tests.
//!
//! Every collaborator call is appended to a [`Journal`] together with the journal clock's
//! reading, so tests can assert on ordering and timing after the session finished.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use playout::backend::Backend;
use playout::clock::{Clock, SystemClock};
use playout::codec::{Codec, DequeueOutput, SlotMemory, allocate_slots};
use playout::demux::Demuxer;
use playout::format::{BufferFlags, BufferInfo, MediaSource, TrackFormat};
use playout::opts::Opts;
use playout::sink::{AudioSink, SinkConfig};
use playout::{Error, Result};

pub const SLOT_BYTES: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    DemuxerOpened,
    TrackSelected(usize),
    SamplePulled(i64),
    CodecCreated(String),
    CodecConfigured,
    CodecStarted,
    InputQueued { size: usize, pts: i64, eos: bool },
    OutputDequeued(usize),
    OutputReleased(usize),
    CodecStopped,
    CodecReleased,
    DemuxerReleased,
    SinkCreated(u32),
    SinkPlaying,
    SinkRate(u32),
    SinkWrite(usize),
    SinkReleased,
    Violation(String),
}

pub struct Journal {
    clock: Arc<dyn Clock>,
    entries: Mutex<Vec<(Duration, Event)>>,
}

impl Journal {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            entries: Mutex::new(Vec::new()),
        })
    }

    pub fn realtime() -> Arc<Self> {
        Self::new(Arc::new(SystemClock::new()))
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn record(&self, event: Event) {
        let at = self.clock.now();
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((at, event));
        }
    }

    pub fn entries(&self) -> Vec<(Duration, Event)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.entries().into_iter().map(|(_, e)| e).collect()
    }

    pub fn count(&self, wanted: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| wanted(e)).count()
    }

    pub fn position(&self, wanted: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(wanted)
    }

    /// `(time, pts)` of every real (non end-of-stream) input submission.
    pub fn submissions(&self) -> Vec<(Duration, i64)> {
        self.entries()
            .into_iter()
            .filter_map(|(at, e)| match e {
                Event::InputQueued { pts, eos: false, .. } => Some((at, pts)),
                _ => None,
            })
            .collect()
    }

    pub fn pulls(&self) -> Vec<(Duration, i64)> {
        self.entries()
            .into_iter()
            .filter_map(|(at, e)| match e {
                Event::SamplePulled(pts) => Some((at, pts)),
                _ => None,
            })
            .collect()
    }

    pub fn violations(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Violation(v) => Some(v),
                _ => None,
            })
            .collect()
    }
}

/// What the fake collaborators do.
#[derive(Debug, Clone)]
pub struct Script {
    pub tracks: Vec<TrackFormat>,
    /// `(presentation time, payload size)` of every compressed sample, in order.
    pub samples: Vec<(i64, usize)>,
    pub source_unavailable: bool,
    pub unsupported_mime: bool,
    /// Report a format change with this rate right after the first data output.
    pub format_change_after_first_output: Option<u32>,
    /// Replace the output slot table right after the first data output.
    pub buffers_change_after_first_output: bool,
    /// Answer "try again later" this many times before emitting the end-of-stream output.
    pub eos_delay_polls: usize,
    /// Fail every sink write after this many succeeded.
    pub fail_sink_write_after: Option<usize>,
    /// Fail every output dequeue after this many data outputs were handed out.
    pub fail_output_dequeue_after: Option<usize>,
    pub fail_decoder_stop: bool,
    pub fail_decoder_release: bool,
    pub fail_demuxer_release: bool,
    pub fail_sink_release: bool,
}

impl Script {
    /// One mono 44.1 kHz audio track with samples at the given timestamps.
    pub fn mono(sample_times_us: &[i64]) -> Self {
        Self {
            tracks: vec![
                TrackFormat::audio("audio/mpeg", 44_100, 1).with_max_input_size(SLOT_BYTES),
            ],
            samples: sample_times_us.iter().map(|t| (*t, 64)).collect(),
            source_unavailable: false,
            unsupported_mime: false,
            format_change_after_first_output: None,
            buffers_change_after_first_output: false,
            eos_delay_polls: 0,
            fail_sink_write_after: None,
            fail_output_dequeue_after: None,
            fail_decoder_stop: false,
            fail_decoder_release: false,
            fail_demuxer_release: false,
            fail_sink_release: false,
        }
    }

    /// Samples every `step_us` for `duration_us`.
    pub fn steady(duration_us: i64, step_us: i64) -> Self {
        let times: Vec<i64> = (0..duration_us / step_us).map(|i| i * step_us).collect();
        Self::mono(&times)
    }
}

pub struct ScriptedBackend {
    pub script: Script,
    pub journal: Arc<Journal>,
}

impl ScriptedBackend {
    pub fn new(script: Script, journal: Arc<Journal>) -> Self {
        Self { script, journal }
    }
}

impl Backend for ScriptedBackend {
    type Demuxer = ScriptedDemuxer;
    type Codec = ScriptedCodec;
    type Sink = RecordingSink;

    fn open_demuxer(&self, source: &MediaSource, _opts: &Opts) -> Result<Self::Demuxer> {
        if self.script.source_unavailable {
            return Err(Error::SourceUnavailable {
                source_id: source.to_string(),
                reason: "scripted".into(),
            });
        }
        self.journal.record(Event::DemuxerOpened);
        Ok(ScriptedDemuxer {
            script: self.script.clone(),
            journal: self.journal.clone(),
            selected: None,
            cursor: 0,
        })
    }

    fn create_codec(&self, mime: &str) -> Result<Self::Codec> {
        if self.script.unsupported_mime {
            return Err(Error::UnsupportedTrackFormat { mime: mime.into() });
        }
        self.journal.record(Event::CodecCreated(mime.into()));
        Ok(ScriptedCodec::new(self.script.clone(), self.journal.clone()))
    }

    fn create_sink(&self, config: &SinkConfig, _opts: &Opts) -> Result<Self::Sink> {
        self.journal.record(Event::SinkCreated(config.sample_rate_hz));
        Ok(RecordingSink {
            journal: self.journal.clone(),
            fail_write_after: self.script.fail_sink_write_after,
            fail_release: self.script.fail_sink_release,
            playing: false,
            writes: 0,
        })
    }
}

pub struct ScriptedDemuxer {
    script: Script,
    journal: Arc<Journal>,
    selected: Option<usize>,
    cursor: usize,
}

impl Demuxer for ScriptedDemuxer {
    fn track_count(&self) -> usize {
        self.script.tracks.len()
    }

    fn track_format(&self, index: usize) -> Result<TrackFormat> {
        self.script
            .tracks
            .get(index)
            .cloned()
            .ok_or_else(|| Error::Message(format!("no track {index}")))
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        self.selected = Some(index);
        self.journal.record(Event::TrackSelected(index));
        Ok(())
    }

    fn read_sample_data(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some((pts, size)) = self.script.samples.get(self.cursor).copied() else {
            return Ok(None);
        };
        buf[..size].fill((self.cursor % 251) as u8);
        self.journal.record(Event::SamplePulled(pts));
        Ok(Some(size))
    }

    fn sample_time_us(&self) -> Option<i64> {
        self.script.samples.get(self.cursor).map(|(pts, _)| *pts)
    }

    fn advance(&mut self) -> Result<bool> {
        if self.cursor < self.script.samples.len() {
            self.cursor += 1;
        }
        Ok(self.cursor < self.script.samples.len())
    }

    fn release(&mut self) -> Result<()> {
        self.journal.record(Event::DemuxerReleased);
        if self.script.fail_demuxer_release {
            return Err(Error::Message("demuxer release failed".into()));
        }
        Ok(())
    }
}

enum Pending {
    Data { bytes: usize, pts: i64, eos: bool },
    FormatChanged(u32),
    BuffersChanged,
}

/// Synchronous decoder: every queued input immediately yields one output of the same size.
pub struct ScriptedCodec {
    script: Script,
    journal: Arc<Journal>,
    inputs: Vec<SlotMemory>,
    outputs: Vec<SlotMemory>,
    free_inputs: VecDeque<usize>,
    free_outputs: VecDeque<usize>,
    held_outputs: BTreeSet<usize>,
    pending: VecDeque<Pending>,
    format: TrackFormat,
    data_outputs: usize,
    eos_polls: usize,
}

impl ScriptedCodec {
    fn new(script: Script, journal: Arc<Journal>) -> Self {
        Self {
            script,
            journal,
            inputs: allocate_slots(2, SLOT_BYTES),
            outputs: allocate_slots(2, SLOT_BYTES),
            free_inputs: (0..2).collect(),
            free_outputs: (0..2).collect(),
            held_outputs: BTreeSet::new(),
            pending: VecDeque::new(),
            format: TrackFormat::default(),
            data_outputs: 0,
            eos_polls: 0,
        }
    }

    fn violation(&self, what: String) -> Error {
        self.journal.record(Event::Violation(what.clone()));
        Error::Message(what)
    }
}

impl Codec for ScriptedCodec {
    fn configure(&mut self, format: &TrackFormat) -> Result<()> {
        self.format = format.clone();
        self.journal.record(Event::CodecConfigured);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.journal.record(Event::CodecStarted);
        Ok(())
    }

    fn input_buffers(&self) -> Result<Vec<SlotMemory>> {
        Ok(self.inputs.clone())
    }

    fn output_buffers(&self) -> Result<Vec<SlotMemory>> {
        Ok(self.outputs.clone())
    }

    fn dequeue_input_buffer(&mut self, timeout: Duration) -> Result<Option<usize>> {
        match self.free_inputs.pop_front() {
            Some(index) => Ok(Some(index)),
            None => {
                self.journal.clock().sleep(timeout);
                Ok(None)
            }
        }
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        _offset: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        if self.free_inputs.contains(&index) {
            return Err(self.violation(format!("input slot {index} queued while free")));
        }
        self.journal.record(Event::InputQueued {
            size,
            pts: presentation_time_us,
            eos: flags.end_of_stream,
        });
        self.free_inputs.push_back(index);
        self.pending.push_back(Pending::Data {
            bytes: size,
            pts: presentation_time_us,
            eos: flags.end_of_stream,
        });
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, timeout: Duration) -> Result<DequeueOutput> {
        if self
            .script
            .fail_output_dequeue_after
            .is_some_and(|limit| self.data_outputs >= limit)
        {
            return Err(Error::Decoder("scripted dequeue failure".into()));
        }

        let ready = match self.pending.front() {
            Some(Pending::Data { eos: true, .. }) if self.eos_polls < self.script.eos_delay_polls => {
                self.eos_polls += 1;
                false
            }
            Some(Pending::Data { .. }) => !self.free_outputs.is_empty(),
            Some(_) => true,
            None => false,
        };
        if !ready {
            self.journal.clock().sleep(timeout);
            return Ok(DequeueOutput::TryAgainLater);
        }

        match self.pending.pop_front() {
            Some(Pending::Data { bytes, pts, eos }) => {
                let Some(index) = self.free_outputs.pop_front() else {
                    return Ok(DequeueOutput::TryAgainLater);
                };
                if let Ok(mut slot) = self.outputs[index].lock() {
                    slot[..bytes].fill(0x11);
                }
                self.held_outputs.insert(index);
                self.journal.record(Event::OutputDequeued(index));

                if !eos {
                    self.data_outputs += 1;
                    if self.data_outputs == 1 {
                        if let Some(rate) = self.script.format_change_after_first_output {
                            self.pending.push_front(Pending::FormatChanged(rate));
                        }
                        if self.script.buffers_change_after_first_output {
                            self.pending.push_front(Pending::BuffersChanged);
                        }
                    }
                }

                let flags = if eos {
                    BufferFlags::END_OF_STREAM
                } else {
                    BufferFlags::NONE
                };
                Ok(DequeueOutput::Buffer {
                    index,
                    info: BufferInfo {
                        offset: 0,
                        size: bytes,
                        presentation_time_us: pts,
                        flags,
                    },
                })
            }
            Some(Pending::FormatChanged(rate)) => {
                self.format.sample_rate = Some(rate);
                Ok(DequeueOutput::OutputFormatChanged)
            }
            Some(Pending::BuffersChanged) => {
                if !self.held_outputs.is_empty() {
                    self.pending.push_front(Pending::BuffersChanged);
                    return Ok(DequeueOutput::TryAgainLater);
                }
                self.outputs = allocate_slots(2, SLOT_BYTES * 2);
                Ok(DequeueOutput::OutputBuffersChanged)
            }
            None => Ok(DequeueOutput::TryAgainLater),
        }
    }

    fn output_format(&self) -> Result<TrackFormat> {
        Ok(self.format.clone())
    }

    fn release_output_buffer(&mut self, index: usize, _render: bool) -> Result<()> {
        if !self.held_outputs.remove(&index) {
            return Err(self.violation(format!("output slot {index} released while not held")));
        }
        self.journal.record(Event::OutputReleased(index));
        self.free_outputs.push_back(index);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.journal.record(Event::CodecStopped);
        if self.script.fail_decoder_stop {
            return Err(Error::Message("decoder stop failed".into()));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.journal.record(Event::CodecReleased);
        if self.script.fail_decoder_release {
            return Err(Error::Message("decoder release failed".into()));
        }
        Ok(())
    }
}

pub struct RecordingSink {
    journal: Arc<Journal>,
    fail_write_after: Option<usize>,
    fail_release: bool,
    playing: bool,
    writes: usize,
}

impl AudioSink for RecordingSink {
    fn play(&mut self) -> Result<()> {
        self.playing = true;
        self.journal.record(Event::SinkPlaying);
        Ok(())
    }

    fn set_playback_rate(&mut self, sample_rate_hz: u32) -> Result<()> {
        self.journal.record(Event::SinkRate(sample_rate_hz));
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        if !self.playing {
            self.journal
                .record(Event::Violation("sink written before play".into()));
        }
        if self.fail_write_after.is_some_and(|limit| self.writes >= limit) {
            return Err(Error::Sink("scripted write failure".into()));
        }
        self.writes += 1;
        self.journal.record(Event::SinkWrite(pcm.len()));
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.journal.record(Event::SinkReleased);
        if self.fail_release {
            return Err(Error::Message("sink release failed".into()));
        }
        Ok(())
    }
}
