//! `playout`: decode a single audio file and render it to a sink in real time.
//!
//! This crate provides:
//! - Track selection and sink configuration from container metadata
//! - A slot-based decoder adapter with explicit output events
//! - A wall-clock pacer that keeps compressed input in step with playback time
//! - The decode/playback loop and a lifecycle controller (`Player`) that owns teardown
//!
//! Demuxing, decoding and rendering sit behind collaborator traits (`Demuxer`, `Codec`,
//! `AudioSink`) produced by a pluggable `Backend`. The built-in backends use Symphonia for
//! demux/decode and render into a WAV file or, with `device-output`, to an audio device.

mod error;
pub use error::{Error, Result};

// High-level API (most consumers should start here).
pub mod opts;
pub mod player;

// Collaborator interfaces and the backend that produces them.
pub mod backend;
pub mod codec;
pub mod demux;
pub mod format;
pub mod sink;

// Playback core.
pub mod buffer_pool;
pub mod clock;
pub mod pacer;
pub mod playback_loop;
pub mod state;
pub mod stop;
pub mod teardown;
pub mod track;

// Built-in backends.
pub mod backends;

// Logging configuration and control.
#[cfg(feature = "logging")]
pub mod logging;

pub use player::{PlaybackReport, Player, StopHandle};
