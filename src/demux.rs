//! Demuxer collaborator interface.
//!
//! A demuxer extracts elementary-stream samples from a container. It keeps a cursor on the
//! "current sample" of the selected track: `read_sample_data` copies it out, `sample_time_us`
//! reports its timestamp, and `advance` moves the cursor forward.

use crate::error::Result;
use crate::format::TrackFormat;

pub trait Demuxer: Send {
    /// Number of tracks in the container, in the container's native order.
    fn track_count(&self) -> usize;

    /// Metadata for track `index`.
    fn track_format(&self, index: usize) -> Result<TrackFormat>;

    /// Make `index` the track whose samples are returned.
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Copy the current sample into `buf`.
    ///
    /// Returns `Ok(None)` once the selected track has no more data.
    fn read_sample_data(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Presentation timestamp of the current sample, in microseconds.
    fn sample_time_us(&self) -> Option<i64>;

    /// Move to the next sample. Returns `false` when the track is exhausted.
    fn advance(&mut self) -> Result<bool>;

    /// Release the container. Called exactly once, during teardown.
    fn release(&mut self) -> Result<()>;
}
