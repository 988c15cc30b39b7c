use crate::Result;
use crate::codec::Codec;
use crate::demux::Demuxer;
use crate::format::MediaSource;
use crate::opts::Opts;
use crate::sink::{AudioSink, SinkConfig};

/// Pluggable media backend used by [`crate::player::Player`].
///
/// A backend is the factory for the three external collaborators of a playback session. The
/// player calls each factory at most once per session, on the caller's thread, and then moves
/// the products onto the playback thread (hence the `'static` bounds).
///
/// Factories report the setup failures `play()` surfaces:
/// - `open_demuxer` → `SourceUnavailable`
/// - `create_codec` → `UnsupportedTrackFormat`
/// - `create_sink`  → `SinkConfigurationFailed`
pub trait Backend {
    type Demuxer: Demuxer + 'static;
    type Codec: Codec + 'static;
    type Sink: AudioSink + 'static;

    /// Open `source` for demuxing.
    fn open_demuxer(&self, source: &MediaSource, opts: &Opts) -> Result<Self::Demuxer>;

    /// Look up a decoder by MIME type. The codec is configured by the caller.
    fn create_codec(&self, mime: &str) -> Result<Self::Codec>;

    /// Construct (but do not start) a sink for `config`.
    fn create_sink(&self, config: &SinkConfig, opts: &Opts) -> Result<Self::Sink>;
}
