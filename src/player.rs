//! Lifecycle controller for one playback session.
//!
//! `Player::play` runs setup synchronously on the caller's thread (open demuxer, select track,
//! build sink, create/configure/start decoder, start sink) and then moves every collaborator
//! onto a dedicated playback thread. That thread owns all decoder slot state, runs the loop,
//! and performs teardown exactly once when the loop exits for any reason.
//!
//! The only state shared with the caller is the stop flag and the state cell.

use std::sync::{Arc, mpsc};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::backend::Backend;
use crate::buffer_pool::BufferPool;
use crate::clock::{Clock, SystemClock};
use crate::codec::Codec;
use crate::demux::Demuxer;
use crate::error::{Error, Result};
use crate::format::MediaSource;
use crate::opts::Opts;
use crate::pacer::Pacer;
use crate::playback_loop::{LoopExit, LoopStats, PlaybackLoop};
use crate::sink::AudioSink;
use crate::state::{PlaybackState, StateCell};
use crate::stop::StopSignal;
use crate::teardown::{TeardownReport, teardown};
use crate::track::{TrackDescriptor, create_sink_for, select_audio_track};

/// Summary of a finished session, returned by [`Player::wait`].
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackReport {
    pub session_id: String,
    pub track: TrackDescriptor,
    pub exit: LoopExit,
    pub stats: LoopStats,
    pub teardown: TeardownReport,
}

/// Cloneable handle that can request a stop from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: StopSignal,
    state: Arc<StateCell>,
}

impl StopHandle {
    /// Ask the playback loop to exit at its next tick boundary. Does not wait for it.
    ///
    /// A no-op unless the session is decoding.
    pub fn stop(&self) {
        if self.state.get() != PlaybackState::Decoding {
            tracing::debug!(state = ?self.state.get(), "stop ignored");
            return;
        }
        self.stop.raise();
        if self.state.try_advance(PlaybackState::Decoding) {
            tracing::info!("stop requested");
        }
    }
}

/// A single-use playback session.
pub struct Player<B: Backend> {
    backend: B,
    opts: Opts,
    clock: Arc<dyn Clock>,
    session_id: Uuid,
    state: Arc<StateCell>,
    stop: StopSignal,
    handle: Option<JoinHandle<Result<PlaybackReport>>>,
}

impl<B: Backend> Player<B> {
    pub fn new(backend: B, opts: Opts) -> Self {
        Self {
            backend,
            opts,
            clock: Arc::new(SystemClock::new()),
            session_id: Uuid::new_v4(),
            state: Arc::new(StateCell::new()),
            stop: StopSignal::new(),
            handle: None,
        }
    }

    /// Replace the wall clock the pacer measures against.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.stop.clone(),
            state: self.state.clone(),
        }
    }

    /// Request the playback loop to stop. Returns immediately.
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Set up the session and start the playback thread.
    ///
    /// Setup failures (`SourceUnavailable`, `NoAudioTrackFound`, `UnsupportedTrackFormat`,
    /// `SinkConfigurationFailed`) are returned here, after releasing whatever was already
    /// acquired.
    pub fn play(&mut self, source: impl Into<MediaSource>) -> Result<()> {
        let source = source.into();
        let current = self.state.get();
        if current != PlaybackState::Unconfigured {
            return Err(Error::InvalidState {
                from: current,
                to: PlaybackState::Configured,
            });
        }

        let span = tracing::info_span!("play", session = %self.session_id, source = %source);
        let _guard = span.enter();

        let mut demuxer = self.backend.open_demuxer(&source, &self.opts)?;

        let track = match select_audio_track(&mut demuxer) {
            Ok(track) => track,
            Err(err) => return Err(abort_setup::<B>(err, None, Some(&mut demuxer), None)),
        };
        if let Err(err) = self.state.advance(PlaybackState::Unconfigured) {
            return Err(abort_setup::<B>(err, None, Some(&mut demuxer), None));
        }

        let mut sink = match create_sink_for(&self.backend, &track, &self.opts) {
            Ok(sink) => sink,
            Err(err) => return Err(abort_setup::<B>(err, None, Some(&mut demuxer), None)),
        };

        let mut codec = match self.start_decoding(&track, &mut sink) {
            Ok(codec) => codec,
            Err((err, mut codec)) => {
                return Err(abort_setup::<B>(
                    err,
                    codec.as_mut(),
                    Some(&mut demuxer),
                    Some(&mut sink),
                ));
            }
        };

        if let Err(err) = self.state.advance(PlaybackState::Configured) {
            return Err(abort_setup::<B>(
                err,
                Some(&mut codec),
                Some(&mut demuxer),
                Some(&mut sink),
            ));
        }

        let session = Session {
            session_id: self.session_id,
            track,
            codec,
            demuxer,
            sink,
            pacer: Pacer::new(self.clock.clone(), self.opts.pacer_slice()),
            poll_timeout: self.opts.poll_timeout(),
            stop: self.stop.clone(),
            state: self.state.clone(),
        };

        match launch(session, spawn_loop_thread) {
            Ok(handle) => self.handle = Some(handle),
            Err((err, session)) => return Err(session.abandon(err)),
        }

        tracing::info!("playback started");
        Ok(())
    }

    /// Block until the playback thread finished and teardown ran.
    pub fn wait(&mut self) -> Result<PlaybackReport> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::msg("no playback thread to wait for"))?;

        handle
            .join()
            .map_err(|_| Error::msg("playback thread panicked"))?
    }

    /// Create, configure and start the decoder, then start the sink.
    ///
    /// On failure the codec (if one was created) is handed back so the caller can release it.
    #[allow(clippy::type_complexity)]
    fn start_decoding(
        &self,
        track: &TrackDescriptor,
        sink: &mut B::Sink,
    ) -> std::result::Result<B::Codec, (Error, Option<B::Codec>)> {
        let mut codec = self
            .backend
            .create_codec(&track.mime)
            .map_err(|err| (err, None))?;

        let started = codec
            .configure(&track.format)
            .and_then(|()| codec.start())
            .and_then(|()| sink.play());

        match started {
            Ok(()) => Ok(codec),
            Err(err) => Err((err, Some(codec))),
        }
    }
}

impl<B: Backend> Drop for Player<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop.raise();
            let _ = handle.join();
        }
    }
}

/// Release the collaborators a failed `play()` acquired and return the setup error.
fn abort_setup<B: Backend>(
    err: Error,
    codec: Option<&mut B::Codec>,
    demuxer: Option<&mut B::Demuxer>,
    sink: Option<&mut B::Sink>,
) -> Error {
    tracing::error!(error = %err, "playback setup failed");

    let report = teardown(
        codec.map(|c| c as &mut dyn Codec),
        demuxer.map(|d| d as &mut dyn Demuxer),
        sink.map(|s| s as &mut dyn AudioSink),
    );
    if !report.is_clean() {
        tracing::warn!(failures = ?report.failures(), "release after failed setup was not clean");
    }
    err
}

type SessionThread = JoinHandle<Result<PlaybackReport>>;
type SessionBody = Box<dyn FnOnce() -> Result<PlaybackReport> + Send>;

fn spawn_loop_thread(body: SessionBody) -> std::io::Result<SessionThread> {
    std::thread::Builder::new()
        .name("playout-loop".to_string())
        .spawn(body)
}

/// Start `session` on a thread made by `spawn`.
///
/// The session only moves to the thread once it exists; otherwise it is handed back with the
/// error so the caller can release it.
#[allow(clippy::type_complexity)]
fn launch<C, D, S>(
    session: Session<C, D, S>,
    spawn: impl FnOnce(SessionBody) -> std::io::Result<SessionThread>,
) -> std::result::Result<SessionThread, (Error, Session<C, D, S>)>
where
    C: Codec + 'static,
    D: Demuxer + 'static,
    S: AudioSink + 'static,
{
    let (session_tx, session_rx) = mpsc::channel::<Session<C, D, S>>();
    let body: SessionBody = Box::new(move || match session_rx.recv() {
        Ok(session) => session.run(),
        Err(_) => Err(Error::msg("playback session was never handed over")),
    });

    let handle = match spawn(body) {
        Ok(handle) => handle,
        Err(err) => return Err((err.into(), session)),
    };
    match session_tx.send(session) {
        Ok(()) => Ok(handle),
        Err(mpsc::SendError(session)) => {
            let _ = handle.join();
            let err = Error::msg("playback thread exited before the session started");
            Err((err, session))
        }
    }
}

/// Everything the playback thread owns.
struct Session<C, D, S> {
    session_id: Uuid,
    track: TrackDescriptor,
    codec: C,
    demuxer: D,
    sink: S,
    pacer: Pacer,
    poll_timeout: Duration,
    stop: StopSignal,
    state: Arc<StateCell>,
}

impl<C, D, S> Session<C, D, S>
where
    C: Codec,
    D: Demuxer,
    S: AudioSink,
{
    /// Release a session whose thread never started and finish the lifecycle.
    fn abandon(mut self, err: Error) -> Error {
        tracing::error!(error = %err, "playback thread could not start");

        let report = teardown(
            Some(&mut self.codec),
            Some(&mut self.demuxer),
            Some(&mut self.sink),
        );
        if !report.is_clean() {
            tracing::warn!(
                failures = ?report.failures(),
                "release after failed start was not clean"
            );
        }
        self.state.try_advance(PlaybackState::Decoding);
        self.state.try_advance(PlaybackState::Stopping);
        err
    }

    fn run(self) -> Result<PlaybackReport> {
        let span = tracing::info_span!("playback", session = %self.session_id);
        let _guard = span.enter();

        let Session {
            session_id,
            track,
            codec,
            mut demuxer,
            mut sink,
            pacer,
            poll_timeout,
            stop,
            state,
        } = self;

        let mut pool = BufferPool::new(codec, poll_timeout);
        let outcome = match pool.load_slots() {
            Ok(()) => {
                let mut playback =
                    PlaybackLoop::new(&mut pool, &mut demuxer, &mut sink, pacer, stop);
                playback
                    .run()
                    .map(|exit| (exit, playback.stats().clone()))
            }
            Err(err) => Err(err),
        };
        let mut codec = pool.into_codec();

        // `stop()` may already have moved the state to `Stopping`.
        state.try_advance(PlaybackState::Decoding);

        let report = teardown(Some(&mut codec), Some(&mut demuxer), Some(&mut sink));
        state.try_advance(PlaybackState::Stopping);
        tracing::info!(clean = report.is_clean(), "teardown complete");

        match outcome {
            Ok((exit, stats)) if report.is_clean() => Ok(PlaybackReport {
                session_id: session_id.to_string(),
                track,
                exit,
                stats,
                teardown: report,
            }),
            Ok(_) => Err(Error::Teardown(report.failures())),
            Err(err) => {
                tracing::error!(error = %err, "playback loop failed");
                Err(err)
            }
        }
    }
}
