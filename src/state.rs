//! Playback session state machine.
//!
//! A session walks `Unconfigured → Configured → Decoding → Stopping → Stopped` exactly once.
//! The state is shared between the caller thread (`Player`) and the playback thread, so it
//! lives in an atomic cell and every transition is a compare-and-swap from the expected
//! predecessor.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum PlaybackState {
    Unconfigured,
    Configured,
    Decoding,
    Stopping,
    Stopped,
}

impl PlaybackState {
    /// The only state this one may move to, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Unconfigured => Some(Self::Configured),
            Self::Configured => Some(Self::Decoding),
            Self::Decoding => Some(Self::Stopping),
            Self::Stopping => Some(Self::Stopped),
            Self::Stopped => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Unconfigured => 0,
            Self::Configured => 1,
            Self::Decoding => 2,
            Self::Stopping => 3,
            Self::Stopped => 4,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unconfigured,
            1 => Self::Configured,
            2 => Self::Decoding,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Atomic holder for a [`PlaybackState`].
#[derive(Debug)]
pub struct StateCell {
    raw: AtomicU8,
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            raw: AtomicU8::new(PlaybackState::Unconfigured.to_u8()),
        }
    }

    pub fn get(&self) -> PlaybackState {
        PlaybackState::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Move from `from` to its successor.
    ///
    /// Fails with `InvalidState` if `from` has no successor or the cell no longer holds `from`
    /// (another actor won the race).
    pub fn advance(&self, from: PlaybackState) -> Result<PlaybackState> {
        let to = from.successor().ok_or(Error::InvalidState { from, to: from })?;

        self.raw
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|actual| Error::InvalidState {
                from: PlaybackState::from_u8(actual),
                to,
            })?;

        tracing::debug!(?from, ?to, "playback state transition");
        Ok(to)
    }

    /// Like [`StateCell::advance`], but a lost race is not an error.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn try_advance(&self, from: PlaybackState) -> bool {
        self.advance(from).is_ok()
    }
}
