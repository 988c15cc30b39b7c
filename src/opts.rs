use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Options that control how a playback session runs.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// The CLI is responsible for mapping user input into this type so that:
/// - the library remains reusable outside of a CLI context
/// - other frontends (services, tests) can construct options programmatically
///
/// Every field has a default, so a JSON config file only needs the keys it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Opts {
    /// Wait budget for every decoder slot acquire call, in milliseconds.
    pub poll_timeout_ms: u64,

    /// Sleep slice used by the pacer while waiting for wall-clock time to catch up.
    pub pacer_slice_ms: u64,

    /// Optional container hint (e.g. "mp3", "m4a", "ogg") for probing.
    /// When `None`, the source's file extension is used.
    pub hint_extension: Option<String>,

    /// Lower bound on the device sink's ring buffer, in milliseconds of audio.
    pub min_sink_buffer_ms: u64,

    /// Output device name for the device sink. `None` selects the default device.
    pub device_name: Option<String>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 10,
            pacer_slice_ms: 10,
            hint_extension: None,
            min_sink_buffer_ms: 250,
            device_name: None,
        }
    }
}

impl Opts {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn pacer_slice(&self) -> Duration {
        Duration::from_millis(self.pacer_slice_ms.max(1))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_polling_budget() {
        let opts = Opts::default();
        assert_eq!(opts.poll_timeout(), Duration::from_millis(10));
        assert_eq!(opts.pacer_slice(), Duration::from_millis(10));
    }

    #[test]
    fn partial_json_keeps_defaults() -> anyhow::Result<()> {
        let opts = Opts::from_json_str(r#"{ "poll_timeout_ms": 5, "hint_extension": "mp3" }"#)?;
        assert_eq!(opts.poll_timeout_ms, 5);
        assert_eq!(opts.hint_extension.as_deref(), Some("mp3"));
        assert_eq!(opts.pacer_slice_ms, 10);
        assert_eq!(opts.min_sink_buffer_ms, 250);
        Ok(())
    }

    #[test]
    fn zero_pacer_slice_is_clamped() {
        let opts = Opts {
            pacer_slice_ms: 0,
            ..Opts::default()
        };
        assert_eq!(opts.pacer_slice(), Duration::from_millis(1));
    }

    #[test]
    fn loads_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("opts.json");
        std::fs::write(&path, r#"{ "device_name": "Speakers" }"#)?;

        let opts = Opts::from_json_file(&path)?;
        assert_eq!(opts.device_name.as_deref(), Some("Speakers"));
        Ok(())
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Opts::from_json_str("{ not json").is_err());
    }
}
