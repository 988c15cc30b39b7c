//! Ordered, failure-isolated release of a session's collaborators.
//!
//! Order: stop decoder, release decoder, release demuxer, release sink. Every step runs exactly
//! once, whatever happened to the steps before it; an error or panic in one step is recorded and
//! the next step still runs. Nothing is retried.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde::Serialize;

use crate::codec::Codec;
use crate::demux::Demuxer;
use crate::error::Result;
use crate::sink::AudioSink;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownStep {
    pub name: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|step| step.error.is_none())
    }

    /// `"<step>: <error>"` for every failed step, in order.
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|step| {
                step.error
                    .as_ref()
                    .map(|err| format!("{}: {err}", step.name))
            })
            .collect()
    }

    fn attempt(&mut self, name: &'static str, step: impl FnOnce() -> Result<()>) {
        let error = match catch_unwind(AssertUnwindSafe(step)) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(_) => Some("panicked".to_string()),
        };

        match &error {
            Some(err) => tracing::warn!(step = name, error = %err, "teardown step failed"),
            None => tracing::debug!(step = name, "teardown step done"),
        }
        self.steps.push(TeardownStep { name, error });
    }
}

/// Release whichever collaborators a session acquired.
///
/// `None` means the collaborator was never created, so its steps are skipped.
pub fn teardown(
    codec: Option<&mut dyn Codec>,
    demuxer: Option<&mut dyn Demuxer>,
    sink: Option<&mut dyn AudioSink>,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    if let Some(codec) = codec {
        report.attempt("decoder.stop", || codec.stop());
        report.attempt("decoder.release", || codec.release());
    }
    if let Some(demuxer) = demuxer {
        report.attempt("demuxer.release", || demuxer.release());
    }
    if let Some(sink) = sink {
        report.attempt("sink.release", || sink.release());
    }

    report
}
