use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Install the JSON subscriber used by `playout-cli`.
///
/// Events go to stderr so stdout stays free for the playback report. Every event carries the
/// `play`/`playback` span with the session id. `info` covers lifecycle transitions and the
/// loop summary, `debug` adds state changes, decoder slot growth and each teardown step.
/// Only errors are shown unless `PLAYOUT_LOG` says otherwise (e.g. `PLAYOUT_LOG=playout=debug`).
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var("PLAYOUT_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::ERROR.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}
