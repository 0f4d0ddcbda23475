//! Tracing initialisation for the litkernel binary.
//!
//! [`init_tracing`] installs the global subscriber. The filter comes from
//! `LITKERNEL_LOG`, then `RUST_LOG`, then [`default_directives`]: the
//! pipeline crates log at the requested level while HTTP and PDF internals
//! stay at `warn`. Closing a pipeline or stage span logs its duration.
//!
//! Later calls are ignored; the global subscriber can only be set once per
//! process.

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "LITKERNEL_LOG";

const PIPELINE_TARGETS: [&str; 3] = ["litkernel", "litkernel_core", "litkernel_store"];

/// Filter directives used when neither [`LOG_ENV`] nor `RUST_LOG` is set.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(PIPELINE_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines, with the enclosing
///   pipeline span's document and run id on every line.
/// * `level`: verbosity of the pipeline crates when no env filter is set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);

    // stderr keeps stdout free for command output (`patch`, `status`).
    let layer = fmt::layer()
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json().with_current_span(true).with_span_list(false))
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
