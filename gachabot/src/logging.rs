//! Diagnostic tracing for the bot.
//!
//! Tracing is for operators watching the process: route choices, abandoned
//! attempts, substitutions and recovery steps, all on stderr. Product output
//! is the notification stream (`io/notify`), which does not depend on
//! `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `info` if unset, since an unattended bot
/// should leave a trail of what it did.
///
/// # Example
/// ```bash
/// RUST_LOG=gachabot=debug gachabot run --max-ticks 20
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
