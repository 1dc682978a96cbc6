//! # Telemetry
//!
//! Structured logging setup.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - Show debug messages (reads, replays)
//! - `RUST_LOG=ombor_ledger=trace` - Trace for the ledger crate only
//! - Default: whatever `[logging] filter` says, `info` out of the box

use tracing_subscriber::EnvFilter;

use crate::config::LogSettings;

/// Installs the global tracing subscriber.
///
/// Returns `false` if a subscriber was already installed (tests, embedding
/// applications), in which case the existing one is kept.
pub fn init_tracing(settings: &LogSettings) -> bool {
    let filter = build_filter(&settings.filter, std::env::var("RUST_LOG").ok());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// `RUST_LOG` first, then the configured directive, then plain `info`.
fn build_filter(configured: &str, from_env: Option<String>) -> EnvFilter {
    from_env
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
