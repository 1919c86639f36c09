//! Logging setup
//!
//! `kernel::lib::debug.rs` hand-rolls a `LogLevel` enum and a
//! `print_internal` that switches between early-boot and UART output
//! because a kernel has no hosted console. This crate has one, so this
//! module collapses to installing `env_logger` once and is otherwise a thin
//! wrapper around the `log` crate's `trace!`/`debug!`/`info!`/`warn!`/
//! `error!` macros used throughout the rest of the crate.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the global logger. Safe to call more than once (from multiple
/// test binaries, for instance) — only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_micros()
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
