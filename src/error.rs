//! Crate-wide error type
//!
//! Generalizes a hand-rolled `Error`/`Status` pair built for `no_std` onto
//! `thiserror`, now that this crate is hosted.

use thiserror::Error;

/// Result type for fallible `recsched` operations.
pub type Result<T = ()> = std::result::Result<T, Error>;

/// Everything that can go wrong while driving a scheduled run.
///
/// Invariant violations (§7 kind 2) and selector failures (§7 kind 3) are not
/// represented here: the task pool/registry enforce their preconditions with
/// `assert!`/`.expect(...)` (matching the original's own precondition
/// checks), and the scheduler carries selector/scheduling failures as
/// `RunStatus::Error(String)`/`Selection::Error(String)`, which are part of a
/// run's terminal trace rather than a `Result` a caller recovers from.
#[derive(Debug, Error)]
pub enum Error {
    /// A `schedules/*.txt` file could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure while reading configuration or writing the trace.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
