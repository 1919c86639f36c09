//! Configuration
//!
//! Reads the three plain-text input files §6 lists under
//! `schedules/`: a schedule (an ordered list of tids), the expected thread
//! count, and the strategy tag. Parsing these files is deliberately
//! uninteresting — §1 calls config-file parsing out of scope for the
//! core, so this module stays a thin, boring reader.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::thread_record::ThreadId;

/// Which [`crate::selector::Selector`] implementation the scheduler should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyTag {
    /// §4.4 baseline strategy.
    NonPreemptive,
    /// §4.4 schedule-directed strategy, falling back to non-preemptive once
    /// the schedule is exhausted.
    ScheduleDirected,
}

impl Default for StrategyTag {
    fn default() -> Self {
        StrategyTag::NonPreemptive
    }
}

/// Parsed contents of `schedules/{schedule,threads,settings}.txt`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Directive sequence for [`StrategyTag::ScheduleDirected`]; may be empty.
    pub schedule: Vec<ThreadId>,
    /// Number of threads the supervisor waits for during registration (§4.5.2).
    pub thread_count: usize,
    /// Selector strategy tag.
    pub strategy: StrategyTag,
}

impl Settings {
    /// Read `schedule.txt`, `threads.txt`, and `settings.txt` from `dir`.
    ///
    /// A missing `schedule.txt` is treated as an empty (free-choice) schedule
    /// (§3 "may be empty"); a missing or unrecognised `settings.txt`
    /// falls back to [`StrategyTag::NonPreemptive`]. `threads.txt` must exist
    /// and contain a single non-negative integer.
    pub fn read_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let schedule = read_schedule(&dir.join("schedule.txt"))?;
        let thread_count = read_thread_count(&dir.join("threads.txt"))?;
        let strategy = read_strategy(&dir.join("settings.txt"));

        Ok(Self {
            schedule,
            thread_count,
            strategy,
        })
    }

    /// Convenience for the crate's default layout, `schedules/` relative to
    /// the current working directory.
    pub fn read_default() -> Result<Self> {
        Self::read_from_dir(default_dir())
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("schedules")
}

fn read_schedule(path: &Path) -> Result<Vec<ThreadId>> {
    let Ok(contents) = fs::read_to_string(path) else {
        return Ok(Vec::new());
    };
    contents
        .split_whitespace()
        .map(|tok| {
            tok.parse::<ThreadId>()
                .map_err(|_| Error::Config(format!("invalid tid in schedule.txt: {tok:?}")))
        })
        .collect()
}

fn read_thread_count(path: &Path) -> Result<usize> {
    let contents = fs::read_to_string(path)?;
    contents
        .trim()
        .parse::<usize>()
        .map_err(|_| Error::Config(format!("threads.txt must contain a single integer, found {contents:?}")))
}

fn read_strategy(path: &Path) -> StrategyTag {
    let Ok(contents) = fs::read_to_string(path) else {
        return StrategyTag::default();
    };
    match contents.trim() {
        "schedule_directed" => StrategyTag::ScheduleDirected,
        "non_preemptive" => StrategyTag::NonPreemptive,
        _ => StrategyTag::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn reads_complete_settings() {
        let dir = tempdir();
        write_file(&dir, "schedule.txt", "0 0 1 1 0\n");
        write_file(&dir, "threads.txt", "2\n");
        write_file(&dir, "settings.txt", "schedule_directed\n");

        let settings = Settings::read_from_dir(&dir).unwrap();
        assert_eq!(settings.schedule, vec![0, 0, 1, 1, 0]);
        assert_eq!(settings.thread_count, 2);
        assert_eq!(settings.strategy, StrategyTag::ScheduleDirected);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_schedule_is_empty_and_unknown_strategy_falls_back() {
        let dir = tempdir();
        write_file(&dir, "threads.txt", "3\n");
        write_file(&dir, "settings.txt", "bogus\n");

        let settings = Settings::read_from_dir(&dir).unwrap();
        assert!(settings.schedule.is_empty());
        assert_eq!(settings.strategy, StrategyTag::NonPreemptive);

        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_thread_count_is_an_error() {
        let dir = tempdir();
        let result = Settings::read_from_dir(&dir);
        assert!(result.is_err());
        fs::remove_dir_all(dir).ok();
    }

    fn tempdir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "recsched-config-test-{}-{}",
            std::process::id(),
            std::ptr::addr_of!(path) as usize
        ));
        fs::create_dir_all(&path).unwrap();
        path
    }
}
