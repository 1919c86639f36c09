//! Scheduling strategy (§4.4)
//!
//! Grounded on `original_source::strategies::non_preemptive.cpp` for the
//! baseline "stick with the running thread" policy, and the surrounding
//! `strategies/` directory for the schedule-directed variant. Expressed as a
//! small trait rather than the original's virtual base class, the way
//! `kernel::sched::mod.rs` picks the next runnable thread behind a plain
//! function instead of a polymorphic scheduler class.

use std::collections::HashSet;

use crate::thread_record::ThreadId;

/// Outcome of one selection round (§4.4/§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Grant the execution right to this thread.
    Run(ThreadId),
    /// No enabled thread and at least one unfinished thread: a deadlock.
    Deadlock,
    /// No enabled thread and every thread finished: a clean end of run.
    Done,
    /// A schedule-directed strategy's next directive names a thread that is
    /// not currently enabled.
    Error(String),
}

/// Chooses the next thread to run given the current enabled set.
pub trait Selector: Send {
    fn select(&mut self, enabled: &HashSet<ThreadId>, all_finished: bool) -> Selection;
}

/// §4.4 baseline strategy: continue running the current thread if it is
/// still enabled; otherwise pick the smallest enabled tid. Terminal on an
/// empty enabled set (DEADLOCK if threads remain, DONE if all finished).
#[derive(Debug, Default)]
pub struct NonPreemptive {
    current: Option<ThreadId>,
}

impl NonPreemptive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Selector for NonPreemptive {
    fn select(&mut self, enabled: &HashSet<ThreadId>, all_finished: bool) -> Selection {
        if let Some(tid) = self.current {
            if enabled.contains(&tid) {
                return Selection::Run(tid);
            }
        }

        match enabled.iter().min().copied() {
            Some(tid) => {
                self.current = Some(tid);
                Selection::Run(tid)
            }
            None if all_finished => Selection::Done,
            None => Selection::Deadlock,
        }
    }
}

/// §4.4 schedule-directed strategy: follows a fixed sequence of tids,
/// erroring if the directed thread is not enabled when its turn comes, and
/// falling back permanently to [`NonPreemptive`] once the sequence is
/// exhausted.
pub struct ScheduleDirected {
    remaining: std::collections::VecDeque<ThreadId>,
    fallback: NonPreemptive,
}

impl ScheduleDirected {
    pub fn new(schedule: Vec<ThreadId>) -> Self {
        Self {
            remaining: schedule.into(),
            fallback: NonPreemptive::new(),
        }
    }
}

impl Selector for ScheduleDirected {
    fn select(&mut self, enabled: &HashSet<ThreadId>, all_finished: bool) -> Selection {
        let Some(&tid) = self.remaining.front() else {
            return self.fallback.select(enabled, all_finished);
        };

        if !enabled.contains(&tid) {
            return Selection::Error(format!(
                "schedule directed thread {tid} but it is not enabled"
            ));
        }

        self.remaining.pop_front();
        self.fallback.current = Some(tid);
        Selection::Run(tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tids: &[ThreadId]) -> HashSet<ThreadId> {
        tids.iter().copied().collect()
    }

    #[test]
    fn non_preemptive_sticks_with_current_thread() {
        let mut selector = NonPreemptive::new();
        assert_eq!(selector.select(&set(&[0, 1]), false), Selection::Run(0));
        assert_eq!(selector.select(&set(&[0, 1]), false), Selection::Run(0));
    }

    #[test]
    fn non_preemptive_switches_when_current_disabled() {
        let mut selector = NonPreemptive::new();
        assert_eq!(selector.select(&set(&[0, 1]), false), Selection::Run(0));
        assert_eq!(selector.select(&set(&[1]), false), Selection::Run(1));
    }

    #[test]
    fn non_preemptive_empty_enabled_with_unfinished_threads_deadlocks() {
        let mut selector = NonPreemptive::new();
        assert_eq!(selector.select(&set(&[]), false), Selection::Deadlock);
    }

    #[test]
    fn non_preemptive_empty_enabled_all_finished_is_done() {
        let mut selector = NonPreemptive::new();
        assert_eq!(selector.select(&set(&[]), true), Selection::Done);
    }

    #[test]
    fn schedule_directed_follows_sequence_then_falls_back() {
        let mut selector = ScheduleDirected::new(vec![1, 0]);
        assert_eq!(selector.select(&set(&[0, 1]), false), Selection::Run(1));
        assert_eq!(selector.select(&set(&[0, 1]), false), Selection::Run(0));
        // Schedule exhausted: falls back to NonPreemptive (stick with 0).
        assert_eq!(selector.select(&set(&[0, 1]), false), Selection::Run(0));
    }

    #[test]
    fn schedule_directed_errors_on_mismatch() {
        let mut selector = ScheduleDirected::new(vec![1]);
        let result = selector.select(&set(&[0]), false);
        assert!(matches!(result, Selection::Error(_)));
    }
}
