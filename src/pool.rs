//! Task pool (§4.2)
//!
//! Mediates every external thread's interaction with the scheduler through a
//! single mutex (`pool_mutex`) and a single condition variable (`modified`),
//! exactly as `original_source::task_pool.cpp` does with `mMutex`/`mModified`.
//! `objects_mutex` is kept as its own lock around the [`Registry`], acquired
//! while `pool_mutex` is already held (§5 acquisition order), the
//! same nesting `TaskPool::post` uses when it calls `update_object_post`
//! without releasing `mMutex` first.

use std::collections::HashSet;
use std::time::Duration;

use fxhash::FxHashMap;
use parking_lot::{Condvar, Mutex};

use crate::instruction::VisibleInstruction;
use crate::registry::{PerformOutcome, Registry};
use crate::thread_record::{ThreadId, ThreadRecord, ThreadStatus};

/// An assertion failure reported by the instrumented program (§3, §7 kind 5).
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionFailure {
    pub tid: ThreadId,
    pub message: String,
    pub file: String,
    pub line: u32,
    pub expr: String,
}

/// A snapshot of (enabled set, pending task per thread) — §3
/// "Pre/post states are snapshots of (enabled set, pending task per thread)."
#[derive(Debug, Clone, Default)]
pub struct ProgramState {
    pub enabled: HashSet<ThreadId>,
    pub pending: FxHashMap<ThreadId, VisibleInstruction>,
}

struct Inner {
    threads: FxHashMap<ThreadId, ThreadRecord>,
    pending: FxHashMap<ThreadId, VisibleInstruction>,
    current: Option<VisibleInstruction>,
    assertion_failures: Vec<AssertionFailure>,
}

impl Inner {
    fn new() -> Self {
        Self {
            threads: FxHashMap::default(),
            pending: FxHashMap::default(),
            current: None,
            assertion_failures: Vec::new(),
        }
    }

    fn program_state(&self) -> ProgramState {
        let enabled = self
            .threads
            .values()
            .filter(|t| t.status == ThreadStatus::Enabled)
            .map(|t| t.tid)
            .collect();
        ProgramState {
            enabled,
            pending: self.pending.clone(),
        }
    }

    fn all_finished(&self) -> bool {
        self.threads.values().all(ThreadRecord::is_finished)
    }

    fn unfinished_have_posted(&self) -> bool {
        self.threads.values().all(|t| {
            t.is_finished()
                || self.pending.contains_key(&t.tid)
                || self
                    .assertion_failures
                    .iter()
                    .any(|failure| failure.tid == t.tid)
        })
    }
}

/// The task pool: pending tasks, per-thread status, and the `current_task`
/// single slot, all behind `pool_mutex` + `modified`.
pub struct Pool {
    inner: Mutex<Inner>,
    modified: Condvar,
    registry: Mutex<Registry>,
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Pool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::new()),
            modified: Condvar::new(),
            registry: Mutex::new(Registry::new()),
        }
    }

    /// §4.2 register_thread.
    pub fn register_thread(&self, tid: ThreadId) {
        let mut inner = self.inner.lock();
        inner.threads.insert(tid, ThreadRecord::new(tid));
        self.registry.lock().register_thread(tid);
    }

    /// §4.2 post. A thread may have at most one pending task at a time;
    /// enforced with an assertion, matching `task_pool.cpp::post`'s
    /// `assert(task_it == mTasks.end())`.
    pub fn post(&self, tid: ThreadId, task: VisibleInstruction) {
        let mut inner = self.inner.lock();
        assert!(
            !inner.pending.contains_key(&tid),
            "thread {tid} already has a pending task"
        );

        let enabled = self.registry.lock().request(task.clone());
        inner.pending.insert(tid, task);

        if let Some(thread) = inner.threads.get_mut(&tid) {
            thread.status = if enabled {
                ThreadStatus::Enabled
            } else {
                ThreadStatus::Disabled
            };
        }

        self.modified.notify_all();
    }

    /// §4.2 post_assertion_failure.
    pub fn post_assertion_failure(&self, tid: ThreadId, failure: AssertionFailure) {
        let mut inner = self.inner.lock();
        inner.assertion_failures.push(failure);
        if let Some(thread) = inner.threads.get_mut(&tid) {
            thread.status = ThreadStatus::Finished;
        }
        self.modified.notify_all();
    }

    /// §4.2 yield: finalizes the object state for the thread's current task
    /// via `Registry::perform`, updating any dependent waiters' statuses.
    pub fn yield_current(&self, tid: ThreadId) {
        let mut inner = self.inner.lock();
        let Some(current) = inner.current.clone() else {
            return;
        };
        if current.tid() != tid {
            return;
        }

        let outcome = self.registry.lock().perform(&current);
        if let PerformOutcome::Lock {
            waiting, acquired, ..
        } = outcome
        {
            let new_status = if acquired {
                ThreadStatus::Disabled
            } else {
                ThreadStatus::Enabled
            };
            for waiter in waiting {
                if let Some(thread) = inner.threads.get_mut(&waiter) {
                    thread.status = new_status;
                }
            }
        }
        self.modified.notify_all();
    }

    /// Removes and returns the oldest unreported assertion failure, if any
    /// (§7 kind 5: recorded as a terminal status, not a scheduler
    /// error).
    pub fn take_assertion_failure(&self) -> Option<AssertionFailure> {
        let mut inner = self.inner.lock();
        if inner.assertion_failures.is_empty() {
            None
        } else {
            Some(inner.assertion_failures.remove(0))
        }
    }

    /// §4.2 finish: marks `tid` FINISHED and enables any threads that had
    /// posted a Join targeting it.
    pub fn finish(&self, tid: ThreadId) {
        let mut inner = self.inner.lock();
        let woken = self.registry.lock().mark_finished(tid);
        if let Some(thread) = inner.threads.get_mut(&tid) {
            thread.status = ThreadStatus::Finished;
        }
        for waiter in woken {
            if let Some(thread) = inner.threads.get_mut(&waiter) {
                thread.status = ThreadStatus::Enabled;
            }
        }
        self.modified.notify_all();
    }

    /// §4.2 set_current: precondition is `pending[tid]` exists and the
    /// thread is Enabled.
    pub fn set_current(&self, tid: ThreadId) -> VisibleInstruction {
        let mut inner = self.inner.lock();
        assert_eq!(
            inner.threads.get(&tid).map(|t| t.status),
            Some(ThreadStatus::Enabled),
            "set_current precondition: thread {tid} must be Enabled"
        );
        let task = inner
            .pending
            .remove(&tid)
            .expect("set_current precondition: thread {tid} must have a pending task");
        inner.current = Some(task.clone());
        task
    }

    pub fn current_task(&self) -> Option<VisibleInstruction> {
        self.inner.lock().current.clone()
    }

    /// §4.2 wait_until_unfinished_threads_have_posted: the supervisor's key
    /// rendezvous.
    pub fn wait_until_unfinished_threads_have_posted(&self) {
        let mut inner = self.inner.lock();
        while !inner.unfinished_have_posted() {
            self.modified.wait(&mut inner);
        }
    }

    /// Waits (with a bounded poll, since `modified` only fires on pool
    /// mutation) until every registered thread is FINISHED.
    pub fn wait_all_finished(&self) {
        let mut inner = self.inner.lock();
        while !inner.all_finished() {
            self.modified.wait_for(&mut inner, Duration::from_millis(50));
        }
    }

    pub fn status_protected(&self, tid: ThreadId) -> Option<ThreadStatus> {
        self.inner.lock().threads.get(&tid).map(|t| t.status)
    }

    pub fn set_status_protected(&self, tid: ThreadId, status: ThreadStatus) {
        let mut inner = self.inner.lock();
        if let Some(thread) = inner.threads.get_mut(&tid) {
            thread.status = status;
        }
        self.modified.notify_all();
    }

    pub fn enabled_set(&self) -> HashSet<ThreadId> {
        self.inner
            .lock()
            .threads
            .values()
            .filter(|t| t.status == ThreadStatus::Enabled)
            .map(|t| t.tid)
            .collect()
    }

    pub fn program_state(&self) -> ProgramState {
        self.inner.lock().program_state()
    }

    pub fn all_finished(&self) -> bool {
        self.inner.lock().all_finished()
    }

    pub fn race_log_len(&self) -> usize {
        self.registry.lock().race_log().len()
    }

    pub fn with_registry<R>(&self, f: impl FnOnce(&Registry) -> R) -> R {
        f(&self.registry.lock())
    }
}
