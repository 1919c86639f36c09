//! Thread control gate (§4.3)
//!
//! The single-execution-right mechanism: exactly one registered thread may
//! run at a time, and it runs until the supervisor explicitly grants the
//! right to another. Grounded on `kernel::sync::wait_queue::WaitQueue`'s
//! park/wake shape, generalized from a kernel wait queue of blocked threads
//! to a single "it's your turn" token guarded by `owner_tid`.

use fxhash::FxHashSet;
use parking_lot::{Condvar, Mutex};

use crate::thread_record::ThreadId;

struct Inner {
    owner: Option<ThreadId>,
    registered: FxHashSet<ThreadId>,
    shutdown: bool,
}

/// Grants exactly one thread at a time the right to execute and post its
/// next visible instruction.
pub struct Control {
    inner: Mutex<Inner>,
    turn: Condvar,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                owner: None,
                registered: FxHashSet::default(),
                shutdown: false,
            }),
            turn: Condvar::new(),
        }
    }

    /// §4.3 register_thread: a newly registered thread starts without the
    /// execution right; it must wait_for_turn before proceeding.
    pub fn register_thread(&self, tid: ThreadId) {
        self.inner.lock().registered.insert(tid);
    }

    /// §4.3 set_owner: the supervisor hands the execution right to `tid`.
    pub fn set_owner(&self, tid: ThreadId) {
        let mut inner = self.inner.lock();
        inner.owner = Some(tid);
        self.turn.notify_all();
    }

    /// §4.3 wait_for_turn: blocks the calling thread until it is the owner,
    /// or until the supervisor shuts the gate down entirely.
    pub fn wait_for_turn(&self, tid: ThreadId) {
        let mut inner = self.inner.lock();
        while inner.owner != Some(tid) && !inner.shutdown {
            self.turn.wait(&mut inner);
        }
    }

    /// §4.3 grant_execution_right: equivalent to `set_owner` followed by the
    /// granted thread's own `wait_for_turn`, exposed as one call for the
    /// supervisor side, which only ever grants and moves on.
    pub fn grant_execution_right(&self, tid: ThreadId) {
        self.set_owner(tid);
    }

    /// §4.3 grant_execution_right_all: used at shutdown (DONE/DEADLOCK/ERROR)
    /// to release every thread still parked in `wait_for_turn` so none block
    /// forever, regardless of whose turn it nominally is.
    pub fn grant_execution_right_all(&self) {
        let mut inner = self.inner.lock();
        inner.shutdown = true;
        self.turn.notify_all();
    }

    pub fn is_registered(&self, tid: ThreadId) -> bool {
        self.inner.lock().registered.contains(&tid)
    }

    pub fn current_owner(&self) -> Option<ThreadId> {
        self.inner.lock().owner
    }
}
