//! Object registry (§4.1)
//!
//! Lazily creates a `memory_object` or `lock_object` per address on first
//! reference, plus a `thread_state` join-waitset per thread. Grounded on
//! `original_source::scheduler::{memory_object,lock_object}.cpp` for the
//! exact request/perform semantics, restructured the way
//! `kernel::sync::wait_queue::WaitQueue` groups a waitset behind a small
//! struct with `request`/wake-style methods instead of free functions.

use std::collections::VecDeque;

use fxhash::FxHashMap;

use crate::instruction::{Address, LockOp, MemoryOp, ThreadOp, VisibleInstruction};
use crate::thread_record::ThreadId;

/// An unordered pair of conflicting memory instructions (§3 "Data race").
#[derive(Debug, Clone)]
pub struct DataRace {
    pub existing: VisibleInstruction,
    pub incoming: VisibleInstruction,
}

/// Per-address memory object: two wait-sets indexed by [`MemoryOp::waitset_index`].
#[derive(Debug, Default)]
struct MemoryObject {
    waiting: [FxHashMap<ThreadId, VisibleInstruction>; 2],
}

impl MemoryObject {
    /// Pair `incoming` against every pending instruction on this object,
    /// following `original_source::memory_object.cpp::get_data_races`: a
    /// race requires at least one write and not-both-atomic.
    fn race_pairs(&self, incoming: &VisibleInstruction) -> Vec<DataRace> {
        let VisibleInstruction::Memory {
            operation: incoming_op,
            is_atomic: incoming_atomic,
            ..
        } = incoming
        else {
            return Vec::new();
        };

        let mut pairs = Vec::new();

        // Every pending entry in waitset 0 (Store/RMW) is itself a write, so
        // it races against any incoming access. Waitset 1 (Load) entries are
        // never writes, so they only race when the incoming access is itself
        // a write — two loads never satisfy "at least one is a write".
        for existing in self.waiting[0].values() {
            pairs.push(existing.clone());
        }
        if incoming_op.is_write() {
            for existing in self.waiting[1].values() {
                pairs.push(existing.clone());
            }
        }

        pairs
            .into_iter()
            .filter(|existing| {
                let existing_atomic = matches!(existing,
                    VisibleInstruction::Memory { is_atomic, .. } if *is_atomic);
                !(existing_atomic && *incoming_atomic)
            })
            .map(|existing| DataRace {
                existing,
                incoming: incoming.clone(),
            })
            .collect()
    }

    /// §4.1 request: always enabled for memory instructions.
    fn request(&mut self, instr: VisibleInstruction) -> Vec<DataRace> {
        let races = self.race_pairs(&instr);
        let index = match &instr {
            VisibleInstruction::Memory { operation, .. } => operation.waitset_index(),
            _ => unreachable!("MemoryObject only holds memory instructions"),
        };
        self.waiting[index].insert(instr.tid(), instr);
        races
    }

    fn perform(&mut self, instr: &VisibleInstruction) {
        let index = match instr {
            VisibleInstruction::Memory { operation, .. } => operation.waitset_index(),
            _ => unreachable!("MemoryObject only holds memory instructions"),
        };
        self.waiting[index].remove(&instr.tid());
    }
}

/// Per-address lock object: three wait-sets plus an optional holder.
#[derive(Debug, Default)]
struct LockObject {
    waiting: [FxHashMap<ThreadId, VisibleInstruction>; 3],
    holder: Option<ThreadId>,
}

impl LockObject {
    /// §4.1 request: returns `enabled`. Lock is enabled iff unheld; Unlock/
    /// Trylock are always enabled to request (their success/failure is
    /// decided at `perform` time).
    fn request(&mut self, instr: VisibleInstruction) -> bool {
        let (index, op) = match &instr {
            VisibleInstruction::Lock { operation, .. } => (operation.waitset_index(), *operation),
            _ => unreachable!("LockObject only holds lock instructions"),
        };
        let enabled = match op {
            LockOp::Lock => self.holder.is_none(),
            LockOp::Unlock | LockOp::Trylock => true,
        };
        self.waiting[index].insert(instr.tid(), instr);
        enabled
    }

    /// §4.1 perform: returns `success` (always true for Lock/Unlock, may be
    /// false for Trylock). Returns the union of all three wait-sets so the
    /// caller can flip waiter statuses, per §4.1's explicit text
    /// (the C++ original only unions two of the three sets; see DESIGN.md).
    fn perform(&mut self, instr: &VisibleInstruction) -> (bool, Vec<ThreadId>) {
        let (index, op, tid) = match instr {
            VisibleInstruction::Lock { operation, tid, .. } => (operation.waitset_index(), *operation, *tid),
            _ => unreachable!("LockObject only holds lock instructions"),
        };
        self.waiting[index].remove(&tid);

        let success = match op {
            LockOp::Lock => {
                self.holder = Some(tid);
                true
            }
            LockOp::Trylock => {
                if self.holder.is_none() {
                    self.holder = Some(tid);
                    true
                } else {
                    false
                }
            }
            LockOp::Unlock => {
                self.holder = None;
                true
            }
        };

        let waiting: Vec<ThreadId> = self
            .waiting
            .iter()
            .flat_map(|set| set.keys().copied())
            .collect();
        (success, waiting)
    }
}

/// Per-target join waitset (§3 "thread_state").
#[derive(Debug, Default)]
struct JoinState {
    waiters: VecDeque<ThreadId>,
}

/// The object registry: lazily-created memory/lock objects plus join
/// waitsets, and the global race log.
#[derive(Default)]
pub struct Registry {
    memory_objects: FxHashMap<Address, MemoryObject>,
    lock_objects: FxHashMap<Address, LockObject>,
    join_states: FxHashMap<ThreadId, JoinState>,
    finished: std::collections::HashSet<ThreadId>,
    race_log: Vec<DataRace>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.1 request, dispatched on instruction kind.
    pub fn request(&mut self, instr: VisibleInstruction) -> bool {
        match &instr {
            VisibleInstruction::Memory { address, .. } => {
                let address = *address;
                let object = self.memory_objects.entry(address).or_default();
                let races = object.request(instr);
                self.race_log.extend(races);
                true
            }
            VisibleInstruction::Lock { address, .. } => {
                let address = *address;
                self.lock_objects.entry(address).or_default().request(instr)
            }
            VisibleInstruction::ThreadManagement {
                tid,
                operation,
                target,
                ..
            } => {
                let finished = self.finished.contains(&target);
                let state = self.join_states.entry(target).or_default();
                // Only a Join actually waits on the target's finish; a Spawn
                // just needs the target's join_states entry to exist.
                if operation == ThreadOp::Join && !finished {
                    state.waiters.push_back(tid);
                }
                finished
            }
        }
    }

    /// §4.1 perform. For locks, returns the set of tids whose status should
    /// flip (Disabled if the lock was acquired, Enabled if it was released).
    /// For memory, always returns an empty set (no holder effect).
    pub fn perform(&mut self, instr: &VisibleInstruction) -> PerformOutcome {
        match instr {
            VisibleInstruction::Memory { address, .. } => {
                if let Some(object) = self.memory_objects.get_mut(address) {
                    object.perform(instr);
                }
                PerformOutcome::Memory
            }
            VisibleInstruction::Lock { address, .. } => {
                let (success, waiting) = self
                    .lock_objects
                    .get_mut(address)
                    .expect("perform called without a prior request")
                    .perform(instr);
                let acquired = success && matches!(instr, VisibleInstruction::Lock { operation: LockOp::Lock | LockOp::Trylock, .. });
                PerformOutcome::Lock {
                    success,
                    waiting,
                    acquired,
                }
            }
            VisibleInstruction::ThreadManagement { .. } => PerformOutcome::ThreadManagement,
        }
    }

    /// Called when a thread finishes: enables every thread that had posted
    /// a Join targeting it (§4.2 `finish`).
    pub fn mark_finished(&mut self, tid: ThreadId) -> Vec<ThreadId> {
        self.finished.insert(tid);
        self.join_states
            .get(&tid)
            .map(|state| state.waiters.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn register_thread(&mut self, tid: ThreadId) {
        self.join_states.entry(tid).or_default();
    }

    pub fn race_log(&self) -> &[DataRace] {
        &self.race_log
    }
}

/// Result of [`Registry::perform`], enough for the caller (task pool) to
/// update dependent thread statuses without reaching back into the registry.
pub enum PerformOutcome {
    Memory,
    Lock {
        success: bool,
        waiting: Vec<ThreadId>,
        /// True if this perform acquired the lock (so waiters become Disabled);
        /// false if it released it (so waiters become Enabled).
        acquired: bool,
    },
    ThreadManagement,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::SourceLocation;

    fn loc() -> SourceLocation {
        SourceLocation { file: "t.c".into(), line: 1 }
    }

    fn store(tid: ThreadId, addr: Address, atomic: bool) -> VisibleInstruction {
        VisibleInstruction::Memory {
            tid,
            operation: MemoryOp::Store,
            address: addr,
            operand_name: "x".into(),
            is_atomic: atomic,
            location: loc(),
        }
    }

    fn load(tid: ThreadId, addr: Address, atomic: bool) -> VisibleInstruction {
        VisibleInstruction::Memory {
            tid,
            operation: MemoryOp::Load,
            address: addr,
            operand_name: "x".into(),
            is_atomic: atomic,
            location: loc(),
        }
    }

    fn lock_instr(tid: ThreadId, addr: Address, op: LockOp) -> VisibleInstruction {
        VisibleInstruction::Lock {
            tid,
            operation: op,
            address: addr,
            operand_name: "m".into(),
            location: loc(),
        }
    }

    #[test]
    fn two_nonatomic_stores_race() {
        let mut reg = Registry::new();
        assert!(reg.request(store(0, 0x10, false)));
        assert!(reg.request(store(1, 0x10, false)));
        assert_eq!(reg.race_log().len(), 1);
    }

    #[test]
    fn two_atomic_loads_do_not_race() {
        let mut reg = Registry::new();
        assert!(reg.request(load(0, 0x10, true)));
        assert!(reg.request(load(1, 0x10, true)));
        assert_eq!(reg.race_log().len(), 0);
    }

    #[test]
    fn two_nonatomic_loads_do_not_race() {
        let mut reg = Registry::new();
        assert!(reg.request(load(0, 0x10, false)));
        assert!(reg.request(load(1, 0x10, false)));
        assert_eq!(reg.race_log().len(), 0);
    }

    #[test]
    fn lock_is_disabled_while_held() {
        let mut reg = Registry::new();
        assert!(reg.request(lock_instr(0, 0x20, LockOp::Lock)));
        let outcome = reg.perform(&lock_instr(0, 0x20, LockOp::Lock));
        assert!(matches!(outcome, PerformOutcome::Lock { success: true, .. }));

        assert!(!reg.request(lock_instr(1, 0x20, LockOp::Lock)));
    }

    #[test]
    fn trylock_fails_when_held() {
        let mut reg = Registry::new();
        reg.request(lock_instr(0, 0x30, LockOp::Lock));
        reg.perform(&lock_instr(0, 0x30, LockOp::Lock));

        reg.request(lock_instr(1, 0x30, LockOp::Trylock));
        let outcome = reg.perform(&lock_instr(1, 0x30, LockOp::Trylock));
        assert!(matches!(outcome, PerformOutcome::Lock { success: false, .. }));
    }

    #[test]
    fn unlock_releases_and_wakes_waiters() {
        let mut reg = Registry::new();
        reg.request(lock_instr(0, 0x40, LockOp::Lock));
        reg.perform(&lock_instr(0, 0x40, LockOp::Lock));

        assert!(!reg.request(lock_instr(1, 0x40, LockOp::Lock)));

        reg.request(lock_instr(0, 0x40, LockOp::Unlock));
        let outcome = reg.perform(&lock_instr(0, 0x40, LockOp::Unlock));
        match outcome {
            PerformOutcome::Lock { success, waiting, acquired } => {
                assert!(success);
                assert!(!acquired);
                assert_eq!(waiting, vec![1]);
            }
            _ => panic!("expected lock outcome"),
        }
    }

    #[test]
    fn join_enabled_only_after_finish() {
        let mut reg = Registry::new();
        reg.register_thread(1);
        let join = VisibleInstruction::ThreadManagement {
            tid: 0,
            operation: crate::instruction::ThreadOp::Join,
            target: 1,
            location: loc(),
        };
        assert!(!reg.request(join.clone()));
        let woken = reg.mark_finished(1);
        assert_eq!(woken, vec![0]);
    }
}
