//! Scheduler supervisor (§4.5)
//!
//! Owns the pool, control gate, and selector; drives the scheduling loop on
//! a dedicated supervisor thread; persists the trace and race log at close.
//! Grounded on `original_source::scheduler.cpp`'s constructor/run/close split
//! and on `kernel::sched::mod.rs`'s pattern of a single privileged loop that
//! never itself runs user code.

use std::path::Path;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::config::{Settings, StrategyTag};
use crate::control::Control;
use crate::error::Result;
use crate::pool::{AssertionFailure, Pool};
use crate::record::{ExecutionRecord, RunStatus};
use crate::selector::{NonPreemptive, ScheduleDirected, Selection, Selector};
use crate::thread_record::ThreadId;

struct Registration {
    next_tid: ThreadId,
    registered_count: usize,
}

/// The scheduling engine: one instance per controlled run.
pub struct Scheduler {
    pool: Pool,
    control: Control,
    selector: Mutex<Box<dyn Selector>>,
    record: Mutex<ExecutionRecord>,
    status: Mutex<RunStatus>,
    reg: Mutex<Registration>,
    reg_cond: Condvar,
    expected_threads: usize,
    supervisor: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Scheduler {
    /// §4.5.1 construction: reads settings, wires up pool/control/selector,
    /// and spawns the supervisor thread.
    pub fn new(settings: Settings) -> Arc<Self> {
        let selector: Box<dyn Selector> = match settings.strategy {
            StrategyTag::NonPreemptive => Box::new(NonPreemptive::new()),
            StrategyTag::ScheduleDirected => Box::new(ScheduleDirected::new(settings.schedule)),
        };

        let scheduler = Arc::new(Self {
            pool: Pool::new(),
            control: Control::new(),
            selector: Mutex::new(selector),
            record: Mutex::new(ExecutionRecord::new()),
            status: Mutex::new(RunStatus::Running),
            reg: Mutex::new(Registration {
                next_tid: 0,
                registered_count: 0,
            }),
            reg_cond: Condvar::new(),
            expected_threads: settings.thread_count,
            supervisor: Mutex::new(None),
        });

        let supervisor_handle = {
            let scheduler = Arc::clone(&scheduler);
            thread::Builder::new()
                .name("recsched-supervisor".into())
                .spawn(move || scheduler.supervise())
                .expect("failed to spawn supervisor thread")
        };
        *scheduler.supervisor.lock() = Some(supervisor_handle);

        scheduler
    }

    /// Convenience constructor reading `schedules/` in the current directory.
    pub fn from_default_settings() -> Result<Arc<Self>> {
        Ok(Self::new(Settings::read_default()?))
    }

    /// §4.3 register_thread + §4.2 register_thread, assigning the next
    /// sequential tid and signalling `mRegCond`. `register_main_thread`
    /// relies on being the first caller to receive tid 0.
    pub fn register_thread(&self) -> ThreadId {
        let mut reg = self.reg.lock();
        let tid = reg.next_tid;
        reg.next_tid += 1;
        self.pool.register_thread(tid);
        self.control.register_thread(tid);
        reg.registered_count += 1;
        self.reg_cond.notify_all();
        tid
    }

    pub fn is_registered(&self, tid: ThreadId) -> bool {
        self.control.is_registered(tid)
    }

    /// §4.5.2 registration phase: blocks until `expected_thread_count`
    /// threads have registered.
    fn wait_all_registered(&self) {
        let mut reg = self.reg.lock();
        while reg.registered_count < self.expected_threads {
            self.reg_cond.wait(&mut reg);
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    /// `runs_controlled()`: most wrappers become no-ops once the scheduler
    /// has reached a terminal ERROR or BLOCKED status (§4.6).
    pub fn runs_controlled(&self) -> bool {
        !matches!(*self.status.lock(), RunStatus::Error(_) | RunStatus::Blocked)
    }

    pub fn status(&self) -> RunStatus {
        self.status.lock().clone()
    }

    fn set_status(&self, status: RunStatus) {
        self.record.lock().set_status(status.clone());
        *self.status.lock() = status;
    }

    /// §4.5.3 scheduling loop.
    fn supervise(self: Arc<Self>) {
        self.wait_all_registered();

        let mut pending_transition = None;

        loop {
            self.pool.wait_until_unfinished_threads_have_posted();

            if let Some(failure) = self.pool.take_assertion_failure() {
                self.finalize_transition(&mut pending_transition);
                self.set_status(RunStatus::AssertionFailure(failure));
                break;
            }

            let snapshot = self.pool.program_state();
            if let Some((pre, task)) = pending_transition.take() {
                self.record.lock().push(pre, task, snapshot.clone());
            }

            let all_finished = self.pool.all_finished();
            let selection = self.selector.lock().select(&snapshot.enabled, all_finished);

            let tid = match selection {
                Selection::Run(tid) => tid,
                Selection::Deadlock => {
                    self.set_status(RunStatus::Deadlock);
                    break;
                }
                Selection::Done => {
                    self.set_status(RunStatus::Done);
                    break;
                }
                Selection::Error(msg) => {
                    self.set_status(RunStatus::Error(msg));
                    break;
                }
            };

            let task = self.pool.set_current(tid);
            pending_transition = Some((snapshot, task));
            self.control.grant_execution_right(tid);
        }

        self.close();
    }

    fn finalize_transition(&self, pending: &mut Option<(crate::pool::ProgramState, crate::instruction::VisibleInstruction)>) {
        if let Some((pre, task)) = pending.take() {
            let post = self.pool.program_state();
            self.record.lock().push(pre, task, post);
        }
    }

    /// §4.5.4 close: open the gate unconditionally and persist the trace.
    fn close(&self) {
        self.control.grant_execution_right_all();
        self.persist("record.txt", "record_short.txt", "data_races.txt");
    }

    fn persist(&self, record_path: impl AsRef<Path>, short_path: impl AsRef<Path>, races_path: impl AsRef<Path>) {
        let record = self.record.lock();
        if let Err(err) = record.write_full(&record_path) {
            log::warn!("failed to write record.txt: {err}");
        }
        if let Err(err) = record.write_short(&short_path) {
            log::warn!("failed to write record_short.txt: {err}");
        }
        let races = self.pool.with_registry(|registry| registry.race_log().to_vec());
        if let Err(err) = record.append_races(&races_path, &races) {
            log::warn!("failed to append data_races.txt: {err}");
        }
    }

    pub fn notify_assertion_failure(&self, tid: ThreadId, failure: AssertionFailure) {
        self.pool.post_assertion_failure(tid, failure);
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.control.grant_execution_right_all();
        if let Some(handle) = self.supervisor.lock().take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{MemoryOp, SourceLocation, VisibleInstruction};

    fn loc() -> SourceLocation {
        SourceLocation { file: "t.c".into(), line: 1 }
    }

    fn settings(thread_count: usize) -> Settings {
        Settings {
            schedule: Vec::new(),
            thread_count,
            strategy: StrategyTag::NonPreemptive,
        }
    }

    #[test]
    fn single_thread_run_reaches_done() {
        let scheduler = Scheduler::new(settings(1));
        let tid = scheduler.register_thread();
        assert_eq!(tid, 0);

        scheduler.pool().post(
            tid,
            VisibleInstruction::Memory {
                tid,
                operation: MemoryOp::Store,
                address: 0x10,
                operand_name: "x".into(),
                is_atomic: false,
                location: loc(),
            },
        );
        scheduler.control().wait_for_turn(tid);
        scheduler.pool().yield_current(tid);
        scheduler.pool().finish(tid);

        scheduler.control().wait_for_turn(tid);
        // Give the supervisor a moment to observe all-finished and close.
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(scheduler.status(), RunStatus::Done);
    }
}
