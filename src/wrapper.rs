//! Wrapper ABI (§4.6, §6)
//!
//! A process-wide singleton exposes the stable `extern "C"` entry points an
//! instrumented binary calls at every visible instruction. Grounded on
//! `kernel::arch::amd64::include::arch::arch_ops.rs`'s `#[no_mangle] pub
//! extern "C" fn` boundary functions, generalized from a handful of
//! architecture hooks to the full set §6 lists. The singleton itself
//! replaces a `static mut` + spinlock pattern (forced under `no_std`) with
//! `std::sync::OnceLock`, the ordinary hosted-std tool for the same job.

use std::ffi::{c_char, c_void, CStr};
use std::sync::{Arc, OnceLock};

use crate::config::{Settings, StrategyTag};
use crate::instruction::{Address, LockOp, MemoryOp, SourceLocation, ThreadOp, VisibleInstruction};
use crate::pool::AssertionFailure;
use crate::scheduler::Scheduler;
use crate::thread_record::ThreadId;

thread_local! {
    static CURRENT_TID: std::cell::RefCell<Option<ThreadId>> = std::cell::RefCell::new(None);
}

fn the_scheduler() -> &'static Arc<Scheduler> {
    static INSTANCE: OnceLock<Arc<Scheduler>> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        crate::logging::init();
        let settings = Settings::read_default().unwrap_or_else(|err| {
            log::warn!("no usable schedules/ directory ({err}); defaulting to a free-running single thread");
            Settings {
                schedule: Vec::new(),
                thread_count: 1,
                strategy: StrategyTag::NonPreemptive,
            }
        });
        Scheduler::new(settings)
    })
}

fn current_tid() -> Option<ThreadId> {
    CURRENT_TID.with(|cell| *cell.borrow())
}

fn set_current_tid(tid: ThreadId) {
    CURRENT_TID.with(|cell| *cell.borrow_mut() = Some(tid));
}

fn c_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

fn location(file: *const c_char, line: u32) -> SourceLocation {
    SourceLocation { file: c_str(file), line }
}

/// §6 `register_main_thread()`: registers tid 0 for the calling thread. A
/// second caller would simply receive whatever the next sequential tid is;
/// callers are expected to invoke this exactly once, from the real main
/// thread, before any other entry point.
#[no_mangle]
pub extern "C" fn register_main_thread() -> u64 {
    let tid = the_scheduler().register_thread();
    set_current_tid(tid);
    tid
}

/// §6 `enter_function` / `exit_function`: tracing hooks, no-ops beyond a
/// debug log line.
#[no_mangle]
pub extern "C" fn enter_function(name: *const c_char) {
    log::trace!("enter_function({})", c_str(name));
}

#[no_mangle]
pub extern "C" fn exit_function(name: *const c_char) {
    log::trace!("exit_function({})", c_str(name));
}

/// §6 `wait_registered()`: the supervisor already knows a thread's tid by
/// the time [`register_thread`] or [`register_main_thread`] returns
/// (registration in this crate happens synchronously under `reg_mutex`), so
/// this entry point has nothing left to wait for; kept as a no-op for parity
/// with the ABI table, logging if called out of order.
#[no_mangle]
pub extern "C" fn wait_registered() {
    if current_tid().is_none() {
        log::warn!("wait_registered called before this thread registered a tid");
    }
}

/// §6 `register_thread(handle, tid)`: post-spawn reconciliation. Called by a
/// freshly spawned OS thread to claim the tid its creator obtained from
/// [`post_spawn_instruction`]; `handle` is accepted for ABI parity with the
/// real pthread/std::thread handle the instrumented caller holds, but this
/// crate has no further use for it once the calling thread's own tid is set.
#[no_mangle]
pub extern "C" fn register_thread(handle: u64, tid: u64) {
    let _ = handle;
    set_current_tid(tid);
}

fn runs_controlled() -> bool {
    the_scheduler().runs_controlled()
}

/// §6 `post_memory_instruction`. No-op if the calling thread is unregistered
/// or the scheduler is no longer running controlled.
#[no_mangle]
pub extern "C" fn post_memory_instruction(
    op: u8,
    operand: Address,
    operand_name: *const c_char,
    is_atomic: bool,
    file: *const c_char,
    line: u32,
) {
    let Some(tid) = current_tid() else {
        log::debug!("post_memory_instruction from an unregistered thread; ignored");
        return;
    };
    if !runs_controlled() {
        return;
    }
    let operation = match op {
        0 => MemoryOp::Load,
        1 => MemoryOp::Store,
        _ => MemoryOp::ReadModifyWrite,
    };
    let instr = VisibleInstruction::Memory {
        tid,
        operation,
        address: operand,
        operand_name: c_str(operand_name),
        is_atomic,
        location: location(file, line),
    };
    let scheduler = the_scheduler();
    scheduler.pool().post(tid, instr);
    scheduler.control().wait_for_turn(tid);
}

/// §6 `post_lock_instruction`.
#[no_mangle]
pub extern "C" fn post_lock_instruction(
    op: u8,
    operand: Address,
    operand_name: *const c_char,
    file: *const c_char,
    line: u32,
) {
    let Some(tid) = current_tid() else {
        log::debug!("post_lock_instruction from an unregistered thread; ignored");
        return;
    };
    if !runs_controlled() {
        return;
    }
    let operation = match op {
        0 => LockOp::Lock,
        1 => LockOp::Unlock,
        _ => LockOp::Trylock,
    };
    let instr = VisibleInstruction::Lock {
        tid,
        operation,
        address: operand,
        operand_name: c_str(operand_name),
        location: location(file, line),
    };
    let scheduler = the_scheduler();
    scheduler.pool().post(tid, instr);
    scheduler.control().wait_for_turn(tid);
}

/// §6 `post_spawn_instruction`: allocates the child's tid up front so the
/// Spawn transition can name it, then returns that tid to the caller.
#[no_mangle]
pub extern "C" fn post_spawn_instruction(operand: Address, file: *const c_char, line: u32) -> u64 {
    let Some(tid) = current_tid() else {
        log::debug!("post_spawn_instruction from an unregistered thread; ignored");
        return 0;
    };
    let scheduler = the_scheduler();
    let child_tid = scheduler.register_thread();
    if !runs_controlled() {
        return child_tid;
    }
    let _ = operand;
    let instr = VisibleInstruction::ThreadManagement {
        tid,
        operation: ThreadOp::Spawn,
        target: child_tid,
        location: location(file, line),
    };
    scheduler.pool().post(tid, instr);
    scheduler.control().wait_for_turn(tid);
    child_tid
}

fn post_join(target: ThreadId, file: *const c_char, line: u32) {
    let Some(tid) = current_tid() else {
        log::debug!("post_join_instruction from an unregistered thread; ignored");
        return;
    };
    if !runs_controlled() {
        return;
    }
    let scheduler = the_scheduler();
    let instr = VisibleInstruction::ThreadManagement {
        tid,
        operation: ThreadOp::Join,
        target,
        location: location(file, line),
    };
    scheduler.pool().post(tid, instr);
    scheduler.control().wait_for_turn(tid);
}

/// §6 `post_pthread_join_instruction`.
#[no_mangle]
pub extern "C" fn post_pthread_join_instruction(target: u64, file: *const c_char, line: u32) {
    post_join(target, file, line);
}

/// §6 `post_stdthread_join_instruction`.
#[no_mangle]
pub extern "C" fn post_stdthread_join_instruction(target: u64, file: *const c_char, line: u32) {
    post_join(target, file, line);
}

/// §6 `yield()`: surrenders the execution right after the real primitive ran.
#[no_mangle]
pub extern "C" fn recsched_yield() {
    if let Some(tid) = current_tid() {
        the_scheduler().pool().yield_current(tid);
    }
}

/// §6 `finish()`: this thread will post no further visible instructions.
#[no_mangle]
pub extern "C" fn finish() {
    if let Some(tid) = current_tid() {
        the_scheduler().pool().finish(tid);
    }
}

/// §6 `notify_assertion_failure`.
#[no_mangle]
pub extern "C" fn notify_assertion_failure(
    msg: *const c_char,
    file: *const c_char,
    line: u32,
    expr: *const c_char,
) {
    let Some(tid) = current_tid() else {
        log::debug!("notify_assertion_failure from an unregistered thread; ignored");
        return;
    };
    let failure = AssertionFailure {
        tid,
        message: c_str(msg),
        file: c_str(file),
        line,
        expr: c_str(expr),
    };
    the_scheduler().notify_assertion_failure(tid, failure);
}

/// §6 `spawn_thread(pid_out, attr, start, arg)`: creates the OS thread and
/// registers it, writing the new tid to `*pid_out`. `attr` is accepted for
/// ABI parity but unused — this crate has no analogue of pthread attributes.
///
/// # Safety
/// `pid_out` must be a valid, non-null, writable `u64` pointer; `start` must
/// be a valid function pointer the caller keeps alive for as long as the
/// spawned thread runs; `arg` must remain valid until `start` has returned.
#[no_mangle]
pub unsafe extern "C" fn spawn_thread(
    pid_out: *mut u64,
    _attr: *const c_void,
    start: extern "C" fn(*mut c_void) -> *mut c_void,
    arg: *mut c_void,
) -> i32 {
    let Some(creator_tid) = current_tid() else {
        log::debug!("spawn_thread from an unregistered thread; ignored");
        return -1;
    };
    let scheduler = the_scheduler();
    let child_tid = scheduler.register_thread();

    if runs_controlled() {
        let instr = VisibleInstruction::ThreadManagement {
            tid: creator_tid,
            operation: ThreadOp::Spawn,
            target: child_tid,
            location: SourceLocation { file: String::new(), line: 0 },
        };
        scheduler.pool().post(creator_tid, instr);
        scheduler.control().wait_for_turn(creator_tid);
    }

    // Raw pointers aren't Send; carry them across the spawn boundary as
    // untyped words and reconstitute them on the new thread, the way a C
    // ABI necessarily does.
    let start_addr = start as usize;
    let arg_addr = arg as usize;
    let scheduler = Arc::clone(scheduler);

    let spawned = std::thread::Builder::new()
        .name(format!("recsched-worker-{child_tid}"))
        .spawn(move || {
            set_current_tid(child_tid);
            let start_fn: extern "C" fn(*mut c_void) -> *mut c_void =
                unsafe { std::mem::transmute(start_addr) };
            start_fn(arg_addr as *mut c_void);
            scheduler.pool().finish(child_tid);
        });

    match spawned {
        Ok(handle) => {
            if !pid_out.is_null() {
                unsafe { *pid_out = child_tid };
            }
            // Joined logically through post_*_join_instruction, not std::thread::JoinHandle.
            std::mem::forget(handle);
            0
        }
        Err(err) => {
            log::error!("failed to spawn worker thread: {err}");
            -1
        }
    }
}
