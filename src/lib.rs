//! A deterministic record/replay scheduler for instrumented multi-threaded
//! programs.
//!
//! An instrumented binary reports every memory access, lock operation, and
//! thread-management event ([`instruction::VisibleInstruction`]) to a
//! process-wide [`scheduler::Scheduler`] through the [`wrapper`] ABI. The
//! scheduler serializes these through a cooperative single-execution-right
//! protocol ([`control::Control`]), tracks per-address/per-thread wait-sets
//! and data races ([`registry::Registry`]), and persists the resulting trace
//! and race log at the end of the run ([`record::ExecutionRecord`]).

pub mod config;
pub mod control;
pub mod error;
pub mod instruction;
pub mod logging;
pub mod pool;
pub mod record;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod thread_record;
pub mod wrapper;

pub use config::{Settings, StrategyTag};
pub use error::{Error, Result};
pub use instruction::{Address, LockOp, MemoryOp, SourceLocation, ThreadOp, VisibleInstruction};
pub use pool::AssertionFailure;
pub use record::{ExecutionRecord, RunStatus, Transition};
pub use scheduler::Scheduler;
pub use thread_record::{ThreadId, ThreadStatus};
