//! Execution record (§3, §6)
//!
//! A totally ordered list of transitions plus a terminal status, written to
//! `record.txt` / `record_short.txt` / `data_races.txt` in the formats
//! §6 names exactly. Grounded on `original_source::scheduler.cpp`'s
//! `persist()` for the three-file split, restyled after
//! `kernel::debug`'s plain `write!`-based formatting rather than a templated
//! pretty-printer.

use std::fmt;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::instruction::VisibleInstruction;
use crate::pool::{AssertionFailure, ProgramState};
use crate::registry::DataRace;
use crate::thread_record::ThreadId;

/// Terminal (or running) status of a scheduled run (§3/§7).
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Unterminated: the run is still in progress.
    Running,
    /// Selector found an empty enabled set with unfinished threads.
    Deadlock,
    /// No thread can be granted and no progress is possible; recorded but
    /// distinct from a selector-detected deadlock (§7 kind 6).
    Blocked,
    /// An invariant violation or selector disagreement (§7 kinds 2-3).
    Error(String),
    /// User code reported a failed assertion (§7 kind 5).
    AssertionFailure(AssertionFailure),
    /// Every registered thread reached `finish()`.
    Done,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "RUNNING"),
            RunStatus::Deadlock => write!(f, "DEADLOCK"),
            RunStatus::Blocked => write!(f, "BLOCKED"),
            RunStatus::Error(msg) => write!(f, "ERROR: {msg}"),
            RunStatus::AssertionFailure(failure) => write!(
                f,
                "ASSERTION_FAILURE: {} ({}:{}) \"{}\"",
                failure.message, failure.file, failure.line, failure.expr
            ),
            RunStatus::Done => write!(f, "DONE"),
        }
    }
}

/// One scheduled step: the state before the grant, the instruction the
/// granted thread posted, and the state after it ran (§4.5.3).
#[derive(Debug, Clone)]
pub struct Transition {
    pub index: usize,
    pub pre_state: ProgramState,
    pub instruction: VisibleInstruction,
    pub post_state: ProgramState,
}

/// The ordered trace of a scheduled run plus its terminal status.
#[derive(Debug, Clone, Default)]
pub struct ExecutionRecord {
    transitions: Vec<Transition>,
    status: Option<RunStatus>,
}

impl ExecutionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pre_state: ProgramState, instruction: VisibleInstruction, post_state: ProgramState) {
        let index = self.transitions.len();
        self.transitions.push(Transition {
            index,
            pre_state,
            instruction,
            post_state,
        });
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = Some(status);
    }

    pub fn status(&self) -> RunStatus {
        self.status.clone().unwrap_or(RunStatus::Running)
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// `record.txt`: full dump, one transition per block plus the terminal
    /// status on its own trailing line.
    pub fn write_full(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut out = String::new();
        for t in &self.transitions {
            out.push_str(&format!(
                "#{index} pre_enabled={pre:?} instr=[{instr}] post_enabled={post:?}\n",
                index = t.index,
                pre = sorted(&t.pre_state.enabled),
                instr = t.instruction,
                post = sorted(&t.post_state.enabled),
            ));
        }
        out.push_str(&format!("status={}\n", self.status()));
        fs::write(path, out)
    }

    /// `record_short.txt`: `index tid op address "name" [file:line]` per line.
    pub fn write_short(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut out = String::new();
        for t in &self.transitions {
            out.push_str(&short_line(t));
            out.push('\n');
        }
        fs::write(path, out)
    }

    /// `data_races.txt`: appends every race pair, delimited by `>>>>>`.
    pub fn append_races(&self, path: impl AsRef<Path>, races: &[DataRace]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
        for race in races {
            writeln!(file, "{}", race.existing)?;
            writeln!(file, "{}", race.incoming)?;
            writeln!(file, ">>>>>")?;
        }
        Ok(())
    }
}

fn sorted(set: &std::collections::HashSet<ThreadId>) -> Vec<ThreadId> {
    let mut v: Vec<ThreadId> = set.iter().copied().collect();
    v.sort_unstable();
    v
}

fn short_line(t: &Transition) -> String {
    match &t.instruction {
        VisibleInstruction::Memory {
            tid,
            operation,
            address,
            operand_name,
            location,
            ..
        } => format!(
            "{} {} {:?} 0x{:x} \"{}\" [{}]",
            t.index, tid, operation, address, operand_name, location
        ),
        VisibleInstruction::Lock {
            tid,
            operation,
            address,
            operand_name,
            location,
        } => format!(
            "{} {} {:?} 0x{:x} \"{}\" [{}]",
            t.index, tid, operation, address, operand_name, location
        ),
        VisibleInstruction::ThreadManagement {
            tid,
            operation,
            target,
            location,
        } => format!(
            "{} {} {:?} thread{} [{}]",
            t.index, tid, operation, target, location
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{MemoryOp, SourceLocation};

    fn loc() -> SourceLocation {
        SourceLocation { file: "t.c".into(), line: 3 }
    }

    fn instr(tid: ThreadId) -> VisibleInstruction {
        VisibleInstruction::Memory {
            tid,
            operation: MemoryOp::Store,
            address: 0x10,
            operand_name: "x".into(),
            is_atomic: false,
            location: loc(),
        }
    }

    #[test]
    fn push_assigns_sequential_indices() {
        let mut record = ExecutionRecord::new();
        record.push(ProgramState::default(), instr(0), ProgramState::default());
        record.push(ProgramState::default(), instr(1), ProgramState::default());
        assert_eq!(record.transitions()[0].index, 0);
        assert_eq!(record.transitions()[1].index, 1);
    }

    #[test]
    fn status_defaults_to_running() {
        let record = ExecutionRecord::new();
        assert_eq!(record.status(), RunStatus::Running);
    }

    #[test]
    fn short_line_matches_spec_shape() {
        let mut record = ExecutionRecord::new();
        record.push(ProgramState::default(), instr(2), ProgramState::default());
        let line = short_line(&record.transitions()[0]);
        assert_eq!(line, "0 2 Store 0x10 \"x\" [t.c:3]");
    }
}
