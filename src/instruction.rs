//! Visible instructions
//!
//! §3/§9 calls for "native sum types with exhaustive dispatch over
//! virtual hierarchies" — mirrored here as a plain Rust `enum` rather than a
//! trait-object hierarchy, the way `program-model/object.hpp` in
//! `original_source` encodes `memory_instruction` / `lock_instruction` /
//! `thread_management_instruction` as one tagged variant.

use std::fmt;

use crate::thread_record::ThreadId;

/// Opaque memory/lock address. §9: "never dereferenced by the core;
/// represent as a fixed-width integer."
pub type Address = u64;

/// Where in the instrumented program's source a visible instruction
/// originated, carried through for trace/race reporting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// §3 memory_instruction operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Load,
    Store,
    ReadModifyWrite,
}

impl MemoryOp {
    /// memory_object's wait-set index (§4.1): 0 = Store/RMW, 1 = Load.
    pub fn waitset_index(self) -> usize {
        match self {
            MemoryOp::Store | MemoryOp::ReadModifyWrite => 0,
            MemoryOp::Load => 1,
        }
    }

    /// True for operations that would race with any conflicting concurrent
    /// access (writes race with anything; reads only race with writes).
    pub fn is_write(self) -> bool {
        matches!(self, MemoryOp::Store | MemoryOp::ReadModifyWrite)
    }
}

/// §3 lock_instruction operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockOp {
    Lock,
    Unlock,
    Trylock,
}

impl LockOp {
    /// lock_object's wait-set index (§4.1): three distinct wait-sets, one
    /// per operation kind (`original_source::lock_object.cpp` keys its
    /// `mWaiting` array by the enum's ordinal, 0/1/2). See DESIGN.md for the
    /// resolution of the "union of all three wait-sets" wording.
    pub fn waitset_index(self) -> usize {
        match self {
            LockOp::Lock => 0,
            LockOp::Unlock => 1,
            LockOp::Trylock => 2,
        }
    }
}

/// §3 thread_management_instruction operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadOp {
    Spawn,
    Join,
}

/// The tagged visible-instruction sum type (§3).
#[derive(Debug, Clone, PartialEq)]
pub enum VisibleInstruction {
    Memory {
        tid: ThreadId,
        operation: MemoryOp,
        address: Address,
        operand_name: String,
        is_atomic: bool,
        location: SourceLocation,
    },
    Lock {
        tid: ThreadId,
        operation: LockOp,
        address: Address,
        operand_name: String,
        location: SourceLocation,
    },
    ThreadManagement {
        tid: ThreadId,
        operation: ThreadOp,
        target: ThreadId,
        location: SourceLocation,
    },
}

impl VisibleInstruction {
    pub fn tid(&self) -> ThreadId {
        match self {
            VisibleInstruction::Memory { tid, .. } => *tid,
            VisibleInstruction::Lock { tid, .. } => *tid,
            VisibleInstruction::ThreadManagement { tid, .. } => *tid,
        }
    }

    /// The object-registry key this instruction addresses, if any. Spawn and
    /// Join key into `thread_state` by the *target* tid rather than an
    /// address (§3 "thread_state (for join): per-thread wait-set").
    pub fn object_key(&self) -> ObjectKey {
        match self {
            VisibleInstruction::Memory { address, .. } => ObjectKey::Memory(*address),
            VisibleInstruction::Lock { address, .. } => ObjectKey::Lock(*address),
            VisibleInstruction::ThreadManagement { target, .. } => ObjectKey::Thread(*target),
        }
    }
}

impl fmt::Display for VisibleInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisibleInstruction::Memory {
                tid,
                operation,
                address,
                operand_name,
                is_atomic,
                location,
            } => write!(
                f,
                "{tid} {operation:?} 0x{address:x} \"{operand_name}\" atomic={is_atomic} [{location}]"
            ),
            VisibleInstruction::Lock {
                tid,
                operation,
                address,
                operand_name,
                location,
            } => write!(
                f,
                "{tid} {operation:?} 0x{address:x} \"{operand_name}\" [{location}]"
            ),
            VisibleInstruction::ThreadManagement {
                tid,
                operation,
                target,
                location,
            } => write!(f, "{tid} {operation:?} -> thread{target} [{location}]"),
        }
    }
}

/// Which object-registry table a [`VisibleInstruction`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    Memory(Address),
    Lock(Address),
    Thread(ThreadId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation {
            file: "test.c".into(),
            line: 1,
        }
    }

    #[test]
    fn memory_waitset_indices_match_spec() {
        assert_eq!(MemoryOp::Store.waitset_index(), 0);
        assert_eq!(MemoryOp::ReadModifyWrite.waitset_index(), 0);
        assert_eq!(MemoryOp::Load.waitset_index(), 1);
    }

    #[test]
    fn lock_waitset_indices_match_spec() {
        assert_eq!(LockOp::Lock.waitset_index(), 0);
        assert_eq!(LockOp::Unlock.waitset_index(), 1);
        assert_eq!(LockOp::Trylock.waitset_index(), 2);
    }

    #[test]
    fn object_key_for_join_uses_target_not_address() {
        let instr = VisibleInstruction::ThreadManagement {
            tid: 0,
            operation: ThreadOp::Join,
            target: 7,
            location: loc(),
        };
        assert_eq!(instr.object_key(), ObjectKey::Thread(7));
        assert_eq!(instr.tid(), 0);
    }
}
