//! The registry of execution path termination reasons.
//!
//! Every reason carries a stable numeric tag.
//! The tags are grouped into categories through range markers,
//! so that a reason can be classified with plain `tag <= marker` comparisons.
//! Gaps between the assigned values are reserved;
//! new reasons must never reuse an existing value.
//!
//! Each reason additionally declares the file suffix of the diagnostic artifact
//! a surrounding reporter writes for it.
//! An empty suffix means the reason emits no artifact file.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// Reason an execution path was terminated.
#[derive(
    Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, EnumIter,
)]
#[repr(u8)]
pub enum TerminationReason {
    /// The path is still being executed.
    Running = 0,
    /// The program reached its exit.
    Exit = 1,
    /// The operator interrupted the run.
    Interrupted = 2,
    /// The configured maximal path depth was reached.
    MaxDepth = 3,
    /// The engine ran out of memory.
    OutOfMemory = 4,
    /// The modelled program stack ran out of memory.
    OutOfStackMemory = 5,
    /// A solver query failed irrecoverably.
    Solver = 8,
    /// The program called abort.
    Abort = 10,
    /// An assertion in the program failed.
    Assert = 11,
    /// An out-of-bounds vector access.
    BadVectorAccess = 12,
    /// An invalid memory deallocation.
    Free = 13,
    /// A memory leak was detected.
    Leak = 14,
    /// An error in the environment model.
    Model = 15,
    /// An arithmetic overflow.
    Overflow = 16,
    /// An invalid pointer dereference.
    Ptr = 17,
    /// A write to read-only memory.
    ReadOnly = 18,
    /// The program reported an error itself.
    ReportError = 19,
    /// An invalid use of a compiler builtin.
    InvalidBuiltin = 20,
    /// An implicit truncation changed a value.
    ImplicitTruncation = 21,
    /// An implicit conversion changed a value.
    ImplicitConversion = 22,
    /// A call marked unreachable was executed.
    UnreachableCall = 23,
    /// A value-returning function returned without a value.
    MissingReturn = 24,
    /// A load from an invalid address.
    InvalidLoad = 25,
    /// A null passed for an argument attributed non-null.
    NullableAttribute = 26,
    /// The user requested the termination of the path.
    User = 33,
    /// An unrecoverable execution error, e.g. an unsupported instruction.
    Execution = 35,
    /// An error while calling external native code.
    External = 36,
    /// A divergence from the replayed path.
    Replay = 37,
    /// The path was consumed by a state merge.
    Merge = 38,
    /// The path was terminated without any report.
    SilentExit = 39,
}

impl TerminationReason {
    /// Upper bound (inclusive) of the normal-exit category.
    pub const NORMAL: u8 = 1;
    /// Upper bound (inclusive) of the early-termination category.
    pub const EARLY: u8 = 5;
    /// Upper bound (inclusive) of the solver-error category.
    pub const SOLVERERR: u8 = 8;
    /// Upper bound (inclusive) of the program-error category.
    pub const PROGERR: u8 = 26;
    /// Upper bound (inclusive) of the user-error category.
    pub const USERERR: u8 = 33;
    /// Upper bound (inclusive) of the execution-error category.
    pub const EXECERR: u8 = 36;
    /// Upper bound (inclusive) of the whole registry.
    pub const END: u8 = 39;

    /// Get the stable numeric tag of the reason.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Get the reason assigned to the given numeric tag.
    /// Returns `None` for unassigned (reserved) tag values.
    pub fn from_tag(tag: u8) -> Option<TerminationReason> {
        TerminationReason::iter().find(|reason| reason.tag() == tag)
    }

    /// Get the file suffix of the diagnostic artifact written for this reason.
    /// An empty suffix means no artifact file is written.
    pub fn artifact_suffix(self) -> &'static str {
        use TerminationReason::*;
        match self {
            Running | Exit | Replay | Merge | SilentExit => "",
            Interrupted | MaxDepth | OutOfMemory | OutOfStackMemory => "early",
            Solver => "solver.err",
            Abort => "abort.err",
            Assert => "assert.err",
            BadVectorAccess => "bad_vector_access.err",
            Free => "free.err",
            Leak => "leak.err",
            Model => "model.err",
            Overflow => "overflow.err",
            Ptr => "ptr.err",
            ReadOnly => "read_only.err",
            ReportError => "report_error.err",
            InvalidBuiltin => "invalid_builtin_use.err",
            ImplicitTruncation => "implicit_truncation.err",
            ImplicitConversion => "implicit_conversion.err",
            UnreachableCall => "unreachable_call.err",
            MissingReturn => "missing_return.err",
            InvalidLoad => "invalid_load.err",
            NullableAttribute => "nullable_attribute.err",
            User => "user.err",
            Execution => "exec.err",
            External => "external.err",
        }
    }

    /// Return whether the reason emits a diagnostic artifact file.
    pub fn emits_artifact(self) -> bool {
        !self.artifact_suffix().is_empty()
    }

    /// Return whether the path ended normally.
    pub fn is_normal_exit(self) -> bool {
        self.tag() <= Self::NORMAL
    }

    /// Return whether the path was cut short without an error in the program.
    pub fn is_early_termination(self) -> bool {
        self.tag() > Self::NORMAL && self.tag() <= Self::EARLY
    }

    /// Return whether the path ended because of a solver error.
    pub fn is_solver_error(self) -> bool {
        self.tag() > Self::EARLY && self.tag() <= Self::SOLVERERR
    }

    /// Return whether the path ended because of an error in the program under test.
    pub fn is_program_error(self) -> bool {
        self.tag() > Self::SOLVERERR && self.tag() <= Self::PROGERR
    }

    /// Return whether the path ended because of an error by the user of the engine.
    pub fn is_user_error(self) -> bool {
        self.tag() > Self::PROGERR && self.tag() <= Self::USERERR
    }

    /// Return whether the path ended because of an error inside the engine.
    pub fn is_execution_error(self) -> bool {
        self.tag() > Self::USERERR && self.tag() <= Self::EXECERR
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{self:?}")
    }
}
