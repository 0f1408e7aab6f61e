use core::fmt;

use fxvm_bundle::BundleError;
use thiserror::Error;

/// Which address space a faulting access targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// The register file.
    Register,
    /// A bound input slot.
    Input(u32),
    /// The constants buffer (extern string arguments).
    Constants,
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Register => f.write_str("register"),
            Space::Input(slot) => write!(f, "input slot {slot}"),
            Space::Constants => f.write_str("constants"),
        }
    }
}

/// Errors produced while loading, configuring or running a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("malformed bundle: {0}")]
    MalformedBundle(#[from] BundleError),

    #[error("illegal instruction: opcode {opcode} at pc {pc}")]
    IllegalInstruction { pc: usize, opcode: u32 },

    #[error("{space} index {index} out of range (length {len})")]
    IndexOutOfRange { space: Space, index: i64, len: usize },

    #[error("integer division by zero at pc {pc}")]
    DivideByZero { pc: usize },

    #[error("extern {name:?} signature mismatch: {reason}")]
    SignatureMismatch { name: String, reason: String },

    #[error("unknown extern {0}")]
    UnknownExtern(String),

    #[error("input slot {slot} is not bound")]
    UnboundInput { slot: u32 },

    #[error("program counter {pc} ran past the end of a {len}-instruction program")]
    ProgramCounterOutOfRange { pc: usize, len: usize },

    #[error("input slot {slot} is outside the 64-slot table")]
    InvalidSlot { slot: usize },

    #[error("invalid resource: {0}")]
    InvalidResource(String),

    #[error("fault in group {group:?} thread {thread:?}: {source}")]
    Dispatch {
        group: [u32; 3],
        thread: [u32; 3],
        #[source]
        source: Box<VmError>,
    },
}

impl VmError {
    pub(crate) fn out_of_range(space: Space, index: impl Into<i64>, len: usize) -> Self {
        VmError::IndexOutOfRange {
            space,
            index: index.into(),
            len,
        }
    }

    /// The underlying fault, looking through [`VmError::Dispatch`].
    pub fn root(&self) -> &VmError {
        match self {
            VmError::Dispatch { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T, E = VmError> = core::result::Result<T, E>;
