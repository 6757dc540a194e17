//! Data types shared across the pipeline stages.

use std::collections::BTreeSet;

/// One line of textual CFI at a specific code address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressCfi {
    /// The address this record applies to.
    pub address: u32,
    /// The raw CFI rule text, e.g. `.cfa: sp 0 + .ra: lr`.
    pub cfi_text: String,
}

/// The CFI records belonging to a single function, as assembled from the
/// textual stream but not yet parsed into unwind actions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCfi {
    /// The function's size in bytes.
    pub size: u32,
    /// The per-address CFI, ordered by increasing address. The first entry's
    /// address is the function's start address.
    pub address_cfi: Vec<AddressCfi>,
}

impl FunctionCfi {
    /// The function's start address, i.e. the address of its first CFI record.
    pub fn start_address(&self) -> u32 {
        self.address_cfi[0].address
    }
}

/// A normalized unwind action for a single code address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnwindType {
    /// Return via the link register.
    ReturnToLr,

    /// Adjust the stack pointer by `sp_offset` (may be zero), then pop
    /// `registers`. At least one of the two must be non-trivial.
    UpdateSpAndOrPopRegisters {
        /// The stack pointer delta to apply before any pops.
        sp_offset: i32,
        /// The registers to pop, in `[4, 15]`.
        registers: BTreeSet<u8>,
    },

    /// Restore the stack pointer from `source_register`, then apply
    /// `sp_offset`.
    RestoreSpFromRegister {
        /// The register the stack pointer is restored from.
        source_register: u8,
        /// The stack pointer delta to apply afterwards.
        sp_offset: i32,
    },

    /// No runtime action is necessary, e.g. a floating-point register pop.
    NoAction,
}

/// An [`UnwindType`] together with the code offset it applies from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressUnwind {
    /// The offset from the function's start address.
    pub address_offset: u32,
    /// The unwind action to perform from this offset onwards.
    pub action: UnwindType,
}

/// The complete, normalized unwind information for one function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionUnwind {
    /// The function's start address.
    pub address: u32,
    /// The function's size in bytes.
    pub size: u32,
    /// The unwind action at each recorded address, in increasing offset order.
    pub address_unwinds: Vec<AddressUnwind>,
}

/// An [`AddressUnwind`] whose action has been encoded, and extended with the
/// encodings of every higher-offset address in the same function.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EncodedAddressUnwind {
    /// The offset from the function's start address.
    pub address_offset: u32,
    /// The full opcode sequence needed to unwind from `address_offset`.
    pub complete_instruction_sequence: Vec<u8>,
}

/// A per-function group of [`EncodedAddressUnwind`]s, ordered by decreasing
/// `address_offset`. Two functions that produce byte-identical groups share a
/// single entry in the function offset table.
pub type SequenceGroup = Vec<EncodedAddressUnwind>;
