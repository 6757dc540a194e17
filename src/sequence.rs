//! Builds the cumulative-suffix opcode sequences for a function's unwind
//! actions.

use crate::encode::encode_action;
use crate::error::Error;
use crate::model::{EncodedAddressUnwind, FunctionUnwind, SequenceGroup};

/// Encodes a function's address unwinds into the complete cumulative opcode
/// sequences the on-device unwinder expects, returned in decreasing
/// `address_offset` order.
///
/// Unwinding from a PC at a given offset requires first undoing that
/// offset's own action, then every earlier offset's action, down to the
/// function's entry state. So the highest-offset entry carries the full
/// chain back to entry, and the lowest-offset (function entry) entry
/// carries only its own opcode bytes.
pub fn build_sequence_group(function: &FunctionUnwind) -> Result<SequenceGroup, Error> {
    let mut ascending: Vec<_> = function.address_unwinds.iter().collect();
    ascending.sort_by_key(|address_unwind| address_unwind.address_offset);

    let mut group = Vec::with_capacity(ascending.len());
    let mut accumulated = Vec::new();
    for address_unwind in ascending {
        let own_bytes = encode_action(&address_unwind.action)?;
        let mut complete = own_bytes;
        complete.extend_from_slice(&accumulated);
        accumulated = complete.clone();
        group.push(EncodedAddressUnwind {
            address_offset: address_unwind.address_offset,
            complete_instruction_sequence: complete,
        });
    }
    group.reverse();
    Ok(group)
}
