//! Encodes per-function sequence groups into the function offset table,
//! deduplicating at the group granularity.

use indexmap::IndexMap;

use crate::error::Error;
use crate::leb128::write_unsigned;
use crate::model::SequenceGroup;

/// The packed function offset table: the concatenated blob, and the
/// starting byte offset of each distinct group within it.
pub struct FunctionOffsetTable {
    /// The concatenated, deduplicated `(address_offset, instruction_offset)`
    /// pairs, one run per distinct group.
    pub blob: Vec<u8>,
    /// Maps each distinct group to its starting offset in `blob`.
    pub offsets: IndexMap<SequenceGroup, u32>,
}

/// Encodes `groups` (one [`SequenceGroup`] per function, in function order)
/// into the function offset table, given the sequence-to-offset map produced
/// by [`crate::pack::pack_unwind_instruction_table`].
///
/// Two functions whose groups are byte-identical share a single encoded
/// entry; only the first occurrence is written.
pub fn encode_function_offset_table<'a, I>(
    groups: I,
    sequence_offsets: &IndexMap<Vec<u8>, u32>,
) -> Result<FunctionOffsetTable, Error>
where
    I: IntoIterator<Item = &'a SequenceGroup>,
{
    let mut blob = Vec::new();
    let mut offsets: IndexMap<SequenceGroup, u32> = IndexMap::new();

    for group in groups {
        if offsets.contains_key(group) {
            continue;
        }
        let start = u32::try_from(blob.len()).expect("function offset table exceeds u32");
        for entry in group {
            let instruction_offset = *sequence_offsets
                .get(&entry.complete_instruction_sequence)
                .expect("every sequence must have been packed into the instruction table");
            write_unsigned(&mut blob, entry.address_offset as u64)?;
            write_unsigned(&mut blob, instruction_offset as u64)?;
        }
        offsets.insert(group.clone(), start);
    }

    Ok(FunctionOffsetTable { blob, offsets })
}
