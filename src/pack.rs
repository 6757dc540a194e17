//! Packs the distinct complete instruction sequences produced by the
//! [`crate::sequence`] module into a single deduplicated blob.

use std::cmp::Ordering;

use indexmap::IndexMap;

/// The packed unwind instruction table: the concatenated blob, and the
/// starting byte offset of each distinct sequence within it.
pub struct UnwindInstructionTable {
    /// The concatenated, deduplicated instruction bytes.
    pub blob: Vec<u8>,
    /// Maps each distinct sequence to its starting offset in `blob`.
    pub offsets: IndexMap<Vec<u8>, u32>,
}

/// Packs `sequences` (every complete instruction sequence produced across
/// every function, duplicates included) into a deduplicated table.
///
/// Distinct sequences are laid out in descending order of
/// `count(s) / length(s)`, so that sequences referenced most often per byte
/// land at the smallest offsets, minimizing the total size of the ULEB128
/// offsets written by the function offset table.
pub fn pack_unwind_instruction_table<I>(sequences: I) -> UnwindInstructionTable
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut counts: IndexMap<Vec<u8>, u64> = IndexMap::new();
    for sequence in sequences {
        *counts.entry(sequence).or_insert(0) += 1;
    }

    let mut distinct: Vec<(Vec<u8>, u64)> = counts.into_iter().collect();
    distinct.sort_by(|(seq_a, count_a), (seq_b, count_b)| {
        score_then_bytes(*count_a, seq_a, *count_b, seq_b)
    });

    let mut blob = Vec::new();
    let mut offsets = IndexMap::new();
    for (sequence, _count) in distinct {
        let offset = u32::try_from(blob.len()).expect("unwind instruction table exceeds u32");
        blob.extend_from_slice(&sequence);
        offsets.insert(sequence, offset);
    }

    UnwindInstructionTable { blob, offsets }
}

fn score_then_bytes(count_a: u64, seq_a: &[u8], count_b: u64, seq_b: &[u8]) -> Ordering {
    score_cmp(count_a, seq_a.len(), count_b, seq_b.len()).then_with(|| seq_a.cmp(seq_b))
}

/// Orders by descending `count / length`, treating a zero-length sequence as
/// having unbounded score since it consumes no space wherever it is placed.
fn score_cmp(count_a: u64, len_a: usize, count_b: u64, len_b: usize) -> Ordering {
    match (len_a, len_b) {
        (0, 0) => Ordering::Equal,
        (0, _) => Ordering::Less,
        (_, 0) => Ordering::Greater,
        _ => {
            let lhs = count_a as u128 * len_b as u128;
            let rhs = count_b as u128 * len_a as u128;
            rhs.cmp(&lhs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduplicates_identical_sequences() {
        let table = pack_unwind_instruction_table(vec![vec![0xB0], vec![0xB0], vec![0x03, 0xB0]]);
        assert_eq!(table.offsets.len(), 2);
        assert_eq!(table.blob.len(), 3);
    }

    #[test]
    fn higher_count_per_byte_sorts_first() {
        let frequent = vec![0xB0];
        let rare = vec![0xAB, 0x03, 0xB0];
        let table = pack_unwind_instruction_table(vec![
            frequent.clone(),
            frequent.clone(),
            frequent.clone(),
            rare.clone(),
        ]);
        assert_eq!(*table.offsets.get(&frequent).unwrap(), 0);
        assert_eq!(*table.offsets.get(&rare).unwrap(), 1);
    }

    #[test]
    fn ties_break_lexicographically() {
        let a = vec![0x01];
        let b = vec![0x02];
        let table = pack_unwind_instruction_table(vec![a.clone(), b.clone()]);
        assert_eq!(*table.offsets.get(&a).unwrap(), 0);
        assert_eq!(*table.offsets.get(&b).unwrap(), 1);
    }

    #[test]
    fn deterministic_across_insertion_order() {
        let a = vec![0x01];
        let b = vec![0x02];
        let table1 = pack_unwind_instruction_table(vec![a.clone(), b.clone()]);
        let table2 = pack_unwind_instruction_table(vec![b, a]);
        assert_eq!(table1.blob, table2.blob);
    }
}
