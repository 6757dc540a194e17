//! Translates textual `STACK CFI` records into the compact unwind table
//! format used for on-device stack unwinding of 32-bit ARM code.
//!
//! The entry point is [`build_unwind_tables`], which consumes a line stream
//! and returns the two output blobs: the unwind instruction table and the
//! function offset table.

#![warn(missing_docs)]

mod assembler;
mod encode;
pub mod error;
mod filter;
mod leb128;
mod model;
mod offsets;
mod pack;
mod parse;
mod sequence;

pub use error::{Error, ErrorKind, Result};
pub use model::{
    AddressCfi, AddressUnwind, EncodedAddressUnwind, FunctionCfi, FunctionUnwind, SequenceGroup,
    UnwindType,
};
pub use offsets::FunctionOffsetTable;
pub use pack::UnwindInstructionTable;

/// Governs how [`build_unwind_tables`] reacts to a `STACK CFI` line that
/// matches none of the four known grammars.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Abort the whole run with the offending [`Error`]. This is the
    /// specified behavior.
    #[default]
    Fatal,
    /// Drop the offending function and continue with the rest of the input.
    SkipFunction,
}

/// The two output blobs produced by [`build_unwind_tables`].
pub struct UnwindTables {
    /// The deduplicated unwind instruction table.
    pub instruction_table: UnwindInstructionTable,
    /// The function offset table.
    pub offset_table: FunctionOffsetTable,
}

/// Converts a normalized [`FunctionCfi`] (assembled but not yet parsed) into
/// its [`FunctionUnwind`], tracking the CFA-SP offset across address records.
#[tracing::instrument(level = "trace", skip_all, fields(address = function.start_address()))]
fn parse_function(function: &FunctionCfi) -> Result<FunctionUnwind, Error> {
    let address = function.start_address();
    let mut cfa_sp: i64 = 0;
    let mut address_unwinds = Vec::with_capacity(function.address_cfi.len());

    for cfi in &function.address_cfi {
        let (action, new_cfa_sp) = parse::parse_address_cfi(&cfi.cfi_text, cfa_sp)?;
        cfa_sp = new_cfa_sp;
        address_unwinds.push(AddressUnwind {
            address_offset: cfi.address - address,
            action,
        });
    }

    Ok(FunctionUnwind {
        address,
        size: function.size,
        address_unwinds,
    })
}

/// Builds the unwind instruction table and function offset table from a
/// stream of textual `STACK CFI` lines.
///
/// `lines` need not be pre-filtered: non-CFI lines and tombstone functions
/// are dropped internally. Under [`ParseMode::Fatal`] (the default), the
/// first unparseable line aborts the whole run; under
/// [`ParseMode::SkipFunction`], only the function containing it is dropped.
#[tracing::instrument(level = "trace", name = "build_unwind_tables", skip_all)]
pub fn build_unwind_tables<'a, I>(lines: I, mode: ParseMode) -> Result<UnwindTables, Error>
where
    I: Iterator<Item = &'a str>,
{
    let filtered = filter::filter_tombstones(lines);
    let functions = assembler::assemble_functions(filtered)?;

    let mut sequence_groups = Vec::with_capacity(functions.len());
    for function in &functions {
        let span = tracing::trace_span!("function", address = function.start_address());
        let _enter = span.enter();

        let parsed = parse_function(function);
        let unwind = match (parsed, mode) {
            (Ok(unwind), _) => unwind,
            (Err(_), ParseMode::SkipFunction) => {
                tracing::debug!(
                    address = function.start_address(),
                    "skipping function with unparseable CFI"
                );
                continue;
            }
            (Err(err), ParseMode::Fatal) => return Err(err),
        };

        let group = sequence::build_sequence_group(&unwind)?;
        tracing::debug!(address = unwind.address, "assembled unwind sequence group");
        sequence_groups.push(group);
    }

    let all_sequences = sequence_groups
        .iter()
        .flatten()
        .map(|entry| entry.complete_instruction_sequence.clone());
    let instruction_table = pack::pack_unwind_instruction_table(all_sequences);

    let offset_table =
        offsets::encode_function_offset_table(&sequence_groups, &instruction_table.offsets)?;

    Ok(UnwindTables {
        instruction_table,
        offset_table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_return_only() {
        let lines = ["STACK CFI INIT 1000 4 .cfa: sp 0 + .ra: lr"];
        let tables = build_unwind_tables(lines.into_iter(), ParseMode::Fatal).unwrap();
        assert_eq!(tables.instruction_table.blob, vec![0xB0]);
    }

    #[test]
    fn s2_prologue_push_then_sub_sp() {
        let lines = [
            "STACK CFI INIT 2000 20 .cfa: sp 0 + .ra: lr",
            "STACK CFI 2004 .cfa: sp 20 + .ra: .cfa -4 + ^ r4: .cfa -20 + ^ r5: .cfa -16 + ^ r6: .cfa -12 + ^ r7: .cfa -8 + ^",
            "STACK CFI 2008 .cfa: sp 36 +",
        ];
        let tables = build_unwind_tables(lines.into_iter(), ParseMode::Fatal).unwrap();
        // Highest offset (8) carries the complete cumulative sequence: undo
        // the sub-sp, then undo the push, then return via lr.
        assert!(tables
            .instruction_table
            .blob
            .windows(3)
            .any(|w| w == [0x03, 0xAB, 0xB0]));
    }

    #[test]
    fn s3_large_sp_adjust() {
        // 0x300 = 768; CFI rule text carries plain decimal numbers.
        let lines = [
            "STACK CFI INIT 3000 8 .cfa: sp 0 + .ra: lr",
            "STACK CFI 3004 .cfa: sp 768 +",
        ];
        let tables = build_unwind_tables(lines.into_iter(), ParseMode::Fatal).unwrap();
        assert!(tables
            .instruction_table
            .blob
            .windows(2)
            .any(|w| w[0] == 0xB2));
    }

    #[test]
    fn rejects_hex_digits_inside_cfi_rule_text() {
        let lines = [
            "STACK CFI INIT 3000 8 .cfa: sp 0 + .ra: lr",
            "STACK CFI 3004 .cfa: sp 0x300 +",
        ];
        assert!(build_unwind_tables(lines.into_iter(), ParseMode::Fatal).is_err());
    }

    #[test]
    fn s5_tombstone_skipped() {
        let with_tombstone = [
            "STACK CFI INIT 0 10 .cfa: sp 0 + .ra: lr",
            "STACK CFI 4 .cfa: sp 4 +",
            "STACK CFI INIT 1000 4 .cfa: sp 0 + .ra: lr",
        ];
        let without_tombstone = ["STACK CFI INIT 1000 4 .cfa: sp 0 + .ra: lr"];

        let a = build_unwind_tables(with_tombstone.into_iter(), ParseMode::Fatal).unwrap();
        let b = build_unwind_tables(without_tombstone.into_iter(), ParseMode::Fatal).unwrap();
        assert_eq!(a.instruction_table.blob, b.instruction_table.blob);
        assert_eq!(a.offset_table.blob, b.offset_table.blob);
    }

    #[test]
    fn s6_deduplicates_identical_groups() {
        let lines = [
            "STACK CFI INIT 1000 4 .cfa: sp 0 + .ra: lr",
            "STACK CFI INIT 2000 4 .cfa: sp 0 + .ra: lr",
        ];
        let tables = build_unwind_tables(lines.into_iter(), ParseMode::Fatal).unwrap();
        assert_eq!(tables.instruction_table.blob, vec![0xB0]);
        assert_eq!(tables.offset_table.offsets.len(), 1);
    }

    #[test]
    fn table_layout_snapshot() {
        #[derive(Debug)]
        struct TableLayoutSnapshot {
            instruction_blob: Vec<u8>,
            offset_blob: Vec<u8>,
        }

        let lines = [
            "STACK CFI INIT 2000 20 .cfa: sp 0 + .ra: lr",
            "STACK CFI 2004 .cfa: sp 20 + .ra: .cfa -4 + ^ r4: .cfa -20 + ^ r5: .cfa -16 + ^ r6: .cfa -12 + ^ r7: .cfa -8 + ^",
            "STACK CFI 2008 .cfa: sp 36 +",
        ];
        let tables = build_unwind_tables(lines.into_iter(), ParseMode::Fatal).unwrap();
        let snapshot = TableLayoutSnapshot {
            instruction_blob: tables.instruction_table.blob,
            offset_blob: tables.offset_table.blob,
        };

        insta::assert_debug_snapshot!(snapshot, @r###"
       ⋮TableLayoutSnapshot {
       ⋮    instruction_blob: [
       ⋮        176,
       ⋮        171,
       ⋮        176,
       ⋮        3,
       ⋮        171,
       ⋮        176,
       ⋮    ],
       ⋮    offset_blob: [
       ⋮        8,
       ⋮        3,
       ⋮        4,
       ⋮        1,
       ⋮        0,
       ⋮        0,
       ⋮    ],
       ⋮}
        "###);
    }

    #[test]
    fn skip_function_mode_drops_only_the_bad_function() {
        let lines = [
            "STACK CFI INIT 1000 4 not a known grammar",
            "STACK CFI INIT 2000 4 .cfa: sp 0 + .ra: lr",
        ];
        let tables = build_unwind_tables(lines.into_iter(), ParseMode::SkipFunction).unwrap();
        assert_eq!(tables.instruction_table.blob, vec![0xB0]);
    }
}
