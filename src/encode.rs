//! Encodes a single normalized [`UnwindType`] into its EHABI opcode bytes.

use crate::error::{Error, ErrorKind};
use crate::model::UnwindType;

const OP_FINISH: u8 = 0xB0;
const OP_SP_DELTA_LARGE: u8 = 0xB2;

fn encode_sp_delta(sp_offset: i32, out: &mut Vec<u8>) -> Result<(), Error> {
    if sp_offset == 0 {
        return Ok(());
    }
    if sp_offset % 4 != 0 {
        return Err(ErrorKind::EncodingRange {
            detail: format!("sp offset {sp_offset} is not a multiple of 4"),
        }
        .into());
    }

    let abs_offset = sp_offset.unsigned_abs();
    let base: u8 = if sp_offset < 0 { 0x40 } else { 0x00 };

    if (0x04..=0x200).contains(&abs_offset) {
        out.push(base | (((abs_offset.min(0x100) - 4) >> 2) as u8));
        if abs_offset > 0x104 {
            out.push(base | (((abs_offset - 0x100 - 4) >> 2) as u8));
        }
    } else if sp_offset > 0 {
        out.push(OP_SP_DELTA_LARGE);
        crate::leb128::write_unsigned(out, ((abs_offset - 0x204) >> 2) as u64)?;
    } else {
        return Err(ErrorKind::EncodingRange {
            detail: format!("sp offset {sp_offset} has no negative extended encoding"),
        }
        .into());
    }
    Ok(())
}

fn encode_pop(registers: &std::collections::BTreeSet<u8>, out: &mut Vec<u8>) -> Result<(), Error> {
    if registers.is_empty() {
        return Ok(());
    }
    for &r in registers {
        if !(4..=15).contains(&r) {
            return Err(ErrorKind::RegisterDomain { register: Some(r) }.into());
        }
    }

    if registers.contains(&14) {
        let k = registers.len() as u32 - 1;
        let run_is_contiguous_from_r4 =
            (1..=8).contains(&k) && (4..4 + k as u8).all(|r| registers.contains(&r));
        if run_is_contiguous_from_r4 {
            out.push(0xA8 | (k - 1) as u8);
            return Ok(());
        }
    }

    let mut mask: u16 = 0;
    for &r in registers {
        mask |= 1 << (r - 4);
    }
    out.push(0x80 | (mask >> 8) as u8);
    out.push((mask & 0xFF) as u8);
    Ok(())
}

/// Encodes a single unwind action into its complete opcode sequence,
/// including the trailing `Finish` opcode where the action terminates
/// unwinding.
pub fn encode_action(action: &UnwindType) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    match action {
        UnwindType::ReturnToLr => {
            out.push(OP_FINISH);
        }
        UnwindType::UpdateSpAndOrPopRegisters {
            sp_offset,
            registers,
        } => {
            if *sp_offset == 0 && registers.is_empty() {
                return Err(ErrorKind::Invariant {
                    detail: "UpdateSpAndOrPopRegisters with no sp delta and no registers",
                }
                .into());
            }
            encode_sp_delta(*sp_offset, &mut out)?;
            encode_pop(registers, &mut out)?;
        }
        UnwindType::RestoreSpFromRegister {
            source_register,
            sp_offset,
        } => {
            if !(0..=15).contains(source_register) {
                return Err(ErrorKind::RegisterDomain {
                    register: Some(*source_register),
                }
                .into());
            }
            out.push(0x90 | source_register);
            encode_sp_delta(*sp_offset, &mut out)?;
        }
        UnwindType::NoAction => {}
    }
    Ok(out)
}

/// Decodes the bytes `encode_sp_delta` would have produced, back into the
/// signed SP offset. Used only by the round-trip property test below; the
/// real on-device unwinder is not part of this crate.
#[cfg(test)]
fn decode_sp_delta_for_test(bytes: &[u8]) -> i32 {
    if bytes.is_empty() {
        return 0;
    }
    if bytes[0] == OP_SP_DELTA_LARGE {
        let (quads, _) = crate::leb128::read_unsigned(&bytes[1..]).unwrap();
        return 0x204 + (quads as i32) * 4;
    }
    let negative = bytes[0] & 0x40 != 0;
    let abs_offset: i32 = if bytes.len() > 1 {
        0x104 + (bytes[1] & 0x3F) as i32 * 4
    } else {
        4 + (bytes[0] & 0x3F) as i32 * 4
    };
    if negative {
        -abs_offset
    } else {
        abs_offset
    }
}
