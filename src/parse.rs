//! Parses a single CFI rule string into a normalized [`UnwindType`], updating
//! the running canonical-frame-address stack-pointer offset.
//!
//! Four grammars are recognized, tried in order:
//!
//! - **N**ull: the initial, pre-prologue state.
//! - **P**ush / sub-sp: the standard prologue shape.
//! - **V**Push: floating-point register saves.
//! - **S**tore-SP: caching the stack pointer in a register for dynamic
//!   allocation.

use std::collections::BTreeSet;

use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map_res, opt, recognize, value};
use nom::multi::{many0, many1};
use nom::sequence::{pair, preceded, terminated, tuple};
use nom::IResult;

use crate::error::{Error, ErrorKind};
use crate::model::UnwindType;

type NomResult<'a, T> = IResult<&'a str, T>;

fn dec_u32(input: &str) -> NomResult<'_, u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(input)
}

fn dec_i32_negative(input: &str) -> NomResult<'_, i32> {
    map_res(recognize(pair(char('-'), digit1)), |s: &str| {
        s.parse::<i32>()
    })(input)
}

fn register_number(input: &str) -> NomResult<'_, u8> {
    map_res(digit1, |s: &str| s.parse::<u8>())(input)
}

/// Variant N: `.cfa: sp 0 + .ra: lr`.
fn variant_null(input: &str) -> NomResult<'_, ()> {
    value((), tag(".cfa: sp 0 + .ra: lr"))(input)
}

struct PushClauses {
    cfa_delta: Option<u32>,
    ra_saved: bool,
    registers: Vec<u8>,
}

/// Variant P: optional CFA delta, optional return-address save, any number of
/// register saves.
fn variant_push(input: &str) -> NomResult<'_, PushClauses> {
    let (input, cfa_delta) = opt(terminated(
        preceded(tag(".cfa: sp "), terminated(dec_u32, tag(" +"))),
        opt(char(' ')),
    ))(input)?;

    let (input, ra_offset) = opt(terminated(
        preceded(
            tag(".ra: .cfa "),
            terminated(dec_i32_negative, tag(" + ^")),
        ),
        opt(char(' ')),
    ))(input)?;

    let (input, registers) = many0(terminated(
        tuple((
            preceded(char('r'), register_number),
            preceded(tag(": .cfa "), terminated(dec_i32_negative, tag(" + ^"))),
        )),
        opt(char(' ')),
    ))(input)?;

    Ok((
        input,
        PushClauses {
            cfa_delta,
            ra_saved: ra_offset.is_some(),
            registers: registers.into_iter().map(|(reg, _offset)| reg).collect(),
        },
    ))
}

/// Variant V: optional CFA delta, one or more floating-point register saves.
fn variant_vpush(input: &str) -> NomResult<'_, Option<u32>> {
    let (input, cfa_delta) = opt(preceded(
        tag(".cfa: sp "),
        terminated(dec_u32, tag(" + ")),
    ))(input)?;

    let (input, _) = many1(terminated(
        preceded(
            tag("unnamed_register"),
            preceded(
                digit1,
                preceded(tag(": .cfa "), terminated(dec_i32_negative, tag(" + ^"))),
            ),
        ),
        opt(char(' ')),
    ))(input)?;

    Ok((input, cfa_delta))
}

/// Variant S: `.cfa: r<K> <N> +`.
fn variant_store_sp(input: &str) -> NomResult<'_, (u8, u32)> {
    tuple((
        preceded(tag(".cfa: r"), register_number),
        preceded(char(' '), terminated(dec_u32, tag(" +"))),
    ))(input)
}

/// Parses a single CFI rule string and produces the [`UnwindType`] it
/// describes, along with the updated CFA-SP offset.
pub fn parse_address_cfi(cfi_text: &str, current_cfa_sp: i64) -> Result<(UnwindType, i64), Error> {
    let malformed = || {
        Error::from(ErrorKind::MalformedLine {
            line: cfi_text.to_owned(),
        })
    };

    if all_consuming(variant_null)(cfi_text).is_ok() {
        return Ok((UnwindType::ReturnToLr, 0));
    }

    if let Ok((_, clauses)) = all_consuming(variant_push)(cfi_text) {
        return parse_push(clauses, current_cfa_sp);
    }

    if let Ok((_, cfa_delta)) = all_consuming(variant_vpush)(cfi_text) {
        return Ok(match cfa_delta {
            Some(new_cfa_sp) => {
                let new_cfa_sp = new_cfa_sp as i64;
                let sp_offset = sp_delta(current_cfa_sp, new_cfa_sp)?;
                (
                    UnwindType::UpdateSpAndOrPopRegisters {
                        sp_offset,
                        registers: BTreeSet::new(),
                    },
                    new_cfa_sp,
                )
            }
            None => (UnwindType::NoAction, current_cfa_sp),
        });
    }

    if let Ok((_, (register, new_sp))) = all_consuming(variant_store_sp)(cfi_text) {
        let new_cfa_sp = new_sp as i64;
        let sp_offset = sp_delta(current_cfa_sp, new_cfa_sp)?;
        return Ok((
            UnwindType::RestoreSpFromRegister {
                source_register: register,
                sp_offset,
            },
            new_cfa_sp,
        ));
    }

    Err(malformed())
}

fn parse_push(clauses: PushClauses, current_cfa_sp: i64) -> Result<(UnwindType, i64), Error> {
    let new_cfa_sp = clauses
        .cfa_delta
        .map(|n| n as i64)
        .unwrap_or(current_cfa_sp);

    let mut registers = BTreeSet::new();
    for reg in clauses.registers {
        if reg == 13 {
            return Err(ErrorKind::RegisterDomain {
                register: Some(reg),
            }
            .into());
        }
        if (4..=15).contains(&reg) {
            registers.insert(reg);
        }
    }
    if clauses.ra_saved {
        registers.insert(14);
    }

    let mut sp_offset = sp_delta(current_cfa_sp, new_cfa_sp)?;
    let pop_width = 4 * registers.len() as i64;
    if sp_offset >= pop_width {
        sp_offset -= pop_width;
    }

    Ok((
        UnwindType::UpdateSpAndOrPopRegisters {
            sp_offset: i32::try_from(sp_offset).map_err(|_| {
                Error::from(ErrorKind::EncodingRange {
                    detail: format!("sp offset {sp_offset} does not fit in i32"),
                })
            })?,
            registers,
        },
        new_cfa_sp,
    ))
}

fn sp_delta(current_cfa_sp: i64, new_cfa_sp: i64) -> Result<i32, Error> {
    let delta = new_cfa_sp - current_cfa_sp;
    if delta % 4 != 0 {
        return Err(ErrorKind::EncodingRange {
            detail: format!("sp delta {delta} is not a multiple of 4"),
        }
        .into());
    }
    i32::try_from(delta).map_err(|_| {
        Error::from(ErrorKind::EncodingRange {
            detail: format!("sp delta {delta} does not fit in i32"),
        })
    })
}
