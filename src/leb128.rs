//! ULEB128 encoding, used for the extended SP-delta opcode and for both
//! output table formats.

use crate::error::{Error, ErrorKind};

/// Appends the ULEB128 encoding of `value` to `out`.
pub fn write_unsigned(out: &mut Vec<u8>, value: u64) -> Result<(), Error> {
    leb128::write::unsigned(out, value).map_err(|e| Error::new(ErrorKind::EncodingRange {
        detail: format!("failed to write uleb128 value {value}"),
    }, e))?;
    Ok(())
}

/// Reads a ULEB128 value from the front of `input`, returning the value and
/// the number of bytes consumed. Used only by round-trip tests.
#[cfg(test)]
pub fn read_unsigned(mut input: &[u8]) -> Result<(u64, usize), Error> {
    let original_len = input.len();
    let value = leb128::read::unsigned(&mut input).map_err(|e| {
        Error::new(
            ErrorKind::EncodingRange {
                detail: "failed to read uleb128 value".to_owned(),
            },
            e,
        )
    })?;
    Ok((value, original_len - input.len()))
}
