//! Groups filtered `STACK CFI` lines into per-function [`FunctionCfi`] records.

use crate::error::{Error, ErrorKind};
use crate::model::{AddressCfi, FunctionCfi};

fn num_hex_32(input: &str) -> Result<u32, Error> {
    u32::from_str_radix(input, 16).map_err(|_| {
        ErrorKind::MalformedLine {
            line: input.to_owned(),
        }
        .into()
    })
}

/// Parses a `STACK CFI INIT <addr> <size> <rest>` line.
fn init_record(line: &str) -> Result<(u32, u32, &str), Error> {
    let malformed = || Error::from(ErrorKind::MalformedLine { line: line.to_owned() });

    let rest = line.strip_prefix("STACK CFI INIT ").ok_or_else(malformed)?;
    let mut parts = rest.splitn(3, char::is_whitespace);

    let address = num_hex_32(parts.next().ok_or_else(malformed)?)?;
    let size = num_hex_32(parts.next().ok_or_else(malformed)?)?;
    let text = parts.next().ok_or_else(malformed)?;

    Ok((address, size, text))
}

/// Parses a `STACK CFI <addr> <rest>` line.
fn delta_record(line: &str) -> Result<(u32, &str), Error> {
    let malformed = || Error::from(ErrorKind::MalformedLine { line: line.to_owned() });

    let rest = line.strip_prefix("STACK CFI ").ok_or_else(malformed)?;
    let mut parts = rest.splitn(2, char::is_whitespace);

    let address = num_hex_32(parts.next().ok_or_else(malformed)?)?;
    let text = parts.next().ok_or_else(malformed)?;

    Ok((address, text))
}

/// Validates the §3 `FunctionCfi` invariant: every address CFI record lies
/// within `[address, address + size)`, and addresses strictly increase.
/// The first record's address equaling `address` holds by construction
/// (it is always the `INIT` record's own address), so only the range and
/// monotonicity checks need to happen here.
fn validate_address_cfi(address: u32, size: u32, address_cfi: &[AddressCfi]) -> Result<(), Error> {
    let end = u64::from(address) + u64::from(size);
    let mut previous: Option<u32> = None;

    for cfi in address_cfi {
        let addr = u64::from(cfi.address);
        if addr < u64::from(address) || addr >= end {
            return Err(ErrorKind::Invariant {
                detail: "address CFI record address falls outside [start, start + size)",
            }
            .into());
        }
        if let Some(prev) = previous {
            if cfi.address <= prev {
                return Err(ErrorKind::Invariant {
                    detail: "address CFI records must have strictly increasing addresses",
                }
                .into());
            }
        }
        previous = Some(cfi.address);
    }

    Ok(())
}

/// Assembles a stream of already-filtered `STACK CFI` lines into
/// [`FunctionCfi`] records, one per `INIT` block.
///
/// Fails if the first line is not an `INIT` record, if a delta record
/// arrives before any `INIT` record has been seen, or if a flushed
/// function's address CFI records violate the §3 invariant (addresses
/// outside `[start, start + size)`, or not strictly increasing).
pub fn assemble_functions<'a, I>(lines: I) -> Result<Vec<FunctionCfi>, Error>
where
    I: Iterator<Item = &'a str>,
{
    let mut functions = Vec::new();
    let mut current_address: Option<u32> = None;
    let mut current_size = 0u32;
    let mut current_cfi: Vec<AddressCfi> = Vec::new();

    for line in lines {
        if line.starts_with("STACK CFI INIT ") {
            if let Some(address) = current_address.take() {
                validate_address_cfi(address, current_size, &current_cfi)?;
                functions.push(FunctionCfi {
                    size: current_size,
                    address_cfi: std::mem::take(&mut current_cfi),
                });
                tracing::trace!(address, "assembled function");
            }
            let (address, size, text) = init_record(line)?;
            current_address = Some(address);
            current_size = size;
            current_cfi.push(AddressCfi {
                address,
                cfi_text: text.to_owned(),
            });
        } else {
            if current_address.is_none() {
                return Err(ErrorKind::StructuralError {
                    detail: "STACK CFI delta record arrived before any INIT record",
                }
                .into());
            }
            let (address, text) = delta_record(line)?;
            current_cfi.push(AddressCfi {
                address,
                cfi_text: text.to_owned(),
            });
        }
    }

    match current_address {
        Some(address) => {
            validate_address_cfi(address, current_size, &current_cfi)?;
            functions.push(FunctionCfi {
                size: current_size,
                address_cfi: current_cfi,
            });
        }
        None => {
            if functions.is_empty() {
                return Err(ErrorKind::StructuralError {
                    detail: "no STACK CFI INIT record found in input",
                }
                .into());
            }
        }
    }

    Ok(functions)
}
