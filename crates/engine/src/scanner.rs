//! Runtime bytecode opcode scanner.
//!
//! A linear walk over the deployed byte sequence, counting one opcode per
//! position and skipping PUSH immediates so data bytes are never counted as
//! instructions. Deployed bytecode legitimately ends mid-immediate (metadata
//! trailers, constructor leftovers), so a truncated trailing PUSH stops the
//! scan instead of failing it: the histogram built so far is final.

use opscan_common::{OpcodeByte, OpcodeHistogram};
use thiserror::Error;

/// Format violations that make a runtime blob unscannable.
///
/// Fatal for the offending contract's histogram only; the surrounding run
/// continues with the other contracts.
#[derive(Debug, Error, PartialEq)]
pub enum ScanError {
    /// The record carries no runtime bytecode at all.
    #[error("runtime bytecode is empty")]
    Empty,
    /// The hex string does not start with `0x`.
    #[error("runtime bytecode lacks the 0x prefix")]
    MissingPrefix,
    /// The hex string has an odd number of digits.
    #[error("runtime bytecode has odd length")]
    OddLength,
    /// The string contains non-hex characters.
    #[error("runtime bytecode is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Scan a 0x-prefixed runtime bytecode blob into an opcode histogram.
///
/// Re-scanning the same blob always yields the same histogram; callers cache
/// the result on the contract record and never recompute it.
pub fn scan_runtime(runtime: &str) -> Result<OpcodeHistogram, ScanError> {
    if runtime.is_empty() {
        return Err(ScanError::Empty);
    }
    let digits = runtime.strip_prefix("0x").ok_or(ScanError::MissingPrefix)?;
    if digits.len() % 2 != 0 {
        return Err(ScanError::OddLength);
    }

    let bytes = hex::decode(digits)?;

    let mut histogram = OpcodeHistogram::new();
    let mut pc = 0usize;
    while pc < bytes.len() {
        let opcode = OpcodeByte(bytes[pc]);
        *histogram.entry(opcode).or_default() += 1;
        pc += 1;

        let immediate = opcode.push_immediate_len();
        if immediate > 0 {
            if pc + immediate > bytes.len() {
                // Truncated trailing immediate: stop, keep what we have.
                break;
            }
            pc += immediate;
        }
    }

    Ok(histogram)
}
