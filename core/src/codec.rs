//! Variable-byte integer codec.
//!
//! Each integer is written as 7-bit groups, least significant group first. The
//! byte carrying the last group of an integer has its high bit set; every other
//! byte has it clear. Integer boundaries are recovered from that bit alone.

use thiserror::Error;

const TERMINATOR: u8 = 0x80;
const PAYLOAD: u8 = 0x7f;
/// A u32 never needs more than five 7-bit groups.
const MAX_GROUPS: u32 = 5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("byte stream ends inside an integer")]
    Incomplete,
    #[error("integer at byte {0} does not fit in 32 bits")]
    Overflow(usize),
}

/// Append one integer to `buf`.
pub fn encode_into(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        let group = (value as u8) & PAYLOAD;
        value >>= 7;
        if value == 0 {
            buf.push(group | TERMINATOR);
            return;
        }
        buf.push(group);
    }
}

pub fn encode(values: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 2);
    for &v in values {
        encode_into(v, &mut buf);
    }
    buf
}

pub fn decode(bytes: &[u8]) -> Result<Vec<u32>, CodecError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut acc: u64 = 0;
    let mut groups: u32 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if groups == MAX_GROUPS {
            return Err(CodecError::Overflow(i));
        }
        acc |= u64::from(b & PAYLOAD) << (7 * groups);
        groups += 1;
        if b & TERMINATOR != 0 {
            let value = u32::try_from(acc).map_err(|_| CodecError::Overflow(i))?;
            out.push(value);
            acc = 0;
            groups = 0;
        }
    }
    if groups != 0 {
        return Err(CodecError::Incomplete);
    }
    Ok(out)
}
