//! Base-62 short-code codec.
//!
//! Maps record ids to the compact, URL-safe strings handed out as short links.
//! The alphabet is `0-9a-z A-Z` (digits, then lowercase, then uppercase) and
//! codes are written most-significant digit first, so `encode(62) == "10"`.
//!
//! Only canonical codes decode: a code with a leading `'0'` (other than `"0"`
//! itself) is rejected, which keeps the string <-> id mapping bijective.

/// Symbols in digit order.
const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Radix of the encoding.
const BASE: u64 = 62;

/// Length of `encode(u64::MAX)`.
const MAX_CODE_LEN: usize = 11;

/// Reasons a short code cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("short code is empty")]
    Empty,
    #[error("invalid character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },
    #[error("short code has a leading zero")]
    LeadingZero,
    #[error("short code does not fit in 64 bits")]
    Overflow,
}

/// Encodes an id as a base-62 short code.
///
/// # Examples
///
/// ```
/// use linkgate_core::codec::encode;
///
/// assert_eq!(encode(1), "1");
/// assert_eq!(encode(61), "Z");
/// assert_eq!(encode(62), "10");
/// ```
#[must_use]
pub fn encode(mut id: u64) -> String {
    if id == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::with_capacity(MAX_CODE_LEN);
    while id > 0 {
        // id % 62 < 62, so the index is always in range.
        #[allow(clippy::cast_possible_truncation)]
        let digit = (id % BASE) as usize;
        digits.push(ALPHABET[digit]);
        id /= BASE;
    }
    digits.reverse();

    digits.into_iter().map(char::from).collect()
}

/// Decodes a base-62 short code back into an id.
///
/// # Errors
///
/// Returns a [`CodecError`] when the code is empty, contains a symbol outside
/// the alphabet, is not canonical, or names a value larger than `u64::MAX`.
///
/// # Examples
///
/// ```
/// use linkgate_core::codec::{decode, CodecError};
///
/// assert_eq!(decode("10"), Ok(62));
/// assert_eq!(decode(""), Err(CodecError::Empty));
/// ```
pub fn decode(code: &str) -> Result<u64, CodecError> {
    if code.is_empty() {
        return Err(CodecError::Empty);
    }
    if code.len() > 1 && code.starts_with('0') {
        return Err(CodecError::LeadingZero);
    }

    let mut id: u64 = 0;
    for (position, ch) in code.chars().enumerate() {
        let digit = digit_value(ch).ok_or(CodecError::InvalidCharacter { ch, position })?;
        id = id
            .checked_mul(BASE)
            .and_then(|v| v.checked_add(digit))
            .ok_or(CodecError::Overflow)?;
    }
    Ok(id)
}

fn digit_value(ch: char) -> Option<u64> {
    let value = match ch {
        '0'..='9' => u32::from(ch) - u32::from('0'),
        'a'..='z' => u32::from(ch) - u32::from('a') + 10,
        'A'..='Z' => u32::from(ch) - u32::from('A') + 36,
        _ => return None,
    };
    Some(u64::from(value))
}
