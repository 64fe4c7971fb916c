//! Canonical forms for hex strings, addresses and 32-byte hashes.
//!
//! Everything that reaches a request body, a signature or a hash goes through these helpers
//! first. The canonical hex form is lowercase with a `0x` prefix; the canonical address form
//! is the EIP-55 checksummed string.

use alloy_primitives::{hex, Address, B256};
use serde_json::Value;

use crate::error::{Result, SafeError};

const ADDRESS_LEN: usize = 20;
const HASH_LEN: usize = 32;

/// Placeholder used in error messages when a value has no string form.
pub const UNSTRINGIFIABLE: &str = "<unstringifiable>";

/// Error messages used by [`to_canonical_hex`].
#[derive(Debug, Clone, Copy)]
pub struct HexMessages<'a> {
    pub required: &'a str,
    pub invalid: &'a str,
}

impl Default for HexMessages<'_> {
    fn default() -> Self {
        Self {
            required: "hex value is required",
            invalid: "invalid hex value",
        }
    }
}

/// String form of a loosely typed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Stringified {
    Missing,
    Text(String),
    Unstringifiable,
}

impl Stringified {
    pub(crate) fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Stringified::Missing,
            Some(Value::String(s)) => Stringified::Text(s.clone()),
            Some(Value::Number(n)) => Stringified::Text(n.to_string()),
            Some(Value::Bool(b)) => Stringified::Text(b.to_string()),
            Some(Value::Array(_)) | Some(Value::Object(_)) => Stringified::Unstringifiable,
        }
    }
}

/// Display form of an untrusted value for error messages. Never fails.
pub(crate) fn describe(value: &Value) -> String {
    match Stringified::of(Some(value)) {
        Stringified::Missing => "null".to_string(),
        Stringified::Text(s) => s,
        Stringified::Unstringifiable => UNSTRINGIFIABLE.to_string(),
    }
}

/// Normalizes a hex string to lowercase `0x`-prefixed form.
///
/// Surrounding whitespace is ignored and a `0x`/`0X` prefix is optional. The digits must be
/// non-empty, of even length and all hexadecimal. Error messages embed `input` as given.
pub fn to_canonical_hex(input: &str, messages: HexMessages<'_>) -> Result<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(SafeError::Required(messages.required.to_string()));
    }

    match decode_digits(strip_hex_prefix(trimmed)) {
        Some(bytes) if !bytes.is_empty() => Ok(hex::encode_prefixed(bytes)),
        _ => Err(SafeError::InvalidFormat(format!("{}: {input}", messages.invalid))),
    }
}

/// Same as [`to_canonical_hex`] for a loosely typed value.
///
/// Absent and `null` values are `Required`; arrays and objects have no string form and are
/// reported as `Required` with the [`UNSTRINGIFIABLE`] placeholder.
pub fn value_to_canonical_hex(value: Option<&Value>, messages: HexMessages<'_>) -> Result<String> {
    match Stringified::of(value) {
        Stringified::Missing => Err(SafeError::Required(messages.required.to_string())),
        Stringified::Unstringifiable => {
            Err(SafeError::Required(format!("{}: {UNSTRINGIFIABLE}", messages.required)))
        }
        Stringified::Text(text) => to_canonical_hex(&text, messages),
    }
}

/// Canonicalizes a 32-byte hash, failing with `message` when it is not exactly 32 bytes of hex.
pub fn to_canonical_hash(input: &str, message: &str) -> Result<B256> {
    match decode_digits(strip_hex_prefix(input.trim())) {
        Some(bytes) if bytes.len() == HASH_LEN => Ok(B256::from_slice(&bytes)),
        _ => Err(SafeError::InvalidFormat(format!("{message}: {input}"))),
    }
}

/// Parses a 20-byte address in any letter casing, with or without a `0x` prefix.
pub fn parse_address(input: &str) -> Option<Address> {
    decode_digits(strip_hex_prefix(input.trim()))
        .filter(|bytes| bytes.len() == ADDRESS_LEN)
        .map(|bytes| Address::from_slice(&bytes))
}

pub fn is_valid_address(input: &str) -> bool {
    parse_address(input).is_some()
}

/// Returns the checksummed form of `input`, or `None` when it is not an address.
pub fn to_checksummed(input: &str) -> Option<String> {
    parse_address(input).map(|address| address.to_checksum(None))
}

/// Two address strings are equal iff their canonical forms match.
pub fn addresses_equal(a: &str, b: &str) -> bool {
    match (parse_address(a), parse_address(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

/// Decodes unprefixed hex digits. A second `0x` after the stripped one is not accepted.
fn decode_digits(digits: &str) -> Option<Vec<u8>> {
    if digits.starts_with("0x") {
        return None;
    }

    hex::decode(digits).ok()
}
