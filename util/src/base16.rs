// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Canonical hex forms: uppercase, full width, no `0x` prefix.

/// Errors from hex decoding.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Base16Error {
    #[error("hex string has {actual} digits, expected at most {max}")]
    TooLong { max: usize, actual: usize },

    #[error("invalid hex digit")]
    InvalidDigit,
}

/// Encodes bytes as uppercase hex.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    faster_hex::hex_string_upper(bytes)
}

/// Decodes a hex string into a right-aligned, zero-left-padded byte string of
/// exactly `width_bytes` bytes. Accepts odd-length and short inputs, and an
/// optional `0x` prefix, the way external callers tend to write hex.
pub fn hex_to_fixed_width_bytes(hex: &str, width_bytes: usize) -> Result<Vec<u8>, Base16Error> {
    let digits = hex
        .trim()
        .strip_prefix("0x")
        .or_else(|| hex.trim().strip_prefix("0X"))
        .unwrap_or_else(|| hex.trim());
    let digits: String = digits.chars().filter(|c| !c.is_whitespace()).collect();

    if digits.len() > width_bytes * 2 {
        return Err(Base16Error::TooLong {
            max: width_bytes * 2,
            actual: digits.len(),
        });
    }

    // Left-pad to an even, full-width digit count before decoding.
    let mut padded = String::with_capacity(width_bytes * 2);
    for _ in digits.len()..width_bytes * 2 {
        padded.push('0');
    }
    padded.push_str(&digits);

    let mut out = vec![0u8; width_bytes];
    faster_hex::hex_decode(padded.as_bytes(), &mut out).map_err(|_| Base16Error::InvalidDigit)?;
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn encodes_uppercase() {
        assert_eq!(bytes_to_hex(&[0xAB, 0x01, 0xFF]), "AB01FF");
    }

    #[test]
    fn decodes_short_and_prefixed() {
        assert_eq!(hex_to_fixed_width_bytes("FF", 4).unwrap(), vec![0, 0, 0, 0xFF]);
        assert_eq!(hex_to_fixed_width_bytes("0x1A2", 2).unwrap(), vec![0x01, 0xA2]);
        assert_eq!(
            hex_to_fixed_width_bytes("AB CD", 2).unwrap(),
            vec![0xAB, 0xCD]
        );
    }

    #[test]
    fn rejects_oversized_and_garbage() {
        assert!(matches!(
            hex_to_fixed_width_bytes("ABCDE", 2),
            Err(Base16Error::TooLong { .. })
        ));
        assert_eq!(
            hex_to_fixed_width_bytes("ZZ", 1),
            Err(Base16Error::InvalidDigit)
        );
    }

    #[test]
    fn roundtrip() {
        let bytes = vec![0x00, 0x12, 0xAB, 0xFF];
        let hex = bytes_to_hex(&bytes);
        assert_eq!(hex_to_fixed_width_bytes(&hex, 4).unwrap(), bytes);
    }
}
