//! Normalization of the `expect` option.
//!
//! Hosts hand the match pattern over either as a byte array or as a hex
//! string. Both normalize into a literal byte pattern before any I/O;
//! malformed input is rejected as an invalid argument.

use bytes::Bytes;
use portbridge_core::ClientError;
use serde::Deserialize;

/// Raw `expect` value as received from the host runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ExpectInput {
    /// Byte values 0..=255
    Bytes(Vec<u8>),
    /// Hex string; whitespace and `0x` separators are ignored,
    /// case-insensitive
    Hex(String),
}

impl ExpectInput {
    /// Produce the literal byte pattern, or `InvalidArgument`.
    pub fn normalize(&self) -> Result<Bytes, ClientError> {
        match self {
            ExpectInput::Bytes(b) => {
                if b.is_empty() {
                    return Err(ClientError::InvalidArgument(
                        "expect pattern must not be empty".into(),
                    ));
                }
                Ok(Bytes::copy_from_slice(b))
            }
            ExpectInput::Hex(s) => parse_hex(s).map(Bytes::from),
        }
    }
}

/// Parse a hex string into bytes. Whitespace and `0x`/`0X` separators are
/// stripped first; what remains must be a non-empty, even-length run of
/// hex digits.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, ClientError> {
    let mut digits = Vec::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        if c == '0' {
            if let Some('x' | 'X') = chars.peek() {
                chars.next();
                continue;
            }
        }
        match c.to_digit(16) {
            Some(d) => digits.push(d as u8),
            None => {
                return Err(ClientError::InvalidArgument(format!(
                    "invalid hex character {c:?} in expect pattern"
                )))
            }
        }
    }

    if digits.is_empty() {
        return Err(ClientError::InvalidArgument(
            "expect pattern must not be empty".into(),
        ));
    }
    if digits.len() % 2 != 0 {
        return Err(ClientError::InvalidArgument(
            "expect hex string has odd length".into(),
        ));
    }
    Ok(digits
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_hex() {
        assert_eq!(parse_hex("1b40").unwrap(), vec![0x1B, 0x40]);
        assert_eq!(parse_hex("00").unwrap(), vec![0x00]);
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(parse_hex("AbCd").unwrap(), vec![0xAB, 0xCD]);
        assert_eq!(parse_hex("FF").unwrap(), parse_hex("ff").unwrap());
    }

    #[test]
    fn whitespace_and_0x_separators_ignored() {
        assert_eq!(parse_hex("1b 40  0a").unwrap(), vec![0x1B, 0x40, 0x0A]);
        assert_eq!(parse_hex("0x1B 0x40").unwrap(), vec![0x1B, 0x40]);
        assert_eq!(parse_hex("0X12 0x34").unwrap(), vec![0x12, 0x34]);
    }

    #[test]
    fn bare_zero_pairs_are_not_swallowed() {
        // "00" is two zero digits, not an `0x` prefix.
        assert_eq!(parse_hex("0000").unwrap(), vec![0x00, 0x00]);
        assert_eq!(parse_hex("0102").unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn empty_and_odd_inputs_rejected() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("   ").is_err());
        assert!(parse_hex("0x").is_err());
        assert!(parse_hex("abc").is_err());
    }

    #[test]
    fn non_hex_rejected() {
        assert!(parse_hex("zz").is_err());
        assert!(parse_hex("1g").is_err());
    }

    #[test]
    fn byte_array_input_passes_through() {
        let input = ExpectInput::Bytes(vec![0x12, 0x00]);
        assert_eq!(input.normalize().unwrap(), Bytes::from_static(&[0x12, 0x00]));
        assert!(ExpectInput::Bytes(vec![]).normalize().is_err());
    }

    #[test]
    fn untagged_deserialization() {
        let b: ExpectInput = serde_json::from_value(serde_json::json!([18, 0])).unwrap();
        assert_eq!(b.normalize().unwrap(), Bytes::from_static(&[0x12, 0x00]));

        let h: ExpectInput = serde_json::from_value(serde_json::json!("0x00")).unwrap();
        assert_eq!(h.normalize().unwrap(), Bytes::from_static(&[0x00]));
    }
}
