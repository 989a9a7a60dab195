//! On-disk form of every save artifact: compact JSON, UTF-8, percent-encoded.
//!
//! Encoding escapes every byte outside `A-Z a-z 0-9 - _ . ~` as `%HH` (uppercase hex).
//! Decoding accepts any literal byte and requires every `%` to be followed by two hex digits,
//! so files written by the game's own encoder (which leaves `!'()*` alone) still decode.

use crate::error::{DcError, Result};
use crate::value::DcValue;

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Encode a document for a file the game reads. Never pretty-printed.
pub fn encode(document: &DcValue) -> Result<Vec<u8>> {
    if !document.is_object() {
        return Err(DcError::NotADocument {
            found: document.type_name(),
        });
    }
    Ok(encode_value(document))
}

/// Encode any JSON value (index arrays, screenshot data-URI strings).
pub fn encode_value(value: &DcValue) -> Vec<u8> {
    percent_encode(value.to_json_compact().as_bytes())
}

/// Decode a save file whose root must be an object.
pub fn decode(bytes: &[u8]) -> Result<DcValue> {
    let value = decode_value(bytes)?;
    if !value.is_object() {
        return Err(DcError::NotADocument {
            found: value.type_name(),
        });
    }
    Ok(value)
}

/// Decode a file whose payload may be any JSON value.
pub fn decode_value(bytes: &[u8]) -> Result<DcValue> {
    let text = decode_text(bytes)?;
    DcValue::parse_json(&text)
}

/// Percent-decode and validate UTF-8, without parsing JSON.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    let raw = percent_decode(bytes.trim_ascii())?;
    String::from_utf8(raw).map_err(|e| DcError::MalformedEncoding {
        offset: e.utf8_error().valid_up_to(),
        reason: "decoded bytes are not UTF-8",
    })
}

/// Pretty JSON text for user-facing exports. Not percent-encoded.
pub fn to_pretty_json(value: &DcValue) -> String {
    value.to_json_pretty()
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

fn percent_encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 3);
    for &b in input {
        if is_unreserved(b) {
            out.push(b);
        } else {
            out.push(b'%');
            out.push(HEX_UPPER[usize::from(b >> 4)]);
            out.push(HEX_UPPER[usize::from(b & 0x0F)]);
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn percent_decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let b = input[i];
        if b != b'%' {
            out.push(b);
            i += 1;
            continue;
        }
        let (Some(&hi), Some(&lo)) = (input.get(i + 1), input.get(i + 2)) else {
            return Err(DcError::MalformedEncoding {
                offset: i,
                reason: "truncated percent escape",
            });
        };
        let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) else {
            return Err(DcError::MalformedEncoding {
                offset: i,
                reason: "non-hex digit in percent escape",
            });
        };
        out.push((hi << 4) | lo);
        i += 3;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::{decode, decode_value, encode, encode_value, percent_decode, percent_encode};
    use crate::error::DcError;
    use crate::value::DcValue;

    #[test]
    fn encode_escapes_everything_outside_unreserved_in_uppercase() {
        assert_eq!(percent_encode(b"aZ9-_.~"), b"aZ9-_.~");
        assert_eq!(percent_encode(b"{\"} !*'"), b"%7B%22%7D%20%21%2A%27");
        assert_eq!(percent_encode("é".as_bytes()), b"%C3%A9");
    }

    #[test]
    fn decode_accepts_lowercase_hex_and_literal_reserved_bytes() {
        assert_eq!(percent_decode(b"%7b!'()*").unwrap(), b"{!'()*");
    }

    #[test]
    fn decode_rejects_broken_escapes() {
        assert!(matches!(
            percent_decode(b"%7"),
            Err(DcError::MalformedEncoding { offset: 0, .. })
        ));
        assert!(matches!(
            percent_decode(b"ab%zz"),
            Err(DcError::MalformedEncoding { offset: 2, .. })
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        assert!(matches!(
            decode_value(b"%22%FF%22"),
            Err(DcError::MalformedEncoding { .. })
        ));
    }

    #[test]
    fn decode_strips_surrounding_whitespace() {
        let doc = decode(b"  %7B%22a%22%3A1%7D\r\n").unwrap();
        assert_eq!(doc.get("a").and_then(DcValue::as_i64), Some(1));
    }

    #[test]
    fn decode_reports_json_and_root_errors() {
        assert!(matches!(decode(b"%7B%7B"), Err(DcError::MalformedJson(_))));
        assert!(matches!(
            decode(b"%5B1%5D"),
            Err(DcError::NotADocument { found: "array" })
        ));
    }

    #[test]
    fn encode_refuses_non_documents_but_encode_value_accepts_them() {
        let list = DcValue::Array(vec![DcValue::from("x")]);
        assert!(matches!(encode(&list), Err(DcError::NotADocument { .. })));
        assert_eq!(encode_value(&list), b"%5B%22x%22%5D");
    }
}
