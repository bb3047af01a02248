//! Signature detection
//!
//! Merging or splitting a signed document would invalidate its signature,
//! so every source is screened before it is loaded. The check is a
//! pluggable predicate over raw bytes; hosts with a real verifier can supply
//! their own.

/// Predicate deciding whether a buffer carries a digital signature
pub trait SignatureDetector {
    fn has_signatures(&self, bytes: &[u8]) -> bool;
}

impl<F> SignatureDetector for F
where
    F: Fn(&[u8]) -> bool,
{
    fn has_signatures(&self, bytes: &[u8]) -> bool {
        self(bytes)
    }
}

/// Byte-level scan for signature dictionaries
///
/// Flags `/Type /Sig`, `/Type /DocTimeStamp` and any `/ByteRange` entry.
/// Objects hidden inside compressed object streams are not seen.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerScan;

const SIGNATURE_TYPES: [&[u8]; 2] = [b"/Sig", b"/DocTimeStamp"];

impl SignatureDetector for MarkerScan {
    fn has_signatures(&self, bytes: &[u8]) -> bool {
        if contains_name(bytes, b"/ByteRange") {
            return true;
        }
        let mut rest = bytes;
        while let Some(pos) = find(rest, b"/Type") {
            let after = &rest[pos + b"/Type".len()..];
            let value = skip_whitespace(after);
            if SIGNATURE_TYPES
                .iter()
                .any(|name| value.starts_with(name) && ends_name(&value[name.len()..]))
            {
                return true;
            }
            rest = after;
        }
        false
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// `name` occurs as a whole name token.
fn contains_name(bytes: &[u8], name: &[u8]) -> bool {
    let mut rest = bytes;
    while let Some(pos) = find(rest, name) {
        let after = &rest[pos + name.len()..];
        if ends_name(after) {
            return true;
        }
        rest = after;
    }
    false
}

fn skip_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace() && *b != 0)
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// A name token ends at whitespace, a delimiter, or the end of input.
fn ends_name(rest: &[u8]) -> bool {
    match rest.first() {
        None => true,
        Some(b) => {
            b.is_ascii_whitespace()
                || matches!(b, b'/' | b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'%' | 0)
        }
    }
}
