//! Object Model Loader
//!
//! Turns one input buffer into a `lopdf::Document`. Admission limits are
//! enforced in two stages:
//!
//! 1. A byte-level pre-scan of the header and the last trailer (or
//!    cross-reference stream dictionary) rejects oversized, encrypted or
//!    object-heavy inputs before any object graph is allocated.
//! 2. After parsing, the real object count and the catalog are verified.
//!    The page ceiling is checked against the root's declared `/Count`
//!    before the tree is walked, then against the walked page count.
//!
//! Only the byte and object ceilings run before `lopdf` builds the graph:
//! page counts live in objects that may sit inside compressed object
//! streams, so they cannot be read from raw bytes.
//!
//! The loader borrows the input and keeps nothing of it.

use crate::config::Limits;
use crate::error::{LimitKind, PdfJoinError};
use crate::page_tree;
use lopdf::Document;
use tracing::debug;

/// The `%PDF-` header must start within this many bytes.
const HEADER_WINDOW: usize = 1024;

/// `startxref` is searched for within this many trailing bytes.
const TRAILER_WINDOW: usize = 2048;

/// What the pre-scan learned without parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prescan {
    /// Version from the header, e.g. "1.7"
    pub version: String,
    /// `/Size` of the last trailer or cross-reference stream
    pub declared_objects: Option<u32>,
    /// The last trailer carries an `/Encrypt` entry
    pub encrypted: bool,
}

/// Parse `bytes` into a document, enforcing `limits`.
pub fn load(bytes: &[u8], limits: &Limits) -> Result<Document, PdfJoinError> {
    let scan = admit(bytes, limits)?;

    let doc = Document::load_mem(bytes).map_err(|e| PdfJoinError::ParseError(e.to_string()))?;

    if doc.trailer.has(b"Encrypt") {
        return Err(PdfJoinError::ParseError(
            "Encrypted documents are not supported".into(),
        ));
    }

    let object_count = doc.objects.len() as u64;
    if object_count > u64::from(limits.max_objects) {
        return Err(PdfJoinError::ResourceLimit {
            index: None,
            limit: LimitKind::Objects,
            actual: object_count,
            max: u64::from(limits.max_objects),
        });
    }

    let declared = page_tree::pages_root_id(&doc)
        .ok()
        .and_then(|root| page_tree::declared_count(&doc, root))
        .and_then(|count| u64::try_from(count).ok());
    if let Some(declared) = declared {
        check_pages(declared, limits)?;
    }

    let pages = page_tree::walk(&doc)?;
    if pages.is_empty() {
        return Err(PdfJoinError::ParseError("PDF has no pages".into()));
    }
    let page_count = pages.len() as u64;
    check_pages(page_count, limits)?;

    debug!(
        version = %scan.version,
        objects = object_count,
        pages = page_count,
        "document loaded"
    );
    Ok(doc)
}

fn check_pages(count: u64, limits: &Limits) -> Result<(), PdfJoinError> {
    if count > u64::from(limits.max_pages) {
        return Err(PdfJoinError::ResourceLimit {
            index: None,
            limit: LimitKind::Pages,
            actual: count,
            max: u64::from(limits.max_pages),
        });
    }
    Ok(())
}

/// Admission gate: size, header, declared object count and encryption,
/// all decided from raw bytes.
pub fn admit(bytes: &[u8], limits: &Limits) -> Result<Prescan, PdfJoinError> {
    if bytes.len() > limits.max_input_bytes {
        return Err(PdfJoinError::ResourceLimit {
            index: None,
            limit: LimitKind::InputBytes,
            actual: bytes.len() as u64,
            max: limits.max_input_bytes as u64,
        });
    }

    let scan = prescan(bytes)?;

    if let Some(declared) = scan.declared_objects {
        if declared > limits.max_objects {
            return Err(PdfJoinError::ResourceLimit {
                index: None,
                limit: LimitKind::Objects,
                actual: u64::from(declared),
                max: u64::from(limits.max_objects),
            });
        }
    }

    if scan.encrypted {
        return Err(PdfJoinError::ParseError(
            "Encrypted documents are not supported".into(),
        ));
    }

    Ok(scan)
}

/// Read the header and the last trailer without building an object graph.
pub fn prescan(bytes: &[u8]) -> Result<Prescan, PdfJoinError> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    let header = find_pattern(window, b"%PDF-")
        .ok_or_else(|| PdfJoinError::ParseError("Not a valid PDF (missing %PDF- header)".into()))?;

    let version_start = header + 5;
    let version_end = bytes[version_start..]
        .iter()
        .position(|b| !(b.is_ascii_digit() || *b == b'.'))
        .map_or(bytes.len(), |end| version_start + end);
    let version = String::from_utf8_lossy(&bytes[version_start..version_end]).into_owned();

    let (declared_objects, encrypted) = match find_startxref(bytes) {
        Some(offset) if offset < bytes.len() => {
            let trailer = &bytes[offset..];
            (
                extract_int_after(trailer, b"/Size").and_then(|n| u32::try_from(n).ok()),
                find_pattern(trailer, b"/Encrypt").is_some(),
            )
        }
        _ => (None, false),
    };

    Ok(Prescan {
        version,
        declared_objects,
        encrypted,
    })
}

/// Offset recorded after the last `startxref` keyword.
fn find_startxref(bytes: &[u8]) -> Option<usize> {
    let search_start = bytes.len().saturating_sub(TRAILER_WINDOW);
    let tail = &bytes[search_start..];
    let pos = rfind_pattern(tail, b"startxref")?;

    let after = &tail[pos + b"startxref".len()..];
    let digits_start = after.iter().position(|b| b.is_ascii_digit())?;
    let digits = &after[digits_start..];
    let digits_end = digits
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());

    std::str::from_utf8(&digits[..digits_end]).ok()?.parse().ok()
}

fn find_pattern(bytes: &[u8], pattern: &[u8]) -> Option<usize> {
    bytes
        .windows(pattern.len())
        .position(|window| window == pattern)
}

fn rfind_pattern(bytes: &[u8], pattern: &[u8]) -> Option<usize> {
    bytes
        .windows(pattern.len())
        .rposition(|window| window == pattern)
}

/// Extract the integer following a key (e.g. "/Size 100").
fn extract_int_after(bytes: &[u8], key: &[u8]) -> Option<i64> {
    let pos = find_pattern(bytes, key)?;
    let after = &bytes[pos + key.len()..];

    let start = after.iter().position(|&b| !b.is_ascii_whitespace())?;
    let after = &after[start..];
    let end = after
        .iter()
        .position(|&b| !b.is_ascii_digit())
        .unwrap_or(after.len());
    if end == 0 {
        return None;
    }

    std::str::from_utf8(&after[..end]).ok()?.parse().ok()
}
