//! Serializer
//!
//! Writes a finished document as a standalone PDF. Layout happens in two
//! passes: objects are written in ObjectId order while their byte offsets are
//! recorded, then the cross-reference section is emitted from those offsets.
//!
//! Small documents get a classic `xref` table. Once a document reaches the
//! configured object count, plain objects are packed into compressed object
//! streams and indexed by a cross-reference stream instead.

use crate::config::SerializeOptions;
use crate::document::{catalog_id, for_each_reference, max_object_number, type_name, version_key};
use crate::error::PdfJoinError;
use crate::page_tree;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use tracing::debug;

/// Binary comment after the header marks the file as binary for transports.
const BINARY_MARKER: &[u8] = b"%\xE2\xE3\xCF\xD3\n";

/// Where an object lives in the output
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Byte offset and generation of a top-level object
    Direct(usize, u16),
    /// Object stream number and index within it
    Packed(u32, u16),
}

/// Verify the document invariants and write it out.
pub fn serialize(mut doc: Document, options: &SerializeOptions) -> Result<Vec<u8>, PdfJoinError> {
    verify(&doc)?;

    let compressed = compress_streams(&mut doc, options.flate_threshold_bytes)?;

    let use_object_streams = options.object_stream_capacity > 0
        && options
            .object_stream_threshold
            .is_some_and(|threshold| doc.objects.len() >= threshold);

    let bytes = if use_object_streams {
        if version_key(&doc.version) < (1, 5) {
            doc.version = "1.5".into();
        }
        write_with_object_streams(&doc, options.object_stream_capacity)?
    } else {
        write_classic(&doc)
    };

    debug!(
        objects = doc.objects.len(),
        compressed,
        object_streams = use_object_streams,
        bytes = bytes.len(),
        "document serialized"
    );
    Ok(bytes)
}

/// Check every invariant a serializable document must hold.
pub fn verify(doc: &Document) -> Result<(), PdfJoinError> {
    let invariant = |msg: String| PdfJoinError::SerializationError(msg);

    let mut numbers = HashSet::new();
    for id in doc.objects.keys() {
        if !numbers.insert(id.0) {
            return Err(invariant(format!("object number {} is used twice", id.0)));
        }
    }

    let mut dangling: Option<(ObjectId, ObjectId)> = None;
    for (&from, object) in &doc.objects {
        for_each_reference(object, &mut |target| {
            if dangling.is_none() && !doc.objects.contains_key(&target) {
                dangling = Some((from, target));
            }
        });
    }
    for (_, value) in doc.trailer.iter() {
        for_each_reference(value, &mut |target| {
            if dangling.is_none() && !doc.objects.contains_key(&target) {
                dangling = Some(((0, 0), target));
            }
        });
    }
    if let Some((from, target)) = dangling {
        return Err(invariant(format!(
            "object {} {} references missing object {} {}",
            from.0, from.1, target.0, target.1
        )));
    }

    let root = catalog_id(doc).map_err(|e| invariant(e.to_string()))?;
    let catalog = doc
        .objects
        .get(&root)
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| invariant("catalog is not a dictionary".into()))?;
    if type_name(catalog) != Some(&b"Catalog"[..]) {
        return Err(invariant("catalog has no /Type /Catalog".into()));
    }

    let pages_root = page_tree::pages_root_id(doc).map_err(|e| invariant(e.to_string()))?;
    let is_pages = doc
        .objects
        .get(&pages_root)
        .and_then(|obj| obj.as_dict().ok())
        .is_some_and(|dict| type_name(dict) == Some(&b"Pages"[..]));
    if !is_pages {
        return Err(invariant("catalog does not reference a Pages node".into()));
    }

    let tree = page_tree::walk(doc).map_err(|e| invariant(e.to_string()))?;
    if tree.is_empty() {
        return Err(invariant("document has no pages".into()));
    }
    match page_tree::declared_count(doc, pages_root) {
        Some(count) if count == tree.len() as i64 => Ok(()),
        count => Err(invariant(format!(
            "page tree declares {:?} pages but holds {}",
            count,
            tree.len()
        ))),
    }
}

/// Flate-compress unfiltered streams above `threshold` bytes.
///
/// Streams built with compression disabled are left as they are; lopdf
/// keeps the original content when deflating does not pay off.
fn compress_streams(doc: &mut Document, threshold: usize) -> Result<usize, PdfJoinError> {
    let mut compressed = 0;
    for object in doc.objects.values_mut() {
        let Object::Stream(stream) = object else {
            continue;
        };
        if !stream.allows_compression
            || stream.dict.has(b"Filter")
            || stream.content.len() <= threshold
        {
            continue;
        }
        stream.compress().map_err(|e| {
            PdfJoinError::SerializationError(format!("Flate compression failed: {}", e))
        })?;
        if stream.dict.has(b"Filter") {
            stream.dict.remove(b"DecodeParms");
            compressed += 1;
        }
    }
    Ok(compressed)
}

/// Deflate an object stream or cross-reference stream payload.
fn deflate(data: &[u8]) -> Result<Vec<u8>, PdfJoinError> {
    let failed = |e: std::io::Error| {
        PdfJoinError::SerializationError(format!("Flate compression failed: {}", e))
    };
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(failed)?;
    encoder.finish().map_err(failed)
}

fn write_header(out: &mut Vec<u8>, version: &str) {
    out.extend_from_slice(format!("%PDF-{}\n", version).as_bytes());
    out.extend_from_slice(BINARY_MARKER);
}

fn write_indirect(out: &mut Vec<u8>, id: ObjectId, object: &Object) {
    out.extend_from_slice(format!("{} {} obj\n", id.0, id.1).as_bytes());
    write_object(out, object);
    out.extend_from_slice(b"\nendobj\n");
}

/// Trailer entries carried into the output.
fn trailer_entries(doc: &Document) -> Dictionary {
    let mut trailer = Dictionary::new();
    for key in [b"Root".as_slice(), b"Info".as_slice()] {
        if let Ok(value) = doc.trailer.get(key) {
            trailer.set(key.to_vec(), value.clone());
        }
    }
    trailer
}

fn write_classic(doc: &Document) -> Vec<u8> {
    let mut out = Vec::new();
    write_header(&mut out, &doc.version);

    let mut slots: BTreeMap<u32, Slot> = BTreeMap::new();
    for (&id, object) in &doc.objects {
        slots.insert(id.0, Slot::Direct(out.len(), id.1));
        write_indirect(&mut out, id, object);
    }

    let size = max_object_number(doc) + 1;
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", size).as_bytes());

    let free: Vec<u32> = (1..size).filter(|n| !slots.contains_key(n)).collect();
    let mut next_free = free.iter().copied();
    out.extend_from_slice(format!("{:010} 65535 f \n", next_free.next().unwrap_or(0)).as_bytes());
    for number in 1..size {
        match slots.get(&number) {
            Some(Slot::Direct(offset, generation)) => {
                out.extend_from_slice(format!("{:010} {:05} n \n", offset, generation).as_bytes());
            }
            _ => {
                out.extend_from_slice(format!("{:010} 00000 f \n", next_free.next().unwrap_or(0)).as_bytes());
            }
        }
    }

    let mut trailer = trailer_entries(doc);
    trailer.set("Size", Object::Integer(i64::from(size)));
    out.extend_from_slice(b"trailer\n");
    write_object(&mut out, &Object::Dictionary(trailer));
    out.extend_from_slice(format!("\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
    out
}

fn write_with_object_streams(doc: &Document, capacity: usize) -> Result<Vec<u8>, PdfJoinError> {
    let capacity = capacity.min(usize::from(u16::MAX));
    let packable: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter(|(id, object)| id.1 == 0 && !matches!(object, Object::Stream(_)))
        .map(|(id, _)| *id)
        .collect();
    let packed: HashSet<ObjectId> = packable.iter().copied().collect();

    let mut next_number = max_object_number(doc);
    let mut allocate = || -> Result<u32, PdfJoinError> {
        next_number = next_number
            .checked_add(1)
            .ok_or_else(|| PdfJoinError::SerializationError("Object numbers exhausted".into()))?;
        Ok(next_number)
    };

    let mut out = Vec::new();
    write_header(&mut out, &doc.version);
    let mut slots: BTreeMap<u32, Slot> = BTreeMap::new();

    for (&id, object) in &doc.objects {
        if packed.contains(&id) {
            continue;
        }
        slots.insert(id.0, Slot::Direct(out.len(), id.1));
        write_indirect(&mut out, id, object);
    }

    for chunk in packable.chunks(capacity) {
        let stream_number = allocate()?;
        let mut offsets = Vec::new();
        let mut body = Vec::new();
        for (index, id) in chunk.iter().enumerate() {
            offsets.extend_from_slice(format!("{} {} ", id.0, body.len()).as_bytes());
            if let Some(object) = doc.objects.get(id) {
                write_object(&mut body, object);
            }
            body.push(b'\n');
            slots.insert(id.0, Slot::Packed(stream_number, index as u16));
        }

        let first = offsets.len();
        offsets.extend_from_slice(&body);
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"ObjStm".to_vec()));
        dict.set("N", Object::Integer(chunk.len() as i64));
        dict.set("First", Object::Integer(first as i64));
        dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
        let stream = Stream::new(dict, deflate(&offsets)?);

        let stream_id = (stream_number, 0);
        slots.insert(stream_number, Slot::Direct(out.len(), 0));
        write_indirect(&mut out, stream_id, &Object::Stream(stream));
    }

    let xref_number = allocate()?;
    let xref_offset = out.len();
    slots.insert(xref_number, Slot::Direct(xref_offset, 0));
    let size = xref_number + 1;

    let widest = slots
        .values()
        .map(|slot| match slot {
            Slot::Direct(offset, _) => *offset as u64,
            Slot::Packed(number, _) => u64::from(*number),
        })
        .max()
        .unwrap_or(0);
    let width = byte_width(widest);

    let mut rows = Vec::with_capacity(size as usize * (width + 3));
    for number in 0..size {
        match slots.get(&number) {
            Some(Slot::Direct(offset, generation)) => {
                push_row(&mut rows, 1, *offset as u64, width, *generation);
            }
            Some(Slot::Packed(stream, index)) => {
                push_row(&mut rows, 2, u64::from(*stream), width, *index);
            }
            None if number == 0 => push_row(&mut rows, 0, 0, width, u16::MAX),
            None => push_row(&mut rows, 0, 0, width, 0),
        }
    }

    let mut dict = trailer_entries(doc);
    dict.set("Type", Object::Name(b"XRef".to_vec()));
    dict.set("Size", Object::Integer(i64::from(size)));
    dict.set(
        "W",
        Object::Array(vec![
            Object::Integer(1),
            Object::Integer(width as i64),
            Object::Integer(2),
        ]),
    );
    dict.set("Filter", Object::Name(b"FlateDecode".to_vec()));
    let xref_stream = Stream::new(dict, deflate(&rows)?);
    write_indirect(&mut out, (xref_number, 0), &Object::Stream(xref_stream));
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", xref_offset).as_bytes());

    Ok(out)
}

/// Bytes needed to hold `value` (at least one).
fn byte_width(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

fn push_row(rows: &mut Vec<u8>, kind: u8, field: u64, width: usize, third: u16) {
    rows.push(kind);
    rows.extend_from_slice(&field.to_be_bytes()[8 - width..]);
    rows.extend_from_slice(&third.to_be_bytes());
}

/// Append the PDF syntax for `object`.
pub fn write_object(out: &mut Vec<u8>, object: &Object) {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(value) => out.extend_from_slice(if *value { b"true" } else { b"false" }),
        Object::Integer(value) => out.extend_from_slice(value.to_string().as_bytes()),
        Object::Real(value) => write_real(out, *value as f64),
        Object::String(bytes, StringFormat::Literal) => write_literal_string(out, bytes),
        Object::String(bytes, StringFormat::Hexadecimal) => {
            out.push(b'<');
            for byte in bytes {
                out.extend_from_slice(format!("{:02X}", byte).as_bytes());
            }
            out.push(b'>');
        }
        Object::Name(name) => write_name(out, name),
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(out, item);
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => write_dictionary(out, dict, None),
        Object::Stream(stream) => {
            write_dictionary(out, &stream.dict, Some(stream.content.len()));
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(&stream.content);
            out.extend_from_slice(b"\nendstream");
        }
        Object::Reference(id) => out.extend_from_slice(format!("{} {} R", id.0, id.1).as_bytes()),
    }
}

/// `length` replaces any stored `/Length` entry.
fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary, length: Option<usize>) {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        if length.is_some() && key.as_slice() == b"Length" {
            continue;
        }
        if out.last() != Some(&b'<') {
            out.push(b' ');
        }
        write_name(out, key);
        out.push(b' ');
        write_object(out, value);
    }
    if let Some(length) = length {
        if out.last() != Some(&b'<') {
            out.push(b' ');
        }
        out.extend_from_slice(format!("/Length {}", length).as_bytes());
    }
    out.extend_from_slice(b">>");
}

fn write_real(out: &mut Vec<u8>, value: f64) {
    if !value.is_finite() {
        out.push(b'0');
        return;
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        out.extend_from_slice(format!("{}", value as i64).as_bytes());
        return;
    }
    let formatted = format!("{:.6}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    out.extend_from_slice(trimmed.as_bytes());
}

fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x20..=0x7E => out.push(byte),
            _ => out.extend_from_slice(format!("\\{:03o}", byte).as_bytes()),
        }
    }
    out.push(b')');
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &byte in name {
        match byte {
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#' => {
                out.extend_from_slice(format!("#{:02X}", byte).as_bytes())
            }
            0x21..=0x7E => out.push(byte),
            _ => out.extend_from_slice(format!("#{:02X}", byte).as_bytes()),
        }
    }
}
