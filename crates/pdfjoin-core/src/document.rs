//! Small helpers over the `lopdf` object arena
//!
//! All cross-object links are `ObjectId` lookups into `Document::objects`;
//! nothing here holds a borrow across a mutation.

use crate::error::PdfJoinError;
use lopdf::{Dictionary, Document, Object, ObjectId};

static NULL_OBJECT: Object = Object::Null;

/// Reference chains longer than this are treated as broken.
const MAX_REFERENCE_HOPS: usize = 32;

/// Follow references until a direct object is reached.
///
/// Missing targets and over-long chains resolve to `null`.
pub fn resolve<'a>(doc: &'a Document, mut obj: &'a Object) -> &'a Object {
    for _ in 0..MAX_REFERENCE_HOPS {
        match obj {
            Object::Reference(id) => match doc.objects.get(id) {
                Some(target) => obj = target,
                None => return &NULL_OBJECT,
            },
            direct => return direct,
        }
    }
    &NULL_OBJECT
}

/// Resolve `obj` and view it as a dictionary (a stream's dictionary counts).
pub fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj) {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

/// Resolve `obj` and view it as an array.
pub fn resolve_array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    match resolve(doc, obj) {
        Object::Array(items) => Some(items),
        _ => None,
    }
}

/// Look up `key` in `dict` and resolve the value.
pub fn get_resolved<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|value| resolve(doc, value))
}

/// The `/Type` name of a dictionary, if any.
pub fn type_name(dict: &Dictionary) -> Option<&[u8]> {
    dict.get(b"Type").ok().and_then(|t| t.as_name().ok())
}

/// Object id of the document catalog (`/Root` in the trailer).
pub fn catalog_id(doc: &Document) -> Result<ObjectId, PdfJoinError> {
    let root = doc
        .trailer
        .get(b"Root")
        .map_err(|_| PdfJoinError::ParseError("No Root in trailer".into()))?;
    let id = root
        .as_reference()
        .map_err(|_| PdfJoinError::ParseError("Root is not a reference".into()))?;
    if !doc.objects.contains_key(&id) {
        return Err(PdfJoinError::ParseError(format!(
            "Catalog object {} {} not found",
            id.0, id.1
        )));
    }
    Ok(id)
}

pub fn catalog(doc: &Document) -> Result<&Dictionary, PdfJoinError> {
    let id = catalog_id(doc)?;
    doc.objects
        .get(&id)
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| PdfJoinError::ParseError("Invalid catalog".into()))
}

/// Highest object number present in the arena (0 when empty).
pub fn max_object_number(doc: &Document) -> u32 {
    doc.objects.keys().map(|id| id.0).max().unwrap_or(0)
}

/// Make `Document::new_object_id` hand out numbers above every present object.
pub fn sync_max_id(doc: &mut Document) {
    doc.max_id = max_object_number(doc);
}

/// Allocate a fresh object id in generation 0.
pub fn allocate_id(doc: &mut Document) -> Result<ObjectId, PdfJoinError> {
    let next = doc
        .max_id
        .checked_add(1)
        .ok_or_else(|| PdfJoinError::SerializationError("Object numbers exhausted".into()))?;
    doc.max_id = next;
    Ok((next, 0))
}

/// Numeric ordering key for a version string such as `"1.7"`.
pub fn version_key(version: &str) -> (u32, u32) {
    let mut parts = version.trim().splitn(2, '.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(1);
    let minor = parts
        .next()
        .and_then(|p| {
            let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        })
        .unwrap_or(0);
    (major, minor)
}

/// Visit every reference held directly or nested inside `obj`.
pub fn for_each_reference(obj: &Object, visit: &mut impl FnMut(ObjectId)) {
    match obj {
        Object::Reference(id) => visit(*id),
        Object::Array(items) => {
            for item in items {
                for_each_reference(item, visit);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                for_each_reference(value, visit);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                for_each_reference(value, visit);
            }
        }
        _ => {}
    }
}

/// Rewrite every reference inside `obj` in place.
pub fn map_references(obj: &mut Object, map: &mut impl FnMut(ObjectId) -> ObjectId) {
    match obj {
        Object::Reference(id) => *id = map(*id),
        Object::Array(items) => {
            for item in items.iter_mut() {
                map_references(item, map);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                map_references(value, map);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                map_references(value, map);
            }
        }
        _ => {}
    }
}
