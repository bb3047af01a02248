//! PDF Merge algorithm
//!
//! Combines multiple documents into one by renumbering:
//! 1. The destination starts empty at the highest source version
//! 2. Each source, in caller order, is shifted by an offset one past the
//!    highest object number already in the destination; every reference
//!    inside its objects is shifted by the same offset
//! 3. Its pages (with inherited attributes made explicit) are appended in
//!    source order
//! 4. A fresh page tree and catalog are built; document-level extras come
//!    from the first source only
//! 5. Objects no longer reachable (old catalogs and page-tree nodes) are
//!    dropped
//!
//! Sources never reference each other before the merge, so a per-source
//! offset cannot produce collisions.

use crate::config::MergeOptions;
use crate::deadline::Deadline;
use crate::document::{
    allocate_id, catalog, for_each_reference, map_references, max_object_number, type_name,
    version_key,
};
use crate::error::PdfJoinError;
use crate::page_tree;
use crate::resolver::{redirect_references, retain_reachable, scrub_dangling};
use crate::serializer::write_object;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use tracing::debug;

/// Catalog entries carried from the first source.
const CATALOG_EXTRAS: [&str; 9] = [
    "Outlines",
    "Names",
    "Dests",
    "AcroForm",
    "ViewerPreferences",
    "PageLayout",
    "PageMode",
    "Lang",
    "OpenAction",
];

/// The 14 standard Type1 fonts every reader provides.
const STANDARD_FONTS: [&[u8]; 14] = [
    b"Times-Roman",
    b"Times-Bold",
    b"Times-Italic",
    b"Times-BoldItalic",
    b"Helvetica",
    b"Helvetica-Bold",
    b"Helvetica-Oblique",
    b"Helvetica-BoldOblique",
    b"Courier",
    b"Courier-Bold",
    b"Courier-Oblique",
    b"Courier-BoldOblique",
    b"Symbol",
    b"ZapfDingbats",
];

/// Merge `sources` in order using default options.
pub fn merge(sources: Vec<Document>) -> Result<Document, PdfJoinError> {
    merge_with(sources, &MergeOptions::default(), &Deadline::unbounded())
}

pub fn merge_with(
    sources: Vec<Document>,
    options: &MergeOptions,
    deadline: &Deadline,
) -> Result<Document, PdfJoinError> {
    if sources.is_empty() {
        return Err(PdfJoinError::NoSources);
    }

    let version = sources
        .iter()
        .map(|doc| doc.version.as_str())
        .max_by_key(|v| version_key(v))
        .unwrap_or("1.7")
        .to_string();
    let mut dest = Document::with_version(version);

    let mut pages: Vec<ObjectId> = Vec::new();
    let mut extras: Vec<(&'static str, Object)> = Vec::new();
    let mut info: Option<Object> = None;

    for (index, mut source) in sources.into_iter().enumerate() {
        deadline.check("merge")?;

        let tree = page_tree::walk(&source).map_err(|e| e.at_source(index))?;
        for entry in &tree.pages {
            page_tree::materialize_inherited(&mut source, entry);
        }
        scrub_dangling(&mut source);

        let offset = max_object_number(&dest)
            .checked_add(1)
            .ok_or_else(exhausted)?;
        max_object_number(&source)
            .checked_add(offset)
            .ok_or_else(exhausted)?;
        let remap = |(number, _): ObjectId| -> ObjectId { (number + offset, 0) };

        if index == 0 {
            extras = catalog_extras(&source, &remap)?;
            info = source.trailer.get(b"Info").ok().cloned().map(|mut info| {
                map_references(&mut info, &mut |id| remap(id));
                info
            });
        }

        let object_count = source.objects.len();
        for (old_id, mut object) in std::mem::take(&mut source.objects) {
            map_references(&mut object, &mut |id| remap(id));
            let new_id = remap(old_id);
            if dest.objects.insert(new_id, object).is_some() {
                return Err(PdfJoinError::SerializationError(format!(
                    "Object id {} {} assigned twice",
                    new_id.0, new_id.1
                )));
            }
        }
        pages.extend(tree.pages.iter().map(|entry| remap(entry.id)));

        debug!(
            index,
            pages = tree.len(),
            objects = object_count,
            offset,
            "merged source"
        );
    }

    deadline.check("merge")?;
    dest.max_id = max_object_number(&dest);
    let pages_id = allocate_id(&mut dest)?;
    page_tree::build_page_tree(&mut dest, pages_id, &pages)?;

    let mut new_catalog = Dictionary::new();
    new_catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    new_catalog.set("Pages", Object::Reference(pages_id));
    for (key, value) in extras {
        new_catalog.set(key, value);
    }
    let catalog_id = allocate_id(&mut dest)?;
    dest.objects.insert(catalog_id, Object::Dictionary(new_catalog));
    dest.trailer.set("Root", Object::Reference(catalog_id));
    if let Some(info) = info {
        dest.trailer.set("Info", info);
    }

    if options.share_standard_fonts {
        let shared = share_standard_fonts(&mut dest);
        debug!(shared, "standard fonts shared");
    }

    let dropped = retain_reachable(&mut dest);
    scrub_dangling(&mut dest);
    debug!(
        pages = pages.len(),
        objects = dest.objects.len(),
        dropped,
        "merge complete"
    );
    Ok(dest)
}

fn exhausted() -> PdfJoinError {
    PdfJoinError::SerializationError("Object numbers exhausted".into())
}

/// Document-level catalog entries of `source`, already renumbered.
fn catalog_extras(
    source: &Document,
    remap: &impl Fn(ObjectId) -> ObjectId,
) -> Result<Vec<(&'static str, Object)>, PdfJoinError> {
    let root = catalog(source)?;
    let mut extras = Vec::new();
    for key in CATALOG_EXTRAS {
        if let Ok(value) = root.get(key.as_bytes()) {
            let mut value = value.clone();
            map_references(&mut value, &mut |id| remap(id));
            extras.push((key, value));
        }
    }
    Ok(extras)
}

/// Collapse identical standard-14 font dictionaries onto one object.
///
/// Only fully direct `Type1` dictionaries without a font program qualify;
/// embedded fonts are never touched. Returns the number of fonts removed.
pub fn share_standard_fonts(doc: &mut Document) -> usize {
    let mut canonical: HashMap<Vec<u8>, ObjectId> = HashMap::new();
    let mut redirect: HashMap<ObjectId, ObjectId> = HashMap::new();

    for (&id, object) in &doc.objects {
        let Object::Dictionary(dict) = object else {
            continue;
        };
        if !is_standard_font(dict) {
            continue;
        }
        let key = canonical_bytes(dict);
        let first = *canonical.entry(key).or_insert(id);
        if first != id {
            redirect.insert(id, first);
        }
    }

    redirect_references(doc, &redirect);
    for id in redirect.keys() {
        doc.objects.remove(id);
    }
    redirect.len()
}

fn is_standard_font(dict: &Dictionary) -> bool {
    let is_type1 = dict
        .get(b"Subtype")
        .and_then(|s| s.as_name())
        .is_ok_and(|s| s == b"Type1");
    let is_standard = dict
        .get(b"BaseFont")
        .and_then(|f| f.as_name())
        .is_ok_and(|name| STANDARD_FONTS.contains(&name));

    let mut has_reference = false;
    for (_, value) in dict.iter() {
        for_each_reference(value, &mut |_| has_reference = true);
    }

    type_name(dict) == Some(&b"Font"[..])
        && is_type1
        && is_standard
        && !dict.has(b"FontDescriptor")
        && !has_reference
}

/// Serialized form with keys in sorted order.
fn canonical_bytes(dict: &Dictionary) -> Vec<u8> {
    let mut entries: Vec<(&Vec<u8>, &Object)> = dict.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut sorted = Dictionary::new();
    for (key, value) in entries {
        sorted.set(key.clone(), value.clone());
    }
    let mut bytes = Vec::new();
    write_object(&mut bytes, &Object::Dictionary(sorted));
    bytes
}
