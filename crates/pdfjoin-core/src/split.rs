//! PDF Split algorithm
//!
//! Extracts pages from a PDF using "Construction by Whitelist":
//! 1. Resolve the requested ranges to page objects
//! 2. Traverse the dependency graph from those pages, stopping at the old
//!    page tree, the unselected pages and their private annotations
//! 3. Move exactly the reachable objects into a new document
//! 4. Cut edges that still point outside the whitelist
//! 5. Rebuild the page tree, outline, form and catalog
//!
//! Nothing from an excluded page survives unless a selected page needs it.

use crate::deadline::Deadline;
use crate::document::{
    allocate_id, catalog, catalog_id, for_each_reference, get_resolved, resolve, resolve_array,
    resolve_dict, sync_max_id,
};
use crate::error::PdfJoinError;
use crate::outline;
use crate::page_tree;
use crate::resolver::{closure_with, cut_references, scrub_dangling};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Form-level keys carried from the source `AcroForm`.
const FORM_KEYS: [&[u8]; 4] = [b"DR", b"DA", b"Q", b"NeedAppearances"];

/// Field hierarchies nested deeper than this are not searched.
const MAX_FIELD_DEPTH: usize = 32;

/// An inclusive, 1-indexed page range
///
/// Serialized as a two-element array: `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32)", into = "(u32, u32)")]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn single(page: u32) -> Self {
        Self::new(page, page)
    }
}

impl From<(u32, u32)> for PageRange {
    fn from((start, end): (u32, u32)) -> Self {
        Self::new(start, end)
    }
}

impl From<PageRange> for (u32, u32) {
    fn from(range: PageRange) -> Self {
        (range.start, range.end)
    }
}

/// Flatten `ranges` into page numbers, keeping each page at its first
/// requested position.
///
/// Every range is validated before anything is allocated.
pub fn resolve_selection(ranges: &[PageRange], page_count: u32) -> Result<Vec<u32>, PdfJoinError> {
    if ranges.is_empty() {
        return Err(PdfJoinError::EmptySelection);
    }
    for range in ranges {
        if range.start == 0 || range.start > range.end || range.end > page_count {
            return Err(PdfJoinError::InvalidRange {
                start: range.start,
                end: range.end,
                page_count,
            });
        }
    }

    let mut seen = HashSet::new();
    let mut pages = Vec::new();
    for range in ranges {
        for page in range.start..=range.end {
            if seen.insert(page) {
                pages.push(page);
            }
        }
    }
    Ok(pages)
}

/// Build a new document holding only the pages selected by `ranges`.
pub fn split(source: Document, ranges: &[PageRange]) -> Result<Document, PdfJoinError> {
    split_with(source, ranges, &Deadline::unbounded())
}

pub fn split_with(
    mut source: Document,
    ranges: &[PageRange],
    deadline: &Deadline,
) -> Result<Document, PdfJoinError> {
    let tree = page_tree::walk(&source)?;
    let selection = resolve_selection(ranges, tree.len() as u32)?;
    deadline.check("split")?;

    let entries: Vec<&page_tree::PageEntry> = selection
        .iter()
        .map(|&number| &tree.pages[(number - 1) as usize])
        .collect();
    for entry in &entries {
        page_tree::materialize_inherited(&mut source, entry);
    }
    let selected: Vec<ObjectId> = entries.iter().map(|entry| entry.id).collect();
    let selected_set: HashSet<ObjectId> = selected.iter().copied().collect();

    let excluded: HashSet<ObjectId> = tree
        .pages
        .iter()
        .map(|page| page.id)
        .filter(|id| !selected_set.contains(id))
        .collect();
    let selected_annots = annotations_of(&source, selected.iter().copied());
    let renamed = resolve_named_links(&mut source, &selected_annots);

    let mut barrier: HashSet<ObjectId> = tree.nodes.iter().copied().collect();
    barrier.insert(catalog_id(&source)?);
    for &page in &excluded {
        barrier.insert(page);
        for annot in annotations_of(&source, [page]) {
            if !selected_annots.contains(&annot) {
                barrier.insert(annot);
            }
        }
    }
    let dead_links = dead_link_targets(&source, &selected_annots, &excluded);
    debug!(
        renamed,
        dead_links = dead_links.len(),
        "link destinations checked"
    );
    barrier.extend(dead_links);

    let form = plan_acroform(&source, &selected_set, &selected_annots);
    let outline_plan = outline::plan_outline(&source, &|page| selected_set.contains(&page));
    let carried_catalog = carried_catalog_entries(&source);
    let info = source.trailer.get(b"Info").ok().cloned();

    let mut roots = selected.clone();
    if let Some(form) = &form {
        roots.extend(form.fields.iter().copied());
        for (_, value) in form.dict.iter() {
            for_each_reference(value, &mut |id| roots.push(id));
        }
    }
    roots.extend(outline::referenced_objects(&outline_plan));
    if let Some(info) = &info {
        for_each_reference(info, &mut |id| roots.push(id));
    }

    let closure = closure_with(&roots, &source, &barrier);
    debug!(
        pages = selected.len(),
        closure = closure.len(),
        pruned = closure.pruned.len(),
        missing = closure.missing.len(),
        "split closure computed"
    );
    deadline.check("split")?;

    let mut dest = Document::with_version(source.version.clone());
    for id in &closure.objects {
        if let Some(object) = source.objects.remove(id) {
            dest.objects.insert(*id, object);
        }
    }
    drop(source);

    let kept: HashSet<ObjectId> = dest.objects.keys().copied().collect();
    let mut cut = 0;
    for object in dest.objects.values_mut() {
        cut += cut_references(object, &|id| !kept.contains(&id));
    }
    debug!(cut, "edges to excluded objects removed");
    deadline.check("split")?;

    sync_max_id(&mut dest);
    let pages_id = allocate_id(&mut dest)?;
    page_tree::build_page_tree(&mut dest, pages_id, &selected)?;

    let mut new_catalog = Dictionary::new();
    new_catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    new_catalog.set("Pages", Object::Reference(pages_id));
    for (key, value) in carried_catalog {
        new_catalog.set(key, value);
    }

    if let Some(outlines_id) = outline::write_outline(&mut dest, outline_plan)? {
        new_catalog.set("Outlines", Object::Reference(outlines_id));
    }
    if let Some(form) = form {
        let mut dict = form.dict;
        dict.set(
            "Fields",
            Object::Array(form.fields.into_iter().map(Object::Reference).collect()),
        );
        new_catalog.set("AcroForm", Object::Dictionary(dict));
    }

    let catalog_id = allocate_id(&mut dest)?;
    dest.objects.insert(catalog_id, Object::Dictionary(new_catalog));
    dest.trailer.set("Root", Object::Reference(catalog_id));
    if let Some(info) = info {
        dest.trailer.set("Info", info);
    }

    scrub_dangling(&mut dest);
    Ok(dest)
}

/// Annotation references listed by `pages`.
fn annotations_of(doc: &Document, pages: impl IntoIterator<Item = ObjectId>) -> HashSet<ObjectId> {
    let mut annots = HashSet::new();
    for page in pages {
        let Some(Object::Dictionary(dict)) = doc.objects.get(&page) else {
            continue;
        };
        let Some(items) = dict.get(b"Annots").ok().and_then(|a| resolve_array(doc, a)) else {
            continue;
        };
        annots.extend(items.iter().filter_map(|item| item.as_reference().ok()));
    }
    annots
}

/// Rewrite named destinations of `annots` and their GoTo actions into
/// explicit arrays, since the output carries no `/Dests` or `/Names`.
///
/// A link whose name cannot be resolved loses its `Dest` (or `A`).
/// Returns the number of edits.
fn resolve_named_links(doc: &mut Document, annots: &HashSet<ObjectId>) -> usize {
    let mut edits: Vec<(ObjectId, &'static str, Option<Object>)> = Vec::new();

    for &id in annots {
        let Some(Object::Dictionary(annot)) = doc.objects.get(&id) else {
            continue;
        };
        if let Some(explicit) = annot.get(b"Dest").ok().and_then(|d| named_target(doc, d)) {
            edits.push((id, "Dest", explicit));
        }

        let Ok(action_value) = annot.get(b"A") else {
            continue;
        };
        let Some(action) = resolve_dict(doc, action_value) else {
            continue;
        };
        if !is_goto(doc, action) {
            continue;
        }
        let Some(explicit) = action.get(b"D").ok().and_then(|d| named_target(doc, d)) else {
            continue;
        };
        match (action_value, explicit) {
            (_, None) => edits.push((id, "A", None)),
            (Object::Reference(action_id), Some(array)) => {
                edits.push((*action_id, "D", Some(array)));
            }
            (Object::Dictionary(direct), Some(array)) => {
                let mut direct = direct.clone();
                direct.set("D", array);
                edits.push((id, "A", Some(Object::Dictionary(direct))));
            }
            _ => {}
        }
    }

    let count = edits.len();
    for (id, key, value) in edits {
        let Some(Object::Dictionary(dict)) = doc.objects.get_mut(&id) else {
            continue;
        };
        match value {
            Some(value) => dict.set(key, value),
            None => {
                dict.remove(key.as_bytes());
            }
        }
    }
    count
}

/// `None` when `dest` is not a name; otherwise the explicit array it names,
/// if any.
fn named_target(doc: &Document, dest: &Object) -> Option<Option<Object>> {
    let name = match resolve(doc, dest) {
        Object::Name(name) | Object::String(name, _) => name,
        _ => return None,
    };
    Some(outline::named_destination(doc, name).map(|array| Object::Array(array.to_vec())))
}

fn is_goto(doc: &Document, action: &Dictionary) -> bool {
    get_resolved(doc, action, b"S")
        .and_then(|s| s.as_name().ok())
        .is_some_and(|s| s == b"GoTo")
}

/// Indirect destination arrays and GoTo actions of `annots` that point at an
/// `excluded` page.
///
/// Kept out of the closure so the edge cut removes the `Dest` or `A` entry
/// referring to them; copying them would leave a GoTo without `D`.
fn dead_link_targets(
    doc: &Document,
    annots: &HashSet<ObjectId>,
    excluded: &HashSet<ObjectId>,
) -> Vec<ObjectId> {
    let targets_excluded = |dest: &Object| {
        resolve_array(doc, dest)
            .and_then(|items| items.first())
            .and_then(|first| first.as_reference().ok())
            .is_some_and(|page| excluded.contains(&page))
    };

    let mut dead = Vec::new();
    for id in annots {
        let Some(Object::Dictionary(annot)) = doc.objects.get(id) else {
            continue;
        };
        if let Ok(Object::Reference(dest_id)) = annot.get(b"Dest") {
            if targets_excluded(&Object::Reference(*dest_id)) {
                dead.push(*dest_id);
            }
        }

        let Ok(action_value) = annot.get(b"A") else {
            continue;
        };
        let Some(action) = resolve_dict(doc, action_value) else {
            continue;
        };
        let Ok(dest) = action.get(b"D") else {
            continue;
        };
        if !is_goto(doc, action) || !targets_excluded(dest) {
            continue;
        }
        match (action_value, dest) {
            (Object::Reference(action_id), _) => dead.push(*action_id),
            (_, Object::Reference(dest_id)) => dead.push(*dest_id),
            _ => {}
        }
    }
    dead
}

/// Catalog values a split output keeps: page layout and language.
fn carried_catalog_entries(doc: &Document) -> Vec<(&'static str, Object)> {
    let Ok(root) = catalog(doc) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for key in ["PageLayout", "Lang"] {
        if let Ok(value) = root.get(key.as_bytes()) {
            let value = resolve(doc, value);
            if matches!(value, Object::Name(_) | Object::String(..)) {
                entries.push((key, value.clone()));
            }
        }
    }
    entries
}

/// The part of the source form a split output keeps
#[derive(Debug)]
struct FormPlan {
    /// Carried form-level entries, without `Fields`
    dict: Dictionary,
    /// Top-level fields with a widget on a selected page
    fields: Vec<ObjectId>,
}

fn plan_acroform(
    doc: &Document,
    selected: &HashSet<ObjectId>,
    selected_annots: &HashSet<ObjectId>,
) -> Option<FormPlan> {
    let form = catalog(doc)
        .ok()?
        .get(b"AcroForm")
        .ok()
        .and_then(|f| resolve_dict(doc, f))?;

    let on_selected = |id: ObjectId| field_on_selected(doc, id, selected, selected_annots, 0);

    let fields: Vec<ObjectId> = form
        .get(b"Fields")
        .ok()
        .and_then(|f| resolve_array(doc, f))?
        .iter()
        .filter_map(|field| field.as_reference().ok())
        .filter(|&id| on_selected(id))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut dict = Dictionary::new();
    for key in FORM_KEYS {
        if let Ok(value) = form.get(key) {
            dict.set(key.to_vec(), value.clone());
        }
    }
    if let Some(order) = form.get(b"CO").ok().and_then(|co| resolve_array(doc, co)) {
        let kept: Vec<Object> = order
            .iter()
            .filter(|entry| entry.as_reference().is_ok_and(|id| on_selected(id)))
            .cloned()
            .collect();
        if !kept.is_empty() {
            dict.set("CO", Object::Array(kept));
        }
    }

    Some(FormPlan { dict, fields })
}

/// A field (or one of its descendants) is a widget on a selected page.
fn field_on_selected(
    doc: &Document,
    id: ObjectId,
    selected: &HashSet<ObjectId>,
    selected_annots: &HashSet<ObjectId>,
    depth: usize,
) -> bool {
    if depth > MAX_FIELD_DEPTH {
        return false;
    }
    if selected_annots.contains(&id) {
        return true;
    }
    let Some(Object::Dictionary(field)) = doc.objects.get(&id) else {
        return false;
    };
    if field
        .get(b"P")
        .and_then(|p| p.as_reference())
        .is_ok_and(|page| selected.contains(&page))
    {
        return true;
    }
    field
        .get(b"Kids")
        .ok()
        .and_then(|kids| resolve_array(doc, kids))
        .is_some_and(|kids| {
            kids.iter()
                .filter_map(|kid| kid.as_reference().ok())
                .any(|kid| field_on_selected(doc, kid, selected, selected_annots, depth + 1))
        })
}
