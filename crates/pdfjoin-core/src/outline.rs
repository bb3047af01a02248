//! Outline (bookmark) pruning for split
//!
//! The source outline is read into a plain tree first. Items whose target
//! page is excluded are removed and their surviving descendants take their
//! place; items without a page target (URI and other non-GoTo actions) are
//! kept. The result is written back as fresh outline objects.

use crate::document::{
    allocate_id, catalog, for_each_reference, get_resolved, resolve, resolve_array, resolve_dict,
};
use crate::error::PdfJoinError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;
use tracing::warn;

/// Name trees nested deeper than this are not searched.
const MAX_NAME_TREE_DEPTH: usize = 32;

/// Keys copied from a source item onto the rewritten item.
const CARRIED_KEYS: [&[u8]; 3] = [b"Title", b"C", b"F"];

/// An outline item that survives pruning
#[derive(Debug, Clone)]
pub struct OutlineNode {
    /// Title, style and target; link keys are written later
    pub item: Dictionary,
    /// Item shows its children expanded
    pub open: bool,
    pub children: Vec<OutlineNode>,
}

enum Target<'a> {
    /// The item does not jump to a page
    None,
    /// Explicit destination array whose first element is the page
    Page(ObjectId, &'a [Object]),
    /// A destination that cannot be resolved
    Unresolved,
}

/// Read the outline of `doc`, keeping items whose page satisfies `keep_page`.
pub fn plan_outline(doc: &Document, keep_page: &impl Fn(ObjectId) -> bool) -> Vec<OutlineNode> {
    let Ok(root) = catalog(doc) else {
        return Vec::new();
    };
    let Some(outlines) = root.get(b"Outlines").ok().and_then(|o| resolve_dict(doc, o)) else {
        return Vec::new();
    };
    let mut visited = HashSet::new();
    read_level(doc, outlines.get(b"First").ok(), keep_page, &mut visited)
}

fn read_level(
    doc: &Document,
    first: Option<&Object>,
    keep_page: &impl Fn(ObjectId) -> bool,
    visited: &mut HashSet<ObjectId>,
) -> Vec<OutlineNode> {
    let mut nodes = Vec::new();
    let mut cursor = first.and_then(|f| f.as_reference().ok());

    while let Some(id) = cursor {
        if !visited.insert(id) {
            warn!(object = id.0, "outline item visited twice, stopping");
            break;
        }
        let Some(Object::Dictionary(item)) = doc.objects.get(&id) else {
            break;
        };
        cursor = item.get(b"Next").ok().and_then(|n| n.as_reference().ok());

        let children = read_level(doc, item.get(b"First").ok(), keep_page, visited);

        match item_target(doc, item) {
            Target::Page(page, dest) if keep_page(page) => {
                let mut node = carried(item);
                node.set("Dest", Object::Array(dest.to_vec()));
                nodes.push(OutlineNode {
                    item: node,
                    open: is_open(item),
                    children,
                });
            }
            Target::Page(page, _) => {
                warn!(
                    item = id.0,
                    page = page.0,
                    promoted = children.len(),
                    "pruned outline item targeting an excluded page"
                );
                nodes.extend(children);
            }
            Target::Unresolved => {
                warn!(item = id.0, "pruned outline item with an unresolvable destination");
                nodes.extend(children);
            }
            Target::None => {
                let mut node = carried(item);
                if let Ok(action) = item.get(b"A") {
                    node.set("A", action.clone());
                }
                nodes.push(OutlineNode {
                    item: node,
                    open: is_open(item),
                    children,
                });
            }
        }
    }

    nodes
}

fn carried(item: &Dictionary) -> Dictionary {
    let mut node = Dictionary::new();
    for key in CARRIED_KEYS {
        if let Ok(value) = item.get(key) {
            node.set(key.to_vec(), value.clone());
        }
    }
    node
}

fn is_open(item: &Dictionary) -> bool {
    item.get(b"Count")
        .and_then(|c| c.as_i64())
        .map_or(true, |count| count >= 0)
}

fn item_target<'a>(doc: &'a Document, item: &'a Dictionary) -> Target<'a> {
    if let Ok(dest) = item.get(b"Dest") {
        return destination_target(doc, dest);
    }
    let Some(action) = item.get(b"A").ok().and_then(|a| resolve_dict(doc, a)) else {
        return Target::None;
    };
    let is_goto = get_resolved(doc, action, b"S")
        .and_then(|s| s.as_name().ok())
        .is_some_and(|s| s == b"GoTo");
    match action.get(b"D") {
        Ok(dest) if is_goto => destination_target(doc, dest),
        _ if is_goto => Target::Unresolved,
        _ => Target::None,
    }
}

fn destination_target<'a>(doc: &'a Document, dest: &'a Object) -> Target<'a> {
    let explicit = match resolve(doc, dest) {
        Object::Name(name) => named_destination(doc, name),
        Object::String(name, _) => named_destination(doc, name),
        other => explicit_destination(doc, other),
    };
    match explicit {
        Some(array) => match array.first() {
            Some(Object::Reference(page)) => Target::Page(*page, array),
            _ => Target::Unresolved,
        },
        None => Target::Unresolved,
    }
}

/// A destination value is either the array itself or a dictionary with `D`.
fn explicit_destination<'a>(doc: &'a Document, value: &'a Object) -> Option<&'a [Object]> {
    match resolve(doc, value) {
        Object::Array(items) => Some(items.as_slice()),
        Object::Dictionary(dict) => dict
            .get(b"D")
            .ok()
            .and_then(|d| resolve_array(doc, d))
            .map(|items| items.as_slice()),
        _ => None,
    }
}

/// Look a named destination up in `/Dests`, then in the `/Names /Dests` tree.
pub fn named_destination<'a>(doc: &'a Document, name: &[u8]) -> Option<&'a [Object]> {
    let root = catalog(doc).ok()?;

    if let Some(dests) = root.get(b"Dests").ok().and_then(|d| resolve_dict(doc, d)) {
        if let Ok(value) = dests.get(name) {
            if let Some(found) = explicit_destination(doc, value) {
                return Some(found);
            }
        }
    }

    let tree = root
        .get(b"Names")
        .ok()
        .and_then(|n| resolve_dict(doc, n))
        .and_then(|names| names.get(b"Dests").ok())
        .and_then(|d| resolve_dict(doc, d))?;
    let value = name_tree_lookup(doc, tree, name, 0)?;
    explicit_destination(doc, value)
}

fn name_tree_lookup<'a>(
    doc: &'a Document,
    node: &'a Dictionary,
    name: &[u8],
    depth: usize,
) -> Option<&'a Object> {
    if depth > MAX_NAME_TREE_DEPTH {
        return None;
    }
    if let Some(pairs) = node.get(b"Names").ok().and_then(|n| resolve_array(doc, n)) {
        for pair in pairs.chunks(2) {
            if let [key, value] = pair {
                if let Object::String(key, _) = resolve(doc, key) {
                    if key.as_slice() == name {
                        return Some(value);
                    }
                }
            }
        }
    }
    let kids = node.get(b"Kids").ok().and_then(|k| resolve_array(doc, k))?;
    kids.iter()
        .filter_map(|kid| resolve_dict(doc, kid))
        .find_map(|kid| name_tree_lookup(doc, kid, name, depth + 1))
}

/// Every reference held by the planned items (pages, action objects).
pub fn referenced_objects(nodes: &[OutlineNode]) -> Vec<ObjectId> {
    let mut ids = Vec::new();
    for node in nodes {
        for (_, value) in node.item.iter() {
            for_each_reference(value, &mut |id| ids.push(id));
        }
        ids.extend(referenced_objects(&node.children));
    }
    ids
}

/// Write `nodes` as a fresh outline tree; returns the `Outlines` root id, or
/// `None` when nothing survived.
pub fn write_outline(
    doc: &mut Document,
    nodes: Vec<OutlineNode>,
) -> Result<Option<ObjectId>, PdfJoinError> {
    if nodes.is_empty() {
        return Ok(None);
    }
    let root_id = allocate_id(doc)?;
    let (first, last, visible) = write_level(doc, root_id, nodes)?;

    let mut root = Dictionary::new();
    root.set("Type", Object::Name(b"Outlines".to_vec()));
    root.set("First", Object::Reference(first));
    root.set("Last", Object::Reference(last));
    root.set("Count", Object::Integer(visible));
    doc.objects.insert(root_id, Object::Dictionary(root));
    Ok(Some(root_id))
}

/// Returns first, last and the number of items visible below `parent`.
fn write_level(
    doc: &mut Document,
    parent: ObjectId,
    nodes: Vec<OutlineNode>,
) -> Result<(ObjectId, ObjectId, i64), PdfJoinError> {
    let ids = nodes
        .iter()
        .map(|_| allocate_id(doc))
        .collect::<Result<Vec<_>, _>>()?;
    let mut visible = 0;

    for (i, node) in nodes.into_iter().enumerate() {
        let mut item = node.item;
        item.set("Parent", Object::Reference(parent));
        if i > 0 {
            item.set("Prev", Object::Reference(ids[i - 1]));
        }
        if let Some(next) = ids.get(i + 1) {
            item.set("Next", Object::Reference(*next));
        }

        visible += 1;
        if !node.children.is_empty() {
            let (first, last, below) = write_level(doc, ids[i], node.children)?;
            item.set("First", Object::Reference(first));
            item.set("Last", Object::Reference(last));
            if node.open {
                item.set("Count", Object::Integer(below));
                visible += below;
            } else {
                item.set("Count", Object::Integer(-below));
            }
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }

    match (ids.first(), ids.last()) {
        (Some(&first), Some(&last)) => Ok((first, last, visible)),
        _ => Err(PdfJoinError::SerializationError(
            "Outline level without items".into(),
        )),
    }
}
