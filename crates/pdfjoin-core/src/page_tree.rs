//! Page tree walking and rebuilding
//!
//! Shared by merge and split. Walking yields pages in reading order along
//! with the attributes they inherit from ancestor `Pages` nodes; building
//! writes a fresh tree over an ordered list of pages.

use crate::document::{catalog, resolve, resolve_array, type_name};
use crate::error::PdfJoinError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// Page attributes a page may inherit from its ancestors.
pub const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// A `Pages` node with more kids than this is split into intermediate nodes.
pub const MAX_KIDS_PER_NODE: usize = 32;

/// Trees nested deeper than this are rejected as malformed.
const MAX_TREE_DEPTH: usize = 256;

/// One leaf of the page tree
#[derive(Debug, Clone)]
pub struct PageEntry {
    pub id: ObjectId,
    /// Inheritable attributes supplied by ancestors and not set on the page
    pub inherited: Dictionary,
}

/// Result of walking a document's page tree
#[derive(Debug, Clone, Default)]
pub struct PageTree {
    /// Pages in reading order
    pub pages: Vec<PageEntry>,
    /// Every intermediate `Pages` node, root included
    pub nodes: BTreeSet<ObjectId>,
}

impl PageTree {
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.pages.iter().map(|p| p.id).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Object id of the root `Pages` node.
pub fn pages_root_id(doc: &Document) -> Result<ObjectId, PdfJoinError> {
    catalog(doc)?
        .get(b"Pages")
        .and_then(|p| p.as_reference())
        .map_err(|_| PdfJoinError::ParseError("No Pages reference in catalog".into()))
}

/// Walk the page tree from the catalog in reading order.
///
/// Revisited nodes (cycles, shared kids) are skipped with a warning.
pub fn walk(doc: &Document) -> Result<PageTree, PdfJoinError> {
    let root = pages_root_id(doc)?;
    let mut tree = PageTree::default();
    let mut visited = HashSet::new();
    walk_node(doc, root, &Dictionary::new(), 0, &mut visited, &mut tree)?;
    Ok(tree)
}

fn walk_node(
    doc: &Document,
    id: ObjectId,
    inherited: &Dictionary,
    depth: usize,
    visited: &mut HashSet<ObjectId>,
    tree: &mut PageTree,
) -> Result<(), PdfJoinError> {
    if depth > MAX_TREE_DEPTH {
        return Err(PdfJoinError::ParseError("Page tree is nested too deeply".into()));
    }
    if !visited.insert(id) {
        warn!(object = id.0, "page tree node visited twice, skipping");
        return Ok(());
    }

    let dict = match doc.objects.get(&id) {
        Some(Object::Dictionary(dict)) => dict,
        Some(_) => {
            return Err(PdfJoinError::ParseError(format!(
                "Page tree node {} {} is not a dictionary",
                id.0, id.1
            )))
        }
        None => {
            warn!(object = id.0, "page tree references a missing object, skipping");
            return Ok(());
        }
    };

    let is_node = match type_name(dict) {
        Some(b"Pages") => true,
        Some(b"Page") => false,
        _ => dict.has(b"Kids"),
    };

    if !is_node {
        let mut own = Dictionary::new();
        for (key, value) in inherited.iter() {
            if !dict.has(key) {
                own.set(key.clone(), value.clone());
            }
        }
        tree.pages.push(PageEntry { id, inherited: own });
        return Ok(());
    }

    tree.nodes.insert(id);

    let mut passed_down = inherited.clone();
    for key in INHERITABLE_KEYS {
        if let Ok(value) = dict.get(key) {
            passed_down.set(key.to_vec(), value.clone());
        }
    }

    let kids = dict
        .get(b"Kids")
        .ok()
        .and_then(|kids| resolve_array(doc, kids))
        .ok_or_else(|| {
            PdfJoinError::ParseError(format!("Pages node {} {} has no Kids array", id.0, id.1))
        })?;

    for kid in kids {
        match kid {
            Object::Reference(kid_id) => {
                walk_node(doc, *kid_id, &passed_down, depth + 1, visited, tree)?
            }
            _ => warn!(node = id.0, "non-reference entry in Kids, skipping"),
        }
    }

    Ok(())
}

/// Copy inherited attributes onto the page dictionary itself, so the page
/// renders the same once it hangs under a different parent.
pub fn materialize_inherited(doc: &mut Document, page: &PageEntry) {
    if page.inherited.is_empty() {
        return;
    }
    if let Some(Object::Dictionary(dict)) = doc.objects.get_mut(&page.id) {
        for (key, value) in page.inherited.iter() {
            if !dict.has(key) {
                dict.set(key.clone(), value.clone());
            }
        }
    }
}

/// Write a page tree rooted at `root_id` over `pages`, in order.
///
/// Up to [`MAX_KIDS_PER_NODE`] pages hang directly under the root; larger
/// selections get a balanced layer of intermediate `Pages` nodes. Every
/// page's `Parent` is pointed at its new node and every node's `Count` is
/// the number of leaf pages below it. New intermediate node ids come from
/// `doc.max_id`, which must already cover every object in the arena.
pub fn build_page_tree(
    doc: &mut Document,
    root_id: ObjectId,
    pages: &[ObjectId],
) -> Result<(), PdfJoinError> {
    build_node(doc, root_id, None, pages)
}

fn build_node(
    doc: &mut Document,
    node_id: ObjectId,
    parent: Option<ObjectId>,
    pages: &[ObjectId],
) -> Result<(), PdfJoinError> {
    let mut kids = Vec::new();

    if pages.len() <= MAX_KIDS_PER_NODE {
        for &page_id in pages {
            match doc.objects.get_mut(&page_id) {
                Some(Object::Dictionary(page)) => {
                    page.set("Parent", Object::Reference(node_id));
                }
                _ => {
                    return Err(PdfJoinError::SerializationError(format!(
                        "Page {} {} is missing from the destination",
                        page_id.0, page_id.1
                    )))
                }
            }
            kids.push(Object::Reference(page_id));
        }
    } else {
        let span = pages.len().div_ceil(MAX_KIDS_PER_NODE);
        for chunk in pages.chunks(span) {
            let child_id = crate::document::allocate_id(doc)?;
            build_node(doc, child_id, Some(node_id), chunk)?;
            kids.push(Object::Reference(child_id));
        }
    }

    let mut node = Dictionary::new();
    node.set("Type", Object::Name(b"Pages".to_vec()));
    if let Some(parent) = parent {
        node.set("Parent", Object::Reference(parent));
    }
    node.set("Kids", Object::Array(kids));
    node.set("Count", Object::Integer(pages.len() as i64));
    doc.objects.insert(node_id, Object::Dictionary(node));
    Ok(())
}

/// Number of leaf pages below a `Pages` node according to its `Count`.
pub fn declared_count(doc: &Document, node_id: ObjectId) -> Option<i64> {
    doc.objects
        .get(&node_id)
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|dict| dict.get(b"Count").ok())
        .map(|count| resolve(doc, count))
        .and_then(|count| count.as_i64().ok())
}
