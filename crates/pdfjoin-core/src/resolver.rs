//! Dependency Resolver
//!
//! Computes the set of objects transitively reachable from a root set by
//! following references in arrays, dictionary values and stream
//! dictionaries. The visited set makes cycles (Page → Parent → Kids → Page)
//! harmless; traversal order does not affect the result.

use crate::document::{for_each_reference, map_references};
use lopdf::{Document, Object, ObjectId};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::warn;

/// A reference whose target is not in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingRef {
    pub from: ObjectId,
    pub target: ObjectId,
}

/// Result of a closure computation
#[derive(Debug, Clone, Default)]
pub struct Closure {
    /// Every reachable object, roots included
    pub objects: BTreeSet<ObjectId>,
    /// Dangling references met on the way (dropped, not fatal)
    pub missing: Vec<MissingRef>,
    /// Barrier objects that were referenced but not entered
    pub pruned: BTreeSet<ObjectId>,
}

impl Closure {
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// All objects reachable from `roots`.
pub fn closure(roots: &[ObjectId], doc: &Document) -> Closure {
    closure_with(roots, doc, &HashSet::new())
}

/// All objects reachable from `roots` without entering `barrier` objects.
///
/// A root inside the barrier is still included.
pub fn closure_with(roots: &[ObjectId], doc: &Document, barrier: &HashSet<ObjectId>) -> Closure {
    let mut result = Closure::default();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();

    for &root in roots {
        if !doc.objects.contains_key(&root) {
            warn!(object = root.0, generation = root.1, "closure root is missing");
            result.missing.push(MissingRef {
                from: root,
                target: root,
            });
            continue;
        }
        if result.objects.insert(root) {
            queue.push_back(root);
        }
    }

    while let Some(id) = queue.pop_front() {
        let Some(object) = doc.objects.get(&id) else {
            continue;
        };

        for_each_reference(object, &mut |target| {
            if result.objects.contains(&target) {
                return;
            }
            if barrier.contains(&target) {
                result.pruned.insert(target);
                return;
            }
            if !doc.objects.contains_key(&target) {
                warn!(
                    from = id.0,
                    target = target.0,
                    generation = target.1,
                    "dropping dangling reference"
                );
                result.missing.push(MissingRef { from: id, target });
                return;
            }
            result.objects.insert(target);
            queue.push_back(target);
        });
    }

    result
}

/// Keys whose array values are lists of independent entries: a removed
/// reference is dropped from the list rather than replaced with `null`.
pub const LIST_KEYS: [&[u8]; 4] = [b"Kids", b"Annots", b"Fields", b"CO"];

/// Remove every reference for which `is_cut` holds from `obj`.
///
/// Dictionary entries holding a cut reference are removed, list entries (see
/// [`LIST_KEYS`]) are dropped, destinations (`Dest`/`D`) whose target page is
/// cut are removed together with a direct GoTo action wrapping them, and any
/// other cut reference becomes `null`. Returns the number of edges removed.
pub fn cut_references(obj: &mut Object, is_cut: &impl Fn(ObjectId) -> bool) -> usize {
    cut_in(obj, None, is_cut)
}

fn cut_in(obj: &mut Object, key: Option<&[u8]>, is_cut: &impl Fn(ObjectId) -> bool) -> usize {
    match obj {
        Object::Reference(id) if is_cut(*id) => {
            *obj = Object::Null;
            1
        }
        Object::Array(items) => {
            let mut removed = 0;
            if key.is_some_and(|k| LIST_KEYS.contains(&k)) {
                let before = items.len();
                items.retain(|item| !matches!(item, Object::Reference(id) if is_cut(*id)));
                removed += before - items.len();
            }
            for item in items.iter_mut() {
                removed += cut_in(item, None, is_cut);
            }
            removed
        }
        Object::Dictionary(dict) => cut_in_dict(dict, is_cut),
        Object::Stream(stream) => cut_in_dict(&mut stream.dict, is_cut),
        _ => 0,
    }
}

fn cut_in_dict(dict: &mut lopdf::Dictionary, is_cut: &impl Fn(ObjectId) -> bool) -> usize {
    let mut removed = 0;
    let mut doomed: Vec<Vec<u8>> = Vec::new();

    for (key, value) in dict.iter_mut() {
        let key = key.as_slice();
        if is_dead_destination(key, value, is_cut) || is_dead_goto(value, is_cut) {
            doomed.push(key.to_vec());
            continue;
        }
        if let Object::Reference(id) = value {
            if is_cut(*id) {
                doomed.push(key.to_vec());
                continue;
            }
        }
        removed += cut_in(value, Some(key), is_cut);
    }

    for key in doomed {
        dict.remove(&key);
        removed += 1;
    }
    removed
}

/// `Dest` or `D` holding an explicit destination to a cut page.
fn is_dead_destination(key: &[u8], value: &Object, is_cut: &impl Fn(ObjectId) -> bool) -> bool {
    if key != b"Dest" && key != b"D" {
        return false;
    }
    match value {
        Object::Array(items) => {
            matches!(items.first(), Some(Object::Reference(page)) if is_cut(*page))
        }
        _ => false,
    }
}

/// Direct GoTo action whose destination targets a cut page or is itself a
/// cut object.
fn is_dead_goto(value: &Object, is_cut: &impl Fn(ObjectId) -> bool) -> bool {
    let Object::Dictionary(action) = value else {
        return false;
    };
    let is_goto = action
        .get(b"S")
        .and_then(|s| s.as_name())
        .is_ok_and(|s| s == b"GoTo");
    is_goto
        && action.get(b"D").is_ok_and(|d| match d {
            Object::Reference(id) => is_cut(*id),
            direct => is_dead_destination(b"D", direct, is_cut),
        })
}

/// Replace references to objects absent from `doc` so every remaining
/// reference resolves. Returns the dangling references that were removed.
pub fn scrub_dangling(doc: &mut Document) -> Vec<MissingRef> {
    let present: HashSet<ObjectId> = doc.objects.keys().copied().collect();
    let mut scrubbed = Vec::new();

    for (&id, object) in doc.objects.iter_mut() {
        let mut dangling = Vec::new();
        for_each_reference(object, &mut |target| {
            if !present.contains(&target) {
                dangling.push(target);
            }
        });
        if dangling.is_empty() {
            continue;
        }
        cut_references(object, &|target| !present.contains(&target));
        for target in dangling {
            warn!(from = id.0, target = target.0, "scrubbed dangling reference");
            scrubbed.push(MissingRef { from: id, target });
        }
    }

    let mut trailer = Object::Dictionary(std::mem::take(&mut doc.trailer));
    cut_references(&mut trailer, &|target| !present.contains(&target));
    if let Object::Dictionary(dict) = trailer {
        doc.trailer = dict;
    }

    scrubbed
}

/// Drop every object not reachable from the trailer (`Root`, `Info`).
pub fn retain_reachable(doc: &mut Document) -> usize {
    let mut roots = Vec::new();
    for (_, value) in doc.trailer.iter() {
        for_each_reference(value, &mut |id| roots.push(id));
    }
    let reachable = closure(&roots, doc);
    let before = doc.objects.len();
    doc.objects.retain(|id, _| reachable.contains(id));
    before - doc.objects.len()
}

/// Rewrite references through `redirect`, leaving others untouched.
pub fn redirect_references(doc: &mut Document, redirect: &HashMap<ObjectId, ObjectId>) {
    if redirect.is_empty() {
        return;
    }
    for object in doc.objects.values_mut() {
        map_references(object, &mut |id| redirect.get(&id).copied().unwrap_or(id));
    }
    let mut trailer = Object::Dictionary(std::mem::take(&mut doc.trailer));
    map_references(&mut trailer, &mut |id| redirect.get(&id).copied().unwrap_or(id));
    if let Object::Dictionary(dict) = trailer {
        doc.trailer = dict;
    }
}
