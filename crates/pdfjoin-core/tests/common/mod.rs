//! Synthetic documents for the scenario tests

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeSet;

/// Create a PDF with `num_pages` pages, each drawing "`prefix` Page n" and
/// optionally painting a private image of `image_len` bytes.
pub fn create_pdf(num_pages: u32, prefix: &str, image_len: usize) -> Vec<u8> {
    save(create_document(num_pages, prefix, image_len))
}

pub fn create_document(num_pages: u32, prefix: &str, image_len: usize) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Times-Roman".to_vec())),
    ]));

    let mut page_ids = Vec::new();
    for i in 0..num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                ),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("{} Page {}", prefix, i + 1).into_bytes(),
                        StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let mut resources = Dictionary::new();
        resources.set(
            "Font",
            Dictionary::from_iter(vec![("F1", Object::Reference(font_id))]),
        );
        if image_len > 0 {
            let pixels = (0..image_len)
                .map(|n| (n as u32 * 131 + i * 17) as u8)
                .collect();
            let image_id = doc.add_object(Stream::new(
                Dictionary::from_iter(vec![
                    ("Type", Object::Name(b"XObject".to_vec())),
                    ("Subtype", Object::Name(b"Image".to_vec())),
                    ("Width", Object::Integer(1)),
                    ("Height", Object::Integer(1)),
                    ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
                    ("BitsPerComponent", Object::Integer(8)),
                    ("Filter", Object::Name(b"DCTDecode".to_vec())),
                ]),
                pixels,
            ));
            resources.set(
                "XObject",
                Dictionary::from_iter(vec![("Im1", Object::Reference(image_id))]),
            );
        }

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
            ("Resources", Object::Dictionary(resources)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

/// The same document with a signature field in its AcroForm.
pub fn create_signed_pdf(num_pages: u32) -> Vec<u8> {
    let mut doc = create_document(num_pages, "Signed", 0);
    let sig_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Sig".to_vec())),
        ("Filter", Object::Name(b"Adobe.PPKLite".to_vec())),
        ("SubFilter", Object::Name(b"adbe.pkcs7.detached".to_vec())),
        (
            "ByteRange",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(100),
                Object::Integer(200),
                Object::Integer(300),
            ]),
        ),
    ]));
    let field_id = doc.add_object(Dictionary::from_iter(vec![
        ("FT", Object::Name(b"Sig".to_vec())),
        ("T", Object::String(b"Signature1".to_vec(), StringFormat::Literal)),
        ("V", Object::Reference(sig_id)),
    ]));
    let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    let catalog = doc.get_object_mut(catalog_id).unwrap().as_dict_mut().unwrap();
    catalog.set(
        "AcroForm",
        Dictionary::from_iter(vec![(
            "Fields",
            Object::Array(vec![Object::Reference(field_id)]),
        )]),
    );
    save(doc)
}

pub fn save(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Text drawn on each page, in page order.
pub fn page_texts(doc: &Document) -> Vec<String> {
    doc.get_pages()
        .values()
        .map(|&page_id| {
            let content = doc.get_page_content(page_id).unwrap();
            let start = content.iter().position(|&b| b == b'(').unwrap();
            let end = content.iter().rposition(|&b| b == b')').unwrap();
            String::from_utf8_lossy(&content[start + 1..end]).into_owned()
        })
        .collect()
}

/// Every reference reachable anywhere in the document.
pub fn all_references(doc: &Document) -> BTreeSet<ObjectId> {
    let mut refs = BTreeSet::new();
    for object in doc.objects.values() {
        collect(object, &mut refs);
    }
    for (_, value) in doc.trailer.iter() {
        collect(value, &mut refs);
    }
    refs
}

fn collect(object: &Object, refs: &mut BTreeSet<ObjectId>) {
    match object {
        Object::Reference(id) => {
            refs.insert(*id);
        }
        Object::Array(items) => items.iter().for_each(|item| collect(item, refs)),
        Object::Dictionary(dict) => dict.iter().for_each(|(_, value)| collect(value, refs)),
        Object::Stream(stream) => stream.dict.iter().for_each(|(_, value)| collect(value, refs)),
        _ => {}
    }
}

/// Load `bytes` and assert that no reference dangles and the page count is
/// consistent.
pub fn assert_well_formed(bytes: &[u8]) -> Document {
    assert!(bytes.starts_with(b"%PDF-"), "missing header");
    let doc = Document::load_mem(bytes).expect("output must reload");
    for id in all_references(&doc) {
        assert!(doc.objects.contains_key(&id), "dangling reference {:?}", id);
    }

    let catalog = doc.catalog().expect("catalog");
    let pages_id = catalog.get(b"Pages").unwrap().as_reference().unwrap();
    let count = doc
        .get_dictionary(pages_id)
        .unwrap()
        .get(b"Count")
        .unwrap()
        .as_i64()
        .unwrap();
    assert_eq!(count as usize, doc.get_pages().len());
    doc
}

/// Number of image XObjects stored in the document.
pub fn image_count(doc: &Document) -> usize {
    doc.objects
        .values()
        .filter(|object| match object {
            Object::Stream(stream) => stream
                .dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .map_or(false, |name| name == &b"Image"[..]),
            _ => false,
        })
        .count()
}

/// Objects not reachable from the trailer, ignoring object and xref streams.
pub fn unreachable_objects(doc: &Document) -> Vec<ObjectId> {
    let mut seen = BTreeSet::new();
    let mut queue: Vec<ObjectId> = Vec::new();
    for (_, value) in doc.trailer.iter() {
        let mut refs = BTreeSet::new();
        collect(value, &mut refs);
        queue.extend(refs);
    }
    while let Some(id) = queue.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(object) = doc.objects.get(&id) {
            let mut refs = BTreeSet::new();
            collect(object, &mut refs);
            queue.extend(refs.into_iter().filter(|r| !seen.contains(r)));
        }
    }

    doc.objects
        .iter()
        .filter(|(id, object)| !seen.contains(*id) && !is_container_stream(object))
        .map(|(id, _)| *id)
        .collect()
}

fn is_container_stream(object: &Object) -> bool {
    match object {
        Object::Stream(stream) => stream
            .dict
            .get(b"Type")
            .and_then(Object::as_name)
            .map_or(false, |name| name == &b"ObjStm"[..] || name == &b"XRef"[..]),
        _ => false,
    }
}

/// `N G obj` headers of a classic (uncompressed-xref) file, in file order.
pub fn object_headers(bytes: &[u8]) -> Vec<(u32, u16)> {
    bytes
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            let line = std::str::from_utf8(line).ok()?.trim_end();
            let mut parts = line.strip_suffix(" obj")?.split(' ');
            let number = parts.next()?.parse().ok()?;
            let generation = parts.next()?.parse().ok()?;
            match parts.next() {
                None => Some((number, generation)),
                Some(_) => None,
            }
        })
        .collect()
}
