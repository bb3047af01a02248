//! Test documents built with lopdf

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// One page of a generated test document
#[derive(Debug, Clone)]
pub struct PageSpec {
    /// Text drawn on the page, used to identify it after merge/split
    pub text: String,
    /// Size of a private image XObject (0 = no image)
    pub image_len: usize,
}

impl PageSpec {
    pub fn numbered(num_pages: u32, prefix: &str) -> Vec<PageSpec> {
        (1..=num_pages)
            .map(|i| PageSpec {
                text: format!("{}-Page-{}", prefix, i),
                image_len: 0,
            })
            .collect()
    }

    pub fn with_images(num_pages: u32, prefix: &str, image_len: usize) -> Vec<PageSpec> {
        PageSpec::numbered(num_pages, prefix)
            .into_iter()
            .map(|mut spec| {
                spec.image_len = image_len;
                spec
            })
            .collect()
    }
}

fn text_content(text: &str) -> Vec<u8> {
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(12)]),
            Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
            Operation::new(
                "Tj",
                vec![Object::String(
                    text.as_bytes().to_vec(),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
        ],
    };
    content.encode().unwrap()
}

pub fn helvetica() -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ])
}

/// Build a document with one page per `PageSpec`, a shared Helvetica font and an
/// Info dictionary.
pub fn build_test_document(pages: &[PageSpec]) -> Document {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(helvetica());

    let mut page_ids = Vec::new();
    for (index, spec) in pages.iter().enumerate() {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), text_content(&spec.text)));

        let mut resources = Dictionary::new();
        resources.set(
            "Font",
            Dictionary::from_iter(vec![("F1", Object::Reference(font_id))]),
        );
        if spec.image_len > 0 {
            let image = Stream::new(
                Dictionary::from_iter(vec![
                    ("Type", Object::Name(b"XObject".to_vec())),
                    ("Subtype", Object::Name(b"Image".to_vec())),
                    ("Width", Object::Integer(1)),
                    ("Height", Object::Integer(1)),
                    ("ColorSpace", Object::Name(b"DeviceGray".to_vec())),
                    ("BitsPerComponent", Object::Integer(8)),
                    ("Filter", Object::Name(b"DCTDecode".to_vec())),
                ]),
                (0..spec.image_len)
                    .map(|i| (i * 31 + index * 7) as u8)
                    .collect(),
            );
            let image_id = doc.add_object(image);
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

    let pages_dict = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(pages.len() as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let info = Dictionary::from_iter(vec![(
        "Title",
        Object::String(b"Test Document".to_vec(), StringFormat::Literal),
    )]);
    let info_id = doc.add_object(info);
    doc.trailer.set("Info", Object::Reference(info_id));

    doc
}

pub fn to_bytes(mut doc: Document) -> Vec<u8> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

pub fn build_test_pdf(pages: &[PageSpec]) -> Vec<u8> {
    to_bytes(build_test_document(pages))
}

pub fn numbered_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
    build_test_pdf(&PageSpec::numbered(num_pages, prefix))
}

/// Root with Resources + MediaBox, one direct page overriding MediaBox, and
/// an intermediate node with Rotate holding two more pages.
pub fn nested_tree_document() -> Document {
    let mut doc = Document::with_version("1.6");
    let root_id = doc.new_object_id();
    let middle_id = doc.new_object_id();
    let font_id = doc.add_object(helvetica());

    let mut page_ids = Vec::new();
    for (i, parent) in [root_id, middle_id, middle_id].into_iter().enumerate() {
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            text_content(&format!("Nested-Page-{}", i + 1)),
        ));
        let mut page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(parent)),
            ("Contents", Object::Reference(content_id)),
        ]);
        if i == 0 {
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(300),
                    Object::Integer(400),
                ]),
            );
        }
        page_ids.push(doc.add_object(page));
    }

    let middle = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Parent", Object::Reference(root_id)),
        ("Rotate", Object::Integer(90)),
        ("Count", Object::Integer(2)),
        (
            "Kids",
            Object::Array(vec![
                Object::Reference(page_ids[1]),
                Object::Reference(page_ids[2]),
            ]),
        ),
    ]);
    doc.objects.insert(middle_id, Object::Dictionary(middle));

    let root = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(3)),
        (
            "Kids",
            Object::Array(vec![
                Object::Reference(page_ids[0]),
                Object::Reference(middle_id),
            ]),
        ),
        (
            "Resources",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![("F1", Object::Reference(font_id))])),
            )])),
        ),
        (
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        ),
    ]);
    doc.objects.insert(root_id, Object::Dictionary(root));

    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(root_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc
}

pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

fn catalog_mut(doc: &mut Document) -> &mut Dictionary {
    let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.objects
        .get_mut(&catalog_id)
        .unwrap()
        .as_dict_mut()
        .unwrap()
}

fn push_annotation(doc: &mut Document, page_id: ObjectId, annot_id: ObjectId) {
    let page = doc.objects.get_mut(&page_id).unwrap().as_dict_mut().unwrap();
    let mut annots = page
        .get(b"Annots")
        .ok()
        .and_then(|a| a.as_array().ok())
        .cloned()
        .unwrap_or_default();
    annots.push(Object::Reference(annot_id));
    page.set("Annots", Object::Array(annots));
}

fn fit_dest(page_id: ObjectId) -> Object {
    Object::Array(vec![
        Object::Reference(page_id),
        Object::Name(b"Fit".to_vec()),
    ])
}

/// Outline entry targeting a 0-based page index (or nothing)
#[derive(Debug, Clone)]
pub struct OutlineSpec {
    pub title: &'static str,
    pub page: Option<usize>,
    pub children: Vec<OutlineSpec>,
}

impl OutlineSpec {
    pub fn leaf(title: &'static str, page: usize) -> Self {
        Self {
            title,
            page: Some(page),
            children: Vec::new(),
        }
    }
}

/// Attach an outline tree to the catalog; returns the Outlines root id.
pub fn add_outline(doc: &mut Document, entries: &[OutlineSpec]) -> ObjectId {
    let pages = page_ids(doc);
    let root_id = doc.new_object_id();
    let (first, last, count) = write_outline_level(doc, &pages, root_id, entries);
    let mut root = Dictionary::new();
    root.set("Type", Object::Name(b"Outlines".to_vec()));
    if let (Some(first), Some(last)) = (first, last) {
        root.set("First", Object::Reference(first));
        root.set("Last", Object::Reference(last));
    }
    root.set("Count", Object::Integer(count));
    doc.objects.insert(root_id, Object::Dictionary(root));
    catalog_mut(doc).set("Outlines", Object::Reference(root_id));
    root_id
}

fn write_outline_level(
    doc: &mut Document,
    pages: &[ObjectId],
    parent: ObjectId,
    entries: &[OutlineSpec],
) -> (Option<ObjectId>, Option<ObjectId>, i64) {
    let ids: Vec<ObjectId> = entries.iter().map(|_| doc.new_object_id()).collect();
    let mut total = 0;
    for (i, entry) in entries.iter().enumerate() {
        let mut item = Dictionary::new();
        item.set(
            "Title",
            Object::String(entry.title.as_bytes().to_vec(), StringFormat::Literal),
        );
        item.set("Parent", Object::Reference(parent));
        if i > 0 {
            item.set("Prev", Object::Reference(ids[i - 1]));
        }
        if i + 1 < ids.len() {
            item.set("Next", Object::Reference(ids[i + 1]));
        }
        if let Some(page) = entry.page {
            item.set("Dest", fit_dest(pages[page]));
        }
        let (first, last, count) = write_outline_level(doc, pages, ids[i], &entry.children);
        if let (Some(first), Some(last)) = (first, last) {
            item.set("First", Object::Reference(first));
            item.set("Last", Object::Reference(last));
            item.set("Count", Object::Integer(count));
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
        total += 1 + count;
    }
    (ids.first().copied(), ids.last().copied(), total)
}

/// Add a text field whose widget sits on the page at `page_index`.
pub fn add_text_field(doc: &mut Document, page_index: usize, name: &str) -> ObjectId {
    let page_id = page_ids(doc)[page_index];
    let field = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Annot".to_vec())),
        ("Subtype", Object::Name(b"Widget".to_vec())),
        ("FT", Object::Name(b"Tx".to_vec())),
        (
            "T",
            Object::String(name.as_bytes().to_vec(), StringFormat::Literal),
        ),
        ("P", Object::Reference(page_id)),
        (
            "Rect",
            Object::Array(vec![
                Object::Integer(50),
                Object::Integer(50),
                Object::Integer(200),
                Object::Integer(80),
            ]),
        ),
    ]);
    let field_id = doc.add_object(field);
    push_annotation(doc, page_id, field_id);

    let form_font = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Courier".to_vec())),
    ]));

    let catalog = catalog_mut(doc);
    let mut acroform = catalog
        .get(b"AcroForm")
        .ok()
        .and_then(|a| a.as_dict().ok())
        .cloned()
        .unwrap_or_else(|| {
            Dictionary::from_iter(vec![
                (
                    "DA",
                    Object::String(b"/Cour 0 Tf 0 g".to_vec(), StringFormat::Literal),
                ),
                (
                    "DR",
                    Object::Dictionary(Dictionary::from_iter(vec![(
                        "Font",
                        Object::Dictionary(Dictionary::from_iter(vec![(
                            "Cour",
                            Object::Reference(form_font),
                        )])),
                    )])),
                ),
            ])
        });
    let mut fields = acroform
        .get(b"Fields")
        .ok()
        .and_then(|f| f.as_array().ok())
        .cloned()
        .unwrap_or_default();
    fields.push(Object::Reference(field_id));
    acroform.set("Fields", Object::Array(fields));
    catalog.set("AcroForm", Object::Dictionary(acroform));
    field_id
}

/// Add a link annotation on `from` jumping to `to` (0-based page indexes).
pub fn add_link(doc: &mut Document, from: usize, to: usize) -> ObjectId {
    let pages = page_ids(doc);
    let link_id = doc.add_object(link_annotation("Dest", fit_dest(pages[to])));
    push_annotation(doc, pages[from], link_id);
    link_id
}

/// Add a link on `from` whose indirect GoTo action jumps to `to`.
/// Returns the annotation and action IDs.
pub fn add_goto_link(doc: &mut Document, from: usize, to: usize) -> (ObjectId, ObjectId) {
    let pages = page_ids(doc);
    let action_id = doc.add_object(Dictionary::from_iter(vec![
        ("S", Object::Name(b"GoTo".to_vec())),
        ("D", fit_dest(pages[to])),
    ]));
    let link_id = doc.add_object(link_annotation("A", Object::Reference(action_id)));
    push_annotation(doc, pages[from], link_id);
    (link_id, action_id)
}

/// Register `name` in the catalog's `/Dests` dictionary, targeting `page`.
pub fn add_named_destination(doc: &mut Document, name: &str, page: usize) {
    let target = fit_dest(page_ids(doc)[page]);
    let catalog = catalog_mut(doc);
    let mut dests = catalog
        .get(b"Dests")
        .ok()
        .and_then(|d| d.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    dests.set(name, target);
    catalog.set("Dests", Object::Dictionary(dests));
}

/// Add a link on `from` whose `Dest` is the name `name`.
pub fn add_named_link(doc: &mut Document, from: usize, name: &str) -> ObjectId {
    let pages = page_ids(doc);
    let link_id = doc.add_object(link_annotation(
        "Dest",
        Object::Name(name.as_bytes().to_vec()),
    ));
    push_annotation(doc, pages[from], link_id);
    link_id
}

fn link_annotation(key: &str, target: Object) -> Dictionary {
    let mut link = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Annot".to_vec())),
        ("Subtype", Object::Name(b"Link".to_vec())),
        (
            "Rect",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(10),
                Object::Integer(10),
            ]),
        ),
    ]);
    link.set(key, target);
    link
}

/// Add a signature field carrying a signature dictionary.
pub fn add_signature(doc: &mut Document) {
    let sig = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Sig".to_vec())),
        ("Filter", Object::Name(b"Adobe.PPKLite".to_vec())),
        (
            "ByteRange",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(10),
                Object::Integer(20),
                Object::Integer(30),
            ]),
        ),
        (
            "Contents",
            Object::String(vec![0u8; 16], StringFormat::Hexadecimal),
        ),
    ]);
    let sig_id = doc.add_object(sig);
    let field = Dictionary::from_iter(vec![
        ("FT", Object::Name(b"Sig".to_vec())),
        ("V", Object::Reference(sig_id)),
    ]);
    let field_id = doc.add_object(field);
    catalog_mut(doc).set(
        "AcroForm",
        Dictionary::from_iter(vec![(
            "Fields",
            Object::Array(vec![Object::Reference(field_id)]),
        )]),
    );
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
