//! In-memory PDF fixtures for tests.

use lopdf::dictionary;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Content stream showing `text` at a fixed position, or nothing when empty.
pub fn text_stream(text: &str) -> String {
    if text.is_empty() {
        String::new()
    } else {
        format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET")
    }
}

/// One page per entry; an empty entry yields a page with no text layer.
pub fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
    let streams: Vec<String> = texts.iter().map(|t| text_stream(t)).collect();
    pdf_with_content_streams(&streams)
}

/// One page per raw content stream.
pub fn pdf_with_content_streams(streams: &[String]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let font_id = add_font(&mut doc);
    let pages = streams
        .iter()
        .map(|content| (content.clone(), font_resources(font_id)))
        .collect();
    save(doc, pages)
}

/// A form XObject registered as `/name`.
pub struct FormFixture<'a> {
    pub name: &'a str,
    pub content: &'a str,
    pub matrix: Option<[f32; 6]>,
}

impl<'a> FormFixture<'a> {
    pub fn new(name: &'a str, content: &'a str) -> Self {
        Self {
            name,
            content,
            matrix: None,
        }
    }

    pub fn with_matrix(mut self, matrix: [f32; 6]) -> Self {
        self.matrix = Some(matrix);
        self
    }
}

/// Single page drawing `page_content`. Page and forms share one indirect
/// `/XObject` dictionary, so forms may invoke each other or themselves.
pub fn pdf_with_forms(page_content: &str, forms: &[FormFixture<'_>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.4");
    let font_id = add_font(&mut doc);
    let xobjects_id = doc.new_object_id();

    let mut xobjects = Dictionary::new();
    for form in forms {
        let mut resources = font_resources(font_id);
        resources.set("XObject", xobjects_id);
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => resources,
        };
        if let Some(matrix) = form.matrix {
            let values: Vec<Object> = matrix.iter().map(|&v| Object::Real(v)).collect();
            dict.set("Matrix", values);
        }
        let form_id = doc.add_object(Stream::new(dict, form.content.as_bytes().to_vec()));
        xobjects.set(form.name, form_id);
    }
    doc.objects.insert(xobjects_id, Object::Dictionary(xobjects));

    let mut resources = font_resources(font_id);
    resources.set("XObject", xobjects_id);
    save(doc, vec![(page_content.to_string(), resources)])
}

fn add_font(doc: &mut Document) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    })
}

fn font_resources(font_id: ObjectId) -> Dictionary {
    dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    }
}

/// Build the page tree from `(content, resources)` pairs and serialise.
fn save(mut doc: Document, pages: Vec<(String, Dictionary)>) -> Vec<u8> {
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for (content, resources) in pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
