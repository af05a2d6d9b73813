//! Stamps an existing PDF: a faint diagonal label across each page and a
//! footer line carrying the document id.
//!
//! Works on any PDF buffer, not only ones produced by [`DocumentBuilder`]
//! (super::layout::DocumentBuilder), so pages appended by later passes are
//! covered as long as the stamp runs last.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use service_core::error::AppError;

use super::charmap::to_ascii;
use super::fonts::{text_width, Font};
use super::pdf_error;

const FONT_RESOURCE: &str = "WmF";
const STATE_RESOURCE: &str = "WmGS";
const OPACITY: f32 = 0.15;
const LABEL_SIZE: f32 = 48.0;
const FOOTER_SIZE: f32 = 7.0;

/// Watermark every page of `pdf` with `label` and a `Document ID` footer.
pub fn watermark(pdf: &[u8], label: &str, document_id: &str) -> Result<Vec<u8>, AppError> {
    let mut doc = Document::load_mem(pdf).map_err(pdf_error)?;
    let label = to_ascii(label).replace('\n', " ");
    let footer = to_ascii(&format!("Document ID: {} | {}", document_id, label)).replace('\n', " ");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Font::HelveticaBold.base_font(),
        "Encoding" => "WinAnsiEncoding",
    });
    let state_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "CA" => OPACITY,
        "ca" => OPACITY,
    });
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    if page_ids.is_empty() {
        return Err(AppError::bad_request("PDF has no pages"));
    }

    for page_id in page_ids {
        let mut resources = inherited_resources(&doc, page_id)?;
        add_resource(&doc, &mut resources, b"Font", FONT_RESOURCE, font_id)?;
        add_resource(&doc, &mut resources, b"ExtGState", STATE_RESOURCE, state_id)?;

        let (width, height) = page_size(&doc, page_id);
        let content = Content {
            operations: stamp_operations(&label, &footer, width, height),
        };
        let mut bytes = b"Q\n".to_vec();
        bytes.extend(content.encode().map_err(pdf_error)?);
        let stamp_id = doc.add_object(Stream::new(dictionary! {}, bytes));

        let page = doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(pdf_error)?;
        let mut contents = vec![Object::Reference(save_id)];
        match page.get(b"Contents") {
            Ok(Object::Reference(id)) => contents.push(Object::Reference(*id)),
            Ok(Object::Array(items)) => contents.extend(items.iter().cloned()),
            _ => {}
        }
        contents.push(Object::Reference(stamp_id));
        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(resources));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(pdf_error)?;
    Ok(buffer)
}

fn stamp_operations(label: &str, footer: &str, width: f32, height: f32) -> Vec<Operation> {
    let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();
    let half = text_width(Font::HelveticaBold, LABEL_SIZE, label) / 2.0;
    // Start point so the rotated label is centred on the page.
    let x = width / 2.0 - half * cos + (LABEL_SIZE / 3.0) * sin;
    let y = height / 2.0 - half * sin - (LABEL_SIZE / 3.0) * cos;
    let font = || Object::Name(FONT_RESOURCE.as_bytes().to_vec());

    vec![
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(STATE_RESOURCE.as_bytes().to_vec())]),
        Operation::new("BT", vec![]),
        Operation::new("g", vec![0.5_f32.into()]),
        Operation::new("Tf", vec![font(), LABEL_SIZE.into()]),
        Operation::new(
            "Tm",
            vec![cos.into(), sin.into(), (-sin).into(), cos.into(), x.into(), y.into()],
        ),
        Operation::new("Tj", vec![Object::string_literal(label)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("g", vec![0.4_f32.into()]),
        Operation::new("Tf", vec![font(), FOOTER_SIZE.into()]),
        Operation::new("Td", vec![36.0_f32.into(), 18.0_f32.into()]),
        Operation::new("Tj", vec![Object::string_literal(footer)]),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Walk up the page tree to the nearest object with `key`.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = Some(page_id);
    while let Some(id) = node {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

fn resolve_dict(doc: &Document, object: &Object) -> Result<Dictionary, AppError> {
    match object {
        Object::Dictionary(dict) => Ok(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).cloned().map_err(pdf_error),
        _ => Ok(Dictionary::new()),
    }
}

/// Resources apply from the nearest ancestor; copy them onto the page so we
/// can extend them without touching other pages.
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Result<Dictionary, AppError> {
    match inherited(doc, page_id, b"Resources") {
        Some(object) => resolve_dict(doc, object),
        None => Ok(Dictionary::new()),
    }
}

fn add_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &[u8],
    name: &str,
    id: ObjectId,
) -> Result<(), AppError> {
    let mut entries = match resources.get(category) {
        Ok(object) => resolve_dict(doc, object)?,
        Err(_) => Dictionary::new(),
    };
    entries.set(name, Object::Reference(id));
    resources.set(category.to_vec(), Object::Dictionary(entries));
    Ok(())
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn page_size(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let media_box = match inherited(doc, page_id, b"MediaBox") {
        Some(Object::Array(values)) => values.clone(),
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(values)) => values.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    let coords: Vec<f32> = media_box.iter().filter_map(number).collect();
    if coords.len() == 4 {
        ((coords[2] - coords[0]).abs(), (coords[3] - coords[1]).abs())
    } else {
        (595.0, 842.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::layout::{DocumentBuilder, PageLayout};

    fn stamp_stream(doc: &Document, page_id: ObjectId) -> Vec<u8> {
        let page = doc.get_dictionary(page_id).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        let last = contents.last().unwrap().as_reference().unwrap();
        doc.get_object(last).unwrap().as_stream().unwrap().content.clone()
    }

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn stamps_every_page_and_keeps_fonts() {
        let mut builder = DocumentBuilder::new(PageLayout::A4);
        for i in 0..150 {
            builder.text(&format!("Row {i}"), Font::Helvetica, 10.0);
        }
        let original = builder.finish().unwrap();
        let stamped = watermark(&original, "jo@client.com", "nda-123").unwrap();

        let doc = Document::load_mem(&stamped).unwrap();
        let pages = doc.get_pages();
        assert!(pages.len() >= 3);
        for page_id in pages.values() {
            let stream = stamp_stream(&doc, *page_id);
            assert!(contains(&stream, b"Document ID: nda-123 | jo@client.com"));
            assert!(contains(&stream, b"/WmGS gs"));

            let resources = doc
                .get_dictionary(*page_id)
                .unwrap()
                .get(b"Resources")
                .unwrap()
                .as_dict()
                .unwrap();
            let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
            assert!(fonts.has(b"F1"));
            assert!(fonts.has(FONT_RESOURCE.as_bytes()));
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(watermark(b"not a pdf", "x", "y").is_err());
    }

    #[test]
    fn reads_page_size_from_parent() {
        let builder = DocumentBuilder::new(PageLayout {
            width: 612.0,
            height: 792.0,
            ..PageLayout::A4
        });
        let doc = Document::load_mem(&builder.finish().unwrap()).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        assert_eq!(page_size(&doc, page_id), (612.0, 792.0));
    }
}
