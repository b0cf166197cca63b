//! Test-only PDF fixture builder shared by the unit test modules.

use lopdf::{dictionary, Document, Object, Stream};

/// Minimal valid PDF with one page per `(width_pt, height_pt)` entry.
pub(crate) fn pdf_with_pages(sizes: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for &(width, height) in sizes {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture serializes");
    bytes
}

/// Same document with an `/Encrypt` marker so the engine refuses it.
pub(crate) fn encrypted_pdf() -> Vec<u8> {
    let mut bytes = pdf_with_pages(&[(612.0, 792.0)]);
    bytes.extend_from_slice(b"/Encrypt 9 0 R");
    bytes
}
