//! End-to-end pipeline properties: save/zoom round trips, partial failure
//! tolerance and output-space inversion measured on real output files.

mod common;

use common::write_letter_doc;
use image::{Rgba, RgbaImage};
use inkmark_core::{persist, DocumentSession, PixelPoint, SignatureAsset, ViewportState};
use inkmark_engine::{
    DocumentEngine, DocumentHandle, EngineError, LopdfEngine, OpenSource, PageSize, PointPos,
    PointRect, SerializeOptions, TextStyle,
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object};
use std::path::Path;

fn viewport(base: f32, zoom: f32) -> ViewportState {
    ViewportState { base_multiplier: base, zoom, ..ViewportState::default() }
}

fn blue_asset() -> SignatureAsset {
    SignatureAsset::new(RgbaImage::from_pixel(200, 100, Rgba([0, 0, 100, 255])))
}

fn decoded_page_ops(path: &Path, page_index: usize) -> Vec<Operation> {
    let mut doc = Document::load(path).expect("output parses");
    doc.decompress();
    let page_id = *doc.get_pages().values().nth(page_index).expect("page exists");
    let content = doc.get_page_content(page_id).expect("page content");
    Content::decode(&content).expect("content decodes").operations
}

fn operand_f32(operand: &Object) -> f32 {
    match operand {
        Object::Integer(value) => *value as f32,
        Object::Real(value) => *value,
        other => panic!("numeric operand expected, got {other:?}"),
    }
}

#[test]
fn inversion_maps_screen_rect_back_to_points() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = write_letter_doc(dir.path(), "source.pdf", 1);
    let output = dir.path().join("signed.pdf");

    let base = 2.0;
    let zoom = 1.6;
    let mut engine = LopdfEngine::new();
    let mut session =
        DocumentSession::with_viewport(&mut engine, &source, viewport(base, zoom))
            .expect("open");

    session.begin_signature_placement(blue_asset());
    session.place(0, PixelPoint::new(500, 400), None).expect("placed");

    let overlay = session.overlays().iter().next().expect("overlay").clone();
    let screen = overlay.screen_position();
    let size = overlay.screen_size();
    let k = 1.0 / (base * overlay.anchor_zoom());

    persist(&mut session, &mut engine, &output).expect("persist");

    let ops = decoded_page_ops(&output, 0);
    let cm = ops.iter().find(|op| op.operator == "cm").expect("cm operator");

    // cm = [w 0 0 h x y] with y flipped into PDF space.
    assert!((operand_f32(&cm.operands[0]) - size.width as f32 * k).abs() < 1e-3);
    assert!((operand_f32(&cm.operands[3]) - size.height as f32 * k).abs() < 1e-3);
    assert!((operand_f32(&cm.operands[4]) - screen.x as f32 * k).abs() < 1e-3);
    let expected_pdf_y = 792.0 - screen.y as f32 * k - size.height as f32 * k;
    assert!((operand_f32(&cm.operands[5]) - expected_pdf_y).abs() < 1e-3);
}

#[test]
fn zoom_round_trip_preserves_screen_geometry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = write_letter_doc(dir.path(), "source.pdf", 1);

    let mut engine = LopdfEngine::new();
    let mut session = DocumentSession::open(&mut engine, &source).expect("open");
    session.begin_text_placement();
    let id = session
        .place(0, PixelPoint::new(150, 250), Some("Approved".to_owned()))
        .expect("placed");

    session.set_zoom(&mut engine, 1.8).expect("zoom in");
    let position = session.overlays().get(id).expect("overlay").screen_position();
    let size = session.overlays().get(id).expect("overlay").screen_size();
    let font = session.overlays().get(id).expect("overlay").scaled_font_size();

    session.reset_zoom(&mut engine).expect("back to 1.0");
    session.set_zoom(&mut engine, 1.8).expect("zoom in again");

    let overlay = session.overlays().get(id).expect("overlay");
    assert_eq!(overlay.screen_position(), position);
    assert_eq!(overlay.screen_size(), size);
    assert_eq!(overlay.scaled_font_size(), font);
}

/// Engine wrapper that fails text insertion for one poisoned string.
struct FlakyEngine {
    inner: LopdfEngine,
    poison: &'static str,
}

impl DocumentEngine for FlakyEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, EngineError> {
        self.inner.open(source)
    }

    fn create(&mut self) -> Result<DocumentHandle, EngineError> {
        self.inner.create()
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
        self.inner.page_count(handle)
    }

    fn page_size(&self, handle: DocumentHandle, page_index: u32) -> Result<PageSize, EngineError> {
        self.inner.page_size(handle, page_index)
    }

    fn rasterize(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        resolution: f32,
    ) -> Result<inkmark_engine::RgbaImage, EngineError> {
        self.inner.rasterize(handle, page_index, resolution)
    }

    fn insert_image(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        rect: PointRect,
        image_bytes: &[u8],
        preserve_aspect: bool,
    ) -> Result<(), EngineError> {
        self.inner.insert_image(handle, page_index, rect, image_bytes, preserve_aspect)
    }

    fn insert_text(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        baseline: PointPos,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), EngineError> {
        if text == self.poison {
            return Err(EngineError::Backend("simulated insertion failure".to_owned()));
        }
        self.inner.insert_text(handle, page_index, baseline, text, style)
    }

    fn append_pages(
        &mut self,
        dst: DocumentHandle,
        src: DocumentHandle,
    ) -> Result<u32, EngineError> {
        self.inner.append_pages(dst, src)
    }

    fn serialize(
        &mut self,
        handle: DocumentHandle,
        out_path: &Path,
        options: SerializeOptions,
    ) -> Result<(), EngineError> {
        self.inner.serialize(handle, out_path, options)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        self.inner.close(handle)
    }
}

#[test]
fn one_failing_overlay_does_not_abort_the_save() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = write_letter_doc(dir.path(), "source.pdf", 1);
    let output = dir.path().join("partial.pdf");

    let mut engine = FlakyEngine { inner: LopdfEngine::new(), poison: "poisoned" };
    let mut session = DocumentSession::open(&mut engine, &source).expect("open");

    for content in ["first", "poisoned", "third"] {
        session.begin_text_placement();
        session
            .place(0, PixelPoint::new(100, 100), Some(content.to_owned()))
            .expect("placed");
    }

    let report = persist(&mut session, &mut engine, &output).expect("save survives");
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(report.skipped[0].1.contains("simulated insertion failure"));

    // The output holds exactly the two surviving text runs.
    let ops = decoded_page_ops(&output, 0);
    let texts: Vec<&[u8]> = ops
        .iter()
        .filter(|op| op.operator == "Tj")
        .map(|op| op.operands[0].as_str().expect("literal"))
        .collect();
    assert_eq!(texts, vec![b"first".as_slice(), b"third".as_slice()]);
}

#[test]
fn failed_serialize_keeps_overlays_for_retry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = write_letter_doc(dir.path(), "source.pdf", 1);

    let mut engine = LopdfEngine::new();
    let mut session = DocumentSession::open(&mut engine, &source).expect("open");
    session.begin_text_placement();
    session.place(0, PixelPoint::new(50, 50), Some("retry me".to_owned())).expect("placed");

    // Writing into a directory that does not exist fails serialization.
    let bad_output = dir.path().join("missing-dir").join("out.pdf");
    persist(&mut session, &mut engine, &bad_output).expect_err("serialize must fail");

    assert_eq!(session.overlays().len(), 1, "failed save leaves the model untouched");
    assert!(session.is_modified());

    // The retry against a valid path succeeds and clears the staging list.
    let good_output = dir.path().join("out.pdf");
    let report = persist(&mut session, &mut engine, &good_output).expect("retry succeeds");
    assert_eq!(report.applied, 1);
    assert!(session.overlays().is_empty());
}

#[test]
fn signature_save_embeds_an_alpha_mask() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = write_letter_doc(dir.path(), "source.pdf", 1);
    let output = dir.path().join("signed.pdf");

    let mut engine = LopdfEngine::new();
    let mut session = DocumentSession::open(&mut engine, &source).expect("open");
    session.begin_signature_placement(blue_asset());
    session.place(0, PixelPoint::new(400, 300), None).expect("placed");

    persist(&mut session, &mut engine, &output).expect("persist");

    let doc = Document::load(&output).expect("output parses");
    let page_id = *doc.get_pages().values().next().expect("page");
    let page = doc.get_dictionary(page_id).expect("page dict");
    let resources = page
        .get(b"Resources")
        .and_then(|object| object.as_dict())
        .expect("inline resources");
    let xobjects = resources
        .get(b"XObject")
        .and_then(|object| object.as_dict())
        .expect("xobject dict");

    let (_, reference) = xobjects.iter().next().expect("one stamped image");
    let image_id = reference.as_reference().expect("indirect image");
    let stream = doc.get_object(image_id).and_then(|object| object.as_stream()).expect("stream");
    assert!(stream.dict.get(b"SMask").is_ok(), "alpha channel must ride along as an SMask");
}

#[test]
fn e2e_text_overlay_survives_zoom_and_lands_in_points() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = write_letter_doc(dir.path(), "source.pdf", 1);
    let output = dir.path().join("approved.pdf");

    // base_multiplier 1 so screen pixels at zoom 1 equal document points.
    let mut engine = LopdfEngine::new();
    let mut session =
        DocumentSession::with_viewport(&mut engine, &source, viewport(1.0, 1.0)).expect("open");

    session.begin_text_placement();
    let id = session
        .place(0, PixelPoint::new(100, 100), Some("Approved".to_owned()))
        .expect("placed");

    session.set_zoom(&mut engine, 2.0).expect("zoom to 2.0");

    let overlay = session.overlays().get(id).expect("overlay");
    assert_eq!(overlay.screen_position(), PixelPoint::new(200, 200));
    let scaled_font = overlay.scaled_font_size().expect("text overlay");
    assert!((scaled_font - 28.0).abs() < 1e-3);

    persist(&mut session, &mut engine, &output).expect("persist");

    let ops = decoded_page_ops(&output, 0);
    let td = ops.iter().find(|op| op.operator == "Td").expect("Td operator");
    assert!((operand_f32(&td.operands[0]) - 100.0).abs() < 1e-3);
    // Baseline = top anchor + authored font size, flipped into PDF space.
    assert!((operand_f32(&td.operands[1]) - (792.0 - 114.0)).abs() < 1e-3);

    let tf = ops.iter().find(|op| op.operator == "Tf").expect("Tf operator");
    assert!((operand_f32(&tf.operands[1]) - 14.0).abs() < 1e-3);
}
