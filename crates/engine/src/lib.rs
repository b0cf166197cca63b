//! Document engine abstraction and the lopdf-backed default backend.
//!
//! The engine owns parsed documents behind opaque handles and exposes the
//! operations the editing core needs: page geometry, rasterization, alpha
//! preserving image stamps, text runs, page concatenation and serialization.
//! All rectangle and point inputs are in document points with a top-left
//! origin; the backend converts to the PDF's bottom-up coordinate system.

use image::{ImageBuffer, Rgba};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Native page size in document points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Axis-aligned rectangle in document points, top-left origin, y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Point-space position, top-left origin, y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPos {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl BuiltinFont {
    fn base_name(self) -> &'static str {
        match self {
            BuiltinFont::Helvetica => "Helvetica",
            BuiltinFont::TimesRoman => "Times-Roman",
            BuiltinFont::Courier => "Courier",
        }
    }
}

/// Fill style for an inserted text run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    /// Fill color, normalized RGB.
    pub color: [f32; 3],
    pub font: BuiltinFont,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { font_size: 12.0, color: [0.0, 0.0, 0.0], font: BuiltinFont::Helvetica }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Drop unreachable objects and renumber before writing.
    pub compact: bool,
    /// Deflate stream contents.
    pub compress: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self { compact: true, compress: true }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("document is encrypted")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Contract between the editing core and the document backend.
///
/// `append_pages` leaves the source handle open; callers close it when done.
pub trait DocumentEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, EngineError>;
    /// Create a new empty document (no pages). Used as a merge target.
    fn create(&mut self) -> Result<DocumentHandle, EngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, EngineError>;
    /// Rasterize one page at `resolution` pixels per point.
    fn rasterize(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        resolution: f32,
    ) -> Result<RgbaImage, EngineError>;
    /// Stamp encoded image bytes (PNG) over the page content inside
    /// `rect`, preserving the image's alpha channel.
    fn insert_image(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        rect: PointRect,
        image_bytes: &[u8],
        preserve_aspect: bool,
    ) -> Result<(), EngineError>;
    /// Insert a text run with its baseline at `baseline`.
    fn insert_text(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        baseline: PointPos,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), EngineError>;
    /// Append every page of `src` to `dst`, returning the number appended.
    fn append_pages(
        &mut self,
        dst: DocumentHandle,
        src: DocumentHandle,
    ) -> Result<u32, EngineError>;
    fn serialize(
        &mut self,
        handle: DocumentHandle,
        out_path: &Path,
        options: SerializeOptions,
    ) -> Result<(), EngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError>;
}

struct DocumentRecord {
    doc: Document,
    page_ids: Vec<ObjectId>,
    /// Monotonic counter for unique per-document resource names.
    stamp_seq: u64,
    /// Shared Type1 font objects keyed by base font name.
    font_objects: HashMap<&'static str, ObjectId>,
}

impl DocumentRecord {
    fn new(doc: Document) -> Self {
        let page_ids = ordered_page_ids(&doc);
        Self { doc, page_ids, stamp_seq: 0, font_objects: HashMap::new() }
    }

    fn refresh_pages(&mut self) {
        self.page_ids = ordered_page_ids(&self.doc);
    }

    fn page_id(&self, page_index: u32) -> Result<ObjectId, EngineError> {
        self.page_ids.get(page_index as usize).copied().ok_or(EngineError::PageOutOfRange {
            page: page_index,
            page_count: self.page_ids.len() as u32,
        })
    }

    fn next_stamp(&mut self) -> u64 {
        self.stamp_seq += 1;
        self.stamp_seq
    }
}

fn ordered_page_ids(doc: &Document) -> Vec<ObjectId> {
    // get_pages is keyed by 1-based page number; BTreeMap iteration keeps
    // document order.
    doc.get_pages().into_values().collect()
}

#[derive(Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, EngineError> {
        self.docs.get(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    fn record_mut(&mut self, handle: DocumentHandle) -> Result<&mut DocumentRecord, EngineError> {
        self.docs.get_mut(&handle).ok_or(EngineError::InvalidHandle(handle.raw()))
    }

    fn register(&mut self, record: DocumentRecord) -> DocumentHandle {
        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        self.docs.insert(handle, record);
        handle
    }
}

/// Walk the page's dictionary chain for a MediaBox, falling back to Letter.
fn page_size_points(doc: &Document, page_id: ObjectId) -> Result<PageSize, EngineError> {
    let mut current = Some(page_id);
    while let Some(id) = current {
        let dict = doc
            .get_object(id)
            .and_then(|object| object.as_dict())
            .map_err(|_| EngineError::Backend("page dictionary missing".to_owned()))?;

        if let Some(size) = media_box_size(doc, dict) {
            return Ok(size);
        }

        current = dict.get(b"Parent").and_then(|parent| parent.as_reference()).ok();
    }

    Ok(PageSize { width_pt: 612.0, height_pt: 792.0 })
}

fn media_box_size(doc: &Document, dict: &lopdf::Dictionary) -> Option<PageSize> {
    let raw = dict.get(b"MediaBox").ok()?;
    let resolved = match raw {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    let array = resolved.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = object_to_f32(&array[0])?;
    let y0 = object_to_f32(&array[1])?;
    let x1 = object_to_f32(&array[2])?;
    let y1 = object_to_f32(&array[3])?;

    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

fn object_to_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// Register `value` under `category` (e.g. "XObject", "Font") in the page's
/// resource dictionary, creating intermediate dictionaries as needed.
fn register_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    value: ObjectId,
) -> Result<(), EngineError> {
    let mut resources = {
        let page_dict = doc
            .get_object_mut(page_id)
            .and_then(|object| object.as_dict_mut())
            .map_err(|_| EngineError::Backend("page dictionary missing".to_owned()))?;
        page_dict
            .remove(b"Resources")
            .unwrap_or_else(|| Object::Dictionary(dictionary! {}))
    };

    match &mut resources {
        Object::Reference(id) => {
            let resource_dict = doc
                .get_object_mut(*id)
                .and_then(|object| object.as_dict_mut())
                .map_err(|_| EngineError::Backend("resource dictionary missing".to_owned()))?;
            set_category_entry(resource_dict, category, name, value)?;
        }
        Object::Dictionary(dict) => {
            set_category_entry(dict, category, name, value)?;
        }
        _ => return Err(EngineError::Backend("invalid page resources".to_owned())),
    }

    let page_dict = doc
        .get_object_mut(page_id)
        .and_then(|object| object.as_dict_mut())
        .map_err(|_| EngineError::Backend("page dictionary missing".to_owned()))?;
    page_dict.set("Resources", resources);

    Ok(())
}

fn set_category_entry(
    resource_dict: &mut lopdf::Dictionary,
    category: &str,
    name: &str,
    value: ObjectId,
) -> Result<(), EngineError> {
    let owned = resource_dict
        .remove(category.as_bytes())
        .unwrap_or_else(|| Object::Dictionary(dictionary! {}));

    // An indirect category dictionary would be shared with other pages;
    // replace it with a fresh inline one rather than chase the reference.
    let mut category_dict = match owned {
        Object::Dictionary(dict) => dict,
        Object::Reference(_) => dictionary! {},
        _ => return Err(EngineError::Backend("invalid resource category".to_owned())),
    };

    category_dict.set(name, value);
    resource_dict.set(category, Object::Dictionary(category_dict));
    Ok(())
}

impl DocumentEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, EngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(EngineError::Encrypted);
        }

        let doc = Document::load_mem(&bytes)?;
        let record = DocumentRecord::new(doc);
        if record.page_ids.is_empty() {
            return Err(EngineError::NoPages);
        }

        Ok(self.register(record))
    }

    fn create(&mut self) -> Result<DocumentHandle, EngineError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => 0,
        });
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        Ok(self.register(DocumentRecord::new(doc)))
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, EngineError> {
        Ok(self.record(handle)?.page_ids.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, EngineError> {
        let record = self.record(handle)?;
        let page_id = record.page_id(page_index)?;
        page_size_points(&record.doc, page_id)
    }

    fn rasterize(
        &self,
        handle: DocumentHandle,
        page_index: u32,
        resolution: f32,
    ) -> Result<RgbaImage, EngineError> {
        let size = self.page_size(handle, page_index)?;
        let resolution = if resolution <= 0.0 { 1.0 } else { resolution };

        let width = (size.width_pt * resolution).round().max(1.0) as u32;
        let height = (size.height_pt * resolution).round().max(1.0) as u32;

        // Placeholder raster: white page with a light border. A real
        // renderer backend substitutes here behind the trait.
        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }

    fn insert_image(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        rect: PointRect,
        image_bytes: &[u8],
        preserve_aspect: bool,
    ) -> Result<(), EngineError> {
        let decoded = image::load_from_memory(image_bytes)
            .map_err(|err| EngineError::Backend(format!("image decode failed: {err}")))?
            .to_rgba8();
        let (img_w, img_h) = decoded.dimensions();
        if img_w == 0 || img_h == 0 {
            return Err(EngineError::Backend("empty image".to_owned()));
        }

        let record = self.record_mut(handle)?;
        let page_id = record.page_id(page_index)?;
        let page = page_size_points(&record.doc, page_id)?;

        // Split RGBA into a DeviceRGB stream plus a DeviceGray soft mask so
        // the stamp composites over existing content.
        let mut rgb = Vec::with_capacity((img_w * img_h * 3) as usize);
        let mut alpha = Vec::with_capacity((img_w * img_h) as usize);
        for pixel in decoded.pixels() {
            rgb.push(pixel[0]);
            rgb.push(pixel[1]);
            rgb.push(pixel[2]);
            alpha.push(pixel[3]);
        }

        let smask_id = record.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img_w as i64,
                "Height" => img_h as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            alpha,
        ));
        let image_id = record.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img_w as i64,
                "Height" => img_h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "SMask" => smask_id,
            },
            rgb,
        ));

        let (draw_w, draw_h, draw_x, draw_y_top) = if preserve_aspect {
            let scale = (rect.width / img_w as f32).min(rect.height / img_h as f32);
            let w = img_w as f32 * scale;
            let h = img_h as f32 * scale;
            (w, h, rect.x + (rect.width - w) / 2.0, rect.y + (rect.height - h) / 2.0)
        } else {
            (rect.width, rect.height, rect.x, rect.y)
        };
        let pdf_y = page.height_pt - draw_y_top - draw_h;

        let name = format!("OvImg{}", record.next_stamp());
        register_page_resource(&mut record.doc, page_id, "XObject", &name, image_id)?;

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        draw_w.into(),
                        0.into(),
                        0.into(),
                        draw_h.into(),
                        draw_x.into(),
                        pdf_y.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|err| EngineError::Backend(format!("content encode failed: {err}")))?;
        record.doc.add_page_contents(page_id, encoded)?;

        Ok(())
    }

    fn insert_text(
        &mut self,
        handle: DocumentHandle,
        page_index: u32,
        baseline: PointPos,
        text: &str,
        style: &TextStyle,
    ) -> Result<(), EngineError> {
        let record = self.record_mut(handle)?;
        let page_id = record.page_id(page_index)?;
        let page = page_size_points(&record.doc, page_id)?;

        let base_name = style.font.base_name();
        let font_id = match record.font_objects.get(base_name) {
            Some(id) => *id,
            None => {
                let id = record.doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => base_name,
                });
                record.font_objects.insert(base_name, id);
                id
            }
        };

        let name = format!("OvF{}", record.next_stamp());
        register_page_resource(&mut record.doc, page_id, "Font", &name, font_id)?;

        let pdf_y = page.height_pt - baseline.y;
        let [r, g, b] = style.color;
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(name.into_bytes()), style.font_size.into()]),
                Operation::new("rg", vec![r.into(), g.into(), b.into()]),
                Operation::new("Tr", vec![0.into()]),
                Operation::new("Td", vec![baseline.x.into(), pdf_y.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|err| EngineError::Backend(format!("content encode failed: {err}")))?;
        record.doc.add_page_contents(page_id, encoded)?;

        Ok(())
    }

    fn append_pages(
        &mut self,
        dst: DocumentHandle,
        src: DocumentHandle,
    ) -> Result<u32, EngineError> {
        if dst == src {
            return Err(EngineError::Backend("cannot append a document to itself".to_owned()));
        }

        let mut incoming = self.record(src)?.doc.clone();
        let dst_record = self.record_mut(dst)?;

        let start_id = dst_record.doc.max_id + 1;
        incoming.renumber_objects_with(start_id);
        let incoming_page_ids: Vec<ObjectId> = incoming.page_iter().collect();

        for (id, object) in incoming.objects.into_iter() {
            dst_record.doc.objects.insert(id, object);
        }
        if incoming.max_id > dst_record.doc.max_id {
            dst_record.doc.max_id = incoming.max_id;
        }

        let pages_root_id = dst_record
            .doc
            .catalog()
            .map_err(|_| EngineError::Backend("destination catalog missing".to_owned()))?
            .get(b"Pages")
            .and_then(|object| object.as_reference())
            .map_err(|_| EngineError::Backend("destination pages root missing".to_owned()))?;

        {
            let pages_dict = dst_record
                .doc
                .get_object_mut(pages_root_id)
                .and_then(|object| object.as_dict_mut())
                .map_err(|_| EngineError::Backend("destination pages dictionary missing".to_owned()))?;
            let kids = pages_dict
                .get_mut(b"Kids")
                .and_then(|object| object.as_array_mut())
                .map_err(|_| EngineError::Backend("destination kids array missing".to_owned()))?;
            for page_id in &incoming_page_ids {
                kids.push(Object::Reference(*page_id));
            }
            let count = pages_dict.get(b"Count").and_then(|count| count.as_i64()).unwrap_or(0);
            pages_dict.set("Count", count + incoming_page_ids.len() as i64);
        }

        for page_id in &incoming_page_ids {
            if let Ok(page_dict) = dst_record
                .doc
                .get_object_mut(*page_id)
                .and_then(|object| object.as_dict_mut())
            {
                page_dict.set("Parent", pages_root_id);
            }
        }

        dst_record.refresh_pages();
        Ok(incoming_page_ids.len() as u32)
    }

    fn serialize(
        &mut self,
        handle: DocumentHandle,
        out_path: &Path,
        options: SerializeOptions,
    ) -> Result<(), EngineError> {
        let record = self.record_mut(handle)?;

        if options.compact {
            record.doc.prune_objects();
            record.doc.renumber_objects();
            // Renumbering invalidates cached ids.
            record.font_objects.clear();
            record.refresh_pages();
        }
        if options.compress {
            record.doc.compress();
        }

        record.doc.save(out_path)?;
        Ok(())
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), EngineError> {
        self.docs
            .remove(&handle)
            .map(|_| ())
            .ok_or(EngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}
