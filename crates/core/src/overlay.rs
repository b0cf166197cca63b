//! Overlay model.
//!
//! An overlay is a user-placed signature or text annotation anchored to a
//! page. Positions are stored canonically (zoom = 1 screen pixels) and
//! projected to the anchor zoom on demand, so repeated zoom transitions never
//! accumulate rounding drift. Signature pixmaps are always resampled from the
//! immutable captured asset, never from a previously scaled copy.

use crate::metrics;
use image::imageops::{self, FilterType};
use inkmark_engine::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable overlay identifier, unchanged across zoom transitions.
pub type OverlayId = uuid::Uuid;

/// Design-size box for a freshly placed signature, in canonical pixels.
pub const SIGNATURE_DESIGN_WIDTH: f32 = 200.0;
pub const SIGNATURE_DESIGN_HEIGHT: f32 = 100.0;

/// Default authored font size for text overlays, in points.
pub const DEFAULT_TEXT_FONT_SIZE: f32 = 14.0;

/// Inner padding of a text label, in canonical pixels.
pub const TEXT_PADDING_PX: f32 = 2.0;

/// Position in canonical (zoom = 1) screen space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f32,
    pub y: f32,
}

impl CanvasPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Pixel position on the current page raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Pixel extent on the current page raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Immutable signature source image with alpha, captured once.
///
/// Every displayed pixmap is derived from this buffer; the buffer itself is
/// never rescaled in place.
#[derive(Debug, Clone)]
pub struct SignatureAsset {
    pixels: Arc<RgbaImage>,
}

impl SignatureAsset {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels: Arc::new(pixels) }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// True when both assets share the same captured buffer.
    pub fn same_source(&self, other: &SignatureAsset) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Extent of the display pixmap at `zoom`: the asset aspect-fit inside
    /// the design box scaled by `zoom`.
    pub fn fit_size(&self, zoom: f32) -> PixelSize {
        let box_w = SIGNATURE_DESIGN_WIDTH * zoom;
        let box_h = SIGNATURE_DESIGN_HEIGHT * zoom;
        let scale = (box_w / self.width() as f32).min(box_h / self.height() as f32);
        PixelSize::new(
            (self.width() as f32 * scale).round().max(1.0) as u32,
            (self.height() as f32 * scale).round().max(1.0) as u32,
        )
    }

    /// Resample the original asset for display at `zoom`.
    pub fn scaled_for_zoom(&self, zoom: f32) -> RgbaImage {
        let size = self.fit_size(zoom);
        imageops::resize(self.pixels.as_ref(), size.width, size.height, FilterType::CatmullRom)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPayload {
    pub content: String,
    /// Authored font size in points, independent of zoom.
    pub font_size: f32,
}

#[derive(Debug, Clone)]
pub enum OverlayPayload {
    Signature(SignatureAsset),
    Text(TextPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Signature,
    Text,
}

#[derive(Debug, Clone)]
pub struct Overlay {
    id: OverlayId,
    page_index: u32,
    /// Canonical (zoom = 1) top-left position.
    position: CanvasPoint,
    /// Zoom level at which derived screen geometry is expressed.
    anchor_zoom: f32,
    payload: OverlayPayload,
}

impl Overlay {
    fn new(page_index: u32, position: CanvasPoint, anchor_zoom: f32, payload: OverlayPayload) -> Self {
        Self { id: OverlayId::new_v4(), page_index, position, anchor_zoom, payload }
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn kind(&self) -> OverlayKind {
        match self.payload {
            OverlayPayload::Signature(_) => OverlayKind::Signature,
            OverlayPayload::Text(_) => OverlayKind::Text,
        }
    }

    pub fn payload(&self) -> &OverlayPayload {
        &self.payload
    }

    pub fn anchor_zoom(&self) -> f32 {
        self.anchor_zoom
    }

    pub fn canonical_position(&self) -> CanvasPoint {
        self.position
    }

    /// Top-left corner on the raster rendered at the anchor zoom.
    pub fn screen_position(&self) -> PixelPoint {
        PixelPoint::new(
            (self.position.x * self.anchor_zoom).round() as i32,
            (self.position.y * self.anchor_zoom).round() as i32,
        )
    }

    /// Extent on the raster rendered at the anchor zoom.
    pub fn screen_size(&self) -> PixelSize {
        match &self.payload {
            OverlayPayload::Signature(asset) => asset.fit_size(self.anchor_zoom),
            OverlayPayload::Text(text) => {
                let scaled = text.font_size * self.anchor_zoom;
                let pad = (TEXT_PADDING_PX * self.anchor_zoom).round();
                PixelSize::new(
                    (metrics::text_width(&text.content, scaled) + 2.0 * pad).ceil().max(1.0)
                        as u32,
                    (metrics::line_height(scaled) + 2.0 * pad).ceil().max(1.0) as u32,
                )
            }
        }
    }

    /// Font size of the rendered glyph run at the anchor zoom.
    ///
    /// Always a direct function of the authored size, never of a previously
    /// scaled value.
    pub fn scaled_font_size(&self) -> Option<f32> {
        match &self.payload {
            OverlayPayload::Text(text) => Some(text.font_size * self.anchor_zoom),
            OverlayPayload::Signature(_) => None,
        }
    }

    pub(crate) fn set_anchor_zoom(&mut self, zoom: f32) {
        self.anchor_zoom = zoom;
    }

    fn set_screen_position(&mut self, position: PixelPoint) {
        self.position = CanvasPoint::new(
            position.x as f32 / self.anchor_zoom,
            position.y as f32 / self.anchor_zoom,
        );
    }
}

/// Ordered overlay collection with stable iteration.
///
/// The anchor zoom of contained overlays is only mutated by the transform
/// engine's re-projection during a reload.
#[derive(Debug, Default)]
pub struct OverlayCollection {
    items: Vec<Overlay>,
}

impl OverlayCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a signature centered on the click position.
    pub fn place_signature(
        &mut self,
        page_index: u32,
        click: PixelPoint,
        asset: SignatureAsset,
        zoom: f32,
    ) -> OverlayId {
        let size = asset.fit_size(zoom);
        let top_left = PixelPoint::new(
            click.x - size.width as i32 / 2,
            click.y - size.height as i32 / 2,
        );
        let position =
            CanvasPoint::new(top_left.x as f32 / zoom, top_left.y as f32 / zoom);
        let overlay =
            Overlay::new(page_index, position, zoom, OverlayPayload::Signature(asset));
        let id = overlay.id;
        self.items.push(overlay);
        id
    }

    /// Place a text label with its top-left corner at the click position.
    pub fn place_text(
        &mut self,
        page_index: u32,
        click: PixelPoint,
        content: String,
        font_size: f32,
        zoom: f32,
    ) -> OverlayId {
        let position = CanvasPoint::new(click.x as f32 / zoom, click.y as f32 / zoom);
        let overlay = Overlay::new(
            page_index,
            position,
            zoom,
            OverlayPayload::Text(TextPayload { content, font_size }),
        );
        let id = overlay.id;
        self.items.push(overlay);
        id
    }

    /// Move an overlay, clamped so it stays fully inside the page raster.
    pub fn move_to(&mut self, id: OverlayId, target: PixelPoint, page_bounds: PixelSize) -> bool {
        let Some(overlay) = self.items.iter_mut().find(|overlay| overlay.id == id) else {
            return false;
        };

        let size = overlay.screen_size();
        let max_x = (page_bounds.width.saturating_sub(size.width)) as i32;
        let max_y = (page_bounds.height.saturating_sub(size.height)) as i32;
        let clamped = PixelPoint::new(target.x.clamp(0, max_x.max(0)), target.y.clamp(0, max_y.max(0)));
        overlay.set_screen_position(clamped);
        true
    }

    /// Replace a text overlay's content, leaving position and size rules
    /// untouched.
    pub fn edit_text(&mut self, id: OverlayId, content: String) -> bool {
        match self.items.iter_mut().find(|overlay| overlay.id == id) {
            Some(Overlay { payload: OverlayPayload::Text(text), .. }) => {
                text.content = content;
                true
            }
            _ => false,
        }
    }

    /// Swap in a freshly captured asset for a signature overlay.
    pub fn replace_signature(&mut self, id: OverlayId, asset: SignatureAsset) -> bool {
        match self.items.iter_mut().find(|overlay| overlay.id == id) {
            Some(overlay) if matches!(overlay.payload, OverlayPayload::Signature(_)) => {
                overlay.payload = OverlayPayload::Signature(asset);
                true
            }
            _ => false,
        }
    }

    pub fn delete(&mut self, id: OverlayId) -> bool {
        let before = self.items.len();
        self.items.retain(|overlay| overlay.id != id);
        self.items.len() != before
    }

    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        self.items.iter().find(|overlay| overlay.id == id)
    }

    /// Overlays of one page, in placement order.
    pub fn for_page(&self, page_index: u32) -> impl Iterator<Item = &Overlay> {
        self.items.iter().filter(move |overlay| overlay.page_index == page_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlay> {
        self.items.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Overlay> {
        self.items.iter_mut()
    }

    pub(crate) fn retain(&mut self, keep: impl FnMut(&Overlay) -> bool) {
        self.items.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
