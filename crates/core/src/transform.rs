//! Coordinate transform engine.
//!
//! Three spaces are kept consistent: canonical screen space (zoom = 1), the
//! current raster space (`base_multiplier × zoom` pixels per point), and the
//! document's resolution-independent point space. Zoom re-projection rewrites
//! anchors; persistence inverts anchored screen geometry into points.

use crate::overlay::{Overlay, OverlayCollection, OverlayPayload};
use inkmark_engine::{PointPos, PointRect};

/// The pair of factors that define the current raster space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Fixed render quality factor, chosen once per session.
    pub base_multiplier: f32,
    /// User-adjustable zoom factor.
    pub zoom: f32,
}

impl ViewTransform {
    pub fn new(base_multiplier: f32, zoom: f32) -> Self {
        Self { base_multiplier, zoom }
    }

    /// Pixels per document point of the current raster.
    pub fn effective_resolution(&self) -> f32 {
        self.base_multiplier * self.zoom
    }
}

/// Re-anchor one overlay to `new_zoom`.
///
/// Derived screen geometry is recomputed from canonical values and immutable
/// payload sources; nothing is scaled from a previously scaled value.
pub fn reproject(overlay: &mut Overlay, new_zoom: f32) {
    overlay.set_anchor_zoom(new_zoom);
}

/// Re-anchor a whole collection to `new_zoom`, dropping overlays whose page
/// no longer exists. Returns the number dropped. A stale page index is a
/// normal condition after a document swap, not an error.
pub fn reproject_all(
    overlays: &mut OverlayCollection,
    new_zoom: f32,
    page_count: u32,
) -> usize {
    let before = overlays.len();
    overlays.retain(|overlay| {
        let keep = overlay.page_index() < page_count;
        if !keep {
            log::debug!(
                "dropping overlay {} on removed page {}",
                overlay.id(),
                overlay.page_index()
            );
        }
        keep
    });
    let dropped = before - overlays.len();

    for overlay in overlays.iter_mut() {
        reproject(overlay, new_zoom);
    }

    dropped
}

/// Invert an overlay's anchored screen rectangle into document points.
pub fn output_rect(overlay: &Overlay, base_multiplier: f32) -> PointRect {
    let position = overlay.screen_position();
    let size = overlay.screen_size();
    let k = 1.0 / (base_multiplier * overlay.anchor_zoom());

    PointRect {
        x: position.x as f32 * k,
        y: position.y as f32 * k,
        width: size.width as f32 * k,
        height: size.height as f32 * k,
    }
}

/// Output baseline point and font size for a text overlay.
///
/// The output font size is the displayed size divided by the anchor zoom,
/// which is identically the authored canonical size; font point units depend
/// only on zoom, never on the base multiplier. The baseline is the top-left
/// anchor advanced vertically by the output font size.
pub fn text_output(overlay: &Overlay, base_multiplier: f32) -> Option<(PointPos, f32)> {
    let OverlayPayload::Text(text) = overlay.payload() else {
        return None;
    };

    let position = overlay.screen_position();
    let k = 1.0 / (base_multiplier * overlay.anchor_zoom());
    let font_size = text.font_size;

    Some((
        PointPos {
            x: position.x as f32 * k,
            y: position.y as f32 * k + font_size,
        },
        font_size,
    ))
}
