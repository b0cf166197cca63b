//! Viewport state and zoom control.
//!
//! The controller owns the zoom factor and decides when a reload is needed.
//! Scroll position survives a reload as a per-axis fraction of the scroll
//! range, re-applied against the new range once the pages are re-rasterized.

use crate::overlay::PixelSize;
use serde::{Deserialize, Serialize};

pub const ZOOM_MIN: f32 = 0.25;
pub const ZOOM_MAX: f32 = 4.0;

/// Default render quality factor (200% rasters at zoom 1).
pub const DEFAULT_BASE_MULTIPLIER: f32 = 2.0;

/// Vertical gap between stacked pages, in raster pixels.
pub const PAGE_SPACING_PX: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScrollState {
    pub offset_x: f32,
    pub offset_y: f32,
    pub range_x: f32,
    pub range_y: f32,
}

impl ScrollState {
    /// Relative position per axis; an empty range maps to 0.
    pub fn fraction(&self) -> (f32, f32) {
        let fx = if self.range_x > 0.0 { self.offset_x / self.range_x } else { 0.0 };
        let fy = if self.range_y > 0.0 { self.offset_y / self.range_y } else { 0.0 };
        (fx, fy)
    }

    /// Re-apply a saved fraction against this state's current range.
    pub fn restore_fraction(&mut self, fraction: (f32, f32)) {
        self.offset_x = (fraction.0 * self.range_x).round();
        self.offset_y = (fraction.1 * self.range_y).round();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    /// Fixed render quality factor, chosen once per session.
    pub base_multiplier: f32,
    /// Current zoom factor, clamped to [`ZOOM_MIN`, `ZOOM_MAX`].
    pub zoom: f32,
    pub viewport_width_px: f32,
    pub viewport_height_px: f32,
    pub scroll: ScrollState,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            base_multiplier: DEFAULT_BASE_MULTIPLIER,
            zoom: 1.0,
            viewport_width_px: 1280.0,
            viewport_height_px: 800.0,
            scroll: ScrollState::default(),
        }
    }
}

impl ViewportState {
    /// Pixels per document point of the current raster.
    pub fn effective_resolution(&self) -> f32 {
        self.base_multiplier * self.zoom
    }

    /// Recompute scroll ranges from the stacked page extents.
    pub fn update_scroll_range(&mut self, page_sizes: &[PixelSize]) {
        let (content_w, content_h) = content_extent(page_sizes, PAGE_SPACING_PX);
        self.scroll.range_x = (content_w - self.viewport_width_px).max(0.0);
        self.scroll.range_y = (content_h - self.viewport_height_px).max(0.0);
    }
}

/// Total extent of vertically stacked pages with fixed spacing.
pub fn content_extent(page_sizes: &[PixelSize], spacing: f32) -> (f32, f32) {
    let width = page_sizes.iter().map(|size| size.width as f32).fold(0.0, f32::max);
    let height: f32 = page_sizes.iter().map(|size| size.height as f32).sum::<f32>()
        + spacing * page_sizes.len().saturating_sub(1) as f32;
    (width, height)
}

/// What a zoom change requires from the reload path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReloadPlan {
    pub previous_zoom: f32,
    pub new_zoom: f32,
    /// Scroll fraction captured before the reload, restored after.
    pub scroll_fraction: (f32, f32),
}

type ZoomObserver = Box<dyn FnMut(f32)>;

/// Owns the zoom factor; yields a [`ReloadPlan`] only for an actual change.
pub struct ZoomController {
    state: ViewportState,
    observers: Vec<ZoomObserver>,
}

impl ZoomController {
    pub fn new(state: ViewportState) -> Self {
        Self { state, observers: Vec::new() }
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ViewportState {
        &mut self.state
    }

    /// Register an observer notified with the new factor after each change
    /// (e.g. a percentage readout).
    pub fn subscribe(&mut self, observer: impl FnMut(f32) + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Multiply the current zoom by `factor`, clamped. Returns a plan only
    /// when the clamped value differs from the current one.
    pub fn set_zoom(&mut self, factor: f32) -> Option<ReloadPlan> {
        self.apply(self.state.zoom * factor)
    }

    /// Jump to an absolute zoom value, clamped.
    pub fn set_zoom_absolute(&mut self, zoom: f32) -> Option<ReloadPlan> {
        self.apply(zoom)
    }

    /// Back to 100%.
    pub fn reset_zoom(&mut self) -> Option<ReloadPlan> {
        self.set_zoom_absolute(1.0)
    }

    fn apply(&mut self, target: f32) -> Option<ReloadPlan> {
        let clamped = target.clamp(ZOOM_MIN, ZOOM_MAX);
        if clamped == self.state.zoom {
            return None;
        }

        let plan = ReloadPlan {
            previous_zoom: self.state.zoom,
            new_zoom: clamped,
            scroll_fraction: self.state.scroll.fraction(),
        };
        self.state.zoom = clamped;

        for observer in &mut self.observers {
            observer(clamped);
        }

        Some(plan)
    }
}

/// Last-wins coalescing for zoom-triggered reloads.
///
/// A reload captures a ticket when it starts; if another reload begins before
/// it finishes, the earlier ticket goes stale and its scroll restoration must
/// not be applied.
#[derive(Debug, Default)]
pub struct ReloadCoalescer {
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket(u64);

impl ReloadCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> ReloadTicket {
        self.generation += 1;
        ReloadTicket(self.generation)
    }

    pub fn is_current(&self, ticket: ReloadTicket) -> bool {
        ticket.0 == self.generation
    }
}
