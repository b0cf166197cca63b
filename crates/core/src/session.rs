//! Document session: the single owner of everything a loaded document
//! accumulates — viewport state, current page rasters, placed overlays,
//! placement mode and the merged-output temp file.
//!
//! All mutation goes through session methods; no consumer holds a direct
//! mutable reference into the overlay collection. Long operations (reload,
//! persist, merge adoption, print) hold the session's exclusive token.

use crate::merge::MergeOutcome;
use crate::overlay::{
    OverlayCollection, OverlayId, PixelPoint, PixelSize, SignatureAsset, DEFAULT_TEXT_FONT_SIZE,
};
use crate::transform;
use crate::viewport::{ReloadCoalescer, ReloadPlan, ViewportState, ZoomController};
use inkmark_engine::{DocumentEngine, EngineError, OpenSource, RgbaImage};
use std::cell::Cell;
use std::mem;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempPath;

/// Operations that require the session's exclusive token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOperation {
    Reload,
    Persist,
    Merge,
    Print,
}

#[derive(Debug, thiserror::Error)]
#[error("session is busy with a {0:?} operation")]
pub struct SessionBusy(pub SessionOperation);

/// Session-level exclusive token. No two of reload, persist, merge or print
/// may overlap on the same session.
#[derive(Debug, Clone, Default)]
pub struct OperationLock {
    active: Rc<Cell<Option<SessionOperation>>>,
}

impl OperationLock {
    pub fn acquire(&self, operation: SessionOperation) -> Result<OperationGuard, SessionBusy> {
        if let Some(active) = self.active.get() {
            return Err(SessionBusy(active));
        }
        self.active.set(Some(operation));
        Ok(OperationGuard { slot: Rc::clone(&self.active) })
    }

    pub fn is_locked(&self) -> bool {
        self.active.get().is_some()
    }
}

/// Releases the token on drop, on every exit path.
#[derive(Debug)]
pub struct OperationGuard {
    slot: Rc<Cell<Option<SessionOperation>>>,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.slot.set(None);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Busy(#[from] SessionBusy),
}

/// Current placement mode, consumed and reset atomically by [`DocumentSession::place`].
#[derive(Default)]
pub enum PlacementMode {
    #[default]
    None,
    PlacingSignature(SignatureAsset),
    PlacingText,
}

impl PlacementMode {
    pub fn is_none(&self) -> bool {
        matches!(self, PlacementMode::None)
    }
}

pub struct DocumentSession {
    path: PathBuf,
    zoom: ZoomController,
    pages: Vec<RgbaImage>,
    overlays: OverlayCollection,
    placement: PlacementMode,
    modified: bool,
    lock: OperationLock,
    reloads: ReloadCoalescer,
    /// Merged output adopted from [`crate::merge::merge`]; deleted when
    /// superseded or when the session is dropped.
    merged_output: Option<TempPath>,
}

impl DocumentSession {
    /// Open a document with the default viewport.
    pub fn open(
        engine: &mut dyn DocumentEngine,
        path: impl Into<PathBuf>,
    ) -> Result<Self, SessionError> {
        Self::with_viewport(engine, path, ViewportState::default())
    }

    /// Open a document with a caller-provided viewport (base multiplier,
    /// zoom, window size).
    pub fn with_viewport(
        engine: &mut dyn DocumentEngine,
        path: impl Into<PathBuf>,
        viewport: ViewportState,
    ) -> Result<Self, SessionError> {
        let mut session = Self {
            path: path.into(),
            zoom: ZoomController::new(viewport),
            pages: Vec::new(),
            overlays: OverlayCollection::new(),
            placement: PlacementMode::None,
            modified: false,
            lock: OperationLock::default(),
            reloads: ReloadCoalescer::new(),
            merged_output: None,
        };
        session.refresh_rasters(engine)?;
        Ok(session)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn viewport(&self) -> &ViewportState {
        self.zoom.state()
    }

    pub fn current_zoom(&self) -> f32 {
        self.zoom.state().zoom
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    pub fn page_raster(&self, page_index: u32) -> Option<&RgbaImage> {
        self.pages.get(page_index as usize)
    }

    pub fn overlays(&self) -> &OverlayCollection {
        &self.overlays
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn placement(&self) -> &PlacementMode {
        &self.placement
    }

    /// Register a zoom observer (e.g. a percentage readout).
    pub fn subscribe_zoom(&mut self, observer: impl FnMut(f32) + 'static) {
        self.zoom.subscribe(observer);
    }

    pub(crate) fn begin_operation(
        &self,
        operation: SessionOperation,
    ) -> Result<OperationGuard, SessionBusy> {
        self.lock.acquire(operation)
    }

    pub fn is_busy(&self) -> bool {
        self.lock.is_locked()
    }

    // --- placement -------------------------------------------------------

    pub fn begin_signature_placement(&mut self, asset: SignatureAsset) {
        self.placement = PlacementMode::PlacingSignature(asset);
    }

    pub fn begin_text_placement(&mut self) {
        self.placement = PlacementMode::PlacingText;
    }

    pub fn cancel_placement(&mut self) {
        self.placement = PlacementMode::None;
    }

    /// Handle a placement click. The active mode is consumed and reset
    /// before anything else happens, so a cancelled text prompt still leaves
    /// the session out of placement mode. Signatures are centered on the
    /// click; text anchors its top-left corner there.
    pub fn place(
        &mut self,
        page_index: u32,
        position: PixelPoint,
        text: Option<String>,
    ) -> Option<OverlayId> {
        self.place_with_font_size(page_index, position, text, DEFAULT_TEXT_FONT_SIZE)
    }

    /// Placement click with an explicit authored font size for text.
    pub fn place_with_font_size(
        &mut self,
        page_index: u32,
        position: PixelPoint,
        text: Option<String>,
        font_size: f32,
    ) -> Option<OverlayId> {
        let mode = mem::take(&mut self.placement);
        let zoom = self.current_zoom();

        if page_index as usize >= self.pages.len() {
            return None;
        }

        match mode {
            PlacementMode::None => None,
            PlacementMode::PlacingSignature(asset) => {
                let id = self.overlays.place_signature(page_index, position, asset, zoom);
                self.modified = true;
                Some(id)
            }
            PlacementMode::PlacingText => {
                let content = text?;
                let id =
                    self.overlays.place_text(page_index, position, content, font_size, zoom);
                self.modified = true;
                Some(id)
            }
        }
    }

    /// Drag an overlay to a new position, clamped inside its page raster.
    pub fn move_overlay(&mut self, id: OverlayId, target: PixelPoint) -> bool {
        let Some(overlay) = self.overlays.get(id) else {
            return false;
        };
        let Some(raster) = self.pages.get(overlay.page_index() as usize) else {
            return false;
        };
        let bounds = PixelSize::new(raster.width(), raster.height());

        let moved = self.overlays.move_to(id, target, bounds);
        if moved {
            self.modified = true;
        }
        moved
    }

    pub fn edit_text(&mut self, id: OverlayId, content: String) -> bool {
        let edited = self.overlays.edit_text(id, content);
        if edited {
            self.modified = true;
        }
        edited
    }

    pub fn replace_signature(&mut self, id: OverlayId, asset: SignatureAsset) -> bool {
        let replaced = self.overlays.replace_signature(id, asset);
        if replaced {
            self.modified = true;
        }
        replaced
    }

    pub fn delete_overlay(&mut self, id: OverlayId) -> bool {
        let deleted = self.overlays.delete(id);
        if deleted {
            self.modified = true;
        }
        deleted
    }

    // --- zoom / reload ---------------------------------------------------

    /// Multiply the zoom by `factor`; reload pages and re-anchor overlays if
    /// the clamped value changed. Returns whether a reload happened.
    pub fn set_zoom(
        &mut self,
        engine: &mut dyn DocumentEngine,
        factor: f32,
    ) -> Result<bool, SessionError> {
        let Some(plan) = self.zoom.set_zoom(factor) else {
            return Ok(false);
        };
        self.perform_reload(engine, plan)?;
        Ok(true)
    }

    /// Back to 100%.
    pub fn reset_zoom(&mut self, engine: &mut dyn DocumentEngine) -> Result<bool, SessionError> {
        let Some(plan) = self.zoom.reset_zoom() else {
            return Ok(false);
        };
        self.perform_reload(engine, plan)?;
        Ok(true)
    }

    fn perform_reload(
        &mut self,
        engine: &mut dyn DocumentEngine,
        plan: ReloadPlan,
    ) -> Result<(), SessionError> {
        let _guard = self.begin_operation(SessionOperation::Reload)?;
        let ticket = self.reloads.begin();

        let page_count = self.refresh_rasters(engine)?;
        transform::reproject_all(&mut self.overlays, plan.new_zoom, page_count);

        if self.reloads.is_current(ticket) {
            self.zoom.state_mut().scroll.restore_fraction(plan.scroll_fraction);
        } else {
            log::debug!("scroll restore skipped: reload superseded");
        }
        Ok(())
    }

    /// Swap in a different document. Without `preserve_overlays` the overlay
    /// collection is destroyed; with it, overlays are re-anchored and those
    /// on pages that no longer exist are dropped.
    pub fn replace_document(
        &mut self,
        engine: &mut dyn DocumentEngine,
        path: impl Into<PathBuf>,
        preserve_overlays: bool,
    ) -> Result<(), SessionError> {
        let _guard = self.begin_operation(SessionOperation::Reload)?;
        self.path = path.into();

        if !preserve_overlays {
            self.overlays.clear();
            self.modified = false;
        }

        let page_count = self.refresh_rasters(engine)?;
        if preserve_overlays {
            let zoom = self.current_zoom();
            transform::reproject_all(&mut self.overlays, zoom, page_count);
        }
        Ok(())
    }

    /// Re-rasterize every page at the current effective resolution and
    /// recompute the scroll ranges. Returns the page count.
    fn refresh_rasters(&mut self, engine: &mut dyn DocumentEngine) -> Result<u32, EngineError> {
        let handle = engine.open(OpenSource::from(self.path.as_path()))?;
        let page_count = match engine.page_count(handle) {
            Ok(count) => count,
            Err(err) => {
                let _ = engine.close(handle);
                return Err(err);
            }
        };

        let resolution = self.zoom.state().effective_resolution();
        let mut pages = Vec::with_capacity(page_count as usize);
        let mut failure = None;
        for index in 0..page_count {
            match engine.rasterize(handle, index, resolution) {
                Ok(raster) => pages.push(raster),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        let _ = engine.close(handle);
        if let Some(err) = failure {
            return Err(err);
        }

        self.pages = pages;
        let sizes: Vec<PixelSize> = self
            .pages
            .iter()
            .map(|raster| PixelSize::new(raster.width(), raster.height()))
            .collect();
        self.zoom.state_mut().update_scroll_range(&sizes);
        Ok(page_count)
    }

    // --- merge adoption / persistence hooks ------------------------------

    /// Take ownership of a merge result. The previous merged output, if any,
    /// is superseded and deleted. Returns the merged document's path.
    pub fn adopt_merged(&mut self, outcome: MergeOutcome) -> Result<PathBuf, SessionBusy> {
        let _guard = self.begin_operation(SessionOperation::Merge)?;
        let path = outcome.output.to_path_buf();
        self.merged_output = Some(outcome.output);
        Ok(path)
    }

    pub fn merged_output(&self) -> Option<&Path> {
        self.merged_output.as_deref()
    }

    /// Drop staged overlays after a confirmed successful persist.
    pub(crate) fn clear_staged(&mut self) {
        self.overlays.clear();
        self.modified = false;
    }
}
