//! inkmark core library
//!
//! Overlay model, zoom-invariant coordinate transforms and the dual-path
//! compositing pipeline for placing signatures and text annotations onto
//! document pages.

pub mod compose;
pub mod merge;
pub mod metrics;
pub mod overlay;
pub mod session;
pub mod signature;
pub mod transform;
pub mod viewport;

#[cfg(test)]
pub(crate) mod pdffix;

pub use compose::{persist, print_pages, PersistError, PersistReport, PrintError};
pub use merge::{merge, MergeError, MergeOutcome};
pub use overlay::{
    CanvasPoint, Overlay, OverlayCollection, OverlayId, OverlayKind, OverlayPayload, PixelPoint,
    PixelSize, SignatureAsset, TextPayload,
};
pub use session::{
    DocumentSession, OperationGuard, OperationLock, PlacementMode, SessionBusy, SessionError,
    SessionOperation,
};
pub use signature::{asset_from_raw, rgba_from_raw, CaptureError, ChannelOrder, SignaturePad};
pub use transform::{output_rect, reproject_all, text_output, ViewTransform};
pub use viewport::{
    ReloadCoalescer, ReloadPlan, ReloadTicket, ScrollState, ViewportState, ZoomController,
};
