//! Compositing pipelines.
//!
//! Two independent output paths share the overlay model but never a
//! coordinate space. Persistence inverts anchored screen geometry into the
//! document's point space and hands it to the engine's insertion calls.
//! Printing composites overlays in screen space directly onto the currently
//! rendered rasters, then scales each composite to the device page.

use crate::overlay::{Overlay, OverlayId, OverlayPayload, PixelSize, TEXT_PADDING_PX};
use crate::session::{DocumentSession, SessionBusy, SessionOperation};
use crate::transform;
use image::imageops::{self, FilterType};
use image::Rgba;
use inkmark_engine::{
    BuiltinFont, DocumentEngine, DocumentHandle, EngineError, OpenSource, RgbaImage,
    SerializeOptions, TextStyle,
};
use rusttype::{point, Font, Scale};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

/// Translucent white fill behind printed text labels.
pub const TEXT_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 200]);

/// Printed text ink.
pub const TEXT_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Busy(#[from] SessionBusy),
    #[error("source document open failed: {0}")]
    Open(#[source] EngineError),
    #[error("output serialization failed: {0}")]
    Serialize(#[source] EngineError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-overlay outcome of a persist run. A skipped overlay never aborts the
/// save; it is reported here and logged.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub applied: usize,
    pub skipped: Vec<(OverlayId, String)>,
}

/// Write the session's overlays into a copy of the source document.
///
/// With no overlays the source bytes are copied verbatim. Otherwise every
/// overlay is inverted into point space and inserted on a fresh handle;
/// failures are collected per overlay. The staged overlays are cleared only
/// after the output is confirmed on disk, so a failed save can be retried.
pub fn persist(
    session: &mut DocumentSession,
    engine: &mut dyn DocumentEngine,
    output_path: &Path,
) -> Result<PersistReport, PersistError> {
    let _guard = session.begin_operation(SessionOperation::Persist)?;

    if session.overlays().is_empty() {
        fs::copy(session.path(), output_path)?;
        return Ok(PersistReport::default());
    }

    let handle = engine
        .open(OpenSource::from(session.path()))
        .map_err(PersistError::Open)?;
    let base = session.viewport().base_multiplier;

    // Scoped temp assets live until the end of the call, success or not.
    let mut temp_assets: Vec<TempPath> = Vec::new();
    let mut report = PersistReport::default();

    for overlay in session.overlays().iter() {
        match apply_overlay(engine, handle, overlay, base, &mut temp_assets) {
            Ok(()) => report.applied += 1,
            Err(err) => {
                log::warn!("overlay {} skipped during save: {err}", overlay.id());
                report.skipped.push((overlay.id(), err.to_string()));
            }
        }
    }

    let serialized = engine.serialize(handle, output_path, SerializeOptions::default());
    let _ = engine.close(handle);
    serialized.map_err(PersistError::Serialize)?;

    session.clear_staged();
    Ok(report)
}

fn apply_overlay(
    engine: &mut dyn DocumentEngine,
    handle: DocumentHandle,
    overlay: &Overlay,
    base_multiplier: f32,
    temp_assets: &mut Vec<TempPath>,
) -> Result<(), EngineError> {
    match overlay.payload() {
        OverlayPayload::Signature(asset) => {
            let rect = transform::output_rect(overlay, base_multiplier);

            // Materialize the alpha-preserving asset to a scoped temp file.
            let mut file = tempfile::Builder::new()
                .prefix("inkmark-sig-")
                .suffix(".png")
                .tempfile()?;
            file.write_all(&encode_png(asset.pixels())?)?;
            file.flush()?;
            let temp_path = file.into_temp_path();

            let bytes = fs::read(&temp_path)?;
            let result = match engine.insert_image(
                handle,
                overlay.page_index(),
                rect,
                &bytes,
                true,
            ) {
                Ok(()) => Ok(()),
                Err(first) => {
                    // Fallback: rasterize the temp asset and insert the
                    // pixmap with alpha retained.
                    log::warn!("direct image insert failed, retrying via pixmap: {first}");
                    let pixmap = image::open(&temp_path)
                        .map_err(|err| EngineError::Backend(format!("pixmap decode: {err}")))?
                        .to_rgba8();
                    engine.insert_image(
                        handle,
                        overlay.page_index(),
                        rect,
                        &encode_png(&pixmap)?,
                        true,
                    )
                }
            };

            temp_assets.push(temp_path);
            result
        }
        OverlayPayload::Text(text) => {
            let Some((baseline, font_size)) = transform::text_output(overlay, base_multiplier)
            else {
                return Err(EngineError::Backend("text payload expected".to_owned()));
            };
            let style = TextStyle {
                font_size,
                color: [0.0, 0.0, 0.0],
                font: BuiltinFont::Helvetica,
            };
            engine.insert_text(handle, overlay.page_index(), baseline, &text.content, &style)
        }
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, EngineError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|err| EngineError::Backend(format!("png encode: {err}")))?;
    Ok(bytes)
}

#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error(transparent)]
    Busy(#[from] SessionBusy),
    #[error("a TTF font is required to print text overlays")]
    FontUnavailable,
}

/// Composite every page with its overlays and fit it onto a device page.
///
/// Overlays are drawn at their screen-space coordinates — the composite
/// target is the raster they are already expressed in — then the whole page
/// is uniformly scaled to fit `device`, centered on white. Pages come back
/// in index order, one image per physical page.
pub fn print_pages(
    session: &DocumentSession,
    device: PixelSize,
    font: Option<&Font<'_>>,
) -> Result<Vec<RgbaImage>, PrintError> {
    let _guard = session.begin_operation(SessionOperation::Print)?;

    let needs_font = session
        .overlays()
        .iter()
        .any(|overlay| matches!(overlay.payload(), OverlayPayload::Text(_)));
    if needs_font && font.is_none() {
        return Err(PrintError::FontUnavailable);
    }

    let mut output = Vec::with_capacity(session.page_count() as usize);
    for page_index in 0..session.page_count() {
        let Some(base) = session.page_raster(page_index) else {
            continue;
        };

        let mut composite =
            RgbaImage::from_pixel(base.width(), base.height(), Rgba([0, 0, 0, 0]));
        imageops::overlay(&mut composite, base, 0, 0);

        for overlay in session.overlays().for_page(page_index) {
            let position = overlay.screen_position();
            match overlay.payload() {
                OverlayPayload::Signature(asset) => {
                    let pixmap = asset.scaled_for_zoom(overlay.anchor_zoom());
                    imageops::overlay(
                        &mut composite,
                        &pixmap,
                        i64::from(position.x),
                        i64::from(position.y),
                    );
                }
                OverlayPayload::Text(text) => {
                    let size = overlay.screen_size();
                    fill_rect(&mut composite, position.x, position.y, size, TEXT_BACKGROUND);

                    if let Some(font) = font {
                        let anchor = overlay.anchor_zoom();
                        let pad = TEXT_PADDING_PX * anchor;
                        draw_glyph_run(
                            &mut composite,
                            &text.content,
                            font,
                            text.font_size * anchor,
                            (position.x as f32 + pad, position.y as f32 + pad),
                            TEXT_COLOR,
                        );
                    }
                }
            }
        }

        output.push(fit_to_device(&composite, device));
    }

    Ok(output)
}

/// Uniformly scale a composite to fit the device page, centered on white.
fn fit_to_device(composite: &RgbaImage, device: PixelSize) -> RgbaImage {
    let scale = (device.width as f32 / composite.width() as f32)
        .min(device.height as f32 / composite.height() as f32);
    let target_w = ((composite.width() as f32 * scale).round() as u32).max(1);
    let target_h = ((composite.height() as f32 * scale).round() as u32).max(1);

    let scaled = if (target_w, target_h) == composite.dimensions() {
        composite.clone()
    } else {
        imageops::resize(composite, target_w, target_h, FilterType::CatmullRom)
    };

    let mut page = RgbaImage::from_pixel(device.width, device.height, Rgba([255, 255, 255, 255]));
    imageops::overlay(
        &mut page,
        &scaled,
        i64::from((device.width - target_w) / 2),
        i64::from((device.height - target_h) / 2),
    );
    page
}

fn fill_rect(canvas: &mut RgbaImage, x: i32, y: i32, size: PixelSize, color: Rgba<u8>) {
    let x0 = x.max(0) as u32;
    let y0 = y.max(0) as u32;
    let x1 = (x + size.width as i32).clamp(0, canvas.width() as i32) as u32;
    let y1 = (y + size.height as i32).clamp(0, canvas.height() as i32) as u32;

    for py in y0..y1 {
        for px in x0..x1 {
            crate::signature::blend_over(canvas.get_pixel_mut(px, py), color, 1.0);
        }
    }
}

/// Rasterize one glyph run onto the composite.
fn draw_glyph_run(
    canvas: &mut RgbaImage,
    text: &str,
    font: &Font<'_>,
    px_size: f32,
    origin: (f32, f32),
    color: Rgba<u8>,
) {
    let scale = Scale::uniform(px_size);
    let v_metrics = font.v_metrics(scale);
    let start = point(origin.0, origin.1 + v_metrics.ascent);

    for glyph in font.layout(text, scale, start) {
        let Some(bounding_box) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = bounding_box.min.x + gx as i32;
            let py = bounding_box.min.y + gy as i32;
            if px >= 0 && py >= 0 && (px as u32) < canvas.width() && (py as u32) < canvas.height()
            {
                crate::signature::blend_over(
                    canvas.get_pixel_mut(px as u32, py as u32),
                    color,
                    coverage,
                );
            }
        });
    }
}
