//! Freehand signature capture.
//!
//! Strokes land on a fully transparent RGBA canvas as anti-aliased line
//! segments between consecutive pointer samples. Accepting the pad exports
//! the canvas as an immutable [`SignatureAsset`]; accepting an empty pad is
//! rejected. Foreign framebuffers are imported honoring their row stride and
//! normalizing BGRA channel order.

use crate::overlay::SignatureAsset;
use image::Rgba;
use inkmark_engine::RgbaImage;

pub const PAD_WIDTH: u32 = 380;
pub const PAD_HEIGHT: u32 = 200;

/// Ink color: dark blue, fully opaque.
pub const STROKE_COLOR: Rgba<u8> = Rgba([0, 0, 100, 255]);

/// Stroke width in canvas pixels.
pub const STROKE_WIDTH: f32 = 2.5;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("signature has no strokes")]
    NoContent,
    #[error("buffer of {actual} bytes too small for {expected}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("row stride {stride} smaller than row size {row}")]
    InvalidStride { stride: usize, row: usize },
}

/// Channel layout of an imported framebuffer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
}

/// Transparent drawing surface for freehand signature input.
pub struct SignaturePad {
    canvas: RgbaImage,
    last_point: Option<(f32, f32)>,
    has_content: bool,
}

impl SignaturePad {
    pub fn new() -> Self {
        Self::with_size(PAD_WIDTH, PAD_HEIGHT)
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])),
            last_point: None,
            has_content: false,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    /// Pointer down: start a stroke and mark the pad non-empty.
    pub fn begin_stroke(&mut self, x: f32, y: f32) {
        self.has_content = true;
        draw_segment(&mut self.canvas, (x, y), (x, y));
        self.last_point = Some((x, y));
    }

    /// Pointer move while active: connect the previous sample to this one.
    pub fn stroke_to(&mut self, x: f32, y: f32) {
        let Some(last) = self.last_point else {
            return;
        };
        draw_segment(&mut self.canvas, last, (x, y));
        self.last_point = Some((x, y));
    }

    /// Pointer up.
    pub fn end_stroke(&mut self) {
        self.last_point = None;
    }

    /// Wipe the canvas back to fully transparent.
    pub fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
        self.last_point = None;
        self.has_content = false;
    }

    /// Export the drawn signature; rejected when nothing was drawn.
    pub fn accept(self) -> Result<SignatureAsset, CaptureError> {
        if !self.has_content {
            return Err(CaptureError::NoContent);
        }
        Ok(SignatureAsset::new(self.canvas))
    }
}

impl Default for SignaturePad {
    fn default() -> Self {
        Self::new()
    }
}

/// Draw one anti-aliased round-capped segment with the fixed pen.
fn draw_segment(canvas: &mut RgbaImage, from: (f32, f32), to: (f32, f32)) {
    let half = STROKE_WIDTH / 2.0;
    let reach = half + 1.0;

    let min_x = (from.0.min(to.0) - reach).floor().max(0.0) as u32;
    let max_x = (from.0.max(to.0) + reach).ceil().min(canvas.width() as f32 - 1.0) as u32;
    let min_y = (from.1.min(to.1) - reach).floor().max(0.0) as u32;
    let max_y = (from.1.max(to.1) + reach).ceil().min(canvas.height() as f32 - 1.0) as u32;
    if min_x > max_x || min_y > max_y {
        return;
    }

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let distance = segment_distance((x as f32, y as f32), from, to);
            let coverage = (half + 0.5 - distance).clamp(0.0, 1.0);
            if coverage > 0.0 {
                blend_over(canvas.get_pixel_mut(x, y), STROKE_COLOR, coverage);
            }
        }
    }
}

fn segment_distance(point: (f32, f32), from: (f32, f32), to: (f32, f32)) -> f32 {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let length_sq = dx * dx + dy * dy;

    let (cx, cy) = if length_sq < 1e-6 {
        from
    } else {
        let t = (((point.0 - from.0) * dx + (point.1 - from.1) * dy) / length_sq).clamp(0.0, 1.0);
        (from.0 + t * dx, from.1 + t * dy)
    };

    let ex = point.0 - cx;
    let ey = point.1 - cy;
    (ex * ex + ey * ey).sqrt()
}

/// Source-over blend of `ink` at `coverage` onto `dst`.
pub(crate) fn blend_over(dst: &mut Rgba<u8>, ink: Rgba<u8>, coverage: f32) {
    let src_a = f32::from(ink[3]) / 255.0 * coverage;
    let dst_a = f32::from(dst[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }

    for channel in 0..3 {
        let src = f32::from(ink[channel]) / 255.0;
        let old = f32::from(dst[channel]) / 255.0;
        let out = (src * src_a + old * dst_a * (1.0 - src_a)) / out_a;
        dst[channel] = (out * 255.0).round() as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

/// Normalize a raw framebuffer into a tightly packed RGBA image.
///
/// `stride` is the distance in bytes between row starts; padding bytes past
/// `width * 4` are skipped, never interpreted. BGRA input has its red and
/// blue channels swapped into place.
pub fn rgba_from_raw(
    buffer: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    order: ChannelOrder,
) -> Result<RgbaImage, CaptureError> {
    let row = width as usize * 4;
    if stride < row {
        return Err(CaptureError::InvalidStride { stride, row });
    }

    let expected = if height == 0 { 0 } else { stride * (height as usize - 1) + row };
    if buffer.len() < expected {
        return Err(CaptureError::BufferTooSmall { expected, actual: buffer.len() });
    }

    let mut out = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let line = &buffer[start..start + row];
        match order {
            ChannelOrder::Rgba => out.extend_from_slice(line),
            ChannelOrder::Bgra => {
                for pixel in line.chunks_exact(4) {
                    out.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
                }
            }
        }
    }

    RgbaImage::from_raw(width, height, out)
        .ok_or(CaptureError::BufferTooSmall { expected, actual: buffer.len() })
}

/// Import a foreign framebuffer directly as a signature asset.
pub fn asset_from_raw(
    buffer: &[u8],
    width: u32,
    height: u32,
    stride: usize,
    order: ChannelOrder,
) -> Result<SignatureAsset, CaptureError> {
    Ok(SignatureAsset::new(rgba_from_raw(buffer, width, height, stride, order)?))
}
