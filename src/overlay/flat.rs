//! Flat (2D) overlay.
//!
//! Every render starts from a fully cleared surface, so boxes from a previous
//! tick can never persist.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgba, RgbaImage};

use crate::detect::{Detection, PixelBox};
use crate::frame::FrameDescriptor;

/// Horizontal inset of a label from its box edge.
const LABEL_INSET_X: f32 = 6.0;
/// Labels sit this far above the box unless that would leave the surface.
const LABEL_LIFT_Y: f32 = 5.0;
const LABEL_MIN_Y: f32 = 10.0;

/// 2D painting primitives the flat overlay needs.
pub trait Canvas: Send + 'static {
    fn size(&self) -> FrameDescriptor;
    /// Resize the surface. Content is discarded.
    fn resize(&mut self, size: FrameDescriptor);
    fn clear(&mut self);
    fn stroke_rect(&mut self, rect: PixelBox, color: Rgba<u8>, line_width: u32);
    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatStyle {
    pub stroke: Rgba<u8>,
    pub line_width: u32,
    pub label_color: Rgba<u8>,
}

impl Default for FlatStyle {
    fn default() -> Self {
        Self {
            stroke: Rgba([0x00, 0xff, 0x99, 0xff]),
            line_width: 3,
            label_color: Rgba([0x00, 0xff, 0xcc, 0xff]),
        }
    }
}

/// Parse `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>> {
    let hex = value
        .strip_prefix('#')
        .ok_or_else(|| anyhow!("color {:?} must start with '#'", value))?;
    if hex.len() != 6 && hex.len() != 8 {
        return Err(anyhow!("color {:?} must be #rrggbb or #rrggbbaa", value));
    }
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or_else(|| anyhow!("invalid hex digits in color {:?}", value))
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 0xff };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

/// Text placed on the surface. Glyph rasterization is left to the host.
#[derive(Clone, Debug, PartialEq)]
pub struct TextMark {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub color: Rgba<u8>,
}

/// In-memory RGBA surface.
pub struct RasterCanvas {
    image: RgbaImage,
    rects: Vec<PixelBox>,
    text: Vec<TextMark>,
}

impl RasterCanvas {
    pub fn new() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            rects: Vec::new(),
            text: Vec::new(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Rectangles stroked since the last clear.
    pub fn rects(&self) -> &[PixelBox] {
        &self.rects
    }

    /// Text placed since the last clear.
    pub fn text(&self) -> &[TextMark] {
        &self.text
    }

    /// Count of non-transparent pixels.
    pub fn painted_pixels(&self) -> usize {
        self.image.pixels().filter(|p| p.0[3] != 0).count()
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .with_context(|| format!("failed to write overlay to {}", path.display()))
    }

    fn paint_border(&mut self, bbox_px: [u32; 4], color: Rgba<u8>, thickness: u32) {
        let (w, h) = self.image.dimensions();
        let [x0, y0, x1, y1] = bbox_px;
        // Each ring is inset by one pixel, so once a ring is empty all later ones are too.
        for t in 0..thickness {
            let xx0 = x0.saturating_add(t);
            let yy0 = y0.saturating_add(t);
            let xx1 = x1.saturating_sub(t);
            let yy1 = y1.saturating_sub(t);
            if xx0 >= w || yy0 >= h || xx1 >= w || yy1 >= h || xx0 > xx1 || yy0 > yy1 {
                break;
            }
            for x in xx0..=xx1 {
                self.image.put_pixel(x, yy0, color);
                self.image.put_pixel(x, yy1, color);
            }
            for y in yy0..=yy1 {
                self.image.put_pixel(xx0, y, color);
                self.image.put_pixel(xx1, y, color);
            }
        }
    }
}

impl Default for RasterCanvas {
    fn default() -> Self {
        Self::new()
    }
}

/// Clip a float box to inclusive pixel corners inside a `w×h` surface.
fn clip_to_surface(rect: PixelBox, w: u32, h: u32) -> Option<[u32; 4]> {
    if w == 0 || h == 0 || rect.w <= 0.0 || rect.h <= 0.0 {
        return None;
    }
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    let x0 = rect.x.round();
    let y0 = rect.y.round();
    let x1 = (rect.x + rect.w).round() - 1.0;
    let y1 = (rect.y + rect.h).round() - 1.0;
    if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
        return None;
    }
    Some([
        x0.clamp(0.0, max_x) as u32,
        y0.clamp(0.0, max_y) as u32,
        x1.clamp(0.0, max_x) as u32,
        y1.clamp(0.0, max_y) as u32,
    ])
}

impl Canvas for RasterCanvas {
    fn size(&self) -> FrameDescriptor {
        let (w, h) = self.image.dimensions();
        FrameDescriptor::new(w, h)
    }

    fn resize(&mut self, size: FrameDescriptor) {
        self.image = RgbaImage::new(size.width, size.height);
        self.rects.clear();
        self.text.clear();
    }

    fn clear(&mut self) {
        for p in self.image.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
        self.rects.clear();
        self.text.clear();
    }

    fn stroke_rect(&mut self, rect: PixelBox, color: Rgba<u8>, line_width: u32) {
        self.rects.push(rect);
        let (w, h) = self.image.dimensions();
        if let Some(px) = clip_to_surface(rect, w, h) {
            self.paint_border(px, color, line_width.max(1));
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, color: Rgba<u8>) {
        self.text.push(TextMark {
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}

/// The flat annotation layer.
pub struct FlatOverlay<C: Canvas> {
    canvas: C,
    style: FlatStyle,
    renders: u64,
}

impl<C: Canvas> FlatOverlay<C> {
    pub fn new(canvas: C, style: FlatStyle) -> Self {
        Self {
            canvas,
            style,
            renders: 0,
        }
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn into_canvas(self) -> C {
        self.canvas
    }

    pub fn renders(&self) -> u64 {
        self.renders
    }

    /// Resize the surface when the frame size changed. Returns true on resize.
    pub fn resize_if_changed(&mut self, size: FrameDescriptor) -> bool {
        if self.canvas.size() == size {
            return false;
        }
        log::debug!(
            "flat overlay resized to {}x{}",
            size.width,
            size.height
        );
        self.canvas.resize(size);
        true
    }

    /// Paint one tick's detections. An empty slice leaves a cleared surface.
    pub fn render(&mut self, detections: &[Detection], surface: FrameDescriptor) {
        self.resize_if_changed(surface);
        self.canvas.clear();
        for d in detections {
            let b = d.bbox;
            self.canvas
                .stroke_rect(b, self.style.stroke, self.style.line_width);
            let label_y = if b.y > LABEL_MIN_Y {
                b.y - LABEL_LIFT_Y
            } else {
                LABEL_MIN_Y
            };
            self.canvas.fill_text(
                &d.caption(),
                b.x + LABEL_INSET_X,
                label_y,
                self.style.label_color,
            );
        }
        self.renders += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Detection {
        Detection::new(PixelBox::new(100.0, 50.0, 200.0, 150.0), "person", 0.87)
    }

    #[test]
    fn render_draws_one_box_per_detection() {
        let mut flat = FlatOverlay::new(RasterCanvas::new(), FlatStyle::default());
        let surface = FrameDescriptor::new(800, 600);
        let dog = Detection::new(PixelBox::new(5.0, 5.0, 40.0, 30.0), "dog", 0.51);
        flat.render(&[person(), dog], surface);

        let canvas = flat.canvas();
        assert_eq!(canvas.size(), surface);
        assert_eq!(canvas.rects().len(), 2);
        assert_eq!(canvas.rects()[0], PixelBox::new(100.0, 50.0, 200.0, 150.0));
        assert_eq!(canvas.text()[0].text, "person 87%");
        assert_eq!((canvas.text()[0].x, canvas.text()[0].y), (106.0, 45.0));
        // label for a box hugging the top edge is pinned
        assert_eq!(canvas.text()[1].y, 10.0);
        assert_eq!(canvas.image().get_pixel(100, 50), &FlatStyle::default().stroke);
        assert_eq!(canvas.image().get_pixel(299, 199), &FlatStyle::default().stroke);
    }

    #[test]
    fn empty_render_clears_previous_boxes() {
        let mut flat = FlatOverlay::new(RasterCanvas::new(), FlatStyle::default());
        let surface = FrameDescriptor::new(320, 240);
        flat.render(&[person()], surface);
        assert!(flat.canvas().painted_pixels() > 0);

        flat.render(&[], surface);
        assert_eq!(flat.canvas().painted_pixels(), 0);
        assert!(flat.canvas().rects().is_empty());
        assert!(flat.canvas().text().is_empty());

        // idempotent
        flat.render(&[], surface);
        assert_eq!(flat.canvas().painted_pixels(), 0);
    }

    #[test]
    fn surface_follows_frame_size() {
        let mut flat = FlatOverlay::new(RasterCanvas::new(), FlatStyle::default());
        assert!(flat.resize_if_changed(FrameDescriptor::new(64, 48)));
        assert!(!flat.resize_if_changed(FrameDescriptor::new(64, 48)));
        flat.render(&[], FrameDescriptor::new(48, 64));
        assert_eq!(flat.canvas().size(), FrameDescriptor::new(48, 64));
    }

    #[test]
    fn oversized_line_width_fills_the_box_and_stops() {
        let style = FlatStyle {
            line_width: u32::MAX,
            ..FlatStyle::default()
        };
        let mut flat = FlatOverlay::new(RasterCanvas::new(), style);
        let boxed = Detection::new(PixelBox::new(10.0, 10.0, 20.0, 20.0), "cup", 0.9);
        flat.render(&[boxed], FrameDescriptor::new(64, 48));

        assert_eq!(flat.canvas().painted_pixels(), 20 * 20);
        assert_eq!(flat.canvas().image().get_pixel(19, 19), &style.stroke);
        assert_eq!(flat.canvas().image().get_pixel(30, 30).0[3], 0);
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(parse_hex_color("#00ff99").unwrap(), Rgba([0, 255, 153, 255]));
        assert_eq!(parse_hex_color("#00ff9980").unwrap(), Rgba([0, 255, 153, 128]));
        assert!(parse_hex_color("00ff99").is_err());
        assert!(parse_hex_color("#zzzzzz").is_err());
    }
}
