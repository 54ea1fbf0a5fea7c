//! Decoded frames and the image-evidence helpers built on them.
//!
//! - `Frame`: one decoded RGB frame handed to a camera pipeline.
//! - Crops for event evidence are padded by `CROP_PADDING_PX` and clipped to
//!   the frame; a crop that falls entirely outside the frame yields `None`.
//! - Evidence is stored and pushed as JPEG.

use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::geometry::BoundingBox;

/// Padding added on every side of a track box before cropping.
pub const CROP_PADDING_PX: i32 = 15;

/// JPEG quality used for stored crops and notification photos.
pub const JPEG_QUALITY: u8 = 85;

const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ANNOTATION_THICKNESS: i32 = 2;

pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Wrap a packed RGB8 buffer.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        let actual = pixels.len();
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "frame buffer size mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                actual
            )
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(0, 0, self.width() as i32, self.height() as i32)
    }

    /// Copy out `bbox` grown by `padding`, clipped to the frame.
    pub fn crop_padded(&self, bbox: &BoundingBox, padding: i32) -> Option<RgbImage> {
        let area = bbox.padded(padding).clamp_to(self.width(), self.height())?;
        let view = image::imageops::crop_imm(
            &self.image,
            area.x as u32,
            area.y as u32,
            area.width as u32,
            area.height as u32,
        );
        Some(view.to_image())
    }

    /// Full frame copy with `bbox` outlined, used as the notification photo.
    pub fn annotated(&self, bbox: &BoundingBox) -> RgbImage {
        let mut out = self.image.clone();
        draw_rect_outline(&mut out, bbox, ANNOTATION_COLOR, ANNOTATION_THICKNESS);
        out
    }
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    encoder
        .encode_image(image)
        .map_err(|e| anyhow!("jpeg encode failed: {}", e))?;
    Ok(bytes)
}

fn draw_rect_outline(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: i32) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && x < w && y < h {
            image.put_pixel(x as u32, y as u32, color);
        }
    };
    for t in 0..thickness {
        let top = bbox.y + t;
        let bottom = bbox.bottom() - 1 - t;
        for x in bbox.x..bbox.right() {
            put(x, top);
            put(x, bottom);
        }
        let left = bbox.x + t;
        let right = bbox.right() - 1 - t;
        for y in bbox.y..bbox.bottom() {
            put(left, y);
            put(right, y);
        }
    }
}
