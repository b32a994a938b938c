//! Video frame types and processing

use crate::CameraError;
use image::RgbImage;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the unix epoch)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u64,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ns: u64,
        sequence: u64,
    ) -> Result<Self, CameraError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(CameraError::InvalidFrame(format!(
                "expected {} bytes for {}x{} RGB, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        })
    }

    /// Frame of a single colour, mostly useful for tests and dry runs
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();

        Self {
            data,
            width,
            height,
            timestamp_ns: now_ns(),
            sequence: 0,
        }
    }

    /// Wrap a decoded image
    pub fn from_rgb_image(image: RgbImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ns: now_ns(),
            sequence,
        }
    }

    /// Borrow the pixels as an `image` buffer
    pub fn to_rgb_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| CameraError::InvalidFrame("buffer does not match dimensions".into()))
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize)
            .checked_mul(self.width as usize)?
            .checked_add(x as usize)?
            .checked_mul(3)?;
        match self.data.get(idx..idx.checked_add(3)?)? {
            [r, g, b] => Some([*r, *g, *b]),
            _ => None,
        }
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> Vec<u8> {
        self.data
            .chunks_exact(3)
            .map(|p| luma(p[0], p[1], p[2]))
            .collect()
    }

    /// Average luminance in 0..=255
    pub fn mean_luminance(&self) -> f32 {
        let gray = self.to_grayscale();
        if gray.is_empty() {
            return 0.0;
        }
        gray.iter().map(|&v| v as f32).sum::<f32>() / gray.len() as f32
    }
}

/// Luminance formula: 0.299*R + 0.587*G + 0.114*B
fn luma(r: u8, g: u8, b: u8) -> u8 {
    (r as f32 * 0.299 + g as f32 * 0.587 + b as f32 * 0.114) as u8
}

pub(crate) fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
