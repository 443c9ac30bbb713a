//! Image decoding as an external capability: turns the bytes a client sends over the binary
//! camera channel into a grayscale buffer the vision tracker can run feature tracking on.

use std::fmt;

/// A decoded grayscale frame, row-major, one byte per pixel.
#[derive(Clone)]
pub struct GrayFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl fmt::Debug for GrayFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrayFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl GrayFrame {
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait ImageDecoder: Send + Sync {
    /// Decode `bytes` (whose MIME type the client reported in the frame's metadata message)
    /// into a grayscale frame, or `None` if the format or payload is unrecognized.
    fn decode_gray(&self, mime: &str, bytes: &[u8]) -> Option<GrayFrame>;
}

/// Default backend built on the `image` crate's JPEG/PNG decoders.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode_gray(&self, mime: &str, bytes: &[u8]) -> Option<GrayFrame> {
        let format = match mime {
            "image/jpeg" | "image/jpg" => image::ImageFormat::Jpeg,
            "image/png" => image::ImageFormat::Png,
            _ => image::guess_format(bytes).ok()?,
        };
        let img = image::load_from_memory_with_format(bytes, format).ok()?;
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();
        Some(GrayFrame { width, height, data: gray.into_raw() })
    }
}

/// Global histogram equalization, a cheap stand-in for tiled/adaptive CLAHE: boosts contrast
/// on dim or washed-out camera frames before feature detection runs on them.
pub fn equalize_contrast(frame: &GrayFrame) -> GrayFrame {
    let mut histogram = [0u32; 256];
    for &px in &frame.data {
        histogram[px as usize] += 1;
    }

    let total = frame.data.len() as u32;
    if total == 0 {
        return frame.clone();
    }

    let mut cdf = [0u32; 256];
    let mut running = 0u32;
    for (i, &count) in histogram.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = (total - cdf_min).max(1) as f64;

    let mut lut = [0u8; 256];
    for i in 0..256 {
        let scaled = ((cdf[i].saturating_sub(cdf_min)) as f64 / denom) * 255.0;
        lut[i] = scaled.round().clamp(0.0, 255.0) as u8;
    }

    let data = frame.data.iter().map(|&px| lut[px as usize]).collect();
    GrayFrame { width: frame.width, height: frame.height, data }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equalize_contrast_spreads_a_narrow_intensity_band() {
        let frame = GrayFrame { width: 2, height: 2, data: vec![100, 101, 102, 103] };
        let out = equalize_contrast(&frame);
        let min = *out.data.iter().min().unwrap();
        let max = *out.data.iter().max().unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 255);
    }

    #[test]
    fn equalize_contrast_handles_flat_frame() {
        let frame = GrayFrame { width: 2, height: 2, data: vec![128; 4] };
        let out = equalize_contrast(&frame);
        assert_eq!(out.data, vec![0, 0, 0, 0]);
    }

    #[test]
    fn unknown_mime_falls_back_to_format_sniffing() {
        let decoder = ImageCrateDecoder;
        assert!(decoder.decode_gray("application/octet-stream", b"not an image").is_none());
    }

    #[test]
    fn gray_frame_get_indexes_row_major() {
        let frame = GrayFrame { width: 2, height: 2, data: vec![1, 2, 3, 4] };
        assert_eq!(frame.get(1, 0), 2);
        assert_eq!(frame.get(0, 1), 3);
    }
}
