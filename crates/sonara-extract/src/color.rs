//! Basic colour and edge statistics.
//!
//! The [`ColorExtractor`] decodes an image and summarises it as a fixed
//! 10-component vector, every component in `[0, 1]`:
//!
//! | Index | Feature |
//! |-------|---------|
//! | 0-2 | mean red, green, blue |
//! | 3 | mean luminance (`0.299 R + 0.587 G + 0.114 B`) |
//! | 4-6 | most vibrant colour (highest saturation among pixels with value > 0.5; black if none) |
//! | 7 | mean HSV saturation |
//! | 8 | mean HSV value |
//! | 9 | edge density (share of interior pixels whose Sobel magnitude exceeds a threshold) |

use image::{GrayImage, RgbImage};
use sonara_core::{Error, FeatureVector, Result};

use crate::extractor::{FeatureExtractor, WorkItem};

/// Length of the colour feature vector.
pub const COLOR_FEATURE_DIM: usize = 10;

/// Images larger than this on either side are downscaled first.
const MAX_SIDE: u32 = 256;

/// Normalised Sobel magnitude above which a pixel counts as an edge.
const EDGE_THRESHOLD: f32 = 0.25;

/// Minimum HSV value for a pixel to be considered for "most vibrant".
const VIBRANT_MIN_VALUE: f32 = 0.5;

/// Pixel-statistics extractor. Stateless apart from its name.
#[derive(Debug, Clone, Default)]
pub struct ColorExtractor;

impl ColorExtractor {
    /// Create the extractor.
    pub fn new() -> Self {
        Self
    }

    /// Compute the feature vector of an already decoded image.
    pub fn features(image: &RgbImage) -> Result<FeatureVector> {
        let pixel_count = image.width() as usize * image.height() as usize;
        if pixel_count == 0 {
            return Err(Error::invalid_data("image has no pixels"));
        }

        let mut sum = [0.0f64; 3];
        let mut luminance = 0.0f64;
        let mut saturation = 0.0f64;
        let mut value = 0.0f64;
        let mut vibrant = [0.0f32; 3];
        let mut vibrant_saturation = -1.0f32;

        for pixel in image.pixels() {
            let [r, g, b] = pixel.0.map(|c| f32::from(c) / 255.0);
            sum[0] += f64::from(r);
            sum[1] += f64::from(g);
            sum[2] += f64::from(b);
            luminance += f64::from(luma(r, g, b));

            let (s, v) = saturation_value(r, g, b);
            saturation += f64::from(s);
            value += f64::from(v);

            if v > VIBRANT_MIN_VALUE && s > vibrant_saturation {
                vibrant_saturation = s;
                vibrant = [r, g, b];
            }
        }

        let n = pixel_count as f64;
        let components = vec![
            (sum[0] / n) as f32,
            (sum[1] / n) as f32,
            (sum[2] / n) as f32,
            (luminance / n) as f32,
            vibrant[0],
            vibrant[1],
            vibrant[2],
            (saturation / n) as f32,
            (value / n) as f32,
            edge_density(&gray(image)),
        ];
        FeatureVector::new(components)
    }
}

impl FeatureExtractor for ColorExtractor {
    fn extract(&mut self, item: &WorkItem) -> Result<FeatureVector> {
        let decoded = image::open(&item.path).map_err(|e| {
            Error::extraction(item.row, format!("{}: {e}", item.path.display()))
        })?;

        let decoded = if decoded.width() > MAX_SIDE || decoded.height() > MAX_SIDE {
            decoded.thumbnail(MAX_SIDE, MAX_SIDE)
        } else {
            decoded
        };

        Self::features(&decoded.to_rgb8()).map_err(|e| Error::extraction(item.row, e.to_string()))
    }

    fn dimension(&self) -> Option<usize> {
        Some(COLOR_FEATURE_DIM)
    }

    fn name(&self) -> &str {
        "color"
    }
}

fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// HSV saturation and value of an RGB triple in `[0, 1]`.
fn saturation_value(r: f32, g: f32, b: f32) -> (f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let s = if max > 0.0 { (max - min) / max } else { 0.0 };
    (s, max)
}

fn gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0.map(|c| f32::from(c) / 255.0);
        image::Luma([(luma(r, g, b) * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Share of interior pixels whose Sobel gradient is strong.
fn edge_density(gray: &GrayImage) -> f32 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| f32::from(gray.get_pixel(x, y).0[0]) / 255.0;
    let mut edges = 0usize;
    let mut total = 0usize;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            // Each kernel peaks at 4 for a full black/white step.
            let magnitude = (gx * gx + gy * gy).sqrt() / 4.0;
            if magnitude > EDGE_THRESHOLD {
                edges += 1;
            }
            total += 1;
        }
    }
    edges as f32 / total as f32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_solid_red() {
        let img = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        let v = ColorExtractor::features(&img).unwrap();
        let v = v.as_slice();

        assert_eq!(v.len(), COLOR_FEATURE_DIM);
        assert!(approx(v[0], 1.0) && approx(v[1], 0.0) && approx(v[2], 0.0));
        assert!(approx(v[3], 0.299));
        assert_eq!(&v[4..7], &[1.0, 0.0, 0.0]);
        assert!(approx(v[7], 1.0));
        assert!(approx(v[8], 1.0));
        assert_eq!(v[9], 0.0);
    }

    #[test]
    fn test_dark_image_has_black_vibrant_colour() {
        let img = RgbImage::from_pixel(4, 4, Rgb([40, 10, 10]));
        let v = ColorExtractor::features(&img).unwrap();
        assert_eq!(&v.as_slice()[4..7], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_step_edge_is_detected() {
        let img = RgbImage::from_fn(8, 8, |x, _| {
            if x < 4 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        let v = ColorExtractor::features(&img).unwrap();
        assert!(v.as_slice()[9] > 0.0);
        assert!(approx(v.as_slice()[9], 12.0 / 36.0));
    }

    #[test]
    fn test_tiny_image_has_no_edges() {
        let img = RgbImage::from_pixel(2, 2, Rgb([10, 200, 30]));
        assert_eq!(ColorExtractor::features(&img).unwrap().as_slice()[9], 0.0);
    }

    #[test]
    fn test_extract_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cover.png");
        RgbImage::from_pixel(16, 16, Rgb([0, 0, 255])).save(&path).unwrap();

        let mut extractor = ColorExtractor::new();
        let v = extractor.extract(&WorkItem::new(0, "a", &path)).unwrap();
        assert!(approx(v.as_slice()[2], 1.0));

        let again = extractor.extract(&WorkItem::new(0, "a", &path)).unwrap();
        assert_eq!(v, again);
    }

    #[test]
    fn test_unreadable_file_is_item_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let mut extractor = ColorExtractor::new();
        let err = extractor.extract(&WorkItem::new(5, "x", &path)).unwrap_err();
        assert!(matches!(err, Error::Extraction { row: 5, .. }));
        assert!(!err.is_fatal());

        let missing = WorkItem::new(6, "y", dir.path().join("absent.png"));
        assert!(matches!(
            extractor.extract(&missing).unwrap_err(),
            Error::Extraction { row: 6, .. }
        ));
    }
}
