// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan normalization: grayscale sharpening, autocontrast, global and
// adaptive binarization, histogram equalisation, and small-angle deskew for
// scanned book pages before layout detection and OCR.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{ThresholdType, equalize_histogram, otsu_level, threshold};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use ocrmd_core::config::NormalizeProfile;
use tracing::{debug, info, instrument};

/// Unsharp mask radius (Gaussian sigma).
const UNSHARP_SIGMA: f32 = 2.0;
/// Unsharp mask strength: 1.5 adds 150% of the high-pass signal.
const UNSHARP_AMOUNT: f32 = 1.5;
/// Differences smaller than this are left alone to avoid boosting noise.
const UNSHARP_THRESHOLD: i32 = 3;

/// Neighbourhood radius and offset for the adaptive profile's threshold.
const ADAPTIVE_BLOCK_RADIUS: u32 = 15;
const ADAPTIVE_OFFSET: i32 = 11;

/// Deskew search window (degrees) and step.
const DESKEW_MAX_DEGREES: f32 = 3.0;
const DESKEW_STEP_DEGREES: f32 = 0.5;
/// Rotations smaller than this are not applied.
const DESKEW_MIN_DEGREES: f32 = 0.1;
/// Longest edge of the thumbnail used to estimate skew.
const DESKEW_SAMPLE_EDGE: u32 = 800;

/// Normalizes scanned page images ahead of recognition.
///
/// Every operation produces an 8-bit grayscale image. The profile entry point
/// [`normalize`](Self::normalize) is what the pipeline calls; the individual
/// steps are public so they can be combined or benchmarked on their own.
pub struct ScanEnhancer {
    /// The working image.
    image: DynamicImage,
}

impl ScanEnhancer {
    // -- Construction ---------------------------------------------------------

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    fn from_gray(gray: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(gray),
        }
    }

    // -- Profiles -------------------------------------------------------------

    /// Apply a named normalization profile.
    #[instrument(skip(self), fields(width = self.image.width(), height = self.image.height()))]
    pub fn normalize(self, profile: NormalizeProfile) -> Self {
        debug!(%profile, "Normalizing scan");
        match profile {
            NormalizeProfile::Gray => self.sharpen().autocontrast(),
            NormalizeProfile::Binary => self.sharpen().autocontrast().binarize_otsu(),
            NormalizeProfile::Adaptive => self
                .equalize()
                .binarize(ADAPTIVE_BLOCK_RADIUS, ADAPTIVE_OFFSET)
                .deskew(),
        }
    }

    // -- Tone -----------------------------------------------------------------

    /// Grayscale conversion followed by an unsharp mask.
    pub fn sharpen(self) -> Self {
        let gray = self.image.to_luma8();
        let blurred = gaussian_blur_f32(&gray, UNSHARP_SIGMA);

        let sharpened = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let orig = gray.get_pixel(x, y).0[0] as i32;
            let diff = orig - blurred.get_pixel(x, y).0[0] as i32;
            if diff.abs() < UNSHARP_THRESHOLD {
                Luma([orig as u8])
            } else {
                let val = orig as f32 + UNSHARP_AMOUNT * diff as f32;
                Luma([val.clamp(0.0, 255.0) as u8])
            }
        });
        Self::from_gray(sharpened)
    }

    /// Stretch the intensity range so the darkest pixel becomes 0 and the
    /// lightest 255. Flat images are returned unchanged.
    pub fn autocontrast(self) -> Self {
        let gray = self.image.to_luma8();
        let (lo, hi) = gray
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        if hi <= lo {
            return Self::from_gray(gray);
        }

        let span = (hi - lo) as f32;
        let mut out = gray;
        for pixel in out.pixels_mut() {
            let stretched = (pixel.0[0] - lo) as f32 * 255.0 / span;
            pixel.0[0] = stretched.round().clamp(0.0, 255.0) as u8;
        }
        Self::from_gray(out)
    }

    /// Global histogram equalisation.
    pub fn equalize(self) -> Self {
        Self::from_gray(equalize_histogram(&self.image.to_luma8()))
    }

    // -- Binarization ---------------------------------------------------------

    /// Apply adaptive thresholding to produce a black-and-white image.
    ///
    /// For each pixel the threshold is the mean intensity within a
    /// `block_radius` neighbourhood, minus a constant `c`. Pixels darker than
    /// the local threshold become black; others become white.
    pub fn binarize(self, block_radius: u32, c: i32) -> Self {
        let gray = self.image.to_luma8();
        let (width, height) = gray.dimensions();
        let integral = integral_image::<_, u64>(&gray);

        let output = GrayImage::from_fn(width, height, |x, y| {
            let (left, top) = (x.saturating_sub(block_radius), y.saturating_sub(block_radius));
            let right = x.saturating_add(block_radius).min(width - 1);
            let bottom = y.saturating_add(block_radius).min(height - 1);
            let area = u64::from(right - left + 1) * u64::from(bottom - top + 1);
            let sum = sum_image_pixels(&integral, left, top, right, bottom)[0];
            let threshold = ((sum / area) as i32 - c).clamp(0, 255);
            Luma([if i32::from(gray.get_pixel(x, y).0[0]) < threshold { 0 } else { 255 }])
        });

        Self::from_gray(output)
    }

    /// Global binarization at the Otsu threshold.
    pub fn binarize_otsu(self) -> Self {
        let gray = self.image.to_luma8();
        let level = otsu_level(&gray);
        debug!(level, "Otsu threshold computed");
        Self::from_gray(threshold(&gray, level, ThresholdType::Binary))
    }

    // -- Geometry -------------------------------------------------------------

    /// Correct a small rotation (within ±3°).
    ///
    /// The skew angle is the rotation that maximises the variance of dark
    /// pixels per row, measured on a downscaled copy. Text lines snap into
    /// horizontal bands at the right angle, which is what the variance
    /// rewards.
    pub fn deskew(self) -> Self {
        let angle = estimate_skew_degrees(&self.image);
        if angle.abs() < DESKEW_MIN_DEGREES {
            return Self::from_gray(self.image.to_luma8());
        }

        info!(angle, "Deskewing scan");
        let gray = self.image.to_luma8();
        let rotated = rotate_about_center(
            &gray,
            angle.to_radians(),
            Interpolation::Bilinear,
            Luma([255u8]),
        );
        Self::from_gray(rotated)
    }
}

/// Rotation (degrees) that best aligns text rows, searched over a fixed grid.
fn estimate_skew_degrees(image: &DynamicImage) -> f32 {
    let sample = if image.width().max(image.height()) > DESKEW_SAMPLE_EDGE {
        image
            .resize(DESKEW_SAMPLE_EDGE, DESKEW_SAMPLE_EDGE, FilterType::Triangle)
            .to_luma8()
    } else {
        image.to_luma8()
    };
    if sample.width() == 0 || sample.height() == 0 {
        return 0.0;
    }

    let steps = (DESKEW_MAX_DEGREES / DESKEW_STEP_DEGREES).round() as i32;
    let mut best_angle = 0.0f32;
    let mut best_score = row_darkness_variance(&sample);

    for step in -steps..=steps {
        if step == 0 {
            continue;
        }
        let angle = step as f32 * DESKEW_STEP_DEGREES;
        let rotated = rotate_about_center(
            &sample,
            angle.to_radians(),
            Interpolation::Nearest,
            Luma([255u8]),
        );
        let score = row_darkness_variance(&rotated);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    debug!(best_angle, best_score, "Skew estimated");
    best_angle
}

/// Variance of the per-row count of dark (< 128) pixels.
fn row_darkness_variance(gray: &GrayImage) -> f64 {
    let rows: Vec<f64> = gray
        .rows()
        .map(|row| row.filter(|p| p.0[0] < 128).count() as f64)
        .collect();
    if rows.is_empty() {
        return 0.0;
    }
    let mean = rows.iter().sum::<f64>() / rows.len() as f64;
    rows.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / rows.len() as f64
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn two_tone(w: u32, h: u32, dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| if x < w / 2 { Luma([dark]) } else { Luma([light]) })
    }

    #[test]
    fn every_profile_yields_same_size_grayscale() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, image::Rgb([180, 170, 160])));
        for profile in [
            NormalizeProfile::Gray,
            NormalizeProfile::Binary,
            NormalizeProfile::Adaptive,
        ] {
            let out = ScanEnhancer::from_dynamic(rgb.clone())
                .normalize(profile)
                .into_dynamic();
            assert_eq!((out.width(), out.height()), (64, 48), "{profile}");
            assert!(out.as_luma8().is_some(), "{profile} should be Luma8");
        }
    }

    #[test]
    fn autocontrast_stretches_to_full_range() {
        let img = DynamicImage::ImageLuma8(two_tone(20, 10, 100, 150));
        let out = ScanEnhancer::from_dynamic(img).autocontrast().into_dynamic().to_luma8();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(19, 0).0[0], 255);
    }

    #[test]
    fn autocontrast_leaves_flat_image_alone() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([77u8])));
        let out = ScanEnhancer::from_dynamic(img).autocontrast().into_dynamic().to_luma8();
        assert!(out.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn otsu_separates_two_tones() {
        let out = ScanEnhancer::from_dynamic(DynamicImage::ImageLuma8(two_tone(40, 10, 40, 210)))
            .binarize_otsu()
            .into_dynamic()
            .to_luma8();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(39, 0).0[0], 255);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn adaptive_threshold_follows_local_mean() {
        // A faint stroke on an uneven background: left half 120, right half 220,
        // with a 2px line 30 levels darker than its surroundings on each side.
        let gray = GrayImage::from_fn(60, 20, |x, y| {
            let base = if x < 30 { 120 } else { 220 };
            Luma([if y == 9 || y == 10 { base - 30 } else { base }])
        });
        let out = ScanEnhancer::from_dynamic(DynamicImage::ImageLuma8(gray))
            .binarize(ADAPTIVE_BLOCK_RADIUS, ADAPTIVE_OFFSET)
            .into_dynamic()
            .to_luma8();
        assert_eq!(out.get_pixel(10, 10).0[0], 0);
        assert_eq!(out.get_pixel(50, 10).0[0], 0);
        assert_eq!(out.get_pixel(10, 2).0[0], 255);
        assert_eq!(out.get_pixel(50, 2).0[0], 255);
    }

    #[test]
    fn deskew_keeps_straight_lines_unrotated() {
        // Horizontal dark bars on white: already aligned.
        let gray = GrayImage::from_fn(120, 120, |_, y| {
            if (y / 10) % 2 == 0 { Luma([0u8]) } else { Luma([255u8]) }
        });
        assert_eq!(estimate_skew_degrees(&DynamicImage::ImageLuma8(gray)), 0.0);
    }
}
