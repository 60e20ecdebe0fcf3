// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page-multiplicity detection and geometric splitting.
//
// A physical scan may carry one, two (facing pages) or four (2x2 grid)
// logical pages. Configured split rules decide first; otherwise a
// column-intensity profile is searched for dark vertical gutters.

use image::{DynamicImage, GrayImage};
use ocrmd_core::config::{LayoutParams, PipelineConfig};
use ocrmd_core::types::{LayoutDecision, LayoutSource, LayoutType, SplitRule};
use tracing::{debug, instrument};

use crate::image::ImageProcessor;

/// Classifies physical scans and cuts them into logical pages.
#[derive(Debug, Clone)]
pub struct LayoutDetector {
    params: LayoutParams,
    overrides: Vec<SplitRule>,
    crop_pct: f32,
}

impl LayoutDetector {
    pub fn new(params: LayoutParams, overrides: Vec<SplitRule>, crop_pct: f32) -> Self {
        Self {
            params,
            overrides,
            crop_pct,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.layout, config.split_strategy.clone(), config.crop_pct)
    }

    /// Decide the layout of the scan at 1-based `page_index`.
    ///
    /// Never fails: degenerate images fall back to [`LayoutType::Single`].
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn detect_layout(&self, page_index: u32, image: &DynamicImage) -> LayoutDecision {
        let decision = match resolve_override(page_index, &self.overrides) {
            Some(layout) => LayoutDecision {
                page_index,
                layout,
                source: LayoutSource::Override,
            },
            None => {
                let cropped = ImageProcessor::from_dynamic(image.clone())
                    .crop_margins(self.crop_pct)
                    .into_dynamic();
                LayoutDecision {
                    page_index,
                    layout: detect_by_profile(&cropped, &self.params),
                    source: LayoutSource::Heuristic,
                }
            }
        };
        debug!(
            page_index,
            layout = %decision.layout,
            source = ?decision.source,
            "Layout decided"
        );
        decision
    }

    /// Detect and split in one step.
    pub fn segment(
        &self,
        page_index: u32,
        image: DynamicImage,
    ) -> (LayoutDecision, Vec<DynamicImage>) {
        let decision = self.detect_layout(page_index, &image);
        let pages = split(image, decision.layout, self.crop_pct);
        debug_assert_eq!(pages.len(), decision.layout.page_count());
        (decision, pages)
    }
}

/// First rule, in configuration order, whose range contains `page_index`.
pub fn resolve_override(page_index: u32, rules: &[SplitRule]) -> Option<LayoutType> {
    rules
        .iter()
        .find(|rule| rule.page.contains(page_index))
        .map(|rule| rule.layout)
}

/// Sum of pixel intensities down each column.
pub fn column_profile(gray: &GrayImage) -> Vec<f64> {
    let mut profile = vec![0.0f64; gray.width() as usize];
    for (x, _, pixel) in gray.enumerate_pixels() {
        profile[x as usize] += pixel.0[0] as f64;
    }
    profile
}

/// Normalized 1-D Gaussian of `ksize` taps.
///
/// Sigma follows the usual size-derived rule `0.3 * ((k - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: usize) -> Vec<f64> {
    let ksize = ksize.max(1);
    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let centre = (ksize as f64 - 1.0) * 0.5;
    let weights: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - centre;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Mirror an out-of-range index back into `0..len` without repeating the
/// edge sample: `dcb|abcd|cba`.
fn reflect_101(mut index: isize, len: isize) -> usize {
    if len <= 1 {
        return 0;
    }
    loop {
        if index < 0 {
            index = -index;
        } else if index >= len {
            index = 2 * (len - 1) - index;
        } else {
            return index as usize;
        }
    }
}

/// Convolve `profile` with a Gaussian of `ksize` taps, reflect-101 borders.
pub fn smooth_profile(profile: &[f64], ksize: usize) -> Vec<f64> {
    if profile.is_empty() {
        return Vec::new();
    }
    let kernel = gaussian_kernel(ksize);
    let half = (kernel.len() / 2) as isize;
    let len = profile.len() as isize;

    (0..len)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * profile[reflect_101(i + k as isize - half, len)])
                .sum()
        })
        .collect()
}

/// Median; even-length input averages the two middle values. Empty is 0.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Column positions of dark vertical bands (candidate gutters).
///
/// Each position is the mean column index of one cluster of below-threshold
/// columns. Flat and all-black images have no gutters.
pub fn detect_gutter_positions(image: &DynamicImage, params: &LayoutParams) -> Vec<f64> {
    let gray = image.to_luma8();
    let raw = column_profile(&gray);
    let max = raw.iter().copied().fold(0.0f64, f64::max);
    if raw.is_empty() || max <= 0.0 {
        return Vec::new();
    }

    let normalized: Vec<f64> = raw.iter().map(|v| v / max).collect();
    let smoothed = smooth_profile(&normalized, params.smoothing_kernel);
    let threshold = median(&smoothed) * params.threshold_ratio as f64;

    let candidates: Vec<usize> = smoothed
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < threshold)
        .map(|(i, _)| i)
        .collect();

    let mut groups: Vec<Vec<usize>> = Vec::new();
    for col in candidates {
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|last| col - last <= params.cluster_gap) => {
                group.push(col)
            }
            _ => groups.push(vec![col]),
        }
    }

    groups
        .iter()
        .map(|g| g.iter().sum::<usize>() as f64 / g.len() as f64)
        .collect()
}

/// Map a gutter count onto a layout.
pub fn classify_gutters(count: usize) -> LayoutType {
    match count {
        0 => LayoutType::Single,
        1 => LayoutType::Double,
        _ => LayoutType::Quadruple,
    }
}

/// Heuristic layout for an already margin-cropped image.
pub fn detect_by_profile(image: &DynamicImage, params: &LayoutParams) -> LayoutType {
    let gutters = detect_gutter_positions(image, params);
    debug!(?gutters, "Gutter candidates");
    classify_gutters(gutters.len())
}

/// Cut at the geometric centre: halves for double, quadrants (TL, TR, BL, BR)
/// for quadruple. Detected gutter positions are not consulted.
pub fn split_by_fixed_midpoint(image: &DynamicImage, layout: LayoutType) -> Vec<DynamicImage> {
    let (w, h) = (image.width(), image.height());
    let (mx, my) = (w / 2, h / 2);
    match layout {
        LayoutType::Single => vec![image.clone()],
        LayoutType::Double => vec![
            image.crop_imm(0, 0, mx, h),
            image.crop_imm(mx, 0, w - mx, h),
        ],
        LayoutType::Quadruple => vec![
            image.crop_imm(0, 0, mx, my),
            image.crop_imm(mx, 0, w - mx, my),
            image.crop_imm(0, my, mx, h - my),
            image.crop_imm(mx, my, w - mx, h - my),
        ],
    }
}

/// Crop margins by `crop_pct`, then split according to `layout`.
pub fn split(image: DynamicImage, layout: LayoutType, crop_pct: f32) -> Vec<DynamicImage> {
    let cropped = ImageProcessor::from_dynamic(image)
        .crop_margins(crop_pct)
        .into_dynamic();
    match layout {
        LayoutType::Single => vec![cropped],
        other => split_by_fixed_midpoint(&cropped, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use ocrmd_core::types::PageRange;

    /// White page with dark vertical bands centred on `gutters`.
    fn scan_with_gutters(w: u32, h: u32, gutters: &[u32]) -> DynamicImage {
        let gray = GrayImage::from_fn(w, h, |x, _| {
            if gutters.iter().any(|g| x.abs_diff(*g) < 10) {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });
        DynamicImage::ImageLuma8(gray)
    }

    fn detector(overrides: Vec<SplitRule>, crop_pct: f32) -> LayoutDetector {
        LayoutDetector::new(LayoutParams::default(), overrides, crop_pct)
    }

    #[test]
    fn override_wins_for_every_index_in_range() {
        let rules = vec![SplitRule {
            page: PageRange::new(2, 5).unwrap(),
            layout: LayoutType::Quadruple,
        }];
        let det = detector(rules, 0.05);
        let flat = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 100, Luma([255])));
        for page in 2..=5 {
            let decision = det.detect_layout(page, &flat);
            assert_eq!(decision.layout, LayoutType::Quadruple);
            assert_eq!(decision.source, LayoutSource::Override);
        }
        let outside = det.detect_layout(6, &flat);
        assert_eq!(outside.layout, LayoutType::Single);
        assert_eq!(outside.source, LayoutSource::Heuristic);
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            SplitRule {
                page: PageRange::new(1, 10).unwrap(),
                layout: LayoutType::Double,
            },
            SplitRule {
                page: PageRange::single(3).unwrap(),
                layout: LayoutType::Single,
            },
        ];
        assert_eq!(resolve_override(3, &rules), Some(LayoutType::Double));
        assert_eq!(resolve_override(11, &rules), None);
    }

    #[test]
    fn flat_and_black_images_are_single() {
        let params = LayoutParams::default();
        let white = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 200, Luma([255])));
        let black = DynamicImage::ImageLuma8(GrayImage::from_pixel(300, 200, Luma([0])));
        let empty = DynamicImage::new_luma8(0, 0);
        assert_eq!(detect_by_profile(&white, &params), LayoutType::Single);
        assert_eq!(detect_by_profile(&black, &params), LayoutType::Single);
        assert_eq!(detect_by_profile(&empty, &params), LayoutType::Single);
    }

    #[test]
    fn central_gutter_splits_into_two_square_pages() {
        let scan = scan_with_gutters(2000, 1000, &[1000]);
        let det = detector(Vec::new(), 0.0);
        let (decision, pages) = det.segment(1, scan);
        assert_eq!(decision.layout, LayoutType::Double);
        assert_eq!(pages.len(), 2);
        for page in &pages {
            assert_eq!((page.width(), page.height()), (1000, 1000));
        }
    }

    #[test]
    fn off_centre_gutter_still_cuts_at_midpoint() {
        let scan = scan_with_gutters(2000, 1000, &[700]);
        let gutters = detect_gutter_positions(&scan, &LayoutParams::default());
        assert_eq!(gutters.len(), 1);
        assert!((gutters[0] - 700.0).abs() < 3.0, "{gutters:?}");

        let (decision, pages) = detector(Vec::new(), 0.0).segment(1, scan);
        assert_eq!(decision.layout, LayoutType::Double);
        assert_eq!(pages.len(), decision.layout.page_count());
        for page in &pages {
            assert_eq!((page.width(), page.height()), (1000, 1000));
        }
        // The band stays inside the left page.
        assert_eq!(pages[0].to_luma8().get_pixel(700, 500).0[0], 0);
        assert_eq!(pages[1].to_luma8().get_pixel(0, 500).0[0], 255);
    }

    #[test]
    fn every_layout_yields_its_page_count() {
        for layout in [LayoutType::Single, LayoutType::Double, LayoutType::Quadruple] {
            let scan = DynamicImage::ImageLuma8(GrayImage::from_pixel(400, 300, Luma([255])));
            assert_eq!(split(scan, layout, 0.05).len(), layout.page_count());
        }
    }

    #[test]
    fn gutter_position_is_near_the_band() {
        let scan = scan_with_gutters(2000, 400, &[1000]);
        let gutters = detect_gutter_positions(&scan, &LayoutParams::default());
        assert_eq!(gutters.len(), 1);
        assert!((gutters[0] - 1000.0).abs() < 3.0, "{gutters:?}");
    }

    #[test]
    fn two_gutters_mean_quadruple() {
        let scan = scan_with_gutters(1200, 800, &[400, 800]);
        assert_eq!(
            detect_by_profile(&scan, &LayoutParams::default()),
            LayoutType::Quadruple
        );
    }

    #[test]
    fn quadrants_come_out_tl_tr_bl_br() {
        // Encode the quadrant in the pixel value.
        let gray = GrayImage::from_fn(100, 60, |x, y| {
            let q = (y >= 30) as u8 * 2 + (x >= 50) as u8;
            Luma([q * 60])
        });
        let pages = split_by_fixed_midpoint(&DynamicImage::ImageLuma8(gray), LayoutType::Quadruple);
        let values: Vec<u8> = pages.iter().map(|p| p.to_luma8().get_pixel(0, 0).0[0]).collect();
        assert_eq!(values, vec![0, 60, 120, 180]);
        assert!(pages.iter().all(|p| (p.width(), p.height()) == (50, 30)));
    }

    #[test]
    fn split_crops_before_cutting() {
        let scan = DynamicImage::ImageLuma8(GrayImage::from_pixel(1000, 500, Luma([255])));
        let pages = split(scan, LayoutType::Double, 0.1);
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[0].width(), pages[0].height()), (400, 400));
    }

    #[test]
    fn smoothing_preserves_constant_profiles() {
        let flat = vec![0.7; 80];
        let smoothed = smooth_profile(&flat, 51);
        assert!(smoothed.iter().all(|v| (v - 0.7).abs() < 1e-9));
        // shorter than the kernel still works
        assert_eq!(smooth_profile(&[0.5, 0.5, 0.5], 51).len(), 3);
    }

    #[test]
    fn kernel_sigma_matches_size_rule() {
        let kernel = gaussian_kernel(51);
        assert_eq!(kernel.len(), 51);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        // sigma = 8: ratio between centre and one sigma out is e^-0.5
        let ratio = kernel[25 + 8] / kernel[25];
        assert!((ratio - (-0.5f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn median_averages_even_lengths() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
