// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, crop, margin trimming, and JPEG output
// for scan pages. Operates on in-memory images using the `image` crate.

use image::DynamicImage;
use ocrmd_core::error::OcrmdError;
use tracing::{debug, info, instrument};

/// Crop fractions at or beyond this would leave no page behind.
const MAX_CROP_PCT: f32 = 0.5;

/// Image processing pipeline operating on a single in-memory page.
///
/// Each method consumes `self` and returns a new `ImageProcessor` wrapping
/// the transformed image, enabling method chaining.
///
/// ```ignore
/// let page = ImageProcessor::open("scan_001.jpg")?
///     .crop_margins(0.05)
///     .into_dynamic();
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, OcrmdError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            OcrmdError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, OcrmdError> {
        let img = image::load_from_memory(data).map_err(|err| {
            OcrmdError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Crop a rectangular region from the image.
    ///
    /// `x` and `y` are the top-left corner; `width` and `height` define the
    /// size of the crop rectangle. Values are clamped to image bounds.
    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let img_w = self.width();
        let img_h = self.height();

        let safe_x = x.min(img_w);
        let safe_y = y.min(img_h);
        let safe_w = width.min(img_w - safe_x);
        let safe_h = height.min(img_h - safe_y);

        let cropped = self.image.crop_imm(safe_x, safe_y, safe_w, safe_h);
        Self { image: cropped }
    }

    /// Trim `pct` of the width and height from every edge.
    ///
    /// A fraction that is not finite, negative, or would leave a zero-area
    /// page (`>= 0.5`) is treated as zero: the image is returned unchanged.
    #[instrument(skip(self), fields(pct))]
    pub fn crop_margins(self, pct: f32) -> Self {
        if !pct.is_finite() || pct <= 0.0 || pct >= MAX_CROP_PCT {
            if pct != 0.0 {
                debug!(pct, "Crop fraction out of range; skipping margin crop");
            }
            return self;
        }

        let (w, h) = (self.width(), self.height());
        let dx = (w as f32 * pct) as u32;
        let dy = (h as f32 * pct) as u32;
        let new_w = w.saturating_sub(2 * dx);
        let new_h = h.saturating_sub(2 * dy);
        if new_w == 0 || new_h == 0 {
            return self;
        }

        debug!(dx, dy, new_w, new_h, "Cropping margins");
        self.crop(dx, dy, new_w, new_h)
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, OcrmdError> {
        let mut buffer = Vec::new();
        let rgb = self.image.to_rgb8();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        rgb.write_with_encoder(encoder).map_err(|err| {
            OcrmdError::ImageError(format!("JPEG encoding failed: {}", err))
        })?;
        Ok(buffer)
    }

    /// Write the image to `path` as JPEG.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save_jpeg(
        &self,
        path: impl AsRef<std::path::Path>,
        quality: u8,
    ) -> Result<(), OcrmdError> {
        let bytes = self.to_jpeg_bytes(quality)?;
        std::fs::write(path.as_ref(), bytes)?;
        info!(
            width = self.width(),
            height = self.height(),
            "Page image written"
        );
        Ok(())
    }
}
