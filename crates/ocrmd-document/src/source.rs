// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan sources: where physical page images come from.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrmd_core::error::OcrmdError;
use tracing::{debug, info, instrument};

use crate::image::ImageProcessor;
use crate::pdf::PdfReader;

/// File extensions accepted as scan images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

/// An ordered collection of physical scans, addressed by 1-based index.
pub enum ScanSource {
    /// Image files, sorted by file name.
    Images(Vec<PathBuf>),
    /// One scan per PDF page.
    Pdf(PdfReader),
}

impl ScanSource {
    /// Open a PDF, a single image, or a directory of images.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OcrmdError> {
        let path = path.as_ref();
        if path.is_dir() {
            let files = list_images(path)?;
            if files.is_empty() {
                return Err(OcrmdError::UnsupportedSource(format!(
                    "no scan images found in {}",
                    path.display()
                )));
            }
            info!(count = files.len(), "Image directory opened");
            return Ok(Self::Images(files));
        }

        match extension_of(path).as_deref() {
            Some("pdf") => Ok(Self::Pdf(PdfReader::open(path)?)),
            Some(ext) if IMAGE_EXTENSIONS.contains(&ext) => {
                Ok(Self::Images(vec![path.to_path_buf()]))
            }
            _ if !path.exists() => Err(OcrmdError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ))),
            _ => Err(OcrmdError::UnsupportedSource(format!(
                "{} is neither a PDF nor a scan image",
                path.display()
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Images(files) => files.len(),
            Self::Pdf(reader) => reader.page_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode the scan at 1-based `index`.
    pub fn load(&self, index: u32) -> Result<DynamicImage, OcrmdError> {
        match self {
            Self::Images(files) => {
                let path = index
                    .checked_sub(1)
                    .and_then(|i| files.get(i as usize))
                    .ok_or_else(|| {
                        OcrmdError::PageRange(format!(
                            "scan {} out of range (source has {})",
                            index,
                            files.len()
                        ))
                    })?;
                Ok(ImageProcessor::open(path)?.into_dynamic())
            }
            Self::Pdf(reader) => reader.page_image(index),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, OcrmdError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && extension_of(&path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(count = files.len(), dir = %dir.display(), "Scan images listed");
    Ok(files)
}
