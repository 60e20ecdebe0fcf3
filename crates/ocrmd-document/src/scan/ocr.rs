// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR engine seam and the bundled Tesseract implementation.
//
// The pipeline only talks to the [`OcrEngine`] trait. [`TesseractEngine`]
// shells out to the `tesseract` binary, asking for both the plain-text and the
// TSV renderer in a single run so each segmentation mode costs one process.
//
// # TSV layout
//
// Tesseract's TSV output has one header row followed by rows of
// `level page_num block_num par_num line_num word_num left top width height conf text`.
// Only level-5 rows are words; the rest describe pages, blocks, paragraphs
// and lines and are ignored here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use ocrmd_core::error::OcrmdError;
use ocrmd_core::types::{PixelBox, Recognition, SegmentationMode, WordRecord};
use tracing::{debug, instrument};

/// TSV level of word rows.
const WORD_LEVEL: u32 = 5;

/// Number of tab-separated columns in a TSV row.
const TSV_COLUMNS: usize = 12;

/// Text recognition backend.
///
/// Implementations must be shareable across worker threads; the pipeline
/// holds one engine behind an `Arc` and calls it from blocking tasks.
pub trait OcrEngine: Send + Sync {
    /// Recognise `image` in `language` using segmentation `mode`.
    ///
    /// Returns the engine's plain text and its word-level geometry from the
    /// same run.
    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        mode: SegmentationMode,
    ) -> Result<Recognition, OcrmdError>;
}

/// [`OcrEngine`] backed by the Tesseract command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    /// Binary to execute; resolved through `PATH` when relative.
    command: PathBuf,
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TesseractEngine {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    /// Run `tesseract --version`, returning the first line of its output.
    ///
    /// Used by the CLI to fail fast when the binary is missing.
    pub fn version(&self) -> Result<String, OcrmdError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .map_err(|err| {
                OcrmdError::OcrError(format!(
                    "failed to run {}: {}",
                    self.command.display(),
                    err
                ))
            })?;
        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl OcrEngine for TesseractEngine {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        mode: SegmentationMode,
    ) -> Result<Recognition, OcrmdError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("page.png");
        image.save(&input).map_err(|err| {
            OcrmdError::ImageError(format!("failed to stage page for OCR: {}", err))
        })?;
        let out_base = scratch.path().join("out");

        let output = Command::new(&self.command)
            .arg(&input)
            .arg(&out_base)
            .arg("-l")
            .arg(language)
            .arg("--psm")
            .arg(mode.to_string())
            .arg("txt")
            .arg("tsv")
            .output()
            .map_err(|err| {
                OcrmdError::OcrError(format!(
                    "failed to run {}: {}",
                    self.command.display(),
                    err
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrmdError::OcrError(format!(
                "tesseract exited with {} (psm {}): {}",
                output.status,
                mode,
                stderr.trim()
            )));
        }

        let text = std::fs::read_to_string(out_base.with_extension("txt"))?;
        let tsv = std::fs::read_to_string(out_base.with_extension("tsv"))?;
        let words = parse_tsv(&tsv)?;

        debug!(%mode, words = words.len(), chars = text.len(), "Tesseract run complete");
        Ok(Recognition { text, words })
    }
}

/// Parse Tesseract TSV output into word records.
///
/// Keeps level-5 rows only. A confidence of `-1` becomes `None`. Lines are
/// identified by their `(block, paragraph, line)` triple and numbered in
/// order of first appearance, so indices are unique across the page.
pub fn parse_tsv(tsv: &str) -> Result<Vec<WordRecord>, OcrmdError> {
    let mut line_ids: HashMap<(u32, u32, u32), u32> = HashMap::new();
    let mut words = Vec::new();

    for (row_no, row) in tsv.lines().enumerate() {
        if row_no == 0 && row.starts_with("level") {
            continue;
        }
        if row.trim().is_empty() {
            continue;
        }

        // The text column may itself be empty; splitn keeps it as "".
        let cols: Vec<&str> = row.splitn(TSV_COLUMNS, '\t').collect();
        if cols.len() < TSV_COLUMNS - 1 {
            return Err(OcrmdError::OcrError(format!(
                "malformed TSV row {}: expected {} columns, got {}",
                row_no + 1,
                TSV_COLUMNS,
                cols.len()
            )));
        }

        let num = |idx: usize| -> Result<u32, OcrmdError> {
            cols[idx].trim().parse::<u32>().map_err(|_| {
                OcrmdError::OcrError(format!(
                    "malformed TSV row {}: column {} is {:?}",
                    row_no + 1,
                    idx + 1,
                    cols[idx]
                ))
            })
        };

        if num(0)? != WORD_LEVEL {
            continue;
        }

        let key = (num(2)?, num(3)?, num(4)?);
        let next_id = line_ids.len() as u32;
        let line_index = *line_ids.entry(key).or_insert(next_id);

        let conf: f32 = cols[10].trim().parse().map_err(|_| {
            OcrmdError::OcrError(format!(
                "malformed TSV row {}: confidence is {:?}",
                row_no + 1,
                cols[10]
            ))
        })?;

        words.push(WordRecord {
            text: cols.get(11).map(|t| t.trim_end_matches('\r')).unwrap_or_default().to_string(),
            bbox: PixelBox::new(num(6)?, num(7)?, num(8)?, num(9)?),
            confidence: if conf < 0.0 { None } else { Some(conf) },
            line_index,
        });
    }

    Ok(words)
}
