// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-page quality report written as CSV.

use std::path::Path;

use ocrmd_core::config::{NormalizeProfile, PipelineConfig};
use ocrmd_core::error::OcrmdError;
use ocrmd_core::types::{PageRecord, SegmentationMode};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::markdown::should_embed;

/// One CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRow {
    pub page: u32,
    /// Average word confidence, two decimals.
    pub conf: f32,
    pub chars: usize,
    pub used_psm: SegmentationMode,
    pub embedded: bool,
    pub preprocess: NormalizeProfile,
    pub crop_pct: f32,
}

impl QaRow {
    pub fn from_record(record: &PageRecord, config: &PipelineConfig) -> Self {
        Self {
            page: record.page,
            conf: (record.ocr.avg_conf * 100.0).round() / 100.0,
            chars: record.ocr.char_count,
            used_psm: record.ocr.used_mode,
            embedded: should_embed(config.embed_images, record.page, record.ocr.low_quality),
            preprocess: config.preprocess,
            crop_pct: config.crop_pct,
        }
    }
}

/// Write the report to `path` with a header row.
#[instrument(skip(rows), fields(path = %path.as_ref().display(), rows = rows.len()))]
pub fn write_report(rows: &[QaRow], path: impl AsRef<Path>) -> Result<(), OcrmdError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|err| OcrmdError::Csv(format!("cannot create {}: {}", path.display(), err)))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| OcrmdError::Csv(format!("cannot write row {}: {}", row.page, err)))?;
    }
    writer.flush()?;

    let low = rows.iter().filter(|r| r.embedded).count();
    info!(embedded = low, "QA report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocrmd_core::types::{OcrResult, page_file_name};

    fn record(page: u32, avg_conf: f32, low_quality: bool) -> PageRecord {
        PageRecord {
            page,
            image_file: page_file_name(page),
            ocr: OcrResult {
                text: String::new(),
                avg_conf,
                used_mode: SegmentationMode(3),
                char_count: 42,
                low_quality,
                words: Vec::new(),
            },
            lines: Vec::new(),
        }
    }

    #[test]
    fn rows_follow_embed_policy_and_round_confidence() {
        let config = PipelineConfig::new("Book", "book.pdf");
        let row = QaRow::from_record(&record(4, 71.23456, true), &config);
        assert_eq!(row.page, 4);
        assert!((row.conf - 71.23).abs() < 1e-4);
        assert!(row.embedded);
        assert!(!QaRow::from_record(&record(4, 90.0, false), &config).embedded);
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa_report.csv");
        let config = PipelineConfig::new("Book", "book.pdf");
        let rows = vec![
            QaRow::from_record(&record(1, 88.5, false), &config),
            QaRow::from_record(&record(2, 12.0, true), &config),
        ];
        write_report(&rows, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("page,conf,chars,used_psm,embedded,preprocess,crop_pct")
        );
        assert_eq!(lines.next(), Some("1,88.5,42,3,true,gray,0.05"));
        assert!(lines.next().is_some_and(|l| l.starts_with("2,12")));
        assert_eq!(lines.next(), None);
    }
}
