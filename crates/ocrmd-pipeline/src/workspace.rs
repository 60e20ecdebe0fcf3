// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// On-disk layout of one book's outputs.
//
// <output>/<slug>/
//     split_pages/page_NNN.jpg
//     pages.json
//     qa_report.csv
//     markdown/<slug>.md

use std::path::{Path, PathBuf};

use ocrmd_core::error::{OcrmdError, Result};
use ocrmd_core::types::PageRecord;
use ocrmd_document::source::list_images;
use tracing::{debug, info};

/// Paths of every artefact produced for one book.
#[derive(Debug, Clone)]
pub struct BookWorkspace {
    root: PathBuf,
    slug: String,
}

impl BookWorkspace {
    pub fn new(output_dir: impl AsRef<Path>, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            root: output_dir.as_ref().join(&slug),
            slug,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn split_dir(&self) -> PathBuf {
        self.root.join("split_pages")
    }

    pub fn pages_json(&self) -> PathBuf {
        self.root.join("pages.json")
    }

    pub fn qa_report(&self) -> PathBuf {
        self.root.join("qa_report.csv")
    }

    pub fn markdown(&self) -> PathBuf {
        self.root.join("markdown").join(format!("{}.md", self.slug))
    }

    /// Create the book directory and its split-pages directory.
    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(self.split_dir())?;
        debug!(root = %self.root.display(), "Workspace ready");
        Ok(())
    }

    /// Split page images with the page number parsed from their
    /// `page_<N>` stem, in ascending page order.
    pub fn split_pages(&self) -> Result<Vec<(u32, PathBuf)>> {
        let dir = self.split_dir();
        if !dir.is_dir() {
            return Err(OcrmdError::Config(format!(
                "{} does not exist; run the split stage first",
                dir.display()
            )));
        }
        let mut pages: Vec<(u32, PathBuf)> = list_images(&dir)?
            .into_iter()
            .filter_map(|path| page_number(&path).map(|n| (n, path)))
            .collect();
        pages.sort_by_key(|(n, _)| *n);
        Ok(pages)
    }

    /// Page records from `pages.json`, or none if it does not exist yet.
    pub fn load_records(&self) -> Result<Vec<PageRecord>> {
        let path = self.pages_json();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write `records` to `pages.json`, replacing same-numbered pages already
    /// there and keeping the rest. Returns the merged, page-ordered set.
    pub fn merge_records(&self, records: Vec<PageRecord>) -> Result<Vec<PageRecord>> {
        let mut merged = self.load_records()?;
        merged.retain(|old| !records.iter().any(|new| new.page == old.page));
        merged.extend(records);
        merged.sort_by_key(|r| r.page);

        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.pages_json(), serde_json::to_string_pretty(&merged)?)?;
        info!(pages = merged.len(), "Page records saved");
        Ok(merged)
    }
}

/// Page number of a `page_<N>.<ext>` file; `None` for anything else.
fn page_number(path: &Path) -> Option<u32> {
    path.file_stem()?
        .to_str()?
        .strip_prefix("page_")?
        .parse()
        .ok()
        .filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocrmd_core::types::{OcrResult, QualityGate, SegmentationMode, page_file_name};

    fn record(page: u32) -> PageRecord {
        let gate = QualityGate {
            low_conf: 50.0,
            min_chars: 100,
        };
        PageRecord {
            page,
            image_file: page_file_name(page),
            ocr: OcrResult::unreadable(SegmentationMode(6), &gate),
            lines: Vec::new(),
        }
    }

    #[test]
    fn layout_matches_convention() {
        let ws = BookWorkspace::new("/out", "my_book");
        assert_eq!(ws.split_dir(), PathBuf::from("/out/my_book/split_pages"));
        assert_eq!(ws.qa_report(), PathBuf::from("/out/my_book/qa_report.csv"));
        assert_eq!(ws.markdown(), PathBuf::from("/out/my_book/markdown/my_book.md"));
        assert_eq!(ws.pages_json(), PathBuf::from("/out/my_book/pages.json"));
    }

    #[test]
    fn merge_replaces_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        let ws = BookWorkspace::new(dir.path(), "book");
        assert!(ws.load_records().unwrap().is_empty());

        ws.merge_records(vec![record(3), record(1)]).unwrap();
        let mut replacement = record(3);
        replacement.ocr.text = "new".into();
        let merged = ws.merge_records(vec![replacement, record(2)]).unwrap();

        let pages: Vec<u32> = merged.iter().map(|r| r.page).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(ws.load_records().unwrap()[2].ocr.text, "new");
    }

    #[test]
    fn split_pages_order_numerically_past_999() {
        let dir = tempfile::tempdir().unwrap();
        let ws = BookWorkspace::new(dir.path(), "book");
        ws.create().unwrap();
        for page in 1..=1001 {
            std::fs::write(ws.split_dir().join(page_file_name(page)), b"").unwrap();
        }
        std::fs::write(ws.split_dir().join(".scan_00001_0.jpg"), b"").unwrap();
        std::fs::write(ws.split_dir().join("page_cover.jpg"), b"").unwrap();

        let pages = ws.split_pages().unwrap();
        assert_eq!(pages.len(), 1001);
        for (i, (page, path)) in pages.iter().enumerate() {
            assert_eq!(*page, i as u32 + 1);
            assert_eq!(path.file_name().unwrap().to_string_lossy(), page_file_name(*page));
        }
        assert_eq!(pages[999].1.file_name().unwrap(), "page_1000.jpg");
    }

    #[test]
    fn split_pages_requires_split_stage() {
        let dir = tempfile::tempdir().unwrap();
        let ws = BookWorkspace::new(dir.path(), "book");
        assert!(matches!(ws.split_pages(), Err(OcrmdError::Config(_))));
        ws.create().unwrap();
        assert!(ws.split_pages().unwrap().is_empty());
    }
}
