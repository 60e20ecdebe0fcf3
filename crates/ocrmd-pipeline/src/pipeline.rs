// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The book pipeline: split scans into logical pages, recognise each page,
// assemble the outputs.
//
// Each stage reads its inputs from and writes its outputs to a
// [`BookWorkspace`], so stages can be run separately. Page-level work runs on
// the bounded [`WorkerPool`]; results are reassembled in page order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use ocrmd_core::config::{NormalizeProfile, PipelineConfig};
use ocrmd_core::error::{OcrmdError, Result};
use ocrmd_core::types::{
    CancelToken, LayoutDecision, OcrResult, PageRange, PageRecord, QualityGate, SegmentationMode,
    page_file_name,
};
use ocrmd_document::assemble::qa::{QaRow, write_report};
use ocrmd_document::image::ImageProcessor;
use ocrmd_document::scan::consensus::OcrConsensus;
use ocrmd_document::scan::enhance::ScanEnhancer;
use ocrmd_document::scan::layout::LayoutDetector;
use ocrmd_document::scan::ocr::OcrEngine;
use ocrmd_document::scan::structure::StructureInferencer;
use ocrmd_document::source::{ScanSource, list_images};
use ocrmd_document::MarkdownBuilder;
use tracing::{debug, info, instrument, warn};

use crate::pool::WorkerPool;
use crate::progress::{NoProgress, Progress, Stage};
use crate::workspace::BookWorkspace;

/// JPEG quality for split page images.
const SPLIT_JPEG_QUALITY: u8 = 95;

/// Prefix of per-scan staging files inside the split directory.
const STAGING_PREFIX: &str = ".scan_";

/// Outcome of the split stage.
#[derive(Debug, Clone, Default)]
pub struct SplitSummary {
    /// One decision per scan that was split, in scan order.
    pub decisions: Vec<LayoutDecision>,
    /// Written page images, in logical page order.
    pub pages: Vec<PathBuf>,
    /// 1-based indices of scans that could not be read or split.
    pub failed_scans: Vec<u32>,
}

/// Recognition of one logical page: normalize, consensus OCR, headings.
pub struct Recognizer {
    consensus: OcrConsensus,
    structure: StructureInferencer,
    language: String,
    base_mode: SegmentationMode,
    profile: NormalizeProfile,
    gate: QualityGate,
}

impl Recognizer {
    pub fn from_config(config: &PipelineConfig, engine: Arc<dyn OcrEngine>) -> Self {
        Self {
            consensus: OcrConsensus::new(
                engine.clone(),
                config.fallback_modes.clone(),
                config.quality_gate(),
            ),
            structure: StructureInferencer::new(engine, config.headings),
            language: config.lang.clone(),
            base_mode: config.tess_psm,
            profile: config.preprocess,
            gate: config.quality_gate(),
        }
    }

    /// Recognise one page image.
    ///
    /// Errors only with [`OcrmdError::Cancelled`].
    pub fn recognize_page(
        &self,
        page: u32,
        image: DynamicImage,
        image_file: String,
        cancel: &CancelToken,
    ) -> Result<PageRecord> {
        cancel.check()?;
        let normalized = ScanEnhancer::from_dynamic(image)
            .normalize(self.profile)
            .into_dynamic();

        let ocr = self
            .consensus
            .recognize(&normalized, &self.language, self.base_mode, cancel)?;

        // The base-mode run already carries the geometry structure needs.
        let lines = if ocr.used_mode == self.base_mode {
            self.structure.from_words(&ocr.words, normalized.height())
        } else {
            cancel.check()?;
            self.structure
                .infer_structure(&normalized, &self.language, self.base_mode)
        };

        debug!(
            page,
            avg_conf = ocr.avg_conf,
            chars = ocr.char_count,
            lines = lines.len(),
            "Page recognised"
        );
        Ok(PageRecord {
            page,
            image_file,
            ocr,
            lines,
        })
    }

    /// Load `path` and recognise it. An unreadable file gives an empty,
    /// low-quality record rather than an error.
    pub fn recognize_file(&self, page: u32, path: &Path, cancel: &CancelToken) -> Result<PageRecord> {
        let image_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| page_file_name(page));
        match ImageProcessor::open(path) {
            Ok(processor) => self.recognize_page(page, processor.into_dynamic(), image_file, cancel),
            Err(err) => {
                cancel.check()?;
                warn!(page, error = %err, "Page image unreadable");
                Ok(PageRecord {
                    page,
                    image_file,
                    ocr: OcrResult::unreadable(self.base_mode, &self.gate),
                    lines: Vec::new(),
                })
            }
        }
    }
}

/// Runs the book stages on a shared worker pool.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    engine: Arc<dyn OcrEngine>,
    pool: WorkerPool,
    cancel: CancelToken,
    progress: Arc<dyn Progress>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, engine: Arc<dyn OcrEngine>) -> Self {
        let pool = WorkerPool::new(config.worker_count());
        Self {
            config: Arc::new(config),
            engine,
            pool,
            cancel: CancelToken::new(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token that cancels this pipeline's running stage.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // -- Split ----------------------------------------------------------------

    /// Detect layouts in `source` and write logical pages to `dir` as
    /// `page_NNN.jpg`, numbered contiguously in scan order.
    ///
    /// Existing page images in `dir` are removed first. Scans that cannot be
    /// read are logged and skipped. On cancellation every submitted scan is
    /// waited for and its staged pieces are deleted.
    #[instrument(skip_all, fields(scans = source.len(), dir = %dir.display()))]
    pub async fn split_to_dir(&self, source: &ScanSource, dir: &Path) -> Result<SplitSummary> {
        std::fs::create_dir_all(dir)?;
        clear_split_dir(dir)?;

        let detector = Arc::new(LayoutDetector::from_config(&self.config));
        let total = source.len();
        let mut summary = SplitSummary::default();
        self.progress.begin(Stage::Split, total);
        info!(scans = total, workers = self.pool.size(), "Split stage started");

        let mut jobs = Vec::with_capacity(total);
        for index in (1..).take(total) {
            if self.cancel.is_cancelled() {
                break;
            }
            let image = match source.load(index) {
                Ok(image) => image,
                Err(err) => {
                    warn!(index, error = %err, "Scan unreadable; skipping");
                    summary.failed_scans.push(index);
                    self.progress.advance(Stage::Split);
                    continue;
                }
            };

            let detector = detector.clone();
            let staging = dir.to_path_buf();
            let progress = self.progress.clone();
            let job = self
                .pool
                .submit(move || {
                    let staged = stage_scan(&detector, index, image, &staging);
                    progress.advance(Stage::Split);
                    staged
                })
                .await?;
            jobs.push((index, job));
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (index, job) in jobs {
            outcomes.push((index, job.join().await));
        }
        if self.cancel.is_cancelled() {
            for (_, outcome) in &outcomes {
                if let Ok(Ok((_, staged))) = outcome {
                    remove_staged(staged);
                }
            }
            self.progress.finish(Stage::Split);
            warn!(dir = %dir.display(), "Split stage cancelled");
            return Err(OcrmdError::Cancelled);
        }

        for (index, outcome) in outcomes {
            match outcome? {
                Ok((decision, staged)) => {
                    summary.decisions.push(decision);
                    for path in staged {
                        let dest = dir.join(page_file_name(summary.pages.len() as u32 + 1));
                        std::fs::rename(&path, &dest)?;
                        summary.pages.push(dest);
                    }
                }
                Err(err) => {
                    warn!(index, error = %err, "Scan could not be split; skipping");
                    summary.failed_scans.push(index);
                }
            }
        }
        summary.failed_scans.sort_unstable();

        self.progress.finish(Stage::Split);
        info!(
            pages = summary.pages.len(),
            failed = summary.failed_scans.len(),
            "Split stage finished"
        );
        Ok(summary)
    }

    /// Split stage into a book workspace.
    pub async fn run_split(&self, workspace: &BookWorkspace) -> Result<SplitSummary> {
        workspace.create()?;
        let source = ScanSource::open(&self.config.source)?;
        self.split_to_dir(&source, &workspace.split_dir()).await
    }

    // -- OCR ------------------------------------------------------------------

    /// Recognise `pages` (page number, image path), returning records in the
    /// order given.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub async fn recognize_files(&self, pages: Vec<(u32, PathBuf)>) -> Result<Vec<PageRecord>> {
        let recognizer = Arc::new(Recognizer::from_config(&self.config, self.engine.clone()));
        self.progress.begin(Stage::Ocr, pages.len());
        info!(
            pages = pages.len(),
            workers = self.pool.size(),
            lang = %self.config.lang,
            "OCR stage started"
        );

        let mut jobs = Vec::with_capacity(pages.len());
        for (page, path) in pages {
            if self.cancel.is_cancelled() {
                break;
            }
            let recognizer = recognizer.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            let job = self
                .pool
                .submit(move || {
                    let record = recognizer.recognize_file(page, &path, &cancel);
                    progress.advance(Stage::Ocr);
                    record
                })
                .await?;
            jobs.push(job);
        }

        // Join everything before deciding, so no worker outlives the stage.
        let mut outcomes = Vec::with_capacity(jobs.len());
        for job in jobs {
            outcomes.push(job.join().await);
        }
        self.progress.finish(Stage::Ocr);
        if self.cancel.is_cancelled() {
            warn!("OCR stage cancelled");
            return Err(OcrmdError::Cancelled);
        }
        let records = outcomes
            .into_iter()
            .map(|outcome| outcome.and_then(|record| record))
            .collect::<Result<Vec<_>>>()?;

        let low = records.iter().filter(|r| r.ocr.low_quality).count();
        info!(pages = records.len(), low_quality = low, "OCR stage finished");
        Ok(records)
    }

    /// OCR stage over the workspace's split pages, optionally limited to
    /// `range`. Updates `pages.json` and rewrites the QA report.
    pub async fn run_ocr(
        &self,
        workspace: &BookWorkspace,
        range: Option<PageRange>,
    ) -> Result<Vec<PageRecord>> {
        let selected: Vec<(u32, PathBuf)> = workspace
            .split_pages()?
            .into_iter()
            .filter(|(page, _)| range.is_none_or(|r| r.contains(*page)))
            .collect();
        if selected.is_empty() {
            return Err(OcrmdError::PageRange(match range {
                Some(r) => format!("no split pages in range {r}"),
                None => "no split pages to recognise".to_string(),
            }));
        }

        let records = self.recognize_files(selected).await?;
        let merged = workspace.merge_records(records.clone())?;
        let rows: Vec<QaRow> = merged
            .iter()
            .map(|r| QaRow::from_record(r, &self.config))
            .collect();
        write_report(&rows, workspace.qa_report())?;
        Ok(records)
    }

    // -- Markdown -------------------------------------------------------------

    /// Build the book's Markdown from `pages.json`.
    pub fn run_markdown(&self, workspace: &BookWorkspace) -> Result<PathBuf> {
        let records = workspace.load_records()?;
        if records.is_empty() {
            return Err(OcrmdError::Config(format!(
                "{} has no page records; run the ocr stage first",
                workspace.pages_json().display()
            )));
        }
        let path = workspace.markdown();
        MarkdownBuilder::new(&self.config).write(&records, &path)?;
        Ok(path)
    }

    /// Split, recognise every page, and write the Markdown.
    pub async fn run_all(&self, workspace: &BookWorkspace) -> Result<PathBuf> {
        self.run_split(workspace).await?;
        self.run_ocr(workspace, None).await?;
        self.run_markdown(workspace)
    }
}

/// Split one scan and write its pieces under staging names.
fn stage_scan(
    detector: &LayoutDetector,
    index: u32,
    image: DynamicImage,
    dir: &Path,
) -> Result<(LayoutDecision, Vec<PathBuf>)> {
    let (decision, pieces) = detector.segment(index, image);
    let mut staged = Vec::with_capacity(pieces.len());
    for (k, piece) in pieces.into_iter().enumerate() {
        let path = dir.join(format!("{STAGING_PREFIX}{index:05}_{k}.jpg"));
        ImageProcessor::from_dynamic(piece).save_jpeg(&path, SPLIT_JPEG_QUALITY)?;
        staged.push(path);
    }
    Ok((decision, staged))
}

/// Delete staging files of a split that will not be committed.
fn remove_staged(staged: &[PathBuf]) {
    for path in staged {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "Cannot remove staged page");
        }
    }
}

/// Remove page images and staging files left by an earlier run.
fn clear_split_dir(dir: &Path) -> Result<()> {
    for path in list_images(dir)? {
        let stale = path.file_name().is_some_and(|n| {
            let name = n.to_string_lossy();
            name.starts_with("page_") || name.starts_with(STAGING_PREFIX)
        });
        if stale {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
