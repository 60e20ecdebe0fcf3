// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Runs the requested stages for one book and reports what they produced.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ocrmd_core::config::PipelineConfig;
use ocrmd_core::types::PageRange;
use ocrmd_document::scan::ocr::{OcrEngine, TesseractEngine};
use ocrmd_pipeline::progress::{NoProgress, Progress};
use ocrmd_pipeline::{BookWorkspace, Pipeline};
use tracing::{info, warn};

use crate::cli::Command;
use crate::services::progress_bars::BarProgress;

/// One book's pipeline, bound to its output directory.
pub struct BookRunner {
    engine: Arc<TesseractEngine>,
    pipeline: Pipeline,
    workspace: BookWorkspace,
}

impl BookRunner {
    pub fn new(config: PipelineConfig, output_dir: &Path, quiet: bool) -> Self {
        let engine = Arc::new(TesseractEngine::new(config.tesseract_cmd.clone()));
        let workspace = BookWorkspace::new(output_dir, config.slug());
        let progress: Arc<dyn Progress> = if quiet {
            Arc::new(NoProgress)
        } else {
            Arc::new(BarProgress::new())
        };
        let shared: Arc<dyn OcrEngine> = engine.clone();
        let pipeline = Pipeline::new(config, shared).with_progress(progress);
        Self {
            engine,
            pipeline,
            workspace,
        }
    }

    pub fn workspace(&self) -> &BookWorkspace {
        &self.workspace
    }

    /// Cancel the running stage on Ctrl-C.
    pub fn cancel_on_interrupt(&self) {
        let token = self.pipeline.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing in-flight pages and stopping");
                token.cancel();
            }
        });
    }

    pub async fn run(&self, command: Command, range: Option<PageRange>) -> Result<()> {
        info!(
            book = %self.pipeline.config().book_title,
            output = %self.workspace.root().display(),
            stage = ?command,
            "Run started"
        );
        match command {
            Command::Split => self.split().await,
            Command::Ocr => self.ocr(range).await,
            Command::Md => self.markdown(),
            Command::All => {
                self.split().await?;
                self.ocr(range).await?;
                self.markdown()
            }
        }
    }

    async fn split(&self) -> Result<()> {
        let summary = self
            .pipeline
            .run_split(&self.workspace)
            .await
            .context("split stage failed")?;
        if !summary.failed_scans.is_empty() {
            warn!(scans = ?summary.failed_scans, "Some scans were skipped");
        }
        info!(
            scans = summary.decisions.len(),
            pages = summary.pages.len(),
            dir = %self.workspace.split_dir().display(),
            "Split pages written"
        );
        Ok(())
    }

    async fn ocr(&self, range: Option<PageRange>) -> Result<()> {
        let version = self.engine.version().with_context(|| {
            format!(
                "cannot run {}; is Tesseract installed?",
                self.engine.command().display()
            )
        })?;
        info!(%version, "OCR engine found");

        let records = self
            .pipeline
            .run_ocr(&self.workspace, range)
            .await
            .context("OCR stage failed")?;
        let low: Vec<u32> = records
            .iter()
            .filter(|r| r.ocr.low_quality)
            .map(|r| r.page)
            .collect();
        if !low.is_empty() {
            warn!(pages = ?low, "Pages below the quality gate");
        }
        info!(
            pages = records.len(),
            report = %self.workspace.qa_report().display(),
            "QA report written"
        );
        Ok(())
    }

    fn markdown(&self) -> Result<()> {
        let path = self
            .pipeline
            .run_markdown(&self.workspace)
            .context("Markdown stage failed")?;
        info!(path = %path.display(), "Markdown written");
        Ok(())
    }
}
