// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line arguments and how they override the YAML configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ocrmd_core::config::{NormalizeProfile, PipelineConfig};
use ocrmd_core::types::{PageRange, SegmentationMode};

#[derive(Debug, Parser)]
#[command(
    name = "ocrmd",
    version,
    about = "Turn a scanned book into structured Markdown"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// YAML book configuration.
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Root directory for per-book outputs.
    #[arg(short = 'o', long, global = true, default_value = "output")]
    pub output_dir: PathBuf,

    /// First logical page to recognise (1-based).
    #[arg(long, global = true)]
    pub start: Option<u32>,

    /// Last logical page to recognise (inclusive).
    #[arg(long, global = true)]
    pub end: Option<u32>,

    /// Base Tesseract page segmentation mode.
    #[arg(long, global = true, value_parser = clap::value_parser!(u8).range(0..=13))]
    pub tess_psm: Option<u8>,

    /// Normalization profile: gray, binary or adaptive.
    #[arg(long, global = true)]
    pub preprocess: Option<NormalizeProfile>,

    /// Margin fraction trimmed from each edge before splitting.
    #[arg(long, global = true)]
    pub crop_pct: Option<f32>,

    /// Worker pool size.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Warnings only, no progress bars.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Detect page layouts and write split page images.
    Split,
    /// Recognise split pages; writes pages.json and the QA report.
    Ocr,
    /// Build the Markdown document from recognised pages.
    Md,
    /// Split, recognise, and build the Markdown.
    All,
}

impl Cli {
    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Page range from `--start`/`--end`; a missing bound is open.
    pub fn page_range(&self) -> Result<Option<PageRange>> {
        if self.start.is_none() && self.end.is_none() {
            return Ok(None);
        }
        let range = PageRange::new(self.start.unwrap_or(1), self.end.unwrap_or(u32::MAX))
            .context("invalid --start/--end")?;
        Ok(Some(range))
    }

    /// Apply command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut PipelineConfig) {
        if let Some(mode) = self.tess_psm {
            config.tess_psm = SegmentationMode(mode);
        }
        if let Some(profile) = self.preprocess {
            config.preprocess = profile;
        }
        if let Some(pct) = self.crop_pct {
            config.crop_pct = pct;
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
    }

    /// Load the configuration file, apply overrides, and validate the result.
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(&self.config)
            .with_context(|| format!("cannot load {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        config
            .validate()
            .context("invalid configuration after command-line overrides")?;
        Ok(config)
    }
}
