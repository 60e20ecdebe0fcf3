// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration, loaded from YAML and validated once at startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{OcrmdError, Result};
use crate::types::{QualityGate, SegmentationMode, SplitRule};

/// Image normalization profile applied to each logical page before OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeProfile {
    /// Grayscale, unsharp mask, autocontrast.
    #[default]
    #[serde(alias = "pil_gray")]
    Gray,
    /// `Gray` followed by a global Otsu threshold.
    #[serde(alias = "pil_bin")]
    Binary,
    /// Histogram equalisation, adaptive threshold, small-angle deskew.
    #[serde(alias = "opencv")]
    Adaptive,
}

impl std::str::FromStr for NormalizeProfile {
    type Err = OcrmdError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gray" | "pil_gray" => Ok(Self::Gray),
            "binary" | "pil_bin" => Ok(Self::Binary),
            "adaptive" | "opencv" => Ok(Self::Adaptive),
            other => Err(OcrmdError::Config(format!(
                "unknown preprocess profile: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for NormalizeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Gray => "gray",
            Self::Binary => "binary",
            Self::Adaptive => "adaptive",
        })
    }
}

/// When the Markdown output embeds the page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedPolicy {
    /// The first page and every low-quality page.
    #[default]
    Auto,
    All,
    None,
}

/// How heading candidates are mapped onto tiers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeadingStrategy {
    /// The vertically first candidate becomes H1 (near the top of the page)
    /// or H2; every other candidate becomes H3.
    #[default]
    RankZero,
    /// Tier by height relative to the median: `>= h1_ratio` is H1,
    /// `>= h2_ratio` is H2, any other candidate is H3.
    HeightBands { h1_ratio: f32, h2_ratio: f32 },
}

/// Tunables for the gutter heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutParams {
    /// Width (taps) of the Gaussian used to smooth the column profile. Odd.
    pub smoothing_kernel: usize,
    /// Columns below `median * threshold_ratio` are gutter candidates.
    pub threshold_ratio: f32,
    /// Maximum column gap between members of one gutter group.
    pub cluster_gap: usize,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            smoothing_kernel: 51,
            threshold_ratio: 0.6,
            cluster_gap: 5,
        }
    }
}

/// Tunables for heading inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingParams {
    /// A line is a heading candidate when `height >= candidate_ratio * median`.
    pub candidate_ratio: f32,
    /// Fraction of the page height counted as "near the top" for H1.
    pub top_band: f32,
    pub strategy: HeadingStrategy,
}

impl Default for HeadingParams {
    fn default() -> Self {
        Self {
            candidate_ratio: 1.4,
            top_band: 0.3,
            strategy: HeadingStrategy::RankZero,
        }
    }
}

fn default_lang() -> String {
    "eng".to_string()
}

fn default_dpi() -> u32 {
    400
}

fn default_psm() -> SegmentationMode {
    SegmentationMode(6)
}

fn default_fallback_modes() -> Vec<SegmentationMode> {
    vec![SegmentationMode(6), SegmentationMode(3), SegmentationMode(4)]
}

fn default_crop_pct() -> f32 {
    0.05
}

fn default_low_conf() -> f32 {
    50.0
}

fn default_min_chars() -> usize {
    100
}

fn default_tesseract_cmd() -> PathBuf {
    PathBuf::from("tesseract")
}

/// Full pipeline configuration.
///
/// Field names match the YAML keys. Everything except `book_title` and
/// `source` has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub book_title: String,
    /// PDF file or directory of scan images.
    #[serde(alias = "pdf_file")]
    pub source: PathBuf,
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Rendering resolution of the scans; recorded in the output front matter.
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default)]
    pub preprocess: NormalizeProfile,
    /// Base segmentation mode, tried first.
    #[serde(default = "default_psm")]
    pub tess_psm: SegmentationMode,
    /// Modes tried after the base mode (duplicates are skipped).
    #[serde(default = "default_fallback_modes")]
    pub fallback_modes: Vec<SegmentationMode>,
    #[serde(default)]
    pub embed_images: EmbedPolicy,
    /// Fraction trimmed from every edge before splitting.
    #[serde(default = "default_crop_pct")]
    pub crop_pct: f32,
    #[serde(default = "default_low_conf")]
    pub low_conf: f32,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    #[serde(default)]
    pub split_strategy: Vec<SplitRule>,
    #[serde(default)]
    pub layout: LayoutParams,
    #[serde(default)]
    pub headings: HeadingParams,
    /// Worker pool size; defaults to the number of CPU cores.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: PathBuf,
}

impl PipelineConfig {
    /// Minimal configuration with defaults for everything optional.
    pub fn new(book_title: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            book_title: book_title.into(),
            source: source.into(),
            lang: default_lang(),
            dpi: default_dpi(),
            preprocess: NormalizeProfile::default(),
            tess_psm: default_psm(),
            fallback_modes: default_fallback_modes(),
            embed_images: EmbedPolicy::default(),
            crop_pct: default_crop_pct(),
            low_conf: default_low_conf(),
            min_chars: default_min_chars(),
            split_strategy: Vec::new(),
            layout: LayoutParams::default(),
            headings: HeadingParams::default(),
            workers: None,
            tesseract_cmd: default_tesseract_cmd(),
        }
    }

    /// Read, parse, and validate a YAML configuration file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        debug!(
            title = %config.book_title,
            rules = config.split_strategy.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !self.tess_psm.is_valid() {
            return Err(OcrmdError::Config(format!(
                "tess_psm must be between 0 and {} inclusive, got {}",
                SegmentationMode::MAX,
                self.tess_psm
            )));
        }
        if let Some(mode) = self.fallback_modes.iter().find(|m| !m.is_valid()) {
            return Err(OcrmdError::Config(format!(
                "fallback mode {mode} is outside 0..={}",
                SegmentationMode::MAX
            )));
        }
        if !self.crop_pct.is_finite() || !(0.0..0.5).contains(&self.crop_pct) {
            return Err(OcrmdError::Config(format!(
                "crop_pct must be in [0, 0.5), got {}",
                self.crop_pct
            )));
        }
        if !(0.0..=100.0).contains(&self.low_conf) {
            return Err(OcrmdError::Config(format!(
                "low_conf must be in [0, 100], got {}",
                self.low_conf
            )));
        }
        if self.workers == Some(0) {
            return Err(OcrmdError::Config("workers must be at least 1".into()));
        }
        if self.layout.smoothing_kernel % 2 == 0 {
            return Err(OcrmdError::Config(format!(
                "layout.smoothing_kernel must be odd, got {}",
                self.layout.smoothing_kernel
            )));
        }
        if self.headings.candidate_ratio <= 0.0 || !(0.0..=1.0).contains(&self.headings.top_band) {
            return Err(OcrmdError::Config(
                "headings.candidate_ratio must be positive and headings.top_band in [0, 1]".into(),
            ));
        }
        if let HeadingStrategy::HeightBands { h1_ratio, h2_ratio } = self.headings.strategy {
            if h1_ratio < h2_ratio {
                return Err(OcrmdError::Config(format!(
                    "height_bands requires h1_ratio >= h2_ratio, got {h1_ratio} < {h2_ratio}"
                )));
            }
        }
        Ok(())
    }

    /// Quality thresholds as a value type.
    pub fn quality_gate(&self) -> QualityGate {
        QualityGate {
            low_conf: self.low_conf,
            min_chars: self.min_chars,
        }
    }

    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Directory-safe name derived from the book title (or the source stem).
    pub fn slug(&self) -> String {
        let base = if self.book_title.trim().is_empty() {
            self.source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            self.book_title.clone()
        };
        slugify(&base)
    }
}

/// Lowercase, spaces to underscores, drop everything outside `[a-z0-9_]`.
pub fn slugify(name: &str) -> String {
    let slug: String = name
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect();
    if slug.is_empty() {
        "document".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LayoutType, PageRange};

    const SAMPLE: &str = r#"
book_title: Test Book
pdf_file: input/test.pdf
lang: eng
dpi: 300
preprocess: pil_bin
tess_psm: 4
embed_images: auto
crop_pct: 0.1
low_conf: 40
min_chars: 80
split_strategy:
  - page: 1
    type: single
  - page: 2-4
    type: double
"#;

    #[test]
    fn loads_sample_yaml() {
        let cfg = PipelineConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.book_title, "Test Book");
        assert_eq!(cfg.source, PathBuf::from("input/test.pdf"));
        assert_eq!(cfg.preprocess, NormalizeProfile::Binary);
        assert_eq!(cfg.tess_psm, SegmentationMode(4));
        assert!((cfg.crop_pct - 0.1).abs() < 1e-6);
        assert_eq!(cfg.split_strategy.len(), 2);
        assert_eq!(cfg.split_strategy[1].page, PageRange::new(2, 4).unwrap());
        assert_eq!(cfg.split_strategy[1].layout, LayoutType::Double);
        // untouched keys keep their defaults
        assert_eq!(cfg.fallback_modes, default_fallback_modes());
        assert_eq!(cfg.layout, LayoutParams::default());
        assert_eq!(cfg.headings.strategy, HeadingStrategy::RankZero);
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.min_chars, 80);
    }

    #[test]
    fn rejects_out_of_range_mode() {
        let yaml = "book_title: x\nsource: a.pdf\ntess_psm: 14\n";
        assert!(matches!(
            PipelineConfig::from_yaml(yaml),
            Err(OcrmdError::Config(_))
        ));
    }

    #[test]
    fn rejects_bad_split_type_and_range() {
        let bad_type = "book_title: x\nsource: a.pdf\nsplit_strategy:\n  - page: 1\n    type: triple\n";
        assert!(PipelineConfig::from_yaml(bad_type).is_err());
        let bad_range = "book_title: x\nsource: a.pdf\nsplit_strategy:\n  - page: 5-2\n    type: double\n";
        assert!(PipelineConfig::from_yaml(bad_range).is_err());
    }

    #[test]
    fn rejects_crop_that_would_consume_the_page() {
        let mut cfg = PipelineConfig::new("x", "a.pdf");
        cfg.crop_pct = 0.5;
        assert!(cfg.validate().is_err());
        cfg.crop_pct = -0.1;
        assert!(cfg.validate().is_err());
        cfg.crop_pct = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_height_bands_strategy() {
        let yaml = "book_title: x\nsource: a.pdf\nheadings:\n  strategy:\n    kind: height_bands\n    h1_ratio: 2.2\n    h2_ratio: 1.7\n";
        let cfg = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(
            cfg.headings.strategy,
            HeadingStrategy::HeightBands {
                h1_ratio: 2.2,
                h2_ratio: 1.7
            }
        );
        assert!((cfg.headings.candidate_ratio - 1.4).abs() < 1e-6);
    }

    #[test]
    fn slug_drops_punctuation() {
        assert_eq!(slugify("Families in Crisis!"), "families_in_crisis");
        assert_eq!(slugify("  ***  "), "document");
        let cfg = PipelineConfig::new("", "scans/Vol 2.pdf");
        assert_eq!(cfg.slug(), "vol_2");
    }

    #[test]
    fn worker_count_is_never_zero() {
        let mut cfg = PipelineConfig::new("x", "a.pdf");
        assert!(cfg.worker_count() >= 1);
        cfg.workers = Some(3);
        assert_eq!(cfg.worker_count(), 3);
    }
}
