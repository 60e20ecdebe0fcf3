// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Markdown assembly: one document per book, one section per logical page.

use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ocrmd_core::config::{EmbedPolicy, PipelineConfig};
use ocrmd_core::error::OcrmdError;
use ocrmd_core::types::PageRecord;
use tracing::{info, instrument};

/// Whether a page's image goes into the document.
///
/// `Auto` embeds the first page (usually the cover) and every page whose
/// text failed the quality gate.
pub fn should_embed(policy: EmbedPolicy, page: u32, low_quality: bool) -> bool {
    match policy {
        EmbedPolicy::All => true,
        EmbedPolicy::None => false,
        EmbedPolicy::Auto => page == 1 || low_quality,
    }
}

/// Tidy raw OCR text for direct inclusion: join words hyphenated across line
/// breaks, trim every line, drop blank lines.
pub fn clean_text(text: &str) -> String {
    text.replace("-\n", "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Image links are relative to `<book>/markdown/`.
const IMAGE_PREFIX: &str = "../split_pages/";

/// Builds the Markdown text of a book from its page records.
pub struct MarkdownBuilder<'a> {
    config: &'a PipelineConfig,
    generated: DateTime<Utc>,
}

impl<'a> MarkdownBuilder<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            generated: Utc::now(),
        }
    }

    pub fn generated_at(mut self, when: DateTime<Utc>) -> Self {
        self.generated = when;
        self
    }

    pub fn render(&self, pages: &[PageRecord]) -> String {
        let cfg = self.config;
        let mut out = String::new();

        let _ = writeln!(out, "# {}\n", cfg.book_title);
        let _ = writeln!(out, "**Language:** {}  ", cfg.lang);
        let _ = writeln!(out, "**DPI:** {}  ", cfg.dpi);
        let _ = writeln!(out, "**PSM:** {}  ", cfg.tess_psm);
        let _ = writeln!(out, "**Preprocess:** {}  ", cfg.preprocess);
        let _ = writeln!(
            out,
            "**Generated:** {}  ",
            self.generated.to_rfc3339_opts(SecondsFormat::Secs, true)
        );

        for record in pages {
            let _ = writeln!(out, "\n## Page {}\n", record.page);

            if should_embed(cfg.embed_images, record.page, record.ocr.low_quality) {
                let _ = writeln!(
                    out,
                    "![page {}]({}{})\n",
                    record.page, IMAGE_PREFIX, record.image_file
                );
            }

            if record.lines.is_empty() {
                let cleaned = clean_text(&record.ocr.text);
                if !cleaned.is_empty() {
                    let _ = writeln!(out, "{cleaned}\n");
                }
                continue;
            }

            for line in &record.lines {
                let _ = writeln!(out, "{}{}\n", line.tag.markdown_prefix(), line.text);
            }
        }

        out
    }

    /// Render and write to `path`, creating parent directories.
    #[instrument(skip(self, pages), fields(path = %path.as_ref().display(), pages = pages.len()))]
    pub fn write(&self, pages: &[PageRecord], path: impl AsRef<Path>) -> Result<(), OcrmdError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render(pages))?;
        info!("Markdown written");
        Ok(())
    }
}
