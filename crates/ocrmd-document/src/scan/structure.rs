// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Heading inference from line geometry.

use std::collections::HashMap;
use std::sync::Arc;

use image::DynamicImage;
use ocrmd_core::config::{HeadingParams, HeadingStrategy};
use ocrmd_core::types::{
    HeadingTag, LineInfo, SegmentationMode, TaggedLine, WordRecord, mean_confidence,
};
use tracing::{debug, instrument, warn};

use super::layout::median;
use super::ocr::OcrEngine;

/// Assemble words into lines keyed by `line_index`, in order of first
/// appearance. Lines whose text is only whitespace are dropped.
pub fn group_lines(words: &[WordRecord]) -> Vec<LineInfo> {
    let mut order: Vec<Vec<&WordRecord>> = Vec::new();
    let mut slots: HashMap<u32, usize> = HashMap::new();
    for word in words {
        let slot = *slots.entry(word.line_index).or_insert_with(|| {
            order.push(Vec::new());
            order.len() - 1
        });
        order[slot].push(word);
    }

    order
        .into_iter()
        .filter_map(|members| {
            let text = members
                .iter()
                .map(|w| w.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                return None;
            }
            let bbox = members
                .iter()
                .skip(1)
                .fold(members[0].bbox, |acc, w| acc.union(&w.bbox));
            let height =
                members.iter().map(|w| w.bbox.height as f32).sum::<f32>() / members.len() as f32;
            Some(LineInfo {
                text,
                bbox,
                height,
                confidence: mean_confidence(members.iter().copied()),
            })
        })
        .collect()
}

/// Tag each line as a heading tier or paragraph. Output order equals input
/// order.
pub fn classify_lines(
    lines: &[LineInfo],
    page_height: u32,
    params: &HeadingParams,
) -> Vec<TaggedLine> {
    if lines.is_empty() {
        return Vec::new();
    }

    let heights: Vec<f64> = lines.iter().map(|l| l.height as f64).collect();
    let median_height = median(&heights);
    let cutoff = params.candidate_ratio as f64 * median_height;

    let mut tags = vec![HeadingTag::P; lines.len()];
    let mut candidates: Vec<usize> = (0..lines.len())
        .filter(|&i| heights[i] >= cutoff)
        .collect();
    // Stable: equal tops keep document order.
    candidates.sort_by_key(|&i| lines[i].bbox.top);

    match params.strategy {
        HeadingStrategy::RankZero => {
            let top_limit = params.top_band as f64 * page_height as f64;
            for (rank, &i) in candidates.iter().enumerate() {
                tags[i] = if rank > 0 {
                    HeadingTag::H3
                } else if (lines[i].bbox.top as f64) < top_limit {
                    HeadingTag::H1
                } else {
                    HeadingTag::H2
                };
            }
        }
        HeadingStrategy::HeightBands { h1_ratio, h2_ratio } => {
            for &i in &candidates {
                tags[i] = if heights[i] >= h1_ratio as f64 * median_height {
                    HeadingTag::H1
                } else if heights[i] >= h2_ratio as f64 * median_height {
                    HeadingTag::H2
                } else {
                    HeadingTag::H3
                };
            }
        }
    }

    debug!(
        lines = lines.len(),
        median_height,
        candidates = candidates.len(),
        "Lines classified"
    );

    lines
        .iter()
        .zip(tags)
        .map(|(line, tag)| TaggedLine::new(tag, line.text.clone()))
        .collect()
}

/// Runs one structured recognition and turns its geometry into tagged lines.
#[derive(Clone)]
pub struct StructureInferencer {
    engine: Arc<dyn OcrEngine>,
    params: HeadingParams,
}

impl StructureInferencer {
    pub fn new(engine: Arc<dyn OcrEngine>, params: HeadingParams) -> Self {
        Self { engine, params }
    }

    /// Recognise `image` in `base_mode` and classify its lines.
    ///
    /// An engine failure is logged and yields no lines.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn infer_structure(
        &self,
        image: &DynamicImage,
        language: &str,
        base_mode: SegmentationMode,
    ) -> Vec<TaggedLine> {
        match self.engine.recognize(image, language, base_mode) {
            Ok(recognition) => self.from_words(&recognition.words, image.height()),
            Err(err) => {
                warn!(%base_mode, error = %err, "Structure recognition failed");
                Vec::new()
            }
        }
    }

    /// Classify words already recognised in the base mode.
    pub fn from_words(&self, words: &[WordRecord], page_height: u32) -> Vec<TaggedLine> {
        classify_lines(&group_lines(words), page_height, &self.params)
    }
}
