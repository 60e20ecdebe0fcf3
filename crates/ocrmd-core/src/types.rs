// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the ocrmd pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::OcrmdError;

/// How many logical pages one physical scan carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    /// One logical page per scan (no split).
    Single,
    /// Two facing pages side by side.
    Double,
    /// Four pages laid out in a 2x2 grid.
    Quadruple,
}

impl LayoutType {
    /// Number of logical pages produced by splitting a scan of this layout.
    pub fn page_count(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => 2,
            Self::Quadruple => 4,
        }
    }
}

impl fmt::Display for LayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Quadruple => "quadruple",
        })
    }
}

/// Inclusive, 1-based page range. A singleton range has `start == end`.
///
/// In YAML a range is written either as a bare integer (`7`) or as a
/// `"START-END"` string (`"2-300"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PageRangeRepr", into = "PageRangeRepr")]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    /// Build a range, rejecting zero-based or inverted bounds.
    pub fn new(start: u32, end: u32) -> Result<Self, OcrmdError> {
        if start == 0 || end < start {
            return Err(OcrmdError::PageRange(format!("{start}-{end}")));
        }
        Ok(Self { start, end })
    }

    /// A range covering exactly one page.
    pub fn single(page: u32) -> Result<Self, OcrmdError> {
        Self::new(page, page)
    }

    pub fn contains(&self, page: u32) -> bool {
        (self.start..=self.end).contains(&page)
    }
}

impl FromStr for PageRange {
    type Err = OcrmdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| OcrmdError::PageRange(s.to_string()))
        };
        match trimmed.split_once('-') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?)
                .map_err(|_| OcrmdError::PageRange(s.to_string())),
            None => Self::single(parse(trimmed)?).map_err(|_| OcrmdError::PageRange(s.to_string())),
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Wire form of [`PageRange`]: an integer or a range string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PageRangeRepr {
    Page(u32),
    Text(String),
}

impl TryFrom<PageRangeRepr> for PageRange {
    type Error = OcrmdError;

    fn try_from(repr: PageRangeRepr) -> Result<Self, Self::Error> {
        match repr {
            PageRangeRepr::Page(page) => Self::single(page),
            PageRangeRepr::Text(text) => text.parse(),
        }
    }
}

impl From<PageRange> for PageRangeRepr {
    fn from(range: PageRange) -> Self {
        if range.start == range.end {
            Self::Page(range.start)
        } else {
            Self::Text(range.to_string())
        }
    }
}

/// Explicit layout override for a range of physical scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    pub page: PageRange,
    #[serde(rename = "type")]
    pub layout: LayoutType,
}

/// Where a layout decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutSource {
    /// A configured [`SplitRule`] matched the page index.
    Override,
    /// The projection-profile heuristic decided.
    Heuristic,
}

/// Layout chosen for one physical scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDecision {
    /// 1-based index of the physical scan.
    pub page_index: u32,
    pub layout: LayoutType,
    pub source: LayoutSource,
}

/// OCR page segmentation mode (Tesseract PSM, 0..=13).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentationMode(pub u8);

impl SegmentationMode {
    /// Highest mode number the engine accepts.
    pub const MAX: u8 = 13;

    pub fn is_valid(&self) -> bool {
        self.0 <= Self::MAX
    }
}

impl fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Axis-aligned pixel rectangle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.top.saturating_add(self.height)
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(left, top, right - left, bottom - top)
    }
}

/// One recognised word as reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub text: String,
    pub bbox: PixelBox,
    /// Confidence in [0, 100]. `None` when the engine reports no text region.
    pub confidence: Option<f32>,
    /// Engine-assigned line identity; words sharing it belong to one line.
    pub line_index: u32,
}

/// Raw output of one engine run: plain text plus word geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub text: String,
    pub words: Vec<WordRecord>,
}

/// Mean of the non-sentinel confidences, or 0.0 when none qualify.
pub fn mean_confidence<'a>(words: impl IntoIterator<Item = &'a WordRecord>) -> f32 {
    let (sum, count) = words
        .into_iter()
        .filter_map(|w| w.confidence)
        .fold((0.0f64, 0usize), |(sum, count), c| (sum + c as f64, count + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Character count used for quality gating: newlines removed, then trimmed.
pub fn count_chars(text: &str) -> usize {
    text.replace('\n', "").trim().chars().count()
}

/// Result of running one segmentation mode on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCandidate {
    pub mode: SegmentationMode,
    pub text: String,
    pub avg_conf: f32,
    pub char_count: usize,
    pub words: Vec<WordRecord>,
}

impl OcrCandidate {
    /// Derive confidence and character count from an engine recognition.
    pub fn from_recognition(mode: SegmentationMode, recognition: Recognition) -> Self {
        let avg_conf = mean_confidence(&recognition.words);
        let char_count = count_chars(&recognition.text);
        Self {
            mode,
            text: recognition.text,
            avg_conf,
            char_count,
            words: recognition.words,
        }
    }
}

/// Thresholds deciding whether a page's text can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    pub low_conf: f32,
    pub min_chars: usize,
}

impl QualityGate {
    /// Strict inequalities: values exactly at a threshold pass.
    pub fn is_low_quality(&self, avg_conf: f32, char_count: usize) -> bool {
        avg_conf < self.low_conf || char_count < self.min_chars
    }
}

/// Selected OCR output for one logical page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    pub avg_conf: f32,
    pub used_mode: SegmentationMode,
    pub char_count: usize,
    pub low_quality: bool,
    #[serde(skip)]
    pub words: Vec<WordRecord>,
}

impl OcrResult {
    pub fn from_candidate(candidate: OcrCandidate, gate: &QualityGate) -> Self {
        let low_quality = gate.is_low_quality(candidate.avg_conf, candidate.char_count);
        Self {
            text: candidate.text,
            avg_conf: candidate.avg_conf,
            used_mode: candidate.mode,
            char_count: candidate.char_count,
            low_quality,
            words: candidate.words,
        }
    }

    /// Result reported when every candidate mode failed: empty, zero
    /// confidence, attributed to the base mode.
    pub fn unreadable(base_mode: SegmentationMode, gate: &QualityGate) -> Self {
        Self {
            text: String::new(),
            avg_conf: 0.0,
            used_mode: base_mode,
            char_count: 0,
            low_quality: gate.is_low_quality(0.0, 0),
            words: Vec::new(),
        }
    }
}

/// A text line assembled from word records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInfo {
    pub text: String,
    /// Union of the word boxes.
    pub bbox: PixelBox,
    /// Mean word height, used as the font-size proxy.
    pub height: f32,
    pub confidence: f32,
}

/// Structural role of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeadingTag {
    H1,
    H2,
    H3,
    P,
}

impl HeadingTag {
    /// Markdown prefix for this tag (empty for paragraphs).
    pub fn markdown_prefix(&self) -> &'static str {
        match self {
            Self::H1 => "# ",
            Self::H2 => "## ",
            Self::H3 => "### ",
            Self::P => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedLine {
    pub tag: HeadingTag,
    pub text: String,
}

impl TaggedLine {
    pub fn new(tag: HeadingTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }
}

/// Everything produced for one logical page; one entry of `pages.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-based logical page number, contiguous across the book.
    pub page: u32,
    /// File name of the split page image inside the split-pages directory.
    pub image_file: String,
    pub ocr: OcrResult,
    pub lines: Vec<TaggedLine>,
}

/// Conventional file name of a split page image.
pub fn page_file_name(page: u32) -> String {
    format!("page_{page:03}.jpg")
}

/// Shared cancellation flag, checked between units of work.
///
/// Clones observe the same flag. Cancellation is cooperative: work already
/// handed to the OCR engine finishes, the next step is not started.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called.
    pub fn check(&self) -> Result<(), OcrmdError> {
        if self.is_cancelled() {
            Err(OcrmdError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(OcrmdError::Cancelled)));
    }

    fn word(text: &str, confidence: Option<f32>) -> WordRecord {
        WordRecord {
            text: text.to_string(),
            bbox: PixelBox::new(0, 0, 10, 10),
            confidence,
            line_index: 0,
        }
    }

    #[test]
    fn page_range_parses_singletons_and_ranges() {
        assert_eq!("7".parse::<PageRange>().unwrap(), PageRange { start: 7, end: 7 });
        assert_eq!(
            " 2 - 300 ".parse::<PageRange>().unwrap(),
            PageRange { start: 2, end: 300 }
        );
        assert!("0".parse::<PageRange>().is_err());
        assert!("9-3".parse::<PageRange>().is_err());
        assert!("abc".parse::<PageRange>().is_err());
    }

    #[test]
    fn page_range_contains_is_inclusive() {
        let range = PageRange::new(2, 4).unwrap();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn split_rule_deserializes_both_page_forms() {
        let rules: Vec<SplitRule> =
            serde_json::from_str(r#"[{"page": 1, "type": "single"}, {"page": "2-4", "type": "quadruple"}]"#)
                .unwrap();
        assert_eq!(rules[0].page, PageRange::single(1).unwrap());
        assert_eq!(rules[0].layout, LayoutType::Single);
        assert_eq!(rules[1].page, PageRange::new(2, 4).unwrap());
        assert_eq!(rules[1].layout, LayoutType::Quadruple);

        let json = serde_json::to_string(&rules[1]).unwrap();
        assert_eq!(json, r#"{"page":"2-4","type":"quadruple"}"#);
    }

    #[test]
    fn mean_confidence_ignores_sentinels() {
        let words = vec![word("a", Some(80.0)), word("", None), word("b", Some(60.0))];
        assert!((mean_confidence(&words) - 70.0).abs() < 1e-4);
        assert_eq!(mean_confidence(&[word("", None)]), 0.0);
        assert_eq!(mean_confidence(&[]), 0.0);
    }

    #[test]
    fn count_chars_strips_newlines_then_trims() {
        assert_eq!(count_chars("  ab\ncd \n"), 4);
        assert_eq!(count_chars("\n\n"), 0);
        assert_eq!(count_chars("ăîș"), 3);
    }

    #[test]
    fn quality_gate_uses_strict_inequality() {
        let gate = QualityGate {
            low_conf: 50.0,
            min_chars: 100,
        };
        assert!(!gate.is_low_quality(50.0, 100));
        assert!(gate.is_low_quality(49.9, 100));
        assert!(gate.is_low_quality(90.0, 99));
    }

    #[test]
    fn unreadable_result_is_empty_and_low_quality() {
        let gate = QualityGate {
            low_conf: 50.0,
            min_chars: 100,
        };
        let result = OcrResult::unreadable(SegmentationMode(4), &gate);
        assert_eq!(result.text, "");
        assert_eq!(result.char_count, 0);
        assert_eq!(result.avg_conf, 0.0);
        assert_eq!(result.used_mode, SegmentationMode(4));
        assert!(result.low_quality);
    }

    #[test]
    fn page_file_names_are_zero_padded() {
        assert_eq!(page_file_name(7), "page_007.jpg");
        assert_eq!(page_file_name(1234), "page_1234.jpg");
    }

    #[test]
    fn page_record_json_omits_word_geometry() {
        let record = PageRecord {
            page: 3,
            image_file: page_file_name(3),
            ocr: OcrResult {
                text: "hi".into(),
                avg_conf: 91.0,
                used_mode: SegmentationMode(6),
                char_count: 2,
                low_quality: true,
                words: vec![word("hi", Some(91.0))],
            },
            lines: vec![TaggedLine::new(HeadingTag::H1, "hi")],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["ocr"].get("words").is_none());
        assert_eq!(json["lines"][0]["tag"], "H1");

        let back: PageRecord = serde_json::from_value(json).unwrap();
        assert!(back.ocr.words.is_empty());
        assert_eq!(back.lines, record.lines);
    }

    #[test]
    fn pixel_box_union_covers_both() {
        let a = PixelBox::new(10, 20, 30, 10);
        let b = PixelBox::new(5, 25, 10, 20);
        assert_eq!(a.union(&b), PixelBox::new(5, 20, 35, 25));
    }
}
