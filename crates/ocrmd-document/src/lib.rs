// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ocrmd-document: Scan handling for ocrmd.
//
// Provides scan sources (image directories and scanned PDFs), image
// processing (crop, margin trimming, normalization profiles), the layout
// detector, the OCR consensus engine, the structure inferencer, and Markdown
// and QA report assembly.

pub mod assemble;
pub mod image;
pub mod pdf;
pub mod scan;
pub mod source;

// Re-export the primary structs so callers can use `ocrmd_document::LayoutDetector` etc.
pub use assemble::MarkdownBuilder;
pub use image::processor::ImageProcessor;
pub use pdf::reader::PdfReader;
pub use scan::consensus::OcrConsensus;
pub use scan::enhance::ScanEnhancer;
pub use scan::layout::LayoutDetector;
pub use scan::ocr::{OcrEngine, TesseractEngine};
pub use scan::structure::StructureInferencer;
pub use source::ScanSource;
