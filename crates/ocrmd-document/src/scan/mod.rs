// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline: normalization, page-split detection, multi-mode OCR
// consensus, and heading inference.

pub mod consensus;
pub mod enhance;
pub mod layout;
pub mod ocr;
pub mod structure;

pub use consensus::OcrConsensus;
pub use enhance::ScanEnhancer;
pub use layout::LayoutDetector;
pub use ocr::{OcrEngine, TesseractEngine};
pub use structure::StructureInferencer;
