// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for ocrmd.

use thiserror::Error;

/// Top-level error type for all ocrmd operations.
#[derive(Debug, Error)]
pub enum OcrmdError {
    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid page range {0:?}: expected N or START-END (1-based)")]
    PageRange(String),

    // -- Input / document errors --
    #[error("unsupported scan source: {0}")]
    UnsupportedSource(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Recognition --
    #[error("OCR failed: {0}")]
    OcrError(String),

    #[error("processing cancelled")]
    Cancelled,

    #[error("page worker failed: {0}")]
    Worker(String),

    // -- Output / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV report error: {0}")]
    Csv(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OcrmdError>;
