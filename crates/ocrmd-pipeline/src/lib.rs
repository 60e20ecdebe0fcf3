// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ocrmd pipeline: the bounded worker pool, the per-book workspace layout, and
// the split / OCR / Markdown stages that tie the document crate together.

pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod workspace;

pub use pipeline::{Pipeline, Recognizer, SplitSummary};
pub use pool::WorkerPool;
pub use progress::{NoProgress, Progress, Stage};
pub use workspace::BookWorkspace;
