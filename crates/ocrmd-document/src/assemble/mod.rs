// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembly: Markdown output and the per-page QA report.

pub mod markdown;
pub mod qa;

pub use markdown::MarkdownBuilder;
pub use qa::QaRow;
