// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress reporting hooks.

use std::fmt;

/// Pipeline stage being reported on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Split,
    Ocr,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Split => "split",
            Self::Ocr => "ocr",
        })
    }
}

/// Receives progress events. Called from worker threads.
pub trait Progress: Send + Sync {
    fn begin(&self, _stage: Stage, _total: usize) {}
    fn advance(&self, _stage: Stage) {}
    fn finish(&self, _stage: Stage) {}
}

/// Discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}
