// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Terminal progress bars for the split and OCR stages.

use std::collections::HashMap;
use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressStyle};
use ocrmd_pipeline::progress::{Progress, Stage};

const TEMPLATE: &str = "{prefix:>5} [{bar:40.cyan/blue}] {pos}/{len} pages ({elapsed}, eta {eta})";

/// One bar per running stage.
#[derive(Default)]
pub struct BarProgress {
    bars: Mutex<HashMap<Stage, ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, stage: Stage, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&stage) {
                f(bar);
            }
        }
    }
}

impl Progress for BarProgress {
    fn begin(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(total as u64).with_style(style);
        bar.set_prefix(stage.to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(stage, bar);
        }
    }

    fn advance(&self, stage: Stage) {
        self.with_bar(stage, |bar| bar.inc(1));
    }

    fn finish(&self, stage: Stage) {
        let removed = self.bars.lock().ok().and_then(|mut bars| bars.remove(&stage));
        if let Some(bar) = removed {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_bars_per_stage() {
        let progress = BarProgress::new();
        progress.begin(Stage::Split, 3);
        progress.begin(Stage::Ocr, 5);
        progress.advance(Stage::Split);
        progress.advance(Stage::Split);

        let position = |stage| progress.bars.lock().unwrap().get(&stage).map(|b| b.position());
        assert_eq!(position(Stage::Split), Some(2));
        assert_eq!(position(Stage::Ocr), Some(0));

        progress.finish(Stage::Split);
        assert_eq!(position(Stage::Split), None);
        // Events for a stage without a bar are ignored.
        progress.advance(Stage::Split);
    }
}
