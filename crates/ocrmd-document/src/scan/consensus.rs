// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multi-mode OCR consensus: run several segmentation modes on one page and
// keep the most confident transcription.

use std::sync::Arc;

use image::DynamicImage;
use ocrmd_core::error::OcrmdError;
use ocrmd_core::types::{CancelToken, OcrCandidate, OcrResult, QualityGate, SegmentationMode};
use tracing::{debug, instrument, warn};

use super::ocr::OcrEngine;

/// `[base, fallback...]` with later duplicates removed.
pub fn candidate_modes(
    base: SegmentationMode,
    fallback: &[SegmentationMode],
) -> Vec<SegmentationMode> {
    let mut modes = Vec::with_capacity(fallback.len() + 1);
    for mode in std::iter::once(base).chain(fallback.iter().copied()) {
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    modes
}

/// Highest `(avg_conf, char_count)` wins; exact ties keep list order.
pub fn select_best(mut candidates: Vec<OcrCandidate>) -> Option<OcrCandidate> {
    candidates.sort_by(|a, b| {
        b.avg_conf
            .total_cmp(&a.avg_conf)
            .then_with(|| b.char_count.cmp(&a.char_count))
    });
    candidates.into_iter().next()
}

/// Runs the candidate modes against one engine and applies the quality gate.
#[derive(Clone)]
pub struct OcrConsensus {
    engine: Arc<dyn OcrEngine>,
    fallback_modes: Vec<SegmentationMode>,
    gate: QualityGate,
}

impl OcrConsensus {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        fallback_modes: Vec<SegmentationMode>,
        gate: QualityGate,
    ) -> Self {
        Self {
            engine,
            fallback_modes,
            gate,
        }
    }

    /// Recognise `image` trying `base_mode` first, then the fallback modes.
    pub fn recognize(
        &self,
        image: &DynamicImage,
        language: &str,
        base_mode: SegmentationMode,
        cancel: &CancelToken,
    ) -> Result<OcrResult, OcrmdError> {
        let modes = candidate_modes(base_mode, &self.fallback_modes);
        self.recognize_modes(image, language, &modes, base_mode, cancel)
    }

    /// Recognise `image` under each of `modes` in order.
    ///
    /// Engine failures skip the mode. When no mode succeeds the result is
    /// empty and attributed to `base_mode`. The only error is
    /// [`OcrmdError::Cancelled`], raised when `cancel` fires between modes.
    #[instrument(skip(self, image, cancel), fields(modes = ?modes))]
    pub fn recognize_modes(
        &self,
        image: &DynamicImage,
        language: &str,
        modes: &[SegmentationMode],
        base_mode: SegmentationMode,
        cancel: &CancelToken,
    ) -> Result<OcrResult, OcrmdError> {
        let mut candidates = Vec::with_capacity(modes.len());

        for &mode in modes {
            cancel.check()?;
            match self.engine.recognize(image, language, mode) {
                Ok(recognition) => {
                    let candidate = OcrCandidate::from_recognition(mode, recognition);
                    debug!(
                        %mode,
                        avg_conf = candidate.avg_conf,
                        chars = candidate.char_count,
                        "Candidate recognised"
                    );
                    candidates.push(candidate);
                }
                Err(err) => warn!(%mode, error = %err, "Recognition failed; skipping mode"),
            }
        }

        let result = match select_best(candidates) {
            Some(best) => OcrResult::from_candidate(best, &self.gate),
            None => {
                warn!(%base_mode, "Every segmentation mode failed; page is unreadable");
                OcrResult::unreadable(base_mode, &self.gate)
            }
        };
        debug!(
            used_mode = %result.used_mode,
            avg_conf = result.avg_conf,
            low_quality = result.low_quality,
            "Consensus selected"
        );
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted engine shared by the consensus and structure tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use image::DynamicImage;
    use ocrmd_core::error::OcrmdError;
    use ocrmd_core::types::{PixelBox, Recognition, SegmentationMode, WordRecord};

    use crate::scan::ocr::OcrEngine;

    /// Returns a canned recognition (or failure) per mode and records calls.
    #[derive(Default)]
    pub struct ScriptedEngine {
        pub responses: HashMap<u8, Result<Recognition, String>>,
        pub calls: Mutex<Vec<u8>>,
    }

    impl ScriptedEngine {
        pub fn with(mut self, mode: u8, response: Result<Recognition, String>) -> Self {
            self.responses.insert(mode, response);
            self
        }

        pub fn calls(&self) -> Vec<u8> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl OcrEngine for ScriptedEngine {
        fn recognize(
            &self,
            _image: &DynamicImage,
            _language: &str,
            mode: SegmentationMode,
        ) -> Result<Recognition, OcrmdError> {
            self.calls.lock().unwrap().push(mode.0);
            match self.responses.get(&mode.0) {
                Some(Ok(rec)) => Ok(rec.clone()),
                Some(Err(msg)) => Err(OcrmdError::OcrError(msg.clone())),
                None => Err(OcrmdError::OcrError(format!("no script for psm {}", mode.0))),
            }
        }
    }

    /// Recognition whose words all carry `conf` and whose text has `chars`
    /// non-newline characters.
    pub fn recognition(conf: f32, chars: usize) -> Recognition {
        Recognition {
            text: "x".repeat(chars),
            words: vec![WordRecord {
                text: "x".into(),
                bbox: PixelBox::new(0, 0, 10, 10),
                confidence: Some(conf),
                line_index: 0,
            }],
        }
    }
}
