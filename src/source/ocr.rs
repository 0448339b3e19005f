//! OCR collaborator interface.

use crate::config::EngineVariant;
use crate::error::OcrError;
use image::DynamicImage;

/// Parameters for one recognition call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrParams {
    /// Page-segmentation mode.
    pub psm: u8,
    /// Engine mode.
    pub oem: u8,
    /// Traineddata name (`eng`, `por`).
    pub language: String,
}

impl OcrParams {
    pub fn new(variant: EngineVariant, language: impl Into<String>) -> Self {
        Self {
            psm: variant.psm,
            oem: variant.oem,
            language: language.into(),
        }
    }
}

/// One recognised word with its pixel box.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// 0–100. Negative values mean "not a word" and are ignored.
    pub confidence: f32,
}

impl OcrToken {
    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

/// Raw result of one recognition call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrOutput {
    /// Full recognised text as the engine laid it out.
    pub text: String,
    /// Word-level token table.
    pub tokens: Vec<OcrToken>,
}

impl OcrOutput {
    /// Mean confidence over real word tokens, on a 0–1 scale.
    pub fn mean_confidence(&self) -> f64 {
        let confs: Vec<f64> = self
            .tokens
            .iter()
            .filter(|t| t.confidence >= 0.0 && !t.text.trim().is_empty())
            .map(|t| f64::from(t.confidence))
            .collect();
        if confs.is_empty() {
            return 0.0;
        }
        (confs.iter().sum::<f64>() / confs.len() as f64 / 100.0).clamp(0.0, 1.0)
    }

    /// Token counts per confidence decile (`[0,10)`, `[10,20)`, … `[90,100]`).
    pub fn confidence_histogram(&self) -> [usize; 10] {
        let mut buckets = [0usize; 10];
        for t in self.tokens.iter().filter(|t| t.confidence >= 0.0) {
            let idx = ((t.confidence / 10.0) as usize).min(9);
            buckets[idx] += 1;
        }
        buckets
    }
}

/// Something that turns a rendered page into text plus a token table.
///
/// Implementations are called from a blocking context and may spawn
/// processes. Each call stands alone: no state is carried between attempts.
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    fn recognize(&self, image: &DynamicImage, params: &OcrParams) -> Result<OcrOutput, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(text: &str, conf: f32) -> OcrToken {
        OcrToken {
            text: text.into(),
            left: 0,
            top: 0,
            width: 10,
            height: 10,
            confidence: conf,
        }
    }

    #[test]
    fn mean_confidence_ignores_non_words() {
        let out = OcrOutput {
            text: "a b".into(),
            tokens: vec![token("a", 80.0), token("b", 60.0), token("", -1.0)],
        };
        assert!((out.mean_confidence() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn histogram_buckets_by_decile() {
        let out = OcrOutput {
            text: String::new(),
            tokens: vec![token("a", 95.0), token("b", 100.0), token("c", 3.0)],
        };
        let h = out.confidence_histogram();
        assert_eq!(h[9], 2);
        assert_eq!(h[0], 1);
    }

    #[test]
    fn empty_output_has_zero_confidence() {
        assert_eq!(OcrOutput::default().mean_confidence(), 0.0);
    }
}
