mod engine;
pub mod selector;

use anyhow::Result;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub use engine::{TesseractRecognizer, build_variants, list_tesseract_languages};
pub use selector::{
    CandidateSelector, CandidateSource, Escalation, EscalationStatus, SelectionOutcome,
};

/// A PNG-encoded image handed to a recognizer.
#[derive(Debug, Clone)]
pub struct OcrImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Original,
    GrayscaleUpscaled,
    Binarized(u8),
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantKind::Original => f.write_str("original"),
            VariantKind::GrayscaleUpscaled => f.write_str("grayscale-upscaled"),
            VariantKind::Binarized(threshold) => write!(f, "binary-{}", threshold),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub kind: VariantKind,
    pub image: OcrImage,
}

/// Layout hint passed to the recognizer (Tesseract page segmentation modes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationMode {
    Auto,
    VerticalBlock,
    UniformBlock,
    SingleLine,
    SparseText,
    RawLine,
}

const TALL_MODES: &[SegmentationMode] = &[
    SegmentationMode::VerticalBlock,
    SegmentationMode::UniformBlock,
    SegmentationMode::SparseText,
];
const WIDE_MODES: &[SegmentationMode] = &[
    SegmentationMode::SingleLine,
    SegmentationMode::RawLine,
    SegmentationMode::UniformBlock,
];
const DEFAULT_MODES: &[SegmentationMode] = &[
    SegmentationMode::UniformBlock,
    SegmentationMode::SingleLine,
    SegmentationMode::SparseText,
    SegmentationMode::Auto,
];

impl SegmentationMode {
    pub fn psm(self) -> u32 {
        match self {
            SegmentationMode::Auto => 3,
            SegmentationMode::VerticalBlock => 5,
            SegmentationMode::UniformBlock => 6,
            SegmentationMode::SingleLine => 7,
            SegmentationMode::SparseText => 11,
            SegmentationMode::RawLine => 13,
        }
    }

    /// Modes to try, in order, for a source region of the given size.
    pub fn for_region(width: u32, height: u32) -> &'static [SegmentationMode] {
        let width = width as f32;
        let height = height as f32;
        if height > width * 1.5 {
            TALL_MODES
        } else if width > height * 3.0 {
            WIDE_MODES
        } else {
            DEFAULT_MODES
        }
    }
}

impl fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "psm{}", self.psm())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// 0-100, `None` when the engine reports nothing usable.
    pub confidence: Option<f32>,
}

pub type RecognizeFuture<'a> = Pin<Box<dyn Future<Output = Result<Recognition>> + Send + 'a>>;

pub trait Recognizer: Send + Sync {
    fn recognize<'a>(&'a self, image: &'a OcrImage, mode: SegmentationMode)
    -> RecognizeFuture<'a>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_modes_by_aspect_ratio() {
        assert_eq!(
            SegmentationMode::for_region(40, 200)[0],
            SegmentationMode::VerticalBlock
        );
        assert_eq!(
            SegmentationMode::for_region(400, 40)[0],
            SegmentationMode::SingleLine
        );
        assert_eq!(SegmentationMode::for_region(200, 120).len(), 4);
    }

    #[test]
    fn labels_variants() {
        assert_eq!(VariantKind::Original.to_string(), "original");
        assert_eq!(VariantKind::Binarized(160).to_string(), "binary-160");
        assert_eq!(SegmentationMode::SparseText.to_string(), "psm11");
    }
}
