mod parse;
mod preprocess;
mod tesseract;
mod text;

use anyhow::{Context, Result, anyhow};
use std::io::Write;
use tracing::debug;

use crate::ocr::{
    ImageVariant, OcrImage, RecognizeFuture, Recognizer, SegmentationMode,
};
use crate::settings::Settings;

pub use tesseract::list_tesseract_languages;

pub fn build_variants(image_bytes: &[u8], settings: &Settings) -> Result<Vec<ImageVariant>> {
    preprocess::build_variants(image_bytes, settings.ocr_upscale, settings.ocr_thresholds)
}

/// Runs the `tesseract` CLI once per call on a blocking thread.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: String,
    languages: String,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<String>, languages: &str) -> Result<Self> {
        let binary = binary.into();
        let languages = tesseract::normalize_ocr_languages(&binary, languages)?;
        Ok(Self { binary, languages })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.tesseract_binary.clone(), &settings.ocr_languages)
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize<'a>(
        &'a self,
        image: &'a OcrImage,
        mode: SegmentationMode,
    ) -> RecognizeFuture<'a> {
        let binary = self.binary.clone();
        let languages = self.languages.clone();
        let bytes = image.bytes.clone();
        Box::pin(async move {
            let tsv = tokio::task::spawn_blocking(move || -> Result<String> {
                let mut tmp = tempfile::Builder::new()
                    .suffix(".png")
                    .tempfile()
                    .with_context(|| "failed to create temp file for OCR")?;
                tmp.write_all(&bytes)
                    .with_context(|| "failed to write temp image for OCR")?;
                tmp.flush().ok();
                tesseract::run_tesseract_tsv(&binary, tmp.path(), &languages, mode.psm())
            })
            .await
            .map_err(|err| anyhow!("tesseract task failed: {}", err))??;
            let recognition = parse::parse_tsv(&tsv);
            debug!(
                "tesseract {} returned {} chars",
                mode,
                recognition.text.chars().count()
            );
            Ok(recognition)
        })
    }
}
