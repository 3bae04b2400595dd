use anyhow::anyhow;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::ocr::{
    ImageVariant, OcrImage, Recognition, RecognizeFuture, Recognizer, SegmentationMode,
    VariantKind,
};
use crate::vision::{AnnotateFuture, CloudRecognizer};

pub(crate) fn recognized(text: &str, confidence: f32) -> Recognition {
    Recognition {
        text: text.to_string(),
        confidence: Some(confidence),
    }
}

pub(crate) fn variant(kind: VariantKind, width: u32, height: u32) -> ImageVariant {
    ImageVariant {
        kind,
        image: OcrImage {
            bytes: vec![0x89, b'P', b'N', b'G'],
            width,
            height,
        },
    }
}

/// Replays canned results in call order, then empty text.
pub(crate) struct ScriptedRecognizer {
    responses: Mutex<VecDeque<Result<Recognition, String>>>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub(crate) fn new(responses: Vec<Result<Recognition, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Recognizer for ScriptedRecognizer {
    fn recognize<'a>(
        &'a self,
        _image: &'a OcrImage,
        _mode: SegmentationMode,
    ) -> RecognizeFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().expect("responses lock").pop_front();
        Box::pin(async move {
            match next {
                Some(Ok(recognition)) => Ok(recognition),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Ok(Recognition::default()),
            }
        })
    }
}

pub(crate) struct FakeCloud {
    reply: Option<Option<String>>,
    calls: AtomicUsize,
}

impl FakeCloud {
    pub(crate) fn replying(text: Option<&str>) -> Self {
        Self {
            reply: Some(text.map(str::to_string)),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CloudRecognizer for FakeCloud {
    fn annotate<'a>(
        &'a self,
        _credential: &'a str,
        _image: &'a [u8],
        _language_hint: &'a str,
    ) -> AnnotateFuture<'a> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(anyhow!("Vision API error (500 Internal Server Error)")),
            }
        })
    }
}
