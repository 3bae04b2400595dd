//! Chooses which recognized text to trust across image variants and
//! segmentation modes, escalating to cloud recognition as a last resort.

use tracing::{debug, info, warn};

use crate::ocr::{ImageVariant, Recognizer, SegmentationMode, VariantKind};
use crate::usage::{Reservation, UsageGate};
use crate::vision::CloudRecognizer;
use crate::wareki::{ConversionResult, ERAS, normalize, wareki_to_seireki};

const ERA_NAME_SCORE: u32 = 6;
const ABBREVIATION_SCORE: u32 = 2;
const DIGIT_SCORE: u32 = 1;
const DATE_UNIT_SCORE: u32 = 2;

/// Everything the cloud fallback needs. The caller owns the quota gate.
pub struct Escalation<'a> {
    pub cloud: &'a dyn CloudRecognizer,
    pub gate: &'a UsageGate,
    pub credential: Option<String>,
    /// `YYYY-MM` the usage counter is keyed by.
    pub year_month: String,
    pub language_hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Local {
        variant: VariantKind,
        mode: SegmentationMode,
    },
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStatus {
    /// A local attempt converted, so the cloud was never considered.
    NotNeeded,
    Disabled,
    NoCredential,
    QuotaExhausted { used: u32 },
    /// The usage counter could not be read or written.
    Unavailable,
    Called { used: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionOutcome {
    /// Text that converted, or the best-effort text when nothing did.
    pub text: String,
    pub conversion: Option<ConversionResult>,
    pub source: Option<CandidateSource>,
    /// Local recognition calls actually made.
    pub attempts: usize,
    pub escalation: EscalationStatus,
}

struct OcrAttempt {
    variant: VariantKind,
    mode: SegmentationMode,
    text: String,
    confidence: Option<f32>,
}

struct Fallback {
    score: u32,
    attempt: OcrAttempt,
}

impl Fallback {
    fn beats(&self, other: &Fallback) -> bool {
        if self.score != other.score {
            return self.score > other.score;
        }
        self.attempt.confidence.unwrap_or(-1.0) > other.attempt.confidence.unwrap_or(-1.0)
    }
}

pub struct CandidateSelector<'a, R: Recognizer + ?Sized> {
    recognizer: &'a R,
    escalation: Option<Escalation<'a>>,
}

impl<'a, R: Recognizer + ?Sized> CandidateSelector<'a, R> {
    pub fn new(recognizer: &'a R) -> Self {
        Self {
            recognizer,
            escalation: None,
        }
    }

    pub fn with_escalation(mut self, escalation: Escalation<'a>) -> Self {
        self.escalation = Some(escalation);
        self
    }

    /// Tries every (variant, mode) pair in order and stops at the first
    /// convertible text. Dropping the returned future abandons the remaining
    /// pairs; quota is only reserved immediately before a cloud call.
    pub async fn select(&self, variants: &[ImageVariant]) -> SelectionOutcome {
        let Some(region) = source_variant(variants) else {
            return SelectionOutcome {
                text: String::new(),
                conversion: None,
                source: None,
                attempts: 0,
                escalation: EscalationStatus::Disabled,
            };
        };
        let modes = SegmentationMode::for_region(region.image.width, region.image.height);

        let mut attempts = 0usize;
        let mut best: Option<Fallback> = None;
        for variant in variants {
            for &mode in modes {
                attempts += 1;
                let attempt = self.attempt(variant, mode).await;
                if let Some(conversion) = wareki_to_seireki(&attempt.text) {
                    info!(
                        "converted on {} {} after {} attempt(s)",
                        attempt.variant, attempt.mode, attempts
                    );
                    return SelectionOutcome {
                        text: attempt.text,
                        conversion: Some(conversion),
                        source: Some(CandidateSource::Local {
                            variant: attempt.variant,
                            mode: attempt.mode,
                        }),
                        attempts,
                        escalation: EscalationStatus::NotNeeded,
                    };
                }
                if attempt.text.trim().is_empty() {
                    continue;
                }
                let candidate = Fallback {
                    score: relevance_score(&attempt.text),
                    attempt,
                };
                if best.as_ref().is_none_or(|current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        let local_text = match best {
            Some(fallback) => {
                debug!(
                    "best-effort text from {} {} (score {})",
                    fallback.attempt.variant, fallback.attempt.mode, fallback.score
                );
                fallback.attempt.text
            }
            None => String::new(),
        };
        self.escalate(region, local_text, attempts).await
    }

    async fn attempt(&self, variant: &ImageVariant, mode: SegmentationMode) -> OcrAttempt {
        let recognition = match self.recognizer.recognize(&variant.image, mode).await {
            Ok(recognition) => recognition,
            Err(err) => {
                warn!("recognition failed on {} {}: {:#}", variant.kind, mode, err);
                Default::default()
            }
        };
        debug!(
            "{} {}: confidence {:?}, {} chars",
            variant.kind,
            mode,
            recognition.confidence,
            recognition.text.chars().count()
        );
        OcrAttempt {
            variant: variant.kind,
            mode,
            text: recognition.text,
            confidence: recognition.confidence,
        }
    }

    async fn escalate(
        &self,
        region: &ImageVariant,
        local_text: String,
        attempts: usize,
    ) -> SelectionOutcome {
        let unconverted = |text: String, escalation: EscalationStatus| SelectionOutcome {
            text,
            conversion: None,
            source: None,
            attempts,
            escalation,
        };

        let Some(escalation) = self.escalation.as_ref() else {
            return unconverted(local_text, EscalationStatus::Disabled);
        };
        let Some(credential) = escalation
            .credential
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
        else {
            info!("skipping cloud recognition: no API key configured");
            return unconverted(local_text, EscalationStatus::NoCredential);
        };

        let used = match escalation.gate.try_reserve(&escalation.year_month) {
            Ok(Reservation::Reserved { used }) => used,
            Ok(Reservation::Exhausted { used }) => {
                info!(
                    "skipping cloud recognition: monthly quota used ({}/{})",
                    used,
                    escalation.gate.limit()
                );
                return unconverted(local_text, EscalationStatus::QuotaExhausted { used });
            }
            Err(err) => {
                warn!("skipping cloud recognition: usage counter unavailable: {:#}", err);
                return unconverted(local_text, EscalationStatus::Unavailable);
            }
        };

        info!("escalating to cloud recognition ({}/{})", used, escalation.gate.limit());
        let cloud_text = match escalation
            .cloud
            .annotate(credential, &region.image.bytes, &escalation.language_hint)
            .await
        {
            Ok(text) => text.unwrap_or_default(),
            Err(err) => {
                warn!("cloud recognition failed: {:#}", err);
                String::new()
            }
        };
        let status = EscalationStatus::Called { used };

        if let Some(conversion) = wareki_to_seireki(&cloud_text) {
            return SelectionOutcome {
                text: cloud_text,
                conversion: Some(conversion),
                source: Some(CandidateSource::Cloud),
                attempts,
                escalation: status,
            };
        }
        if local_text.trim().is_empty() {
            unconverted(cloud_text, status)
        } else {
            unconverted(local_text, status)
        }
    }
}

/// Variant whose dimensions describe the captured region.
fn source_variant(variants: &[ImageVariant]) -> Option<&ImageVariant> {
    variants
        .iter()
        .find(|variant| variant.kind == VariantKind::Original)
        .or_else(|| variants.first())
}

/// How much `text` looks like it was meant to contain an era date.
pub fn relevance_score(text: &str) -> u32 {
    let normalized = normalize(text);
    let mut score = 0;
    if ERAS.iter().any(|era| normalized.contains(era.name)) {
        score += ERA_NAME_SCORE;
    }
    if normalized
        .chars()
        .any(|ch| ERAS.iter().any(|era| era.abbreviation == ch))
    {
        score += ABBREVIATION_SCORE;
    }
    if normalized.chars().any(|ch| ch.is_ascii_digit()) {
        score += DIGIT_SCORE;
    }
    if normalized.chars().any(|ch| matches!(ch, '年' | '月' | '日')) {
        score += DATE_UNIT_SCORE;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_util::{FakeCloud, ScriptedRecognizer, recognized, variant};
    use crate::usage::usage_key;
    use serde_json::json;
    use std::sync::Arc;

    const MONTH: &str = "2026-10";

    // 300x60 is a wide region: three modes per variant, six pairs in total.
    fn two_variants() -> Vec<ImageVariant> {
        vec![
            variant(VariantKind::Original, 300, 60),
            variant(VariantKind::GrayscaleUpscaled, 600, 120),
        ]
    }

    fn escalation<'a>(
        cloud: &'a FakeCloud,
        gate: &'a UsageGate,
        credential: Option<&str>,
    ) -> Escalation<'a> {
        Escalation {
            cloud,
            gate,
            credential: credential.map(str::to_string),
            year_month: MONTH.to_string(),
            language_hint: "ja".to_string(),
        }
    }

    #[tokio::test]
    async fn stops_at_first_convertible_attempt() {
        let recognizer = ScriptedRecognizer::new(vec![
            Ok(recognized("請求書", 90.0)),
            Ok(recognized("令和5年12月31日", 70.0)),
            Ok(recognized("平成2年", 99.0)),
            Ok(recognized("平成3年", 99.0)),
            Ok(recognized("平成4年", 99.0)),
        ]);
        let outcome = CandidateSelector::new(&recognizer)
            .select(&two_variants())
            .await;

        assert_eq!(recognizer.calls(), 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.conversion.unwrap().converted, "2023年12月31日");
        assert_eq!(
            outcome.source,
            Some(CandidateSource::Local {
                variant: VariantKind::Original,
                mode: SegmentationMode::RawLine,
            })
        );
        assert_eq!(outcome.escalation, EscalationStatus::NotNeeded);
    }

    #[tokio::test]
    async fn keeps_most_relevant_text_when_nothing_converts() {
        let recognizer = ScriptedRecognizer::new(vec![
            Ok(recognized("invoice", 95.0)),
            Ok(recognized("令和 年", 40.0)),
            Ok(recognized("12", 99.0)),
            Ok(recognized("令和年", 60.0)),
        ]);
        let outcome = CandidateSelector::new(&recognizer)
            .select(&two_variants())
            .await;

        assert_eq!(recognizer.calls(), 6);
        assert!(outcome.conversion.is_none());
        assert_eq!(outcome.text, "令和年");
        assert_eq!(outcome.escalation, EscalationStatus::Disabled);
    }

    #[tokio::test]
    async fn recognition_failure_does_not_stop_selection() {
        let recognizer = ScriptedRecognizer::new(vec![
            Err("engine crashed".to_string()),
            Ok(recognized("R5.4.1", 50.0)),
        ]);
        let outcome = CandidateSelector::new(&recognizer)
            .select(&two_variants())
            .await;
        assert_eq!(outcome.conversion.unwrap().converted, "2023年4月1日");
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn escalates_when_local_attempts_fail() {
        let recognizer = ScriptedRecognizer::new(vec![Ok(recognized("令和", 30.0))]);
        let cloud = FakeCloud::replying(Some("令和元年5月1日"));
        let gate = UsageGate::new(Arc::new(MemoryStore::new()));
        let outcome = CandidateSelector::new(&recognizer)
            .with_escalation(escalation(&cloud, &gate, Some("key")))
            .select(&two_variants())
            .await;

        assert_eq!(cloud.calls(), 1);
        assert_eq!(outcome.source, Some(CandidateSource::Cloud));
        assert_eq!(outcome.conversion.unwrap().converted, "2019年5月1日");
        assert_eq!(outcome.escalation, EscalationStatus::Called { used: 1 });
        assert_eq!(gate.used(MONTH).unwrap(), 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_blocks_cloud_call() {
        let store = Arc::new(MemoryStore::new());
        crate::store::set_one(store.as_ref(), &usage_key(MONTH), json!(200)).unwrap();
        let gate = UsageGate::new(store);
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let cloud = FakeCloud::replying(Some("令和5年"));

        let outcome = CandidateSelector::new(&recognizer)
            .with_escalation(escalation(&cloud, &gate, Some("key")))
            .select(&two_variants())
            .await;

        assert_eq!(cloud.calls(), 0);
        assert_eq!(outcome.text, "");
        assert!(outcome.conversion.is_none());
        assert_eq!(outcome.escalation, EscalationStatus::QuotaExhausted { used: 200 });
        assert_eq!(gate.used(MONTH).unwrap(), 200);
    }

    #[tokio::test]
    async fn missing_credential_skips_escalation() {
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let cloud = FakeCloud::replying(Some("令和5年"));
        let gate = UsageGate::new(Arc::new(MemoryStore::new()));
        let outcome = CandidateSelector::new(&recognizer)
            .with_escalation(escalation(&cloud, &gate, Some("  ")))
            .select(&two_variants())
            .await;

        assert_eq!(cloud.calls(), 0);
        assert_eq!(outcome.escalation, EscalationStatus::NoCredential);
        assert_eq!(gate.used(MONTH).unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_cloud_call_still_consumes_quota() {
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let cloud = FakeCloud::failing();
        let gate = UsageGate::new(Arc::new(MemoryStore::new()));
        let outcome = CandidateSelector::new(&recognizer)
            .with_escalation(escalation(&cloud, &gate, Some("key")))
            .select(&two_variants())
            .await;

        assert_eq!(cloud.calls(), 1);
        assert!(outcome.conversion.is_none());
        assert_eq!(outcome.escalation, EscalationStatus::Called { used: 1 });
        assert_eq!(gate.used(MONTH).unwrap(), 1);
    }

    #[tokio::test]
    async fn cloud_text_reported_only_without_local_text() {
        let gate = UsageGate::new(Arc::new(MemoryStore::new()));
        let cloud = FakeCloud::replying(Some("領収書"));

        let silent = ScriptedRecognizer::new(Vec::new());
        let outcome = CandidateSelector::new(&silent)
            .with_escalation(escalation(&cloud, &gate, Some("key")))
            .select(&two_variants())
            .await;
        assert_eq!(outcome.text, "領収書");

        let noisy = ScriptedRecognizer::new(vec![Ok(recognized("平成", 10.0))]);
        let outcome = CandidateSelector::new(&noisy)
            .with_escalation(escalation(&cloud, &gate, Some("key")))
            .select(&two_variants())
            .await;
        assert_eq!(outcome.text, "平成");
    }

    #[tokio::test]
    async fn empty_variant_list_yields_empty_outcome() {
        let recognizer = ScriptedRecognizer::new(Vec::new());
        let outcome = CandidateSelector::new(&recognizer).select(&[]).await;
        assert_eq!(outcome.attempts, 0);
        assert_eq!(recognizer.calls(), 0);
    }

    #[test]
    fn scores_date_like_text() {
        assert_eq!(relevance_score("令和5年"), 6 + 1 + 2);
        assert_eq!(relevance_score("H31年"), 2 + 1 + 2);
        assert_eq!(relevance_score("r5"), 2 + 1);
        assert_eq!(relevance_score("今和"), 6);
        assert_eq!(relevance_score("abc"), 0);
    }
}
