use anyhow::{Context, Result, anyhow};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

pub mod history;
pub mod logging;
pub mod ocr;
mod paths;
pub mod settings;
pub mod store;
pub mod usage;
pub mod vision;
pub mod wareki;

#[cfg(test)]
mod test_util;

pub use wareki::{ConversionResult, DateCandidate, seireki_to_wareki, wareki_to_seireki};

use history::{ConversionHistory, HistoryEntry};
use ocr::{CandidateSelector, Escalation, Recognizer, TesseractRecognizer};
use settings::Settings;
use store::{JsonFileStore, KeyValueStore, MemoryStore};
use usage::UsageGate;
use vision::{CloudRecognizer, GoogleVision};

const NO_DATE_FOUND: &str = "no wareki date found";
const OCR_PREVIEW_CHARS: usize = 40;
const TEXT_SOURCE: &str = "text";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub year: Option<i32>,
    pub image: Option<String>,
    pub key: Option<String>,
    pub save_key: Option<String>,
    pub delete_key: bool,
    pub show_key: bool,
    pub show_usage: bool,
    pub no_cloud: bool,
    pub show_histories: bool,
    pub clear_histories: bool,
    pub show_ocr_languages: bool,
    pub json: bool,
    pub settings_path: Option<String>,
}

pub async fn run(config: Config, input: Option<String>) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if config.show_ocr_languages {
        let languages = ocr::list_tesseract_languages(&settings.tesseract_binary)?;
        return Ok(languages.join("\n"));
    }
    let store = open_store(&config, JsonFileStore::open_default())?;
    if let Some(path) = config.image.as_deref() {
        let recognizer = TesseractRecognizer::from_settings(&settings)?;
        let cloud = GoogleVision::new();
        return convert_image(path, &config, &settings, &store, &recognizer, &cloud).await;
    }
    run_with_store(&config, input, &settings, store.as_ref())
}

/// Text and year conversion only use the store for history, so they run
/// without one (history is skipped) when no base directory resolves.
fn open_store(config: &Config, opened: Result<JsonFileStore>) -> Result<Arc<dyn KeyValueStore>> {
    match opened {
        Ok(store) => Ok(Arc::new(store)),
        Err(err) if needs_persistence(config) => Err(err),
        Err(err) => {
            warn!("history disabled: {:#}", err);
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn needs_persistence(config: &Config) -> bool {
    config.image.is_some()
        || config.save_key.is_some()
        || config.delete_key
        || config.show_key
        || config.show_usage
        || config.show_histories
        || config.clear_histories
}

/// Every mode that needs neither the recognizer nor the network.
fn run_with_store(
    config: &Config,
    input: Option<String>,
    settings: &Settings,
    store: &dyn KeyValueStore,
) -> Result<String> {
    if let Some(key) = config.save_key.as_deref() {
        usage::save_credential(store, key)?;
        return Ok("API key saved".to_string());
    }
    if config.delete_key {
        usage::delete_credential(store)?;
        return Ok("API key deleted".to_string());
    }
    if config.show_key {
        return Ok(match usage::stored_credential(store)? {
            Some(key) => usage::mask_credential(&key),
            None => "(not set)".to_string(),
        });
    }
    if config.show_usage {
        let year_month = usage::current_year_month();
        let used = usage::read_usage(store, &year_month)?;
        return Ok(format!(
            "vision usage ({}): {} / {}",
            year_month,
            used,
            usage::VISION_MONTHLY_LIMIT
        ));
    }
    if config.show_histories {
        let history = ConversionHistory::load(store, settings.history_limit)?;
        if history.is_empty() {
            return Ok("no histories".to_string());
        }
        return Ok(history
            .entries()
            .map(HistoryEntry::format_line)
            .collect::<Vec<_>>()
            .join("\n"));
    }
    if config.clear_histories {
        let mut history = ConversionHistory::load(store, settings.history_limit)?;
        history.clear();
        history.save(store)?;
        return Ok("histories cleared".to_string());
    }
    if let Some(year) = config.year {
        return format_year(year, config.json);
    }

    let input = input.unwrap_or_default();
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow!("stdin is empty"));
    }
    match wareki_to_seireki(input) {
        Some(result) => {
            record_history(store, settings, &result, TEXT_SOURCE);
            format_conversion(&result, config.json)
        }
        None => Ok(NO_DATE_FOUND.to_string()),
    }
}

async fn convert_image(
    path: &str,
    config: &Config,
    settings: &Settings,
    store: &Arc<dyn KeyValueStore>,
    recognizer: &dyn Recognizer,
    cloud: &dyn CloudRecognizer,
) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read image: {}", path))?;
    let variants = ocr::build_variants(&bytes, settings)?;

    let gate = UsageGate::new(Arc::clone(store));
    let mut selector = CandidateSelector::new(recognizer);
    if settings.vision_enabled && !config.no_cloud {
        selector = selector.with_escalation(Escalation {
            cloud,
            gate: &gate,
            credential: usage::resolve_credential(store.as_ref(), config.key.as_deref())?,
            year_month: usage::current_year_month(),
            language_hint: settings.vision_language_hint.clone(),
        });
    }

    let outcome = selector.select(&variants).await;
    match outcome.conversion {
        Some(result) => {
            record_history(store.as_ref(), settings, &result, path);
            format_conversion(&result, config.json)
        }
        None => Ok(format_not_found(&outcome.text)),
    }
}

fn format_conversion(result: &ConversionResult, as_json: bool) -> Result<String> {
    if as_json {
        return serde_json::to_string_pretty(result).with_context(|| "failed to encode result");
    }
    Ok(format!("{} → {}", result.original, result.converted))
}

fn format_year(year: i32, as_json: bool) -> Result<String> {
    let wareki = seireki_to_wareki(year);
    if as_json {
        return serde_json::to_string_pretty(&json!({ "year": year, "wareki": wareki }))
            .with_context(|| "failed to encode result");
    }
    Ok(wareki.unwrap_or_else(|| format!("no era covers year {}", year)))
}

fn format_not_found(ocr_text: &str) -> String {
    let preview = ocr_text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(OCR_PREVIEW_CHARS)
        .collect::<String>();
    if preview.is_empty() {
        NO_DATE_FOUND.to_string()
    } else {
        format!("{} (OCR: {})", NO_DATE_FOUND, preview)
    }
}

/// A failed history write never hides a successful conversion.
fn record_history(
    store: &dyn KeyValueStore,
    settings: &Settings,
    result: &ConversionResult,
    source: &str,
) {
    let saved = ConversionHistory::load(store, settings.history_limit).and_then(|mut history| {
        history.push(HistoryEntry::now(&result.original, &result.converted, source));
        history.save(store)
    });
    if let Err(err) = saved {
        warn!("failed to record history: {:#}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FakeCloud, ScriptedRecognizer, recognized};
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn text_config() -> Config {
        Config::default()
    }

    fn write_png(dir: &Path, width: u32, height: u32) -> String {
        let image = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let path = dir.join("region.png");
        std::fs::write(&path, bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn converts_text_and_records_history() {
        let store = MemoryStore::new();
        let settings = Settings::default();
        let output = run_with_store(
            &text_config(),
            Some("発行日 令和5年12月31日".to_string()),
            &settings,
            &store,
        )
        .unwrap();
        assert_eq!(output, "令和5年12月31日 → 2023年12月31日");

        let history = ConversionHistory::load(&store, 10).unwrap();
        let entry = history.entries().next().unwrap();
        assert_eq!(entry.converted, "2023年12月31日");
        assert_eq!(entry.source, "text");
    }

    #[test]
    fn reports_missing_date_without_recording() {
        let store = MemoryStore::new();
        let output = run_with_store(
            &text_config(),
            Some("hello".to_string()),
            &Settings::default(),
            &store,
        )
        .unwrap();
        assert_eq!(output, "no wareki date found");
        assert!(ConversionHistory::load(&store, 10).unwrap().is_empty());
    }

    #[test]
    fn empty_input_is_an_error() {
        let store = MemoryStore::new();
        let err = run_with_store(&text_config(), Some("  ".to_string()), &Settings::default(), &store)
            .unwrap_err();
        assert!(err.to_string().contains("stdin is empty"));
    }

    #[test]
    fn reverse_converts_years() {
        let store = MemoryStore::new();
        let settings = Settings::default();
        let config = Config {
            year: Some(2019),
            ..Config::default()
        };
        assert_eq!(
            run_with_store(&config, None, &settings, &store).unwrap(),
            "令和元年"
        );
        let config = Config {
            year: Some(1800),
            ..Config::default()
        };
        assert_eq!(
            run_with_store(&config, None, &settings, &store).unwrap(),
            "no era covers year 1800"
        );
    }

    #[test]
    fn manages_stored_key() {
        let store = MemoryStore::new();
        let settings = Settings::default();
        let save = Config {
            save_key: Some("AIzaSyExample1234".to_string()),
            ..Config::default()
        };
        run_with_store(&save, None, &settings, &store).unwrap();

        let show = Config {
            show_key: true,
            ..Config::default()
        };
        assert_eq!(
            run_with_store(&show, None, &settings, &store).unwrap(),
            "AIzaSy...1234"
        );

        let delete = Config {
            delete_key: true,
            ..Config::default()
        };
        run_with_store(&delete, None, &settings, &store).unwrap();
        assert_eq!(
            run_with_store(&show, None, &settings, &store).unwrap(),
            "(not set)"
        );
    }

    #[test]
    fn shows_monthly_usage() {
        let store = MemoryStore::new();
        let config = Config {
            show_usage: true,
            ..Config::default()
        };
        let output = run_with_store(&config, None, &Settings::default(), &store).unwrap();
        assert!(output.starts_with("vision usage ("));
        assert!(output.ends_with("): 0 / 200"));
    }

    #[test]
    fn text_mode_runs_without_base_dir() {
        let store = open_store(&text_config(), Err(anyhow!("HOME is not set"))).unwrap();
        let output = run_with_store(
            &text_config(),
            Some("令和5年".to_string()),
            &Settings::default(),
            store.as_ref(),
        )
        .unwrap();
        assert_eq!(output, "令和5年 → 2023年");
    }

    #[test]
    fn persistent_modes_require_base_dir() {
        let config = Config {
            show_usage: true,
            ..Config::default()
        };
        let Err(err) = open_store(&config, Err(anyhow!("HOME is not set"))) else {
            panic!("usage lookup must not fall back to an in-memory store");
        };
        assert!(err.to_string().contains("HOME is not set"));
    }

    #[test]
    fn previews_unconverted_ocr_text() {
        assert_eq!(format_not_found("   "), "no wareki date found");
        assert_eq!(
            format_not_found("請求書\n  No.\t42"),
            "no wareki date found (OCR: 請求書 No. 42)"
        );
        let long = "あ".repeat(60);
        assert_eq!(
            format_not_found(&long),
            format!("no wareki date found (OCR: {})", "あ".repeat(40))
        );
    }

    #[tokio::test]
    async fn converts_image_with_local_recognition() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 300, 60);
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let recognizer = ScriptedRecognizer::new(vec![
            Ok(recognized("", 0.0)),
            Ok(recognized("H31.4.30", 80.0)),
        ]);
        let cloud = FakeCloud::replying(None);
        let config = Config {
            image: Some(path.clone()),
            ..Config::default()
        };

        let output = convert_image(
            &path,
            &config,
            &Settings::default(),
            &store,
            &recognizer,
            &cloud,
        )
        .await
        .unwrap();
        assert_eq!(output, "H31.4.30 → 2019年4月30日");
        assert_eq!(recognizer.calls(), 2);
        assert_eq!(cloud.calls(), 0);

        let history = ConversionHistory::load(store.as_ref(), 10).unwrap();
        assert_eq!(history.entries().next().unwrap().source, path);
    }

    #[tokio::test]
    async fn no_cloud_flag_keeps_escalation_off() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 300, 60);
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let recognizer = ScriptedRecognizer::new(vec![Ok(recognized("請求書 No. 42", 70.0))]);
        let cloud = FakeCloud::replying(Some("令和5年"));
        let config = Config {
            no_cloud: true,
            key: Some("AIzaSyExample1234".to_string()),
            ..Config::default()
        };

        let output = convert_image(
            &path,
            &config,
            &Settings::default(),
            &store,
            &recognizer,
            &cloud,
        )
        .await
        .unwrap();
        assert_eq!(output, "no wareki date found (OCR: 請求書 No. 42)");
        assert_eq!(cloud.calls(), 0);
    }
}
