use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::history::DEFAULT_HISTORY_LIMIT;
use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub history_limit: usize,
    pub ocr_languages: String,
    pub tesseract_binary: String,
    pub ocr_upscale: u32,
    pub ocr_thresholds: [u8; 2],
    pub vision_enabled: bool,
    pub vision_language_hint: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            ocr_languages: "jpn+eng".to_string(),
            tesseract_binary: "tesseract".to_string(),
            ocr_upscale: 2,
            ocr_thresholds: [128, 160],
            vision_enabled: true,
            vision_language_hint: "ja".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    system: Option<SystemSettings>,
    ocr: Option<OcrSettings>,
    vision: Option<VisionSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct SystemSettings {
    histories: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    tesseract: Option<String>,
    upscale: Option<u32>,
    thresholds: Option<[u8; 2]>,
}

#[derive(Debug, Default, Deserialize)]
struct VisionSettings {
    enabled: Option<bool>,
    language_hint: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let base = paths::base_dir();
    if let Some(base) = base.as_deref() {
        ensure_base_settings_file(base)?;
    }
    load_settings_from(base.as_deref(), extra_path)
}

/// Layers `./settings*.toml`, `<base>/settings*.toml`, then `extra_path`.
pub fn load_settings_from(base: Option<&Path>, extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(base) = base {
        ordered_paths.push(base.join("settings.toml"));
        ordered_paths.push(base.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(system) = incoming.system
            && let Some(limit) = system.histories
            && limit > 0
        {
            self.history_limit = limit;
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages
                && !languages.trim().is_empty()
            {
                self.ocr_languages = languages.trim().to_string();
            }
            if let Some(binary) = ocr.tesseract
                && !binary.trim().is_empty()
            {
                self.tesseract_binary = binary.trim().to_string();
            }
            if let Some(upscale) = ocr.upscale {
                self.ocr_upscale = upscale.max(1);
            }
            if let Some(thresholds) = ocr.thresholds {
                self.ocr_thresholds = thresholds;
            }
        }
        if let Some(vision) = incoming.vision {
            if let Some(enabled) = vision.enabled {
                self.vision_enabled = enabled;
            }
            if let Some(hint) = vision.language_hint
                && !hint.trim().is_empty()
            {
                self.vision_language_hint = hint.trim().to_string();
            }
        }
    }
}

fn ensure_base_settings_file(base: &Path) -> Result<()> {
    fs::create_dir_all(base)
        .with_context(|| format!("failed to create settings directory: {}", base.display()))?;
    let path = base.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
