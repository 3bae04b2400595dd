use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::process::Command;
use tracing::warn;

const JAPANESE: &str = "jpn";

pub fn list_tesseract_languages(binary: &str) -> Result<Vec<String>> {
    let output = Command::new(binary)
        .arg("--list-langs")
        .output()
        .with_context(|| format!("failed to run {} --list-langs", binary))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
}

// The first line is a banner ("List of available languages in ...:").
fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(str::to_string)
        .collect()
}

/// Resolves the `-l` argument. Unknown languages are dropped, and `jpn` is
/// always put first when installed since era names are kanji.
pub(super) fn normalize_ocr_languages(binary: &str, requested: &str) -> Result<String> {
    match list_tesseract_languages(binary) {
        Ok(available) => select_languages(requested, &available),
        // Let tesseract itself report the problem on first use.
        Err(_) => Ok(requested.trim().to_string()),
    }
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let requested = requested
        .split(['+', ',', ' '])
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .collect::<Vec<_>>();
    let installed = |lang: &str| available.iter().any(|value| value == lang);

    let mut chosen = Vec::new();
    if installed(JAPANESE) {
        if !requested.contains(&JAPANESE) {
            warn!("adding {} to ocr languages; era names are kanji", JAPANESE);
        }
        chosen.push(JAPANESE);
    } else {
        warn!("{} traineddata is not installed; era names may not be recognized", JAPANESE);
    }

    let mut missing = Vec::new();
    for lang in requested {
        if lang == JAPANESE {
            continue;
        }
        if installed(lang) {
            if !chosen.contains(&lang) {
                chosen.push(lang);
            }
        } else {
            missing.push(lang);
        }
    }
    if !missing.is_empty() {
        warn!("ocr language(s) not installed: {}", missing.join(", "));
    }
    if chosen.is_empty() {
        return Err(anyhow!(
            "no usable ocr language (installed: {})",
            available.join(", ")
        ));
    }
    Ok(chosen.join("+"))
}

pub(super) fn run_tesseract_tsv(
    binary: &str,
    path: &Path,
    languages: &str,
    psm: u32,
) -> Result<String> {
    let output = Command::new(binary)
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--oem")
        .arg("1")
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
