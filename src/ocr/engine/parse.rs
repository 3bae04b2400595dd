use std::collections::BTreeMap;

use crate::ocr::Recognition;

use super::text::join_inline;

struct WordToken {
    left: u32,
    text: String,
    conf: f32,
}

/// Folds tesseract TSV output into one text blob plus mean word confidence.
pub(super) fn parse_tsv(tsv: &str) -> Recognition {
    let mut line_map: BTreeMap<(i32, i32, i32, i32), Vec<WordToken>> = BTreeMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let page_num: i32 = cols[1].parse().unwrap_or(0);
        let block_num: i32 = cols[2].parse().unwrap_or(0);
        let par_num: i32 = cols[3].parse().unwrap_or(0);
        let line_num: i32 = cols[4].parse().unwrap_or(0);
        let left: u32 = cols[6].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (page_num, block_num, par_num, line_num);
        line_map.entry(key).or_default().push(WordToken {
            left,
            text: text.to_string(),
            conf,
        });
    }

    let mut lines = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut word_count = 0usize;
    for (_, mut words) in line_map {
        words.sort_by_key(|word| word.left);
        let mut line = String::new();
        for word in &words {
            line = join_inline(&line, &word.text);
            conf_sum += word.conf;
            word_count += 1;
        }
        lines.push(line);
    }

    Recognition {
        text: lines.join("\n"),
        confidence: (word_count > 0).then(|| conf_sum / word_count as f32),
    }
}
