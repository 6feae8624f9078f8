use std::collections::BTreeMap;

use super::TextBlock;

const WORD_LEVEL: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WordBox {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl WordBox {
    fn right(&self) -> u32 {
        self.x + self.w
    }

    fn bottom(&self) -> u32 {
        self.y + self.h
    }

    fn center_y(&self) -> f32 {
        self.y as f32 + self.h as f32 * 0.5
    }

    fn union(&self, other: &WordBox) -> WordBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        WordBox {
            x,
            y,
            w: self.right().max(other.right()) - x,
            h: self.bottom().max(other.bottom()) - y,
        }
    }
}

#[derive(Debug, Clone)]
struct Word {
    text: String,
    bbox: WordBox,
}

/// Groups tesseract TSV word rows into lines, in tesseract's reading order
/// (page, block, paragraph, line).
pub(super) fn parse_tsv_blocks(tsv: &str, min_conf: f32) -> Vec<TextBlock> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<Word>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != WORD_LEVEL {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let bbox = WordBox {
            x: cols[6].parse().unwrap_or(0),
            y: cols[7].parse().unwrap_or(0),
            w: cols[8].parse().unwrap_or(0),
            h: cols[9].parse().unwrap_or(0),
        };
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < min_conf || bbox.w == 0 || bbox.h == 0 {
            continue;
        }
        lines.entry(key).or_default().push(Word {
            text: text.to_string(),
            bbox,
        });
    }

    let mut blocks = Vec::new();
    for (_, mut words) in lines {
        words.sort_by_key(|word| word.bbox.x);
        for segment in split_segments(words) {
            if let Some(block) = build_block(&segment) {
                blocks.push(block);
            }
        }
    }
    blocks
}

/// Splits a tesseract line where a wide horizontal gap or a vertical jump suggests two
/// separate text regions (common in screenshots with columns).
fn split_segments(words: Vec<Word>) -> Vec<Vec<Word>> {
    if words.len() <= 1 {
        return vec![words];
    }

    let mut heights = words.iter().map(|word| word.bbox.h).collect::<Vec<_>>();
    heights.sort_unstable();
    let median_h = heights[heights.len() / 2].max(1) as f32;
    let gap_threshold = (median_h * 2.5).clamp(12.0, 120.0);
    let vertical_threshold = (median_h * 0.9).clamp(6.0, 80.0);

    let mut segments = Vec::new();
    let mut current: Vec<Word> = Vec::new();
    let mut last_right = 0u32;
    let mut last_center_y = 0f32;
    for word in words {
        if !current.is_empty() {
            let gap = word.bbox.x.saturating_sub(last_right) as f32;
            let vertical_gap = (word.bbox.center_y() - last_center_y).abs();
            if gap > gap_threshold || vertical_gap > vertical_threshold {
                segments.push(std::mem::take(&mut current));
            }
        }
        if current.is_empty() {
            last_right = word.bbox.right();
            last_center_y = word.bbox.center_y();
        } else {
            last_right = last_right.max(word.bbox.right());
            last_center_y = (last_center_y + word.bbox.center_y()) * 0.5;
        }
        current.push(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn build_block(words: &[Word]) -> Option<TextBlock> {
    let mut text = String::new();
    let mut bbox: Option<WordBox> = None;
    for word in words {
        if !text.is_empty() && needs_space(&text, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        bbox = Some(match bbox {
            Some(current) => current.union(&word.bbox),
            None => word.bbox,
        });
    }
    let bbox = bbox?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(TextBlock::from_rect(
        bbox.x as f32,
        bbox.y as f32,
        bbox.w as f32,
        bbox.h as f32,
        text,
    ))
}

/// CJK words are concatenated; alphabetic scripts are separated by a space.
fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) => {
            if is_cjk(a) || is_cjk(b) {
                return false;
            }
            !a.is_whitespace() && !b.is_whitespace()
        }
        _ => false,
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x3400..=0x4DBF | 0xAC00..=0xD7AF
    )
}
