use serde_json::Value;
use tera::{Context, Tera};
use tracing::debug;

use super::TranslationPair;
use crate::languages::LanguagePair;

const BATCH_PROMPT: &str = include_str!("batch_prompt.tera");

/// Renders the batch instruction shared by the chat-style providers.
pub fn render_batch_prompt(texts: &[String], languages: LanguagePair) -> Result<String, tera::Error> {
    let blocks = serde_json::to_string(texts).map_err(|err| tera::Error::msg(err.to_string()))?;
    let mut context = Context::new();
    context.insert("source", languages.source().prompt_name());
    context.insert("target", languages.target().prompt_name());
    context.insert("blocks", &blocks);
    let rendered = Tera::one_off(BATCH_PROMPT, &context, false)?;
    Ok(rendered.trim_end().to_string())
}

/// Parses a chat reply into `[source, translation]` pairs.
///
/// The reply may wrap the array in a fenced code block, prefix it with prose, or be
/// cut off mid-array. Complete pairs before a truncation are kept; entries that are
/// not two strings are skipped.
pub fn parse_pairs_reply(reply: &str) -> Result<Vec<TranslationPair>, String> {
    let body = first_fenced_block(reply).unwrap_or(reply);
    let start = body
        .find('[')
        .ok_or_else(|| "no JSON array in reply".to_string())?;
    let array = &body[start..];

    let value = match parse_first_value(array) {
        Some(value) => value,
        None => {
            let repaired = repair_truncated_array(array)
                .ok_or_else(|| "reply array is malformed beyond repair".to_string())?;
            debug!("chat reply needed repair");
            parse_first_value(&repaired)
                .ok_or_else(|| "repaired reply is still not valid JSON".to_string())?
        }
    };

    let Value::Array(items) = value else {
        return Err("reply is not a JSON array".to_string());
    };
    let pairs = items.into_iter().filter_map(pair_from_value).collect::<Vec<_>>();
    if pairs.is_empty() {
        return Err("reply contains no translation pairs".to_string());
    }
    Ok(pairs)
}

fn first_fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after_fence = &reply[open + 3..];
    let content = match after_fence.find('\n') {
        Some(newline) if is_info_string(&after_fence[..newline]) => &after_fence[newline + 1..],
        _ => after_fence,
    };
    match content.find("```") {
        Some(close) => Some(&content[..close]),
        None => Some(content),
    }
}

/// A language tag after the opening fence (`json`, `javascript`, ...). A one-line
/// block such as ```` ```[["a","b"]]``` ```` has none.
fn is_info_string(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '+' | '.'))
}

fn parse_first_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()?
        .ok()
}

/// Cuts the array after its last complete element and closes it. Returns `None` when
/// no element was completed.
fn repair_truncated_array(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut last_complete = None;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                if depth == 1 {
                    last_complete = Some(idx + 1);
                }
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    last_complete = Some(idx + 1);
                }
                if depth == 0 {
                    break;
                }
            }
            _ => {}
        }
    }

    let end = last_complete?;
    Some(format!("{}]", &text[..end]))
}

fn pair_from_value(value: Value) -> Option<TranslationPair> {
    let Value::Array(parts) = value else {
        return None;
    };
    let mut parts = parts.into_iter();
    let source = as_text(parts.next()?)?;
    let translation = as_text(parts.next()?)?;
    Some(TranslationPair::new(source, translation))
}

fn as_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        let pairs = parse_pairs_reply(r#"[["Hello", "你好"], ["World", "世界"]]"#).unwrap();
        assert_eq!(
            pairs,
            vec![
                TranslationPair::new("Hello", "你好"),
                TranslationPair::new("World", "世界"),
            ]
        );
    }

    #[test]
    fn prefers_first_fenced_block() {
        let reply = "Here you go:\n```json\n[[\"Hello\", \"你好\"]]\n```\nand also\n```json\n[[\"x\", \"y\"]]\n```";
        let pairs = parse_pairs_reply(reply).unwrap();
        assert_eq!(pairs, vec![TranslationPair::new("Hello", "你好")]);
    }

    #[test]
    fn single_line_fenced_block_is_kept() {
        let pairs = parse_pairs_reply("```[[\"a\",\"b\"]]```\nDone.").unwrap();
        assert_eq!(pairs, vec![TranslationPair::new("a", "b")]);

        let tagged = parse_pairs_reply("```json\n[[\"c\",\"d\"]]\n```").unwrap();
        assert_eq!(tagged, vec![TranslationPair::new("c", "d")]);
    }

    #[test]
    fn skips_leading_prose() {
        let reply = "Sure! The translation is: [[\"Save\", \"保存\"]] Hope it helps.";
        let pairs = parse_pairs_reply(reply).unwrap();
        assert_eq!(pairs, vec![TranslationPair::new("Save", "保存")]);
    }

    #[test]
    fn keeps_complete_pairs_of_truncated_reply() {
        let reply = r#"```json
[["Hello", "你好"], ["World", "世界"], ["Open the do"#;
        let pairs = parse_pairs_reply(reply).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], TranslationPair::new("World", "世界"));
    }

    #[test]
    fn tolerates_trailing_comma() {
        let pairs = parse_pairs_reply(r#"[["a", "b"], ["c", "d"],]"#).unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn brackets_inside_strings_do_not_confuse_repair() {
        let reply = r#"[["[1] intro", "[1] 简介"], ["x"#;
        let pairs = parse_pairs_reply(reply).unwrap();
        assert_eq!(pairs, vec![TranslationPair::new("[1] intro", "[1] 简介")]);
    }

    #[test]
    fn malformed_entries_are_skipped() {
        let pairs = parse_pairs_reply(r#"[["a", "b"], "oops", ["only one"], ["c", "d"]]"#).unwrap();
        let sources = pairs.iter().map(|p| p.source.as_str()).collect::<Vec<_>>();
        assert_eq!(sources, vec!["a", "c"]);
    }

    #[test]
    fn rejects_replies_without_pairs() {
        assert!(parse_pairs_reply("I cannot help with that.").is_err());
        assert!(parse_pairs_reply("[").is_err());
        assert!(parse_pairs_reply("[]").is_err());
    }

    #[test]
    fn prompt_lists_blocks_as_json() {
        let texts = vec!["Hello".to_string(), "\"quoted\"".to_string()];
        let prompt = render_batch_prompt(&texts, LanguagePair::default()).unwrap();
        assert!(prompt.contains("translating English into Simplified Chinese"));
        assert!(prompt.ends_with(r#"["Hello","\"quoted\""]"#));
    }
}
