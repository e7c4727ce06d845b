//! Turning free-form provider output into one category and a tag list.
//!
//! Providers are asked for `Category: …` / `Tags: …` lines, but models
//! wander: they wrap answers in code fences, answer in JSON, bold the
//! labels, or list tags as bullets. Everything here tolerates that and
//! never fails; unusable output degrades to [`UNCATEGORIZED`] with no tags.

use std::collections::HashSet;

use crate::models::UNCATEGORIZED;

const MAX_CATEGORY_CHARS: usize = 60;

/// Split a raw model response into a category and un-normalized tags.
pub fn parse_response(raw: &str) -> (String, Vec<String>) {
    let body = strip_code_fence(raw);

    if let Some(parsed) = parse_json_object(body) {
        return parsed;
    }

    let mut category: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();
    let mut in_tag_list = false;

    for line in body.lines() {
        let cleaned = strip_line_decoration(line);
        if cleaned.is_empty() {
            in_tag_list = false;
            continue;
        }

        if let Some(value) = labelled(cleaned, &["main category", "category"]) {
            if category.is_none() && !value.is_empty() {
                category = Some(value.to_string());
            }
            in_tag_list = false;
        } else if let Some(value) = labelled(cleaned, &["tags", "keywords"]) {
            if value.is_empty() {
                in_tag_list = true;
            } else {
                tags.push(value.to_string());
            }
        } else if in_tag_list && is_bullet(line) {
            tags.push(cleaned.to_string());
        } else {
            in_tag_list = false;
        }
    }

    (category.unwrap_or_default(), tags)
}

/// Trim decoration from a category; empty becomes [`UNCATEGORIZED`].
pub fn normalize_category(raw: &str) -> String {
    let first_line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let trimmed = first_line
        .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '*' | '_' | '`'))
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '*' | '_' | '`' | '.' | ',' | ';' | ':')
        });
    let collapsed = trimmed.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return UNCATEGORIZED.to_string();
    }
    collapsed.chars().take(MAX_CATEGORY_CHARS).collect()
}

/// Split delimited tag lists, lower-case, trim, dedupe (keeping first
/// occurrence order), and cap at `max_tags`.
pub fn normalize_tags<S: AsRef<str>>(raw: &[S], max_tags: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for entry in raw {
        for piece in entry.as_ref().split([',', ';', '\n', '#', '|']) {
            let tag = piece
                .trim()
                .trim_start_matches(|c: char| matches!(c, '-' | '*' | '•'))
                .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '[' | ']' | '.'))
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            if tag.is_empty() {
                continue;
            }
            if out.len() >= max_tags {
                return out;
            }
            if seen.insert(tag.clone()) {
                out.push(tag);
            }
        }
    }

    out
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as ```json
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim()
}

fn parse_json_object(body: &str) -> Option<(String, Vec<String>)> {
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(&body[start..=end]).ok()?;
    let obj = value.as_object()?;

    let category = ["category", "main_category", "Category"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_str())?
        .to_string();

    let tags = match ["tags", "Tags", "keywords"].iter().find_map(|k| obj.get(*k)) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };

    Some((category, tags))
}

fn strip_line_decoration(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| matches!(c, '-' | '*' | '#' | '>' | '•'))
        .trim()
}

fn is_bullet(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('-') || t.starts_with('*') || t.starts_with('•')
}

/// If `line` starts with one of `labels` followed by `:`, return the value.
fn labelled<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let (label, value) = line.split_once(':')?;
    let label = label
        .trim()
        .trim_matches(|c: char| matches!(c, '*' | '_'))
        .trim()
        .to_ascii_lowercase();
    if labels.contains(&label.as_str()) {
        Some(value.trim().trim_start_matches(['*', '_']).trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_two_line_answer() {
        let (category, tags) = parse_response("Category: Programming\nTags: Rust, Async, tokio");
        assert_eq!(category, "Programming");
        assert_eq!(normalize_tags(&tags, 10), vec!["rust", "async", "tokio"]);
    }

    #[test]
    fn bold_labels_and_bullets() {
        let raw = "**Category:** Productivity\n**Tags:**\n- Tabs\n- browser extensions\n- tabs\n\nHope this helps!";
        let (category, tags) = parse_response(raw);
        assert_eq!(normalize_category(&category), "Productivity");
        assert_eq!(
            normalize_tags(&tags, 10),
            vec!["tabs", "browser extensions"]
        );
    }

    #[test]
    fn json_answer_in_code_fence() {
        let raw = "```json\n{\"category\": \"Research\", \"tags\": [\"ML\", \"Papers\"]}\n```";
        let (category, tags) = parse_response(raw);
        assert_eq!(category, "Research");
        assert_eq!(normalize_tags(&tags, 10), vec!["ml", "papers"]);
    }

    #[test]
    fn garbage_degrades_to_uncategorized() {
        let (category, tags) = parse_response("I'm sorry, I cannot help with that.");
        assert_eq!(normalize_category(&category), UNCATEGORIZED);
        assert!(normalize_tags(&tags, 10).is_empty());

        let (category, tags) = parse_response("");
        assert_eq!(normalize_category(&category), UNCATEGORIZED);
        assert!(tags.is_empty());
    }

    #[test]
    fn category_decoration_is_trimmed() {
        assert_eq!(normalize_category("  \"Coding\". "), "Coding");
        assert_eq!(normalize_category("Social   Media\nextra"), "Social Media");
        assert_eq!(normalize_category("   "), UNCATEGORIZED);
    }

    #[test]
    fn tags_dedupe_in_order_and_cap() {
        let raw = vec!["#Rust #async", "Rust; WASM, , web", "a,b,c,d,e,f,g,h"];
        let tags = normalize_tags(&raw, 6);
        assert_eq!(tags, vec!["rust", "async", "wasm", "web", "a", "b"]);
    }

    #[test]
    fn zero_cap_yields_no_tags() {
        assert!(normalize_tags(&["rust, async"], 0).is_empty());
    }
}
