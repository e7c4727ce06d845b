//! Text cleanup shared by capture and fetch.
//!
//! Markup stripping, HTML entity decoding, mis-encoding repair, and
//! char-boundary-safe truncation. Everything here is pure and infallible.

use encoding_rs::WINDOWS_1252;
use regex::Regex;
use std::sync::LazyLock;

/// Elements whose contents are never visible text.
const INVISIBLE_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg", "head"];

static INVISIBLE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    INVISIBLE_ELEMENTS
        .iter()
        .map(|tag| Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).unwrap())
        .collect()
});

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

static BLOCK_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|td|th|table|section|article|header|footer|nav|aside|main|blockquote|pre|hr|dt|dd|figcaption)\b[^>]*>",
    )
    .unwrap()
});

static ANY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,10});").unwrap());

static INLINE_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\r\f\v\u{a0}]+").unwrap());

/// Sequences that show up when UTF-8 bytes were decoded as Windows-1252.
const MOJIBAKE_MARKERS: &[&str] = &["Ã", "Â", "â€", "â„", "Ä", "Å", "Ð", "Ñ", "ï»¿"];

/// Reduce an HTML document to readable text, one block per line.
pub fn html_to_text(html: &str) -> String {
    let mut s = COMMENT_RE.replace_all(html, " ").into_owned();
    for re in INVISIBLE_RES.iter() {
        s = re.replace_all(&s, " ").into_owned();
    }
    let s = BLOCK_TAG_RE.replace_all(&s, "\n");
    let s = ANY_TAG_RE.replace_all(&s, "");
    let s = decode_entities(&s);
    collapse_whitespace(&s)
}

/// Collapse runs of inline whitespace and drop blank lines.
pub fn collapse_whitespace(s: &str) -> String {
    s.lines()
        .map(|line| INLINE_SPACE_RE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode named and numeric HTML character references.
///
/// Unknown names are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let body = &caps[1];
            decode_entity(body).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn decode_entity(body: &str) -> Option<String> {
    if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let decoded = match body {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "hellip" => "\u{2026}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "euro" => "\u{20ac}",
        _ => return None,
    };
    Some(decoded.to_string())
}

/// Undo UTF-8 text that was decoded as Windows-1252, and drop replacement
/// characters and NULs.
///
/// The round trip is only kept when it yields valid UTF-8 that is shorter
/// than the input, so correctly encoded text passes through unchanged.
pub fn repair_mojibake(s: &str) -> String {
    let mut out = s.to_string();
    if MOJIBAKE_MARKERS.iter().any(|m| out.contains(m)) {
        let (bytes, _, unmappable) = WINDOWS_1252.encode(&out);
        if !unmappable {
            if let Ok(fixed) = std::str::from_utf8(&bytes) {
                if fixed.chars().count() < out.chars().count() {
                    out = fixed.to_string();
                }
            }
        }
    }
    out.retain(|c| c != '\u{fffd}' && c != '\0');
    out
}

/// Remove control characters and invisible formatting characters.
pub fn strip_invisible(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() && !is_format_char(*c))
        .collect()
}

fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{00ad}'
            | '\u{200b}'..='\u{200f}'
            | '\u{202a}'..='\u{202e}'
            | '\u{2060}'..='\u{2064}'
            | '\u{feff}'
    )
}

/// Truncate to at most `max_chars` characters without splitting a char.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><title>x</title><style>p{color:red}</style></head>
            <body><script>var a = "<p>";</script><h1>Hello</h1><p>World &amp; friends</p>
            <!-- hidden --><div>Last<br>line</div></body></html>"#;
        assert_eq!(html_to_text(html), "Hello\nWorld & friends\nLast\nline");
    }

    #[test]
    fn decodes_numeric_and_named_entities() {
        assert_eq!(decode_entities("Test &amp; Title"), "Test & Title");
        assert_eq!(decode_entities("&#65;&#x42;"), "AB");
        assert_eq!(decode_entities("&unknown; stays"), "&unknown; stays");
    }

    #[test]
    fn repairs_double_encoded_utf8() {
        assert_eq!(repair_mojibake("cafÃ©"), "café");
        assert_eq!(repair_mojibake("donâ€™t"), "don\u{2019}t");
        assert_eq!(repair_mojibake("already café"), "already café");
        assert_eq!(repair_mojibake("bad\u{fffd}byte"), "badbyte");
    }

    #[test]
    fn strips_control_and_zero_width() {
        assert_eq!(strip_invisible("Test\u{0}Title"), "TestTitle");
        assert_eq!(strip_invisible("Test\u{200b}Title"), "TestTitle");
        assert_eq!(strip_invisible(""), "");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
