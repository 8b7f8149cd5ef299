//! Text cleanup helpers for model output and reports

use std::sync::OnceLock;

use regex::Regex;
use scraper::Html;
use unicode_normalization::UnicodeNormalization;

/// Collapse runs of blank lines into a single blank line and trim the ends
pub fn normalize_newlines(text: &str) -> String {
    static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
    let re = BLANK_RUNS.get_or_init(|| Regex::new(r"(\n\s*\n)+").expect("static regex"));
    re.replace_all(text.trim(), "\n\n").into_owned()
}

/// Remove HTML tags, keeping the text content (entities decoded)
pub fn remove_html_markup(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    normalize_newlines(&text)
}

fn custom_replacement(c: char) -> Option<&'static str> {
    match c {
        '\u{2014}' => Some(" - "),
        '\u{2013}' => Some("-"),
        '\u{201C}' | '\u{201D}' => Some("\""),
        '\u{2018}' | '\u{2019}' => Some("'"),
        '\u{2026}' => Some("..."),
        _ => None,
    }
}

/// Map text to plain ASCII.
///
/// Dashes, curly quotes and the ellipsis get readable replacements; every
/// other character is decomposed (NFKD) and whatever is not ASCII is dropped.
pub fn replace_special_chars_with_ascii(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        match custom_replacement(c) {
            Some(replacement) => result.push_str(replacement),
            None if c.is_ascii() => result.push(c),
            None => result.extend(std::iter::once(c).nfkd().filter(char::is_ascii)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("\n\na\n\n\n  \nb\n"), "a\n\nb");
        assert_eq!(normalize_newlines("a\nb"), "a\nb");
    }

    #[test]
    fn test_remove_html_markup() {
        let html = "<h1>Title</h1>\n\n\n<p>Some &amp; <b>bold</b> text</p><ol><li>one</li></ol>";
        assert_eq!(remove_html_markup(html), "Title\n\nSome & bold textone");
    }

    #[test]
    fn test_plain_text_survives_markup_removal() {
        assert_eq!(remove_html_markup("no tags at all"), "no tags at all");
    }

    #[test]
    fn test_replace_special_chars() {
        assert_eq!(
            replace_special_chars_with_ascii("\u{201C}Caf\u{e9}\u{201D} \u{2014} na\u{ef}ve\u{2026}"),
            "\"Cafe\"  -  naive..."
        );
        assert_eq!(replace_special_chars_with_ascii("x\u{2013}y \u{2019}s"), "x-y 's");
        assert_eq!(replace_special_chars_with_ascii("\u{4e2d}\u{6587}"), "");
    }
}
