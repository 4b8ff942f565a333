//! Light textual clean-up applied to every completion reply before it is stored.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const WARNING_GLYPH: &str = "🚨";
pub const CELEBRATION_GLYPH: &str = "🎉";

// Word boundaries are checked by hand in `annotate`: only ASCII letters, digits and
// `_` count as word characters, so "éerror" still matches.
static WARNING_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:error|failed|issue|problem)").expect("warning word pattern is valid")
});

static CELEBRATION_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:success|great|awesome|perfect)")
        .expect("celebration word pattern is valid")
});

fn is_ascii_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Turn a raw reply into display text.
///
/// A reply that is a single JSON document is pretty-printed inside a `json`
/// fence. Keywords are then prefixed with a warning or celebration glyph.
pub fn process(raw: &str) -> String {
    let text = fence_json(raw).unwrap_or_else(|| raw.to_string());
    let text = annotate(&text, &WARNING_WORDS, WARNING_GLYPH);
    annotate(&text, &CELEBRATION_WORDS, CELEBRATION_GLYPH)
}

/// `Some(fenced)` when `raw` parses as JSON; parse failure is the normal case.
fn fence_json(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let pretty = serde_json::to_string_pretty(&value).ok()?;
    Some(format!("```json\n{pretty}\n```"))
}

/// Prefix every match of `words` with `glyph`, skipping words already prefixed.
fn annotate(text: &str, words: &Regex, glyph: &str) -> String {
    let marker = format!("{glyph} ");
    words
        .replace_all(text, |caps: &Captures| {
            let Some(m) = caps.get(0) else {
                return String::new();
            };
            let before = text[..m.start()].chars().next_back();
            let after = text[m.end()..].chars().next();
            let whole_word = !before.is_some_and(is_ascii_word) && !after.is_some_and(is_ascii_word);
            if !whole_word || text[..m.start()].ends_with(&marker) {
                m.as_str().to_string()
            } else {
                format!("{marker}{}", m.as_str())
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_reply_is_pretty_printed_in_a_fence() {
        assert_eq!(process(r#"{"a":1}"#), "```json\n{\n  \"a\": 1\n}\n```");
    }

    #[test]
    fn json_object_keys_keep_reply_order() {
        assert_eq!(
            process(r#"{"name":"x","age":3}"#),
            "```json\n{\n  \"name\": \"x\",\n  \"age\": 3\n}\n```"
        );
    }

    #[test]
    fn nested_json_keeps_structure() {
        let out = process(r#"[1,{"b":[true,null]}]"#);
        assert!(out.starts_with("```json\n["));
        assert!(out.ends_with("\n```"));
        let inner = out
            .trim_start_matches("```json\n")
            .trim_end_matches("\n```");
        let value: serde_json::Value = serde_json::from_str(inner).unwrap();
        assert_eq!(value, serde_json::json!([1, {"b": [true, null]}]));
    }

    #[test]
    fn non_json_passes_through() {
        assert_eq!(process("just some words"), "just some words");
        assert_eq!(process("{not json"), "{not json");
    }

    #[test]
    fn celebration_words_are_prefixed() {
        assert_eq!(
            process("The operation was a great success"),
            "The operation was a 🎉 great 🎉 success"
        );
    }

    #[test]
    fn warning_words_keep_their_casing() {
        assert_eq!(
            process("ERROR: the build Failed with an Issue."),
            "🚨 ERROR: the build 🚨 Failed with an 🚨 Issue."
        );
    }

    #[test]
    fn only_whole_words_match() {
        assert_eq!(process("errors and greatness"), "errors and greatness");
        assert_eq!(process("no_problem here"), "no_problem here");
    }

    #[test]
    fn only_ascii_word_characters_block_a_match() {
        assert_eq!(process("éerror"), "é🚨 error");
        assert_eq!(process("greatError"), "greatError");
        assert_eq!(process("(success)"), "(🎉 success)");
    }

    #[test]
    fn keywords_inside_json_are_annotated_too() {
        let out = process(r#"{"error":"failed"}"#);
        assert!(out.contains("\"🚨 error\""));
        assert!(out.contains("\"🚨 failed\""));
    }

    #[test]
    fn processing_twice_changes_nothing_for_plain_text() {
        let samples = [
            "Perfect! No problem at all, great work.",
            "error error ERROR",
            "",
            "plain text without keywords",
            "awesome-sauce and a failed_test",
        ];
        for sample in samples {
            let once = process(sample);
            assert_eq!(process(&once), once, "sample: {sample:?}");
        }
    }
}
