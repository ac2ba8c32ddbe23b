//! Pre-parse repair of near-JSON classifier output.
//!
//! The cleaning model is asked to answer with bare JSON, but it regularly
//! decorates its answer: a `CLEANED:` label in front of the object, a stray
//! `Valid.` token, or a rejection wrapped inside the `output` field
//! (`{"input":"…","output":{"reason":"images"}}`). [`repair_response`] undoes
//! those known artifacts before the text reaches the JSON parser. Everything
//! the record cleaner knows about the model's quirks lives here.
//!
//! # Example
//!
//! ```
//! use dataset_cleaner::utils::response_repair::repair_response;
//!
//! assert_eq!(repair_response("CLEANED: {\"input\":\"a\"}"), "{\"input\":\"a\"}");
//! assert_eq!(
//!     repair_response("{\"input\":\"hi\",\"output\":{\"reason\":\"images\"}}"),
//!     "{\"reason\":\"images\"}"
//! );
//! ```

use regex::Regex;
use std::sync::OnceLock;

/// Label the model sometimes puts in front of the cleaned object.
const CLEANED_PREFIX: &str = "CLEANED:";

/// Token the model sometimes emits before (or instead of) its answer.
const VALID_PREFIX: &str = "Valid.";

/// Matches a rejection that was nested inside the `output` field.
fn nested_rejection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#""output"\s*:\s*\{\s*"reason"\s*:\s*"(conversational|images|irrelevant)"\s*\}\s*\}"#,
        )
        .expect("nested rejection pattern is a valid regex")
    })
}

/// Strip one leading `prefix` (case-sensitive) and the whitespace after it.
fn strip_label<'a>(text: &'a str, prefix: &str) -> &'a str {
    text.strip_prefix(prefix)
        .map(str::trim_start)
        .unwrap_or(text)
}

/// Normalize raw classifier text into something the JSON parser can accept.
///
/// Steps, in order:
/// 1. trim surrounding whitespace;
/// 2. drop a leading `CLEANED:` label, keeping the object that follows;
/// 3. drop a leading `Valid.` token;
/// 4. if a rejection is nested under `output`, replace the whole response
///    with the canonical `{"reason":"…"}` object.
///
/// Text without any of these artifacts is returned trimmed but otherwise
/// untouched; this function never validates JSON.
pub fn repair_response(raw: &str) -> String {
    let mut text = raw.trim();
    text = strip_label(text, CLEANED_PREFIX);
    text = strip_label(text, VALID_PREFIX);

    if let Some(caps) = nested_rejection_pattern().captures(text) {
        return format!(r#"{{"reason":"{}"}}"#, &caps[1]);
    }

    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_json_untouched() {
        let input = r#"{"input":"a","output":"b"}"#;
        assert_eq!(repair_response(input), input);
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(repair_response("  \n{\"reason\":\"images\"}\n"), r#"{"reason":"images"}"#);
    }

    #[test]
    fn test_strips_cleaned_label() {
        let input = r#"CLEANED: {"input":"a","output":"b"}"#;
        assert_eq!(repair_response(input), r#"{"input":"a","output":"b"}"#);
    }

    #[test]
    fn test_strips_cleaned_label_without_space() {
        assert_eq!(repair_response(r#"CLEANED:{"input":"a"}"#), r#"{"input":"a"}"#);
    }

    #[test]
    fn test_strips_valid_token() {
        assert_eq!(repair_response(r#"Valid. {"input":"a"}"#), r#"{"input":"a"}"#);
        assert_eq!(repair_response("Valid."), "");
    }

    #[test]
    fn test_nested_rejection_replaced() {
        for reason in ["conversational", "images", "irrelevant"] {
            let input = format!(
                r#"{{"input":"see the picture","output":{{"reason":"{}"}}}}"#,
                reason
            );
            assert_eq!(repair_response(&input), format!(r#"{{"reason":"{}"}}"#, reason));
        }
    }

    #[test]
    fn test_nested_rejection_with_whitespace() {
        let input = r#"{"input": "x", "output": { "reason": "images" } }"#;
        assert_eq!(repair_response(input), r#"{"reason":"images"}"#);
    }

    #[test]
    fn test_unknown_nested_reason_untouched() {
        let input = r#"{"input":"x","output":{"reason":"spam"}}"#;
        assert_eq!(repair_response(input), input);
    }

    #[test]
    fn test_label_in_middle_untouched() {
        let input = r#"{"input":"CLEANED: text","output":"Valid."}"#;
        assert_eq!(repair_response(input), input);
    }
}
