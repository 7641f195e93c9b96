use crate::error::{ReportError, Result};

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Drop a `<think>...</think>` reasoning block, keeping what follows it.
/// Text without a complete tag pair is returned unchanged.
pub fn strip_reasoning(raw: &str) -> &str {
    match (raw.find(THINK_OPEN), raw.find(THINK_CLOSE)) {
        (Some(_), Some(end)) => raw[end + THINK_CLOSE.len()..].trim(),
        _ => raw.trim(),
    }
}

/// Locate the first top-level JSON object in `raw`.
///
/// Starts at the first `{` and walks forward tracking nesting depth until
/// it returns to zero. Braces inside string literals do not count.
pub fn extract_json_object(raw: &str) -> Result<&str> {
    let text = strip_reasoning(raw);
    let start = text
        .find('{')
        .ok_or_else(|| ReportError::InvalidNarrativeFormat("no JSON object in response".into()))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    // Delimiters are ASCII, so byte offsets are valid char boundaries.
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Err(ReportError::InvalidNarrativeFormat(
        "unterminated JSON object in response".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extracts_object_between_commentary() {
        let raw = "Sure! Here is the report:\n{\"a\": {\"b\": 1}}\nLet me know if you need more.";
        assert_eq!(extract_json_object(raw).unwrap(), "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn test_strips_reasoning_block() {
        let raw = "<think>The user wants {json}. I should {think}.</think>\n{\"ok\": true}";
        assert_eq!(extract_json_object(raw).unwrap(), "{\"ok\": true}");
    }

    #[test]
    fn test_unpaired_think_tag_is_left_alone() {
        let raw = "<think> never closed {\"ok\": true}";
        assert_eq!(extract_json_object(raw).unwrap(), "{\"ok\": true}");
    }

    #[test]
    fn test_braces_inside_strings_do_not_count() {
        let raw = r#"note {"text": "a } brace and a \" quote {", "n": {"m": 2}} trailing }"#;
        assert_eq!(
            extract_json_object(raw).unwrap(),
            r#"{"text": "a } brace and a \" quote {", "n": {"m": 2}}"#
        );
    }

    #[test]
    fn test_no_brace_is_invalid_format() {
        let err = extract_json_object("I cannot help with that.").unwrap_err();
        assert!(matches!(err, ReportError::InvalidNarrativeFormat(_)));
    }

    #[test]
    fn test_unterminated_object_is_invalid_format() {
        let err = extract_json_object("{\"a\": {\"b\": 1}").unwrap_err();
        assert!(matches!(err, ReportError::InvalidNarrativeFormat(_)));
    }

    fn json_object() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(serde_json::Value::from),
            "[ -~]{0,12}".prop_map(serde_json::Value::from),
            any::<bool>().prop_map(serde_json::Value::from),
        ];
        let value = leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
            ]
        });
        prop::collection::btree_map("[a-z_]{1,8}", value, 0..5).prop_map(|m| {
            serde_json::to_string(&serde_json::Value::Object(m.into_iter().collect())).unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_recovers_exact_object_span(
            object in json_object(),
            prefix in "[A-Za-z0-9 .,:!\n]{0,40}",
            suffix in "[A-Za-z0-9 .,:!{}\n]{0,40}",
        ) {
            let raw = format!("{}{}{}", prefix, object, suffix);
            prop_assert_eq!(extract_json_object(&raw).unwrap(), object.as_str());
        }
    }
}
