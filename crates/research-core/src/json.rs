//! Cleanup of JSON returned by models
//!
//! Models occasionally pad keys with whitespace (`" scenario"`) or wrap the
//! object in a markdown fence. Both are repaired here before callers index
//! into the value.

use serde_json::{Map, Value};

/// Parse model output as JSON and strip whitespace from every key.
///
/// Falls back to the contents of a ```json fence, then to the first balanced
/// `{...}` object in the text.
pub fn clean_extract_json(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(clean_keys(value)),
        Err(err) => {
            let candidate = extract_json_from_markdown(text).or_else(|| first_json_object(text));
            match candidate.and_then(|c| serde_json::from_str::<Value>(c).ok()) {
                Some(value) => Ok(clean_keys(value)),
                None => Err(err),
            }
        }
    }
}

/// Strip leading/trailing whitespace from keys, recursively through nested
/// objects and arrays. Scalars are returned untouched.
pub fn clean_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.trim().to_string(), clean_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(clean_keys).collect()),
        other => other,
    }
}

/// Extract JSON content from markdown code blocks
fn extract_json_from_markdown(content: &str) -> Option<&str> {
    let patterns = ["```json\n", "```JSON\n", "```\n"];

    for pattern in patterns {
        if let Some(start) = content.find(pattern) {
            let json_start = start + pattern.len();
            if let Some(end) = content[json_start..].find("```") {
                return Some(content[json_start..json_start + end].trim());
            }
        }
    }

    None
}

/// First balanced top-level object, ignoring braces inside strings
fn first_json_object(content: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in content.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| &content[s..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_nested_keys() {
        let raw = r#"{"answer": [{"item_number":15," scenario":{" context ":"Gina learned", "question":"Is Harold informed?"}}]}"#;
        let cleaned = clean_extract_json(raw).unwrap();
        assert_eq!(cleaned["answer"][0]["scenario"]["context"], "Gina learned");
        assert_eq!(cleaned["answer"][0]["item_number"], 15);
    }

    #[test]
    fn test_values_are_not_trimmed() {
        let cleaned = clean_keys(json!({" a": "  padded  ", "b ": [" x "]}));
        assert_eq!(cleaned, json!({"a": "  padded  ", "b": [" x "]}));
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(clean_keys(json!(3)), json!(3));
        assert_eq!(clean_extract_json("\"plain\"").unwrap(), json!("plain"));
    }

    #[test]
    fn test_markdown_fence_fallback() {
        let raw = "Here you go:\n```json\n{\" plan\": []}\n```";
        assert_eq!(clean_extract_json(raw).unwrap(), json!({"plan": []}));
    }

    #[test]
    fn test_embedded_object_fallback() {
        let raw = r#"Sure! {"thought": "use {braces} in text", "action": "print(1)"} Done."#;
        let value = clean_extract_json(raw).unwrap();
        assert_eq!(value["action"], "print(1)");
        assert_eq!(value["thought"], "use {braces} in text");
    }

    #[test]
    fn test_unparseable_is_error() {
        assert!(clean_extract_json("no json here").is_err());
        assert!(clean_extract_json("").is_err());
    }
}
