// Parse-with-fallback policy for free-form text inputs
//
// Inputs arriving from a chat surface are either a bare value ("0818ef22-...")
// or a small JSON envelope ({"input": "0818ef22-..."}). Both are accepted;
// anything that is not recognised as JSON is used verbatim.

use serde_json::Value;

/// Outcome of [`parse_with_fallback`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputValue {
    /// Extracted from a JSON document
    Structured(String),
    /// Used as-is because the text was not a recognised JSON shape
    Raw(String),
}

impl InputValue {
    pub fn into_value(self) -> String {
        match self {
            InputValue::Structured(v) | InputValue::Raw(v) => v,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InputValue::Structured(v) | InputValue::Raw(v) => v,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, InputValue::Structured(_))
    }
}

/// Extract `field` from a JSON object, or fall back to the raw text
///
/// - `{"<field>": "value"}` yields `Structured("value")`
/// - `"value"` (a JSON string) yields `Structured("value")`
/// - anything else yields `Raw(text.trim())`
pub fn parse_with_fallback(text: &str, field: &str) -> InputValue {
    let trimmed = text.trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get(field) {
            Some(Value::String(s)) => InputValue::Structured(s.trim().to_string()),
            Some(other) => {
                tracing::debug!(
                    "Field '{}' is not a string ({}), using raw input",
                    field,
                    other
                );
                InputValue::Raw(trimmed.to_string())
            }
            None => {
                tracing::debug!("JSON input has no '{}' field, using raw input", field);
                InputValue::Raw(trimmed.to_string())
            }
        },
        Ok(Value::String(s)) => InputValue::Structured(s.trim().to_string()),
        Ok(_) => InputValue::Raw(trimmed.to_string()),
        Err(e) => {
            tracing::debug!("Input is not JSON ({}), using raw input", e);
            InputValue::Raw(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_field_from_object() {
        let parsed = parse_with_fallback(r#"{"input": " abc-123 "}"#, "input");
        assert_eq!(parsed, InputValue::Structured("abc-123".to_string()));
        assert!(parsed.is_structured());
    }

    #[test]
    fn test_json_string_is_structured() {
        let parsed = parse_with_fallback(r#""abc""#, "input");
        assert_eq!(parsed.into_value(), "abc");
    }

    #[test]
    fn test_plain_text_falls_back_to_raw() {
        let parsed = parse_with_fallback("  0818ef22-4784-4365-8a35-1f03e8c5e27d\n", "input");
        assert_eq!(
            parsed,
            InputValue::Raw("0818ef22-4784-4365-8a35-1f03e8c5e27d".to_string())
        );
    }

    #[test]
    fn test_object_without_field_falls_back_to_raw() {
        let parsed = parse_with_fallback(r#"{"other": "x"}"#, "input");
        assert_eq!(parsed.as_str(), r#"{"other": "x"}"#);
        assert!(!parsed.is_structured());
    }

    #[test]
    fn test_non_string_field_falls_back_to_raw() {
        let parsed = parse_with_fallback(r#"{"input": 42}"#, "input");
        assert!(!parsed.is_structured());
    }
}
