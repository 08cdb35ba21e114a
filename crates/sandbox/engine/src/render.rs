//! Display formatting for payloads.
//!
//! Formatting never fails: anything that cannot be pretty-printed is shown
//! in its raw form.

use serde::Serialize;
use tracing::debug;

/// Pretty-print a body that may contain JSON. Non-JSON bodies come back
/// unchanged.
pub fn pretty_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

/// Pretty-print any serializable value, falling back to its `Debug` form.
pub fn pretty_json<T: Serialize + std::fmt::Debug>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Pretty-print failed, using raw form");
            format!("{:?}", value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn json_body_is_indented() {
        let pretty = pretty_body(r#"{"a":1}"#);
        assert_eq!(pretty, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn html_body_is_raw() {
        let html = "<html><body>hi</body></html>";
        assert_eq!(pretty_body(html), html);
    }

    #[test]
    fn unserializable_value_falls_back() {
        // JSON object keys must be strings.
        let mut map = HashMap::new();
        map.insert((1u8, 2u8), "pair");
        let text = pretty_json(&map);
        assert!(text.contains("pair"));
    }

    #[test]
    fn serializable_value_is_json() {
        let text = pretty_json(&vec![1, 2]);
        assert!(text.starts_with('['));
    }
}
