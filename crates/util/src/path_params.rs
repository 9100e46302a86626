//! `{name}` placeholder filling for URL paths.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Map as JsonMap, Value};
use utcp_types::UtcpError;

/// Text form of an argument value: strings verbatim, everything else as JSON.
pub fn argument_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Replaces every `{name}` in `url` with the percent-encoded argument of the
/// same name and removes the consumed arguments from `arguments`.
///
/// A placeholder without a matching argument is an error.
pub fn fill_path_placeholders(url: &str, arguments: &mut JsonMap<String, Value>) -> Result<String, UtcpError> {
    let mut filled = String::with_capacity(url.len());
    let mut rest = url;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|offset| open + offset) else {
            break;
        };
        let name = &rest[open + 1..close];
        filled.push_str(&rest[..open]);

        let value = arguments
            .remove(name)
            .ok_or_else(|| UtcpError::invalid_configuration(format!("Missing value for URL path parameter '{name}'")))?;
        filled.push_str(&utf8_percent_encode(&argument_to_string(&value), NON_ALPHANUMERIC).to_string());
        rest = &rest[close + 1..];
    }

    filled.push_str(rest);
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> JsonMap<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_fills_and_consumes_arguments() {
        let mut arguments = args(json!({"app": "my app", "dyno": 1, "verbose": true}));
        let url = fill_path_placeholders("https://api.test/apps/{app}/dynos/{dyno}", &mut arguments).expect("fill");
        assert_eq!(url, "https://api.test/apps/my%20app/dynos/1");
        assert_eq!(arguments, args(json!({"verbose": true})));
    }

    #[test]
    fn test_missing_argument_is_an_error() {
        let mut arguments = JsonMap::new();
        let error = fill_path_placeholders("https://api.test/users/{id}", &mut arguments).expect_err("missing");
        assert!(error.to_string().contains("'id'"));
    }

    #[test]
    fn test_urls_without_placeholders_are_unchanged() {
        let mut arguments = args(json!({"q": "x"}));
        assert_eq!(fill_path_placeholders("https://api.test/search", &mut arguments).expect("fill"), "https://api.test/search");
        assert_eq!(arguments.len(), 1);
    }
}
