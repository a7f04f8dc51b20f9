use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use postboard::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/profile/alice/?page=2");
/// assert_eq!(params.get("page"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match uri.find('?') {
        Some(query_start) => parse_pairs(&uri[query_start + 1..]),
        None => HashMap::new(),
    }
}

/// Parse an `application/x-www-form-urlencoded` request body.
pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    parse_pairs(&String::from_utf8_lossy(body))
}

fn parse_pairs(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&').filter(|p| !p.is_empty()) {
        match param.split_once('=') {
            Some((key, value)) => {
                params.insert(decode(key), decode(value));
            }
            // Flag parameter without value
            None => {
                params.insert(decode(param), String::new());
            }
        }
    }

    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Get a string parameter from parsed query params with optional default
pub fn get_string(params: &HashMap<String, String>, key: &str, default: Option<&str>) -> Option<String> {
    params
        .get(key)
        .cloned()
        .or_else(|| default.map(|d| d.to_string()))
}

/// A trimmed, non-empty parameter value
pub fn get_non_empty<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_values_are_decoded() {
        let params = parse_query_params("/auth/login/?next=%2Fposts%2F1%2F&flag");
        assert_eq!(params.get("next").map(String::as_str), Some("/posts/1/"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert!(parse_query_params("/").is_empty());
    }

    #[test]
    fn form_bodies_treat_plus_as_space() {
        let form = parse_form(b"text=hello+world%21&group=");
        assert_eq!(form.get("text").map(String::as_str), Some("hello world!"));
        assert_eq!(get_non_empty(&form, "group"), None);
        assert_eq!(get_string(&form, "image", Some("none")).as_deref(), Some("none"));
    }
}
