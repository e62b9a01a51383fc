use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

/// Parse a header string in format "Name: Value" and add it to the HeaderMap
pub fn parse_and_add_header(headers: &mut HeaderMap, header_str: &str) {
    let Some((name, value)) = header_str.split_once(':') else {
        warn!(
            "Invalid header format: '{}'. Expected 'Name: Value'",
            header_str
        );
        return;
    };

    let name = name.trim();
    let value = value.trim();

    let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
        warn!("Invalid header name: '{}'", name);
        return;
    };

    let Ok(header_value) = HeaderValue::from_str(value) else {
        warn!("Invalid header value: '{}'", value);
        return;
    };

    // values may carry cookies or tokens
    debug!("Adding header: {}", name);
    headers.insert(header_name, header_value);
}

/// Parse a collection of header strings and return a HeaderMap
pub fn parse_headers(header_strings: &[String]) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for header_str in header_strings {
        parse_and_add_header(&mut headers, header_str);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(&[
            "Cookie: session=abc".to_string(),
            "Authorization: Bearer a:b".to_string(),
        ]);
        assert_eq!(headers.get("cookie").unwrap(), "session=abc");
        // only the first colon separates name and value
        assert_eq!(headers.get("authorization").unwrap(), "Bearer a:b");
    }

    #[test]
    fn test_invalid_headers_are_skipped() {
        let headers = parse_headers(&[
            "no separator".to_string(),
            "bad name: x".to_string(),
            "X-Ok: 1".to_string(),
        ]);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-ok").unwrap(), "1");
    }

    #[test]
    fn test_later_header_replaces_earlier() {
        let headers = parse_headers(&["X-A: 1".to_string(), "x-a: 2".to_string()]);
        assert_eq!(headers.get("x-a").unwrap(), "2");
    }
}
