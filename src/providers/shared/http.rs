//! HTTP client utilities for providers.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

/// How a provider authenticates its requests.
pub(crate) enum AuthHeader<'a> {
    /// `Authorization: Bearer <token>`
    Bearer(&'a str),
    /// A named header, e.g. `x-api-key` or `api-key`.
    Named { name: &'static str, value: &'a str },
    /// No auth header (credentials ride elsewhere, e.g. a query parameter).
    None,
}

/// Build an HTTP client with auth and merged default headers.
pub(crate) fn build_http_client(
    auth: AuthHeader<'_>,
    model_headers: Option<&HashMap<String, String>>,
    extra_headers: Option<&HashMap<String, String>>,
) -> Result<reqwest::Client, crate::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match auth {
        AuthHeader::Bearer(token) => {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| crate::Error::InvalidHeader(e.to_string()))?,
            );
        }
        AuthHeader::Named { name, value } => {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_str(value)
                    .map_err(|e| crate::Error::InvalidHeader(e.to_string()))?,
            );
        }
        AuthHeader::None => {}
    }

    merge_headers(&mut headers, model_headers);
    merge_headers(&mut headers, extra_headers);

    reqwest::Client::builder()
        .default_headers(headers)
        .build()
        .map_err(crate::Error::from)
}

/// Merge optional headers into a HeaderMap.
///
/// Invalid header names or values are silently skipped.
pub(crate) fn merge_headers(target: &mut HeaderMap, source: Option<&HashMap<String, String>>) {
    let Some(source) = source else { return };
    for (key, value) in source {
        if let (Ok(name), Ok(val)) = (
            HeaderName::try_from(key.as_str()),
            HeaderValue::from_str(value),
        ) {
            target.insert(name, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_headers_adds_valid() {
        let mut target = HeaderMap::new();
        let source = HashMap::from([
            ("X-Custom".to_string(), "value".to_string()),
            ("X-Another".to_string(), "test".to_string()),
        ]);
        merge_headers(&mut target, Some(&source));
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn merge_headers_skips_invalid() {
        let mut target = HeaderMap::new();
        let source = HashMap::from([
            ("X-Valid".to_string(), "ok".to_string()),
            ("Invalid\nHeader".to_string(), "bad".to_string()),
        ]);
        merge_headers(&mut target, Some(&source));
        assert_eq!(target.len(), 1);
    }

    #[test]
    fn merge_headers_handles_none() {
        let mut target = HeaderMap::new();
        target.insert("X-Existing", HeaderValue::from_static("value"));
        merge_headers(&mut target, None);
        assert_eq!(target.len(), 1);
    }
}
