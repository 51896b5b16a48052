//! Unicode sanitization for outbound requests.
//!
//! Several APIs reject payloads containing U+FFFD replacement characters,
//! which show up when upstream data went through a lossy decode. Rust
//! strings are always valid UTF-8, so this is the only surrogate-adjacent
//! cleanup that applies here.

/// Strip replacement characters from a string.
///
/// # Example
///
/// ```
/// use manifold_llm::utils::sanitize::sanitize_for_api;
///
/// assert_eq!(sanitize_for_api("Hello\u{FFFD}World"), "HelloWorld");
/// assert_eq!(sanitize_for_api("Hello, world!"), "Hello, world!");
/// ```
pub fn sanitize_for_api(s: &str) -> String {
    if !s.contains('\u{FFFD}') {
        return s.to_string();
    }
    s.chars().filter(|c| *c != '\u{FFFD}').collect()
}
