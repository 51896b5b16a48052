//! Tolerant parsing of partial JSON from streaming tool calls.
//!
//! Tool-call arguments arrive as raw string deltas. Until the block ends the
//! accumulated text is usually a prefix of a well-formed document: an object
//! missing closers, an array cut mid-element, a string cut mid-escape. This
//! parser tracks nesting and quoting, completes whatever is open, and returns
//! the best structured snapshot it can. Strictness is enforced only at block
//! end by the caller.

use serde_json::Value;

/// Parse potentially incomplete JSON, returning the best-effort snapshot.
///
/// Falls back to an empty object when no completion produces valid JSON
/// (e.g. the input ends inside an object key).
///
/// # Example
///
/// ```
/// use manifold_llm::utils::json_parse::parse_partial_json;
/// use serde_json::json;
///
/// let partial = r#"{"items": [1, 2, 3"#;
/// assert_eq!(parse_partial_json(partial), json!({"items": [1, 2, 3]}));
///
/// let mid_string = r#"{"city": "Tok"#;
/// assert_eq!(parse_partial_json(mid_string), json!({"city": "Tok"}));
/// ```
pub fn parse_partial_json(s: &str) -> Value {
    if let Ok(v) = serde_json::from_str(s) {
        return v;
    }

    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('{'),
            '}' if !in_string => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            '[' if !in_string => stack.push('['),
            ']' if !in_string => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut candidate = s.trim_end().to_string();

    // A trailing escape can never complete; drop the backslash.
    if escape_next {
        candidate.pop();
    }

    if in_string {
        candidate.push('"');
    }

    // Dangling separators would make the completion invalid JSON.
    while candidate.ends_with(',') || candidate.ends_with(':') {
        candidate.pop();
    }

    for opener in stack.iter().rev() {
        candidate.push(match opener {
            '{' => '}',
            _ => ']',
        });
    }

    serde_json::from_str(&candidate).unwrap_or_else(|_| Value::Object(Default::default()))
}
