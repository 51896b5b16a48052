//! Cross-provider utilities for consistent behavior across all LLM providers.

pub mod json_parse;
pub mod sanitize;
pub mod think_tag_parser;
pub mod validation;

pub use json_parse::parse_partial_json;
pub use sanitize::sanitize_for_api;
pub use think_tag_parser::{ThinkFragment, ThinkTagParser};
pub use validation::{validate_tool_arguments, validate_tool_call};
