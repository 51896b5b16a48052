//! Tool call validation against JSON schemas.
//!
//! Validates tool call arguments against the tool's JSON Schema before
//! execution. Failures surface as error tool results visible to the model,
//! never as run failures.

use crate::error::{Error, Result};
use crate::types::{Tool, ToolCall};
use jsonschema::{Draft, JSONSchema};

/// Validate a tool call against the available tools.
///
/// Finds the matching tool by name and validates arguments against its
/// schema.
///
/// # Errors
///
/// `Error::ToolNotFound` when no tool matches the call's name;
/// `Error::ToolValidationFailed` when the arguments do not match the schema.
pub fn validate_tool_call(tools: &[Tool], tool_call: &ToolCall) -> Result<serde_json::Value> {
    let tool = tools
        .iter()
        .find(|t| t.name == tool_call.name)
        .ok_or_else(|| Error::ToolNotFound(tool_call.name.clone()))?;

    validate_tool_arguments(tool, tool_call)
}

/// Validate tool call arguments against the tool's JSON schema, returning
/// the validated arguments.
///
/// The error message lists each violation with its instance path plus the
/// received arguments, so it is useful when echoed back to the model.
pub fn validate_tool_arguments(tool: &Tool, tool_call: &ToolCall) -> Result<serde_json::Value> {
    let schema = JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(&tool.parameters)
        .map_err(|e| Error::ToolValidationFailed(format!("Schema compile error: {}", e)))?;

    let args = &tool_call.arguments;

    if let Err(errors) = schema.validate(args) {
        let error_messages: Vec<String> = errors
            .map(|err| {
                let path = err.instance_path.to_string();
                let path = if path.is_empty() {
                    "root".to_string()
                } else {
                    path
                };
                format!("  - {}: {}", path, err)
            })
            .collect();

        let error_msg = format!(
            "Validation failed for tool \"{}\":\n{}\n\nReceived arguments:\n{}",
            tool_call.name,
            error_messages.join("\n"),
            serde_json::to_string_pretty(args).unwrap_or_default()
        );

        return Err(Error::ToolValidationFailed(error_msg));
    }

    Ok(args.clone())
}
