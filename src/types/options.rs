use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Provider-agnostic reasoning dial. Each adapter maps a level to its
/// provider's notion of a thinking budget or effort (see
/// `providers::shared::reasoning`). On a non-reasoning model every level
/// other than `Off` is ignored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    #[default]
    Off,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    #[serde(rename = "function")]
    Function { name: String },
}

/// Full per-request options accepted by every adapter through the dispatch
/// layer. Fields a given wire format has no use for are ignored by its
/// adapter.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub headers: Option<HashMap<String, String>>,
    pub tool_choice: Option<ToolChoice>,
    pub reasoning: Option<ReasoningLevel>,
    /// Explicit thinking-token budget. Overrides the level table on
    /// providers that take a budget rather than an effort.
    pub thinking_budget_tokens: Option<u32>,
    pub cancel: Option<CancellationToken>,
}

/// Reduced options surface for `stream_simple`: a reasoning level plus the
/// handful of knobs every provider understands.
#[derive(Debug, Clone, Default)]
pub struct SimpleStreamOptions {
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub reasoning: Option<ReasoningLevel>,
    pub cancel: Option<CancellationToken>,
}

impl From<SimpleStreamOptions> for StreamOptions {
    fn from(simple: SimpleStreamOptions) -> Self {
        Self {
            api_key: simple.api_key,
            temperature: simple.temperature,
            max_tokens: simple.max_tokens,
            reasoning: simple.reasoning,
            cancel: simple.cancel,
            ..Self::default()
        }
    }
}
