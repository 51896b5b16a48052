//! The single reasoning-budget table shared by all adapters.
//!
//! A provider-agnostic `ReasoningLevel` maps per provider family to a token
//! budget (Anthropic, Google 2.x), an effort string (OpenAI), or a thinking
//! level (Google 3.x). Levels a model does not support fall back to the
//! highest supported lower level; any level on a non-reasoning model is
//! ignored entirely.

use crate::types::ReasoningLevel;

/// Resolve the level actually in effect for a model.
pub(crate) fn effective_level(
    model_is_reasoning: bool,
    requested: Option<ReasoningLevel>,
) -> ReasoningLevel {
    if !model_is_reasoning {
        return ReasoningLevel::Off;
    }
    requested.unwrap_or(ReasoningLevel::Off)
}

/// Anthropic thinking budget in tokens. `None` disables the thinking block.
/// `xhigh` requires model support; otherwise it falls back to `high`.
pub(crate) fn anthropic_budget_tokens(
    level: ReasoningLevel,
    supports_xhigh: bool,
) -> Option<u32> {
    match level {
        ReasoningLevel::Off => None,
        ReasoningLevel::Minimal => Some(1_024),
        ReasoningLevel::Low => Some(2_048),
        ReasoningLevel::Medium => Some(4_096),
        ReasoningLevel::High => Some(8_192),
        ReasoningLevel::Xhigh => Some(if supports_xhigh { 16_384 } else { 8_192 }),
    }
}

/// OpenAI `reasoning_effort` string. `None` means omit the field.
pub(crate) fn openai_effort(level: ReasoningLevel, supports_xhigh: bool) -> Option<&'static str> {
    match level {
        ReasoningLevel::Off => None,
        ReasoningLevel::Minimal => Some("minimal"),
        ReasoningLevel::Low => Some("low"),
        ReasoningLevel::Medium => Some("medium"),
        ReasoningLevel::High => Some("high"),
        ReasoningLevel::Xhigh => Some(if supports_xhigh { "xhigh" } else { "high" }),
    }
}

/// Google 2.x `thinkingBudget` in tokens. Zero disables thinking.
pub(crate) fn google_budget_tokens(level: ReasoningLevel) -> u32 {
    match level {
        ReasoningLevel::Off => 0,
        ReasoningLevel::Minimal => 512,
        ReasoningLevel::Low => 2_048,
        ReasoningLevel::Medium => 8_192,
        ReasoningLevel::High => 16_384,
        ReasoningLevel::Xhigh => 24_576,
    }
}

/// Google 3.x `thinkingLevel` string.
pub(crate) fn google_thinking_level(level: ReasoningLevel) -> &'static str {
    match level {
        ReasoningLevel::Off => "off",
        ReasoningLevel::Minimal | ReasoningLevel::Low => "low",
        ReasoningLevel::Medium => "medium",
        ReasoningLevel::High | ReasoningLevel::Xhigh => "high",
    }
}

/// Gemini 3.x models take a thinking level; 2.x models take a token budget.
pub(crate) fn google_uses_thinking_level(model_id: &str) -> bool {
    model_id.starts_with("gemini-3")
}
