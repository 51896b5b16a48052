use crate::types::{Api, InputType, KnownProvider, Model, ModelCost, Provider};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_CONTEXT_WINDOW: u32 = 200_000;

fn build_anthropic_model(
    id: &str,
    name: &str,
    cost: ModelCost,
    max_tokens: u32,
) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        api: Api::AnthropicMessages,
        provider: Provider::Known(KnownProvider::Anthropic),
        base_url: ANTHROPIC_BASE_URL.to_string(),
        reasoning: true,
        input: vec![InputType::Text, InputType::Image],
        cost,
        context_window: ANTHROPIC_CONTEXT_WINDOW,
        max_tokens,
        headers: None,
        compat: None,
    }
}

pub fn claude_opus_4_1() -> Model {
    build_anthropic_model(
        "claude-opus-4-1",
        "Claude Opus 4.1",
        ModelCost {
            input: 15.0,
            output: 75.0,
            cache_read: 1.5,
            cache_write: 18.75,
        },
        32_000,
    )
}

pub fn claude_sonnet_4() -> Model {
    build_anthropic_model(
        "claude-sonnet-4-20250514",
        "Claude Sonnet 4",
        ModelCost {
            input: 3.0,
            output: 15.0,
            cache_read: 0.3,
            cache_write: 3.75,
        },
        64_000,
    )
}

pub fn claude_haiku_3_5() -> Model {
    let mut model = build_anthropic_model(
        "claude-3-5-haiku-20241022",
        "Claude Haiku 3.5",
        ModelCost {
            input: 0.8,
            output: 4.0,
            cache_read: 0.08,
            cache_write: 1.0,
        },
        8_192,
    );
    model.reasoning = false;
    model
}

pub(crate) fn models() -> Vec<Model> {
    vec![claude_opus_4_1(), claude_sonnet_4(), claude_haiku_3_5()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opus_is_a_reasoning_model_with_rates() {
        let model = claude_opus_4_1();
        assert_eq!(model.api, Api::AnthropicMessages);
        assert!(model.reasoning);
        assert_eq!(model.cost.input, 15.0);
        assert_eq!(model.base_url, ANTHROPIC_BASE_URL);
    }

    #[test]
    fn haiku_does_not_reason() {
        assert!(!claude_haiku_3_5().reasoning);
    }
}
