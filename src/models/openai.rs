use crate::types::{Api, InputType, KnownProvider, Model, ModelCost, Provider};

const COMPLETIONS_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const RESPONSES_BASE_URL: &str = "https://api.openai.com/v1/responses";

fn build_openai_model(
    id: &str,
    name: &str,
    api: Api,
    base_url: &str,
    reasoning: bool,
    cost: ModelCost,
    context_window: u32,
    max_tokens: u32,
) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        api,
        provider: Provider::Known(KnownProvider::OpenAI),
        base_url: base_url.to_string(),
        reasoning,
        input: vec![InputType::Text, InputType::Image],
        cost,
        context_window,
        max_tokens,
        headers: None,
        compat: None,
    }
}

pub fn gpt_4o() -> Model {
    build_openai_model(
        "gpt-4o",
        "GPT-4o",
        Api::OpenAICompletions,
        COMPLETIONS_BASE_URL,
        false,
        ModelCost {
            input: 2.5,
            output: 10.0,
            cache_read: 1.25,
            cache_write: 0.0,
        },
        128_000,
        16_384,
    )
}

pub fn gpt_4o_mini() -> Model {
    build_openai_model(
        "gpt-4o-mini",
        "GPT-4o Mini",
        Api::OpenAICompletions,
        COMPLETIONS_BASE_URL,
        false,
        ModelCost {
            input: 0.15,
            output: 0.6,
            cache_read: 0.075,
            cache_write: 0.0,
        },
        128_000,
        16_384,
    )
}

pub fn gpt_5() -> Model {
    build_openai_model(
        "gpt-5",
        "GPT-5",
        Api::OpenAIResponses,
        RESPONSES_BASE_URL,
        true,
        ModelCost {
            input: 1.25,
            output: 10.0,
            cache_read: 0.125,
            cache_write: 0.0,
        },
        400_000,
        128_000,
    )
}

pub fn gpt_5_mini() -> Model {
    build_openai_model(
        "gpt-5-mini",
        "GPT-5 Mini",
        Api::OpenAIResponses,
        RESPONSES_BASE_URL,
        true,
        ModelCost {
            input: 0.25,
            output: 2.0,
            cache_read: 0.025,
            cache_write: 0.0,
        },
        400_000,
        128_000,
    )
}

pub(crate) fn models() -> Vec<Model> {
    vec![gpt_4o(), gpt_4o_mini(), gpt_5(), gpt_5_mini()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn responses_models_use_the_responses_endpoint() {
        let model = gpt_5();
        assert_eq!(model.api, Api::OpenAIResponses);
        assert!(model.reasoning);
        assert_eq!(model.base_url, RESPONSES_BASE_URL);
    }

    #[test]
    fn completions_models_use_chat_completions() {
        let model = gpt_4o_mini();
        assert_eq!(model.api, Api::OpenAICompletions);
        assert!(!model.reasoning);
    }
}
