use crate::types::{Api, InputType, KnownProvider, Model, ModelCost, Provider};

fn build_bedrock_model(id: &str, name: &str, cost: ModelCost) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        api: Api::BedrockConverseStream,
        provider: Provider::Known(KnownProvider::AmazonBedrock),
        // Endpoint comes from the AWS SDK's region resolution.
        base_url: String::new(),
        reasoning: true,
        input: vec![InputType::Text, InputType::Image],
        cost,
        context_window: 200_000,
        max_tokens: 64_000,
        headers: None,
        compat: None,
    }
}

pub fn bedrock_claude_sonnet_4() -> Model {
    build_bedrock_model(
        "us.anthropic.claude-sonnet-4-20250514-v1:0",
        "Claude Sonnet 4 (Bedrock)",
        ModelCost {
            input: 3.0,
            output: 15.0,
            cache_read: 0.3,
            cache_write: 3.75,
        },
    )
}

pub fn bedrock_claude_opus_4_1() -> Model {
    build_bedrock_model(
        "us.anthropic.claude-opus-4-1-v1:0",
        "Claude Opus 4.1 (Bedrock)",
        ModelCost {
            input: 15.0,
            output: 75.0,
            cache_read: 1.5,
            cache_write: 18.75,
        },
    )
}

pub(crate) fn models() -> Vec<Model> {
    vec![bedrock_claude_sonnet_4(), bedrock_claude_opus_4_1()]
}
