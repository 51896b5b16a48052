use crate::types::{Api, InputType, KnownProvider, Model, ModelCost, Provider};

const GENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn build_google_model(
    id: &str,
    name: &str,
    cost: ModelCost,
    context_window: u32,
) -> Model {
    Model {
        id: id.to_string(),
        name: name.to_string(),
        api: Api::GoogleGenerativeAi,
        provider: Provider::Known(KnownProvider::Google),
        base_url: GENAI_BASE_URL.to_string(),
        reasoning: true,
        input: vec![InputType::Text, InputType::Image],
        cost,
        context_window,
        max_tokens: 65_536,
        headers: None,
        compat: None,
    }
}

pub fn gemini_2_5_pro() -> Model {
    build_google_model(
        "gemini-2.5-pro",
        "Gemini 2.5 Pro",
        ModelCost {
            input: 1.25,
            output: 10.0,
            cache_read: 0.31,
            cache_write: 0.0,
        },
        1_048_576,
    )
}

pub fn gemini_2_5_flash() -> Model {
    build_google_model(
        "gemini-2.5-flash",
        "Gemini 2.5 Flash",
        ModelCost {
            input: 0.3,
            output: 2.5,
            cache_read: 0.075,
            cache_write: 0.0,
        },
        1_048_576,
    )
}

pub fn gemini_3_pro() -> Model {
    build_google_model(
        "gemini-3-pro-preview",
        "Gemini 3 Pro",
        ModelCost {
            input: 2.0,
            output: 12.0,
            cache_read: 0.2,
            cache_write: 0.0,
        },
        1_048_576,
    )
}

pub(crate) fn models() -> Vec<Model> {
    vec![gemini_2_5_pro(), gemini_2_5_flash(), gemini_3_pro()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_models_speak_genai() {
        let model = gemini_2_5_flash();
        assert_eq!(model.api, Api::GoogleGenerativeAi);
        assert_eq!(model.provider, Provider::Known(KnownProvider::Google));
        assert!(model.reasoning);
    }
}
