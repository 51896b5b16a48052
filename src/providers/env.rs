use crate::types::{KnownProvider, Provider};
use std::env;
use std::path::PathBuf;

/// Get the API key for a provider from its known environment variables.
///
/// Returns `None` for custom providers and for providers whose credentials
/// live elsewhere (Gemini CLI OAuth file). For Vertex AI and Bedrock this
/// returns `Some("<authenticated>")` when ADC/IAM credentials look usable;
/// the adapters resolve the actual credentials themselves.
pub fn get_env_api_key(provider: &Provider) -> Option<String> {
    match provider {
        Provider::Known(known) => get_env_api_key_for_known(known),
        Provider::Custom(_) => None,
    }
}

fn get_env_api_key_for_known(provider: &KnownProvider) -> Option<String> {
    match provider {
        KnownProvider::Anthropic => env::var("ANTHROPIC_API_KEY")
            .or_else(|_| env::var("PI_API_KEY"))
            .ok(),

        KnownProvider::OpenAI => env::var("OPENAI_API_KEY").ok(),
        KnownProvider::AzureOpenAI => env::var("AZURE_OPENAI_API_KEY").ok(),
        KnownProvider::OpenAICodex => env::var("OPENAI_CODEX_API_KEY").ok(),
        KnownProvider::GithubCopilot => env::var("GITHUB_COPILOT_TOKEN").ok(),
        KnownProvider::Google => env::var("GOOGLE_API_KEY")
            .or_else(|_| env::var("GEMINI_API_KEY"))
            .ok(),
        KnownProvider::Groq => env::var("GROQ_API_KEY").ok(),
        KnownProvider::Xai => env::var("XAI_API_KEY").ok(),
        KnownProvider::Cerebras => env::var("CEREBRAS_API_KEY").ok(),
        KnownProvider::Mistral => env::var("MISTRAL_API_KEY").ok(),
        KnownProvider::OpenRouter => env::var("OPENROUTER_API_KEY").ok(),
        KnownProvider::Zai => env::var("ZAI_API_KEY").ok(),

        // OAuth token refresh happens in the adapter.
        KnownProvider::GoogleGeminiCli => None,

        KnownProvider::GoogleVertex => {
            has_vertex_adc_credentials().then(|| "<authenticated>".to_string())
        }

        KnownProvider::AmazonBedrock => {
            has_bedrock_credentials().then(|| "<authenticated>".to_string())
        }
    }
}

/// Check whether Vertex AI Application Default Credentials exist.
///
/// Checks in order:
/// 1. GOOGLE_OAUTH_ACCESS_TOKEN (explicit bearer token)
/// 2. GOOGLE_APPLICATION_CREDENTIALS pointing at a credentials file
/// 3. the default ADC path plus the project/location env vars Vertex needs
fn has_vertex_adc_credentials() -> bool {
    if env::var("GOOGLE_OAUTH_ACCESS_TOKEN").is_ok() {
        return true;
    }

    if let Ok(path) = env::var("GOOGLE_APPLICATION_CREDENTIALS") {
        return PathBuf::from(path).exists();
    }

    if let Some(home) = dirs::home_dir() {
        let adc_path = home
            .join(".config")
            .join("gcloud")
            .join("application_default_credentials.json");

        if adc_path.exists() {
            let has_project =
                env::var("GOOGLE_CLOUD_PROJECT").is_ok() || env::var("GCLOUD_PROJECT").is_ok();
            let has_location = env::var("GOOGLE_CLOUD_LOCATION").is_ok();
            return has_project && has_location;
        }
    }
    false
}

/// Check whether AWS credentials are available for Bedrock.
///
/// Any of: named profile, static keys, Bedrock bearer token, ECS task
/// roles, or IRSA web identity.
fn has_bedrock_credentials() -> bool {
    env::var("AWS_PROFILE").is_ok()
        || (env::var("AWS_ACCESS_KEY_ID").is_ok() && env::var("AWS_SECRET_ACCESS_KEY").is_ok())
        || env::var("AWS_BEARER_TOKEN_BEDROCK").is_ok()
        || env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI").is_ok()
        || env::var("AWS_CONTAINER_CREDENTIALS_FULL_URI").is_ok()
        || env::var("AWS_WEB_IDENTITY_TOKEN_FILE").is_ok()
}
