use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Wire protocol spoken by a provider adapter.
///
/// Unknown strings parse as `Custom` so tests and downstream crates can
/// register ad-hoc providers without touching this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Api {
    AnthropicMessages,
    OpenAICompletions,
    OpenAIResponses,
    AzureResponses,
    OpenAICodexResponses,
    GoogleGenerativeAi,
    GoogleVertex,
    GoogleGeminiCli,
    BedrockConverseStream,
    Custom(String),
}

impl Api {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AnthropicMessages => "anthropic-messages",
            Self::OpenAICompletions => "openai-completions",
            Self::OpenAIResponses => "openai-responses",
            Self::AzureResponses => "azure-responses",
            Self::OpenAICodexResponses => "openai-codex-responses",
            Self::GoogleGenerativeAi => "google-generative-ai",
            Self::GoogleVertex => "google-vertex",
            Self::GoogleGeminiCli => "google-gemini-cli",
            Self::BedrockConverseStream => "bedrock-converse-stream",
            Self::Custom(s) => s,
        }
    }
}

impl Display for Api {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Api {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "anthropic-messages" => Self::AnthropicMessages,
            "openai-completions" => Self::OpenAICompletions,
            "openai-responses" => Self::OpenAIResponses,
            "azure-responses" => Self::AzureResponses,
            "openai-codex-responses" => Self::OpenAICodexResponses,
            "google-generative-ai" => Self::GoogleGenerativeAi,
            "google-vertex" => Self::GoogleVertex,
            "google-gemini-cli" => Self::GoogleGeminiCli,
            "bedrock-converse-stream" => Self::BedrockConverseStream,
            other => Self::Custom(other.to_string()),
        })
    }
}

impl Serialize for Api {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Api {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Custom(s)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KnownProvider {
    Anthropic,
    OpenAI,
    AzureOpenAI,
    OpenAICodex,
    GithubCopilot,
    Google,
    GoogleVertex,
    GoogleGeminiCli,
    AmazonBedrock,
    Groq,
    Xai,
    Cerebras,
    Mistral,
    OpenRouter,
    Zai,
}

impl KnownProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::AzureOpenAI => "azure-openai",
            Self::OpenAICodex => "openai-codex",
            Self::GithubCopilot => "github-copilot",
            Self::Google => "google",
            Self::GoogleVertex => "google-vertex",
            Self::GoogleGeminiCli => "google-gemini-cli",
            Self::AmazonBedrock => "amazon-bedrock",
            Self::Groq => "groq",
            Self::Xai => "xai",
            Self::Cerebras => "cerebras",
            Self::Mistral => "mistral",
            Self::OpenRouter => "openrouter",
            Self::Zai => "zai",
        }
    }
}

impl Display for KnownProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for KnownProvider {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAI),
            "azure-openai" => Ok(Self::AzureOpenAI),
            "openai-codex" => Ok(Self::OpenAICodex),
            "github-copilot" => Ok(Self::GithubCopilot),
            "google" => Ok(Self::Google),
            "google-vertex" => Ok(Self::GoogleVertex),
            "google-gemini-cli" => Ok(Self::GoogleGeminiCli),
            "amazon-bedrock" => Ok(Self::AmazonBedrock),
            "groq" => Ok(Self::Groq),
            "xai" => Ok(Self::Xai),
            "cerebras" => Ok(Self::Cerebras),
            "mistral" => Ok(Self::Mistral),
            "openrouter" => Ok(Self::OpenRouter),
            "zai" => Ok(Self::Zai),
            _ => Err(crate::Error::UnknownProvider(s.to_string())),
        }
    }
}

/// Provider family a model belongs to. Custom providers are allowed so
/// OpenAI-compatible local servers can be described without enum changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Provider {
    Known(KnownProvider),
    Custom(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(k) => k.as_str(),
            Self::Custom(s) => s,
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Provider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match KnownProvider::from_str(s) {
            Ok(k) => Ok(Self::Known(k)),
            Err(_) => Ok(Self::Custom(s.to_string())),
        }
    }
}

impl From<KnownProvider> for Provider {
    fn from(value: KnownProvider) -> Self {
        Self::Known(value)
    }
}

impl Serialize for Provider {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Provider {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Custom(s)))
    }
}
