pub mod anthropic;
pub mod azure_responses;
pub mod bedrock;
pub mod codex_responses;
pub mod env;
pub mod gemini_cli;
pub mod google;
pub mod google_vertex;
pub mod openai_completions;
pub mod openai_responses;
pub(crate) mod shared;

pub use anthropic::stream_anthropic;
pub use azure_responses::stream_azure_responses;
pub use bedrock::stream_bedrock;
pub use codex_responses::stream_codex_responses;
pub use env::get_env_api_key;
pub use gemini_cli::stream_gemini_cli;
pub use google::stream_google;
pub use google_vertex::stream_google_vertex;
pub use openai_completions::stream_openai_completions;
pub use openai_responses::stream_openai_responses;
