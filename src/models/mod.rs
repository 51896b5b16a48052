//! Builtin model catalog, registered on first registry use.

pub mod anthropic;
pub mod bedrock;
pub mod google;
pub mod openai;

pub use anthropic::{claude_haiku_3_5, claude_opus_4_1, claude_sonnet_4};
pub use bedrock::{bedrock_claude_opus_4_1, bedrock_claude_sonnet_4};
pub use google::{gemini_2_5_flash, gemini_2_5_pro, gemini_3_pro};
pub use openai::{gpt_4o, gpt_4o_mini, gpt_5, gpt_5_mini};

pub(crate) fn builtin_models() -> Vec<crate::types::Model> {
    let mut models = Vec::new();
    models.extend(anthropic::models());
    models.extend(openai::models());
    models.extend(google::models());
    models.extend(bedrock::models());
    models
}
