use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::api::{Api, Provider};
use super::compat::OpenAICompat;
use super::usage::ModelCost;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Image,
}

/// Immutable descriptor for a model reachable through one of the registered
/// API providers. Registered once at init, looked up by `(provider, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub api: Api,
    pub provider: Provider,
    pub base_url: String,
    pub reasoning: bool,
    pub input: Vec<InputType>,
    pub cost: ModelCost,
    pub context_window: u32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compat: Option<OpenAICompat>,
}

impl Model {
    pub fn supports_images(&self) -> bool {
        self.input.contains(&InputType::Image)
    }
}
