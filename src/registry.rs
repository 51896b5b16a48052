//! Process-wide model and API-provider registries.
//!
//! Both maps are read-mostly: builtins are installed once on first use, user
//! registration is expected during initialization, and lookups are
//! concurrent-safe. Re-registering a key replaces the prior entry. Tests can
//! install an ad-hoc provider with `register_api_provider_scoped`, which
//! restores the previous registration on drop.

use std::collections::HashMap;
use std::sync::{Arc, Once, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::types::{
    Api, AssistantMessageEventStream, Context, Model, Provider, SimpleStreamOptions,
    StreamOptions,
};

pub type StreamFn = Arc<
    dyn Fn(&Model, &Context, StreamOptions) -> Result<AssistantMessageEventStream> + Send + Sync,
>;
pub type SimpleStreamFn = Arc<
    dyn Fn(&Model, &Context, SimpleStreamOptions) -> Result<AssistantMessageEventStream>
        + Send
        + Sync,
>;

/// A registered backend: the wire protocol tag plus its two entry points.
#[derive(Clone)]
pub struct ApiProvider {
    pub api: Api,
    pub stream: StreamFn,
    pub stream_simple: SimpleStreamFn,
}

impl ApiProvider {
    pub fn new(api: Api, stream: StreamFn, stream_simple: SimpleStreamFn) -> Self {
        Self {
            api,
            stream,
            stream_simple,
        }
    }

    /// Build both entry points from a single adapter function;
    /// `stream_simple` widens its options into the full set.
    pub fn from_adapter(
        api: Api,
        adapter: fn(&Model, &Context, StreamOptions) -> AssistantMessageEventStream,
    ) -> Self {
        Self {
            api,
            stream: Arc::new(move |model, context, options| Ok(adapter(model, context, options))),
            stream_simple: Arc::new(move |model, context, options| {
                Ok(adapter(model, context, StreamOptions::from(options)))
            }),
        }
    }
}

type ModelKey = (String, String);

static MODELS: Lazy<RwLock<HashMap<ModelKey, Model>>> = Lazy::new(|| RwLock::new(HashMap::new()));
static API_PROVIDERS: Lazy<RwLock<HashMap<Api, ApiProvider>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static BUILTINS: Once = Once::new();

/// Install the builtin adapters and model catalog. Idempotent; called by
/// every lookup so explicit initialization is optional.
pub fn ensure_builtins() {
    BUILTINS.call_once(|| {
        use crate::providers::*;

        let builtin = [
            ApiProvider::from_adapter(Api::AnthropicMessages, stream_anthropic),
            ApiProvider::from_adapter(Api::OpenAICompletions, stream_openai_completions),
            ApiProvider::from_adapter(Api::OpenAIResponses, stream_openai_responses),
            ApiProvider::from_adapter(Api::AzureResponses, stream_azure_responses),
            ApiProvider::from_adapter(Api::OpenAICodexResponses, stream_codex_responses),
            ApiProvider::from_adapter(Api::GoogleGenerativeAi, stream_google),
            ApiProvider::from_adapter(Api::GoogleVertex, stream_google_vertex),
            ApiProvider::from_adapter(Api::GoogleGeminiCli, stream_gemini_cli),
            ApiProvider::from_adapter(Api::BedrockConverseStream, stream_bedrock),
        ];

        let mut providers = write_providers();
        for provider in builtin {
            providers.insert(provider.api.clone(), provider);
        }
        drop(providers);

        let mut models = write_models();
        for model in crate::models::builtin_models() {
            models.insert((model.provider.to_string(), model.id.clone()), model);
        }
    });
}

/// Register (or replace) models under a provider family.
pub fn register_models(provider: impl Into<Provider>, new_models: Vec<Model>) {
    ensure_builtins();
    let provider = provider.into();
    let mut models = write_models();
    for mut model in new_models {
        model.provider = provider.clone();
        models.insert((provider.to_string(), model.id.clone()), model);
    }
}

pub fn get_model(provider: &str, id: &str) -> Option<Model> {
    ensure_builtins();
    read_models()
        .get(&(provider.to_string(), id.to_string()))
        .cloned()
}

/// All registered models, optionally filtered by provider, sorted by
/// (provider, id) for stable listings.
pub fn get_models(provider: Option<&str>) -> Vec<Model> {
    ensure_builtins();
    let models = read_models();
    let mut result: Vec<Model> = models
        .values()
        .filter(|model| provider.is_none() || provider == Some(model.provider.as_str()))
        .cloned()
        .collect();
    result.sort_by(|a, b| {
        (a.provider.as_str(), a.id.as_str()).cmp(&(b.provider.as_str(), b.id.as_str()))
    });
    result
}

pub fn get_providers() -> Vec<Provider> {
    ensure_builtins();
    let models = read_models();
    let mut providers: Vec<Provider> = models.values().map(|m| m.provider.clone()).collect();
    providers.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    providers.dedup();
    providers
}

pub fn register_api_provider(provider: ApiProvider) {
    ensure_builtins();
    write_providers().insert(provider.api.clone(), provider);
}

pub fn get_api_provider(api: &Api) -> Option<ApiProvider> {
    ensure_builtins();
    read_providers().get(api).cloned()
}

/// Guard from `register_api_provider_scoped`; restores the previous
/// registration (or removes the entry) when dropped.
pub struct ScopedApiProvider {
    api: Api,
    previous: Option<ApiProvider>,
}

pub fn register_api_provider_scoped(provider: ApiProvider) -> ScopedApiProvider {
    ensure_builtins();
    let api = provider.api.clone();
    let previous = write_providers().insert(api.clone(), provider);
    ScopedApiProvider { api, previous }
}

impl Drop for ScopedApiProvider {
    fn drop(&mut self) {
        let mut providers = write_providers();
        match self.previous.take() {
            Some(previous) => {
                providers.insert(self.api.clone(), previous);
            }
            None => {
                providers.remove(&self.api);
            }
        }
    }
}

fn read_models() -> std::sync::RwLockReadGuard<'static, HashMap<ModelKey, Model>> {
    MODELS.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_models() -> std::sync::RwLockWriteGuard<'static, HashMap<ModelKey, Model>> {
    MODELS.write().unwrap_or_else(PoisonError::into_inner)
}

fn read_providers() -> std::sync::RwLockReadGuard<'static, HashMap<Api, ApiProvider>> {
    API_PROVIDERS.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_providers() -> std::sync::RwLockWriteGuard<'static, HashMap<Api, ApiProvider>> {
    API_PROVIDERS.write().unwrap_or_else(PoisonError::into_inner)
}
