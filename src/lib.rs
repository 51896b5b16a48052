pub mod agent;
pub mod error;
pub mod models;
pub mod providers;
pub mod registry;
pub mod stream;
pub mod transform;
pub mod types;
pub mod utils;

pub use agent::{
    agent_loop, agent_loop_continue, Agent, AgentContext, AgentEvent, AgentEventStream,
    AgentLoopConfig, AgentMessage, AgentTool, AgentToolResult,
};
pub use error::{Error, Result};
pub use providers::{
    get_env_api_key, stream_anthropic, stream_azure_responses, stream_bedrock,
    stream_codex_responses, stream_gemini_cli, stream_google, stream_google_vertex,
    stream_openai_completions, stream_openai_responses,
};
pub use registry::{
    ensure_builtins, get_api_provider, get_model, get_models, get_providers,
    register_api_provider, register_api_provider_scoped, register_models, ApiProvider,
    ScopedApiProvider,
};
pub use stream::{complete, complete_simple, stream, stream_simple};
pub use transform::{prepare_messages, transform_messages, transform_messages_simple, TargetModel};
pub use types::{
    Api, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, Content, Context,
    EventStreamSender, ImageContent, InputType, KnownProvider, Message, Model, ModelCost,
    Provider, ReasoningLevel, SimpleStreamOptions, StopReason, StopReasonError,
    StopReasonSuccess, StreamOptions, TextContent, ThinkingContent, Tool, ToolCall, ToolCallId,
    ToolChoice, ToolResultContent, ToolResultMessage, Usage, UserContent, UserContentBlock,
    UserMessage,
};
pub use utils::{
    parse_partial_json, sanitize_for_api, validate_tool_arguments, validate_tool_call,
    ThinkFragment, ThinkTagParser,
};
