//! The stateful agent: loop, façade, and supporting types.

#[allow(clippy::module_inception)]
mod agent;
mod agent_loop;
mod types;

pub use agent::{Agent, ListenerHandle};
pub use agent_loop::{agent_loop, agent_loop_continue, SKIPPED_TOOL_CALL_TEXT};
pub use types::{
    AgentContext, AgentEvent, AgentEventSender, AgentEventStream, AgentLoopConfig, AgentMessage,
    AgentTool, AgentToolResult, ConvertToLlmFn, LoopStreamFn, MessageQueueFn, ToolUpdateFn,
};
