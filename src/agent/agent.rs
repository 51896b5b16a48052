//! Stateful agent façade over the loop.
//!
//! Holds the model, system prompt, tools, thinking level, and accumulated
//! messages; fans run events out to subscribers. The handle is cheaply
//! cloneable, so `steer`, `follow_up`, and `abort` can be called from other
//! tasks while a run is in flight.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::agent_loop::{agent_loop, agent_loop_continue};
use super::types::{
    AgentContext, AgentEvent, AgentLoopConfig, AgentMessage, AgentTool, LoopStreamFn,
};
use crate::error::{Error, Result};
use crate::types::{Message, Model, ReasoningLevel};

type Listener = Arc<dyn Fn(&AgentEvent) + Send + Sync>;

/// Identifies a subscription; pass back to [`Agent::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle(u64);

#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    model: Mutex<Model>,
    system_prompt: Mutex<Option<String>>,
    tools: Mutex<Vec<Arc<dyn AgentTool>>>,
    thinking_level: Mutex<ReasoningLevel>,
    api_key: Mutex<Option<String>>,
    stream_fn: Mutex<Option<LoopStreamFn>>,
    messages: Mutex<Vec<AgentMessage>>,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
    steering: Mutex<VecDeque<AgentMessage>>,
    follow_ups: Mutex<VecDeque<AgentMessage>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

impl Agent {
    pub fn new(model: Model) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                model: Mutex::new(model),
                system_prompt: Mutex::new(None),
                tools: Mutex::new(Vec::new()),
                thinking_level: Mutex::new(ReasoningLevel::Off),
                api_key: Mutex::new(None),
                stream_fn: Mutex::new(None),
                messages: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                cancel: Mutex::new(CancellationToken::new()),
                steering: Mutex::new(VecDeque::new()),
                follow_ups: Mutex::new(VecDeque::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<AgentMessage> {
        lock(&self.inner.messages).clone()
    }

    pub fn set_model(&self, model: Model) {
        *lock(&self.inner.model) = model;
    }

    pub fn set_system_prompt(&self, system_prompt: Option<String>) {
        *lock(&self.inner.system_prompt) = system_prompt;
    }

    pub fn set_thinking_level(&self, level: ReasoningLevel) {
        *lock(&self.inner.thinking_level) = level;
    }

    pub fn set_api_key(&self, api_key: Option<String>) {
        *lock(&self.inner.api_key) = api_key;
    }

    /// Override the stream function used by runs (tests, custom routing).
    pub fn set_stream_fn(&self, stream_fn: Option<LoopStreamFn>) {
        *lock(&self.inner.stream_fn) = stream_fn;
    }

    /// Replace the tool set. Tools may not change mid-run.
    pub fn set_tools(&self, tools: Vec<Arc<dyn AgentTool>>) -> Result<()> {
        if self.is_running() {
            return Err(Error::AgentBusy);
        }
        *lock(&self.inner.tools) = tools;
        Ok(())
    }

    /// Register an event listener. Listener panics are caught and logged;
    /// they never abort the run.
    pub fn subscribe(&self, listener: impl Fn(&AgentEvent) + Send + Sync + 'static) -> ListenerHandle {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        ListenerHandle(id)
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        lock(&self.inner.listeners).retain(|(id, _)| *id != handle.0);
    }

    /// Queue a user message that preempts the current run's remaining tool
    /// calls and drives the next turn.
    pub fn steer(&self, message: AgentMessage) {
        lock(&self.inner.steering).push_back(message);
    }

    /// Queue a user message for after the current run completes.
    pub fn follow_up(&self, message: AgentMessage) {
        lock(&self.inner.follow_ups).push_back(message);
    }

    /// Cancel the active run. Safe to call when idle; idempotent.
    pub fn abort(&self) {
        lock(&self.inner.cancel).cancel();
    }

    /// Run the agent on a single user prompt.
    ///
    /// # Errors
    ///
    /// `Error::AgentBusy` when a run is already active.
    pub async fn prompt(&self, text: impl Into<String>) -> Result<()> {
        self.prompt_message(Message::user(text.into())).await
    }

    pub async fn prompt_message(&self, message: AgentMessage) -> Result<()> {
        self.run(Some(message)).await
    }

    /// Resume without a new prompt, processing queued follow-ups.
    pub async fn continue_run(&self) -> Result<()> {
        self.run(None).await
    }

    async fn run(&self, prompt: Option<AgentMessage>) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AgentBusy);
        }

        let result = self.run_inner(prompt).await;
        self.inner.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, prompt: Option<AgentMessage>) -> Result<()> {
        let cancel = CancellationToken::new();
        *lock(&self.inner.cancel) = cancel.clone();

        let context = AgentContext {
            system_prompt: lock(&self.inner.system_prompt).clone(),
            messages: lock(&self.inner.messages).clone(),
            tools: lock(&self.inner.tools).clone(),
        };

        let steering = Arc::clone(&self.inner);
        let follow_ups = Arc::clone(&self.inner);

        let config = AgentLoopConfig {
            model: lock(&self.inner.model).clone(),
            reasoning: Some(*lock(&self.inner.thinking_level)),
            api_key: lock(&self.inner.api_key).clone(),
            stream_fn: lock(&self.inner.stream_fn).clone(),
            cancel: Some(cancel),
            get_steering_messages: Some(Arc::new(move || {
                lock(&steering.steering).drain(..).collect()
            })),
            get_follow_up_messages: Some(Arc::new(move || {
                // Follow-ups start one new turn at a time.
                lock(&follow_ups.follow_ups).pop_front().into_iter().collect()
            })),
            ..AgentLoopConfig::new(lock(&self.inner.model).clone())
        };

        let mut stream = match prompt {
            Some(message) => agent_loop(vec![message], context, config),
            None => agent_loop_continue(context, config)?,
        };

        while let Some(event) = stream.next().await {
            if let AgentEvent::AgentEnd { messages } = &event {
                lock(&self.inner.messages).extend(messages.iter().cloned());
            }
            self.dispatch(&event);
        }

        Ok(())
    }

    fn dispatch(&self, event: &AgentEvent) {
        // Snapshot so listeners can unsubscribe during delivery.
        let listeners: Vec<(u64, Listener)> = lock(&self.inner.listeners).clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                log::warn!("agent listener {id} panicked; continuing");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
