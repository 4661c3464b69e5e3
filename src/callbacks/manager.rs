//! 回调管理：为每个提示创建运行并分发事件。
//!
//! Callback manager and per-run handles.
//!
//! A [`CallbackManager`] is assembled for one call from the model's own handlers,
//! the call's [`RunnableConfig`](crate::RunnableConfig) and any handlers inherited
//! from an enclosing [`collect_runs`](crate::callbacks::collect_runs) scope. Starting
//! a call yields one [`LlmRunManager`] per prompt; the run manager is the only
//! way to finish a run, and it refuses to finish one twice.

use super::base::{Callback, LlmStart};
use crate::types::{GenerationChunk, LlmResult};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

/// Handlers and run metadata for one call.
#[derive(Clone, Default)]
pub struct CallbackManager {
    handlers: Arc<Vec<Callback>>,
    tags: Vec<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl CallbackManager {
    /// Build a manager, dropping repeated registrations of the same handler.
    pub fn new(handlers: impl IntoIterator<Item = Callback>) -> Self {
        let mut unique: Vec<Callback> = Vec::new();
        for h in handlers {
            if !unique.iter().any(|u| u.same_handler(&h)) {
                unique.push(h);
            }
        }
        Self {
            handlers: Arc::new(unique),
            tags: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        for t in tags {
            if !self.tags.contains(&t) {
                self.tags.push(t);
            }
        }
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn handlers(&self) -> &[Callback] {
        &self.handlers
    }

    fn start_events(
        &self,
        name: &str,
        prompts: &[String],
        invocation_params: &serde_json::Value,
    ) -> Vec<LlmStart> {
        let batch_size = prompts.len();
        prompts
            .iter()
            .map(|p| LlmStart {
                run_id: Uuid::new_v4(),
                name: name.to_string(),
                prompts: vec![p.clone()],
                batch_size,
                invocation_params: invocation_params.clone(),
                tags: self.tags.clone(),
                metadata: self.metadata.clone(),
            })
            .collect()
    }

    fn run_manager(&self, start: &LlmStart) -> LlmRunManager {
        LlmRunManager {
            run_id: start.run_id,
            handlers: Arc::clone(&self.handlers),
            status: RunStatus::Created,
        }
    }

    /// Start one run per prompt, notifying handlers on the calling thread.
    pub fn on_llm_start(
        &self,
        name: &str,
        prompts: &[String],
        invocation_params: &serde_json::Value,
    ) -> Vec<LlmRunManager> {
        let events = self.start_events(name, prompts, invocation_params);
        events
            .iter()
            .map(|start| {
                let mut run = self.run_manager(start);
                debug!(run_id = %start.run_id, name, batch_size = start.batch_size, "llm run started");
                for h in self.handlers.iter() {
                    match h {
                        Callback::Sync(h) => h.on_llm_start(start),
                        Callback::Async(h) => futures::executor::block_on(h.on_llm_start(start)),
                    }
                }
                run.status = RunStatus::Running;
                run
            })
            .collect()
    }

    pub async fn on_llm_start_async(
        &self,
        name: &str,
        prompts: &[String],
        invocation_params: &serde_json::Value,
    ) -> Vec<LlmRunManager> {
        let events = self.start_events(name, prompts, invocation_params);
        let mut runs = Vec::with_capacity(events.len());
        for start in &events {
            let mut run = self.run_manager(start);
            debug!(run_id = %start.run_id, name, batch_size = start.batch_size, "llm run started");
            for h in self.handlers.iter() {
                match h {
                    Callback::Sync(h) => h.on_llm_start(start),
                    Callback::Async(h) => h.on_llm_start(start).await,
                }
            }
            run.status = RunStatus::Running;
            runs.push(run);
        }
        runs
    }
}

/// Handle on a single running run.
pub struct LlmRunManager {
    run_id: Uuid,
    handlers: Arc<Vec<Callback>>,
    status: RunStatus,
}

impl LlmRunManager {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    fn finish(&mut self, to: RunStatus) -> bool {
        if self.status.is_terminal() {
            warn!(run_id = %self.run_id, status = ?self.status, "run already finished");
            return false;
        }
        self.status = to;
        true
    }

    pub fn on_llm_new_token(&self, chunk: &GenerationChunk) {
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_new_token(self.run_id, chunk),
                Callback::Async(h) => {
                    futures::executor::block_on(h.on_llm_new_token(self.run_id, chunk))
                }
            }
        }
    }

    pub async fn on_llm_new_token_async(&self, chunk: &GenerationChunk) {
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_new_token(self.run_id, chunk),
                Callback::Async(h) => h.on_llm_new_token(self.run_id, chunk).await,
            }
        }
    }

    pub fn on_llm_end(&mut self, result: &LlmResult) {
        if !self.finish(RunStatus::Succeeded) {
            return;
        }
        debug!(run_id = %self.run_id, "llm run succeeded");
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_end(self.run_id, result),
                Callback::Async(h) => futures::executor::block_on(h.on_llm_end(self.run_id, result)),
            }
        }
    }

    pub async fn on_llm_end_async(&mut self, result: &LlmResult) {
        if !self.finish(RunStatus::Succeeded) {
            return;
        }
        debug!(run_id = %self.run_id, "llm run succeeded");
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_end(self.run_id, result),
                Callback::Async(h) => h.on_llm_end(self.run_id, result).await,
            }
        }
    }

    pub fn on_llm_error(&mut self, error: &Error) {
        if !self.finish(RunStatus::Failed) {
            return;
        }
        warn!(run_id = %self.run_id, error = %error, "llm run failed");
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_error(self.run_id, error),
                Callback::Async(h) => {
                    futures::executor::block_on(h.on_llm_error(self.run_id, error))
                }
            }
        }
    }

    /// Fail the run from a context that cannot await, such as a destructor.
    ///
    /// Sync handlers run inline. Async handlers are spawned on the current tokio
    /// runtime when there is one, and only driven on this thread otherwise.
    pub(crate) fn on_llm_error_detached(&mut self, error: Error) {
        if !self.finish(RunStatus::Failed) {
            return;
        }
        warn!(run_id = %self.run_id, error = %error, "llm run failed");
        let error = Arc::new(error);
        let runtime = tokio::runtime::Handle::try_current().ok();
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_error(self.run_id, &error),
                Callback::Async(h) => match &runtime {
                    Some(runtime) => {
                        let h = Arc::clone(h);
                        let error = Arc::clone(&error);
                        let run_id = self.run_id;
                        runtime.spawn(async move {
                            h.on_llm_error(run_id, &error).await;
                        });
                    }
                    None => futures::executor::block_on(h.on_llm_error(self.run_id, &error)),
                },
            }
        }
    }

    pub async fn on_llm_error_async(&mut self, error: &Error) {
        if !self.finish(RunStatus::Failed) {
            return;
        }
        warn!(run_id = %self.run_id, error = %error, "llm run failed");
        for h in self.handlers.iter() {
            match h {
                Callback::Sync(h) => h.on_llm_error(self.run_id, error),
                Callback::Async(h) => h.on_llm_error(self.run_id, error).await,
            }
        }
    }
}
