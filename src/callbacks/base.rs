//! Callback handler traits.

use crate::types::{GenerationChunk, LlmResult};
use crate::Error;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Payload of the run-start notification; one per prompt of a call.
#[derive(Debug, Clone, Serialize)]
pub struct LlmStart {
    pub run_id: Uuid,
    /// Model type, or the configured run name.
    pub name: String,
    /// The prompt this run covers.
    pub prompts: Vec<String>,
    /// Number of prompts submitted together in the call that created this run.
    pub batch_size: usize,
    pub invocation_params: serde_json::Value,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Observer notified synchronously from both blocking and async call paths.
///
/// Every method has an empty default so handlers only implement what they need.
pub trait CallbackHandler: Send + Sync {
    fn on_llm_start(&self, _start: &LlmStart) {}

    fn on_llm_new_token(&self, _run_id: Uuid, _chunk: &GenerationChunk) {}

    fn on_llm_end(&self, _run_id: Uuid, _result: &LlmResult) {}

    /// Receives the error exactly as it will be returned to the caller.
    fn on_llm_error(&self, _run_id: Uuid, _error: &Error) {}
}

/// Observer with async notification methods.
///
/// On blocking call paths these futures are driven to completion on the
/// calling thread.
#[async_trait]
pub trait AsyncCallbackHandler: Send + Sync {
    async fn on_llm_start(&self, _start: &LlmStart) {}

    async fn on_llm_new_token(&self, _run_id: Uuid, _chunk: &GenerationChunk) {}

    async fn on_llm_end(&self, _run_id: Uuid, _result: &LlmResult) {}

    async fn on_llm_error(&self, _run_id: Uuid, _error: &Error) {}
}

/// A registered handler of either flavour.
#[derive(Clone)]
pub enum Callback {
    Sync(Arc<dyn CallbackHandler>),
    Async(Arc<dyn AsyncCallbackHandler>),
}

impl Callback {
    pub fn sync<H: CallbackHandler + 'static>(handler: H) -> Self {
        Callback::Sync(Arc::new(handler))
    }

    pub fn asynchronous<H: AsyncCallbackHandler + 'static>(handler: H) -> Self {
        Callback::Async(Arc::new(handler))
    }

    /// Address of the underlying handler, used to de-duplicate registrations.
    pub(crate) fn identity(&self) -> *const () {
        match self {
            Callback::Sync(h) => Arc::as_ptr(h) as *const (),
            Callback::Async(h) => Arc::as_ptr(h) as *const (),
        }
    }

    /// Whether both callbacks wrap the same handler instance.
    pub fn same_handler(&self, other: &Callback) -> bool {
        self.identity() == other.identity()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Sync(_) => write!(f, "Callback::Sync({:p})", self.identity()),
            Callback::Async(_) => write!(f, "Callback::Async({:p})", self.identity()),
        }
    }
}
