//! Run records and scoped run collection.

use super::base::{Callback, CallbackHandler, LlmStart};
use super::manager::RunStatus;
use crate::error::ModelError;
use crate::types::{GenerationChunk, LlmResult};
use crate::Error;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

fn timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Record of one traced run.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id: Uuid,
    pub name: String,
    pub run_type: String,
    /// The prompt(s) covered by this run.
    pub inputs: Vec<String>,
    pub outputs: Option<LlmResult>,
    /// Rendered failure, if the run failed.
    pub error: Option<String>,
    /// The original model failure, shared with the caller.
    #[serde(skip)]
    pub model_error: Option<ModelError>,
    /// Tokens received while streaming, in arrival order.
    pub tokens: Vec<String>,
    /// `batch_size` and `invocation_params`.
    pub extra: serde_json::Map<String, serde_json::Value>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub status: RunStatus,
    pub start_time: f64,
    pub end_time: Option<f64>,
}

impl Run {
    fn started(start: &LlmStart) -> Self {
        let mut extra = serde_json::Map::new();
        extra.insert("batch_size".into(), start.batch_size.into());
        extra.insert("invocation_params".into(), start.invocation_params.clone());
        Self {
            id: start.run_id,
            name: start.name.clone(),
            run_type: "llm".into(),
            inputs: start.prompts.clone(),
            outputs: None,
            error: None,
            model_error: None,
            tokens: Vec::new(),
            extra,
            tags: start.tags.clone(),
            metadata: start.metadata.clone(),
            status: RunStatus::Running,
            start_time: timestamp(),
            end_time: None,
        }
    }

    /// Size of the batch this run belonged to.
    pub fn batch_size(&self) -> Option<usize> {
        self.extra
            .get("batch_size")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
    }
}

#[derive(Default)]
struct RunTracer {
    in_flight: Mutex<HashMap<Uuid, Run>>,
    traced: Mutex<Vec<Run>>,
}

impl RunTracer {
    fn finish(&self, run_id: Uuid, update: impl FnOnce(&mut Run)) {
        let run = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).remove(&run_id);
        if let Some(mut run) = run {
            update(&mut run);
            run.end_time = Some(timestamp());
            self.traced.lock().unwrap_or_else(PoisonError::into_inner).push(run);
        }
    }
}

impl CallbackHandler for RunTracer {
    fn on_llm_start(&self, start: &LlmStart) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(start.run_id, Run::started(start));
    }

    fn on_llm_new_token(&self, run_id: Uuid, chunk: &GenerationChunk) {
        if let Some(run) = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).get_mut(&run_id) {
            run.tokens.push(chunk.text.clone());
        }
    }

    fn on_llm_end(&self, run_id: Uuid, result: &LlmResult) {
        self.finish(run_id, |run| {
            run.outputs = Some(result.clone());
            run.status = RunStatus::Succeeded;
        });
    }

    fn on_llm_error(&self, run_id: Uuid, error: &Error) {
        self.finish(run_id, |run| {
            run.error = Some(error.to_string());
            run.model_error = error.as_model().cloned();
            run.status = RunStatus::Failed;
        });
    }
}

/// Collects every run finished while it is registered.
///
/// Clones share the same record store. Runs are appended once finished, in
/// completion order.
#[derive(Clone, Default)]
pub struct RunCollector {
    tracer: Arc<RunTracer>,
}

impl RunCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handler to register in a config's callbacks.
    pub fn callback(&self) -> Callback {
        Callback::Sync(self.tracer.clone())
    }

    pub fn traced_runs(&self) -> Vec<Run> {
        self.tracer.traced.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Runs started but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracer.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn len(&self) -> usize {
        self.tracer.traced.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.tracer.traced.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

tokio::task_local! {
    static INHERITED: Arc<Vec<Callback>>;
}

/// Handlers inherited from the enclosing collection scopes, outermost first.
pub(crate) fn inherited_callbacks() -> Arc<Vec<Callback>> {
    INHERITED
        .try_with(Arc::clone)
        .unwrap_or_else(|_| Arc::new(Vec::new()))
}

/// Run `f` with `callbacks` as the inherited handlers.
///
/// Used to carry a scope onto blocking-pool and worker threads.
pub(crate) fn with_inherited<R>(callbacks: Arc<Vec<Callback>>, f: impl FnOnce() -> R) -> R {
    INHERITED.sync_scope(callbacks, f)
}

fn pushed(collector: &RunCollector) -> Arc<Vec<Callback>> {
    let mut handlers = inherited_callbacks().as_ref().clone();
    handlers.push(collector.callback());
    Arc::new(handlers)
}

/// Collect the runs of every invocation made inside `f`, including nested ones.
///
/// ```rust
/// use ai_lib_llm::callbacks::collect_runs;
/// use ai_lib_llm::fake::FakeListLlm;
/// use ai_lib_llm::Llm;
///
/// let llm = Llm::new(FakeListLlm::new(["foo"]));
/// let runs = collect_runs(|cb| {
///     llm.invoke("foo", None, None).unwrap();
///     cb.traced_runs()
/// });
/// assert_eq!(runs.len(), 1);
/// assert_eq!(runs[0].batch_size(), Some(1));
/// ```
pub fn collect_runs<R>(f: impl FnOnce(&RunCollector) -> R) -> R {
    let collector = RunCollector::new();
    let scope = pushed(&collector);
    with_inherited(scope, || f(&collector))
}

/// Async form of [`collect_runs`]; the scope covers the returned future.
pub async fn collect_runs_async<F, Fut, R>(f: F) -> R
where
    F: FnOnce(RunCollector) -> Fut,
    Fut: Future<Output = R>,
{
    let collector = RunCollector::new();
    let scope = pushed(&collector);
    INHERITED.scope(scope, f(collector)).await
}
