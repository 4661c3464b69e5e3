//! 调用分发器：将 invoke / batch / stream 及其异步形式路由到模型实现的最具体原语。
//!
//! # Invocation Dispatcher
//!
//! [`Llm`] wraps a [`LanguageModel`] and exposes six call shapes:
//!
//! | Blocking | Async | Result |
//! |----------|-------|--------|
//! | [`Llm::invoke`] | [`Llm::ainvoke`] | text for one prompt |
//! | [`Llm::batch`] | [`Llm::abatch`] | texts for many prompts, in order |
//! | [`Llm::generate`] | [`Llm::agenerate`] | full [`LlmResult`] with run ids |
//! | [`Llm::stream`] | [`Llm::astream`] | text chunks for one prompt |
//!
//! Every call starts one run per prompt before touching the model, and finishes
//! each run exactly once. Model failures reach the handlers and the caller as the
//! same object.
//!
//! ## Fallback tiers
//!
//! Non-streaming, blocking: `generate` > `call` (fanned out) > `stream` (aggregated).
//!
//! Non-streaming, async: `agenerate` > `generate` on the blocking pool > `call`
//! fanned out on the blocking pool > `astream` (aggregated) > `stream` (aggregated).
//!
//! Streaming, blocking: `stream` > one non-streaming blocking call yielding a single chunk.
//!
//! Streaming, async: `astream` > `stream` pulled chunk by chunk on the blocking pool >
//! one non-streaming async call yielding a single chunk.

mod astream;
mod blocking;
mod nonblocking;
mod stream;

pub use stream::LlmStream;

use crate::callbacks::{inherited_callbacks, Callback, CallbackManager, LlmRunManager};
use crate::model::LanguageModel;
use crate::types::{Generation, GenerationChunk, LlmResult, RunInfo};
use crate::{Error, ErrorContext, Result, RunnableConfig};
use std::sync::Arc;

/// Dispatcher over a concrete model.
///
/// Cheap to clone; clones share the model.
#[derive(Clone)]
pub struct Llm {
    model: Arc<dyn LanguageModel>,
    callbacks: Vec<Callback>,
    tags: Vec<String>,
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl Llm {
    pub fn new<M: LanguageModel + 'static>(model: M) -> Self {
        Self::from_arc(Arc::new(model))
    }

    pub fn from_arc(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            callbacks: Vec::new(),
            tags: Vec::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Register a handler notified on every call made through this dispatcher.
    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn llm_type(&self) -> &str {
        self.model.llm_type()
    }

    fn resolve_config<'a>(&self, config: Option<&'a RunnableConfig>) -> Result<&'a RunnableConfig> {
        let config = config.unwrap_or_else(|| RunnableConfig::global());
        config.validate()?;
        Ok(config)
    }

    /// Handlers for one call: inherited scopes, then this dispatcher's, then the call's.
    fn callback_manager(&self, config: &RunnableConfig) -> CallbackManager {
        let inherited = inherited_callbacks();
        let handlers = inherited
            .iter()
            .cloned()
            .chain(self.callbacks.iter().cloned())
            .chain(config.callbacks.iter().cloned());
        let mut metadata = self.metadata.clone();
        metadata.extend(config.metadata.clone());
        CallbackManager::new(handlers)
            .with_tags(self.tags.iter().cloned().chain(config.tags.iter().cloned()))
            .with_metadata(metadata)
    }

    fn run_name(&self, config: &RunnableConfig) -> String {
        config
            .run_name
            .clone()
            .unwrap_or_else(|| self.model.llm_type().to_string())
    }

    fn invocation_params(&self, stop: Option<&[String]>) -> serde_json::Value {
        let mut params = match self.model.identifying_params() {
            serde_json::Value::Object(m) => m,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut m = serde_json::Map::new();
                m.insert("params".into(), other);
                m
            }
        };
        params.insert("_type".into(), self.model.llm_type().into());
        params.insert("stop".into(), serde_json::json!(stop));
        serde_json::Value::Object(params)
    }
}

fn to_strings<S: AsRef<str>>(prompts: &[S]) -> Vec<String> {
    prompts.iter().map(|p| p.as_ref().to_string()).collect()
}

fn single_run(mut runs: Vec<LlmRunManager>) -> Result<LlmRunManager> {
    runs.pop()
        .ok_or_else(|| Error::runtime("callback manager started no run"))
}

/// Per-prompt outcome of one generation tier.
pub(crate) struct Outcome {
    generations: Vec<Result<Vec<Generation>>>,
    llm_output: Option<serde_json::Value>,
}

impl Outcome {
    /// Spread a whole-batch result over `n` prompts.
    ///
    /// On failure the first prompt keeps the original error; the others receive
    /// duplicates, which for model failures are the same object.
    pub(crate) fn whole(result: Result<LlmResult>, n: usize) -> Self {
        let result = result.and_then(|r| {
            if r.generations.len() == n {
                Ok(r)
            } else {
                Err(Error::runtime_with_context(
                    "model returned a different number of generations than prompts",
                    ErrorContext::new()
                        .with_details(format!("expected {n}, got {}", r.generations.len()))
                        .with_source("dispatcher"),
                ))
            }
        });
        match result {
            Ok(r) => Outcome {
                generations: r.generations.into_iter().map(Ok).collect(),
                llm_output: r.llm_output,
            },
            Err(e) => {
                let mut generations = Vec::with_capacity(n);
                for _ in 1..n {
                    generations.push(Err(e.duplicate()));
                }
                generations.insert(0, Err(e));
                Outcome {
                    generations,
                    llm_output: None,
                }
            }
        }
    }

    pub(crate) fn per_prompt(generations: Vec<Result<Vec<Generation>>>) -> Self {
        Outcome {
            generations,
            llm_output: None,
        }
    }

    /// True when every prompt came back `NotImplemented`, so the tier declined.
    pub(crate) fn is_declined(&self) -> bool {
        !self.generations.is_empty()
            && self
                .generations
                .iter()
                .all(|g| matches!(g, Err(e) if e.is_not_implemented()))
    }

    /// The first prompt's first generation as a chunk.
    pub(crate) fn into_chunk(self) -> Result<GenerationChunk> {
        let first = self
            .generations
            .into_iter()
            .next()
            .unwrap_or_else(|| Err(Error::runtime("no generation produced")))?;
        Ok(first
            .into_iter()
            .next()
            .map(GenerationChunk::from)
            .unwrap_or_default())
    }

    /// What a single run reports as its end result.
    fn result_for(generations: &[Generation], llm_output: &Option<serde_json::Value>) -> LlmResult {
        LlmResult {
            generations: vec![generations.to_vec()],
            llm_output: llm_output.clone(),
            run: Vec::new(),
        }
    }

    fn assemble(
        generations: Vec<Vec<Generation>>,
        llm_output: Option<serde_json::Value>,
        run: Vec<RunInfo>,
        first_error: Option<Error>,
    ) -> Result<LlmResult> {
        match first_error {
            Some(e) => Err(e),
            None => Ok(LlmResult {
                generations,
                llm_output,
                run,
            }),
        }
    }

    /// Finish every run and return the batch result, or the first error in prompt order.
    pub(crate) fn finish(self, runs: Vec<LlmRunManager>) -> Result<LlmResult> {
        let mut generations = Vec::with_capacity(runs.len());
        let mut infos = Vec::with_capacity(runs.len());
        let mut first_error = None;
        let Outcome {
            generations: results,
            llm_output,
        } = self;
        for (mut run, res) in runs.into_iter().zip(results) {
            infos.push(RunInfo {
                run_id: run.run_id(),
            });
            match res {
                Ok(g) => {
                    run.on_llm_end(&Outcome::result_for(&g, &llm_output));
                    generations.push(g);
                }
                Err(e) => {
                    run.on_llm_error(&e);
                    first_error.get_or_insert(e);
                }
            }
        }
        Self::assemble(generations, llm_output, infos, first_error)
    }

    pub(crate) async fn finish_async(self, runs: Vec<LlmRunManager>) -> Result<LlmResult> {
        let mut generations = Vec::with_capacity(runs.len());
        let mut infos = Vec::with_capacity(runs.len());
        let mut first_error = None;
        let Outcome {
            generations: results,
            llm_output,
        } = self;
        for (mut run, res) in runs.into_iter().zip(results) {
            infos.push(RunInfo {
                run_id: run.run_id(),
            });
            match res {
                Ok(g) => {
                    run.on_llm_end_async(&Outcome::result_for(&g, &llm_output))
                        .await;
                    generations.push(g);
                }
                Err(e) => {
                    run.on_llm_error_async(&e).await;
                    first_error.get_or_insert(e);
                }
            }
        }
        Self::assemble(generations, llm_output, infos, first_error)
    }
}
