//! 同步调用路径：invoke / batch / generate。
//!
//! Blocking call family. Primitives run on the caller's thread, except for a
//! `call`-only model in a batch, which is fanned out on scoped worker threads.

use super::{single_run, to_strings, Llm, Outcome};
use crate::batch::{BatchExecutor, BatchStrategy};
use crate::callbacks::{inherited_callbacks, with_inherited};
use crate::model::LanguageModel;
use crate::types::{Generation, GenerationChunk, LlmResult};
use crate::{Error, Result, RunnableConfig};
use std::sync::Arc;
use tracing::{debug, warn};

/// Drain a blocking stream into one generation.
pub(crate) fn collect_stream(
    model: &dyn LanguageModel,
    prompt: &str,
    stop: Option<&[String]>,
) -> Result<Vec<Generation>> {
    let mut aggregate: Option<GenerationChunk> = None;
    for chunk in model.stream(prompt, stop)? {
        let chunk = chunk?;
        aggregate = Some(match aggregate {
            Some(acc) => acc + chunk,
            None => chunk,
        });
    }
    Ok(vec![aggregate.unwrap_or_default().into()])
}

/// Produce generations for `prompts` with the most specific blocking primitive.
pub(crate) fn generate_blocking(
    model: &Arc<dyn LanguageModel>,
    prompts: &[String],
    stop: Option<&[String]>,
    strategy: BatchStrategy,
) -> Outcome {
    let caps = model.capabilities();
    let n = prompts.len();

    if caps.generate {
        match model.generate(prompts, stop) {
            Err(e) if e.is_not_implemented() => {
                warn!(llm_type = model.llm_type(), "generate declined, falling back");
            }
            other => return Outcome::whole(other, n),
        }
    }

    if caps.call {
        debug!(llm_type = model.llm_type(), batch_size = n, ?strategy, "fanning out single-prompt calls");
        let inherited = inherited_callbacks();
        let results = BatchExecutor::new(strategy).execute_blocking(prompts.to_vec(), |_, prompt| {
            with_inherited(Arc::clone(&inherited), || model.call(&prompt, stop))
                .map(|text| vec![Generation::new(text)])
        });
        let outcome = Outcome::per_prompt(results);
        if !outcome.is_declined() {
            return outcome;
        }
        warn!(llm_type = model.llm_type(), "call declined, falling back");
    }

    if caps.stream {
        debug!(llm_type = model.llm_type(), "aggregating blocking stream");
        let results = prompts
            .iter()
            .map(|p| collect_stream(model.as_ref(), p, stop))
            .collect();
        return Outcome::per_prompt(results);
    }

    Outcome::whole(Err(Error::not_implemented("generate", model.llm_type())), n)
}

impl Llm {
    /// Generate for every prompt, one run per prompt.
    ///
    /// Each run records `batch_size = prompts.len()`. An empty batch returns an
    /// empty result without starting any run.
    pub fn generate<S: AsRef<str>>(
        &self,
        prompts: &[S],
        stop: Option<&[String]>,
        config: Option<&RunnableConfig>,
    ) -> Result<LlmResult> {
        let config = self.resolve_config(config)?;
        let prompts = to_strings(prompts);
        if prompts.is_empty() {
            return Ok(LlmResult::default());
        }

        let manager = self.callback_manager(config);
        let runs = manager.on_llm_start(&self.run_name(config), &prompts, &self.invocation_params(stop));
        let strategy = BatchStrategy::from_max_concurrency(config.max_concurrency);
        generate_blocking(&self.model, &prompts, stop, strategy).finish(runs)
    }

    /// Generate text for a single prompt.
    pub fn invoke(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
        config: Option<&RunnableConfig>,
    ) -> Result<String> {
        let result = self.generate(&[prompt], stop, config)?;
        Ok(result.first_texts().into_iter().next().unwrap_or_default())
    }

    /// Generate text for every prompt, preserving input order.
    pub fn batch<S: AsRef<str>>(
        &self,
        prompts: &[S],
        config: Option<&RunnableConfig>,
    ) -> Result<Vec<String>> {
        Ok(self.generate(prompts, None, config)?.first_texts())
    }

    pub(crate) fn start_single_run(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
        config: &RunnableConfig,
    ) -> Result<crate::callbacks::LlmRunManager> {
        let manager = self.callback_manager(config);
        single_run(manager.on_llm_start(
            &self.run_name(config),
            &[prompt.to_string()],
            &self.invocation_params(stop),
        ))
    }
}
