//! 异步调用路径：ainvoke / abatch / agenerate。
//!
//! Async call family. Blocking primitives are moved onto tokio's blocking pool
//! so the executor thread is never held; the inherited collection scope goes
//! with them.

use super::blocking::collect_stream;
use super::{single_run, to_strings, Llm, Outcome};
use crate::batch::{BatchExecutor, BatchStrategy};
use crate::callbacks::{inherited_callbacks, with_inherited, LlmRunManager};
use crate::model::LanguageModel;
use crate::types::{Generation, GenerationChunk, LlmResult};
use crate::{Error, Result, RunnableConfig};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Run a blocking closure on the blocking pool inside the caller's collection scope.
pub(crate) async fn run_blocking<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    let inherited = inherited_callbacks();
    tokio::task::spawn_blocking(move || with_inherited(inherited, f))
        .await
        .map_err(Error::from)?
}

/// Drain an async stream into one generation.
pub(crate) async fn collect_astream(
    model: &dyn LanguageModel,
    prompt: &str,
    stop: Option<&[String]>,
) -> Result<Vec<Generation>> {
    let mut stream = model.astream(prompt, stop)?;
    let mut aggregate: Option<GenerationChunk> = None;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        aggregate = Some(match aggregate {
            Some(acc) => acc + chunk,
            None => chunk,
        });
    }
    Ok(vec![aggregate.unwrap_or_default().into()])
}

/// Produce generations for `prompts` with the most specific primitive, without
/// blocking the executor.
pub(crate) async fn generate_async(
    model: &Arc<dyn LanguageModel>,
    prompts: &[String],
    stop: Option<&[String]>,
    strategy: BatchStrategy,
) -> Outcome {
    let caps = model.capabilities();
    let n = prompts.len();

    if caps.agenerate {
        match model.agenerate(prompts, stop).await {
            Err(e) if e.is_not_implemented() => {
                warn!(llm_type = model.llm_type(), "agenerate declined, falling back");
            }
            other => return Outcome::whole(other, n),
        }
    }

    if caps.generate {
        let m = Arc::clone(model);
        let owned = prompts.to_vec();
        let stop_owned = stop.map(<[String]>::to_vec);
        let result = run_blocking(move || m.generate(&owned, stop_owned.as_deref())).await;
        match result {
            Err(e) if e.is_not_implemented() => {
                warn!(llm_type = model.llm_type(), "generate declined, falling back");
            }
            other => return Outcome::whole(other, n),
        }
    }

    if caps.call {
        debug!(llm_type = model.llm_type(), batch_size = n, ?strategy, "fanning out single-prompt calls");
        let results = BatchExecutor::new(strategy)
            .execute(prompts.to_vec(), |_, prompt| {
                let m = Arc::clone(model);
                let stop = stop.map(<[String]>::to_vec);
                async move {
                    run_blocking(move || m.call(&prompt, stop.as_deref()))
                        .await
                        .map(|text| vec![Generation::new(text)])
                }
            })
            .await;
        let outcome = Outcome::per_prompt(results);
        if !outcome.is_declined() {
            return outcome;
        }
        warn!(llm_type = model.llm_type(), "call declined, falling back");
    }

    if caps.astream {
        debug!(llm_type = model.llm_type(), "aggregating async stream");
        let mut results = Vec::with_capacity(n);
        for prompt in prompts {
            results.push(collect_astream(model.as_ref(), prompt, stop).await);
        }
        return Outcome::per_prompt(results);
    }

    if caps.stream {
        debug!(llm_type = model.llm_type(), "aggregating blocking stream on the blocking pool");
        let mut results = Vec::with_capacity(n);
        for prompt in prompts {
            let m = Arc::clone(model);
            let prompt = prompt.clone();
            let stop = stop.map(<[String]>::to_vec);
            results.push(run_blocking(move || collect_stream(m.as_ref(), &prompt, stop.as_deref())).await);
        }
        return Outcome::per_prompt(results);
    }

    Outcome::whole(Err(Error::not_implemented("agenerate", model.llm_type())), n)
}

impl Llm {
    /// Async form of [`Llm::generate`].
    pub async fn agenerate<S: AsRef<str> + Sync>(
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
        let runs = manager
            .on_llm_start_async(&self.run_name(config), &prompts, &self.invocation_params(stop))
            .await;
        let strategy = BatchStrategy::from_max_concurrency(config.max_concurrency);
        generate_async(&self.model, &prompts, stop, strategy)
            .await
            .finish_async(runs)
            .await
    }

    pub async fn ainvoke(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
        config: Option<&RunnableConfig>,
    ) -> Result<String> {
        let result = self.agenerate(&[prompt], stop, config).await?;
        Ok(result.first_texts().into_iter().next().unwrap_or_default())
    }

    /// Async form of [`Llm::batch`]; at most `max_concurrency` underlying calls run at once.
    pub async fn abatch<S: AsRef<str> + Sync>(
        &self,
        prompts: &[S],
        config: Option<&RunnableConfig>,
    ) -> Result<Vec<String>> {
        Ok(self.agenerate(prompts, None, config).await?.first_texts())
    }

    pub(crate) async fn start_single_run_async(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
        config: &RunnableConfig,
    ) -> Result<LlmRunManager> {
        let manager = self.callback_manager(config);
        single_run(
            manager
                .on_llm_start_async(
                    &self.run_name(config),
                    &[prompt.to_string()],
                    &self.invocation_params(stop),
                )
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Capabilities, ChunkStream};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct NativeAsync {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for NativeAsync {
        fn llm_type(&self) -> &str {
            "native-async"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::new().with_agenerate().with_call()
        }
        async fn agenerate(&self, prompts: &[String], _stop: Option<&[String]>) -> Result<LlmResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmResult::from_texts(prompts.iter().map(|p| format!("async:{p}"))))
        }
        fn call(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<String> {
            Ok("blocking".into())
        }
    }

    struct AsyncStreamOnly;

    impl LanguageModel for AsyncStreamOnly {
        fn llm_type(&self) -> &str {
            "astream-only"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::new().with_astream()
        }
        fn astream(&self, prompt: &str, _stop: Option<&[String]>) -> Result<ChunkStream> {
            let chunks: Vec<Result<GenerationChunk>> = prompt
                .chars()
                .map(|c| Ok(GenerationChunk::new(c.to_string())))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct BlockingGenerate;

    impl LanguageModel for BlockingGenerate {
        fn llm_type(&self) -> &str {
            "blocking-generate"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::new().with_generate()
        }
        fn generate(&self, prompts: &[String], stop: Option<&[String]>) -> Result<LlmResult> {
            let suffix = stop.map(|s| s.join(",")).unwrap_or_default();
            Ok(LlmResult::from_texts(prompts.iter().map(|p| format!("{p}|{suffix}"))))
        }
    }

    #[tokio::test]
    async fn test_native_agenerate_is_preferred() {
        let model = Arc::new(NativeAsync::default());
        let llm = Llm::from_arc(model.clone());
        let out = llm.abatch(&["a", "b"], None).await.unwrap();
        assert_eq!(out, vec!["async:a", "async:b"]);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_stream_tier_aggregates() {
        let llm = Llm::new(AsyncStreamOnly);
        assert_eq!(llm.ainvoke("xyz", None, None).await.unwrap(), "xyz");
    }

    #[tokio::test]
    async fn test_blocking_generate_runs_with_stop() {
        let llm = Llm::new(BlockingGenerate);
        let stop = vec!["END".to_string()];
        let out = llm.ainvoke("q", Some(&stop), None).await.unwrap();
        assert_eq!(out, "q|END");
    }

    #[tokio::test]
    async fn test_run_blocking_carries_scope() {
        let seen = crate::callbacks::collect_runs_async(|_cb| async {
            run_blocking(|| Ok(inherited_callbacks().len())).await.unwrap()
        })
        .await;
        assert_eq!(seen, 1);
    }
}
