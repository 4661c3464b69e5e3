//! Async text stream.

use super::nonblocking::{generate_async, run_blocking};
use super::Llm;
use crate::batch::BatchStrategy;
use crate::callbacks::{inherited_callbacks, with_inherited, Callback, LlmRunManager};
use crate::model::{ChunkIter, ChunkStream, LanguageModel};
use crate::types::{Generation, GenerationChunk, LlmResult};
use crate::{BoxStream, Error, Result, RunnableConfig};
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

enum Source {
    Native(ChunkStream),
    /// Blocking iterator advanced one item per trip to the blocking pool.
    Blocking(ChunkIter),
    /// Non-streaming async call deferred to the first pull.
    Fallback {
        model: Arc<dyn LanguageModel>,
        prompt: String,
        stop: Option<Vec<String>>,
    },
    Done,
}

struct State {
    source: Source,
    run: LlmRunManager,
    inherited: Arc<Vec<Callback>>,
    aggregate: Option<GenerationChunk>,
    chunks: usize,
}

impl State {
    async fn pull(&mut self) -> Option<Result<GenerationChunk>> {
        match std::mem::replace(&mut self.source, Source::Done) {
            Source::Done => None,
            Source::Native(mut s) => {
                let item = s.next().await;
                self.source = Source::Native(s);
                item
            }
            Source::Blocking(it) => {
                let inherited = Arc::clone(&self.inherited);
                let pulled = tokio::task::spawn_blocking(move || {
                    with_inherited(inherited, || {
                        let mut it = it;
                        let item = it.next();
                        (it, item)
                    })
                })
                .await;
                match pulled {
                    Ok((it, item)) => {
                        self.source = Source::Blocking(it);
                        item
                    }
                    Err(e) => Some(Err(Error::from(e))),
                }
            }
            Source::Fallback { model, prompt, stop } => {
                let item = generate_async(&model, &[prompt], stop.as_deref(), BatchStrategy::Sequential)
                    .await
                    .into_chunk();
                self.source = Source::Native(Box::pin(futures::stream::empty()));
                Some(item)
            }
        }
    }

    /// Advance the run by one pull; `None` once the run is finished.
    async fn advance(&mut self) -> Option<Result<String>> {
        if self.run.is_finished() {
            return None;
        }
        match self.pull().await {
            Some(Ok(chunk)) => {
                self.run.on_llm_new_token_async(&chunk).await;
                self.chunks += 1;
                let text = chunk.text.clone();
                self.aggregate = Some(match self.aggregate.take() {
                    Some(acc) => acc + chunk,
                    None => chunk,
                });
                Some(Ok(text))
            }
            Some(Err(e)) => {
                self.source = Source::Done;
                self.run.on_llm_error_async(&e).await;
                Some(Err(e))
            }
            None => {
                self.source = Source::Done;
                let generation = Generation::from(self.aggregate.take().unwrap_or_default());
                self.run
                    .on_llm_end_async(&LlmResult::new(vec![vec![generation]]))
                    .await;
                None
            }
        }
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if !self.run.is_finished() {
            debug!(run_id = %self.run.run_id(), chunks = self.chunks, "async stream dropped before completion");
            self.run
                .on_llm_error_detached(Error::StreamAbandoned { chunks: self.chunks });
        }
    }
}

impl Llm {
    /// Stream text chunks for one prompt without blocking the executor.
    ///
    /// Resolution order: the model's async stream, then its blocking stream
    /// advanced on the blocking pool, then a single async non-streaming call
    /// yielding one chunk.
    pub async fn astream(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
        config: Option<&RunnableConfig>,
    ) -> Result<BoxStream<'static, String>> {
        let config = self.resolve_config(config)?;
        let mut run = self.start_single_run_async(prompt, stop, config).await?;
        let caps = self.model.capabilities();

        let mut source = None;
        if caps.astream {
            match self.model.astream(prompt, stop) {
                Ok(s) => source = Some(Source::Native(s)),
                Err(e) if e.is_not_implemented() => {}
                Err(e) => {
                    run.on_llm_error_async(&e).await;
                    return Err(e);
                }
            }
        }
        if source.is_none() && caps.stream {
            let model = Arc::clone(&self.model);
            let owned = prompt.to_string();
            let stop_owned = stop.map(<[String]>::to_vec);
            match run_blocking(move || model.stream(&owned, stop_owned.as_deref())).await {
                Ok(it) => {
                    debug!(llm_type = self.llm_type(), "driving blocking stream from the async path");
                    source = Some(Source::Blocking(it));
                }
                Err(e) if e.is_not_implemented() => {}
                Err(e) => {
                    run.on_llm_error_async(&e).await;
                    return Err(e);
                }
            }
        }
        let source = match source {
            Some(s) => s,
            None if caps.agenerate || caps.can_generate_blocking() => {
                debug!(llm_type = self.llm_type(), "no stream available, deferring a single non-streaming call");
                Source::Fallback {
                    model: Arc::clone(&self.model),
                    prompt: prompt.to_string(),
                    stop: stop.map(<[String]>::to_vec),
                }
            }
            None => {
                let e = Error::not_implemented("astream", self.llm_type());
                run.on_llm_error_async(&e).await;
                return Err(e);
            }
        };

        let state = State {
            source,
            run,
            inherited: inherited_callbacks(),
            aggregate: None,
            chunks: 0,
        };
        let stream = futures::stream::unfold(state, |mut state| async move {
            let item = state.advance().await?;
            Some((item, state))
        });
        Ok(Box::pin(stream))
    }
}
