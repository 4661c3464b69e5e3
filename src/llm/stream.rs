//! Blocking text stream.

use super::blocking::generate_blocking;
use super::Llm;
use crate::batch::BatchStrategy;
use crate::callbacks::{inherited_callbacks, with_inherited, Callback, LlmRunManager};
use crate::model::{ChunkIter, LanguageModel};
use crate::types::{Generation, GenerationChunk, LlmResult};
use crate::{Error, Result, RunnableConfig};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

enum Source {
    Native(ChunkIter),
    /// Non-streaming call deferred to the first pull.
    Fallback {
        model: Arc<dyn LanguageModel>,
        prompt: String,
        stop: Option<Vec<String>>,
    },
    Done,
}

/// Text chunks for one prompt, pulled on demand.
///
/// The stream owns its run: the run succeeds when the source is exhausted,
/// fails on the first error item, and fails with [`Error::StreamAbandoned`] if
/// the stream is dropped before either.
pub struct LlmStream {
    source: Source,
    run: LlmRunManager,
    inherited: Arc<Vec<Callback>>,
    aggregate: Option<GenerationChunk>,
    chunks: usize,
}

impl LlmStream {
    pub fn run_id(&self) -> Uuid {
        self.run.run_id()
    }

    /// Chunks yielded so far.
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    fn pull(&mut self) -> Option<Result<GenerationChunk>> {
        match std::mem::replace(&mut self.source, Source::Done) {
            Source::Done => None,
            Source::Native(mut it) => {
                let item = it.next();
                self.source = Source::Native(it);
                item
            }
            Source::Fallback { model, prompt, stop } => {
                let item = with_inherited(Arc::clone(&self.inherited), || {
                    generate_blocking(&model, &[prompt], stop.as_deref(), BatchStrategy::Sequential)
                        .into_chunk()
                });
                self.source = Source::Native(Box::new(std::iter::empty()));
                Some(item)
            }
        }
    }
}

impl Iterator for LlmStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.run.is_finished() {
            return None;
        }
        match self.pull() {
            Some(Ok(chunk)) => {
                self.run.on_llm_new_token(&chunk);
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
                self.run.on_llm_error(&e);
                Some(Err(e))
            }
            None => {
                self.source = Source::Done;
                let generation = Generation::from(self.aggregate.take().unwrap_or_default());
                self.run.on_llm_end(&LlmResult::new(vec![vec![generation]]));
                None
            }
        }
    }
}

impl Drop for LlmStream {
    fn drop(&mut self) {
        if !self.run.is_finished() {
            debug!(run_id = %self.run.run_id(), chunks = self.chunks, "stream dropped before completion");
            self.run
                .on_llm_error_detached(Error::StreamAbandoned { chunks: self.chunks });
        }
    }
}

impl Llm {
    /// Stream text chunks for one prompt.
    ///
    /// Uses the model's native stream when it has one; otherwise the stream
    /// yields the whole non-streaming result as a single chunk on first pull.
    /// Errors raised while opening the stream are reported on the run and
    /// returned here.
    pub fn stream(
        &self,
        prompt: &str,
        stop: Option<&[String]>,
        config: Option<&RunnableConfig>,
    ) -> Result<LlmStream> {
        let config = self.resolve_config(config)?;
        let mut run = self.start_single_run(prompt, stop, config)?;
        let caps = self.model.capabilities();

        let mut source = None;
        if caps.stream {
            match self.model.stream(prompt, stop) {
                Ok(it) => source = Some(Source::Native(it)),
                Err(e) if e.is_not_implemented() => {}
                Err(e) => {
                    run.on_llm_error(&e);
                    return Err(e);
                }
            }
        }
        let source = match source {
            Some(s) => s,
            None if caps.generate || caps.call => {
                debug!(llm_type = self.llm_type(), "no native stream, deferring a single non-streaming call");
                Source::Fallback {
                    model: Arc::clone(&self.model),
                    prompt: prompt.to_string(),
                    stop: stop.map(<[String]>::to_vec),
                }
            }
            None => {
                let e = Error::not_implemented("stream", self.llm_type());
                run.on_llm_error(&e);
                return Err(e);
            }
        };

        Ok(LlmStream {
            source,
            run,
            inherited: inherited_callbacks(),
            aggregate: None,
            chunks: 0,
        })
    }
}
