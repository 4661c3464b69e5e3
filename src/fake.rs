//! 测试用假模型：按顺序循环返回预设响应。
//!
//! Canned-response models for tests, demos and benches.
//!
//! [`FakeListLlm`] answers every prompt with the next response from its list,
//! wrapping around at the end. [`FakeStreamingListLlm`] does the same but
//! streams each response one character at a time.

use crate::model::{Capabilities, ChunkIter, ChunkStream, LanguageModel};
use crate::types::{GenerationChunk, LlmResult};
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Failure injected by [`FakeStreamingListLlm::with_error_on_chunk`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fake stream failed at chunk {chunk}")]
pub struct FakeListLlmError {
    pub chunk: usize,
}

#[derive(Debug)]
struct Responses {
    items: Vec<String>,
    next: AtomicUsize,
}

impl Responses {
    fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: responses.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Reserve the next `n` responses as one consecutive block.
    fn take_many(&self, n: usize) -> Result<Vec<String>> {
        if self.items.is_empty() {
            return Err(Error::configuration_with_context(
                "fake model has no responses",
                ErrorContext::new()
                    .with_field_path("responses")
                    .with_source("fake"),
            ));
        }
        let len = self.items.len();
        let start = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| Some((i + n) % len))
            .unwrap_or_default();
        Ok((start..start + n)
            .map(|i| self.items[i % len].clone())
            .collect())
    }

    fn take(&self) -> Result<String> {
        Ok(self.take_many(1)?.remove(0))
    }
}

fn sleep_per_prompt(sleep: Option<Duration>, prompts: usize) {
    if let Some(d) = sleep {
        for _ in 0..prompts {
            std::thread::sleep(d);
        }
    }
}

/// Returns canned responses in order, cycling.
///
/// A batch takes consecutive responses in prompt order, whatever the
/// concurrency bound.
#[derive(Debug)]
pub struct FakeListLlm {
    responses: Responses,
    sleep: Option<Duration>,
}

impl FakeListLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Responses::new(responses),
            sleep: None,
        }
    }

    /// Sleep before answering each prompt.
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = Some(sleep);
        self
    }

    pub fn responses(&self) -> &[String] {
        &self.responses.items
    }
}

impl LanguageModel for FakeListLlm {
    fn llm_type(&self) -> &str {
        "fake-list"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new().with_generate().with_call()
    }

    fn identifying_params(&self) -> serde_json::Value {
        serde_json::json!({ "responses": self.responses.items })
    }

    fn generate(&self, prompts: &[String], _stop: Option<&[String]>) -> Result<LlmResult> {
        sleep_per_prompt(self.sleep, prompts.len());
        Ok(LlmResult::from_texts(self.responses.take_many(prompts.len())?))
    }

    fn call(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<String> {
        if let Some(d) = self.sleep {
            std::thread::sleep(d);
        }
        self.responses.take()
    }
}

/// Streams each canned response one character per chunk.
#[derive(Debug)]
pub struct FakeStreamingListLlm {
    responses: Responses,
    sleep: Option<Duration>,
    error_on_chunk: Option<usize>,
}

impl FakeStreamingListLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Responses::new(responses),
            sleep: None,
            error_on_chunk: None,
        }
    }

    /// Sleep before each chunk.
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = Some(sleep);
        self
    }

    /// Yield [`FakeListLlmError`] instead of the chunk at index `n`.
    pub fn with_error_on_chunk(mut self, n: usize) -> Self {
        self.error_on_chunk = Some(n);
        self
    }

    /// Chunks for the next response, ending at the injected failure if any.
    fn chunks(&self) -> Result<Vec<Result<GenerationChunk>>> {
        let response = self.responses.take()?;
        let fail_at = self.error_on_chunk;
        Ok(response
            .chars()
            .enumerate()
            .take(fail_at.map_or(usize::MAX, |n| n + 1))
            .map(|(i, c)| match fail_at {
                Some(n) if n == i => Err(Error::model(FakeListLlmError { chunk: i })),
                _ => Ok(GenerationChunk::new(c.to_string())),
            })
            .collect())
    }
}

#[async_trait]
impl LanguageModel for FakeStreamingListLlm {
    fn llm_type(&self) -> &str {
        "fake-streaming-list"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
            .with_generate()
            .with_call()
            .with_stream()
            .with_astream()
    }

    fn identifying_params(&self) -> serde_json::Value {
        serde_json::json!({ "responses": self.responses.items })
    }

    fn generate(&self, prompts: &[String], _stop: Option<&[String]>) -> Result<LlmResult> {
        sleep_per_prompt(self.sleep, prompts.len());
        Ok(LlmResult::from_texts(self.responses.take_many(prompts.len())?))
    }

    fn call(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<String> {
        if let Some(d) = self.sleep {
            std::thread::sleep(d);
        }
        self.responses.take()
    }

    fn stream(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<ChunkIter> {
        let sleep = self.sleep;
        Ok(Box::new(self.chunks()?.into_iter().map(move |c| {
            if let Some(d) = sleep {
                std::thread::sleep(d);
            }
            c
        })))
    }

    fn astream(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<ChunkStream> {
        let sleep = self.sleep;
        let stream = futures::stream::iter(self.chunks()?).then(move |c| async move {
            if let Some(d) = sleep {
                tokio::time::sleep(d).await;
            }
            c
        });
        Ok(Box::pin(stream))
    }
}
