//! 模型抽象层 — 通过能力集声明可用的生成原语
//!
//! Model abstraction: the primitives a concrete text model may implement.
//!
//! A model advertises which primitives it implements through [`Capabilities`].
//! Every primitive has a default body returning [`Error::NotImplemented`], so an
//! implementation only overrides what it supports. The dispatcher
//! ([`crate::Llm`]) consults the capability set to pick a fallback tier instead of
//! probing methods at runtime.
//!
//! # Primitives
//!
//! | Primitive | Shape | Capability flag |
//! |-----------|-------|-----------------|
//! | [`LanguageModel::generate`] | blocking, many prompts | `generate` |
//! | [`LanguageModel::call`] | blocking, one prompt | `call` |
//! | [`LanguageModel::agenerate`] | async, many prompts | `agenerate` |
//! | [`LanguageModel::stream`] | blocking iterator, one prompt | `stream` |
//! | [`LanguageModel::astream`] | async stream, one prompt | `astream` |

use crate::types::{GenerationChunk, LlmResult};
use crate::{BoxStream, Error, Result};
use async_trait::async_trait;

/// Blocking chunk iterator returned by [`LanguageModel::stream`].
pub type ChunkIter = Box<dyn Iterator<Item = Result<GenerationChunk>> + Send + 'static>;

/// Async chunk stream returned by [`LanguageModel::astream`].
pub type ChunkStream = BoxStream<'static, GenerationChunk>;

/// The set of primitives a model implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub generate: bool,
    pub call: bool,
    pub agenerate: bool,
    pub stream: bool,
    pub astream: bool,
}

impl Capabilities {
    /// No primitives at all.
    pub const fn new() -> Self {
        Self {
            generate: false,
            call: false,
            agenerate: false,
            stream: false,
            astream: false,
        }
    }

    pub const fn with_generate(self) -> Self {
        Self { generate: true, ..self }
    }

    pub const fn with_call(self) -> Self {
        Self { call: true, ..self }
    }

    pub const fn with_agenerate(self) -> Self {
        Self { agenerate: true, ..self }
    }

    pub const fn with_stream(self) -> Self {
        Self { stream: true, ..self }
    }

    pub const fn with_astream(self) -> Self {
        Self { astream: true, ..self }
    }

    /// Whether a non-streaming result can be produced without an async runtime.
    pub fn can_generate_blocking(&self) -> bool {
        self.generate || self.call || self.stream
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::new()
    }
}

/// A text-generation model.
///
/// Implementations must be `Send + Sync`; the dispatcher shares them across the
/// blocking pool and batch workers. Streams and iterators are `'static`, so an
/// implementation clones whatever state it needs into them.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short type name used as the default run name.
    fn llm_type(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Parameters that identify this model configuration; recorded on every run.
    fn identifying_params(&self) -> serde_json::Value {
        serde_json::Value::Object(serde_json::Map::new())
    }

    /// Generate for every prompt in one call. Must return one entry per prompt, in order.
    fn generate(&self, _prompts: &[String], _stop: Option<&[String]>) -> Result<LlmResult> {
        Err(Error::not_implemented("generate", self.llm_type()))
    }

    /// Generate for a single prompt.
    fn call(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<String> {
        Err(Error::not_implemented("call", self.llm_type()))
    }

    /// Native async batch generation.
    async fn agenerate(&self, _prompts: &[String], _stop: Option<&[String]>) -> Result<LlmResult> {
        Err(Error::not_implemented("agenerate", self.llm_type()))
    }

    /// Blocking chunk stream for one prompt.
    fn stream(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<ChunkIter> {
        Err(Error::not_implemented("stream", self.llm_type()))
    }

    /// Async chunk stream for one prompt.
    fn astream(&self, _prompt: &str, _stop: Option<&[String]>) -> Result<ChunkStream> {
        Err(Error::not_implemented("astream", self.llm_type()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl LanguageModel for Bare {
        fn llm_type(&self) -> &str {
            "bare"
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::new()
        }
    }

    #[test]
    fn test_capability_builder() {
        let caps = Capabilities::new().with_call().with_astream();
        assert!(caps.call && caps.astream);
        assert!(!caps.generate && !caps.stream && !caps.agenerate);
        assert!(caps.can_generate_blocking());
        assert!(!Capabilities::new().with_astream().can_generate_blocking());
        assert!(Capabilities::default().is_empty());
    }

    #[tokio::test]
    async fn test_default_primitives_signal_not_implemented() {
        let m = Bare;
        let prompts = vec!["p".to_string()];
        assert!(m.generate(&prompts, None).unwrap_err().is_not_implemented());
        assert!(m.call("p", None).unwrap_err().is_not_implemented());
        assert!(m.agenerate(&prompts, None).await.unwrap_err().is_not_implemented());
        assert!(m.stream("p", None).err().unwrap().is_not_implemented());
        assert!(m.astream("p", None).err().unwrap().is_not_implemented());
    }
}
