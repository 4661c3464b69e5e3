//! # ai-lib-llm
//!
//! 语言模型调用运行时：统一的 invoke / batch / stream 接口，附带回调与运行追踪。
//!
//! Language-model invocation runtime. A concrete model implements whichever
//! generation primitives it supports; the [`Llm`] dispatcher exposes the full set
//! of call shapes on top of them and instruments every call with runs and
//! callbacks.
//!
//! ## Overview
//!
//! - **Capability-driven**: models advertise their primitives through
//!   [`Capabilities`]; the dispatcher picks the most specific one and synthesizes
//!   the rest
//! - **Blocking and async**: `invoke`/`batch`/`stream` and
//!   `ainvoke`/`abatch`/`astream` share run and callback semantics
//! - **Run tracking**: one run per prompt, each recording the size of the batch it
//!   came from; [`callbacks::collect_runs`] gathers them for a scoped block
//! - **Transparent failures**: a model error reaches the handlers and the caller
//!   as the same object
//!
//! ## Quick Start
//!
//! ```rust
//! use ai_lib_llm::fake::FakeListLlm;
//! use ai_lib_llm::{Llm, RunnableConfig};
//!
//! let llm = Llm::new(FakeListLlm::new(["foo"]));
//! let config = RunnableConfig::new().with_max_concurrency(2);
//! let out = llm.batch(&["a", "b", "c"], Some(&config)).unwrap();
//! assert_eq!(out, vec!["foo", "foo", "foo"]);
//!
//! let chunks: Vec<String> = llm
//!     .stream("a", None, None)
//!     .unwrap()
//!     .collect::<ai_lib_llm::Result<_>>()
//!     .unwrap();
//! assert_eq!(chunks, vec!["foo"]);
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`llm`] | The dispatcher and its fallback tiers |
//! | [`model`] | Model trait and capability set |
//! | [`callbacks`] | Handlers, run managers and run collection |
//! | [`batch`] | Order-preserving bounded fan-out |
//! | [`config`] | Per-call configuration |
//! | [`types`] | Generations, chunks and results |
//! | [`fake`] | Canned-response models (feature `fake`) |

pub mod batch;
pub mod callbacks;
pub mod config;
#[cfg(feature = "fake")]
pub mod fake;
pub mod llm;
pub mod model;
pub mod types;

// Re-export main types for convenience
pub use config::RunnableConfig;
pub use llm::{Llm, LlmStream};
pub use model::{Capabilities, LanguageModel};
pub use types::{Generation, GenerationChunk, LlmResult, RunInfo};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext, ModelError};
