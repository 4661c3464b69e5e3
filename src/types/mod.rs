//! 类型模块：生成结果、流式片段与运行标识。
//!
//! # Types Module
//!
//! Core data types exchanged between models, the dispatcher and callback handlers.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Generation`] | One generated text for one prompt |
//! | [`GenerationChunk`] | Incremental streamed piece of a generation |
//! | [`LlmResult`] | Batch result: generations per prompt plus run ids |
//! | [`RunInfo`] | Run identifier attached to each prompt of a call |

pub mod generation;

pub use generation::{Generation, GenerationChunk, LlmResult, RunInfo};
