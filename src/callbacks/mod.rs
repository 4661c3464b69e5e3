//! 回调模块：运行追踪与事件通知。
//!
//! # Callbacks Module
//!
//! Instrumentation for every dispatcher call. Each prompt of a call becomes a
//! *run* that moves `Created -> Running -> {Succeeded | Failed}`; handlers are
//! told about the start, each streamed token, and the single terminal event.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CallbackHandler`] | Synchronous observer trait |
//! | [`AsyncCallbackHandler`] | Async observer trait |
//! | [`Callback`] | A registered handler of either flavour |
//! | [`CallbackManager`] | Handlers for one call; starts runs |
//! | [`LlmRunManager`] | Handle used to report progress and finish one run |
//! | [`RunCollector`] | Gathers finished [`Run`] records |
//! | [`collect_runs`] / [`collect_runs_async`] | Scoped collection, inherited by nested calls |
//! | [`TracingCallbackHandler`] | Logs events through `tracing` |

mod base;
mod manager;
mod tracer;
mod tracing_handler;

pub use base::{AsyncCallbackHandler, Callback, CallbackHandler, LlmStart};
pub use manager::{CallbackManager, LlmRunManager, RunStatus};
pub use tracer::{collect_runs, collect_runs_async, Run, RunCollector};
pub use tracing_handler::TracingCallbackHandler;

pub(crate) use tracer::{inherited_callbacks, with_inherited};
