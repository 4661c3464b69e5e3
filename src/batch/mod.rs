//! 批处理执行模块：按并发上限扇出单提示调用并保持输入顺序。
//!
//! # Batch Execution Module
//!
//! Fan-out used by the dispatcher when a model can only generate one prompt at a
//! time. Results always come back in input order, whatever order the items
//! finish in.
//!
//! ## Strategies
//!
//! - **Sequential**: one item at a time on the calling thread
//! - **Parallel**: every item at once (the default when `max_concurrency` is unset)
//! - **Concurrent**: up to N items at once

mod executor;

pub use executor::{max_blocking_workers, BatchExecutor, BatchStrategy, WORKERS_PER_CORE};
