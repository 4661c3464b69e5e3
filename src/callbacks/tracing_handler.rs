//! 日志回调：把运行事件转发到 tracing。
//!
//! Callback handler that logs run events through `tracing`. Starts go to
//! `info`, ends to `debug`, tokens to `trace` and failures to `error`.

use super::base::{CallbackHandler, LlmStart};
use crate::types::{GenerationChunk, LlmResult};
use crate::Error;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

/// Forwards callback events to `tracing`.
pub struct TracingCallbackHandler {
    target: String,
}

impl TracingCallbackHandler {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for TracingCallbackHandler {
    fn default() -> Self {
        Self::new("llm")
    }
}

impl CallbackHandler for TracingCallbackHandler {
    fn on_llm_start(&self, start: &LlmStart) {
        info!(
            target: "ai_lib_llm::callbacks",
            handler = %self.target,
            run_id = %start.run_id,
            name = %start.name,
            batch_size = start.batch_size,
            "[llm/start] {:?}",
            start.prompts
        );
    }

    fn on_llm_new_token(&self, run_id: Uuid, chunk: &GenerationChunk) {
        trace!(target: "ai_lib_llm::callbacks", handler = %self.target, %run_id, token = %chunk.text, "[llm/token]");
    }

    fn on_llm_end(&self, run_id: Uuid, result: &LlmResult) {
        debug!(
            target: "ai_lib_llm::callbacks",
            handler = %self.target,
            %run_id,
            "[llm/end] {:?}",
            result.first_texts()
        );
    }

    fn on_llm_error(&self, run_id: Uuid, err: &Error) {
        error!(target: "ai_lib_llm::callbacks", handler = %self.target, %run_id, error = %err, "[llm/error]");
    }
}

#[cfg(all(test, feature = "fake"))]
mod tests {
    use super::*;
    use crate::callbacks::Callback;
    use crate::fake::FakeStreamingListLlm;
    use crate::Llm;

    #[test]
    fn test_logs_every_event_of_a_streamed_run() {
        let handler = TracingCallbackHandler::default();
        assert_eq!(handler.target(), "llm");
        let llm = Llm::new(FakeStreamingListLlm::new(["ok"])).with_callback(Callback::sync(handler));
        let chunks: Vec<String> = llm
            .stream("q", None, None)
            .unwrap()
            .collect::<crate::Result<_>>()
            .unwrap();
        assert_eq!(chunks, vec!["o", "k"]);
    }
}
