//! Run counts and batch sizes across every call shape.

use ai_lib_llm::callbacks::{collect_runs, collect_runs_async, RunStatus};
use ai_lib_llm::fake::{FakeListLlm, FakeStreamingListLlm};
use ai_lib_llm::{Capabilities, LanguageModel, Llm, RunnableConfig};
use futures::StreamExt;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn foo3() -> Llm {
    Llm::new(FakeListLlm::new(["foo"; 3]))
}

#[test]
fn test_batch() {
    let llm = foo3();
    let out = assert_ok!(llm.batch(&["foo", "bar", "foo"], None));
    assert_eq!(out, vec!["foo", "foo", "foo"]);

    let config = RunnableConfig::new().with_max_concurrency(2);
    let out = assert_ok!(llm.batch(&["foo", "bar", "foo"], Some(&config)));
    assert_eq!(out, vec!["foo", "foo", "foo"]);
}

#[tokio::test]
async fn test_abatch() {
    let llm = foo3();
    let out = assert_ok!(llm.abatch(&["foo", "bar", "foo"], None).await);
    assert_eq!(out, vec!["foo", "foo", "foo"]);

    let config = RunnableConfig::new().with_max_concurrency(2);
    let out = assert_ok!(llm.abatch(&["foo", "bar", "foo"], Some(&config)).await);
    assert_eq!(out, vec!["foo", "foo", "foo"]);
}

#[test]
fn test_batch_size() {
    let llm = foo3();
    let runs = collect_runs(|cb| {
        llm.batch(&["foo", "bar", "foo"], None).unwrap();
        cb.traced_runs()
    });
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.batch_size() == Some(3)));

    let runs = collect_runs(|cb| {
        let config = RunnableConfig::new().with_max_concurrency(2);
        llm.batch(&["foo", "bar", "foo"], Some(&config)).unwrap();
        cb.traced_runs()
    });
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.batch_size() == Some(3)));

    let llm = Llm::new(FakeListLlm::new(["foo"]));
    let runs = collect_runs(|cb| {
        assert_eq!(llm.invoke("foo", None, None).unwrap(), "foo");
        cb.traced_runs()
    });
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].batch_size(), Some(1));

    let runs = collect_runs(|cb| {
        let chunks: Vec<String> = llm
            .stream("foo", None, None)
            .unwrap()
            .collect::<ai_lib_llm::Result<_>>()
            .unwrap();
        assert_eq!(chunks, vec!["foo"]);
        cb.traced_runs()
    });
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].batch_size(), Some(1));
}

#[tokio::test]
async fn test_async_batch_size() {
    let llm = foo3();
    let runs = collect_runs_async(|cb| async move {
        llm.abatch(&["foo", "bar", "foo"], None).await.unwrap();
        cb.traced_runs()
    })
    .await;
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.batch_size() == Some(3)));

    let llm = Llm::new(FakeListLlm::new(["foo"]));
    let runs = collect_runs_async(|cb| {
        let llm = llm.clone();
        async move {
            llm.ainvoke("foo", None, None).await.unwrap();
            cb.traced_runs()
        }
    })
    .await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].batch_size(), Some(1));

    let runs = collect_runs_async(|cb| async move {
        let mut stream = llm.astream("foo", None, None).await.unwrap();
        while let Some(chunk) = stream.next().await {
            chunk.unwrap();
        }
        cb.traced_runs()
    })
    .await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].batch_size(), Some(1));
}

#[test]
fn test_run_ids_match_traced_runs() {
    let llm = foo3();
    let (result, runs) = collect_runs(|cb| {
        let result = llm.generate(&["a", "b"], None, None).unwrap();
        (result, cb.traced_runs())
    });
    assert_eq!(result.run.len(), 2);
    for info in &result.run {
        let run = runs.iter().find(|r| r.id == info.run_id).unwrap();
        assert_eq!(run.status, RunStatus::Succeeded);
    }
}

#[test]
fn test_stream_chunks_concatenate_to_invoke() {
    let llm = Llm::new(FakeStreamingListLlm::new(["hello world"]));
    let chunks: Vec<String> = llm
        .stream("q", None, None)
        .unwrap()
        .collect::<ai_lib_llm::Result<_>>()
        .unwrap();
    assert_eq!(chunks.len(), "hello world".len());
    assert_eq!(chunks.concat(), llm.invoke("q", None, None).unwrap());
}

#[test]
fn test_run_metadata_is_recorded() {
    let llm = Llm::new(FakeListLlm::new(["foo"])).with_tag("model-tag");
    let stop = vec!["\n".to_string()];
    let config = RunnableConfig::new()
        .with_tag("call-tag")
        .with_metadata("user", serde_json::json!("u-1"))
        .with_run_name("greeter");
    let runs = collect_runs(|cb| {
        llm.invoke("hi", Some(&stop), Some(&config)).unwrap();
        cb.traced_runs()
    });
    let run = &runs[0];
    assert_eq!(run.name, "greeter");
    assert_eq!(run.tags, vec!["model-tag", "call-tag"]);
    assert_eq!(run.metadata["user"], "u-1");
    assert_eq!(run.extra["invocation_params"]["stop"], serde_json::json!(["\n"]));
    assert_eq!(run.extra["invocation_params"]["_type"], "fake-list");
    assert!(run.end_time.unwrap() >= run.start_time);
}

#[test]
fn test_zero_max_concurrency_is_rejected_before_any_run() {
    let llm = foo3();
    let config = RunnableConfig::new().with_max_concurrency(0);
    let runs = collect_runs(|cb| {
        let err = assert_err!(llm.batch(&["a"], Some(&config)));
        assert!(matches!(err, ai_lib_llm::Error::Validation { .. }));
        cb.traced_runs()
    });
    assert!(runs.is_empty());
}

#[test]
fn test_batch_answers_follow_prompt_order() {
    let llm = Llm::new(FakeListLlm::new(["a", "b", "c", "d"]).with_sleep(Duration::from_millis(2)));
    let prompts = ["1", "2", "3", "4"];
    assert_eq!(llm.batch(&prompts, None).unwrap(), vec!["a", "b", "c", "d"]);

    let config = RunnableConfig::new().with_max_concurrency(3);
    assert_eq!(llm.batch(&prompts, Some(&config)).unwrap(), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_abatch_answers_follow_prompt_order() {
    let llm = Llm::new(FakeStreamingListLlm::new(["a", "b", "c", "d"]));
    let prompts = ["1", "2", "3", "4"];
    assert_eq!(llm.abatch(&prompts, None).await.unwrap(), vec!["a", "b", "c", "d"]);

    let config = RunnableConfig::new().with_max_concurrency(2);
    assert_eq!(
        llm.abatch(&prompts, Some(&config)).await.unwrap(),
        vec!["a", "b", "c", "d"]
    );
}

/// Echoes the prompt after a fixed delay, through `call` only.
struct SlowEcho(Duration);

impl LanguageModel for SlowEcho {
    fn llm_type(&self) -> &str {
        "slow-echo"
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::new().with_call()
    }
    fn call(&self, prompt: &str, _stop: Option<&[String]>) -> ai_lib_llm::Result<String> {
        std::thread::sleep(self.0);
        Ok(prompt.to_string())
    }
}

#[test]
fn test_concurrency_bound_limits_slow_calls() {
    let llm = Llm::new(SlowEcho(Duration::from_millis(20)));
    let prompts = ["a", "b", "c", "d"];

    let start = std::time::Instant::now();
    let config = RunnableConfig::new().with_max_concurrency(1);
    assert_eq!(llm.batch(&prompts, Some(&config)).unwrap(), prompts);
    let sequential = start.elapsed();
    assert!(sequential >= Duration::from_millis(80));

    let start = std::time::Instant::now();
    assert_eq!(llm.batch(&prompts, None).unwrap(), prompts);
    assert!(start.elapsed() < sequential);
}
