//! llm-dispatch-demo — 演示 ainvoke / abatch / astream 及运行追踪
//!
//! Usage:
//!   llm-dispatch-demo [prompt...]
//!
//! Runs the async call shapes against a fake streaming model and prints the traced
//! runs. Set `RUST_LOG=ai_lib_llm=debug` to see dispatcher logs.

use ai_lib_llm::callbacks::{collect_runs_async, Callback, TracingCallbackHandler};
use ai_lib_llm::fake::FakeStreamingListLlm;
use ai_lib_llm::{Llm, RunnableConfig};
use futures::StreamExt;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut prompts: Vec<String> = std::env::args().skip(1).collect();
    if prompts.is_empty() {
        prompts = vec!["hello".into(), "world".into(), "again".into()];
    }

    let model = FakeStreamingListLlm::new(["Hello there!", "General Kenobi."])
        .with_sleep(Duration::from_millis(10));
    let llm = Llm::new(model).with_callback(Callback::sync(TracingCallbackHandler::default()));
    let config = RunnableConfig::from_env().with_tag("demo");

    let runs = collect_runs_async(|cb| async move {
        let first = llm.ainvoke(&prompts[0], None, Some(&config)).await?;
        println!("ainvoke  -> {first}");

        let all = llm.abatch(&prompts, Some(&config)).await?;
        println!("abatch   -> {all:?}");

        print!("astream  -> ");
        let mut stream = llm.astream(&prompts[0], None, Some(&config)).await?;
        while let Some(chunk) = stream.next().await {
            print!("{}", chunk?);
        }
        println!();

        anyhow::Ok(cb.traced_runs())
    })
    .await?;

    println!("\n{} runs traced", runs.len());
    for run in &runs {
        println!(
            "  {} {:?} batch_size={} tokens={} input={:?}",
            run.id,
            run.status,
            run.batch_size().unwrap_or_default(),
            run.tokens.len(),
            run.inputs,
        );
    }
    Ok(())
}
