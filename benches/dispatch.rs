//! Benchmarks for dispatcher overhead
//!
//! This benchmark measures:
//! - Blocking batch fan-out at several concurrency bounds
//! - Async batch fan-out on the blocking pool, and one native generate call
//! - Streaming overhead per chunk

use ai_lib_llm::callbacks::collect_runs;
use ai_lib_llm::fake::{FakeListLlm, FakeStreamingListLlm};
use ai_lib_llm::{Capabilities, LanguageModel, Llm, RunnableConfig};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const BATCH: usize = 32;

fn prompts() -> Vec<String> {
    (0..BATCH).map(|i| format!("prompt {i}")).collect()
}

/// Answers through `call` only, so every prompt goes through the fan-out.
struct Echo;

impl LanguageModel for Echo {
    fn llm_type(&self) -> &str {
        "echo"
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::new().with_call()
    }
    fn call(&self, prompt: &str, _stop: Option<&[String]>) -> ai_lib_llm::Result<String> {
        Ok(prompt.to_string())
    }
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(BATCH as u64));
    let llm = Llm::new(Echo);
    let prompts = prompts();

    for limit in [1usize, 4, BATCH] {
        let config = RunnableConfig::new().with_max_concurrency(limit);
        group.bench_with_input(BenchmarkId::new("blocking", limit), &config, |b, config| {
            b.iter(|| black_box(llm.batch(&prompts, Some(config)).unwrap()))
        });
    }

    group.bench_function("blocking_traced", |b| {
        b.iter(|| collect_runs(|_| black_box(llm.batch(&prompts, None).unwrap())))
    });

    group.finish();
}

fn bench_abatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("abatch");
    group.throughput(Throughput::Elements(BATCH as u64));
    let rt = tokio::runtime::Runtime::new().unwrap();
    let llm = Llm::new(Echo);
    let prompts = prompts();

    for limit in [1usize, 4, BATCH] {
        let config = RunnableConfig::new().with_max_concurrency(limit);
        group.bench_with_input(BenchmarkId::new("async", limit), &config, |b, config| {
            b.to_async(&rt)
                .iter(|| async { black_box(llm.abatch(&prompts, Some(config)).await.unwrap()) })
        });
    }

    let fake = Llm::new(FakeListLlm::new(["foo"]));
    group.bench_function("generate", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(fake.abatch(&prompts, None).await.unwrap()) })
    });

    group.finish();
}

fn bench_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream");
    let response = "The quick brown fox jumps over the lazy dog.";
    group.throughput(Throughput::Elements(response.len() as u64));
    let llm = Llm::new(FakeStreamingListLlm::new([response]));

    group.bench_function("per_char_chunks", |b| {
        b.iter(|| {
            let n = llm
                .stream(black_box("q"), None, None)
                .unwrap()
                .filter_map(|c| c.ok())
                .count();
            black_box(n)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_batch, bench_abatch, bench_stream);
criterion_main!(benches);
