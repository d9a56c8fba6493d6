//! Fixed-size fan-out/fan-in over pre-chunked input.
//!
//! Every pipeline stage splits its input into at most `workers` contiguous
//! chunks, drives one future per chunk on the current task and waits for all
//! of them before returning.

use std::future::Future;

use futures::future::join_all;

/// Split `items` into at most `workers` contiguous, non-empty chunks.
pub fn split_chunks<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let workers = workers.max(1);
    let chunk_size = items.len().div_ceil(workers);

    let mut chunks = Vec::with_capacity(workers.min(items.len()));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Run `worker` once per chunk, all chunks concurrently, and flatten the results.
pub async fn fan_out<T, O, F, Fut>(items: Vec<T>, workers: usize, worker: F) -> Vec<O>
where
    F: Fn(Vec<T>) -> Fut,
    Fut: Future<Output = Vec<O>>,
{
    let tasks = split_chunks(items, workers)
        .into_iter()
        .map(worker)
        .collect::<Vec<_>>();

    join_all(tasks).await.into_iter().flatten().collect()
}
