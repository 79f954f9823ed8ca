//! `ShardedExecutor` — the two-level concurrency engine.
//!
//! An outer `rayon::ThreadPool` of degree `N` splits a block list into `N`
//! contiguous shards; each shard worker runs its own inner [`TPool`] of
//! degree `N`, so peak in-flight block operations is `N^2`. `threadpool.rs`
//! already gives us that inner pool; this module adds the second nesting
//! level plus the shared progress counter and cooperative cancellation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::threadpool::TPool;

/// Per-destination-snapshot progress counter, incremented once per
/// non-elided successful `put_block`.
#[derive(Default)]
pub struct SharedCounter(AtomicU64);

impl SharedCounter {
    pub fn new() -> Self {
        SharedCounter(AtomicU64::new(0))
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Cooperative cancellation flag. Set by the first task that hits a fatal,
/// non-retryable error; checked before dispatching each new shard/block task.
/// In-flight tasks are allowed to drain rather than being forcibly aborted.
#[derive(Default)]
pub struct CancellationToken(AtomicBool);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Splits `items` into `shard_count` contiguous, roughly equal shards,
/// preserving order within and across shards.
pub fn shard<T>(items: Vec<T>, shard_count: usize) -> Vec<Vec<T>> {
    if items.is_empty() || shard_count == 0 {
        return Vec::new();
    }
    let total = items.len();
    let base = total / shard_count;
    let remainder = total % shard_count;

    let mut shards = Vec::with_capacity(shard_count.min(total));
    let mut iter = items.into_iter();
    for i in 0..shard_count {
        let this_len = base + if i < remainder { 1 } else { 0 };
        if this_len == 0 {
            break;
        }
        let chunk: Vec<T> = (&mut iter).take(this_len).collect();
        shards.push(chunk);
    }
    shards
}

/// Runs `per_item` for every item in `items`, distributed across an outer
/// shard pool of degree `degree` and, within each shard, an inner [`TPool`]
/// of the same degree. Stops dispatching new shard-local work once
/// `cancel` is set, but lets already-submitted inner jobs finish.
///
/// `per_item` must be `Sync` since it runs concurrently from many threads;
/// it reports failure by returning `Err`, which sets `cancel` and is
/// collected (first error wins) without aborting sibling shards mid-flight.
pub fn run_sharded<T, E, F>(
    items: Vec<T>,
    degree: usize,
    cancel: Arc<CancellationToken>,
    per_item: F,
) -> Result<(), E>
where
    T: Send + 'static,
    E: Send + 'static,
    F: Fn(T) -> Result<(), E> + Send + Sync + 'static,
{
    let shards = shard(items, degree);
    let outer = rayon::ThreadPoolBuilder::new()
        .num_threads(degree.max(1))
        .build()
        .expect("failed to build outer shard pool");

    let per_item = Arc::new(per_item);
    let first_error: Arc<std::sync::Mutex<Option<E>>> = Arc::new(std::sync::Mutex::new(None));

    outer.install(|| {
        use rayon::prelude::*;
        shards.into_par_iter().for_each(|shard_items| {
            if cancel.is_cancelled() {
                return;
            }
            let inner = TPool::new(degree.max(1), degree.max(1))
                .expect("failed to build inner per-block pool");
            for item in shard_items {
                if cancel.is_cancelled() {
                    break;
                }
                let per_item = Arc::clone(&per_item);
                let cancel = Arc::clone(&cancel);
                let first_error = Arc::clone(&first_error);
                inner.submit_job(Box::new(move || {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if let Err(e) = per_item(item) {
                        cancel.cancel();
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                }));
            }
            inner.jobs_completed();
        });
    });

    let mut slot = first_error.lock().unwrap();
    match slot.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn shard_splits_contiguous_ranges_preserving_order() {
        let items: Vec<u32> = (0..10).collect();
        let shards = shard(items, 3);
        let flattened: Vec<u32> = shards.iter().flatten().copied().collect();
        assert_eq!(flattened, (0..10).collect::<Vec<_>>());
        // 10 items / 3 shards -> sizes 4,3,3
        assert_eq!(shards.iter().map(|s| s.len()).collect::<Vec<_>>(), vec![4, 3, 3]);
    }

    #[test]
    fn shard_handles_fewer_items_than_shards() {
        let items: Vec<u32> = vec![1, 2];
        let shards = shard(items, 5);
        assert_eq!(shards.len(), 2);
        assert!(shards.iter().all(|s| s.len() == 1));
    }

    #[test]
    fn shard_empty_input_yields_no_shards() {
        let items: Vec<u32> = Vec::new();
        assert!(shard(items, 4).is_empty());
    }

    #[test]
    fn run_sharded_processes_every_item_exactly_once() {
        let processed = Arc::new(AtomicUsize::new(0));
        let items: Vec<u32> = (0..50).collect();
        let cancel = Arc::new(CancellationToken::new());
        let p = Arc::clone(&processed);
        let result: Result<(), ()> = run_sharded(items, 4, cancel, move |_item| {
            p.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(processed.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn run_sharded_surfaces_first_error_and_sets_cancellation() {
        let items: Vec<u32> = (0..20).collect();
        let cancel = Arc::new(CancellationToken::new());
        let cancel_check = Arc::clone(&cancel);
        let result: Result<(), &'static str> = run_sharded(items, 4, cancel, move |item| {
            if item == 5 {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("boom"));
        assert!(cancel_check.is_cancelled());
    }

    #[test]
    fn shared_counter_counts_increments() {
        let counter = SharedCounter::new();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 2);
    }
}
