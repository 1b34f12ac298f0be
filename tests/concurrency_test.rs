//! Concurrent callers against one shared bucket.
//!
//! The in-memory store serializes commands per key, so the total handed out
//! across all callers must never exceed what the bucket held plus its refill.

use std::sync::Arc;

use tokenbucket::DeterministicHostStore;
use tokenbucket::Reply;
use tokenbucket::TokenBucketEngine;
use tokenbucket::dispatch;
use tokenbucket_time::SimulatedTimeProvider;

const START_MS: u64 = 1_700_000_000_000;
const WORKERS: usize = 8;
const REQUESTS_PER_WORKER: usize = 200;

type SharedEngine = Arc<TokenBucketEngine<DeterministicHostStore, SimulatedTimeProvider>>;

fn shared_engine() -> (SharedEngine, SimulatedTimeProvider) {
    let clock = SimulatedTimeProvider::new(START_MS);
    (Arc::new(TokenBucketEngine::with_clock(DeterministicHostStore::new(), clock.clone())), clock)
}

async fn run_workers(engine: &SharedEngine, name: &'static str, requested: i64) -> u64 {
    let mut handles = Vec::with_capacity(WORKERS);
    for _ in 0..WORKERS {
        let engine = Arc::clone(engine);
        handles.push(tokio::task::spawn_blocking(move || {
            let mut granted = 0u64;
            for _ in 0..REQUESTS_PER_WORKER {
                let got = engine.consume(name, requested).unwrap();
                assert!(got == 0 || got == requested as u64);
                granted += got;
            }
            granted
        }));
    }

    let mut total = 0u64;
    for handle in handles {
        total += handle.await.unwrap();
    }
    total
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumers_never_overdraw() {
    let (engine, _) = shared_engine();
    engine.initialize("shared", 500, 0, Some(500)).unwrap();

    let total = run_workers(&engine, "shared", 1).await;

    assert_eq!(total, 500);
    assert_eq!(engine.inspect("shared").unwrap().curr_permits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_multi_token_requests_stay_whole() {
    let (engine, _) = shared_engine();
    engine.initialize("shared", 1_000, 0, Some(999)).unwrap();

    let total = run_workers(&engine, "shared", 3).await;

    // 999 tokens serve exactly 333 requests of 3.
    assert_eq!(total, 999);
    assert_eq!(engine.inspect("shared").unwrap().curr_permits, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refill_is_bounded() {
    let (engine, clock) = shared_engine();
    engine.initialize("shared", 100, 10, Some(100)).unwrap();

    let ticker = {
        let clock = clock.clone();
        tokio::task::spawn_blocking(move || {
            for _ in 0..20 {
                clock.advance_ms(250);
                std::thread::yield_now();
            }
        })
    };
    let total = run_workers(&engine, "shared", 1).await;
    ticker.await.unwrap();

    // 5 simulated seconds at 10 tokens per second, on top of the initial 100.
    assert!(total <= 150, "granted {total} tokens");
    let state = engine.inspect("shared").unwrap();
    assert!(state.curr_permits <= state.max_permits);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commands_on_distinct_buckets() {
    let (engine, _) = shared_engine();
    let mut handles = Vec::new();
    for worker in 0..WORKERS {
        let engine = Arc::clone(&engine);
        handles.push(tokio::task::spawn_blocking(move || {
            let name = format!("bucket-{worker}");
            assert_eq!(dispatch(&*engine, &["tokenbucket.set", name.as_str(), "50", "0", "50"]), Reply::ok());
            let mut granted = 0;
            for _ in 0..60 {
                if let Reply::Integer(n) = dispatch(&*engine, &["tokenbucket.get", name.as_str(), "1"]) {
                    granted += n;
                }
            }
            granted
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 50);
    }
    assert_eq!(engine.store().len(), WORKERS);
}
