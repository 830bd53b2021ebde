//! Batch processor and queue runner behavior.

use async_ops::batch::{BatchConfig, BatchProcessor, ParallelRunner, SequentialRunner};
use async_ops::{Context, RuntimeConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Calls = Arc<Mutex<Vec<Vec<String>>>>;

fn processor(config: BatchConfig) -> (BatchProcessor<String>, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let batch = BatchProcessor::new(config, move |items: Vec<String>| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(items);
            Ok::<(), String>(())
        }
    });
    (batch, calls)
}

#[tokio::test(start_paused = true)]
async fn test_batch_size_flush() {
    let (batch, calls) = processor(BatchConfig::new().with_batch_size(3));
    for id in ["a", "b", "c"] {
        batch.add(id.to_string()).await;
    }
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_eq!(calls.lock().unwrap()[0], vec!["a", "b", "c"]);
    assert!(batch.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_batch_interval_flush() {
    let (batch, calls) = processor(
        BatchConfig::new()
            .with_batch_size(10)
            .with_flush_interval(Duration::from_millis(50)),
    );
    batch.add("only".to_string()).await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(*calls.lock().unwrap(), vec![vec!["only".to_string()]]);
    assert_eq!(batch.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_every_item_flushed_exactly_once() {
    let (batch, calls) = processor(
        BatchConfig::new()
            .with_batch_size(4)
            .with_flush_interval(Duration::from_millis(20)),
    );
    for i in 0..10 {
        batch.add(format!("item-{}", i)).await;
        if i % 3 == 0 {
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
    }
    batch.flush().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let calls = calls.lock().unwrap();
    assert!(calls.iter().all(|b| !b.is_empty()));
    let flat: Vec<String> = calls.iter().flatten().cloned().collect();
    let expected: Vec<String> = (0..10).map(|i| format!("item-{}", i)).collect();
    assert_eq!(flat, expected);
    assert_eq!(batch.stats().items_processed, 10);
}

#[tokio::test(start_paused = true)]
async fn test_context_batch_processor_uses_config() {
    let mut config = RuntimeConfig::default();
    config.batch.batch_size = 2;
    let ctx = Context::from_config(config).unwrap();
    let flushed = Arc::new(AtomicU32::new(0));
    let f = flushed.clone();
    let batch = ctx.batch_processor(move |items: Vec<u8>| {
        let f = f.clone();
        async move {
            f.fetch_add(items.len() as u32, Ordering::SeqCst);
            Ok::<(), String>(())
        }
    });
    batch.add(1).await;
    batch.add(2).await;
    assert_eq!(flushed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_sequential_isolation() {
    let runner: SequentialRunner<u32, String> = SequentialRunner::default();
    let last_ran = Arc::new(AtomicBool::new(false));
    let flag = last_ran.clone();

    runner.add_to_queue(|| async { Ok(1) });
    runner.add_to_queue(|| async { Err("listing removed".to_string()) });
    runner.add_to_queue(move || {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok(3)
        }
    });

    let outcome = runner.execute_queue().await.unwrap();
    assert!(last_ran.load(Ordering::SeqCst));
    assert!(outcome.errors[0].is_none());
    assert!(outcome.errors[1].is_some());
    assert!(outcome.errors[2].is_none());
    assert_eq!(outcome.results.len(), outcome.errors.len());
    assert_eq!(outcome.success_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_progress_reports() {
    let runner: SequentialRunner<u32, String> = SequentialRunner::default();
    for i in 0..4 {
        runner.add_to_queue(move || async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(i)
        });
    }
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    runner.subscribe_progress(move |p| {
        let pct = if p.total == 0 {
            0.0
        } else {
            p.current_index as f64 / p.total as f64 * 100.0
        };
        sink.lock().unwrap().push(pct);
    });

    runner.execute_queue().await.unwrap();
    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&0.0));
    assert_eq!(seen.last(), Some(&100.0));
    assert!(seen.contains(&50.0));
    assert_eq!(runner.progress(), 100.0);
}

#[tokio::test(start_paused = true)]
async fn test_parallel_all_settled() {
    let runner: ParallelRunner<&'static str, String> = ParallelRunner::default();
    let slow_finished = Arc::new(AtomicBool::new(false));
    let flag = slow_finished.clone();

    runner.add_operation(|| async { Err("photo upload failed".to_string()) });
    runner.add_operation(move || {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flag.store(true, Ordering::SeqCst);
            Ok("saved")
        }
    });
    assert_eq!(runner.queue_len(), 2);

    let outcome = runner.execute_all().await.unwrap();
    assert!(slow_finished.load(Ordering::SeqCst));
    assert_eq!(outcome.results, vec![None, Some("saved")]);
    assert_eq!(outcome.errors[0].as_deref(), Some("photo upload failed"));
    assert_eq!(runner.completed_count(), 2);
    assert_eq!(runner.error_count(), 1);
    assert!(!runner.is_running());
}
