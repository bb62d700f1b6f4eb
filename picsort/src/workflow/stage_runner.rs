//! Bounded-queue worker pool for one pipeline stage
//!
//! A producer feeds a bounded channel; `workers` tasks share the receiver,
//! run the handler once per item and acknowledge on success. `run` returns
//! only after the queue is drained and every worker has joined, which makes
//! each stage a barrier.
//!
//! Any handler error or panic cancels the run token: the producer stops,
//! idle workers exit, and the stage reports the failing item.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Stage failures; each one ends the run
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage '{stage}' failed on item {item}")]
    ItemFailed {
        stage: &'static str,
        item: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Stage '{stage}' worker panicked on item {item}")]
    WorkerPanicked { stage: &'static str, item: String },

    #[error("Stage '{stage}' cancelled after {completed} of {total} items")]
    Cancelled {
        stage: &'static str,
        completed: usize,
        total: usize,
    },
}

/// Completed stage statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub completed: usize,
    pub elapsed: Duration,
}

/// Worker pool configuration shared by every stage of a run
#[derive(Debug, Clone)]
pub struct StageRunner {
    workers: usize,
    queue_depth: usize,
    cancel: CancellationToken,
}

impl StageRunner {
    /// Zero workers or queue depth are raised to one
    pub fn new(workers: usize, queue_depth: usize, cancel: CancellationToken) -> Self {
        Self {
            workers: workers.max(1),
            queue_depth: queue_depth.max(1),
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `handler` over `items` and wait for the stage to drain
    pub async fn run<T, F, Fut>(
        &self,
        stage: &'static str,
        items: Vec<T>,
        handler: F,
    ) -> Result<StageReport, StageError>
    where
        T: fmt::Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let start = Instant::now();
        let total = items.len();
        let progress_every = (total / 10).max(1);
        tracing::info!(stage, total, workers = self.workers, "Stage started");

        let (tx, rx) = mpsc::channel::<T>(self.queue_depth);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let handler = Arc::new(handler);
        let completed = Arc::new(AtomicUsize::new(0));
        let failure: Arc<Mutex<Option<StageError>>> = Arc::new(Mutex::new(None));

        let mut workers = JoinSet::new();
        for _ in 0..self.workers {
            let rx = Arc::clone(&rx);
            let handler = Arc::clone(&handler);
            let completed = Arc::clone(&completed);
            let failure = Arc::clone(&failure);
            let cancel = self.cancel.clone();

            workers.spawn(async move {
                loop {
                    let next = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            item = rx.recv() => item,
                        }
                    };
                    let Some(item) = next else { break };

                    let label = item.to_string();
                    let handler = Arc::clone(&handler);
                    let outcome = tokio::spawn(async move { handler(item).await }).await;

                    let error = match outcome {
                        Ok(Ok(())) => {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            if done % progress_every == 0 || done == total {
                                tracing::info!(stage, completed = done, total, "Stage progress");
                            }
                            continue;
                        }
                        Ok(Err(e)) => {
                            tracing::error!(stage, item = %label, error = %format!("{:#}", e), "Stage item failed");
                            StageError::ItemFailed {
                                stage,
                                item: label,
                                source: e.into(),
                            }
                        }
                        Err(join_error) => {
                            tracing::error!(stage, item = %label, error = %join_error, "Stage worker panicked");
                            StageError::WorkerPanicked { stage, item: label }
                        }
                    };

                    let mut slot = failure.lock().unwrap_or_else(|e| e.into_inner());
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                    cancel.cancel();
                    break;
                }
            });
        }

        for item in items {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = tx.send(item) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(stage, error = %e, "Stage worker task aborted");
                self.cancel.cancel();
            }
        }

        let completed = completed.load(Ordering::SeqCst);
        let failure = failure.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(error) = failure {
            return Err(error);
        }
        if self.cancel.is_cancelled() {
            tracing::warn!(stage, completed, total, "Stage cancelled");
            return Err(StageError::Cancelled {
                stage,
                completed,
                total,
            });
        }

        let elapsed = start.elapsed();
        tracing::info!(stage, completed, elapsed_ms = elapsed.as_millis() as u64, "Stage complete");
        Ok(StageReport {
            stage,
            completed,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_item_acknowledged_once() {
        let runner = StageRunner::new(4, 10, CancellationToken::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let report = runner
            .run("count", (0..1000).collect::<Vec<u32>>(), move |item| {
                let sink = Arc::clone(&sink);
                async move {
                    sink.lock().unwrap().push(item);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(report.completed, 1000);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1000);
        assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_item_halts_run() {
        let token = CancellationToken::new();
        let runner = StageRunner::new(4, 10, token.clone());

        let result = runner
            .run("ingest", (0..1000).collect::<Vec<u32>>(), |item| async move {
                if item == 17 {
                    anyhow::bail!("unreadable source");
                }
                Ok(())
            })
            .await;

        match result {
            Err(StageError::ItemFailed { stage, item, source }) => {
                assert_eq!(stage, "ingest");
                assert_eq!(item, "17");
                assert!(source.to_string().contains("unreadable source"));
            }
            other => panic!("expected ItemFailed, got {:?}", other),
        }
        assert!(token.is_cancelled());

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let next = runner
            .run("metadata", vec![1u32, 2, 3], move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(next, Err(StageError::Cancelled { completed: 0, .. })));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_item_is_reported() {
        let runner = StageRunner::new(2, 2, CancellationToken::new());
        let result = runner
            .run("links", vec!["a", "boom", "c"], |item| async move {
                if item == "boom" {
                    panic!("handler panic");
                }
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StageError::WorkerPanicked { item, .. }) if item == "boom"));
    }

    #[tokio::test]
    async fn test_empty_stage_completes() {
        let runner = StageRunner::new(0, 0, CancellationToken::new());
        let report = runner
            .run("empty", Vec::<u32>::new(), |_| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(report.completed, 0);
    }
}
