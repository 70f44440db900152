//! Bounded sample queue between the collector and the supervisor
//!
//! The queue has exactly one consumer, so each sample is processed at most once.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::collaborators::CsiCollector;
use crate::error::{Result, TelemetryError};
use crate::telemetry::CsiSample;

#[derive(Debug, Default)]
struct QueueCounters {
    pushed: AtomicU64,
    rejected: AtomicU64,
    released: AtomicU64,
}

/// Create a queue holding at most `capacity` samples
pub fn sample_queue(capacity: usize) -> (SampleSender, SampleQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let counters = Arc::new(QueueCounters::default());
    (
        SampleSender {
            tx,
            counters: counters.clone(),
        },
        SampleQueue { rx, counters },
    )
}

/// Producer side, held by the collector
#[derive(Debug, Clone)]
pub struct SampleSender {
    tx: mpsc::Sender<CsiSample>,
    counters: Arc<QueueCounters>,
}

impl SampleSender {
    /// Queue a sample without waiting; a full queue drops it
    pub fn try_push(&self, sample: CsiSample) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => {
                self.counters.pushed.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Queue a sample, waiting for room
    pub async fn push(&self, sample: CsiSample) -> Result<()> {
        self.tx
            .send(sample)
            .await
            .map_err(|_| TelemetryError::Transport("sample queue closed".to_string()))?;
        self.counters.pushed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn pushed(&self) -> u64 {
        self.counters.pushed.load(Ordering::Relaxed)
    }

    /// Samples refused because the queue was full
    pub fn rejected(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }

    /// Samples handed back by the consumer
    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::Relaxed)
    }
}

/// Consumer side, owned by the supervisor
#[derive(Debug)]
pub struct SampleQueue {
    rx: mpsc::Receiver<CsiSample>,
    counters: Arc<QueueCounters>,
}

#[async_trait]
impl CsiCollector for SampleQueue {
    async fn pop(&mut self, timeout: Duration) -> Option<CsiSample> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }

    fn release(&mut self, sample: CsiSample) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        drop(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn sample(ts: u64) -> CsiSample {
        CsiSample::new(ts, [0; 6], -40, 1, vec![1.0])
    }

    #[tokio::test]
    async fn test_fifo_and_release() {
        let (tx, mut queue) = sample_queue(4);
        assert!(tx.try_push(sample(1)));
        assert!(tx.try_push(sample(2)));

        let first = queue.pop(Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.timestamp_us, 1);
        queue.release(first);

        let second = queue.pop(Duration::from_millis(10)).await.unwrap();
        assert_eq!(second.timestamp_us, 2);
        queue.release(second);

        assert_eq!(tx.pushed(), 2);
        assert_eq!(tx.released(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let (tx, _queue) = sample_queue(2);
        assert!(tx.try_push(sample(1)));
        assert!(tx.try_push(sample(2)));
        assert!(!tx.try_push(sample(3)));
        assert_eq!(tx.rejected(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_waits_at_most_timeout() {
        let (_tx, mut queue) = sample_queue(2);
        let started = Instant::now();
        assert!(queue.pop(Duration::from_millis(100)).await.is_none());
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_push_after_consumer_gone() {
        let (tx, queue) = sample_queue(2);
        drop(queue);
        assert!(tx.push(sample(1)).await.is_err());
    }
}
