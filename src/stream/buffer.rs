//! Bounded outbound frame buffer
//!
//! Capacity is counted in encoded bytes. A frame that does not fit is
//! refused (drop-newest); frames already queued are never evicted.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::error::{Result, TelemetryError};

#[derive(Debug, Default)]
struct Queue {
    frames: VecDeque<Bytes>,
    bytes: usize,
}

#[derive(Debug)]
pub struct SendBuffer {
    queue: Mutex<Queue>,
    capacity: usize,
    notify: Notify,
}

impl SendBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            capacity,
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a frame, or refuse it with `BufferFull`
    pub fn push(&self, frame: Bytes) -> Result<()> {
        {
            let mut queue = self.lock();
            if queue.bytes + frame.len() > self.capacity {
                return Err(TelemetryError::BufferFull);
            }
            queue.bytes += frame.len();
            queue.frames.push_back(frame);
        }
        self.notify.notify_one();
        Ok(())
    }

    pub fn pop(&self) -> Option<Bytes> {
        let mut queue = self.lock();
        let frame = queue.frames.pop_front()?;
        queue.bytes -= frame.len();
        Some(frame)
    }

    /// Wait for the next frame
    pub async fn next(&self) -> Bytes {
        loop {
            let notified = self.notify.notified();
            if let Some(frame) = self.pop() {
                return frame;
            }
            notified.await;
        }
    }

    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.frames.len();
        queue.frames.clear();
        queue.bytes = 0;
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn queued_bytes(&self) -> usize {
        self.lock().bytes
    }
}
