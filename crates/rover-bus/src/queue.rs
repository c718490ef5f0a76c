// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded FIFO queue with suspending `put`/`get`.
//!
//! A capacity of 0 means unbounded. Producers suspend while the queue is full,
//! consumers suspend while it is empty. The internal lock is never held across
//! an await point.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

/// Queue errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is empty")]
    Empty,

    #[error("queue is full")]
    Full,

    #[error("timed out waiting for an item")]
    Timeout,

    #[error("queue is closed")]
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer FIFO queue.
pub struct Queue<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    readable: Notify,
    writable: Notify,
}

impl<T> Queue<T> {
    /// Create a queue holding at most `capacity` items (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    /// Create an unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    /// Configured capacity (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Always false for an unbounded queue.
    pub fn is_full(&self) -> bool {
        self.capacity != 0 && self.len() >= self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Append without suspending.
    pub fn put_nowait(&self, item: T) -> Result<(), QueueError> {
        self.try_push(item).map_err(|(err, _)| err)
    }

    /// Append, suspending while the queue is full.
    pub async fn put(&self, item: T) -> Result<(), QueueError> {
        let mut pending = item;
        loop {
            let writable = self.writable.notified();
            match self.try_push(pending) {
                Ok(()) => return Ok(()),
                Err((QueueError::Full, item)) => pending = item,
                Err((err, _)) => return Err(err),
            }
            writable.await;
        }
    }

    /// Remove the oldest item without suspending.
    pub fn get_nowait(&self) -> Result<T, QueueError> {
        self.try_pop()?.ok_or(QueueError::Empty)
    }

    /// Remove the oldest item, suspending while the queue is empty.
    ///
    /// Fails with [`QueueError::Closed`] once the queue is closed and drained.
    pub async fn get(&self) -> Result<T, QueueError> {
        loop {
            let readable = self.readable.notified();
            if let Some(item) = self.try_pop()? {
                return Ok(item);
            }
            readable.await;
        }
    }

    /// Like [`Queue::get`], bounded by `timeout`.
    ///
    /// A zero timeout still returns an item that is already queued.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<T, QueueError> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout),
        }
    }

    /// Close the queue and wake every waiter.
    ///
    /// Items already queued can still be drained; new puts fail.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.readable.notify_waiters();
        self.writable.notify_waiters();
    }

    fn try_push(&self, item: T) -> Result<(), (QueueError, T)> {
        let mut state = self.state.lock();
        if state.closed {
            return Err((QueueError::Closed, item));
        }
        if self.capacity != 0 && state.items.len() >= self.capacity {
            return Err((QueueError::Full, item));
        }
        state.items.push_back(item);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    fn try_pop(&self) -> Result<Option<T>, QueueError> {
        let mut state = self.state.lock();
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.writable.notify_one();
                Ok(Some(item))
            }
            None if state.closed => Err(QueueError::Closed),
            None => Ok(None),
        }
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> std::fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order() {
        let q = Queue::unbounded();
        for i in 0..5 {
            q.put_nowait(i).unwrap();
        }
        let drained: Vec<i32> = (0..5).map(|_| q.get_nowait().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(q.get_nowait(), Err(QueueError::Empty));
    }

    #[test]
    fn test_bounded_put_nowait_full() {
        let q = Queue::new(2);
        q.put_nowait("a").unwrap();
        q.put_nowait("b").unwrap();
        assert!(q.is_full());
        assert_eq!(q.put_nowait("c"), Err(QueueError::Full));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_unbounded_never_full() {
        let q = Queue::unbounded();
        for i in 0..1000 {
            q.put_nowait(i).unwrap();
        }
        assert!(!q.is_full());
        assert_eq!(q.capacity(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_timeout_on_empty() {
        let q: Queue<u8> = Queue::unbounded();
        let start = tokio::time::Instant::now();
        let res = q.get_timeout(Duration::from_millis(250)).await;
        assert_eq!(res, Err(QueueError::Timeout));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_zero_timeout_returns_queued_item() {
        let q = Queue::unbounded();
        q.put_nowait(7u8).unwrap();
        assert_eq!(q.get_timeout(Duration::ZERO).await, Ok(7));
    }

    #[tokio::test]
    async fn test_get_wakes_on_put() {
        let q = Arc::new(Queue::unbounded());
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.put(42u32).await.unwrap();
        assert_eq!(consumer.await.unwrap(), Ok(42));
    }

    #[tokio::test]
    async fn test_put_blocks_until_room() {
        let q = Arc::new(Queue::new(1));
        q.put(1u32).await.unwrap();

        let producer = {
            let q = q.clone();
            tokio::spawn(async move { q.put(2).await })
        };
        tokio::task::yield_now().await;
        assert!(!producer.is_finished());
        assert_eq!(q.len(), 1);

        assert_eq!(q.get().await, Ok(1));
        producer.await.unwrap().unwrap();
        assert_eq!(q.get().await, Ok(2));
    }

    #[tokio::test]
    async fn test_close_wakes_getter() {
        let q: Arc<Queue<u8>> = Arc::new(Queue::unbounded());
        let consumer = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.close();
        assert_eq!(consumer.await.unwrap(), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_close_still_drains() {
        let q = Queue::unbounded();
        q.put_nowait(1u8).unwrap();
        q.close();
        assert_eq!(q.put_nowait(2), Err(QueueError::Closed));
        assert_eq!(q.get().await, Ok(1));
        assert_eq!(q.get().await, Err(QueueError::Closed));
    }
}
