//! A FIFO protected by a single mutex, shared between an I/O worker and the application.
//!
//! This is the hand-off point used everywhere two threads touch the same data: the
//! connection engine's outgoing queue, the server's new-connection and incoming-message
//! queues, the client's incoming-message queue. All operations complete under the lock;
//! no operation here ever awaits, so it is safe to call from either a blocking
//! application thread or from inside a Tokio task via `spawn_blocking`-free synchronous
//! calls.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A mutex-guarded double-ended queue.
///
/// Deliberately not `Clone`: every owner of a `SyncQueue` is expected to hold it
/// behind an `Arc` if it needs to be shared, the same non-copyable, non-movable
/// restriction the original queue carried.
pub struct SyncQueue<T> {
    queue: Mutex<VecDeque<T>>,
    ready: Condvar,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Condvar::new(),
        }
    }

    pub fn push_back(&self, item: T) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(item);
        self.ready.notify_one();
    }

    pub fn push_front(&self, item: T) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_front(item);
        self.ready.notify_one();
    }

    pub fn pop_front(&self) -> Option<T> {
        self.queue.lock().unwrap().pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        self.queue.lock().unwrap().pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.queue.lock().unwrap().clear();
    }

    /// Block the calling thread until an item is available, then pop it.
    ///
    /// Not exercised by the core read/write paths (§9: the blocking variant was
    /// only ever commented-out in the source); provided for applications that
    /// want to poll `next_message()` without a spin loop.
    pub fn wait_pop_front(&self) -> T {
        let mut queue = self.queue.lock().unwrap();
        while queue.is_empty() {
            queue = self.ready.wait(queue).unwrap();
        }
        queue.pop_front().expect("queue non-empty after wait")
    }
}

impl<T: Clone> SyncQueue<T> {
    pub fn front(&self) -> Option<T> {
        self.queue.lock().unwrap().front().cloned()
    }

    pub fn back(&self) -> Option<T> {
        self.queue.lock().unwrap().back().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn fifo_order_preserved() {
        let queue = SyncQueue::new();
        queue.push_back(1);
        queue.push_back(2);
        queue.push_back(3);

        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
        assert_eq!(queue.pop_front(), Some(3));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn push_front_bypasses_fifo_order() {
        let queue = SyncQueue::new();
        queue.push_back(1);
        queue.push_front(0);

        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.pop_front(), Some(1));
    }

    #[test]
    fn empty_and_len_track_contents() {
        let queue: SyncQueue<u8> = SyncQueue::new();
        assert!(queue.is_empty());
        queue.push_back(1);
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_pop_front_blocks_until_pushed() {
        let queue = Arc::new(SyncQueue::new());
        let producer = Arc::clone(&queue);

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push_back(7);
        });

        assert_eq!(queue.wait_pop_front(), 7);
        handle.join().unwrap();
    }
}
