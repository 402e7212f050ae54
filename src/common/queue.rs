use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Unbounded blocking FIFO shared between proxy threads.
///
/// Closing the queue is the interrupt signal of the fabric: it wakes every
/// blocked taker, which observes `None` and exits its loop. A closed queue
/// silently drops further `put`s (results addressed to a dead peer are
/// discarded).
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> BlockingQueue<T> {
        BlockingQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Append an item, waking one blocked taker.
    pub fn put(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.items.push_back(item);
        self.cond.notify_one();
    }

    /// Re-queue an item at the front (used to return an undelivered item
    /// without disturbing FIFO order of the rest).
    pub fn push_front(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.items.push_front(item);
        self.cond.notify_one();
    }

    /// Block until an item is available or the queue is closed.
    pub fn take(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.cond.wait(&mut inner);
        }
    }

    /// Like `take`, but gives up after `timeout`. `None` means timeout or a
    /// closed queue; check `is_closed` to tell the two apart.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            if self.cond.wait_for(&mut inner, timeout).timed_out() {
                return inner.items.pop_front();
            }
        }
    }

    /// Non-blocking take.
    pub fn poll(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Keep only the items the predicate accepts.
    pub fn retain<F: FnMut(&T) -> bool>(&self, f: F) {
        self.inner.lock().items.retain(f);
    }

    /// Close the queue: wake all blocked takers and drop future puts.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> BlockingQueue<T> {
    /// Copy of the queued items, oldest first (checkpointing).
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let q = BlockingQueue::new();
        q.put(1);
        q.put(2);
        q.push_front(0);
        assert_eq!(q.take(), Some(0));
        assert_eq!(q.take(), Some(1));
        assert_eq!(q.poll(), Some(2));
        assert_eq!(q.poll(), None);
    }

    #[test]
    fn take_blocks_until_put() {
        let q = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.take());
        thread::sleep(Duration::from_millis(50));
        q.put(7);
        assert_eq!(handle.join().unwrap(), Some(7));
    }

    #[test]
    fn close_wakes_blocked_taker() {
        let q: Arc<BlockingQueue<i32>> = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.take());
        thread::sleep(Duration::from_millis(50));
        q.close();
        assert_eq!(handle.join().unwrap(), None);
        q.put(1);
        assert!(q.is_empty());
    }

    #[test]
    fn take_timeout_expires() {
        let q: BlockingQueue<i32> = BlockingQueue::new();
        assert_eq!(q.take_timeout(Duration::from_millis(20)), None);
        assert!(!q.is_closed());
    }

    #[test]
    fn retain_drops_matching_items() {
        let q = BlockingQueue::new();
        for i in 0..6 {
            q.put(i);
        }
        q.retain(|i| i % 2 == 0);
        assert_eq!(q.snapshot(), vec![0, 2, 4]);
    }
}
