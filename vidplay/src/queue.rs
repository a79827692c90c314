/*!
    Bounded, closable queues connecting the pipeline stages.
*/

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/**
    Why a push did not enqueue its item.
*/
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    /// The queue was closed or aborted; the item is handed back.
    Closed(T),
    /// The queue stayed full for the whole timeout.
    Full(T),
}

impl<T> PushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::Full(item) => item,
        }
    }
}

/**
    Outcome of [`BoundedQueue::pop_timeout`].
*/
#[derive(Debug, PartialEq, Eq)]
pub enum Pop<T> {
    Item(T),
    /// Nothing arrived within the timeout; the queue is still open.
    TimedOut,
    /// The queue is closed and drained.
    Closed,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/**
    A bounded FIFO queue shared by one producer and one consumer thread.

    Producers block while the queue is full and consumers block while it is
    empty. `close` marks the end of the stream: pushes fail and pops drain
    what is left, then return `None`. `abort` additionally discards what is
    left, which is how stop and seek wake every blocked thread promptly.
*/
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /**
        Push an item, blocking while the queue is full.
    */
    pub fn push(&self, item: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(PushError::Closed(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /**
        Push an item, giving up with `PushError::Full` if no room frees up
        within `timeout`.
    */
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.items.len() >= self.capacity && !state.closed {
            let _ = self.not_full.wait_for(&mut state, timeout);
        }
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= self.capacity {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /**
        Push past the nominal capacity, up to `limit` items in total.
        Never blocks.
    */
    pub fn push_overfill(&self, item: T, limit: usize) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if state.items.len() >= limit.max(self.capacity) {
            return Err(PushError::Full(item));
        }
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /**
        Push without blocking, discarding the oldest unread item if the
        queue is full. Returns the discarded item.
    */
    pub fn push_drop_oldest(&self, item: T) -> Result<Option<T>, PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        let dropped = if state.items.len() >= self.capacity {
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(item);
        self.not_empty.notify_one();
        Ok(dropped)
    }

    /**
        Take the next item, blocking while the queue is empty and open.
        Returns `None` once the queue is closed and drained.
    */
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                self.not_full.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /**
        Take the next item, waiting at most `timeout` for one to arrive.
    */
    pub fn pop_timeout(&self, timeout: Duration) -> Pop<T> {
        let mut state = self.state.lock();
        if state.items.is_empty() && !state.closed {
            let _ = self.not_empty.wait_for(&mut state, timeout);
        }
        match state.items.pop_front() {
            Some(item) => {
                self.not_full.notify_one();
                Pop::Item(item)
            }
            None if state.closed => Pop::Closed,
            None => Pop::TimedOut,
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let item = state.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /**
        Mark the end of the stream and wake every waiter.
    */
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /**
        Close the queue and discard everything still in it.
    */
    pub fn abort(&self) -> usize {
        let mut state = self.state.lock();
        state.closed = true;
        let discarded = state.items.len();
        state.items.clear();
        self.not_empty.notify_all();
        self.not_full.notify_all();
        discarded
    }

    /**
        Discard everything in the queue but keep it open.
    */
    pub fn flush(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state.items.len();
        state.items.clear();
        self.not_full.notify_all();
        discarded
    }
}

static_assertions::assert_impl_all!(BoundedQueue<media_types::Packet>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn fifo_order() {
        let queue = BoundedQueue::new(4);
        for i in 0..4 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 4);
        assert_eq!((0..4).map(|_| queue.pop().unwrap()).collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_blocks_producer_until_pop() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let started = Instant::now();
                queue.push(2).unwrap();
                started.elapsed()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.pop(), Some(1));
        let waited = producer.join().unwrap();
        assert!(waited >= Duration::from_millis(40));
        assert_eq!(queue.pop(), Some(2));
    }

    #[test]
    fn close_drains_then_ends() {
        let queue = BoundedQueue::new(4);
        queue.push("a").unwrap();
        queue.close();
        assert!(matches!(queue.push("b"), Err(PushError::Closed("b"))));
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn abort_wakes_blocked_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(2));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };
        thread::sleep(Duration::from_millis(20));
        queue.abort();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn abort_wakes_blocked_producer_and_discards() {
        let queue = Arc::new(BoundedQueue::new(1));
        queue.push(1).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(queue.abort(), 1);
        assert_eq!(producer.join().unwrap(), Err(PushError::Closed(2)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_timeout_reports_full() {
        let queue = BoundedQueue::new(1);
        queue.push(1).unwrap();
        let err = queue.push_timeout(2, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.into_inner(), 2);
    }

    #[test]
    fn overfill_is_bounded_by_limit() {
        let queue = BoundedQueue::new(2);
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        queue.push_overfill(3, 4).unwrap();
        queue.push_overfill(4, 4).unwrap();
        assert!(matches!(queue.push_overfill(5, 4), Err(PushError::Full(5))));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn drop_oldest_discards_exactly_the_oldest() {
        let queue = BoundedQueue::new(3);
        for i in 0..3 {
            assert_eq!(queue.push_drop_oldest(i).unwrap(), None);
        }
        assert_eq!(queue.push_drop_oldest(3).unwrap(), Some(0));
        assert_eq!(queue.push_drop_oldest(4).unwrap(), Some(1));

        let mut seen = Vec::new();
        while let Some(item) = queue.try_pop() {
            seen.push(item);
        }
        // No duplicates, order preserved
        assert_eq!(seen, [2, 3, 4]);
    }

    #[test]
    fn pop_timeout_distinguishes_idle_from_closed() {
        let queue = BoundedQueue::new(2);
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), Pop::TimedOut);
        queue.push(7).unwrap();
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), Pop::Item(7));
        queue.close();
        assert_eq!(queue.pop_timeout(Duration::from_millis(5)), Pop::Closed);
    }

    #[test]
    fn flush_keeps_queue_open() {
        let queue = BoundedQueue::new(2);
        queue.push(1).unwrap();
        assert_eq!(queue.flush(), 1);
        assert!(!queue.is_closed());
        queue.push(2).unwrap();
        assert_eq!(queue.pop(), Some(2));
    }
}
