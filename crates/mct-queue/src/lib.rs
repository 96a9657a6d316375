// mct-queue/src/lib.rs
// ============================================================
// Blocking hand-off queue for mct
// Sits between N grabber threads and M consumer threads.
// ------------------------------------------------------------
// Public API:
//   * BlockingQueue::push() – append, never blocks
//   * BlockingQueue::pop()  – wait for an item or the stop latch
//   * BlockingQueue::stop() – one-way shutdown, wakes every waiter
// ============================================================

//! mct – blocking queue layer
//!
//! [`BlockingQueue`] is an unbounded FIFO guarded by a single mutex with
//! one condition variable tied to it. Consumers park on the condition
//! while the queue is empty; a [`push`](BlockingQueue::push) wakes one of
//! them and [`stop`](BlockingQueue::stop) wakes all of them.
//!
//! Once stopped, a queue stays stopped. Items that are still queued (or
//! pushed afterwards) are drained by later pops; only when the queue is
//! both stopped *and* empty does [`pop`](BlockingQueue::pop) return `None`.
//!
//! ```
//! use mct_queue::BlockingQueue;
//! use std::sync::Arc;
//!
//! let q = Arc::new(BlockingQueue::<u32>::new());
//! let consumer = {
//!     let q = Arc::clone(&q);
//!     std::thread::spawn(move || q.iter().sum::<u32>())
//! };
//! for i in 1..=4 {
//!     q.push(i);
//! }
//! q.stop();
//! assert_eq!(consumer.join().unwrap(), 10);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A queue shared by every producer and consumer holding a handle to it.
pub type SharedQueue<T> = Arc<BlockingQueue<T>>;

struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// Unbounded multi-producer / multi-consumer FIFO with blocking removal.
pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> BlockingQueue<T> {
    /// An empty, running queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                stopped: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Convenience for `Arc::new(BlockingQueue::new())`.
    pub fn shared() -> SharedQueue<T> {
        Arc::new(Self::new())
    }

    // Every critical section leaves `State` consistent, so a poisoned lock
    // carries no broken invariant and is safe to keep using.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item` at the tail and wake one waiting consumer.
    ///
    /// Pushing after [`stop`](Self::stop) is allowed; the item stays
    /// deliverable until some consumer pops it.
    pub fn push(&self, item: T) {
        {
            let mut state = self.lock();
            state.items.push_back(item);
        }
        self.ready.notify_one();
    }

    /// Put back an item this caller just popped but cannot hand on.
    ///
    /// The item returns to the head, so it keeps its place ahead of
    /// anything its producer pushed after it.
    pub fn requeue(&self, item: T) {
        {
            let mut state = self.lock();
            state.items.push_front(item);
        }
        self.ready.notify_one();
    }

    /// Remove the head item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is stopped and drained; from then on
    /// it never blocks again.
    pub fn pop(&self) -> Option<T> {
        let state = self
            .ready
            .wait_while(self.lock(), |s| s.items.is_empty() && !s.stopped)
            .unwrap_or_else(PoisonError::into_inner);
        Self::take_head(state)
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    ///
    /// `None` means either the timeout elapsed or the queue is stopped and
    /// empty; use [`is_stopped`](Self::is_stopped) to tell them apart.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let (state, _) = self
            .ready
            .wait_timeout_while(self.lock(), timeout, |s| {
                s.items.is_empty() && !s.stopped
            })
            .unwrap_or_else(PoisonError::into_inner);
        Self::take_head(state)
    }

    /// Remove the head item if there is one, without waiting.
    pub fn try_pop(&self) -> Option<T> {
        Self::take_head(self.lock())
    }

    fn take_head(mut state: MutexGuard<'_, State<T>>) -> Option<T> {
        state.items.pop_front()
    }

    /// Latch the queue into the stopped state and wake every waiter.
    ///
    /// Idempotent. Waiters drain whatever is still queued before they
    /// observe the stop.
    pub fn stop(&self) {
        {
            let mut state = self.lock();
            if !state.stopped {
                log::debug!("queue stopped with {} item(s) pending", state.items.len());
            }
            state.stopped = true;
        }
        self.ready.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Blocking iterator: yields items via [`pop`](Self::pop) until the
    /// queue is stopped and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { queue: self }
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &state.items.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}

/// Iterator returned by [`BlockingQueue::iter`].
pub struct Iter<'a, T> {
    queue: &'a BlockingQueue<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.queue.pop()
    }
}

impl<'a, T> IntoIterator for &'a BlockingQueue<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}
