//! A blocking FIFO queue of background jobs, shared between whichever
//! thread calls [`crate::disk::DiskCache`]'s public methods (producers) and
//! the single worker thread that drains it (the one consumer).
//!
//! Mirrors the blocking queue the original disk cache used to hand work off
//! to its worker thread: push never blocks, pop blocks until an item is
//! available or the queue is told to stop.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct State<T> {
    items: VecDeque<T>,
    running: bool,
}

pub(crate) struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> BlockingQueue<T> {
    pub(crate) fn new() -> Self {
        BlockingQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                running: true,
            }),
            ready: Condvar::new(),
        }
    }

    /// Appends `item` to the back of the queue and wakes the consumer.
    pub(crate) fn push_back(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.items.push_back(item);
        self.ready.notify_one();
    }

    /// Inserts `item` at the front of the queue, ahead of everything
    /// already queued, and wakes the consumer. Used to run journal
    /// initialization before any job enqueued ahead of it.
    pub(crate) fn push_front(&self, item: T) {
        let mut state = self.state.lock().unwrap();
        state.items.push_front(item);
        self.ready.notify_one();
    }

    /// Blocks until an item is available or the queue is stopped, then
    /// pops and returns it. Returns `None` once stopped and drained.
    pub(crate) fn pop_front(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if !state.running {
                return None;
            }
            state = self.ready.wait(state).unwrap();
        }
    }

    /// Blocks for up to `timeout` for an item to arrive. Used only by
    /// tests that want to observe queue draining without a fixed sleep.
    #[cfg(test)]
    pub(crate) fn pop_front_timeout(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if !state.running {
                return None;
            }
            let (guard, result) = self.ready.wait_timeout(state, timeout).unwrap();
            state = guard;
            if result.timed_out() {
                return state.items.pop_front();
            }
        }
    }

    /// Stops the queue: every blocked and future `pop_front` returns
    /// `None` once the queue is empty. Items already queued are still
    /// returned first.
    pub(crate) fn quit_blocking(&self) {
        let mut state = self.state.lock().unwrap();
        state.running = false;
        self.ready.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }
}
