//! Producer/consumer hand-off between market-data feeders and the engine.
//!
//! A multi-producer, single-consumer FIFO with a blocking `pop`. Pushes from
//! distinct producers are linearized by the queue mutex; per-producer order
//! is preserved. That linearization is the engine's sole source of time
//! priority.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::book::types::Order;

#[derive(Debug, Default)]
pub struct OrderQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct QueueState {
    orders: VecDeque<Order>,
    closed: bool,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue at the tail and wake one waiting consumer.
    ///
    /// Never fails and never drops. Permitted after `stop`, but the
    /// consumer may exit before draining; callers that need a full drain
    /// must quiesce producers before stopping the queue.
    pub fn push(&self, order: Order) {
        let mut state = self.state.lock();
        state.orders.push_back(order);
        drop(state);
        self.available.notify_one();
    }

    /// Block until an order arrives or the queue is closed.
    ///
    /// Returns `None` only once the queue is both empty and closed, so a
    /// closed queue still drains in FIFO order.
    pub fn pop(&self) -> Option<Order> {
        let mut state = self.state.lock();
        while state.orders.is_empty() && !state.closed {
            self.available.wait(&mut state);
        }
        state.orders.pop_front()
    }

    /// Close the queue and wake every waiter.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().orders.is_empty()
    }
}
