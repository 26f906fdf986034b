//! A two-lane priority mutex: block validation (`High`) always goes ahead of
//! transaction/mempool work (`Low`) once both are waiting. Callers are
//! trusted not to monopolize the high lane.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// The two priorities this mutex schedules between. Lower variants sort
/// first; `High` always drains before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Low,
}

struct Waiter {
    priority: Priority,
    notify: Arc<Notify>,
}

struct State {
    locked: bool,
    waiters: VecDeque<Waiter>,
}

/// A mutual-exclusion primitive with two FIFO wait queues, draining the
/// high-priority queue first on every release. Block validation acquires
/// under `Priority::High`; mempool admission acquires under `Priority::Low`.
pub struct PriorityMutex {
    state: Mutex<State>,
}

/// Holds the lock until dropped, at which point the next waiter (if any) is
/// released in priority order.
pub struct PriorityMutexGuard<'a> {
    mutex: &'a PriorityMutex,
}

impl PriorityMutex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                locked: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Suspends the caller until it holds the lock.
    pub async fn acquire(&self, priority: Priority) -> PriorityMutexGuard<'_> {
        let notify = {
            let mut state = self.state.lock().await;
            if !state.locked && state.waiters.is_empty() {
                state.locked = true;
                return PriorityMutexGuard { mutex: self };
            }
            let notify = Arc::new(Notify::new());
            state.waiters.push_back(Waiter {
                priority,
                notify: notify.clone(),
            });
            notify
        };

        // One queue entry for the whole wait: a re-check failure below loops
        // back to `notified()` on the same `Notify` instead of enqueueing a
        // second entry, which would orphan this one.
        loop {
            notify.notified().await;

            let mut state = self.state.lock().await;
            if !state.locked && Self::is_next(&state, priority, &notify) {
                state.locked = true;
                state.waiters.retain(|w| !Arc::ptr_eq(&w.notify, &notify));
                return PriorityMutexGuard { mutex: self };
            }
        }
    }

    fn is_next(state: &State, priority: Priority, notify: &Arc<Notify>) -> bool {
        match state.waiters.iter().min_by_key(|w| w.priority) {
            Some(next) => Arc::ptr_eq(&next.notify, notify) && next.priority == priority,
            None => true,
        }
    }

    fn release(&self) {
        // Spawn-free synchronous release: this is called from `Drop`, so we
        // use `try_lock`. The mutex is uncontended at this exact instant
        // because we are the one releasing it. The woken waiter removes
        // itself from the queue once it re-acquires `state`; we only wake it
        // here so two releases can never pick the same waiter twice.
        if let Ok(mut state) = self.state.try_lock() {
            state.locked = false;
            if let Some(next) = state.waiters.iter().min_by_key(|w| w.priority) {
                next.notify.notify_one();
            }
        }
    }
}

impl Default for PriorityMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PriorityMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.release();
    }
}
