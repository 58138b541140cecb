use std::{collections::VecDeque, mem, num::NonZeroUsize, time::Instant};

use thiserror::Error;

use crate::sync::{const_mutex, Condvar, Mutex};

/// The item has not been enqueued
///
/// Returns the rejected item to the caller.
#[derive(Debug, Error)]
pub enum EnqueueError<T> {
    #[error("queue capacity of {capacity} exhausted")]
    Full { capacity: usize, item: T },

    #[error("queue closed")]
    Closed { item: T },
}

impl<T> EnqueueError<T> {
    pub fn into_item(self) -> T {
        match self {
            Self::Full { item, .. } | Self::Closed { item } => item,
        }
    }
}

#[derive(Debug)]
struct Pending<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Pending<T> {
    const fn new() -> Self {
        Self {
            items: VecDeque::new(),
            closed: false,
        }
    }
}

/// Unbounded or bounded FIFO for handing over items between threads
///
/// Arbitrary producer threads append items at the tail while a
/// single consumer thread detaches all pending items at once.
///
/// The consumer never holds the lock while processing: The whole
/// backing store is moved out of the queue by swapping it with an
/// empty buffer that is owned by the consumer.
///
/// Bounded queues never block producers. Enqueuing into a full
/// queue fails immediately.
///
/// Once closed the queue rejects all new items.
#[derive(Debug)]
pub struct EventQueue<T> {
    mutex: Mutex<Pending<T>>,
    condvar: Condvar,
    capacity: Option<NonZeroUsize>,
}

impl<T> EventQueue<T> {
    #[must_use]
    pub const fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            mutex: const_mutex(Pending::new()),
            condvar: Condvar::new(),
            capacity,
        }
    }

    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub const fn bounded(capacity: NonZeroUsize) -> Self {
        Self::new(Some(capacity))
    }
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T> EventQueue<T> {
    /// The maximum number of pending items, if bounded
    #[must_use]
    pub const fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }

    /// Append an item and notify a single waiting consumer
    ///
    /// Fails if the queue is closed or if it is bounded and already full.
    pub fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        self.enqueue_map(item, |item| item)
    }

    /// Wrap and append an item and notify a single waiting consumer
    ///
    /// The item is only wrapped if it is accepted. Otherwise the
    /// unwrapped item is returned.
    pub fn enqueue_map<U>(
        &self,
        item: U,
        wrap: impl FnOnce(U) -> T,
    ) -> Result<(), EnqueueError<U>> {
        let mut guard = self.mutex.lock();
        if guard.closed {
            return Err(EnqueueError::Closed { item });
        }
        if let Some(capacity) = self.capacity {
            if guard.items.len() >= capacity.get() {
                return Err(EnqueueError::Full {
                    capacity: capacity.get(),
                    item,
                });
            }
        }
        guard.items.push_back(wrap(item));
        // Dropping the guard before notifying consumers might
        // cause spurious wakeups. These are handled appropriately.
        drop(guard);
        self.condvar.notify_one();
        Ok(())
    }

    /// Append an item regardless of the capacity and notify a
    /// single waiting consumer
    ///
    /// Fails only if the queue is closed.
    pub fn enqueue_unbounded(&self, item: T) -> Result<(), EnqueueError<T>> {
        let mut guard = self.mutex.lock();
        if guard.closed {
            return Err(EnqueueError::Closed { item });
        }
        guard.items.push_back(item);
        drop(guard);
        self.condvar.notify_one();
        Ok(())
    }

    /// Detach all pending items immediately
    ///
    /// Leaves the queue empty. Returns an empty sequence if
    /// no items are pending.
    pub fn drain_all(&self) -> VecDeque<T> {
        let mut guard = self.mutex.lock();
        mem::take(&mut guard.items)
    }

    /// Reject all subsequent items and detach all pending items
    ///
    /// Closing is irreversible.
    pub fn close(&self) -> VecDeque<T> {
        let mut guard = self.mutex.lock();
        guard.closed = true;
        mem::take(&mut guard.items)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.mutex.lock().closed
    }

    /// Wait until items are pending and then detach all of them
    ///
    /// The pending items are swapped into `batch` which must be empty.
    /// The allocated capacity of `batch` is reused by the queue.
    ///
    /// Blocks forever if no items are enqueued.
    pub fn wait_swap_all(&self, batch: &mut VecDeque<T>) {
        debug_assert!(batch.is_empty());
        let mut guard = self.mutex.lock();
        // The loop is required to handle spurious wakeups
        while guard.items.is_empty() {
            self.condvar.wait(&mut guard);
        }
        mem::swap(&mut guard.items, batch);
    }

    /// Wait until items are pending or the deadline expired and
    /// then detach all of them
    ///
    /// Returns `true` if any items have been swapped into `batch`
    /// or `false` if the deadline expired.
    pub fn wait_swap_all_until(&self, batch: &mut VecDeque<T>, deadline: Instant) -> bool {
        debug_assert!(batch.is_empty());
        let mut guard = self.mutex.lock();
        // The loop is required to handle spurious wakeups
        while guard.items.is_empty() && !self.condvar.wait_until(&mut guard, deadline).timed_out() {
        }
        if guard.items.is_empty() {
            return false;
        }
        mem::swap(&mut guard.items, batch);
        true
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutex.lock().items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mutex.lock().items.len()
    }
}

#[cfg(test)]
mod tests;
