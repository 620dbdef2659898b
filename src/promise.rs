//! # Single-delivery rendezvous cell.
//!
//! A [`Promise`] starts pending and transitions to delivered exactly once.
//! Any number of execution contexts may wait on it; they all observe the same
//! value. It is the building block of the spawn registration barrier and of
//! `sync`/`wait`.
//!
//! ## Rules
//! - `deliver` on an already delivered promise returns
//!   [`PromiseError::AlreadyDelivered`] and keeps the first value.
//! - `get` after delivery returns immediately.
//! - Dropping a pending `get` future (e.g. the waiting task is aborted) leaves
//!   the promise untouched.
//! - No timeout variant; layer `tokio::time::timeout` on top when needed.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Notify;

use crate::error::PromiseError;

struct Inner<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

/// Single-value, single-delivery rendezvous cell.
///
/// Cheap to clone: clones share the same slot.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("delivered", &self.is_delivered())
            .finish()
    }
}

impl<T> Promise<T> {
    /// Creates a pending promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Stores `value` and wakes every current and future waiter.
    ///
    /// Fails with [`PromiseError::AlreadyDelivered`] if a value is already
    /// stored; the stored value is never overwritten.
    pub fn deliver(&self, value: T) -> Result<(), PromiseError> {
        {
            let mut slot = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                tracing::error!(
                    label = PromiseError::AlreadyDelivered.as_label(),
                    "second delivery rejected"
                );
                return Err(PromiseError::AlreadyDelivered);
            }
            *slot = Some(value);
        }
        self.inner.notify.notify_waiters();
        Ok(())
    }

    /// Returns true once a value has been delivered.
    pub fn is_delivered(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Clone> Promise<T> {
    /// Returns the delivered value without waiting, if any.
    pub fn try_get(&self) -> Option<T> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits until the promise is delivered and returns a clone of the value.
    pub async fn get(&self) -> T {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the slot so a delivery in between is not missed.
            notified.as_mut().enable();

            if let Some(value) = self.try_get() {
                return value;
            }
            notified.await;
        }
    }
}
