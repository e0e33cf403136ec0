//! Shared mutable state handles.
//!
//! Every piece of engine state that more than one task touches lives behind
//! a [`Shared`]. Critical sections are short and never cross an await, so a
//! blocking `std::sync::RwLock` is used rather than the async one. A
//! poisoned lock is recovered with a warning: the data is plain values and
//! stays usable after a panicking writer.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

#[derive(Debug, Default)]
pub struct Shared<T> {
    inner: Arc<RwLock<T>>,
    label: &'static str,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            label: self.label,
        }
    }
}

impl<T> Shared<T> {
    /// `label` names the state in poison-recovery warnings.
    pub fn new(label: &'static str, value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(value)),
            label,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(|e| {
            warn!(state = self.label, "RwLock poisoned on read, recovering");
            e.into_inner()
        })
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(|e| {
            warn!(state = self.label, "RwLock poisoned on write, recovering");
            e.into_inner()
        })
    }

    /// Run `f` under the write lock.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write())
    }
}

impl<T: Clone> Shared<T> {
    pub fn snapshot(&self) -> T {
        self.read().clone()
    }
}
