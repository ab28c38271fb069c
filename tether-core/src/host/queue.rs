//! Rebuild Queue
//!
//! A [`Host`] that records rebuild requests instead of acting on them.
//! Requests are de-duplicated and kept in the order they first arrived, so a
//! host pass that drains the queue rebuilds each element once.

use std::cell::RefCell;

use indexmap::IndexSet;

use crate::error::ContainerError;

use super::{ElementId, Host};

/// Pending rebuilds and reported errors.
#[derive(Debug, Default)]
pub struct RebuildQueue {
    pending: RefCell<IndexSet<ElementId>>,
    errors: RefCell<Vec<ContainerError>>,
}

impl RebuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `element` is waiting to be rebuilt.
    pub fn is_scheduled(&self, element: ElementId) -> bool {
        self.pending.borrow().contains(&element)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Take every pending rebuild, in request order.
    pub fn drain(&self) -> Vec<ElementId> {
        self.pending.borrow_mut().drain(..).collect()
    }

    /// Take every error reported so far.
    pub fn take_errors(&self) -> Vec<ContainerError> {
        std::mem::take(&mut *self.errors.borrow_mut())
    }

    pub fn error_count(&self) -> usize {
        self.errors.borrow().len()
    }
}

impl Host for RebuildQueue {
    fn schedule_rebuild(&self, element: ElementId) {
        self.pending.borrow_mut().insert(element);
    }

    fn report_error(&self, error: ContainerError) {
        tracing::error!(container = error.container(), error = %error, "container error reported");
        self.errors.borrow_mut().push(error);
    }
}
