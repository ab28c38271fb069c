//! Host Tree Seam
//!
//! The component tree that mounts, rebuilds and unmounts elements is not
//! part of this crate. It reaches the bindings through three things:
//!
//! - [`Host`]: the sink for rebuild requests and uncaught container errors.
//! - [`BuildContext`]: an element's position in the tree, carrying the
//!   injection [`Scope`] visible from that position.
//! - [`Lifecycle`]: the per-component state machine the host drives through
//!   its transition calls.
//!
//! [`RebuildQueue`] is a minimal host that just records what it is asked to
//! do. Tests and simple embedders use it directly.

mod lifecycle;
mod queue;

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{BindingConfig, ValidationMode};
use crate::error::{ContainerError, DependencyNotFound};
use crate::scope::Scope;

pub use lifecycle::{Component, Lifecycle, Phase, Transition};
pub use queue::RebuildQueue;

/// Unique identifier for an element in the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Generate a new unique element ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

/// The host tree, as seen by the bindings.
pub trait Host {
    /// Ask the host to rebuild `element` on its next pass.
    fn schedule_rebuild(&self, element: ElementId);

    /// Centralized error channel for errors raised inside containers.
    fn report_error(&self, error: ContainerError);
}

/// An element's position in the host tree.
///
/// Cloning is cheap; all clones refer to the same element.
#[derive(Clone)]
pub struct BuildContext {
    element: ElementId,
    scope: Scope,
    host: Rc<dyn Host>,
    config: Rc<BindingConfig>,
}

impl BuildContext {
    /// Context for the root element of a tree, with an empty scope.
    pub fn root(host: Rc<dyn Host>, config: BindingConfig) -> Self {
        Self {
            element: ElementId::new(),
            scope: Scope::empty(),
            host,
            config: Rc::new(config),
        }
    }

    /// Context for a new child element that sees `scope`.
    pub fn child(&self, scope: Scope) -> Self {
        Self {
            element: ElementId::new(),
            scope,
            host: Rc::clone(&self.host),
            config: Rc::clone(&self.config),
        }
    }

    /// This element, after its ancestry changed and it now sees `scope`.
    pub fn reparented(&self, scope: Scope) -> Self {
        Self {
            element: self.element,
            scope,
            host: Rc::clone(&self.host),
            config: Rc::clone(&self.config),
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn config(&self) -> &BindingConfig {
        &self.config
    }

    pub fn validation(&self) -> ValidationMode {
        self.config.validation
    }

    /// Resolve `T` without subscribing to later changes of the publication.
    pub fn read<T: Clone + 'static>(&self) -> Result<T, DependencyNotFound<T>> {
        self.scope
            .lookup::<T>()
            .map(|slot| slot.get())
            .map_err(|_| DependencyNotFound::new())
    }

    /// Resolve `T` and rebuild this element whenever the publication changes.
    pub fn watch<T: Clone + 'static>(&self) -> Result<T, DependencyNotFound<T>> {
        let slot = self
            .scope
            .lookup::<T>()
            .map_err(|_| DependencyNotFound::new())?;
        slot.add_dependent(self.element);
        Ok(slot.get())
    }

    /// Drop every dependency this element registered with [`watch`](Self::watch).
    pub fn forget_dependencies(&self) {
        self.scope.forget(self.element);
    }
}

impl fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildContext")
            .field("element", &self.element)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Slot;

    #[test]
    fn element_ids_are_unique() {
        let id1 = ElementId::new();
        let id2 = ElementId::new();
        assert_ne!(id1, id2);
        assert_ne!(id1.raw(), id2.raw());
    }

    #[test]
    fn child_gets_a_new_element_and_shares_config() {
        let root = BuildContext::root(Rc::new(RebuildQueue::new()), BindingConfig::default());
        let child = root.child(Scope::empty());
        assert_ne!(root.element(), child.element());
        assert_eq!(root.config(), child.config());

        let moved = child.reparented(Scope::empty());
        assert_eq!(moved.element(), child.element());
    }

    #[test]
    fn watch_registers_and_forget_releases() {
        let queue = Rc::new(RebuildQueue::new());
        let root = BuildContext::root(queue.clone(), BindingConfig::default());
        let slot = Slot::new(7_u32, root.host().clone());
        let ctx = root.child(root.scope().publish(slot.clone()));

        assert_eq!(ctx.read::<u32>(), Ok(7));
        assert_eq!(slot.dependent_count(), 0);

        assert_eq!(ctx.watch::<u32>(), Ok(7));
        assert_eq!(slot.dependent_count(), 1);

        slot.replace(8);
        assert!(queue.is_scheduled(ctx.element()));

        ctx.forget_dependencies();
        assert_eq!(slot.dependent_count(), 0);
    }

    #[test]
    fn missing_type_is_a_typed_error() {
        let root = BuildContext::root(Rc::new(RebuildQueue::new()), BindingConfig::default());
        let err = root.read::<String>().unwrap_err();
        assert!(err.type_name().contains("String"));
    }
}
