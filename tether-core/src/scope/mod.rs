//! Injection Scope
//!
//! A scope is the set of publications visible from one position in the
//! host tree. It is a persistent chain of frames: publishing never mutates
//! an existing scope, it returns a new scope with one more frame on top.
//! Lookup walks the chain from the innermost frame outward and returns the
//! first publication registered for the requested type.
//!
//! # Dual publication
//!
//! A provider publishes its container in one frame and the container's
//! current value in a nested frame above it. Descendants resolve either by
//! type. The container's slot never changes after creation, so watching it
//! never triggers a rebuild; the value's slot is replaced on every change.

mod locator;
mod slot;

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::host::ElementId;

pub use locator::{LookupMode, Locator, LocatorAware, LocatorSlot};
pub(crate) use locator::CallWindow;
pub use slot::Slot;
use slot::Publication;

/// The scope's own not-found signal.
///
/// Public lookups convert it into the typed
/// [`DependencyNotFound`](crate::error::DependencyNotFound).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("`{type_name}` is not published in this scope")]
pub struct ScopeMiss {
    pub type_name: &'static str,
}

struct Frame {
    parent: Scope,
    entries: IndexMap<TypeId, Rc<dyn Publication>>,
}

/// The publications visible from one tree position.
#[derive(Clone, Default)]
pub struct Scope {
    frame: Option<Rc<Frame>>,
}

impl Scope {
    /// A scope with no publications.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A new scope with `slot` published on top of this one.
    pub fn publish<T: Clone + 'static>(&self, slot: Rc<Slot<T>>) -> Scope {
        self.frame().with(slot).build()
    }

    /// Start a frame publishing several values at the same level.
    pub fn frame(&self) -> FrameBuilder {
        FrameBuilder {
            parent: self.clone(),
            entries: IndexMap::new(),
        }
    }

    /// Find the innermost slot publishing `T`.
    pub fn lookup<T: Clone + 'static>(&self) -> Result<Rc<Slot<T>>, ScopeMiss> {
        let key = TypeId::of::<T>();
        let mut cursor = self.frame.as_ref();
        while let Some(frame) = cursor {
            if let Some(entry) = frame.entries.get(&key) {
                if let Ok(slot) = Rc::clone(entry).into_any().downcast::<Slot<T>>() {
                    return Ok(slot);
                }
            }
            cursor = frame.parent.frame.as_ref();
        }
        Err(ScopeMiss {
            type_name: std::any::type_name::<T>(),
        })
    }

    pub fn contains<T: Clone + 'static>(&self) -> bool {
        self.lookup::<T>().is_ok()
    }

    /// Number of frames in the chain.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cursor = self.frame.as_ref();
        while let Some(frame) = cursor {
            depth += 1;
            cursor = frame.parent.frame.as_ref();
        }
        depth
    }

    /// Whether both scopes are the same chain.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        match (&self.frame, &other.frame) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Remove `element` from the dependents of every visible publication.
    pub(crate) fn forget(&self, element: ElementId) {
        let mut cursor = self.frame.as_ref();
        while let Some(frame) = cursor {
            for entry in frame.entries.values() {
                entry.forget(element);
            }
            cursor = frame.parent.frame.as_ref();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut frames = Vec::new();
        let mut cursor = self.frame.as_ref();
        while let Some(frame) = cursor {
            let names: Vec<&str> = frame.entries.values().map(|e| e.type_name()).collect();
            frames.push(names);
            cursor = frame.parent.frame.as_ref();
        }
        f.debug_struct("Scope").field("frames", &frames).finish()
    }
}

/// Builder for a single scope frame.
pub struct FrameBuilder {
    parent: Scope,
    entries: IndexMap<TypeId, Rc<dyn Publication>>,
}

impl FrameBuilder {
    /// Publish `slot` in this frame, replacing an earlier slot of the same type.
    pub fn with<T: Clone + 'static>(mut self, slot: Rc<Slot<T>>) -> Self {
        self.entries.insert(TypeId::of::<T>(), slot);
        self
    }

    pub fn build(self) -> Scope {
        Scope {
            frame: Some(Rc::new(Frame {
                parent: self.parent,
                entries: self.entries,
            })),
        }
    }
}
