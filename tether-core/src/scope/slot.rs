//! Publication Slots
//!
//! A slot is one value published into a [`Scope`](super::Scope). Elements
//! that resolve the slot with `watch` become its dependents; replacing the
//! slot's value asks the host to rebuild each of them.
//!
//! A slot may start empty with an initializer, which runs the first time the
//! value is needed.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::host::{ElementId, Host};

type Init<T> = Box<dyn FnOnce() -> T>;

/// Type-erased view of a slot, as stored in scope frames.
pub(crate) trait Publication {
    fn type_name(&self) -> &'static str;

    fn forget(&self, element: ElementId);

    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// A published value of type `T`.
pub struct Slot<T> {
    value: RefCell<Option<T>>,
    init: RefCell<Option<Init<T>>>,
    dependents: RefCell<SmallVec<[ElementId; 4]>>,
    host: Rc<dyn Host>,
}

impl<T: Clone + 'static> Slot<T> {
    /// A slot holding `value`.
    pub fn new(value: T, host: Rc<dyn Host>) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(Some(value)),
            init: RefCell::new(None),
            dependents: RefCell::new(SmallVec::new()),
            host,
        })
    }

    /// A slot whose value is produced by `init` on first access.
    pub fn lazy<F>(init: F, host: Rc<dyn Host>) -> Rc<Self>
    where
        F: FnOnce() -> T + 'static,
    {
        Rc::new(Self {
            value: RefCell::new(None),
            init: RefCell::new(Some(Box::new(init))),
            dependents: RefCell::new(SmallVec::new()),
            host,
        })
    }

    /// Get the value, running the initializer if it has not run yet.
    ///
    /// # Panics
    ///
    /// Panics if the initializer reads its own slot.
    pub fn get(&self) -> T {
        if let Some(value) = self.value.borrow().as_ref() {
            return value.clone();
        }

        let init = self.init.borrow_mut().take();
        let Some(init) = init else {
            panic!(
                "slot of `{}` read while it is being initialized",
                std::any::type_name::<T>()
            );
        };
        let produced = init();

        // The initializer may have caused a newer value to be installed.
        let mut value = self.value.borrow_mut();
        value.get_or_insert(produced).clone()
    }

    /// The value if it has been produced, without initializing.
    pub fn peek(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.value.borrow().is_some()
    }

    /// Install a new value and schedule a rebuild of every dependent.
    pub fn replace(&self, value: T) {
        *self.value.borrow_mut() = Some(value);
        self.init.borrow_mut().take();

        let dependents: SmallVec<[ElementId; 4]> = self.dependents.borrow().clone();
        for element in dependents {
            self.host.schedule_rebuild(element);
        }
    }

    /// Register `element` to be rebuilt when the value is replaced.
    pub fn add_dependent(&self, element: ElementId) {
        let mut dependents = self.dependents.borrow_mut();
        if !dependents.contains(&element) {
            dependents.push(element);
        }
    }

    pub fn remove_dependent(&self, element: ElementId) {
        self.dependents.borrow_mut().retain(|e| *e != element);
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }
}

impl<T: Clone + 'static> Publication for Slot<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn forget(&self, element: ElementId) {
        self.remove_dependent(element);
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("type", &std::any::type_name::<T>())
            .field("initialized", &self.value.borrow().is_some())
            .field("dependent_count", &self.dependents.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RebuildQueue;
    use std::cell::Cell;

    #[test]
    fn lazy_slot_initializes_once() {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let slot = Slot::lazy(
            move || {
                runs_clone.set(runs_clone.get() + 1);
                "ready".to_string()
            },
            Rc::new(RebuildQueue::new()),
        );

        assert!(!slot.is_initialized());
        assert_eq!(slot.peek(), None);
        assert_eq!(slot.get(), "ready");
        assert_eq!(slot.get(), "ready");
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn replace_before_first_read_skips_the_initializer() {
        let slot = Slot::lazy(|| -> i32 { panic!("must not run") }, Rc::new(RebuildQueue::new()));
        slot.replace(4);
        assert_eq!(slot.get(), 4);
    }

    #[test]
    fn replace_schedules_each_dependent_once() {
        let queue = Rc::new(RebuildQueue::new());
        let slot = Slot::new(0, queue.clone());
        let a = ElementId::new();
        let b = ElementId::new();

        slot.add_dependent(a);
        slot.add_dependent(a);
        slot.add_dependent(b);
        assert_eq!(slot.dependent_count(), 2);

        slot.replace(1);
        assert_eq!(queue.drain(), vec![a, b]);

        slot.remove_dependent(a);
        slot.replace(2);
        assert_eq!(queue.drain(), vec![b]);
    }
}
