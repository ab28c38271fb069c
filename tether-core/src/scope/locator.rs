//! Capability Lookup
//!
//! A [`Locator`] resolves types from the scope visible at one tree position.
//! Containers that implement [`LocatorAware`] receive locators from the
//! provider that owns them:
//!
//! - At initialization, a `Read` locator bound to the provider's position.
//!   It stays valid until the provider moves or is removed.
//! - On every dependency update, a `Watch` locator valid only for the
//!   duration of the `update_dependencies` call. While that call runs the
//!   bound `Read` locator is suspended.
//!
//! Each locator shares a call window with the provider. The window is a
//! small state cell; the provider opens, suspends and closes it, and every
//! lookup checks it first.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::config::ValidationMode;
use crate::error::{DependencyNotFound, UsageError};
use crate::host::BuildContext;

/// How a locator resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Resolve without subscribing.
    Read,

    /// Resolve and register the provider as a dependent, so the next change
    /// of the publication triggers another dependency update.
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Open,
    Suspended,
    Closed,
}

/// Shared validity flag of a locator.
#[derive(Debug, Clone)]
pub(crate) struct CallWindow(Rc<Cell<WindowState>>);

impl CallWindow {
    pub(crate) fn open() -> Self {
        Self(Rc::new(Cell::new(WindowState::Open)))
    }

    pub(crate) fn close(&self) {
        self.0.set(WindowState::Closed);
    }

    /// Suspend the window until the returned guard is dropped.
    ///
    /// The previous state is restored on drop, even if the caller panics.
    pub(crate) fn suspend(&self) -> WindowGuard {
        let restore = self.0.replace(WindowState::Suspended);
        WindowGuard {
            window: self.clone(),
            restore,
        }
    }

    /// Keep the window open until the returned guard is dropped, then close it.
    pub(crate) fn scoped(&self) -> WindowGuard {
        self.0.set(WindowState::Open);
        WindowGuard {
            window: self.clone(),
            restore: WindowState::Closed,
        }
    }

    fn state(&self) -> WindowState {
        self.0.get()
    }
}

/// Restores a [`CallWindow`] when dropped.
pub(crate) struct WindowGuard {
    window: CallWindow,
    restore: WindowState,
}

impl Drop for WindowGuard {
    fn drop(&mut self) {
        self.window.0.set(self.restore);
    }
}

/// A capability-lookup function bound to one tree position.
#[derive(Clone)]
pub struct Locator {
    ctx: BuildContext,
    mode: LookupMode,
    window: CallWindow,
}

impl Locator {
    pub(crate) fn new(ctx: BuildContext, mode: LookupMode, window: CallWindow) -> Self {
        Self { ctx, mode, window }
    }

    pub fn mode(&self) -> LookupMode {
        self.mode
    }

    /// Whether calling [`get`](Self::get) is currently allowed.
    pub fn is_open(&self) -> bool {
        self.window.state() == WindowState::Open
    }

    /// Resolve `T` from the scope this locator is bound to.
    ///
    /// # Panics
    ///
    /// With strict validation, panics when called outside the locator's call
    /// window.
    #[track_caller]
    pub fn get<T: Clone + 'static>(&self) -> Result<T, DependencyNotFound<T>> {
        let requested = std::any::type_name::<T>();
        self.ctx.validation().check(|| match self.window.state() {
            WindowState::Open => None,
            WindowState::Suspended => Some(UsageError::ReadDuringUpdate { requested }),
            WindowState::Closed => Some(UsageError::LocatorClosed { requested }),
        });

        let slot = match self.ctx.scope().lookup::<T>() {
            Ok(slot) => slot,
            Err(miss) => {
                tracing::debug!(requested = miss.type_name, "locator lookup missed");
                return Err(DependencyNotFound::new());
            }
        };
        if self.mode == LookupMode::Watch {
            slot.add_dependent(self.ctx.element());
        }
        Ok(slot.get())
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("element", &self.ctx.element())
            .field("mode", &self.mode)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Optional capability of a container that resolves its own dependencies.
pub trait LocatorAware {
    /// Store the `Read` locator for later lookups. Called again whenever the
    /// owning provider's position in the tree changes.
    fn bind_locator(&self, locator: Locator);

    /// Called once, right after the first [`bind_locator`](Self::bind_locator).
    fn init_state(&self) {}

    /// The provider's ancestry changed. `watch` is only valid during this call.
    fn update_dependencies(&self, watch: &Locator) {
        let _ = watch;
    }
}

/// Holder for the bound `Read` locator, for embedding in containers.
///
/// Bound reads are checked with the validation mode of the tree the locator
/// was bound in. A read before any provider bound a locator has no tree to
/// consult, so it is checked with the slot's own mode: the build profile's
/// default unless overridden with [`with_validation`](Self::with_validation).
#[derive(Debug, Default)]
pub struct LocatorSlot {
    bound: RefCell<Option<Locator>>,
    validation: Cell<ValidationMode>,
}

impl LocatorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validation(self, validation: ValidationMode) -> Self {
        self.validation.set(validation);
        self
    }

    pub fn bind(&self, locator: Locator) {
        *self.bound.borrow_mut() = Some(locator);
    }

    pub fn is_bound(&self) -> bool {
        self.bound.borrow().is_some()
    }

    /// Resolve `T` through the bound locator.
    #[track_caller]
    pub fn read<T: Clone + 'static>(&self) -> Result<T, DependencyNotFound<T>> {
        let locator = self.bound.borrow().clone();
        match locator {
            Some(locator) => locator.get::<T>(),
            None => {
                self.validation.get().check(|| {
                    Some(UsageError::LocatorUnbound {
                        requested: std::any::type_name::<T>(),
                    })
                });
                Err(DependencyNotFound::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;
    use crate::host::RebuildQueue;
    use crate::scope::Slot;

    fn context(validation: ValidationMode) -> (Rc<RebuildQueue>, BuildContext) {
        let queue = Rc::new(RebuildQueue::new());
        let root = BuildContext::root(
            queue.clone(),
            BindingConfig::default().with_validation(validation),
        );
        (queue, root)
    }

    #[test]
    fn read_locator_does_not_subscribe() {
        let (_queue, root) = context(ValidationMode::Strict);
        let slot = Slot::new(5_u32, root.host().clone());
        let ctx = root.child(root.scope().publish(slot.clone()));

        let locator = Locator::new(ctx, LookupMode::Read, CallWindow::open());
        assert_eq!(locator.get::<u32>(), Ok(5));
        assert_eq!(slot.dependent_count(), 0);
    }

    #[test]
    fn watch_locator_subscribes_its_element() {
        let (queue, root) = context(ValidationMode::Strict);
        let slot = Slot::new(5_u32, root.host().clone());
        let ctx = root.child(root.scope().publish(slot.clone()));

        let window = CallWindow::open();
        let locator = Locator::new(ctx.clone(), LookupMode::Watch, window.clone());
        {
            let _guard = window.scoped();
            assert_eq!(locator.get::<u32>(), Ok(5));
        }
        assert!(!locator.is_open());

        slot.replace(6);
        assert!(queue.is_scheduled(ctx.element()));
    }

    #[test]
    fn miss_is_typed() {
        let (_queue, root) = context(ValidationMode::Strict);
        let locator = Locator::new(root, LookupMode::Read, CallWindow::open());
        let err = locator.get::<String>().unwrap_err();
        assert!(err.type_name().contains("String"));
    }

    #[test]
    #[should_panic(expected = "after its call window closed")]
    fn closed_window_fails_loudly() {
        let (_queue, root) = context(ValidationMode::Strict);
        let window = CallWindow::open();
        let locator = Locator::new(root, LookupMode::Watch, window.clone());
        drop(window.scoped());
        let _ = locator.get::<u8>();
    }

    #[test]
    #[should_panic(expected = "during a dependency update")]
    fn suspended_window_fails_loudly() {
        let (_queue, root) = context(ValidationMode::Strict);
        let window = CallWindow::open();
        let locator = Locator::new(root, LookupMode::Read, window.clone());
        let _guard = window.suspend();
        let _ = locator.get::<u8>();
    }

    #[test]
    fn suspension_restores_previous_state() {
        let window = CallWindow::open();
        {
            let _guard = window.suspend();
            assert_eq!(window.state(), WindowState::Suspended);
        }
        assert_eq!(window.state(), WindowState::Open);
    }

    #[test]
    fn closed_window_is_ignored_without_validation() {
        let (_queue, root) = context(ValidationMode::Off);
        let slot = Slot::new(1_u8, root.host().clone());
        let ctx = root.child(root.scope().publish(slot));
        let window = CallWindow::open();
        window.close();
        let locator = Locator::new(ctx, LookupMode::Read, window);
        assert_eq!(locator.get::<u8>(), Ok(1));
    }

    #[test]
    fn unbound_slot_follows_its_own_mode() {
        let holder = LocatorSlot::new().with_validation(ValidationMode::Off);
        assert!(holder.read::<u8>().is_err());
    }

    #[test]
    #[should_panic(expected = "before a locator was bound")]
    fn unbound_slot_fails_loudly_when_strict() {
        let holder = LocatorSlot::new().with_validation(ValidationMode::Strict);
        let _ = holder.read::<u8>();
    }

    #[test]
    fn bound_reads_follow_the_tree_mode() {
        let (_queue, root) = context(ValidationMode::Off);
        let holder = LocatorSlot::new().with_validation(ValidationMode::Strict);
        let window = CallWindow::open();
        window.close();
        holder.bind(Locator::new(root, LookupMode::Read, window));
        assert!(holder.read::<u8>().is_err());
    }

    #[test]
    fn locator_slot_reads_through_binding() {
        let (_queue, root) = context(ValidationMode::Strict);
        let slot = Slot::new('x', root.host().clone());
        let ctx = root.child(root.scope().publish(slot));

        let holder = LocatorSlot::new();
        assert!(!holder.is_bound());
        holder.bind(Locator::new(ctx, LookupMode::Read, CallWindow::open()));
        assert_eq!(holder.read::<char>(), Ok('x'));
    }
}
