//! Container Provider
//!
//! Publishes a container, and its current value, to the subtree below.
//!
//! # Modes
//!
//! - **Create**: the provider runs a factory to obtain the container and
//!   owns it. Before publishing, it checks that the container is fresh,
//!   installs an error handler that forwards to the host, and applies the
//!   tree's validation mode. Containers that implement [`LocatorAware`] get
//!   a [`Locator`], their init hook, and a first dependency update whose
//!   watch lookups tie the provider to the ancestors they read. It disposes
//!   the container when unmounted. With lazy creation the factory runs the
//!   first time a descendant resolves the container or its value.
//!
//! - **Adopt**: the provider publishes a container owned elsewhere. No
//!   error handler, no locator, no disposal.
//!
//! # Dual Publication
//!
//! The container is published as `Rc<C>` in one frame; its value is
//! published as `C::Value` in a frame nested above it. The container's slot
//! is never replaced while the same container is bound, so resolving
//! `Rc<C>` never causes a rebuild. The value's slot is replaced on every
//! change, so watching `C::Value` rebuilds the watcher.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::ValidationMode;
use crate::container::{StateContainer, Subscription};
use crate::error::{ContainerError, DependencyNotFound, UsageError};
use crate::host::{BuildContext, Component, Lifecycle, Phase, Transition};
use crate::scope::{CallWindow, Locator, LocatorAware, LookupMode, Scope, Slot};

type Factory<C> = Box<dyn FnOnce(&BuildContext) -> C>;

enum Source<C> {
    Create { factory: Factory<C>, lazy: Option<bool> },
    Adopt(Rc<C>),
}

/// State shared between the provider and the initializers of its slots.
struct Core<C: StateContainer> {
    ctx: RefCell<BuildContext>,
    owns: bool,
    factory: RefCell<Option<Factory<C>>>,
    container: RefCell<Option<Rc<C>>>,
    value_slot: Rc<Slot<C::Value>>,
    subscription: RefCell<Option<Subscription>>,
    read_window: RefCell<Option<CallWindow>>,
}

impl<C: StateContainer> Core<C> {
    fn validation(&self) -> ValidationMode {
        self.ctx.borrow().validation()
    }

    fn created(&self) -> Option<Rc<C>> {
        self.container.borrow().clone()
    }

    /// The container, running the factory if it has not run yet.
    fn ensure_created(&self) -> Rc<C> {
        if let Some(container) = self.created() {
            return container;
        }

        let factory = self.factory.borrow_mut().take();
        let Some(factory) = factory else {
            panic!(
                "`{}` resolved from inside its own factory",
                std::any::type_name::<C>()
            );
        };
        let ctx = self.ctx.borrow().clone();
        let container = Rc::new(factory(&ctx));
        self.take_ownership(&ctx, &container);
        *self.container.borrow_mut() = Some(Rc::clone(&container));
        self.track_value(&container);
        tracing::debug!(
            element = ?ctx.element(),
            container = std::any::type_name::<C>(),
            "provider created container"
        );
        container
    }

    fn take_ownership(&self, ctx: &BuildContext, container: &Rc<C>) {
        let validation = ctx.validation();
        let name = std::any::type_name::<C>();
        validation.check(|| {
            container
                .has_error_handler()
                .then_some(UsageError::ContainerReused { container: name })
        });
        validation.check(|| {
            container
                .has_listeners()
                .then_some(UsageError::ContainerAlreadyObserved { container: name })
        });

        container.notifier().set_validation(validation);
        let host = Rc::clone(ctx.host());
        container.set_error_handler(Rc::new(move |error: ContainerError| host.report_error(error)));

        if let Some(aware) = container.locator() {
            aware.bind_locator(self.bind_read_locator(ctx));
            aware.init_state();
            self.run_update(ctx, aware);
        }
    }

    /// Call `update_dependencies` with a single-use `Watch` locator while the
    /// bound `Read` locator is suspended.
    fn run_update(&self, ctx: &BuildContext, aware: &dyn LocatorAware) {
        let read_window = self.read_window.borrow().clone();
        let _suspended = read_window.as_ref().map(CallWindow::suspend);

        let watch_window = CallWindow::open();
        let watch = Locator::new(ctx.clone(), LookupMode::Watch, watch_window.clone());
        let _open = watch_window.scoped();
        aware.update_dependencies(&watch);
    }

    /// Open a fresh `Read` locator at `ctx`, closing the previous one.
    fn bind_read_locator(&self, ctx: &BuildContext) -> Locator {
        let window = CallWindow::open();
        if let Some(previous) = self.read_window.borrow_mut().replace(window.clone()) {
            previous.close();
        }
        Locator::new(ctx.clone(), LookupMode::Read, window)
    }

    /// Mirror the container's value into the value slot.
    fn track_value(&self, container: &Rc<C>) {
        let slot = Rc::clone(&self.value_slot);
        let subscription = container.on_change(Box::new(move |next| slot.replace(next.clone())));
        if let Some(previous) = self.subscription.borrow_mut().replace(subscription) {
            previous.cancel();
        }
    }

    fn refresh_dependencies(&self, ctx: &BuildContext) {
        let Some(container) = self.created() else {
            return;
        };
        if !self.owns {
            return;
        }
        let Some(aware) = container.locator() else {
            return;
        };

        aware.bind_locator(self.bind_read_locator(ctx));
        ctx.forget_dependencies();
        self.run_update(ctx, aware);
    }

    fn release(&self) {
        if let Some(subscription) = self.subscription.borrow_mut().take() {
            subscription.cancel();
        }
        if let Some(window) = self.read_window.borrow_mut().take() {
            window.close();
        }
        self.factory.borrow_mut().take();
    }
}

/// Creates or adopts a container and publishes it with its value.
pub struct ContainerProvider<C: StateContainer> {
    source: Option<Source<C>>,
    core: Option<Rc<Core<C>>>,
    container_slot: Option<Rc<Slot<Rc<C>>>>,
    child_scope: Option<Scope>,
    lifecycle: Lifecycle,
}

impl<C: StateContainer> ContainerProvider<C> {
    /// Create mode. Laziness follows [`BindingConfig::lazy_by_default`](crate::config::BindingConfig).
    pub fn create<F>(factory: F) -> Self
    where
        F: FnOnce(&BuildContext) -> C + 'static,
    {
        Self::with_source(Source::Create {
            factory: Box::new(factory),
            lazy: None,
        })
    }

    /// Adopt mode: publish `container` without taking ownership.
    pub fn adopt(container: Rc<C>) -> Self {
        Self::with_source(Source::Adopt(container))
    }

    fn with_source(source: Source<C>) -> Self {
        Self {
            source: Some(source),
            core: None,
            container_slot: None,
            child_scope: None,
            lifecycle: Lifecycle::new(),
        }
    }

    /// Override lazy creation for this provider. No effect in adopt mode.
    pub fn lazy(mut self, lazy: bool) -> Self {
        if let Some(Source::Create { lazy: slot, .. }) = self.source.as_mut() {
            *slot = Some(lazy);
        }
        self
    }

    /// Whether this provider disposes its container.
    pub fn is_owner(&self) -> bool {
        match (&self.core, &self.source) {
            (Some(core), _) => core.owns,
            (None, Some(Source::Create { .. })) => true,
            _ => false,
        }
    }

    /// The container, creating it if needed. `None` before mount and after
    /// unmount.
    pub fn container(&self) -> Option<Rc<C>> {
        if !self.lifecycle.is_mounted() {
            return None;
        }
        self.core.as_ref().map(|core| core.ensure_created())
    }

    /// The container if it already exists.
    pub fn peek_container(&self) -> Option<Rc<C>> {
        self.core.as_ref().and_then(|core| core.created())
    }

    /// The scope descendants see: the parent scope plus the container frame
    /// plus the nested value frame.
    pub fn child_scope(&self) -> Option<Scope> {
        self.child_scope.clone()
    }

    /// Property update in adopt mode: publish `container` instead.
    ///
    /// Watchers of either publication are rebuilt. Ignored in create mode.
    pub fn set_adopted(&mut self, container: Rc<C>) {
        let Some(core) = self.core.clone() else {
            if let Some(Source::Adopt(current)) = self.source.as_mut() {
                *current = container;
            }
            return;
        };
        if core.owns {
            tracing::debug!("create-mode provider ignores an adopted container");
            return;
        }
        if core.created().is_some_and(|current| Rc::ptr_eq(&current, &container)) {
            return;
        }
        if !self.lifecycle.advance(Transition::BeginUpdate, core.validation()) {
            return;
        }

        *core.container.borrow_mut() = Some(Rc::clone(&container));
        core.track_value(&container);
        core.value_slot.replace(container.current());
        if let Some(slot) = &self.container_slot {
            slot.replace(container);
        }
        tracing::debug!("provider adopted a new container");

        self.lifecycle.advance(Transition::EndUpdate, core.validation());
    }

    /// Resolve the container published above `ctx`, without subscribing.
    pub fn read_container(ctx: &BuildContext) -> Result<Rc<C>, DependencyNotFound<Rc<C>>> {
        ctx.read::<Rc<C>>()
    }

    /// Resolve the value published above `ctx` and rebuild on change.
    pub fn watch_value(ctx: &BuildContext) -> Result<C::Value, DependencyNotFound<C::Value>> {
        ctx.watch::<C::Value>()
    }

    fn publish(&mut self, ctx: &BuildContext) -> Scope {
        let (Some(core), Some(container_slot)) = (&self.core, &self.container_slot) else {
            return ctx.scope().clone();
        };
        let scope = ctx
            .scope()
            .publish(Rc::clone(container_slot))
            .publish(Rc::clone(&core.value_slot));
        self.child_scope = Some(scope.clone());
        scope
    }
}

fn lazy_container<C: StateContainer>(core: Weak<Core<C>>) -> impl FnOnce() -> Rc<C> {
    move || match core.upgrade() {
        Some(core) => core.ensure_created(),
        None => panic!(
            "`{}` resolved after its provider was dropped",
            std::any::type_name::<C>()
        ),
    }
}

fn lazy_value<C: StateContainer>(core: Weak<Core<C>>) -> impl FnOnce() -> C::Value {
    let container = lazy_container(core);
    move || container().current()
}

impl<C: StateContainer> Component for ContainerProvider<C> {
    fn mount(&mut self, ctx: &BuildContext) {
        if !self.lifecycle.advance(Transition::Mount, ctx.validation()) {
            return;
        }
        let Some(source) = self.source.take() else {
            return;
        };
        let host = Rc::clone(ctx.host());

        match source {
            Source::Create { factory, lazy } => {
                let lazy = lazy.unwrap_or(ctx.config().lazy_by_default);
                let core = Rc::new_cyclic(|weak: &Weak<Core<C>>| Core {
                    ctx: RefCell::new(ctx.clone()),
                    owns: true,
                    factory: RefCell::new(Some(factory)),
                    container: RefCell::new(None),
                    value_slot: Slot::lazy(lazy_value(weak.clone()), Rc::clone(&host)),
                    subscription: RefCell::new(None),
                    read_window: RefCell::new(None),
                });
                let container_slot = if lazy {
                    Slot::lazy(lazy_container(Rc::downgrade(&core)), host)
                } else {
                    Slot::new(core.ensure_created(), host)
                };
                self.core = Some(core);
                self.container_slot = Some(container_slot);
            }
            Source::Adopt(container) => {
                let core = Rc::new(Core {
                    ctx: RefCell::new(ctx.clone()),
                    owns: false,
                    factory: RefCell::new(None),
                    container: RefCell::new(Some(Rc::clone(&container))),
                    value_slot: Slot::new(container.current(), Rc::clone(&host)),
                    subscription: RefCell::new(None),
                    read_window: RefCell::new(None),
                });
                core.track_value(&container);
                self.core = Some(core);
                self.container_slot = Some(Slot::new(container, host));
            }
        }

        self.publish(ctx);
        tracing::debug!(element = ?ctx.element(), owner = self.is_owner(), "provider mounted");
    }

    fn dependencies_changed(&mut self, ctx: &BuildContext) {
        let Some(core) = self.core.clone() else {
            return;
        };
        if !self.lifecycle.advance(Transition::BeginUpdate, ctx.validation()) {
            return;
        }

        *core.ctx.borrow_mut() = ctx.clone();
        self.publish(ctx);
        core.refresh_dependencies(ctx);

        self.lifecycle.advance(Transition::EndUpdate, ctx.validation());
    }

    fn unmount(&mut self) {
        let Some(core) = self.core.take() else {
            return;
        };
        if !self.lifecycle.advance(Transition::Unmount, core.validation()) {
            self.core = Some(core);
            return;
        }

        core.release();
        core.ctx.borrow().forget_dependencies();
        let container = core.container.borrow_mut().take();
        if let (true, Some(container)) = (core.owns, container) {
            container.dispose();
            tracing::debug!(
                container = std::any::type_name::<C>(),
                "provider disposed container"
            );
        }
        self.container_slot = None;
        self.child_scope = None;
    }

    fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }
}

impl<C: StateContainer> fmt::Debug for ContainerProvider<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerProvider")
            .field("container", &std::any::type_name::<C>())
            .field("phase", &self.lifecycle.phase())
            .field("owner", &self.is_owner())
            .field("created", &self.peek_container().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BindingConfig;
    use crate::container::StateNotifier;
    use crate::host::RebuildQueue;
    use std::cell::Cell;

    fn root(config: BindingConfig) -> (Rc<RebuildQueue>, BuildContext) {
        let queue = Rc::new(RebuildQueue::new());
        let ctx = BuildContext::root(queue.clone(), config);
        (queue, ctx)
    }

    #[test]
    fn lazy_factory_runs_on_first_resolution() {
        let (_queue, ctx) = root(BindingConfig::default().with_lazy_by_default(true));
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let mut provider = ContainerProvider::create(move |_| {
            runs_clone.set(runs_clone.get() + 1);
            StateNotifier::new(1)
        });
        provider.mount(&ctx);
        assert_eq!(runs.get(), 0);
        assert!(provider.peek_container().is_none());

        let child = ctx.child(provider.child_scope().unwrap());
        assert_eq!(child.read::<i32>(), Ok(1));
        assert!(ContainerProvider::<StateNotifier<i32>>::read_container(&child).is_ok());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn eager_factory_runs_on_mount() {
        let (_queue, ctx) = root(BindingConfig::default());
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let mut provider = ContainerProvider::create(move |_| {
            runs_clone.set(runs_clone.get() + 1);
            StateNotifier::new(1)
        })
        .lazy(false);
        provider.mount(&ctx);
        assert_eq!(runs.get(), 1);
        assert!(provider.peek_container().is_some());
    }

    #[test]
    fn value_publication_follows_changes() {
        let (queue, ctx) = root(BindingConfig::default());
        let mut provider = ContainerProvider::create(|_| StateNotifier::new(0)).lazy(false);
        provider.mount(&ctx);
        let child = ctx.child(provider.child_scope().unwrap());

        assert_eq!(ContainerProvider::<StateNotifier<i32>>::watch_value(&child), Ok(0));
        provider.container().unwrap().set_state(5);

        assert!(queue.is_scheduled(child.element()));
        assert_eq!(child.read::<i32>(), Ok(5));
    }

    #[test]
    fn error_handler_forwards_to_host() {
        let (queue, ctx) = root(BindingConfig::default());
        let mut provider = ContainerProvider::create(|_| StateNotifier::new(1_u8)).lazy(false);
        provider.mount(&ctx);

        let container = provider.container().unwrap();
        assert!(container.has_error_handler());
        container.try_update(|v| v.checked_sub(2).ok_or("underflow"));

        assert_eq!(container.state(), 1);
        assert_eq!(queue.error_count(), 1);
    }

    #[test]
    fn adopt_mode_leaves_ownership_outside() {
        let (_queue, ctx) = root(BindingConfig::default());
        let notifier = Rc::new(StateNotifier::new(0));
        let mut provider = ContainerProvider::adopt(notifier.clone());
        assert!(!provider.is_owner());

        provider.mount(&ctx);
        assert!(!notifier.has_error_handler());

        provider.unmount();
        assert!(notifier.is_mounted());
        assert_eq!(notifier.listener_count(), 0);
    }

    #[test]
    fn unmount_disposes_created_container() {
        let (_queue, ctx) = root(BindingConfig::default());
        let mut provider = ContainerProvider::create(|_| StateNotifier::new(0)).lazy(false);
        provider.mount(&ctx);
        let container = provider.container().unwrap();

        provider.unmount();
        assert!(!container.is_mounted());
        assert_eq!(provider.phase(), Phase::Defunct);
        assert!(provider.container().is_none());
    }

    #[test]
    fn unmount_before_creation_never_runs_the_factory() {
        let (_queue, ctx) = root(BindingConfig::default());
        let mut provider = ContainerProvider::create(|_| -> StateNotifier<i32> {
            panic!("factory must not run")
        })
        .lazy(true);
        provider.mount(&ctx);
        provider.unmount();
    }

    #[test]
    #[should_panic(expected = "must not be shared between two providers")]
    fn created_container_with_error_handler_is_rejected() {
        let (_queue, ctx) =
            root(BindingConfig::default().with_validation(ValidationMode::Strict));
        let mut provider = ContainerProvider::create(|_| {
            let notifier = StateNotifier::new(0);
            notifier.set_error_handler(Rc::new(|_: ContainerError| {}));
            notifier
        })
        .lazy(false);
        provider.mount(&ctx);
    }

    #[test]
    #[should_panic(expected = "already has listeners")]
    fn created_container_with_listeners_is_rejected() {
        let (_queue, ctx) =
            root(BindingConfig::default().with_validation(ValidationMode::Strict));
        let notifier = StateNotifier::new(0);
        let _observer = notifier.add_listener(|_| {}, false);
        let handle = notifier.clone();
        let mut provider = ContainerProvider::create(move |_| handle).lazy(false);
        provider.mount(&ctx);
    }

    #[test]
    fn observed_container_is_accepted_without_validation() {
        let (_queue, ctx) = root(BindingConfig::default().with_validation(ValidationMode::Off));
        let notifier = StateNotifier::new(0);
        let _observer = notifier.add_listener(|_| {}, false);
        let handle = notifier.clone();
        let mut provider = ContainerProvider::create(move |_| handle).lazy(false);
        provider.mount(&ctx);

        let container = provider.container().unwrap();
        assert_eq!(provider.phase(), Phase::Mounted);
        assert!(container.has_error_handler());
        assert_eq!(container.listener_count(), 2);
    }

    #[test]
    fn created_container_follows_the_tree_validation_mode() {
        let (_queue, ctx) = root(BindingConfig::default().with_validation(ValidationMode::Off));
        let mut provider = ContainerProvider::create(|_| {
            StateNotifier::new(0).with_validation(ValidationMode::Strict)
        })
        .lazy(false);
        provider.mount(&ctx);
        let container = provider.container().unwrap();
        assert_eq!(container.validation(), ValidationMode::Off);

        provider.unmount();
        container.set_state(1);
        assert_eq!(container.state(), 0);
    }

    #[test]
    fn set_adopted_republishes() {
        let (queue, ctx) = root(BindingConfig::default());
        let first = Rc::new(StateNotifier::new(1));
        let second = Rc::new(StateNotifier::new(2));
        let mut provider = ContainerProvider::adopt(first.clone());
        provider.mount(&ctx);
        let child = ctx.child(provider.child_scope().unwrap());
        assert_eq!(child.watch::<i32>(), Ok(1));

        provider.set_adopted(second.clone());
        assert_eq!(child.read::<i32>(), Ok(2));
        assert!(queue.is_scheduled(child.element()));
        assert_eq!(first.listener_count(), 0);
        assert_eq!(second.listener_count(), 1);
    }
}
