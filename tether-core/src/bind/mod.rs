//! Binding Components
//!
//! The three components that attach containers to the host tree:
//!
//! - [`ValueSubscriber`] re-renders from a container's value.
//! - [`ContainerProvider`] creates or adopts a container and publishes both
//!   the container and its value to the subtree.
//! - [`ChangeListener`] runs side effects on changes without re-rendering.
//!
//! `ValueSubscriber` and `ChangeListener` take their container by direct
//! reference, usually obtained from the scope a `ContainerProvider`
//! published. All three follow the [`Lifecycle`](crate::host::Lifecycle)
//! state machine and implement [`Component`](crate::host::Component).

mod listener;
mod provider;
mod subscriber;

pub use listener::{ChangeListener, Filter, ListenerFn};
pub use provider::ContainerProvider;
pub use subscriber::{Builder, RenderState, ValueSubscriber};
