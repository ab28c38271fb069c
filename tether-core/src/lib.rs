//! Tether Core
//!
//! Lifecycle bindings between observable state containers and a component
//! tree. The crate provides:
//!
//! - An observable container contract and a concrete container
//!   ([`StateNotifier`](container::StateNotifier))
//! - An explicit, tree-scoped injection scope with typed lookup
//! - Three components that subscribe on mount and release on unmount:
//!   a value subscriber, a container provider and a change listener
//!
//! The host tree itself (reconciliation, scheduling, traversal) is not part
//! of this crate. It talks to the bindings through the [`host::Host`] trait
//! and drives each component through its lifecycle transitions.
//!
//! # Architecture
//!
//! - `container`: the observable-state contract, notifier and change streams
//! - `scope`: publication slots, the scope chain and capability lookup
//! - `host`: the host seam, build contexts and the lifecycle state machine
//! - `bind`: the binding components
//! - `config`, `error`: configuration and error taxonomy
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use tether_core::bind::{ContainerProvider, ValueSubscriber};
//! use tether_core::config::BindingConfig;
//! use tether_core::container::StateNotifier;
//! use tether_core::host::{BuildContext, Component, RebuildQueue};
//!
//! let queue = Rc::new(RebuildQueue::new());
//! let root = BuildContext::root(queue.clone(), BindingConfig::default());
//!
//! // Publish a counter to the subtree.
//! let mut provider = ContainerProvider::create(|_| StateNotifier::new(0));
//! provider.mount(&root);
//! let below = root.child(provider.child_scope().unwrap());
//!
//! // Render from it.
//! let counter = below.read::<Rc<StateNotifier<i32>>>().unwrap();
//! let mut label: ValueSubscriber<_, String> =
//!     ValueSubscriber::new(counter.clone(), |_, count: &i32, _| format!("count: {count}"));
//! label.mount(&below);
//! assert_eq!(label.render().unwrap(), "count: 0");
//!
//! counter.update(|n| n + 1);
//! assert_eq!(queue.drain(), vec![below.element()]);
//! assert_eq!(label.render().unwrap(), "count: 1");
//! ```

pub mod bind;
pub mod config;
pub mod container;
pub mod error;
pub mod host;
pub mod scope;

pub use error::{DependencyNotFound, Error, Result};
