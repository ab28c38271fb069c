//! Component Lifecycle
//!
//! Every binding component moves through the same four phases. The host
//! drives the transitions; a transition that is not valid from the current
//! phase is rejected and leaves the phase untouched.
//!
//! ```text
//!  Initial --Mount--> Mounted --BeginUpdate--> Updating
//!                        |   <--EndUpdate----
//!                        +--Unmount--> Defunct
//! ```

use crate::config::ValidationMode;
use crate::error::UsageError;

use super::BuildContext;

/// Lifecycle phase of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed, not yet part of the tree.
    Initial,

    /// Part of the tree and holding its subscriptions.
    Mounted,

    /// Processing a change of its dependencies or properties.
    Updating,

    /// Removed from the tree. Terminal.
    Defunct,
}

/// A host-driven lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Mount,
    BeginUpdate,
    EndUpdate,
    Unmount,
}

/// Lifecycle state machine.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    phase: Phase,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            phase: Phase::Initial,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the component currently belongs to the tree.
    pub fn is_mounted(&self) -> bool {
        matches!(self.phase, Phase::Mounted | Phase::Updating)
    }

    /// Apply `transition`, returning the new phase.
    pub fn apply(&mut self, transition: Transition) -> Result<Phase, UsageError> {
        let next = match (self.phase, transition) {
            (Phase::Initial, Transition::Mount) => Phase::Mounted,
            (Phase::Mounted, Transition::BeginUpdate) => Phase::Updating,
            (Phase::Updating, Transition::EndUpdate) => Phase::Mounted,
            (Phase::Mounted, Transition::Unmount) => Phase::Defunct,
            (from, transition) => return Err(UsageError::InvalidTransition { from, transition }),
        };
        tracing::debug!(from = ?self.phase, ?transition, to = ?next, "lifecycle transition");
        self.phase = next;
        Ok(next)
    }

    /// Apply `transition` under `validation`.
    ///
    /// Returns whether the transition happened. A rejected transition panics
    /// in strict mode and is otherwise ignored.
    #[track_caller]
    pub fn advance(&mut self, transition: Transition, validation: ValidationMode) -> bool {
        validation.enforce(self.apply(transition)).is_some()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle hooks shared by the binding components.
///
/// Property updates differ per component and are inherent methods.
pub trait Component {
    /// The component was inserted into the tree at `ctx`.
    fn mount(&mut self, ctx: &BuildContext);

    /// The injection scope visible at `ctx` changed.
    fn dependencies_changed(&mut self, ctx: &BuildContext);

    /// The component was removed from the tree. Children are already gone.
    fn unmount(&mut self);

    fn phase(&self) -> Phase;
}
