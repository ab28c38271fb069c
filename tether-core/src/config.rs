//! Binding Configuration
//!
//! Configuration is plain data, deserialized with serde. The root
//! [`BuildContext`](crate::host::BuildContext) carries it and every child
//! context inherits it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, UsageError};

/// Whether invariant checks run.
///
/// `Strict` turns every [`UsageError`] into a panic. `Off` skips the checks
/// entirely, leaving the normal code path untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Strict,
    Off,
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            ValidationMode::Strict
        } else {
            ValidationMode::Off
        }
    }
}

impl ValidationMode {
    pub fn is_strict(self) -> bool {
        self == ValidationMode::Strict
    }

    /// Fail loudly on `violation` when strict.
    ///
    /// The closure only runs in strict mode.
    #[track_caller]
    pub fn check(self, violation: impl FnOnce() -> Option<UsageError>) {
        if !self.is_strict() {
            return;
        }
        if let Some(err) = violation() {
            tracing::error!(error = %err, "binding misuse");
            panic!("{err}");
        }
    }

    /// Like [`check`](Self::check) for an already computed result.
    #[track_caller]
    pub fn enforce<T>(self, result: std::result::Result<T, UsageError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.check(|| Some(err));
                None
            }
        }
    }
}

/// Tunables for the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindingConfig {
    /// Invariant checking.
    pub validation: ValidationMode,

    /// Whether [`ContainerProvider::create`](crate::bind::ContainerProvider::create)
    /// defers running its factory until the container is first resolved.
    pub lazy_by_default: bool,

    /// Emit a `trace!` event for every change delivered to a component.
    pub trace_notifications: bool,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            validation: ValidationMode::default(),
            lazy_by_default: true,
            trace_notifications: false,
        }
    }
}

impl BindingConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_lazy_by_default(mut self, lazy: bool) -> Self {
        self.lazy_by_default = lazy;
        self
    }
}
