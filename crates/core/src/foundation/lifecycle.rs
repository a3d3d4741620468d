use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifecycle states of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Registrations are accepted
    Initializing,
    /// Read-only; every subsystem rejects registrations
    Frozen,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Initializing => write!(f, "initializing"),
            LifecycleState::Frozen => write!(f, "frozen"),
        }
    }
}

/// One-way init → frozen flag shared by every subsystem of a context.
///
/// Cloning hands out another view of the same flag, so the binding cache,
/// the event bus and the object registry all observe the freeze at once.
#[derive(Debug, Clone, Default)]
pub struct FreezeState {
    frozen: Arc<AtomicBool>,
}

impl FreezeState {
    /// Create a new, unfrozen state
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether the owning context has been frozen
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        if self.is_frozen() {
            LifecycleState::Frozen
        } else {
            LifecycleState::Initializing
        }
    }

    /// Freeze. Returns `false` if the state was already frozen.
    pub fn freeze(&self) -> bool {
        !self.frozen.swap(true, Ordering::AcqRel)
    }
}
