//! Viewed-stage arbitration between live following and manual pinning.

use serde::{Deserialize, Serialize};

use crate::registry::StepRegistry;

/// Which stage the observer is looking at.
///
/// While `following` is set the viewed stage tracks the active stage. The
/// first manual [`navigate`](Self::navigate) clears it and only a new run
/// ([`NavigationState::new`]) sets it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    viewed_ordinal: usize,
    following: bool,
}

impl NavigationState {
    pub fn new(active_ordinal: usize) -> Self {
        Self {
            viewed_ordinal: active_ordinal,
            following: true,
        }
    }

    pub fn viewed_ordinal(&self) -> usize {
        self.viewed_ordinal
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    /// Pins the view to `target`, clamped into the registry range.
    pub fn navigate(&mut self, target: i64, registry: &StepRegistry) -> usize {
        self.viewed_ordinal = registry.clamp(target);
        self.following = false;
        self.viewed_ordinal
    }

    /// Called after every reducer step with the current active ordinal.
    pub fn track(&mut self, active_ordinal: usize) {
        if self.following {
            self.viewed_ordinal = active_ordinal;
        }
    }
}

impl Default for NavigationState {
    fn default() -> Self {
        Self::new(0)
    }
}
