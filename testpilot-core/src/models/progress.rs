use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::navigation::NavigationState;
use crate::registry::StepRegistry;

/// Run-wide position bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunProgress {
    pub active_ordinal: usize,
    pub completed: BTreeSet<usize>,
    pub navigation: NavigationState,
    pub error: Option<String>,
}

impl RunProgress {
    /// Position at the moment a run is acknowledged: the input stage is
    /// complete and the first real stage is active and viewed.
    pub fn started(registry: &StepRegistry) -> Self {
        let active_ordinal = registry.clamp(1);
        Self {
            active_ordinal,
            completed: BTreeSet::from([0]),
            navigation: NavigationState::new(active_ordinal),
            error: None,
        }
    }

    pub fn viewed_ordinal(&self) -> usize {
        self.navigation.viewed_ordinal()
    }

    pub fn is_following(&self) -> bool {
        self.navigation.is_following()
    }

    /// Moves the active stage forward; never backward.
    pub fn advance_to(&mut self, ordinal: usize) {
        self.active_ordinal = self.active_ordinal.max(ordinal);
        self.navigation.track(self.active_ordinal);
    }
}
