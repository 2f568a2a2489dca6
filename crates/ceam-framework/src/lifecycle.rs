//! Simulation lifecycle phases.
//!
//! A simulation moves through a fixed sequence of phases, and the framework
//! restricts what each phase permits. Registration of streams, listeners,
//! initializers and observations happens during [`LifecyclePhase::Setup`];
//! state-table mutation happens during the main loop. Attempting an
//! operation outside its phase is an [`Error::PhaseViolation`].
//!
//! [`Error::PhaseViolation`]: crate::error::Error::PhaseViolation

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The phases of a simulation's life, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecyclePhase {
    /// Managers and components are being constructed and registered.
    Setup,
    /// Setup has finished; `post_setup` listeners run and registrations are
    /// validated.
    PostSetup,
    /// The initial population is being created.
    Initialization,
    /// Time steps are executing.
    MainLoop,
    /// `simulation_end` listeners run.
    Finalization,
    /// Results are being written.
    Report,
}

impl LifecyclePhase {
    /// All phases in lifecycle order.
    pub const ALL: [LifecyclePhase; 6] = [
        LifecyclePhase::Setup,
        LifecyclePhase::PostSetup,
        LifecyclePhase::Initialization,
        LifecyclePhase::MainLoop,
        LifecyclePhase::Finalization,
        LifecyclePhase::Report,
    ];
}

/// Tracks the current phase and enforces phase restrictions.
#[derive(Debug)]
pub struct LifecycleManager {
    current: LifecyclePhase,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self {
            current: LifecyclePhase::Setup,
        }
    }
}

impl LifecycleManager {
    /// Create a manager in the setup phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current phase.
    pub fn current(&self) -> LifecyclePhase {
        self.current
    }

    /// Move to a new phase. Phases only move forward.
    pub fn advance_to(&mut self, phase: LifecyclePhase) -> Result<()> {
        if phase < self.current {
            return Err(Error::PhaseViolation {
                operation: format!("advance to {phase:?}"),
                phase: self.current,
            });
        }
        self.current = phase;
        Ok(())
    }

    /// Error unless the current phase matches.
    pub fn require(&self, phase: LifecyclePhase, operation: &str) -> Result<()> {
        if self.current == phase {
            Ok(())
        } else {
            Err(Error::PhaseViolation {
                operation: operation.to_string(),
                phase: self.current,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phases_only_move_forward() {
        let mut lifecycle = LifecycleManager::new();
        assert_eq!(lifecycle.current(), LifecyclePhase::Setup);

        lifecycle.advance_to(LifecyclePhase::MainLoop).unwrap();
        let err = lifecycle.advance_to(LifecyclePhase::Setup).unwrap_err();
        assert!(matches!(err, Error::PhaseViolation { .. }));
    }

    #[test]
    fn test_require_rejects_wrong_phase() {
        let mut lifecycle = LifecycleManager::new();
        lifecycle
            .require(LifecyclePhase::Setup, "register stream")
            .unwrap();

        lifecycle.advance_to(LifecyclePhase::MainLoop).unwrap();
        assert!(lifecycle
            .require(LifecyclePhase::Setup, "register stream")
            .is_err());
    }
}
