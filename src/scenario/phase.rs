use crate::ScenarioError;

/// Scenario state machine.
///
/// `Teardown` is reachable from every state and is terminal. Reads of
/// cluster-wide state (`Verifying`) are only reachable through
/// `Converging`, so every query follows a convergence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Setup,
    Joining,
    Converging,
    FaultInjection,
    Verifying,
    Teardown,
}

impl Phase {
    pub fn can_transition_to(
        self,
        next: Phase,
    ) -> bool {
        use Phase::*;
        match (self, next) {
            (Teardown, _) => false,
            (_, Teardown) => true,
            (Setup, Joining | Converging) => true,
            (Joining, Joining | Converging) => true,
            (Converging, FaultInjection | Verifying | Joining) => true,
            (FaultInjection, FaultInjection | Converging) => true,
            (Verifying, Verifying | FaultInjection | Joining | Converging) => true,
            _ => false,
        }
    }
}

/// Current phase plus the phases visited so far
#[derive(Debug, Default, Clone)]
pub struct ScenarioState {
    current: Option<Phase>,
    visited: Vec<Phase>,
}

impl ScenarioState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.current
    }

    pub fn visited(&self) -> &[Phase] {
        &self.visited
    }

    pub fn is_terminal(&self) -> bool {
        self.current == Some(Phase::Teardown)
    }

    /// Moves to `next`. A fresh state only accepts `Setup` or `Teardown`.
    pub fn enter(
        &mut self,
        next: Phase,
    ) -> std::result::Result<(), ScenarioError> {
        let allowed = match self.current {
            None => matches!(next, Phase::Setup | Phase::Teardown),
            Some(current) => current.can_transition_to(next),
        };
        if !allowed {
            return Err(ScenarioError::InvalidTransition {
                from: self.current.unwrap_or(Phase::Setup),
                to: next,
            });
        }
        if self.current != Some(next) {
            self.visited.push(next);
        }
        self.current = Some(next);
        Ok(())
    }
}
