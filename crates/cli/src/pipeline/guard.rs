//! Session ownership for one run.

use contracts::RunPhase;
use engine::ComputeSession;
use tracing::{info, warn};

/// Owns the session and stops it exactly once when dropped, whichever way
/// the run ends.
pub struct SessionGuard<S: ComputeSession> {
    session: S,
    phase: RunPhase,
}

impl<S: ComputeSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        let mut guard = Self {
            session,
            phase: RunPhase::Created,
        };
        guard.transition(RunPhase::SessionActive);
        guard
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Record how the run ended
    pub fn finish(&mut self, succeeded: bool) {
        let next = if succeeded {
            RunPhase::Succeeded
        } else {
            RunPhase::Failed
        };
        self.transition(next);
    }

    fn transition(&mut self, next: RunPhase) {
        if self.phase.can_transition_to(next) {
            self.phase = next;
        } else {
            warn!(from = ?self.phase, to = ?next, "Ignoring invalid run phase transition");
        }
    }
}

impl<S: ComputeSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        // Dropped while still active: early return or panic
        if self.phase == RunPhase::SessionActive {
            self.transition(RunPhase::Failed);
        }

        info!(app_id = %self.session.app_id(), outcome = ?self.phase, "Stopping session");
        self.session.stop();
        self.transition(RunPhase::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::MockSession;

    #[test]
    fn test_stop_on_drop() {
        let session = MockSession::default();
        let mut guard = SessionGuard::new(session.clone());
        assert_eq!(guard.phase(), RunPhase::SessionActive);
        guard.finish(true);
        assert_eq!(guard.phase(), RunPhase::Succeeded);
        drop(guard);
        assert_eq!(session.stop_count(), 1);
    }

    #[test]
    fn test_stop_on_panic() {
        let session = MockSession::default();
        let inner = session.clone();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = SessionGuard::new(inner);
            panic!("step exploded");
        }));
        assert!(result.is_err());
        assert_eq!(session.stop_count(), 1);
    }

    #[test]
    fn test_finish_twice_is_ignored() {
        let session = MockSession::default();
        let mut guard = SessionGuard::new(session.clone());
        guard.finish(false);
        guard.finish(true);
        assert_eq!(guard.phase(), RunPhase::Failed);
        drop(guard);
        assert_eq!(session.stop_count(), 1);
    }
}
