use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;

/// Sign-in state for one console session.
///
/// Identity callbacks can fire repeatedly for the same user while the role
/// lookup is still in flight; only a change of identity starts a new check.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "userId")]
pub enum SessionState {
    #[default]
    Idle,
    Processing(String),
    Active(String),
}

/// What the caller should do after an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Look up the role of this user, then call `complete`.
    CheckRole(String),
    /// The session ended; clear any cached profile.
    SignedOut,
    Ignore,
}

#[derive(Debug, Default)]
pub struct SessionMachine {
    state: SessionState,
}

impl SessionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn observe(&mut self, identity: Option<&str>) -> SessionAction {
        match (identity, &self.state) {
            (None, SessionState::Idle) => SessionAction::Ignore,
            (None, _) => {
                self.state = SessionState::Idle;
                SessionAction::SignedOut
            }
            (Some(_), SessionState::Processing(_)) => SessionAction::Ignore,
            (Some(user), SessionState::Active(current)) if current == user => SessionAction::Ignore,
            (Some(user), _) => {
                self.state = SessionState::Processing(user.to_string());
                SessionAction::CheckRole(user.to_string())
            }
        }
    }

    /// Result of the role check started by `observe`. Ignored unless a check
    /// is pending.
    pub fn complete(&mut self, granted: bool) -> &SessionState {
        if let SessionState::Processing(user) = &self.state {
            self.state = if granted {
                SessionState::Active(user.clone())
            } else {
                SessionState::Idle
            };
        }
        &self.state
    }

    pub fn sign_out(&mut self) {
        self.state = SessionState::Idle;
    }
}

/// One [`SessionMachine`] per user, shared by the sign-in routes. A second
/// sign-in for a user whose role check is still running is told to back off;
/// an already active user skips the check.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionMachine>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a fresh identity callback for `user_id` into its machine.
    pub async fn observe(&self, user_id: &str) -> (SessionAction, SessionState) {
        let mut sessions = self.sessions.lock().await;
        let machine = sessions.entry(user_id.to_string()).or_default();
        let action = machine.observe(Some(user_id));
        (action, machine.state().clone())
    }

    pub async fn complete(&self, user_id: &str, granted: bool) -> SessionState {
        let mut sessions = self.sessions.lock().await;
        let Some(machine) = sessions.get_mut(user_id) else {
            return SessionState::Idle;
        };
        let state = machine.complete(granted).clone();
        if state == SessionState::Idle {
            sessions.remove(user_id);
        }
        state
    }

    /// Identity gone (sign-out, or the account was disabled).
    pub async fn sign_out(&self, user_id: &str) -> SessionAction {
        match self.sessions.lock().await.remove(user_id) {
            Some(mut machine) => machine.observe(None),
            None => SessionAction::Ignore,
        }
    }

    pub async fn state(&self, user_id: &str) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(user_id)
            .map(|m| m.state().clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_callbacks_start_one_check() {
        let mut session = SessionMachine::new();
        assert_eq!(session.observe(Some("u1")), SessionAction::CheckRole("u1".into()));
        assert_eq!(session.observe(Some("u1")), SessionAction::Ignore);
        assert_eq!(session.observe(Some("u2")), SessionAction::Ignore);

        assert_eq!(session.complete(true), &SessionState::Active("u1".into()));
        assert_eq!(session.observe(Some("u1")), SessionAction::Ignore);
    }

    #[test]
    fn denied_role_returns_to_idle() {
        let mut session = SessionMachine::new();
        session.observe(Some("parent"));
        assert_eq!(session.complete(false), &SessionState::Idle);
        assert_eq!(session.observe(Some("parent")), SessionAction::CheckRole("parent".into()));
    }

    #[test]
    fn identity_change_and_sign_out() {
        let mut session = SessionMachine::new();
        session.observe(Some("u1"));
        session.complete(true);

        assert_eq!(session.observe(Some("u2")), SessionAction::CheckRole("u2".into()));
        assert_eq!(session.observe(None), SessionAction::SignedOut);
        assert_eq!(session.state(), &SessionState::Idle);
        assert_eq!(session.observe(None), SessionAction::Ignore);

        session.observe(Some("u3"));
        session.sign_out();
        assert_eq!(session.complete(true), &SessionState::Idle);
    }

    #[tokio::test]
    async fn registry_keeps_one_machine_per_user() {
        let sessions = SessionRegistry::new();
        let (action, state) = sessions.observe("u1").await;
        assert_eq!(action, SessionAction::CheckRole("u1".into()));
        assert_eq!(state, SessionState::Processing("u1".into()));

        let (action, _) = sessions.observe("u2").await;
        assert_eq!(action, SessionAction::CheckRole("u2".into()));
        assert_eq!(sessions.observe("u1").await.0, SessionAction::Ignore);

        assert_eq!(sessions.complete("u1", true).await, SessionState::Active("u1".into()));
        assert_eq!(sessions.complete("u2", false).await, SessionState::Idle);
        assert_eq!(sessions.state("u2").await, SessionState::Idle);

        assert_eq!(sessions.sign_out("u1").await, SessionAction::SignedOut);
        assert_eq!(sessions.sign_out("u1").await, SessionAction::Ignore);
        assert_eq!(sessions.state("u1").await, SessionState::Idle);
    }
}
