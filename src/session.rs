//! Session store: process-wide view of who is signed in.
//!
//! SYSTEM CONTEXT
//! ==============
//! Consumers read the current state or `subscribe()` to a watch channel.
//! Every transition is published with `send_replace` before the operation
//! that caused it returns, so a caller awaiting `login` never observes a
//! stale state afterward.
//!
//! State machine: `Unknown` until `start()` resolves, then `Authenticated`
//! or `Anonymous`. Concurrent operations are not serialized; the last write
//! to the state wins.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use crate::envelope::Envelope;
use crate::gateway::BackendGateway;
use crate::types::{Identity, ProfileUpdate, SignupRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unknown,
    Authenticated(Identity),
    Anonymous,
}

impl SessionState {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Unknown | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Authenticated(_) => "authenticated",
            Self::Anonymous => "anonymous",
        }
    }
}

/// Result handed to forms: never an error value, just a flag and a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthOutcome {
    #[must_use]
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()) }
    }
}

pub struct SessionStore {
    gateway: BackendGateway,
    state: watch::Sender<SessionState>,
    started: AtomicBool,
}

impl SessionStore {
    #[must_use]
    pub fn new(gateway: BackendGateway) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self { gateway, state, started: AtomicBool::new(false) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    /// True until the first resolution attempt completes.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Unknown)
    }

    /// Resolve the initial state with exactly one current-user lookup.
    /// Later calls return the current state without touching the gateway.
    pub async fn start(&self) -> SessionState {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.state();
        }
        self.resolve_current_user().await
    }

    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        match self.gateway.login(email, password).await {
            Envelope::Data { data } => {
                self.transition(SessionState::Authenticated(data.user));
                AuthOutcome::ok()
            }
            Envelope::Error { error, .. } => {
                self.settle_failed_sign_in();
                AuthOutcome::failed(error)
            }
        }
    }

    pub async fn signup(&self, request: &SignupRequest) -> AuthOutcome {
        match self.gateway.signup(request).await {
            Envelope::Data { data } => {
                self.transition(SessionState::Authenticated(data.user));
                AuthOutcome::ok()
            }
            Envelope::Error { error, .. } => {
                self.settle_failed_sign_in();
                AuthOutcome::failed(error)
            }
        }
    }

    /// Sign out. The state becomes `Anonymous` even if the remote call failed;
    /// the outcome still reports that failure.
    pub async fn logout(&self) -> AuthOutcome {
        let envelope = self.gateway.logout().await;
        self.transition(SessionState::Anonymous);
        match envelope {
            Envelope::Data { .. } => AuthOutcome::ok(),
            Envelope::Error { error, .. } => AuthOutcome::failed(error),
        }
    }

    /// Re-fetch the identity; any failure moves to `Anonymous`.
    pub async fn refresh_user(&self) -> SessionState {
        self.resolve_current_user().await
    }

    /// Refresh the session token. Failure moves to `Anonymous`; success on a
    /// store without an identity resolves one.
    pub async fn refresh_session(&self) -> AuthOutcome {
        match self.gateway.refresh_token().await {
            Envelope::Data { .. } => {
                if self.current_user().is_none() {
                    if matches!(self.resolve_current_user().await, SessionState::Anonymous) {
                        return AuthOutcome::failed("Session refreshed but user could not be loaded");
                    }
                }
                AuthOutcome::ok()
            }
            Envelope::Error { error, .. } => {
                self.transition(SessionState::Anonymous);
                AuthOutcome::failed(error)
            }
        }
    }

    /// Apply a profile update and replace the held identity on success.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> AuthOutcome {
        match self.gateway.update_profile(update).await {
            Envelope::Data { data } => {
                self.transition(SessionState::Authenticated(data));
                AuthOutcome::ok()
            }
            Envelope::Error { error, code } => {
                if code == "E_UNAUTHORIZED" {
                    self.transition(SessionState::Anonymous);
                }
                AuthOutcome::failed(error)
            }
        }
    }

    async fn resolve_current_user(&self) -> SessionState {
        let next = match self.gateway.get_current_user().await {
            Envelope::Data { data } => SessionState::Authenticated(data),
            Envelope::Error { .. } => SessionState::Anonymous,
        };
        self.transition(next.clone());
        next
    }

    /// A rejected sign-in leaves an existing session alone; otherwise the
    /// store settles on `Anonymous`.
    fn settle_failed_sign_in(&self) {
        if self.current_user().is_none() {
            self.transition(SessionState::Anonymous);
        }
    }

    fn transition(&self, next: SessionState) {
        let to = next.label();
        let user_id = next.identity().map(|i| i.id.clone());
        let previous = self.state.send_replace(next);
        info!(from = previous.label(), to, user_id = ?user_id, "session state changed");
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
