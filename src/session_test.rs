use super::*;
use std::sync::Arc;

use crate::backend::{BackendService, MemoryBackend};
use crate::token_store::{MemoryTokenStore, TokenStore};
use crate::types::{AccountKind, Role};

struct Harness {
    store: SessionStore,
    backend: Arc<MemoryBackend>,
    tokens: Arc<MemoryTokenStore>,
}

impl Harness {
    fn new() -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let store = SessionStore::new(BackendGateway::new(backend.clone(), tokens.clone()));
        Self { store, backend, tokens }
    }

    /// Store over the same backend and token file, as after a process restart.
    fn restarted(&self) -> SessionStore {
        self.backend.forget_session();
        SessionStore::new(BackendGateway::new(self.backend.clone(), self.tokens.clone()))
    }

    async fn signup(&self) -> AuthOutcome {
        let request = SignupRequest::new("a@x.com", "password123", "Asha", AccountKind::Student);
        self.store.signup(&request).await
    }
}

// =============================================================================
// start
// =============================================================================

#[tokio::test]
async fn new_store_is_loading() {
    let h = Harness::new();
    assert!(h.store.is_loading());
    assert_eq!(h.store.state(), SessionState::Unknown);
    assert!(h.store.current_user().is_none());
}

#[tokio::test]
async fn fresh_load_without_token_becomes_anonymous() {
    let h = Harness::new();
    assert_eq!(h.store.start().await, SessionState::Anonymous);
    assert!(!h.store.is_loading());
    assert_eq!(h.backend.call_count("authenticate"), 0);
}

#[tokio::test]
async fn start_resolves_stored_token() {
    let h = Harness::new();
    h.signup().await;
    let store = h.restarted();
    let state = store.start().await;
    assert_eq!(state.identity().map(|i| i.email.as_str()), Some("a@x.com"));
}

#[tokio::test]
async fn start_runs_one_lookup() {
    let h = Harness::new();
    h.signup().await;
    let store = h.restarted();
    store.start().await;
    store.start().await;
    assert_eq!(h.backend.call_count("current_principal"), 1);
}

#[tokio::test]
async fn start_offline_becomes_anonymous() {
    let h = Harness::new();
    h.signup().await;
    let store = h.restarted();
    h.backend.set_offline(true);
    assert_eq!(store.start().await, SessionState::Anonymous);
}

// =============================================================================
// login / signup / logout
// =============================================================================

#[tokio::test]
async fn signup_authenticates_student() {
    let h = Harness::new();
    assert_eq!(h.signup().await, AuthOutcome::ok());
    let user = h.store.current_user().unwrap();
    assert_eq!(user.role, Role::Student);
    assert_eq!(user.user_type, AccountKind::Student);
}

#[tokio::test]
async fn signup_failure_is_reported_not_raised() {
    let h = Harness::new();
    let request = SignupRequest::new("a@x.com", "short", "Asha", AccountKind::Student);
    let outcome = h.store.signup(&request).await;
    assert!(!outcome.success);
    assert!(outcome.error.is_some_and(|e| !e.is_empty()));
    assert_eq!(h.store.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn login_wrong_password_stays_anonymous() {
    let h = Harness::new();
    h.signup().await;
    h.store.logout().await;

    let outcome = h.store.login("a@x.com", "wrong-password").await;
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Invalid login credentials"));
    assert_eq!(h.store.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn login_then_logout_ends_anonymous_without_token() {
    let h = Harness::new();
    h.signup().await;
    h.store.logout().await;

    assert!(h.store.login("a@x.com", "password123").await.success);
    assert!(h.store.current_user().is_some());
    assert!(h.store.logout().await.success);
    assert_eq!(h.store.state(), SessionState::Anonymous);
    assert!(h.tokens.load().unwrap().is_none());
}

#[tokio::test]
async fn failed_login_while_signed_in_keeps_session() {
    let h = Harness::new();
    h.signup().await;
    let before = h.store.current_user();

    let outcome = h.store.login("a@x.com", "wrong-password").await;
    assert!(!outcome.success);
    assert_eq!(h.store.current_user(), before);
    assert!(h.tokens.load().unwrap().is_some());
}

#[tokio::test]
async fn failed_signup_while_signed_in_keeps_session() {
    let h = Harness::new();
    h.signup().await;
    assert!(!h.signup().await.success);
    assert!(matches!(h.store.state(), SessionState::Authenticated(_)));
}

#[tokio::test]
async fn logout_with_failed_session_lookup_ends_anonymous() {
    let h = Harness::new();
    h.signup().await;
    h.backend.fail_session_lookup(true);
    assert!(!h.store.logout().await.success);
    h.backend.fail_session_lookup(false);

    assert_eq!(h.store.refresh_user().await, SessionState::Anonymous);
    assert!(h.tokens.load().unwrap().is_none());
}

#[tokio::test]
async fn logout_with_remote_failure_still_anonymous() {
    let h = Harness::new();
    h.signup().await;
    h.backend.fail_logout(true);
    let outcome = h.store.logout().await;
    assert!(!outcome.success);
    assert_eq!(h.store.state(), SessionState::Anonymous);
    assert!(h.tokens.load().unwrap().is_none());
}

// =============================================================================
// notification
// =============================================================================

#[tokio::test]
async fn subscribers_see_state_before_operation_returns() {
    let h = Harness::new();
    let mut rx = h.store.subscribe();
    assert_eq!(*rx.borrow(), SessionState::Unknown);

    h.signup().await;
    assert!(rx.has_changed().unwrap());
    assert!(matches!(*rx.borrow_and_update(), SessionState::Authenticated(_)));

    h.store.logout().await;
    assert_eq!(*rx.borrow_and_update(), SessionState::Anonymous);
}

#[test]
fn auth_outcome_serializes_without_absent_error() {
    assert_eq!(serde_json::to_value(AuthOutcome::ok()).unwrap(), serde_json::json!({ "success": true }));
    assert_eq!(
        serde_json::to_value(AuthOutcome::failed("nope")).unwrap(),
        serde_json::json!({ "success": false, "error": "nope" })
    );
}

// =============================================================================
// refresh / profile
// =============================================================================

#[tokio::test]
async fn refresh_user_with_revoked_token_becomes_anonymous() {
    let h = Harness::new();
    h.signup().await;
    h.backend.revoke_tokens();
    assert_eq!(h.store.refresh_user().await, SessionState::Anonymous);
    assert!(h.tokens.load().unwrap().is_none());
}

#[tokio::test]
async fn refresh_session_without_session_becomes_anonymous() {
    let h = Harness::new();
    h.signup().await;
    h.backend.forget_session();
    let outcome = h.store.refresh_session().await;
    assert!(!outcome.success);
    assert_eq!(h.store.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn refresh_session_keeps_identity() {
    let h = Harness::new();
    h.signup().await;
    let before = h.store.current_user();
    assert!(h.store.refresh_session().await.success);
    assert_eq!(h.store.current_user(), before);
}

#[tokio::test]
async fn update_profile_replaces_identity_in_place() {
    let h = Harness::new();
    h.signup().await;
    let before = h.store.current_user().unwrap();
    let update = ProfileUpdate { bio: Some("X".into()), ..ProfileUpdate::default() };
    assert!(h.store.update_profile(&update).await.success);
    let after = h.store.current_user().unwrap();
    assert_eq!(after, Identity { bio: Some("X".into()), ..before });
}

#[tokio::test]
async fn update_profile_validation_failure_keeps_state() {
    let h = Harness::new();
    h.signup().await;
    let outcome = h.store.update_profile(&ProfileUpdate::default()).await;
    assert!(!outcome.success);
    assert!(h.store.current_user().is_some());
}

#[tokio::test]
async fn update_profile_rejected_token_becomes_anonymous() {
    let h = Harness::new();
    h.signup().await;
    h.backend.revoke_tokens();
    let update = ProfileUpdate { bio: Some("X".into()), ..ProfileUpdate::default() };
    assert!(!h.store.update_profile(&update).await.success);
    assert_eq!(h.store.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn backend_trait_object_is_shareable() {
    let backend: Arc<dyn BackendService> = Arc::new(MemoryBackend::new());
    let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
    let store = Arc::new(SessionStore::new(BackendGateway::new(backend, tokens)));
    let handle = tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.start().await }
    });
    assert_eq!(handle.await.unwrap(), SessionState::Anonymous);
}
