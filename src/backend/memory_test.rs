use super::*;
use serde_json::json;

// =============================================================================
// generate_token
// =============================================================================

#[test]
fn generate_token_is_64_hex_chars() {
    let token = generate_token();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generate_token_two_calls_differ() {
    assert_ne!(generate_token(), generate_token());
}

// =============================================================================
// accounts
// =============================================================================

#[tokio::test]
async fn create_account_issues_session_and_metadata() {
    let backend = MemoryBackend::new();
    let auth = backend
        .create_account("a@x.com", "password123", json!({ "name": "A", "role": "student" }))
        .await
        .unwrap();
    assert_eq!(auth.principal.user_metadata["name"], "A");
    let session = auth.session.unwrap();
    assert_eq!(backend.current_session().await.unwrap(), Some(session.clone()));
    let principal = backend.current_principal(&session.access_token).await.unwrap();
    assert_eq!(principal.id, auth.principal.id);
}

#[tokio::test]
async fn duplicate_account_is_auth_error() {
    let backend = MemoryBackend::new();
    backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    let err = backend.create_account("a@x.com", "password123", json!({})).await.unwrap_err();
    assert_eq!(err, GatewayError::auth("User already registered"));
}

#[tokio::test]
async fn weak_password_is_auth_error() {
    let backend = MemoryBackend::new();
    let err = backend.create_account("a@x.com", "123", json!({})).await.unwrap_err();
    assert!(matches!(err, GatewayError::Auth(_)));
    assert!(!backend.has_account("a@x.com"));
}

#[tokio::test]
async fn confirmation_required_withholds_session() {
    let backend = MemoryBackend::new();
    backend.require_email_confirmation(true);
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    assert!(auth.session.is_none());
    assert!(backend.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn authenticate_checks_password() {
    let backend = MemoryBackend::new();
    backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    let err = backend.authenticate("a@x.com", "wrong").await.unwrap_err();
    assert_eq!(err, GatewayError::auth("Invalid login credentials"));
    let auth = backend.authenticate("a@x.com", "password123").await.unwrap();
    assert!(auth.session.is_some());
    assert!(auth.principal.last_sign_in_at.is_some());
}

#[tokio::test]
async fn invalidate_session_revokes_token() {
    let backend = MemoryBackend::new();
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    let token = auth.session.unwrap().access_token;
    backend.invalidate_session(&token).await.unwrap();
    assert!(backend.current_session().await.unwrap().is_none());
    assert!(matches!(backend.current_principal(&token).await, Err(GatewayError::Unauthorized(_))));
}

#[tokio::test]
async fn failing_logout_still_drops_held_session() {
    let backend = MemoryBackend::new();
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    backend.fail_logout(true);
    let err = backend.invalidate_session(&auth.session.unwrap().access_token).await.unwrap_err();
    assert!(matches!(err, GatewayError::Service { status: 500, .. }));
    assert!(backend.current_session().await.unwrap().is_none());
}

#[tokio::test]
async fn forget_session_keeps_tokens_valid() {
    let backend = MemoryBackend::new();
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    backend.forget_session();
    assert!(backend.current_session().await.unwrap().is_none());
    assert!(backend.current_principal(&auth.session.unwrap().access_token).await.is_ok());
}

// =============================================================================
// tables
// =============================================================================

#[tokio::test]
async fn select_filters_and_limits() {
    let backend = MemoryBackend::new();
    backend.seed(
        Table::Courses,
        vec![
            json!({ "id": 1, "category": "web", "is_published": true }),
            json!({ "id": 2, "category": "web", "is_published": false }),
            json!({ "id": 3, "category": "web", "is_published": true }),
            json!({ "id": 4, "category": "data", "is_published": true }),
        ],
    );
    let query = Query::new().eq("is_published", true).eq("category", "web");
    let rows = backend.select(Table::Courses, &query, None).await.unwrap();
    assert_eq!(rows.len(), 2);
    let rows = backend.select(Table::Courses, &query.limit(1), None).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn select_empty_table_is_empty() {
    let backend = MemoryBackend::new();
    assert!(backend.select(Table::Hackathons, &Query::new(), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn insert_assigns_id() {
    let backend = MemoryBackend::new();
    let rows = backend
        .insert(Table::ContactMessages, json!({ "name": "A" }), None)
        .await
        .unwrap();
    assert!(rows[0]["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(backend.rows(Table::ContactMessages).len(), 1);
}

#[tokio::test]
async fn rejected_insert_is_service_error() {
    let backend = MemoryBackend::new();
    backend.reject_inserts(Table::Profiles);
    let err = backend.insert(Table::Profiles, json!({ "id": "u" }), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Service { status: 403, .. }));
    assert!(backend.rows(Table::Profiles).is_empty());
}

#[tokio::test]
async fn update_merges_patch_into_matching_rows() {
    let backend = MemoryBackend::new();
    backend.seed(Table::Profiles, vec![json!({ "id": "u1", "bio": null, "name": "A" }), json!({ "id": "u2" })]);
    let rows = backend
        .update(Table::Profiles, &Query::new().eq("id", "u1"), json!({ "bio": "X" }), None)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["bio"], "X");
    assert_eq!(rows[0]["name"], "A");
}

#[tokio::test]
async fn unknown_bearer_is_unauthorized() {
    let backend = MemoryBackend::new();
    let err = backend.select(Table::Courses, &Query::new(), Some("stale")).await.unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn offline_fails_with_transport_and_counts_calls() {
    let backend = MemoryBackend::new();
    backend.set_offline(true);
    let err = backend.authenticate("a@x.com", "pw").await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
    assert_eq!(backend.call_count("authenticate"), 1);
    assert_eq!(backend.call_count("create_account"), 0);
}

#[tokio::test]
async fn profile_insert_fills_service_defaults() {
    let backend = MemoryBackend::new();
    let rows = backend
        .insert(Table::Profiles, json!({ "id": "u1", "email": "a@x.com", "name": "A" }), None)
        .await
        .unwrap();
    assert!(rows[0]["created_at"].is_string());
    assert!(rows[0]["updated_at"].is_string());
    assert_eq!(rows[0]["is_active"], true);
    assert_eq!(rows[0]["email_confirmed"], false);
}

#[tokio::test]
async fn silent_insert_stores_but_returns_nothing() {
    let backend = MemoryBackend::new();
    backend.silent_inserts(Table::Profiles);
    let rows = backend.insert(Table::Profiles, json!({ "id": "u1" }), None).await.unwrap();
    assert!(rows.is_empty());
    assert_eq!(backend.rows(Table::Profiles).len(), 1);
}

// =============================================================================
// sessions and passwords
// =============================================================================

#[tokio::test]
async fn failing_session_lookup_is_transport_error() {
    let backend = MemoryBackend::new();
    backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    backend.fail_session_lookup(true);
    assert!(matches!(backend.current_session().await, Err(GatewayError::Transport(_))));
    backend.fail_session_lookup(false);
    assert!(backend.current_session().await.unwrap().is_some());
}

#[tokio::test]
async fn clear_session_drops_held_session_only() {
    let backend = MemoryBackend::new();
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    backend.clear_session().await;
    assert!(backend.current_session().await.unwrap().is_none());
    assert!(backend.current_principal(&auth.session.unwrap().access_token).await.is_ok());
    assert_eq!(backend.call_count("clear_session"), 1);
}

#[tokio::test]
async fn rotate_session_issues_new_token() {
    let backend = MemoryBackend::new();
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    let rotated = backend.rotate_session().unwrap();
    assert_ne!(rotated, auth.session.unwrap().access_token);
    assert_eq!(backend.current_session().await.unwrap().unwrap().access_token, rotated);
}

#[tokio::test]
async fn update_password_replaces_credentials() {
    let backend = MemoryBackend::new();
    let auth = backend.create_account("a@x.com", "password123", json!({})).await.unwrap();
    let token = auth.session.unwrap().access_token;
    backend.update_password(&token, "brand-new-pass").await.unwrap();
    assert!(backend.authenticate("a@x.com", "password123").await.is_err());
    assert!(backend.authenticate("a@x.com", "brand-new-pass").await.is_ok());
}

#[tokio::test]
async fn update_password_rejects_unknown_token() {
    let backend = MemoryBackend::new();
    let err = backend.update_password("stale", "brand-new-pass").await.unwrap_err();
    assert!(err.is_unauthorized());
}
