//! HTTP client for a hosted Supabase project.
//!
//! Thin wrapper over the auth (`/auth/v1`) and REST (`/rest/v1`) endpoints.
//! The client keeps the session it was last issued, which is what
//! `current_session` hands back. Response parsing and error mapping are pure
//! functions for testability.

use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{BackendService, Principal, Query, ServiceAuth, ServiceSession, Table};
use crate::config::BackendConfig;
use crate::error::GatewayError;

const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

// =============================================================================
// CLIENT
// =============================================================================

pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: RwLock<Option<ServiceSession>>,
}

impl SupabaseClient {
    /// # Errors
    ///
    /// Returns `HttpClientBuild` if the reqwest client cannot be constructed.
    pub fn new(config: &BackendConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| GatewayError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
            session: RwLock::new(None),
        })
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.base_url)
    }

    fn rest_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    /// Every request carries the project key; the bearer defaults to it too.
    fn request(&self, method: Method, url: &str, bearer: Option<&str>) -> RequestBuilder {
        let bearer = bearer.unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {bearer}"))
    }

    async fn send(builder: RequestBuilder) -> Result<(u16, String), GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok((status, text))
    }

    async fn send_auth(builder: RequestBuilder) -> Result<String, GatewayError> {
        let (status, text) = Self::send(builder).await?;
        if is_success(status) { Ok(text) } else { Err(auth_error(status, &text)) }
    }

    async fn send_rest(builder: RequestBuilder, table: Table) -> Result<Vec<serde_json::Value>, GatewayError> {
        let (status, text) = Self::send(builder).await?;
        tracing::debug!(table = table.as_str(), status, "rest response");
        if !is_success(status) {
            return Err(rest_error(status, &text));
        }
        parse_rows(&text)
    }

    async fn store_session(&self, session: Option<ServiceSession>) {
        *self.session.write().await = session;
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Option<ServiceSession>, GatewayError> {
        let builder = self
            .request(Method::POST, &self.auth_url("token"), None)
            .query(&[("grant_type", "refresh_token")])
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        match Self::send_auth(builder).await {
            Ok(text) => {
                let auth = parse_auth_response(&text, OffsetDateTime::now_utc())?;
                self.store_session(auth.session.clone()).await;
                Ok(auth.session)
            }
            Err(GatewayError::Auth(message) | GatewayError::Unauthorized(message)) => {
                tracing::info!(%message, "session refresh rejected");
                self.store_session(None).await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl BackendService for SupabaseClient {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<ServiceAuth, GatewayError> {
        let builder = self
            .request(Method::POST, &self.auth_url("signup"), None)
            .json(&serde_json::json!({ "email": email, "password": password, "data": metadata }));
        let text = Self::send_auth(builder).await?;
        let auth = parse_auth_response(&text, OffsetDateTime::now_utc())?;
        if auth.session.is_some() {
            self.store_session(auth.session.clone()).await;
        }
        Ok(auth)
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<ServiceAuth, GatewayError> {
        let builder = self
            .request(Method::POST, &self.auth_url("token"), None)
            .query(&[("grant_type", "password")])
            .json(&serde_json::json!({ "email": email, "password": password }));
        let text = Self::send_auth(builder).await?;
        let auth = parse_auth_response(&text, OffsetDateTime::now_utc())?;
        self.store_session(auth.session.clone()).await;
        Ok(auth)
    }

    async fn invalidate_session(&self, access_token: &str) -> Result<(), GatewayError> {
        self.store_session(None).await;
        let builder = self.request(Method::POST, &self.auth_url("logout"), Some(access_token));
        match Self::send_auth(builder).await {
            Ok(_) | Err(GatewayError::Unauthorized(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn current_session(&self) -> Result<Option<ServiceSession>, GatewayError> {
        let held = self.session.read().await.clone();
        let Some(session) = held else {
            return Ok(None);
        };
        if !session.is_expired(OffsetDateTime::now_utc()) {
            return Ok(Some(session));
        }
        match session.refresh_token.as_deref() {
            Some(refresh_token) => self.refresh(refresh_token).await,
            None => {
                self.store_session(None).await;
                Ok(None)
            }
        }
    }

    async fn clear_session(&self) {
        self.store_session(None).await;
    }

    async fn current_principal(&self, access_token: &str) -> Result<Principal, GatewayError> {
        let builder = self.request(Method::GET, &self.auth_url("user"), Some(access_token));
        let text = Self::send_auth(builder).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), GatewayError> {
        let builder = self
            .request(Method::POST, &self.auth_url("recover"), None)
            .json(&serde_json::json!({ "email": email }));
        Self::send_auth(builder).await.map(|_| ())
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), GatewayError> {
        let builder = self
            .request(Method::PUT, &self.auth_url("user"), Some(access_token))
            .json(&serde_json::json!({ "password": new_password }));
        Self::send_auth(builder).await.map(|_| ())
    }

    async fn select(
        &self,
        table: Table,
        query: &Query,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let builder = self
            .request(Method::GET, &self.rest_url(table), bearer)
            .query(&query_params(query, true));
        Self::send_rest(builder, table).await
    }

    async fn insert(
        &self,
        table: Table,
        row: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let builder = self
            .request(Method::POST, &self.rest_url(table), bearer)
            .header("Prefer", "return=representation")
            .json(&row);
        Self::send_rest(builder, table).await
    }

    async fn update(
        &self,
        table: Table,
        query: &Query,
        patch: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let builder = self
            .request(Method::PATCH, &self.rest_url(table), bearer)
            .header("Prefer", "return=representation")
            .query(&query_params(query, false))
            .json(&patch);
        Self::send_rest(builder, table).await
    }
}

// =============================================================================
// PARSING
// =============================================================================

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Pull the most specific message out of an error body.
pub(crate) fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        let trimmed = body.trim();
        return if trimmed.is_empty() { FALLBACK_ERROR_MESSAGE.to_owned() } else { trimmed.to_owned() };
    };
    ["error_description", "msg", "message", "error", "detail"]
        .iter()
        .find_map(|key| value.get(key).and_then(serde_json::Value::as_str))
        .filter(|msg| !msg.trim().is_empty())
        .map_or_else(|| FALLBACK_ERROR_MESSAGE.to_owned(), str::to_owned)
}

/// Auth endpoint failures: 401/403 reject the token, other 4xx reject the request.
pub(crate) fn auth_error(status: u16, body: &str) -> GatewayError {
    let message = extract_error_message(body);
    match status {
        401 | 403 => GatewayError::Unauthorized(message),
        429 => GatewayError::Service { status, message },
        400..=499 => GatewayError::Auth(message),
        _ => GatewayError::Service { status, message },
    }
}

pub(crate) fn rest_error(status: u16, body: &str) -> GatewayError {
    let message = extract_error_message(body);
    match status {
        401 => GatewayError::Unauthorized(message),
        _ => GatewayError::Service { status, message },
    }
}

/// Decode a signup/token response.
///
/// Handles both shapes the service returns: a flat session with a nested
/// `user`, or a bare user object when email confirmation is pending.
pub(crate) fn parse_auth_response(body: &str, now: OffsetDateTime) -> Result<ServiceAuth, GatewayError> {
    let value: serde_json::Value = serde_json::from_str(body)?;

    let session = if value.get("access_token").is_some_and(|t| !t.is_null()) {
        Some(serde_json::from_value::<ServiceSession>(value.clone())?)
    } else {
        match value.get("session") {
            Some(s) if !s.is_null() => Some(serde_json::from_value::<ServiceSession>(s.clone())?),
            _ => None,
        }
    };

    let principal = match value.get("user") {
        Some(user) if !user.is_null() => serde_json::from_value::<Principal>(user.clone())?,
        _ => serde_json::from_value::<Principal>(value)?,
    };

    Ok(ServiceAuth { principal, session: session.map(|s| s.anchored(now)) })
}

fn parse_rows(body: &str) -> Result<Vec<serde_json::Value>, GatewayError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<serde_json::Value>(body)? {
        serde_json::Value::Array(rows) => Ok(rows),
        serde_json::Value::Null => Ok(Vec::new()),
        obj @ serde_json::Value::Object(_) => Ok(vec![obj]),
        other => Err(GatewayError::Decode(format!("expected rows, got {other}"))),
    }
}

fn render_filter_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_owned(),
        other => other.to_string(),
    }
}

/// REST query string: `select=*`, one `col=eq.value` per filter, then `limit`.
pub(crate) fn query_params(query: &Query, with_select: bool) -> Vec<(String, String)> {
    let mut params = Vec::with_capacity(query.filters.len() + 2);
    if with_select {
        params.push(("select".to_owned(), "*".to_owned()));
    }
    for (column, value) in &query.filters {
        let op = if value.is_null() { "is" } else { "eq" };
        params.push((column.clone(), format!("{op}.{}", render_filter_value(value))));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_owned(), limit.to_string()));
    }
    params
}

#[cfg(test)]
#[path = "supabase_test.rs"]
mod tests;
