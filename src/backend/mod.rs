//! Backend service: seam to the hosted identity-and-data service.
//!
//! DESIGN
//! ======
//! `BackendService` is the only way the gateway reaches the outside world.
//! `SupabaseClient` talks HTTP to a hosted project; `MemoryBackend` keeps
//! everything in-process for tests and offline development. Data methods
//! move raw JSON rows; decoding into typed records happens in the gateway.

pub mod memory;
pub mod supabase;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::GatewayError;

pub use memory::MemoryBackend;
pub use supabase::SupabaseClient;

// =============================================================================
// TABLES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Courses,
    Hackathons,
    CourseEnrollments,
    Achievements,
    ContactMessages,
}

impl Table {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Courses => "courses",
            Self::Hackathons => "hackathons",
            Self::CourseEnrollments => "course_enrollments",
            Self::Achievements => "achievements",
            Self::ContactMessages => "contact_messages",
        }
    }
}

// =============================================================================
// QUERY
// =============================================================================

/// Equality filters plus an optional row limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, serde_json::Value)>,
    pub limit: Option<u32>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, column: &str, value: impl Into<serde_json::Value>) -> Self {
        self.filters.push((column.to_owned(), value.into()));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a row satisfies every filter.
    #[must_use]
    pub fn matches(&self, row: &serde_json::Value) -> bool {
        self.filters
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Session issued by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSession {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    /// Unix seconds. Derived from `expires_in` when the service omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl ServiceSession {
    /// Fill in `expires_at` relative to `now` if missing.
    #[must_use]
    pub fn anchored(mut self, now: OffsetDateTime) -> Self {
        if self.expires_at.is_none() {
            let expires_in = i64::try_from(self.expires_in).unwrap_or(i64::MAX);
            self.expires_at = Some(now.unix_timestamp().saturating_add(expires_in));
        }
        self
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now.unix_timestamp())
    }
}

/// Account record held by the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub email_confirmed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_sign_in_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

/// Result of account creation or password authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAuth {
    pub principal: Principal,
    /// `None` when the service requires email confirmation first.
    pub session: Option<ServiceSession>,
}

// =============================================================================
// SERVICE TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait BackendService: Send + Sync {
    /// Create an account with the given metadata attached.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<ServiceAuth, GatewayError>;

    async fn authenticate(&self, email: &str, password: &str) -> Result<ServiceAuth, GatewayError>;

    /// Invalidate the session identified by `access_token` and forget any held session.
    async fn invalidate_session(&self, access_token: &str) -> Result<(), GatewayError>;

    /// The session the service itself currently holds, refreshed if expired.
    async fn current_session(&self) -> Result<Option<ServiceSession>, GatewayError>;

    /// Forget the held session locally without contacting the service.
    async fn clear_session(&self);

    /// Resolve the principal behind a bearer token.
    async fn current_principal(&self, access_token: &str) -> Result<Principal, GatewayError>;

    async fn request_password_reset(&self, email: &str) -> Result<(), GatewayError>;

    /// Set a new password for the principal behind `access_token`.
    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), GatewayError>;

    async fn select(
        &self,
        table: Table,
        query: &Query,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError>;

    /// Insert one row and return the stored representation.
    async fn insert(
        &self,
        table: Table,
        row: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError>;

    /// Merge `patch` into matching rows and return them.
    async fn update(
        &self,
        table: Table,
        query: &Query,
        patch: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
