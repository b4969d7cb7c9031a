//! In-process backend with fault injection.
//!
//! Behaves like the hosted service closely enough for gateway and session
//! tests: accounts with passwords, bearer tokens, a held session, and plain
//! JSON tables. Faults (offline, failing logout, rejected inserts) let tests
//! drive the error paths without a network.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::Rng;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::{BackendService, Principal, Query, ServiceAuth, ServiceSession, Table};
use crate::error::GatewayError;

const SESSION_TTL_SECS: u64 = 3600;
const MIN_SERVICE_PASSWORD_LEN: usize = 6;

/// Generate a random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

struct Account {
    principal: Principal,
    password: String,
}

#[derive(Default)]
struct Faults {
    offline: bool,
    fail_logout: bool,
    fail_session_lookup: bool,
    require_confirmation: bool,
    reject_inserts: HashSet<Table>,
    silent_inserts: HashSet<Table>,
}

#[derive(Default)]
struct Inner {
    /// email -> account
    accounts: HashMap<String, Account>,
    /// access token -> user id
    tokens: HashMap<String, String>,
    session: Option<ServiceSession>,
    tables: HashMap<Table, Vec<serde_json::Value>>,
    faults: Faults,
    calls: HashMap<&'static str, usize>,
}

impl Inner {
    fn record(&mut self, op: &'static str) -> Result<(), GatewayError> {
        *self.calls.entry(op).or_default() += 1;
        if self.faults.offline {
            return Err(GatewayError::Transport("memory backend offline".into()));
        }
        Ok(())
    }

    fn issue_session(&mut self, user_id: &str) -> ServiceSession {
        let access_token = generate_token();
        self.tokens.insert(access_token.clone(), user_id.to_owned());
        let session = ServiceSession {
            access_token,
            token_type: "bearer".into(),
            expires_in: SESSION_TTL_SECS,
            expires_at: None,
            refresh_token: Some(generate_token()),
        }
        .anchored(OffsetDateTime::now_utc());
        self.session = Some(session.clone());
        session
    }

    fn user_for(&self, access_token: &str) -> Result<String, GatewayError> {
        self.tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| GatewayError::Unauthorized("Invalid JWT".into()))
    }

    fn check_bearer(&self, bearer: Option<&str>) -> Result<(), GatewayError> {
        match bearer {
            Some(token) if !self.tokens.contains_key(token) => Err(GatewayError::Unauthorized("JWT expired".into())),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append rows to a table.
    pub fn seed(&self, table: Table, rows: impl IntoIterator<Item = serde_json::Value>) {
        self.lock().tables.entry(table).or_default().extend(rows);
    }

    #[must_use]
    pub fn rows(&self, table: Table) -> Vec<serde_json::Value> {
        self.lock().tables.get(&table).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn has_account(&self, email: &str) -> bool {
        self.lock().accounts.contains_key(email)
    }

    /// Number of times a trait operation was invoked, e.g. `"authenticate"`.
    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// Every call fails with a transport error while set.
    pub fn set_offline(&self, offline: bool) {
        self.lock().faults.offline = offline;
    }

    /// `invalidate_session` reports a server error (after dropping the held session).
    pub fn fail_logout(&self, fail: bool) {
        self.lock().faults.fail_logout = fail;
    }

    /// `current_session` fails with a transport error while set.
    pub fn fail_session_lookup(&self, fail: bool) {
        self.lock().faults.fail_session_lookup = fail;
    }

    /// Inserts into `table` are stored but return no representation.
    pub fn silent_inserts(&self, table: Table) {
        self.lock().faults.silent_inserts.insert(table);
    }

    /// Issue a fresh access token for the held session, as a refresh would.
    /// Returns the new token, or `None` when no session is held.
    pub fn rotate_session(&self) -> Option<String> {
        let mut inner = self.lock();
        let held = inner.session.as_ref()?.access_token.clone();
        let user_id = inner.tokens.get(&held).cloned()?;
        Some(inner.issue_session(&user_id).access_token)
    }

    /// New accounts get no session until the email is confirmed.
    pub fn require_email_confirmation(&self, require: bool) {
        self.lock().faults.require_confirmation = require;
    }

    /// Inserts into `table` are rejected by the service.
    pub fn reject_inserts(&self, table: Table) {
        self.lock().faults.reject_inserts.insert(table);
    }

    /// Drop the held session, as on a fresh process start. Tokens stay valid.
    pub fn forget_session(&self) {
        self.lock().session = None;
    }

    /// Invalidate every issued token, as if they all expired upstream.
    pub fn revoke_tokens(&self) {
        let mut inner = self.lock();
        inner.tokens.clear();
        inner.session = None;
    }
}

#[async_trait::async_trait]
impl BackendService for MemoryBackend {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
        metadata: serde_json::Value,
    ) -> Result<ServiceAuth, GatewayError> {
        let mut inner = self.lock();
        inner.record("create_account")?;
        if password.chars().count() < MIN_SERVICE_PASSWORD_LEN {
            return Err(GatewayError::auth("Password should be at least 6 characters"));
        }
        if inner.accounts.contains_key(email) {
            return Err(GatewayError::auth("User already registered"));
        }
        let user_metadata = match metadata {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => HashMap::new(),
        };
        let principal = Principal {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_owned()),
            email_confirmed_at: None,
            last_sign_in_at: None,
            user_metadata,
        };
        inner
            .accounts
            .insert(email.to_owned(), Account { principal: principal.clone(), password: password.to_owned() });
        let session = if inner.faults.require_confirmation { None } else { Some(inner.issue_session(&principal.id)) };
        Ok(ServiceAuth { principal, session })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<ServiceAuth, GatewayError> {
        let mut inner = self.lock();
        inner.record("authenticate")?;
        let principal = match inner.accounts.get_mut(email) {
            Some(account) if account.password == password => {
                account.principal.last_sign_in_at = Some(OffsetDateTime::now_utc());
                account.principal.clone()
            }
            _ => return Err(GatewayError::auth("Invalid login credentials")),
        };
        let session = inner.issue_session(&principal.id);
        Ok(ServiceAuth { principal, session: Some(session) })
    }

    async fn invalidate_session(&self, access_token: &str) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.session = None;
        inner.record("invalidate_session")?;
        if inner.faults.fail_logout {
            return Err(GatewayError::Service { status: 500, message: "logout failed".into() });
        }
        inner.tokens.remove(access_token);
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<ServiceSession>, GatewayError> {
        let mut inner = self.lock();
        *inner.calls.entry("current_session").or_default() += 1;
        if inner.faults.fail_session_lookup {
            return Err(GatewayError::Transport("session refresh failed".into()));
        }
        Ok(inner.session.clone())
    }

    async fn clear_session(&self) {
        let mut inner = self.lock();
        *inner.calls.entry("clear_session").or_default() += 1;
        inner.session = None;
    }

    async fn current_principal(&self, access_token: &str) -> Result<Principal, GatewayError> {
        let mut inner = self.lock();
        inner.record("current_principal")?;
        let user_id = inner.user_for(access_token)?;
        inner
            .accounts
            .values()
            .find(|a| a.principal.id == user_id)
            .map(|a| a.principal.clone())
            .ok_or_else(|| GatewayError::Unauthorized("User not found".into()))
    }

    async fn request_password_reset(&self, _email: &str) -> Result<(), GatewayError> {
        self.lock().record("request_password_reset")
    }

    async fn update_password(&self, access_token: &str, new_password: &str) -> Result<(), GatewayError> {
        let mut inner = self.lock();
        inner.record("update_password")?;
        let user_id = inner.user_for(access_token)?;
        if new_password.chars().count() < MIN_SERVICE_PASSWORD_LEN {
            return Err(GatewayError::auth("Password should be at least 6 characters"));
        }
        let account = inner
            .accounts
            .values_mut()
            .find(|a| a.principal.id == user_id)
            .ok_or_else(|| GatewayError::Unauthorized("User not found".into()))?;
        account.password = new_password.to_owned();
        Ok(())
    }

    async fn select(
        &self,
        table: Table,
        query: &Query,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let mut inner = self.lock();
        inner.record("select")?;
        inner.check_bearer(bearer)?;
        let limit = query.limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        Ok(inner
            .tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.matches(row))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(
        &self,
        table: Table,
        mut row: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let mut inner = self.lock();
        inner.record("insert")?;
        inner.check_bearer(bearer)?;
        if inner.faults.reject_inserts.contains(&table) {
            return Err(GatewayError::Service {
                status: 403,
                message: format!("new row violates row-level security policy for table \"{}\"", table.as_str()),
            });
        }
        let Some(obj) = row.as_object_mut() else {
            return Err(GatewayError::Service { status: 400, message: "row must be a JSON object".into() });
        };
        obj.entry("id")
            .or_insert_with(|| serde_json::Value::String(uuid::Uuid::new_v4().to_string()));
        if table == Table::Profiles {
            let now = serde_json::Value::String(
                OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .map_err(|e| GatewayError::Service { status: 500, message: e.to_string() })?,
            );
            obj.entry("created_at").or_insert_with(|| now.clone());
            obj.entry("updated_at").or_insert(now);
            obj.entry("is_active").or_insert(serde_json::Value::Bool(true));
            obj.entry("email_confirmed").or_insert(serde_json::Value::Bool(false));
        }
        inner.tables.entry(table).or_default().push(row.clone());
        if inner.faults.silent_inserts.contains(&table) {
            return Ok(Vec::new());
        }
        Ok(vec![row])
    }

    async fn update(
        &self,
        table: Table,
        query: &Query,
        patch: serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let mut inner = self.lock();
        inner.record("update")?;
        inner.check_bearer(bearer)?;
        let serde_json::Value::Object(patch) = patch else {
            return Err(GatewayError::Service { status: 400, message: "patch must be a JSON object".into() });
        };
        let mut updated = Vec::new();
        for row in inner.tables.entry(table).or_default().iter_mut() {
            if !query.matches(row) {
                continue;
            }
            if let Some(obj) = row.as_object_mut() {
                for (key, value) in &patch {
                    obj.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
