//! Backend gateway: the single boundary to the hosted service.
//!
//! DESIGN
//! ======
//! Every public operation runs a fallible `try_*` body and folds its result
//! into an [`Envelope`] through `settle`. Nothing above this module sees a
//! raw `GatewayError`; callers get either `{data}` or `{error, code}`.
//!
//! The durable session token is written only here: on successful signup,
//! login and refresh, and cleared on logout or whenever the service rejects
//! the token as unauthorized.
//!
//! TRADE-OFFS
//! ==========
//! Signup creates the upstream identity before the profile row. If the
//! profile insert fails the identity is left without a profile; the failure
//! is reported and logged, never rolled back.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::backend::{BackendService, Query, Table};
use crate::envelope::Envelope;
use crate::error::{ErrorCode, GatewayError};
use crate::token_store::TokenStore;
use crate::types::{
    AccountKind, Achievement, AuthResponse, ContactMessage, CourseFilter, CourseSummary, Enrollment, Hackathon, Identity,
    ProfileUpdate, Role, SignupRequest, TokenInfo, UserAnalytics,
};
use crate::validation;

pub const CONFIRMATION_PENDING_MESSAGE: &str = "Account created; confirm your email address before logging in";
const NOT_AUTHENTICATED_MESSAGE: &str = "Not authenticated";
const PROFILE_NOT_FOUND_MESSAGE: &str = "User profile not found";

/// Columns this client writes on signup. Timestamps and status flags are
/// owned by the service.
#[derive(Serialize)]
struct ProfileRow<'a> {
    id: &'a str,
    email: &'a str,
    name: &'a str,
    role: Role,
    user_type: AccountKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

impl<'a> ProfileRow<'a> {
    fn new(user_id: &'a str, request: &'a SignupRequest) -> Self {
        Self {
            id: user_id,
            email: &request.email,
            name: &request.name,
            role: request.user_type.role(),
            user_type: request.user_type,
            company: request.company.as_deref(),
            phone: request.phone.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct LastLoginPatch {
    #[serde(with = "time::serde::rfc3339")]
    last_login: OffsetDateTime,
}

#[derive(Serialize)]
struct ContactRow<'a> {
    #[serde(flatten)]
    message: &'a ContactMessage,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct BackendGateway {
    service: Arc<dyn BackendService>,
    tokens: Arc<dyn TokenStore>,
}

impl BackendGateway {
    pub fn new(service: Arc<dyn BackendService>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { service, tokens }
    }

    // =========================================================================
    // AUTH
    // =========================================================================

    /// Create an account and its profile, storing the issued token.
    pub async fn signup(&self, request: &SignupRequest) -> Envelope<AuthResponse> {
        let result = self.try_signup(request).await;
        self.settle("signup", result)
    }

    /// Authenticate with email and password, storing the issued token.
    pub async fn login(&self, email: &str, password: &str) -> Envelope<AuthResponse> {
        let result = self.try_login(email, password).await;
        self.settle("login", result)
    }

    /// Invalidate the session upstream and always drop both the service's
    /// held session and the local token.
    ///
    /// The envelope reports a failed session lookup or remote call, but
    /// nothing that could sign the user back in survives either way.
    pub async fn logout(&self) -> Envelope<()> {
        let (held, lookup) = match self.service.current_session().await {
            Ok(session) => (session.map(|s| s.access_token), Ok(())),
            Err(e) => {
                warn!(error = %e, "logout: session lookup failed; falling back to stored token");
                (None, Err(e))
            }
        };
        let stored = match self.tokens.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "logout: stored token unreadable");
                None
            }
        };
        let remote = match held.or(stored) {
            Some(token) => self.service.invalidate_session(&token).await,
            None => Ok(()),
        };
        self.service.clear_session().await;
        let local = self.tokens.clear();
        info!(remote_ok = remote.is_ok(), lookup_ok = lookup.is_ok(), "logout complete");
        self.settle("logout", remote.and(lookup).and(local))
    }

    /// Re-read the service's own session and re-store its token.
    pub async fn refresh_token(&self) -> Envelope<TokenInfo> {
        let result = self.try_refresh_token().await;
        self.settle("refresh_token", result)
    }

    pub async fn get_current_user(&self) -> Envelope<Identity> {
        let result = self.try_current_user().await;
        self.settle("get_current_user", result)
    }

    /// Apply the supplied subset of profile fields to the current identity.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Envelope<Identity> {
        let result = self.try_update_profile(update).await;
        self.settle("update_profile", result)
    }

    pub async fn request_password_reset(&self, email: &str) -> Envelope<()> {
        let result = self.try_password_reset(email).await;
        self.settle("request_password_reset", result)
    }

    /// Set a new password for the current session, e.g. one opened from a
    /// recovery link.
    pub async fn confirm_password_reset(&self, new_password: &str) -> Envelope<()> {
        let result = self.try_confirm_password_reset(new_password).await;
        self.settle("confirm_password_reset", result)
    }

    // =========================================================================
    // DATA
    // =========================================================================

    /// Published courses matching every present predicate. No rows is success.
    pub async fn get_courses(&self, filter: &CourseFilter) -> Envelope<Vec<CourseSummary>> {
        let result = self.try_courses(filter).await;
        self.settle("get_courses", result)
    }

    pub async fn get_hackathons(&self) -> Envelope<Vec<Hackathon>> {
        let result = self.try_hackathons().await;
        self.settle("get_hackathons", result)
    }

    pub async fn get_user_analytics(&self) -> Envelope<UserAnalytics> {
        let result = self.try_user_analytics().await;
        self.settle("get_user_analytics", result)
    }

    /// Insert a contact message and return its generated id.
    pub async fn submit_contact_message(&self, message: &ContactMessage) -> Envelope<String> {
        let result = self.try_contact_message(message).await;
        self.settle("submit_contact_message", result)
    }

    // =========================================================================
    // OPERATION BODIES
    // =========================================================================

    async fn try_signup(&self, request: &SignupRequest) -> Result<AuthResponse, GatewayError> {
        let request = validation::signup(request)?;
        let role = request.user_type.role();
        let metadata = serde_json::json!({
            "name": &request.name,
            "user_type": request.user_type.as_str(),
            "role": role.as_str(),
        });
        let auth = self
            .service
            .create_account(&request.email, &request.password, metadata)
            .await?;

        let user_id = auth.principal.id.as_str();
        let bearer = auth.session.as_ref().map(|s| s.access_token.as_str());
        let row = serde_json::to_value(ProfileRow::new(user_id, &request))?;
        let inserted = self
            .service
            .insert(Table::Profiles, row, bearer)
            .await
            .and_then(first_row::<Identity>);
        let stored = match inserted {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!(user_id, "profile insert returned no row; upstream identity has no readable profile");
                return Err(GatewayError::auth("Failed to create user profile: no profile row returned"));
            }
            Err(e) => {
                warn!(user_id, error = %e, "profile insert failed; upstream identity has no profile");
                return Err(GatewayError::auth(format!("Failed to create user profile: {}", e.user_message())));
            }
        };

        let Some(session) = auth.session else {
            info!(user_id = %stored.id, "signup awaiting email confirmation");
            return Err(GatewayError::auth(CONFIRMATION_PENDING_MESSAGE));
        };
        self.tokens.save(&session.access_token)?;
        info!(user_id = %stored.id, user_type = stored.user_type.as_str(), "signup complete");
        Ok(AuthResponse {
            access_token: session.access_token,
            token_type: session.token_type,
            expires_in: session.expires_in,
            user: stored,
        })
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        let email = validation::login(email, password)?;
        let auth = self.service.authenticate(&email, password).await?;
        let session = auth
            .session
            .ok_or_else(|| GatewayError::auth("No session issued"))?;
        let bearer = Some(session.access_token.as_str());

        let mut identity = self
            .fetch_profile(&auth.principal.id, bearer)
            .await?
            .ok_or_else(|| GatewayError::auth(PROFILE_NOT_FOUND_MESSAGE))?;

        let now = OffsetDateTime::now_utc();
        let patch = serde_json::to_value(LastLoginPatch { last_login: now })?;
        match self
            .service
            .update(Table::Profiles, &Query::new().eq("id", identity.id.as_str()), patch, bearer)
            .await
        {
            Ok(_) => identity.last_login = Some(now),
            Err(e) => warn!(user_id = %identity.id, error = %e, "failed to record last login"),
        }

        self.tokens.save(&session.access_token)?;
        info!(user_id = %identity.id, "login complete");
        Ok(AuthResponse {
            access_token: session.access_token,
            token_type: session.token_type,
            expires_in: session.expires_in,
            user: identity,
        })
    }

    async fn try_refresh_token(&self) -> Result<TokenInfo, GatewayError> {
        let session = self
            .service
            .current_session()
            .await?
            .ok_or_else(|| GatewayError::auth("No active session"))?;
        self.tokens.save(&session.access_token)?;
        Ok(TokenInfo {
            access_token: session.access_token,
            token_type: session.token_type,
            expires_in: session.expires_in,
        })
    }

    async fn try_current_user(&self) -> Result<Identity, GatewayError> {
        let token = self.require_token().await?;
        let principal = self.service.current_principal(&token).await?;
        self.fetch_profile(&principal.id, Some(&token))
            .await?
            .ok_or_else(|| GatewayError::auth(PROFILE_NOT_FOUND_MESSAGE))
    }

    async fn try_update_profile(&self, update: &ProfileUpdate) -> Result<Identity, GatewayError> {
        validation::profile_update(update)?;
        let token = self.require_token().await?;
        let principal = self.service.current_principal(&token).await?;
        let patch = serde_json::to_value(update)?;
        let rows = self
            .service
            .update(Table::Profiles, &Query::new().eq("id", principal.id.as_str()), patch, Some(&token))
            .await?;
        let identity = first_row::<Identity>(rows)?.ok_or_else(|| GatewayError::auth(PROFILE_NOT_FOUND_MESSAGE))?;
        info!(user_id = %identity.id, "profile updated");
        Ok(identity)
    }

    async fn try_password_reset(&self, email: &str) -> Result<(), GatewayError> {
        let email = validation::password_reset(email)?;
        self.service.request_password_reset(&email).await
    }

    async fn try_confirm_password_reset(&self, new_password: &str) -> Result<(), GatewayError> {
        validation::new_password(new_password)?;
        let token = self.require_token().await?;
        self.service.update_password(&token, new_password).await?;
        info!("password updated");
        Ok(())
    }

    async fn try_courses(&self, filter: &CourseFilter) -> Result<Vec<CourseSummary>, GatewayError> {
        let mut query = Query::new().eq("is_published", true);
        if let Some(category) = &filter.category {
            query = query.eq("category", category.as_str());
        }
        if let Some(difficulty) = &filter.difficulty {
            query = query.eq("difficulty", difficulty.as_str());
        }
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }
        let rows = self.service.select(Table::Courses, &query, None).await?;
        let courses = decode_rows::<CourseSummary>(rows)?;
        Ok(courses.into_iter().filter(|c| filter.matches(c)).collect())
    }

    async fn try_hackathons(&self) -> Result<Vec<Hackathon>, GatewayError> {
        let query = Query::new().eq("is_active", true);
        let rows = self.service.select(Table::Hackathons, &query, None).await?;
        decode_rows(rows)
    }

    async fn try_user_analytics(&self) -> Result<UserAnalytics, GatewayError> {
        let token = self.require_token().await?;
        let principal = self.service.current_principal(&token).await?;
        let by_user = Query::new().eq("user_id", principal.id.as_str());
        let enrollments: Vec<Enrollment> =
            decode_rows(self.service.select(Table::CourseEnrollments, &by_user, Some(&token)).await?)?;
        let achievements: Vec<Achievement> =
            decode_rows(self.service.select(Table::Achievements, &by_user, Some(&token)).await?)?;
        Ok(UserAnalytics::from_records(&enrollments, achievements))
    }

    async fn try_contact_message(&self, message: &ContactMessage) -> Result<String, GatewayError> {
        let message = validation::contact_message(message)?;
        let row = serde_json::to_value(ContactRow { message: &message, created_at: OffsetDateTime::now_utc() })?;
        let rows = self.service.insert(Table::ContactMessages, row, None).await?;
        let id = rows
            .first()
            .and_then(|row| row.get("id"))
            .and_then(|id| match id {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| GatewayError::Decode("contact insert returned no id".into()))?;
        info!(contact_id = %id, inquiry_type = ?message.inquiry_type, "contact message stored");
        Ok(id)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Token for authenticated calls: the service's own session first, then
    /// the durably stored token. A session token the service rotated on its
    /// own is written back to the store.
    async fn access_token(&self) -> Result<Option<String>, GatewayError> {
        let Some(session) = self.service.current_session().await? else {
            return self.tokens.load();
        };
        let stored = self.tokens.load()?;
        if stored.as_deref() != Some(session.access_token.as_str()) {
            self.tokens.save(&session.access_token)?;
        }
        Ok(Some(session.access_token))
    }

    async fn require_token(&self) -> Result<String, GatewayError> {
        self.access_token()
            .await?
            .ok_or_else(|| GatewayError::auth(NOT_AUTHENTICATED_MESSAGE))
    }

    async fn fetch_profile(&self, user_id: &str, bearer: Option<&str>) -> Result<Option<Identity>, GatewayError> {
        let query = Query::new().eq("id", user_id).limit(1);
        let rows = self.service.select(Table::Profiles, &query, bearer).await?;
        first_row(rows)
    }

    /// Fold a result into an envelope, logging failures once and dropping
    /// the stored token when the service rejected it.
    fn settle<T>(&self, op: &'static str, result: Result<T, GatewayError>) -> Envelope<T> {
        if let Err(e) = &result {
            warn!(op, code = e.error_code(), error = %e, "gateway operation failed");
            if e.is_unauthorized() {
                if let Err(clear_err) = self.tokens.clear() {
                    warn!(op, error = %clear_err, "failed to clear rejected token");
                }
            }
        }
        Envelope::from(result)
    }
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<T>, GatewayError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
        .collect()
}

fn first_row<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Option<T>, GatewayError> {
    rows.into_iter()
        .next()
        .map(serde_json::from_value)
        .transpose()
        .map_err(GatewayError::from)
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
