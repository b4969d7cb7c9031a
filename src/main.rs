use std::process::ExitCode;
use std::sync::Arc;

use medhasmind::backend::SupabaseClient;
use medhasmind::config::BackendConfig;
use medhasmind::error::GatewayError;
use medhasmind::gateway::BackendGateway;
use medhasmind::session::{SessionState, SessionStore};
use medhasmind::token_store::FileTokenStore;
use medhasmind::types::CourseFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

/// Resolve the stored session against the configured project and report
/// what the client sees.
async fn run() -> Result<(), GatewayError> {
    let config = BackendConfig::from_env()?;
    let service = Arc::new(SupabaseClient::new(&config)?);
    let tokens = Arc::new(FileTokenStore::for_origin(&config.token_dir, &config.url));
    tracing::info!(url = %config.url, token_file = %tokens.path().display(), "backend configured");

    let gateway = BackendGateway::new(service, tokens);
    let store = SessionStore::new(gateway.clone());

    match store.start().await {
        SessionState::Authenticated(user) => {
            tracing::info!(user_id = %user.id, role = user.role.as_str(), "session restored");
        }
        state => tracing::info!(state = state.label(), "no active session"),
    }

    match gateway.get_courses(&CourseFilter::default()).await.into_result() {
        Ok(courses) => tracing::info!(count = courses.len(), "published courses"),
        Err(error) => tracing::warn!(%error, "course listing failed"),
    }
    Ok(())
}
