use crate::{
    api,
    api::handlers::auth::AuthConfig,
    cli::actions::Action,
};
use anyhow::Result;

/// Execute the server action.
///
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to
/// start.
pub async fn execute(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        redis_url,
        jwt_secret,
        token_ttl,
        rate_limit_attempts,
        rate_limit_window,
        rate_limit_block,
        revocation_fail_closed,
    } = action;

    let auth_config = AuthConfig::new(jwt_secret)
        .with_token_ttl(token_ttl)
        .with_rate_limit_attempts(rate_limit_attempts)
        .with_rate_limit_window_seconds(rate_limit_window)
        .with_rate_limit_block_seconds(rate_limit_block)
        .with_revocation_fail_closed(revocation_fail_closed);

    api::new(port, dsn, redis_url, auth_config).await
}
