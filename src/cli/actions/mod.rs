pub mod server;

use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        redis_url: String,
        jwt_secret: SecretString,
        token_ttl: String,
        rate_limit_attempts: u32,
        rate_limit_window: u64,
        rate_limit_block: u64,
        revocation_fail_closed: bool,
    },
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    /// Returns an error if the underlying action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server { .. } => server::execute(self).await,
        }
    }
}
