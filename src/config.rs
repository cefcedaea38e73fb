use std::env;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

/// The default TTL for a room join token, in seconds.
///
/// There is no server-side revocation, so a leaked or stale token must
/// self-expire quickly. Keep this in minutes, never hours.
const DEFAULT_TOKEN_TTL_SECONDS: u32 = 600;

/// The application's configuration.
///
/// Everything the token codec and orchestrator need is carried here
/// explicitly so tests can inject fixed secrets deterministically.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The URL of the Redis server holding auth sessions.
    pub redis_url: String,
    /// The media-network application ID bound into issued tokens.
    pub token_app_id: String,
    /// The shared secret used to derive the token encryption key.
    pub token_secret: Zeroizing<Vec<u8>>,
    /// How long an issued room token stays valid, in seconds.
    pub token_ttl_seconds: u32,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut token_secret_hex = env::var("ROOM_TOKEN_SECRET")
            .context("ROOM_TOKEN_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let token_secret_bytes = hex::decode(&token_secret_hex)
            .context("ROOM_TOKEN_SECRET must be valid hexadecimal")?;

        token_secret_hex.zeroize();

        if token_secret_bytes.len() != 32 {
            anyhow::bail!("ROOM_TOKEN_SECRET must be exactly 32 bytes (64 hex characters)");
        }

        let token_ttl_seconds: u32 = env::var("ROOM_TOKEN_TTL_SECONDS")
            .unwrap_or_else(|_| DEFAULT_TOKEN_TTL_SECONDS.to_string())
            .parse()
            .context("Invalid ROOM_TOKEN_TTL_SECONDS")?;

        if token_ttl_seconds == 0 || token_ttl_seconds > 3600 {
            anyhow::bail!("ROOM_TOKEN_TTL_SECONDS must be between 1 and 3600");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            token_app_id: env::var("ROOM_TOKEN_APP_ID")
                .context("ROOM_TOKEN_APP_ID must be set")?,
            token_secret: Zeroizing::new(token_secret_bytes),
            token_ttl_seconds,
        })
    }
}
