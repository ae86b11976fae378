//! Anti-forgery tokens
//!
//! The session keeps one raw random secret under [`SESSION_KEY`]. Every token
//! handed to the client is `nonce.timestamp.signature`, where the signature
//! binds the nonce and timestamp to that secret. A fresh nonce makes every
//! generated token distinct, while any of them validates against the session.

use crate::config::CsrfConfig;
use crate::services::signing::{self, Signer};
use crate::session::Session;
use chrono::Utc;
use data_encoding::BASE64URL_NOPAD;
use thiserror::Error;

/// Session key holding the raw secret
pub const SESSION_KEY: &str = "csrf_token";

/// Salt separating token signatures from other signed values
const CSRF_SALT: &str = "csrf-token";

/// CSRF errors
#[derive(Debug, Error)]
pub enum CsrfError {
    #[error("The CSRF token is missing")]
    MissingToken,

    #[error("The CSRF session token is missing")]
    MissingSessionToken,

    #[error("The CSRF token is malformed")]
    Malformed,

    #[error("The CSRF token is invalid")]
    InvalidSignature,

    #[error("The CSRF token has expired")]
    Expired,

    #[error("No session is available for the CSRF token")]
    NoSession,

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

/// Generates and validates anti-forgery tokens
#[derive(Debug, Clone)]
pub struct CsrfProtect {
    signer: Signer,
    time_limit: Option<i64>,
}

impl CsrfProtect {
    pub fn new(secret_key: &str, config: &CsrfConfig) -> Self {
        Self {
            signer: Signer::new(secret_key, CSRF_SALT),
            time_limit: config.time_limit_seconds.map(|secs| secs as i64),
        }
    }

    /// Issue a new token for this session, creating its secret on first use
    pub async fn generate(&self, session: &Session) -> Result<String, CsrfError> {
        let secret = match session.get::<String>(SESSION_KEY).await? {
            Some(secret) => secret,
            None => {
                let secret = signing::generate_secret();
                session.insert(SESSION_KEY, &secret).await?;
                secret
            }
        };
        Ok(self.token_at(&secret, &signing::generate_id(), Utc::now().timestamp()))
    }

    fn token_at(&self, secret: &str, nonce: &str, timestamp: i64) -> String {
        let ts = timestamp.to_string();
        let tag = self
            .signer
            .mac(&[secret.as_bytes(), nonce.as_bytes(), ts.as_bytes()]);
        format!("{}.{}.{}", nonce, ts, BASE64URL_NOPAD.encode(&tag))
    }

    /// Check a token submitted by the client against the session
    pub async fn validate(&self, session: &Session, token: Option<&str>) -> Result<(), CsrfError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(CsrfError::MissingToken)?;
        let secret: String = session
            .get(SESSION_KEY)
            .await?
            .ok_or(CsrfError::MissingSessionToken)?;

        let mut parts = token.splitn(3, '.');
        let (Some(nonce), Some(ts), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CsrfError::Malformed);
        };
        let timestamp: i64 = ts.parse().map_err(|_| CsrfError::Malformed)?;
        let tag = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| CsrfError::Malformed)?;

        if !self
            .signer
            .verify(&[secret.as_bytes(), nonce.as_bytes(), ts.as_bytes()], &tag)
        {
            return Err(CsrfError::InvalidSignature);
        }

        if let Some(limit) = self.time_limit {
            if Utc::now().timestamp() - timestamp > limit {
                return Err(CsrfError::Expired);
            }
        }
        Ok(())
    }
}
