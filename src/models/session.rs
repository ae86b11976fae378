//! Session model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted server-side session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session id (the unsigned cookie value)
    pub id: String,
    /// JSON-encoded session data
    pub data: String,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_expiration_check() {
        let now = Utc::now();
        let expired = SessionRecord {
            id: "expired".to_string(),
            data: "{}".to_string(),
            expires_at: now - Duration::hours(1),
        };
        let valid = SessionRecord {
            id: "valid".to_string(),
            data: "{}".to_string(),
            expires_at: now + Duration::hours(1),
        };

        assert!(expired.is_expired());
        assert!(!valid.is_expired());
    }
}
