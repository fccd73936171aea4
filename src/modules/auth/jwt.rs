use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::debug;
use serde::{Deserialize, Serialize};

use super::errors::AuthError;
use crate::modules::config::AuthConfig;
use crate::modules::utils::time::Clock;

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Principal id
    pub id: String,
    pub iat: u64,
    pub exp: u64,
}

/// Signs and verifies HS256 session tokens.
///
/// Expiry is checked against the injected clock rather than the system time
/// so that issuance and verification always agree on "now".
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expires_in: u64,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            expires_in: config.jwt_expires_in,
            clock,
        }
    }

    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Issue a token for `principal_id`, stamped with the current time
    pub fn issue(&self, principal_id: &str) -> Result<String, AuthError> {
        let now = self.clock.now();
        let claims = SessionClaims {
            id: principal_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.expires_in),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            log::error!("Failed to sign session token: {}", e);
            AuthError::ExternalService("Something went wrong. Please try again later.".to_string())
        })
    }

    /// Verify signature and expiry. Every failure collapses into `InvalidToken`.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                debug!("Session token rejected: {:?}", e.kind());
                AuthError::InvalidToken
            },
        )?;

        if data.claims.exp <= self.clock.now() {
            debug!("Session token rejected: expired");
            return Err(AuthError::InvalidToken);
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::utils::time::ManualClock;

    const SECRET: &str = "test-secret-that-is-at-least-32-bytes";

    fn codec_with(secret: &str, clock: Arc<ManualClock>) -> TokenCodec {
        let mut config = AuthConfig::new(secret).unwrap();
        config.jwt_expires_in = 3600;
        TokenCodec::new(&config, clock)
    }

    #[test]
    fn test_issue_and_verify() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec_with(SECRET, clock.clone());

        let token = codec.issue("principal-1").unwrap();
        assert_eq!(token.split('.').count(), 3);

        let claims = codec.verify(&token).unwrap();
        assert_eq!(claims.id, "principal-1");
        assert_eq!(claims.iat, 1_700_000_000);
        assert_eq!(claims.exp, 1_700_003_600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec_with(SECRET, clock.clone());
        let token = codec.issue("principal-1").unwrap();

        clock.advance(3599);
        assert!(codec.verify(&token).is_ok());

        clock.advance(1);
        assert_eq!(codec.verify(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec_with(SECRET, clock.clone());
        let forger = codec_with("another-secret-that-is-also-32-bytes", clock);

        let forged = forger.issue("principal-1").unwrap();
        assert_eq!(codec.verify(&forged), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec_with(SECRET, clock);

        let genuine = codec.issue("principal-1").unwrap();
        let other = codec.issue("principal-2").unwrap();

        // Payload of one token with the signature of another
        let genuine_parts: Vec<&str> = genuine.split('.').collect();
        let other_parts: Vec<&str> = other.split('.').collect();
        let spliced = format!(
            "{}.{}.{}",
            genuine_parts[0], other_parts[1], genuine_parts[2]
        );

        assert_eq!(codec.verify(&spliced), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage_rejected() {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let codec = codec_with(SECRET, clock);
        assert_eq!(codec.verify(""), Err(AuthError::InvalidToken));
        assert_eq!(codec.verify("not.a.token"), Err(AuthError::InvalidToken));
    }
}
