use std::sync::Arc;

use rand::RngCore;
use sha2::{Digest, Sha256};

use super::errors::AuthError;
use super::store::{Principal, SaveOptions, UserStore};
use crate::modules::utils::logging::{log_auth_event, log_data_operation};
use crate::modules::utils::time::Clock;
use crate::RESET_TOKEN_DURATION;

const RESET_TOKEN_BYTES: usize = 32;

/// Generate a fresh plaintext reset token (64 hex characters)
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest of a reset token, as stored on the principal.
///
/// A fast digest is enough here: the token is random, single-use and
/// expires within minutes.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Issues, consumes and rolls back single-use password reset tokens
pub struct PasswordResetManager<S: UserStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ttl: u64,
}

impl<S: UserStore> PasswordResetManager<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(store, clock, RESET_TOKEN_DURATION)
    }

    pub fn with_ttl(store: Arc<S>, clock: Arc<dyn Clock>, ttl: u64) -> Self {
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Store the hash of a new token on `principal` and return the plaintext.
    /// Any earlier outstanding token for this principal stops working.
    pub fn issue(&self, principal: &mut Principal) -> Result<String, AuthError> {
        let token = generate_reset_token();
        principal.password_reset_token = Some(hash_reset_token(&token));
        principal.password_reset_expires = Some(self.clock.now().saturating_add(self.ttl));

        if let Err(e) = self.store.save(principal, SaveOptions::SKIP_VALIDATION) {
            log_data_operation(
                "issue_reset_token",
                &principal.email,
                "user_store",
                false,
                Some(&e.to_string()),
            );
            principal.clear_password_reset();
            return Err(e.into());
        }

        log_auth_event("reset_token_issued", &principal.email, true, None);
        Ok(token)
    }

    /// Find the principal owning `token`.
    ///
    /// The returned principal has its reset fields already cleared; the
    /// caller persists that together with the new password in one save.
    pub fn consume(&self, token: &str) -> Result<Principal, AuthError> {
        let digest = hash_reset_token(token.trim());
        let mut principal = self
            .store
            .find_by_reset_token(&digest, self.clock.now())?
            .ok_or_else(|| {
                log_auth_event("reset_token_rejected", "reset_token", false, None);
                AuthError::TokenInvalidOrExpired
            })?;

        principal.clear_password_reset();
        Ok(principal)
    }

    /// Persist a principal obtained from `consume`, provided `token` is still
    /// the outstanding one. A second redemption of the same token fails.
    pub fn redeem(
        &self,
        principal: &Principal,
        token: &str,
        options: SaveOptions,
    ) -> Result<(), AuthError> {
        let digest = hash_reset_token(token.trim());
        self.store
            .save_redeeming(principal, &digest, options)
            .map_err(|e| {
                log_data_operation(
                    "redeem_reset_token",
                    &principal.email,
                    "user_store",
                    false,
                    Some(&e.to_string()),
                );
                AuthError::from(e)
            })
    }

    /// Withdraw an issued token without touching the password.
    ///
    /// A failing store update is logged and swallowed; the token then still
    /// lapses at its expiry.
    pub fn rollback(&self, principal: &mut Principal) {
        principal.clear_password_reset();
        match self.store.save(principal, SaveOptions::SKIP_VALIDATION) {
            Ok(()) => log_data_operation(
                "rollback_reset_token",
                &principal.email,
                "user_store",
                true,
                None,
            ),
            Err(e) => log_data_operation(
                "rollback_reset_token",
                &principal.email,
                "user_store",
                false,
                Some(&e.to_string()),
            ),
        }
    }
}
