use std::sync::Arc;

use log::error;
use serde::Deserialize;

use super::errors::AuthError;
use super::guard::SessionGuard;
use super::jwt::TokenCodec;
use super::password::{confirm_password, validate_password, CredentialVerifier, PasswordError};
use super::store::{NewPrincipal, Principal, Role, SaveOptions, UserStore};
use super::tokens::PasswordResetManager;
use super::transport::AuthSession;
use crate::modules::config::AuthConfig;
use crate::modules::email::{reset_message, reset_subject, reset_url, Mailer};
use crate::modules::utils::logging::log_auth_event;
use crate::modules::utils::time::{Clock, SystemClock};

const MISSING_CREDENTIALS: &str = "Please provide email and password!";
const WRONG_CURRENT_PASSWORD: &str = "Your current password is wrong.";
const NO_SUCH_EMAIL: &str = "There is no user with that email address.";
const DELIVERY_FAILED: &str = "There was an error sending the email. Try again later!";

/// Signup payload. `role` is deliberately absent: new accounts are always `user`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

impl SignupRequest {
    pub fn new(email: &str, password: &str, password_confirm: &str) -> Self {
        Self {
            name: None,
            email: email.to_string(),
            password: password.to_string(),
            password_confirm: password_confirm.to_string(),
        }
    }
}

fn invalid_password(err: PasswordError) -> AuthError {
    AuthError::Validation(err.to_string())
}

/// Signup, login and password lifecycle flows
pub struct AccountService<S: UserStore> {
    store: Arc<S>,
    config: Arc<AuthConfig>,
    clock: Arc<dyn Clock>,
    credentials: CredentialVerifier,
    codec: TokenCodec,
    resets: PasswordResetManager<S>,
}

impl<S: UserStore> AccountService<S> {
    pub fn new(store: Arc<S>, config: Arc<AuthConfig>) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<S>, config: Arc<AuthConfig>, clock: Arc<dyn Clock>) -> Self {
        let codec = TokenCodec::new(&config, clock.clone());
        let resets =
            PasswordResetManager::with_ttl(store.clone(), clock.clone(), config.reset_token_ttl);

        Self {
            credentials: CredentialVerifier::new(config.password_hash_rounds),
            store,
            config,
            clock,
            codec,
            resets,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// A guard sharing this service's store and signing key
    pub fn guard(&self) -> SessionGuard<S> {
        SessionGuard::new(self.store.clone(), self.codec.clone())
    }

    pub fn signup(&self, request: SignupRequest) -> Result<AuthSession, AuthError> {
        validate_password(&request.password, &request.password_confirm)
            .map_err(invalid_password)?;

        let principal = self.store.create(NewPrincipal {
            name: request.name,
            email: request.email,
            password_hash: self.credentials.hash(&request.password),
            role: Role::User,
        })?;

        log_auth_event("signup", &principal.email, true, None);
        self.start_session(&principal)
    }

    /// Unknown emails and wrong passwords fail with the same error
    pub fn login(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(MISSING_CREDENTIALS.to_string()));
        }

        let found = self.store.find_by_email(email, true)?;
        let verified = match found.as_ref().and_then(|p| p.password_hash.as_deref()) {
            Some(hash) => self.credentials.verify(password, hash),
            None => {
                // Spend the same work as a real check
                let _ = self.credentials.hash(password);
                false
            }
        };

        let principal = match found {
            Some(principal) if verified => principal,
            _ => {
                log_auth_event("login", email, false, None);
                return Err(AuthError::incorrect_credentials());
            }
        };

        log_auth_event("login", &principal.email, true, None);
        self.start_session(&principal)
    }

    /// Issue a reset token and send the link built from `origin`.
    ///
    /// When delivery fails the token is withdrawn before the error is
    /// returned, so no live token exists that the user never received.
    pub fn request_password_reset(
        &self,
        email: &str,
        origin: &str,
        mailer: &dyn Mailer,
    ) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::Validation(
                "Please provide your email".to_string(),
            ));
        }

        let mut principal = self
            .store
            .find_by_email(email, false)?
            .ok_or_else(|| AuthError::NotFound(NO_SUCH_EMAIL.to_string()))?;

        let token = self.resets.issue(&mut principal)?;
        let url = reset_url(origin, &token);
        let subject = reset_subject(self.resets.ttl());
        let body = reset_message(&url, self.resets.ttl());

        if let Err(e) = mailer.deliver(&principal.email, &subject, &body) {
            error!("Password reset email could not be delivered: {}", e);
            self.resets.rollback(&mut principal);
            return Err(AuthError::ExternalService(DELIVERY_FAILED.to_string()));
        }

        log_auth_event("reset_requested", &principal.email, true, None);
        Ok(())
    }

    /// Set a new password with a reset token; logs the principal in.
    ///
    /// A mismatched confirmation is refused before the token is looked up.
    /// The remaining password rules apply once the token is known to be live.
    pub fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<AuthSession, AuthError> {
        confirm_password(new_password, new_password_confirm).map_err(invalid_password)?;

        let mut principal = self.resets.consume(token)?;
        validate_password(new_password, new_password_confirm).map_err(invalid_password)?;
        self.apply_password(&mut principal, new_password);
        self.resets.redeem(&principal, token, SaveOptions::VALIDATE)?;

        log_auth_event("reset_password", &principal.email, true, None);
        self.start_session(&principal)
    }

    /// Change the password of an authenticated principal.
    ///
    /// The current password is checked against the stored hash even though
    /// the caller already holds a valid session.
    pub fn update_password(
        &self,
        principal: &Principal,
        current_password: &str,
        new_password: &str,
        new_password_confirm: &str,
    ) -> Result<AuthSession, AuthError> {
        let mut stored = self
            .store
            .find_by_email(&principal.email, true)?
            .filter(|p| p.id == principal.id)
            .ok_or_else(|| AuthError::Authentication(WRONG_CURRENT_PASSWORD.to_string()))?;

        let verified = stored
            .password_hash
            .as_deref()
            .map(|hash| self.credentials.verify(current_password, hash))
            .unwrap_or(false);
        if !verified {
            log_auth_event("update_password", &stored.email, false, None);
            return Err(AuthError::Authentication(
                WRONG_CURRENT_PASSWORD.to_string(),
            ));
        }

        validate_password(new_password, new_password_confirm).map_err(invalid_password)?;
        self.apply_password(&mut stored, new_password);
        self.store.save(&stored, SaveOptions::VALIDATE)?;

        log_auth_event("update_password", &stored.email, true, None);
        self.start_session(&stored)
    }

    fn apply_password(&self, principal: &mut Principal, new_password: &str) {
        principal.password_hash = Some(self.credentials.hash(new_password));
        principal.password_changed_at = Some(self.clock.now());
    }

    fn start_session(&self, principal: &Principal) -> Result<AuthSession, AuthError> {
        Ok(AuthSession {
            principal: principal.to_public(),
            token: self.codec.issue(&principal.id)?,
        })
    }
}
