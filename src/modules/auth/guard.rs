use std::sync::Arc;

use super::errors::AuthError;
use super::jwt::TokenCodec;
use super::store::{Principal, Role, UserStore};
use crate::modules::utils::logging::log_auth_event;
use crate::BEARER_PREFIX;

const NOT_LOGGED_IN: &str = "You are not logged in! Please log in to get access.";
const PRINCIPAL_GONE: &str = "The user belonging to this token no longer exists.";
const PASSWORD_CHANGED: &str = "User recently changed password! Please log in again.";

/// Pull the token out of an `Authorization: Bearer <token>` value
pub fn extract_bearer(authorization: Option<&str>) -> Option<&str> {
    let token = authorization?.strip_prefix(BEARER_PREFIX)?.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Resolves the principal behind a bearer token
pub struct SessionGuard<S: UserStore> {
    store: Arc<S>,
    codec: TokenCodec,
}

impl<S: UserStore> SessionGuard<S> {
    pub fn new(store: Arc<S>, codec: TokenCodec) -> Self {
        Self { store, codec }
    }

    /// Authenticate from request headers given as name/value pairs.
    /// Header names match case-insensitively.
    pub fn authenticate_headers<'a, I>(&self, headers: I) -> Result<Principal, AuthError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let authorization = headers
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value);
        self.authenticate(authorization)
    }

    /// Authenticate from the raw `Authorization` header value.
    ///
    /// Fails with an authentication error when the header is missing or
    /// malformed, the token does not verify, its principal is gone, or the
    /// password changed after the token was issued.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = extract_bearer(authorization)
            .ok_or_else(|| AuthError::Authentication(NOT_LOGGED_IN.to_string()))?;

        let claims = self.codec.verify(token)?;

        let principal = self.store.find_by_id(&claims.id)?.ok_or_else(|| {
            log_auth_event("session_rejected", &claims.id, false, Some("principal missing"));
            AuthError::Authentication(PRINCIPAL_GONE.to_string())
        })?;

        if principal.changed_password_after(claims.iat) {
            log_auth_event("session_rejected", &principal.email, false, Some("stale token"));
            return Err(AuthError::Authentication(PASSWORD_CHANGED.to_string()));
        }

        Ok(principal)
    }
}

/// Restricts an operation to a set of roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGate {
    allowed: Vec<Role>,
}

impl RoleGate {
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub fn allowed(&self) -> &[Role] {
        &self.allowed
    }

    pub fn check(&self, principal: &Principal) -> Result<(), AuthError> {
        authorize(principal, &self.allowed)
    }
}

/// Shorthand for `RoleGate::new`
pub fn restrict_to(roles: &[Role]) -> RoleGate {
    RoleGate::new(roles.iter().copied())
}

pub fn authorize(principal: &Principal, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&principal.role) {
        Ok(())
    } else {
        log_auth_event(
            "forbidden",
            &principal.email,
            false,
            Some(principal.role.as_str()),
        );
        Err(AuthError::Forbidden)
    }
}
