use serde_json::{json, Value};
use thiserror::Error;

/// Every failure an authentication operation can surface to a caller.
///
/// The `Display` text of each variant is safe to show to end users. Internal
/// details (store errors, SMTP errors) are logged where they happen and never
/// carried in here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Authentication(String),

    #[error("Invalid token. Please log in again!")]
    InvalidToken,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("Token is invalid or has expired")]
    TokenInvalidOrExpired,

    #[error("{0}")]
    ExternalService(String),
}

impl AuthError {
    /// The single message used for unknown emails and wrong passwords alike
    pub const INCORRECT_CREDENTIALS: &'static str = "Incorrect email or password";

    pub fn incorrect_credentials() -> Self {
        AuthError::Authentication(Self::INCORRECT_CREDENTIALS.to_string())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Validation(_) | AuthError::TokenInvalidOrExpired => 400,
            AuthError::Authentication(_) | AuthError::InvalidToken => 401,
            AuthError::Forbidden => 403,
            AuthError::NotFound(_) => 404,
            AuthError::ExternalService(_) => 500,
        }
    }

    /// Faults are failures of a collaborator rather than of the caller's input
    pub fn is_fault(&self) -> bool {
        self.status_code() >= 500
    }

    /// JSON body in the `{status, message}` shape clients expect
    pub fn to_response_body(&self) -> Value {
        let status = if self.is_fault() { "error" } else { "fail" };
        json!({
            "status": status,
            "message": self.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AuthError::Validation("bad".into()).status_code(), 400);
        assert_eq!(AuthError::incorrect_credentials().status_code(), 401);
        assert_eq!(AuthError::InvalidToken.status_code(), 401);
        assert_eq!(AuthError::Forbidden.status_code(), 403);
        assert_eq!(AuthError::NotFound("gone".into()).status_code(), 404);
        assert_eq!(AuthError::TokenInvalidOrExpired.status_code(), 400);
        assert_eq!(AuthError::ExternalService("down".into()).status_code(), 500);
    }

    #[test]
    fn test_response_body() {
        let body = AuthError::Forbidden.to_response_body();
        assert_eq!(body["status"], "fail");
        assert_eq!(
            body["message"],
            "You do not have permission to perform this action"
        );

        let body = AuthError::ExternalService("Try again later!".into()).to_response_body();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Try again later!");
    }
}
