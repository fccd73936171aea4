use serde::Serialize;
use serde_json::{json, Value};

use super::store::PublicPrincipal;
use crate::modules::config::AuthConfig;
use crate::modules::utils::time::format_http_date;
use crate::SESSION_COOKIE_NAME;

/// Result of every flow that logs a principal in
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthSession {
    pub principal: PublicPrincipal,
    pub token: String,
}

impl AuthSession {
    /// `{status: "success", token, data: {user}}`
    pub fn response_body(&self) -> Value {
        json!({
            "status": "success",
            "token": self.token,
            "data": { "user": self.principal },
        })
    }

    pub fn cookie(&self, config: &AuthConfig, now: u64) -> SessionCookie {
        SessionCookie::for_token(&self.token, config, now)
    }
}

/// HTTP-only cookie carrying the session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub expires_at: u64,
    pub http_only: bool,
    pub secure: bool,
}

impl SessionCookie {
    pub fn for_token(token: &str, config: &AuthConfig, now: u64) -> Self {
        Self {
            name: SESSION_COOKIE_NAME,
            value: token.to_string(),
            expires_at: now.saturating_add(config.cookie_expires_in),
            http_only: true,
            secure: config.production,
        }
    }

    /// Value for a `Set-Cookie` response header
    pub fn header_value(&self) -> String {
        let mut header = format!(
            "{}={}; Expires={}; Path=/",
            self.name,
            self.value,
            format_http_date(self.expires_at)
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }
}
