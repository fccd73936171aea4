use std::env;
use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use super::Mailer;
use crate::modules::utils::logging::format_sensitive;

const DEFAULT_SMTP_PORT: u16 = 587;

/// Structure to hold SMTP credentials
#[derive(Clone)]
pub struct SmtpCredentials {
    // The email address/username for SMTP authentication
    pub username: String,
    // The password or app-specific password for SMTP
    pub password: String,
    // SMTP server hostname (e.g., smtp.gmail.com)
    pub host: String,
    // SMTP server port (typically 587 for TLS)
    pub port: u16,
    // Display name used in the From header
    pub sender_name: String,
}

impl SmtpCredentials {
    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME` and `SMTP_PASSWORD`.
    /// Returns `None` unless host, username and password are all set.
    pub fn from_env() -> Option<Self> {
        let host = env::var("SMTP_HOST").ok()?;
        let username = env::var("SMTP_USERNAME").ok()?;
        let password = env::var("SMTP_PASSWORD").ok()?;
        let port = env::var("SMTP_PORT")
            .ok()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_SMTP_PORT);
        let sender_name = env::var("SMTP_SENDER_NAME").unwrap_or_else(|_| "Natours".to_string());

        Some(Self {
            username,
            password,
            host,
            port,
            sender_name,
        })
    }
}

impl std::fmt::Debug for SmtpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpCredentials")
            .field("username", &format_sensitive(&self.username))
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// Delivers mail through an SMTP relay with TLS required
pub struct SmtpMailer {
    creds: SmtpCredentials,
}

impl SmtpMailer {
    pub fn new(creds: SmtpCredentials) -> Self {
        Self { creds }
    }

    fn build_message(&self, to_email: &str, subject: &str, body: &str) -> Result<Message, String> {
        Message::builder()
            .from(
                format!("{} <{}>", self.creds.sender_name, self.creds.username)
                    .parse()
                    .map_err(|e| format!("Invalid from address: {}", e))?,
            )
            .to(to_email
                .parse()
                .map_err(|e| format!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| format!("Failed to create email: {}", e))
    }
}

impl Mailer for SmtpMailer {
    fn deliver(&self, to_email: &str, subject: &str, body: &str) -> Result<(), String> {
        let email = self.build_message(to_email, subject, body)?;

        // Configure TLS parameters
        let tls_parameters = TlsParameters::builder(self.creds.host.clone())
            .build()
            .map_err(|e| format!("Failed to build TLS parameters: {}", e))?;

        // Set up SMTP transport with explicit TLS configuration
        let mailer = SmtpTransport::relay(&self.creds.host)
            .map_err(|e| format!("Failed to create SMTP transport: {}", e))?
            .credentials(Credentials::new(
                self.creds.username.clone(),
                self.creds.password.clone(),
            ))
            .port(self.creds.port)
            .tls(Tls::Required(tls_parameters))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        mailer
            .send(&email)
            .map(|_| info!("Email sent to {}", format_sensitive(to_email)))
            .map_err(|e| format!("Failed to send email: {}", e))
    }
}
