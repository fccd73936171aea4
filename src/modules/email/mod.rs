mod smtp;
pub mod templates;

use log::info;

use crate::modules::utils::logging::format_sensitive;

pub use smtp::{SmtpCredentials, SmtpMailer};
pub use templates::{reset_message, reset_subject, reset_url};

/// Outbound message delivery. Errors are internal detail for the logs.
pub trait Mailer: Send + Sync {
    fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Writes messages to the log instead of sending them. For local use only.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn deliver(&self, recipient: &str, subject: &str, body: &str) -> Result<(), String> {
        info!(
            "Email (not sent) to={} subject={:?}\n{}",
            format_sensitive(recipient),
            subject,
            body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_mailer_always_succeeds() {
        assert!(ConsoleMailer.deliver("a@x.com", "Subject", "Body").is_ok());
    }
}
