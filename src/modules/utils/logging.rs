use env_logger::{Builder, Env, WriteStyle};
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::path::Path;

/// Initialize the logging system.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. When a log file is
/// given, records are appended to it instead of stderr.
pub fn initialize_logging(log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder
        // Enable timestamps
        .format_timestamp_secs()
        // Enable module path in logs
        .format_module_path(true)
        // Set colored output for console
        .write_style(WriteStyle::Auto);

    if let Some(path) = log_file {
        // Create or append to log file
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;

    info!("Logging system initialized");
    Ok(())
}

/// Helper function to format sensitive data for logging
pub fn format_sensitive(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Add structured logging for authentication events
pub fn log_auth_event(event_type: &str, subject: &str, success: bool, details: Option<&str>) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Auth event: type={}, subject={}, success=true, timestamp={}, details={:?}",
            event_type,
            format_sensitive(subject),
            timestamp,
            details
        );
    } else {
        warn!(
            "Auth event: type={}, subject={}, success=false, timestamp={}, details={:?}",
            event_type,
            format_sensitive(subject),
            timestamp,
            details
        );
    }
}

/// Add structured logging for data operations
pub fn log_data_operation(
    operation: &str,
    subject: &str,
    resource: &str,
    success: bool,
    details: Option<&str>,
) {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    if success {
        info!(
            "Data operation: op={}, subject={}, resource={}, success=true, timestamp={}, details={:?}",
            operation,
            format_sensitive(subject),
            resource,
            timestamp,
            details
        );
    } else {
        error!(
            "Data operation: op={}, subject={}, resource={}, success=false, timestamp={}, details={:?}",
            operation,
            format_sensitive(subject),
            resource,
            timestamp,
            details
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sensitive_data_formatting() {
        assert_eq!(format_sensitive("password"), "pa***rd");
        assert_eq!(format_sensitive("key"), "***");
        assert_eq!(format_sensitive("a@x.com"), "a@***om");
        assert_eq!(format_sensitive(""), "");
    }

    #[test]
    fn test_logging_initialization() {
        let log_file = NamedTempFile::new().unwrap();

        let result = initialize_logging(Some(log_file.path()));

        // Another test may already have installed a logger
        assert!(
            result.is_ok()
                || result
                    .unwrap_err()
                    .to_string()
                    .contains("already initialized")
        );
    }
}
