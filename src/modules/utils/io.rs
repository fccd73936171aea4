/// Helper function to validate email format
pub fn is_valid_email(email: &str) -> bool {
    // Basic email validation
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
        && email.chars().filter(|&c| c == '@').count() == 1
        && email.len() >= 5
}

/// Lowercase and trim an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        // Valid emails
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("user.name@example.co.uk"));
        assert!(is_valid_email("user+tag@example.com"));

        // Invalid emails
        assert!(!is_valid_email("user@example")); // Missing TLD
        assert!(!is_valid_email("user example.com")); // Contains space
        assert!(!is_valid_email("user")); // No @ symbol
        assert!(!is_valid_email("")); // Empty string
        assert!(!is_valid_email("user@@example.com")); // Multiple @ symbols
        assert!(!is_valid_email("@example.com")); // Empty local part
    }

    #[test]
    fn test_email_normalization() {
        assert_eq!(normalize_email("  A@X.com "), "a@x.com");
    }
}
