use crate::modules::utils::time::format_duration;

/// Path prefix of the reset endpoint; the token is the final segment
pub const RESET_PATH: &str = "/api/v1/users/resetPassword";

/// Build the reset link sent to the user
pub fn reset_url(origin: &str, token: &str) -> String {
    format!("{}{}/{}", origin.trim_end_matches('/'), RESET_PATH, token)
}

pub fn reset_subject(ttl: u64) -> String {
    format!("Your password reset token (valid for {})", format_duration(ttl))
}

/// Body of the password reset email
pub fn reset_message(url: &str, ttl: u64) -> String {
    format!(
        "Forgot your password? Submit a PATCH request with your new password and \
        passwordConfirm to: {}\n\
        \n\
        This link will expire in {}.\n\
        \n\
        If you didn't forget your password, please ignore this email!",
        url,
        format_duration(ttl)
    )
}
