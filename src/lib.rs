// First, declare the modules folder itself
mod modules;

// Re-export everything from modules for easier access
pub use modules::{auth, config, email, utils};

// Re-export commonly used types
pub use modules::auth::errors::AuthError;
pub use modules::auth::service::AccountService;
pub use modules::auth::store::{Principal, Role, UserStore};
pub use modules::config::AuthConfig;
pub use modules::email::Mailer;

// Constants
pub const USERS_FILE: &str = "users.json";
pub const SESSION_COOKIE_NAME: &str = "jwt";
pub const BEARER_PREFIX: &str = "Bearer ";
pub const RESET_TOKEN_DURATION: u64 = 600;
pub const PASSWORD_HASH_ROUNDS: u32 = 100_000;
pub const MIN_PASSWORD_LENGTH: usize = 8;

// Type aliases
pub type HmacSha256 = hmac::Hmac<sha2::Sha256>;
