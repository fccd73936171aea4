pub mod errors;
pub mod guard;
pub mod jwt;
pub mod password;
pub mod service;
pub mod store;
pub mod tokens;
pub mod transport;

// Re-export the main types and functions
pub use errors::AuthError;
pub use guard::{authorize, extract_bearer, restrict_to, RoleGate, SessionGuard};
pub use jwt::{SessionClaims, TokenCodec};
pub use password::{validate_password, CredentialVerifier, PasswordError};
pub use service::{AccountService, SignupRequest};
pub use store::{
    JsonFileUserStore, MemoryUserStore, NewPrincipal, Principal, PublicPrincipal, Role,
    SaveOptions, StoreError, UserStore,
};
pub use tokens::{generate_reset_token, hash_reset_token, PasswordResetManager};
pub use transport::{AuthSession, SessionCookie};
