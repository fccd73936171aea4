use std::io;

use base64::{engine::general_purpose::STANDARD_NO_PAD as base64, Engine as _};
use pbkdf2::pbkdf2;
use rand::RngCore;
use thiserror::Error;

use crate::{HmacSha256, MIN_PASSWORD_LENGTH, PASSWORD_HASH_ROUNDS};

const HASH_SCHEME: &str = "pbkdf2-sha256";
const SALT_BYTES: usize = 16;
const KEY_BYTES: usize = 32;

/// Reasons a new password is refused
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Please provide a password")]
    Missing,
    #[error("Password must be at least {0} characters long")]
    TooShort(usize),
    #[error("Please confirm your password")]
    MissingConfirmation,
    #[error("Passwords are not the same!")]
    Mismatch,
}

/// Check a new password and its confirmation
pub fn validate_password(password: &str, confirmation: &str) -> Result<(), PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Missing);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort(MIN_PASSWORD_LENGTH));
    }
    confirm_password(password, confirmation)
}

/// Check only that the confirmation is present and matches
pub fn confirm_password(password: &str, confirmation: &str) -> Result<(), PasswordError> {
    if confirmation.is_empty() {
        return Err(PasswordError::MissingConfirmation);
    }
    if password != confirmation {
        return Err(PasswordError::Mismatch);
    }
    Ok(())
}

/// Helper function to read a password securely
pub fn read_password() -> io::Result<String> {
    rpassword::read_password()
}

/// Compare two byte slices without short-circuiting on the first difference
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Slow, salted password hashing (PBKDF2-HMAC-SHA256).
///
/// Hashes are encoded as `$pbkdf2-sha256$i=<rounds>$<salt>$<key>` with
/// unpadded base64, so a hash produced under one round count still verifies
/// after the configured count changes.
#[derive(Debug, Clone, Copy)]
pub struct CredentialVerifier {
    rounds: u32,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new(PASSWORD_HASH_ROUNDS)
    }
}

impl CredentialVerifier {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn hash(&self, plaintext: &str) -> String {
        let mut salt = [0u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut salt);
        let key = derive_key(plaintext, &salt, self.rounds);

        format!(
            "${}$i={}${}${}",
            HASH_SCHEME,
            self.rounds,
            base64.encode(salt),
            base64.encode(key)
        )
    }

    /// Never fails: a malformed hash simply does not match
    pub fn verify(&self, plaintext: &str, encoded: &str) -> bool {
        let Some((rounds, salt, expected)) = parse_hash(encoded) else {
            return false;
        };
        let actual = derive_key(plaintext, &salt, rounds);
        constant_time_eq(&actual, &expected)
    }
}

fn derive_key(plaintext: &str, salt: &[u8], rounds: u32) -> Vec<u8> {
    let mut key = vec![0u8; KEY_BYTES];
    pbkdf2::<HmacSha256>(plaintext.as_bytes(), salt, rounds, &mut key);
    key
}

fn parse_hash(encoded: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = encoded.strip_prefix('$')?.split('$');
    if parts.next()? != HASH_SCHEME {
        return None;
    }
    let rounds = parts.next()?.strip_prefix("i=")?.parse::<u32>().ok()?;
    let salt = base64.decode(parts.next()?).ok()?;
    let key = base64.decode(parts.next()?).ok()?;
    if parts.next().is_some() || rounds == 0 || key.len() != KEY_BYTES {
        return None;
    }
    Some((rounds, salt, key))
}
