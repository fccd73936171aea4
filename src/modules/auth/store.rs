use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::errors::AuthError;
use crate::modules::utils::io::{is_valid_email, normalize_email};
use crate::modules::utils::logging::log_data_operation;
use crate::modules::utils::time::get_current_timestamp;

/// Roles a principal can hold. Serialized in kebab-case (`lead-guide`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" | "lead" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// A user record as held by the store.
///
/// `password_hash` is `None` whenever the record was loaded without its
/// secret; saving such a record leaves the stored hash untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub password_changed_at: Option<u64>,
    #[serde(default)]
    pub password_reset_token: Option<String>,
    #[serde(default)]
    pub password_reset_expires: Option<u64>,
    pub created_at: u64,
}

impl Principal {
    /// True when the password changed after a token issued at `issued_at`
    pub fn changed_password_after(&self, issued_at: u64) -> bool {
        self.password_changed_at
            .map(|changed_at| issued_at < changed_at)
            .unwrap_or(false)
    }

    pub fn clear_password_reset(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }

    /// The representation handed to clients; secrets are dropped
    pub fn to_public(&self) -> PublicPrincipal {
        PublicPrincipal {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            password_changed_at: self.password_changed_at,
            created_at: self.created_at,
        }
    }

    fn without_secret(mut self) -> Self {
        self.password_hash = None;
        self
    }
}

/// Outward view of a principal
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicPrincipal {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<u64>,
    pub created_at: u64,
}

/// Fields needed to create a principal
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub name: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Run field validation before writing. Reset-token bookkeeping skips it.
    pub validate: bool,
}

impl SaveOptions {
    pub const VALIDATE: SaveOptions = SaveOptions { validate: true };
    pub const SKIP_VALIDATION: SaveOptions = SaveOptions { validate: false };
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("email address is already in use")]
    DuplicateEmail,
    #[error("no principal with id {0}")]
    Missing(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("reset token already redeemed")]
    ResetTokenSpent,
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => AuthError::Validation(message),
            StoreError::DuplicateEmail => AuthError::Validation(
                "Email address is already in use. Please use another one!".to_string(),
            ),
            StoreError::ResetTokenSpent => AuthError::TokenInvalidOrExpired,
            StoreError::Missing(_) | StoreError::Unavailable(_) => AuthError::ExternalService(
                "Something went wrong. Please try again later.".to_string(),
            ),
        }
    }
}

/// The narrow persistence interface the authentication core relies on
pub trait UserStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<Principal>, StoreError>;

    /// Look up by email; the password hash is only loaded when `include_secret` is set
    fn find_by_email(
        &self,
        email: &str,
        include_secret: bool,
    ) -> Result<Option<Principal>, StoreError>;

    /// Find the principal holding this reset-token hash with an expiry after `now`
    fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<Principal>, StoreError>;

    fn create(&self, fields: NewPrincipal) -> Result<Principal, StoreError>;

    fn save(&self, principal: &Principal, options: SaveOptions) -> Result<(), StoreError>;

    /// Save only while `token_hash` is still the stored reset token, so a
    /// reset token can be redeemed once even under concurrent requests.
    fn save_redeeming(
        &self,
        principal: &Principal,
        token_hash: &str,
        options: SaveOptions,
    ) -> Result<(), StoreError>;
}

type Records = HashMap<String, Principal>;

fn generate_object_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn validate_fields(name: Option<&str>, email: &str) -> Result<(), StoreError> {
    if email.trim().is_empty() {
        return Err(StoreError::Validation(
            "Please provide your email".to_string(),
        ));
    }
    if !is_valid_email(email) {
        return Err(StoreError::Validation(
            "Please provide a valid email".to_string(),
        ));
    }
    if matches!(name, Some(n) if n.trim().is_empty()) {
        return Err(StoreError::Validation(
            "Please tell us your name".to_string(),
        ));
    }
    Ok(())
}

fn email_taken(records: &Records, email: &str, except_id: Option<&str>) -> bool {
    records
        .values()
        .any(|p| p.email == email && Some(p.id.as_str()) != except_id)
}

fn insert_new(records: &mut Records, fields: NewPrincipal) -> Result<Principal, StoreError> {
    let email = normalize_email(&fields.email);
    validate_fields(fields.name.as_deref(), &email)?;
    if fields.password_hash.is_empty() {
        return Err(StoreError::Validation(
            "Please provide a password".to_string(),
        ));
    }
    if email_taken(records, &email, None) {
        return Err(StoreError::DuplicateEmail);
    }

    let mut id = generate_object_id();
    while records.contains_key(&id) {
        id = generate_object_id();
    }

    let principal = Principal {
        id: id.clone(),
        name: fields.name.map(|n| n.trim().to_string()),
        email,
        role: fields.role,
        password_hash: Some(fields.password_hash),
        password_changed_at: None,
        password_reset_token: None,
        password_reset_expires: None,
        created_at: get_current_timestamp(),
    };
    records.insert(id, principal.clone());
    Ok(principal.without_secret())
}

fn update_existing(
    records: &mut Records,
    principal: &Principal,
    options: SaveOptions,
    redeeming: Option<&str>,
) -> Result<(), StoreError> {
    let existing = records
        .get(&principal.id)
        .ok_or_else(|| StoreError::Missing(principal.id.clone()))?;
    if let Some(token_hash) = redeeming {
        if existing.password_reset_token.as_deref() != Some(token_hash) {
            return Err(StoreError::ResetTokenSpent);
        }
    }

    let mut updated = principal.clone();
    updated.email = normalize_email(&updated.email);
    if options.validate {
        validate_fields(updated.name.as_deref(), &updated.email)?;
        if email_taken(records, &updated.email, Some(&updated.id)) {
            return Err(StoreError::DuplicateEmail);
        }
    }
    if updated.password_hash.is_none() {
        updated.password_hash = existing.password_hash.clone();
    }

    records.insert(updated.id.clone(), updated);
    Ok(())
}

/// In-memory store. Each call holds the lock only for its own duration.
#[derive(Default)]
pub struct MemoryUserStore {
    records: Mutex<Records>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_records(records: Records) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Apply `change` to a copy of the records, run `commit` on the copy and
    /// only then make it visible. A failing change or commit leaves the
    /// store as it was.
    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Records) -> Result<T, StoreError>,
        commit: impl FnOnce(&Records) -> Result<(), StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.records.lock();
        let mut next = guard.clone();
        let value = change(&mut next)?;
        commit(&next)?;
        *guard = next;
        Ok(value)
    }
}

impl UserStore for MemoryUserStore {
    fn find_by_id(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .records
            .lock()
            .get(id)
            .cloned()
            .map(Principal::without_secret))
    }

    fn find_by_email(
        &self,
        email: &str,
        include_secret: bool,
    ) -> Result<Option<Principal>, StoreError> {
        let email = normalize_email(email);
        let found = self
            .records
            .lock()
            .values()
            .find(|p| p.email == email)
            .cloned();
        Ok(if include_secret {
            found
        } else {
            found.map(Principal::without_secret)
        })
    }

    fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<Principal>, StoreError> {
        Ok(self
            .records
            .lock()
            .values()
            .find(|p| {
                p.password_reset_token.as_deref() == Some(token_hash)
                    && p.password_reset_expires.map(|exp| exp > now).unwrap_or(false)
            })
            .cloned()
            .map(Principal::without_secret))
    }

    fn create(&self, fields: NewPrincipal) -> Result<Principal, StoreError> {
        self.mutate(|records| insert_new(records, fields), |_| Ok(()))
    }

    fn save(&self, principal: &Principal, options: SaveOptions) -> Result<(), StoreError> {
        self.mutate(
            |records| update_existing(records, principal, options, None),
            |_| Ok(()),
        )
    }

    fn save_redeeming(
        &self,
        principal: &Principal,
        token_hash: &str,
        options: SaveOptions,
    ) -> Result<(), StoreError> {
        self.mutate(
            |records| update_existing(records, principal, options, Some(token_hash)),
            |_| Ok(()),
        )
    }
}

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    users: Vec<Principal>,
}

/// Store persisted as a JSON document. Every write replaces the file
/// atomically; the in-memory copy only changes once the file is on disk.
pub struct JsonFileUserStore {
    path: PathBuf,
    inner: MemoryUserStore,
}

impl JsonFileUserStore {
    /// Open the store at `path`, starting empty when the file does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match fs::read_to_string(&path) {
            Ok(contents) => {
                let file: StoreFile = serde_json::from_str(&contents).map_err(|e| {
                    StoreError::Unavailable(format!("failed to parse {}: {}", path.display(), e))
                })?;
                file.users
                    .into_iter()
                    .map(|p| (p.id.clone(), p))
                    .collect::<Records>()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            inner: MemoryUserStore::with_records(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(path: &Path, records: &Records) -> Result<(), StoreError> {
        let mut users: Vec<Principal> = records.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let data = serde_json::to_string_pretty(&StoreFile { users })
            .map_err(|e| StoreError::Unavailable(format!("failed to serialize store: {}", e)))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let result = tempfile::NamedTempFile::new_in(&dir)
            .and_then(|mut tmp| {
                tmp.write_all(data.as_bytes())?;
                tmp.as_file().sync_all()?;
                Ok(tmp)
            })
            .and_then(|tmp| tmp.persist(path).map(|_| ()).map_err(|e| e.error));

        match result {
            Ok(()) => {
                log_data_operation("persist", &path.display().to_string(), "user_store", true, None);
                Ok(())
            }
            Err(e) => {
                log_data_operation(
                    "persist",
                    &path.display().to_string(),
                    "user_store",
                    false,
                    Some(&e.to_string()),
                );
                Err(StoreError::Unavailable(format!(
                    "failed to write {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

impl UserStore for JsonFileUserStore {
    fn find_by_id(&self, id: &str) -> Result<Option<Principal>, StoreError> {
        self.inner.find_by_id(id)
    }

    fn find_by_email(
        &self,
        email: &str,
        include_secret: bool,
    ) -> Result<Option<Principal>, StoreError> {
        self.inner.find_by_email(email, include_secret)
    }

    fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: u64,
    ) -> Result<Option<Principal>, StoreError> {
        self.inner.find_by_reset_token(token_hash, now)
    }

    fn create(&self, fields: NewPrincipal) -> Result<Principal, StoreError> {
        self.inner.mutate(
            |records| insert_new(records, fields),
            |records| Self::write_file(&self.path, records),
        )
    }

    fn save(&self, principal: &Principal, options: SaveOptions) -> Result<(), StoreError> {
        self.inner.mutate(
            |records| update_existing(records, principal, options, None),
            |records| Self::write_file(&self.path, records),
        )
    }

    fn save_redeeming(
        &self,
        principal: &Principal,
        token_hash: &str,
        options: SaveOptions,
    ) -> Result<(), StoreError> {
        self.inner.mutate(
            |records| update_existing(records, principal, options, Some(token_hash)),
            |records| Self::write_file(&self.path, records),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_principal(email: &str) -> NewPrincipal {
        NewPrincipal {
            name: Some("Test User".to_string()),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn test_create_and_lookup() {
        let store = MemoryUserStore::new();
        let created = store.create(new_principal("Test@Example.com")).unwrap();

        assert_eq!(created.email, "test@example.com");
        assert_eq!(created.id.len(), 24);
        assert!(created.password_hash.is_none());

        let by_id = store.find_by_id(&created.id).unwrap().unwrap();
        assert!(by_id.password_hash.is_none());

        let with_secret = store
            .find_by_email("TEST@example.com", true)
            .unwrap()
            .unwrap();
        assert_eq!(with_secret.password_hash.as_deref(), Some("hash"));

        let without_secret = store
            .find_by_email("test@example.com", false)
            .unwrap()
            .unwrap();
        assert!(without_secret.password_hash.is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = MemoryUserStore::new();
        store.create(new_principal("a@x.com")).unwrap();
        assert_eq!(
            store.create(new_principal("A@X.com")).unwrap_err(),
            StoreError::DuplicateEmail
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_validates_fields() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.create(new_principal("not-an-email")),
            Err(StoreError::Validation(_))
        ));

        let mut blank_name = new_principal("a@x.com");
        blank_name.name = Some("  ".to_string());
        assert!(matches!(
            store.create(blank_name),
            Err(StoreError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_save_keeps_hash_when_not_loaded() {
        let store = MemoryUserStore::new();
        let mut principal = store.create(new_principal("a@x.com")).unwrap();
        principal.password_reset_token = Some("digest".to_string());
        principal.password_reset_expires = Some(500);

        store.save(&principal, SaveOptions::SKIP_VALIDATION).unwrap();

        let stored = store.find_by_email("a@x.com", true).unwrap().unwrap();
        assert_eq!(stored.password_hash.as_deref(), Some("hash"));
        assert_eq!(stored.password_reset_token.as_deref(), Some("digest"));
    }

    #[test]
    fn test_save_validation_toggle() {
        let store = MemoryUserStore::new();
        let mut principal = store.create(new_principal("a@x.com")).unwrap();
        principal.email = "broken".to_string();

        assert!(matches!(
            store.save(&principal, SaveOptions::VALIDATE),
            Err(StoreError::Validation(_))
        ));
        assert!(store.save(&principal, SaveOptions::SKIP_VALIDATION).is_ok());
    }

    #[test]
    fn test_save_unknown_principal() {
        let store = MemoryUserStore::new();
        let mut principal = store.create(new_principal("a@x.com")).unwrap();
        principal.id = "missing".to_string();
        assert_eq!(
            store.save(&principal, SaveOptions::VALIDATE).unwrap_err(),
            StoreError::Missing("missing".to_string())
        );
    }

    #[test]
    fn test_find_by_reset_token_respects_expiry() {
        let store = MemoryUserStore::new();
        let mut principal = store.create(new_principal("a@x.com")).unwrap();
        principal.password_reset_token = Some("digest".to_string());
        principal.password_reset_expires = Some(1_000);
        store.save(&principal, SaveOptions::SKIP_VALIDATION).unwrap();

        assert!(store.find_by_reset_token("digest", 999).unwrap().is_some());
        assert!(store.find_by_reset_token("digest", 1_000).unwrap().is_none());
        assert!(store.find_by_reset_token("other", 0).unwrap().is_none());
    }

    #[test]
    fn test_save_redeeming_succeeds_once() {
        let store = MemoryUserStore::new();
        let mut principal = store.create(new_principal("a@x.com")).unwrap();
        principal.password_reset_token = Some("digest".to_string());
        principal.password_reset_expires = Some(1_000);
        store.save(&principal, SaveOptions::SKIP_VALIDATION).unwrap();

        let mut first = principal.clone();
        first.clear_password_reset();
        first.password_hash = Some("first".to_string());
        let mut second = principal.clone();
        second.clear_password_reset();
        second.password_hash = Some("second".to_string());

        store
            .save_redeeming(&first, "digest", SaveOptions::VALIDATE)
            .unwrap();
        assert_eq!(
            store
                .save_redeeming(&second, "digest", SaveOptions::VALIDATE)
                .unwrap_err(),
            StoreError::ResetTokenSpent
        );

        let stored = store.find_by_email("a@x.com", true).unwrap().unwrap();
        assert_eq!(stored.password_hash.as_deref(), Some("first"));
        assert!(stored.password_reset_token.is_none());
        assert_eq!(
            AuthError::from(StoreError::ResetTokenSpent),
            AuthError::TokenInvalidOrExpired
        );
    }

    #[test]
    fn test_principal_public_view_drops_secrets() {
        let store = MemoryUserStore::new();
        let created = store.create(new_principal("a@x.com")).unwrap();
        let mut principal = store.find_by_email("a@x.com", true).unwrap().unwrap();
        principal.password_reset_token = Some("digest".to_string());
        principal.password_reset_expires = Some(1);

        let json = serde_json::to_value(principal.to_public()).unwrap();
        assert_eq!(json["id"], created.id.as_str());
        assert_eq!(json["role"], "user");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("passwordResetToken").is_none());
        assert!(json.get("passwordResetExpires").is_none());
    }

    #[test]
    fn test_changed_password_after() {
        let store = MemoryUserStore::new();
        let mut principal = store.create(new_principal("a@x.com")).unwrap();
        assert!(!principal.changed_password_after(0));

        principal.password_changed_at = Some(100);
        assert!(principal.changed_password_after(99));
        assert!(!principal.changed_password_after(100));
        assert!(!principal.changed_password_after(101));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("lead-guide".parse::<Role>().unwrap(), Role::LeadGuide);
        assert_eq!("lead".parse::<Role>().unwrap(), Role::LeadGuide);
        assert!("root".parse::<Role>().is_err());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_json_file_store_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");

        let created = {
            let store = JsonFileUserStore::open(&path).unwrap();
            let mut created = store.create(new_principal("a@x.com")).unwrap();
            created.role = Role::Admin;
            store.save(&created, SaveOptions::VALIDATE).unwrap();
            created
        };

        let reopened = JsonFileUserStore::open(&path).unwrap();
        let loaded = reopened.find_by_email("a@x.com", true).unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.role, Role::Admin);
        assert_eq!(loaded.password_hash.as_deref(), Some("hash"));
    }

    #[test]
    fn test_json_file_store_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFileUserStore::open(&path),
            Err(StoreError::Unavailable(_))
        ));
    }

    #[test]
    fn test_json_file_store_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join("users.json");
        let store = JsonFileUserStore::open(&path).unwrap();

        assert!(matches!(
            store.create(new_principal("a@x.com")),
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.find_by_email("a@x.com", false).unwrap().is_none());
    }
}
