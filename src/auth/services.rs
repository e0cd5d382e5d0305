use std::sync::Arc;

use anyhow::Context;
use argon2::Argon2;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::auth::password::{build_hasher, check_length, hash_password, verify_password};
use crate::auth::repo::UserRepo;
use crate::auth::repo_types::{User, UserId};
use crate::config::HashingConfig;
use crate::error::{AppError, AppResult};

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_.-]{3,64}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Accounts and their Argon2 verifiers.
#[derive(Clone)]
pub struct CredentialStore {
    users: Arc<dyn UserRepo>,
    argon2: Argon2<'static>,
    // verified against when the username is unknown, so both failure paths cost the same
    dummy_hash: Arc<str>,
}

impl CredentialStore {
    pub fn new(users: Arc<dyn UserRepo>, hashing: &HashingConfig) -> anyhow::Result<Self> {
        let argon2 = build_hasher(hashing)?;
        let dummy_hash = hash_password(&argon2, "timing-equalizer")?;
        Ok(Self {
            users,
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Self-service registration. Never grants admin.
    pub async fn register(&self, username: &str, password: &str) -> AppResult<UserId> {
        let user = self.create(username, password, false).await?;
        Ok(user.id)
    }

    /// Provisioning path for administrators; not reachable over HTTP.
    pub async fn register_admin(&self, username: &str, password: &str) -> AppResult<UserId> {
        let user = self.create(username, password, true).await?;
        Ok(user.id)
    }

    pub async fn verify(&self, username: &str, password: &str) -> AppResult<User> {
        check_length(password)?;

        let user = self.users.find_by_username(username).await?;
        let hash = match &user {
            Some(u) => u.password_hash.clone(),
            None => self.dummy_hash.to_string(),
        };
        let plain = password.to_owned();
        let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .context("verify task failed")??;

        match user {
            Some(u) if ok => Ok(u),
            Some(u) => {
                warn!(user_id = %u.id, "login invalid password");
                Err(AppError::InvalidCredentials)
            }
            None => {
                warn!("login unknown username");
                Err(AppError::InvalidCredentials)
            }
        }
    }

    pub async fn find(&self, id: UserId) -> AppResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(AppError::NotFound("user"))
    }

    async fn create(&self, username: &str, password: &str, is_admin: bool) -> AppResult<User> {
        if !is_valid_username(username) {
            return Err(AppError::Validation(
                "username must be 3-64 characters of letters, digits, '_', '.' or '-'".into(),
            ));
        }
        if password.is_empty() {
            return Err(AppError::Validation("password must not be empty".into()));
        }
        check_length(password)?;

        if self.users.find_by_username(username).await?.is_some() {
            warn!(username, "username already registered");
            return Err(AppError::DuplicateUsername);
        }

        let argon2 = self.argon2.clone();
        let plain = password.to_owned();
        let hash = tokio::task::spawn_blocking(move || hash_password(&argon2, &plain))
            .await
            .context("hash task failed")??;

        // the unique constraint still decides races between concurrent registrations
        let user = self.users.create(username, &hash, is_admin).await?;
        info!(user_id = %user.id, username = %user.username, is_admin, "user registered");
        Ok(user)
    }

    /// Startup bootstrap for the configured admin. An existing account is left alone.
    pub async fn ensure_admin(&self, username: &str, password: &str) -> anyhow::Result<()> {
        match self.register_admin(username, password).await {
            Ok(id) => {
                info!(user_id = %id, username, "bootstrap admin created");
                Ok(())
            }
            Err(AppError::DuplicateUsername) => {
                info!(username, "bootstrap admin already present");
                Ok(())
            }
            Err(e) => Err(anyhow::anyhow!(e).context("create bootstrap admin")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::{test_hashing, MAX_PASSWORD_BYTES};
    use crate::memory::MemoryUserRepo;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryUserRepo::default()), &test_hashing()).unwrap()
    }

    #[test]
    fn username_shape() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("bob"));
        assert!(is_valid_username("a.b-c_9"));
        assert!(!is_valid_username("al"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username(""));
    }

    #[tokio::test]
    async fn register_then_verify() {
        let store = store();
        let id = store.register("alice", "pw1").await.unwrap();
        let user = store.verify("alice", "pw1").await.unwrap();
        assert_eq!(user.id, id);
        assert!(!user.is_admin);
        assert_ne!(user.password_hash, "pw1");
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_first_password() {
        let store = store();
        let first = store.register("alice", "pw1").await.unwrap();
        assert!(matches!(
            store.register("alice", "pw2").await,
            Err(AppError::DuplicateUsername)
        ));
        assert!(matches!(
            store.verify("alice", "pw2").await,
            Err(AppError::InvalidCredentials)
        ));
        assert_eq!(store.verify("alice", "pw1").await.unwrap().id, first);
        // no second row was created: the next id continues from the first
        let bob = store.register("bob", "pw").await.unwrap();
        assert_eq!(bob.0, first.0 + 1);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_the_same() {
        let store = store();
        store.register("alice", "pw1").await.unwrap();
        let wrong = store.verify("alice", "nope").await.unwrap_err();
        let unknown = store.verify("mallory", "pw1").await.unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status(), unknown.status());
    }

    #[tokio::test]
    async fn usernames_are_case_sensitive() {
        let store = store();
        store.register("alice", "pw1").await.unwrap();
        assert!(matches!(
            store.verify("Alice", "pw1").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(store.register("Alice", "pw1").await.is_ok());
    }

    #[tokio::test]
    async fn overlong_password_is_rejected_on_both_paths() {
        let store = store();
        let long = "p".repeat(MAX_PASSWORD_BYTES + 1);
        assert!(matches!(
            store.register("alice", &long).await,
            Err(AppError::PasswordTooLong { .. })
        ));
        assert!(matches!(
            store.verify("alice", &long).await,
            Err(AppError::PasswordTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_input_is_a_validation_error() {
        let store = store();
        assert!(matches!(
            store.register("x", "pw").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            store.register("alice", "").await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admin_provisioning_is_separate_and_idempotent() {
        let store = store();
        store.ensure_admin("root", "s3cret").await.unwrap();
        store.ensure_admin("root", "other").await.unwrap();
        let admin = store.verify("root", "s3cret").await.unwrap();
        assert!(admin.is_admin);
        assert_eq!(store.find(admin.id).await.unwrap().username, "root");
        assert!(matches!(
            store.find(UserId(999)).await,
            Err(AppError::NotFound("user"))
        ));
    }
}
