//! Session/Identity Manager
//!
//! Registers accounts, verifies credentials and hands out the per-login
//! `SessionContext` the flow controller operates on.

use crate::{
    error::{TutorError, TutorResult},
    flow::SessionContext,
    models::{PasswordReset, User, WELCOME_BONUS_XP},
    store::TutorStore,
};
use chrono::{Duration, Utc};
use rand::{Rng, distr::Alphanumeric};
use std::sync::Arc;
use tokio::task;
use tracing::{info, warn};

const RESET_TOKEN_LEN: usize = 43;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Credentials and profile fields submitted at registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub age: u32,
    pub email: String,
    pub password: String,
}

pub struct IdentityService {
    store: Arc<dyn TutorStore>,
    hash_cost: u32,
}

impl IdentityService {
    pub fn new(store: Arc<dyn TutorStore>) -> Self {
        Self::with_hash_cost(store, bcrypt::DEFAULT_COST)
    }

    /// Uses a custom bcrypt cost. Low costs are only meant for tests.
    pub fn with_hash_cost(store: Arc<dyn TutorStore>, hash_cost: u32) -> Self {
        Self { store, hash_cost }
    }

    /// Creates a user record if the email is unused.
    pub async fn register(&self, registration: Registration) -> TutorResult<User> {
        let email = normalize_email(&registration.email);
        validate_email(&email)?;
        let name = registration.name.trim().to_string();
        if name.is_empty() {
            return Err(TutorError::InvalidInput("name must not be empty".to_string()));
        }
        if registration.age == 0 {
            return Err(TutorError::InvalidInput(
                "age must be a positive number".to_string(),
            ));
        }
        if registration.password.is_empty() {
            return Err(TutorError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }

        if self.store.find_user(&email).await?.is_some() {
            return Err(TutorError::DuplicateEmail(email));
        }

        let user = User {
            email: email.clone(),
            password_hash: self.hash(&registration.password).await?,
            name,
            age: registration.age,
            xp: WELCOME_BONUS_XP,
            created_at: Utc::now(),
        };
        // The store has the final say if two registrations race.
        if !self.store.create_user(&user).await? {
            return Err(TutorError::DuplicateEmail(email));
        }

        info!(email = %user.email, "Registered new user");
        Ok(user)
    }

    /// Verifies credentials and builds a session context with the stored
    /// chat history.
    pub async fn login(&self, email: &str, password: &str) -> TutorResult<SessionContext> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_user(&email)
            .await?
            .ok_or(TutorError::InvalidCredentials)?;

        let (password, stored_hash) = (password.to_string(), user.password_hash.clone());
        let matches = task::spawn_blocking(move || bcrypt::verify(password, &stored_hash))
            .await
            .map_err(|e| TutorError::ExternalServiceFailure(anyhow::Error::new(e)))?
            .unwrap_or_else(|e| {
                warn!(email = %email, error = %e, "Stored password hash could not be verified");
                false
            });
        if !matches {
            return Err(TutorError::InvalidCredentials);
        }

        let history = self.store.load_history(&email).await?;
        info!(email = %email, history_len = history.len(), "User logged in");
        Ok(SessionContext::new(user.profile(), history))
    }

    /// Issues a single-use reset token valid for one hour. Returns `None`
    /// when no account exists for the email.
    pub async fn request_password_reset(&self, email: &str) -> TutorResult<Option<String>> {
        let email = normalize_email(email);
        if self.store.find_user(&email).await?.is_none() {
            return Ok(None);
        }

        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();
        let now = Utc::now();
        self.store
            .save_reset_token(&PasswordReset {
                token: token.clone(),
                email: email.clone(),
                expires_at: now + Duration::hours(RESET_TOKEN_TTL_HOURS),
                used: false,
                created_at: now,
            })
            .await?;

        info!(email = %email, "Issued password reset token");
        Ok(Some(token))
    }

    /// Replaces the password of the account a valid token was issued for.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> TutorResult<()> {
        if new_password.is_empty() {
            return Err(TutorError::InvalidInput(
                "password must not be empty".to_string(),
            ));
        }
        let reset = self
            .store
            .find_reset_token(token)
            .await?
            .filter(|r| r.is_valid_at(Utc::now()))
            .ok_or(TutorError::InvalidResetToken)?;

        let hash = self.hash(new_password).await?;
        self.store.update_password(&reset.email, &hash).await?;
        self.store.mark_reset_token_used(token).await?;
        info!(email = %reset.email, "Password reset");
        Ok(())
    }

    /// Hashes on the blocking pool.
    async fn hash(&self, password: &str) -> TutorResult<String> {
        let (password, cost) = (password.to_string(), self.hash_cost);
        task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| TutorError::ExternalServiceFailure(anyhow::Error::new(e)))?
            .map_err(|e| TutorError::ExternalServiceFailure(anyhow::Error::new(e)))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> TutorResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(TutorError::InvalidInput(format!(
            "'{}' is not a valid email address",
            email
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const TEST_HASH_COST: u32 = 4;

    fn service() -> (IdentityService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            IdentityService::with_hash_cost(store.clone(), TEST_HASH_COST),
            store,
        )
    }

    fn ana() -> Registration {
        Registration {
            name: "Ana".to_string(),
            age: 14,
            email: "ana@example.com".to_string(),
            password: "s3cret".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login_returns_same_identity() {
        let (identity, _) = service();
        let user = identity.register(ana()).await.unwrap();
        assert_eq!(user.xp, WELCOME_BONUS_XP);
        assert_ne!(user.password_hash, "s3cret");

        let session = identity.login("ana@example.com", "s3cret").await.unwrap();
        assert_eq!(session.profile, user.profile());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_leaves_the_runtime_free() {
        let store = Arc::new(MemoryStore::new());
        let identity = IdentityService::with_hash_cost(store, 10);
        let register = identity.register(ana());
        tokio::pin!(register);
        tokio::select! {
            biased;
            _ = &mut register => panic!("registration finished before the timer fired"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => {}
        }
        register.await.unwrap();
    }

    #[tokio::test]
    async fn test_login_normalizes_email() {
        let (identity, _) = service();
        identity.register(ana()).await.unwrap();
        let session = identity.login("  Ana@Example.com ", "s3cret").await.unwrap();
        assert_eq!(session.profile.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_duplicate_email_leaves_existing_user_untouched() {
        let (identity, store) = service();
        identity.register(ana()).await.unwrap();

        let err = identity
            .register(Registration {
                name: "Someone Else".to_string(),
                age: 30,
                email: "ANA@example.com".to_string(),
                password: "other".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::DuplicateEmail(_)));

        let stored = store.find_user("ana@example.com").await.unwrap().unwrap();
        assert_eq!(stored.name, "Ana");
        assert_eq!(stored.age, 14);
        assert!(identity.login("ana@example.com", "s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn test_login_failures_are_invalid_credentials() {
        let (identity, _) = service();
        identity.register(ana()).await.unwrap();

        let wrong_password = identity.login("ana@example.com", "nope").await.unwrap_err();
        assert!(matches!(wrong_password, TutorError::InvalidCredentials));

        let unknown = identity.login("bob@example.com", "s3cret").await.unwrap_err();
        assert!(matches!(unknown, TutorError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (identity, _) = service();
        let mut bad = ana();
        bad.email = "not-an-email".to_string();
        assert!(matches!(
            identity.register(bad).await.unwrap_err(),
            TutorError::InvalidInput(_)
        ));

        let mut bad = ana();
        bad.age = 0;
        assert!(matches!(
            identity.register(bad).await.unwrap_err(),
            TutorError::InvalidInput(_)
        ));

        let mut bad = ana();
        bad.name = "   ".to_string();
        assert!(matches!(
            identity.register(bad).await.unwrap_err(),
            TutorError::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let (identity, _) = service();
        identity.register(ana()).await.unwrap();

        assert!(
            identity
                .request_password_reset("nobody@example.com")
                .await
                .unwrap()
                .is_none()
        );

        let token = identity
            .request_password_reset("ana@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(token.len(), RESET_TOKEN_LEN);

        identity.reset_password(&token, "n3w").await.unwrap();
        assert!(identity.login("ana@example.com", "n3w").await.is_ok());
        assert!(matches!(
            identity.login("ana@example.com", "s3cret").await.unwrap_err(),
            TutorError::InvalidCredentials
        ));

        // Tokens are single use.
        assert!(matches!(
            identity.reset_password(&token, "again").await.unwrap_err(),
            TutorError::InvalidResetToken
        ));
    }
}
