//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared
//! resources like the store and the tutoring services, and the registry of
//! logged-in sessions.

use crate::config::Config;
use neurogym_core::{SessionContext, TutorController, identity::IdentityService, store::TutorStore};
use rand::{Rng, distr::Alphanumeric};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::debug;

const SESSION_TOKEN_LENGTH: usize = 48;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TutorStore>,
    pub identity: Arc<IdentityService>,
    pub controller: Arc<TutorController>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

/// Why a session could not be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutError {
    #[error("Unknown or expired session token")]
    UnknownToken,
    #[error("This session is already open in another chat connection")]
    InUse,
}

enum Slot {
    Available(SessionContext),
    CheckedOut { email: String },
}

impl Slot {
    fn email(&self) -> &str {
        match self {
            Slot::Available(ctx) => &ctx.profile.email,
            Slot::CheckedOut { email } => email,
        }
    }
}

/// Maps session tokens to the conversation state of logged-in users.
///
/// A context is owned by one caller at a time: a chat connection checks it
/// out and must check it back in when it closes. Contexts left idle for
/// longer than the idle timeout are forgotten; checked-out ones never are.
pub struct SessionRegistry {
    slots: Mutex<HashMap<String, Entry>>,
    idle_timeout: Duration,
}

struct Entry {
    slot: Slot,
    last_used: Instant,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Stores a freshly logged-in context and returns its token.
    pub async fn open(&self, ctx: SessionContext) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        let mut slots = self.slots.lock().await;
        self.evict_idle(&mut slots);
        slots.insert(
            token.clone(),
            Entry {
                slot: Slot::Available(ctx),
                last_used: Instant::now(),
            },
        );
        token
    }

    /// The email of the user owning `token`, whether or not it is checked out.
    pub async fn email_for(&self, token: &str) -> Option<String> {
        let mut slots = self.slots.lock().await;
        self.evict_idle(&mut slots);
        let entry = slots.get_mut(token)?;
        entry.last_used = Instant::now();
        Some(entry.slot.email().to_string())
    }

    pub async fn checkout(&self, token: &str) -> Result<SessionContext, CheckoutError> {
        let mut slots = self.slots.lock().await;
        self.evict_idle(&mut slots);
        let entry = slots.get_mut(token).ok_or(CheckoutError::UnknownToken)?;
        entry.last_used = Instant::now();
        let email = entry.slot.email().to_string();
        match std::mem::replace(&mut entry.slot, Slot::CheckedOut { email }) {
            Slot::Available(ctx) => Ok(ctx),
            Slot::CheckedOut { .. } => Err(CheckoutError::InUse),
        }
    }

    /// Returns a context. Dropped if the token was closed in the meantime.
    pub async fn checkin(&self, token: &str, ctx: SessionContext) {
        if let Some(entry) = self.slots.lock().await.get_mut(token) {
            entry.slot = Slot::Available(ctx);
            entry.last_used = Instant::now();
        }
    }

    /// Forgets the token. Returns false if it was unknown.
    pub async fn close(&self, token: &str) -> bool {
        self.slots.lock().await.remove(token).is_some()
    }

    fn evict_idle(&self, slots: &mut HashMap<String, Entry>) {
        let before = slots.len();
        slots.retain(|_, entry| {
            matches!(entry.slot, Slot::CheckedOut { .. })
                || entry.last_used.elapsed() < self.idle_timeout
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            debug!(evicted, remaining = slots.len(), "Evicted idle sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurogym_core::{ConversationStage, models::UserProfile};

    fn context(email: &str) -> SessionContext {
        SessionContext::new(
            UserProfile {
                email: email.to_string(),
                name: "Ana".to_string(),
                age: 14,
                xp: 10,
            },
            vec![],
        )
    }

    #[tokio::test]
    async fn test_checkout_is_exclusive() {
        let registry = SessionRegistry::new();
        let token = registry.open(context("ana@example.com")).await;
        assert_eq!(token.len(), SESSION_TOKEN_LENGTH);

        let mut ctx = registry.checkout(&token).await.unwrap();
        assert_eq!(
            registry.checkout(&token).await.unwrap_err(),
            CheckoutError::InUse
        );
        assert_eq!(
            registry.email_for(&token).await.as_deref(),
            Some("ana@example.com")
        );

        ctx.stage = ConversationStage::CasualChat;
        registry.checkin(&token, ctx).await;
        let ctx = registry.checkout(&token).await.unwrap();
        assert_eq!(ctx.stage, ConversationStage::CasualChat);
    }

    #[tokio::test]
    async fn test_close_forgets_token() {
        let registry = SessionRegistry::new();
        let token = registry.open(context("ana@example.com")).await;
        let ctx = registry.checkout(&token).await.unwrap();

        assert!(registry.close(&token).await);
        assert!(!registry.close(&token).await);
        registry.checkin(&token, ctx).await;

        assert_eq!(registry.email_for(&token).await, None);
        assert_eq!(
            registry.checkout(&token).await.unwrap_err(),
            CheckoutError::UnknownToken
        );
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let timeout = Duration::from_millis(50);
        let registry = SessionRegistry::with_idle_timeout(timeout);
        let idle = registry.open(context("ana@example.com")).await;
        tokio::time::sleep(timeout * 2).await;

        let busy = registry.open(context("bob@example.com")).await;
        let ctx = registry.checkout(&busy).await.unwrap();
        assert_eq!(
            registry.checkout(&idle).await.unwrap_err(),
            CheckoutError::UnknownToken
        );

        // A checked-out context outlives the timeout.
        tokio::time::sleep(timeout * 2).await;
        assert_eq!(
            registry.email_for(&busy).await.as_deref(),
            Some("bob@example.com")
        );

        registry.checkin(&busy, ctx).await;
        tokio::time::sleep(timeout * 2).await;
        assert_eq!(registry.email_for(&busy).await, None);
    }

    #[tokio::test]
    async fn test_active_sessions_are_kept() {
        let registry = SessionRegistry::new();
        let first = registry.open(context("ana@example.com")).await;
        for _ in 0..3 {
            registry.open(context("bob@example.com")).await;
        }
        assert!(registry.checkout(&first).await.is_ok());
        assert_eq!(registry.slots.lock().await.len(), 4);
    }
}
