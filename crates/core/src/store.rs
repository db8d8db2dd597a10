//! Persistence Boundary
//!
//! The tutoring core reads and writes its records through the `TutorStore`
//! trait. The API service provides a PostgreSQL implementation; `MemoryStore`
//! keeps everything in process and backs local development and tests.

use crate::models::{Answer, ChatMessage, PasswordReset, Quiz, Topic, User};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Collections consumed by the tutoring core: users, chats, topics, quizzes,
/// answers and password resets.
#[async_trait]
pub trait TutorStore: Send + Sync {
    /// Inserts a user. Returns `false` without touching the existing record
    /// when the email is already taken.
    async fn create_user(&self, user: &User) -> Result<bool>;

    async fn find_user(&self, email: &str) -> Result<Option<User>>;

    /// Adds `amount` XP to a user and returns the new total.
    async fn add_xp(&self, email: &str, amount: i64) -> Result<i64>;

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<()>;

    /// Stores a reset token, dropping any earlier tokens for the same email.
    async fn save_reset_token(&self, reset: &PasswordReset) -> Result<()>;

    async fn find_reset_token(&self, token: &str) -> Result<Option<PasswordReset>>;

    async fn mark_reset_token_used(&self, token: &str) -> Result<()>;

    async fn append_messages(&self, email: &str, messages: &[ChatMessage]) -> Result<()>;

    /// Full chat history for a user, oldest first.
    async fn load_history(&self, email: &str) -> Result<Vec<ChatMessage>>;

    async fn replace_history(&self, email: &str, messages: &[ChatMessage]) -> Result<()>;

    async fn create_topic(&self, topic: &Topic) -> Result<()>;

    /// Topics owned by a user, oldest first.
    async fn list_topics(&self, email: &str) -> Result<Vec<Topic>>;

    async fn create_quiz(&self, quiz: &Quiz) -> Result<()>;

    /// Removes a quiz that was never shown to the student.
    async fn delete_quiz(&self, quiz_id: Uuid) -> Result<()>;

    async fn find_quiz(&self, quiz_id: Uuid) -> Result<Option<Quiz>>;

    async fn list_quizzes(&self, topic_id: Uuid) -> Result<Vec<Quiz>>;

    /// Inserts an answer. Returns `false` without touching the existing record
    /// when the user already answered that question of the quiz.
    async fn record_answer(&self, answer: &Answer) -> Result<bool>;

    async fn list_answers_for_user(&self, email: &str) -> Result<Vec<Answer>>;

    async fn list_answers_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Answer>>;
}

#[derive(Default)]
struct Collections {
    users: HashMap<String, User>,
    resets: Vec<PasswordReset>,
    chats: HashMap<String, Vec<ChatMessage>>,
    topics: Vec<Topic>,
    quizzes: Vec<Quiz>,
    answers: Vec<Answer>,
}

/// An in-process `TutorStore`.
///
/// Insertion order is preserved for every collection, which gives the same
/// "oldest first" ordering the SQL backend gets from `created_at`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TutorStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.users.contains_key(&user.email) {
            return Ok(false);
        }
        inner.users.insert(user.email.clone(), user.clone());
        Ok(true)
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        Ok(self.inner.lock().await.users.get(email).cloned())
    }

    async fn add_xp(&self, email: &str, amount: i64) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .get_mut(email)
            .ok_or_else(|| anyhow!("user '{}' does not exist", email))?;
        user.xp += amount;
        Ok(user.xp)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let user = inner
            .users
            .get_mut(email)
            .ok_or_else(|| anyhow!("user '{}' does not exist", email))?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn save_reset_token(&self, reset: &PasswordReset) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.resets.retain(|r| r.email != reset.email);
        inner.resets.push(reset.clone());
        Ok(())
    }

    async fn find_reset_token(&self, token: &str) -> Result<Option<PasswordReset>> {
        let inner = self.inner.lock().await;
        Ok(inner.resets.iter().find(|r| r.token == token).cloned())
    }

    async fn mark_reset_token_used(&self, token: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(reset) = inner.resets.iter_mut().find(|r| r.token == token) {
            reset.used = true;
        }
        Ok(())
    }

    async fn append_messages(&self, email: &str, messages: &[ChatMessage]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .chats
            .entry(email.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn load_history(&self, email: &str) -> Result<Vec<ChatMessage>> {
        let inner = self.inner.lock().await;
        Ok(inner.chats.get(email).cloned().unwrap_or_default())
    }

    async fn replace_history(&self, email: &str, messages: &[ChatMessage]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.chats.insert(email.to_string(), messages.to_vec());
        Ok(())
    }

    async fn create_topic(&self, topic: &Topic) -> Result<()> {
        self.inner.lock().await.topics.push(topic.clone());
        Ok(())
    }

    async fn list_topics(&self, email: &str) -> Result<Vec<Topic>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .topics
            .iter()
            .filter(|t| t.user_email == email)
            .cloned()
            .collect())
    }

    async fn create_quiz(&self, quiz: &Quiz) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.topics.iter().any(|t| t.id == quiz.topic_id) {
            return Err(anyhow!("topic '{}' does not exist", quiz.topic_id));
        }
        inner.quizzes.push(quiz.clone());
        Ok(())
    }

    async fn delete_quiz(&self, quiz_id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.quizzes.retain(|q| q.id != quiz_id);
        inner.answers.retain(|a| a.quiz_id != quiz_id);
        Ok(())
    }

    async fn find_quiz(&self, quiz_id: Uuid) -> Result<Option<Quiz>> {
        let inner = self.inner.lock().await;
        Ok(inner.quizzes.iter().find(|q| q.id == quiz_id).cloned())
    }

    async fn list_quizzes(&self, topic_id: Uuid) -> Result<Vec<Quiz>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .quizzes
            .iter()
            .filter(|q| q.topic_id == topic_id)
            .cloned()
            .collect())
    }

    async fn record_answer(&self, answer: &Answer) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !inner.quizzes.iter().any(|q| q.id == answer.quiz_id) {
            return Err(anyhow!("quiz '{}' does not exist", answer.quiz_id));
        }
        let answered = inner.answers.iter().any(|a| {
            a.quiz_id == answer.quiz_id
                && a.user_email == answer.user_email
                && a.question_index == answer.question_index
        });
        if answered {
            return Ok(false);
        }
        inner.answers.push(answer.clone());
        Ok(true)
    }

    async fn list_answers_for_user(&self, email: &str) -> Result<Vec<Answer>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .answers
            .iter()
            .filter(|a| a.user_email == email)
            .cloned()
            .collect())
    }

    async fn list_answers_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Answer>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .answers
            .iter()
            .filter(|a| a.quiz_id == quiz_id)
            .cloned()
            .collect())
    }
}
