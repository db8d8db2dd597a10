//! Persisted records: users, chat messages, topics, quizzes, answers and
//! password reset tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// XP granted to every freshly registered account.
pub const WELCOME_BONUS_XP: i64 = 10;
/// XP granted for each correctly answered quiz question.
pub const XP_PER_CORRECT_ANSWER: i64 = 5;
const XP_PER_LEVEL: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub age: u32,
    pub xp: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            email: self.email.clone(),
            name: self.name.clone(),
            age: self.age,
            xp: self.xp,
        }
    }
}

/// The public part of a user record, safe to hand out to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub age: u32,
    pub xp: i64,
}

/// Level for an XP total; every 100 XP is one level, starting at level 1.
pub fn level_for_xp(xp: i64) -> i64 {
    xp.max(0) / XP_PER_LEVEL + 1
}

/// XP still needed to reach the next level.
pub fn xp_to_next_level(xp: i64) -> i64 {
    level_for_xp(xp) * XP_PER_LEVEL - xp.max(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(anyhow::anyhow!("unknown message role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub user_email: String,
    pub name: String,
    /// Normalized form used for duplicate detection.
    pub normalized: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub prompt: String,
    pub choices: Vec<String>,
    /// Index into `choices`.
    pub correct_choice: usize,
    pub explanation: Option<String>,
}

impl Question {
    pub fn is_correct(&self, selected: usize) -> bool {
        selected == self.correct_choice
    }

    pub fn correct_text(&self) -> &str {
        self.choices
            .get(self.correct_choice)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub title: String,
    pub difficulty: String,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_email: String,
    pub question_index: usize,
    pub selected_choice: usize,
    pub is_correct: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordReset {
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl PasswordReset {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.used && self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_levels() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(10), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(250), 3);
        assert_eq!(xp_to_next_level(10), 90);
        assert_eq!(xp_to_next_level(100), 100);
    }

    #[test]
    fn test_message_role_display_and_parse() {
        assert_eq!(MessageRole::User.to_string(), "user");
        assert_eq!(MessageRole::Assistant.to_string(), "assistant");
        assert_eq!("assistant".parse::<MessageRole>().unwrap(), MessageRole::Assistant);
        assert!("system".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_message_role_serialization() {
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
    }

    #[test]
    fn test_question_correctness() {
        let question = Question {
            prompt: "What is 1/2 + 1/4?".to_string(),
            choices: vec!["1/6".into(), "3/4".into(), "2/6".into()],
            correct_choice: 1,
            explanation: None,
        };
        assert!(question.is_correct(1));
        assert!(!question.is_correct(0));
        assert_eq!(question.correct_text(), "3/4");
    }

    #[test]
    fn test_password_reset_validity() {
        let now = Utc::now();
        let mut reset = PasswordReset {
            token: "abc".to_string(),
            email: "ana@example.com".to_string(),
            expires_at: now + Duration::hours(1),
            used: false,
            created_at: now,
        };
        assert!(reset.is_valid_at(now));
        assert!(!reset.is_valid_at(now + Duration::hours(2)));
        reset.used = true;
        assert!(!reset.is_valid_at(now));
    }
}
