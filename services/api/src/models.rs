//! API and Database Models
//!
//! This module defines the records `sqlx` maps rows into and the payloads
//! exchanged over HTTP, documented with `utoipa`.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use neurogym_core::{
    models::{
        Answer, ChatMessage, PasswordReset, Question, Quiz, Topic, User, UserProfile,
        level_for_xp,
    },
    stats::{LeaderboardEntry, ProgressReport, QuizLeaderboard, QuizStats, TopicStats},
};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use utoipa::ToSchema;
use uuid::Uuid;

// --- Database rows ---

#[derive(FromRow, Debug)]
pub struct UserRow {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub age: i32,
    pub xp: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            age: u32::try_from(row.age).map_err(|_| anyhow!("negative age {}", row.age))?,
            xp: row.xp,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow, Debug)]
pub struct ResetRow {
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl From<ResetRow> for PasswordReset {
    fn from(row: ResetRow) -> Self {
        PasswordReset {
            token: row.token,
            email: row.email,
            expires_at: row.expires_at,
            used: row.used,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow, Debug)]
pub struct ChatRow {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ChatRow> for ChatMessage {
    type Error = anyhow::Error;

    fn try_from(row: ChatRow) -> Result<Self, Self::Error> {
        Ok(ChatMessage {
            role: row.role.parse()?,
            content: row.content,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow, Debug)]
pub struct TopicRow {
    pub id: Uuid,
    pub user_email: String,
    pub name: String,
    pub normalized: String,
    pub created_at: DateTime<Utc>,
}

impl From<TopicRow> for Topic {
    fn from(row: TopicRow) -> Self {
        Topic {
            id: row.id,
            user_email: row.user_email,
            name: row.name,
            normalized: row.normalized,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow, Debug)]
pub struct QuizRow {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub title: String,
    pub difficulty: String,
    pub questions: Json<Vec<Question>>,
    pub created_at: DateTime<Utc>,
}

impl From<QuizRow> for Quiz {
    fn from(row: QuizRow) -> Self {
        Quiz {
            id: row.id,
            topic_id: row.topic_id,
            title: row.title,
            difficulty: row.difficulty,
            questions: row.questions.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow, Debug)]
pub struct AnswerRow {
    pub id: Uuid,
    pub quiz_id: Uuid,
    pub user_email: String,
    pub question_index: i32,
    pub selected_choice: i32,
    pub is_correct: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = anyhow::Error;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        Ok(Answer {
            id: row.id,
            quiz_id: row.quiz_id,
            user_email: row.user_email,
            question_index: usize::try_from(row.question_index)?,
            selected_choice: usize::try_from(row.selected_choice)?,
            is_correct: row.is_correct,
            created_at: row.created_at,
        })
    }
}

// --- HTTP payloads ---

#[derive(Deserialize, ToSchema)]
pub struct RegisterPayload {
    #[schema(example = "Ana")]
    pub name: String,
    #[schema(example = 14)]
    pub age: u32,
    #[schema(example = "ana@example.com")]
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginPayload {
    #[schema(example = "ana@example.com")]
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ProfileResponse {
    pub email: String,
    pub name: String,
    pub age: u32,
    pub xp: i64,
    pub level: i64,
}

impl From<&UserProfile> for ProfileResponse {
    fn from(profile: &UserProfile) -> Self {
        Self {
            email: profile.email.clone(),
            name: profile.name.clone(),
            age: profile.age,
            xp: profile.xp,
            level: level_for_xp(profile.xp),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct LoginResponse {
    /// Send as the `x-session-token` header and in the WebSocket `init` message.
    pub session_token: String,
    pub profile: ProfileResponse,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequestPayload {
    #[schema(example = "ana@example.com")]
    pub email: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct PasswordResetRequestResponse {
    pub message: String,
    /// Present only when an account exists for the email and the server
    /// is configured to return tokens.
    pub reset_token: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetConfirmPayload {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    #[schema(example = "assistant")]
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ChatMessage> for HistoryMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TopicResponse {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Topic> for TopicResponse {
    fn from(topic: Topic) -> Self {
        Self {
            id: topic.id,
            name: topic.name,
            created_at: topic.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct QuizStatsResponse {
    #[schema(value_type = String, format = Uuid)]
    pub quiz_id: Uuid,
    pub title: String,
    pub difficulty: String,
    pub questions: usize,
    pub answers: usize,
    pub correct: usize,
    pub accuracy: f64,
}

impl From<QuizStats> for QuizStatsResponse {
    fn from(stats: QuizStats) -> Self {
        Self {
            quiz_id: stats.quiz_id,
            title: stats.title,
            difficulty: stats.difficulty,
            questions: stats.questions,
            answers: stats.answers,
            correct: stats.correct,
            accuracy: stats.accuracy,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TopicStatsResponse {
    #[schema(value_type = String, format = Uuid)]
    pub topic_id: Uuid,
    pub name: String,
    pub quizzes_created: usize,
    pub quizzes_taken: usize,
    pub answers: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub quizzes: Vec<QuizStatsResponse>,
}

impl From<TopicStats> for TopicStatsResponse {
    fn from(stats: TopicStats) -> Self {
        Self {
            topic_id: stats.topic_id,
            name: stats.name,
            quizzes_created: stats.quizzes_created,
            quizzes_taken: stats.quizzes_taken,
            answers: stats.answers,
            correct: stats.correct,
            accuracy: stats.accuracy,
            quizzes: stats.quizzes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct StatisticsResponse {
    pub xp: i64,
    pub level: i64,
    pub xp_to_next_level: i64,
    pub total_topics: usize,
    pub total_quizzes: usize,
    pub quizzes_taken: usize,
    pub total_answers: usize,
    pub correct_answers: usize,
    pub overall_accuracy: f64,
    pub topics: Vec<TopicStatsResponse>,
}

impl From<ProgressReport> for StatisticsResponse {
    fn from(report: ProgressReport) -> Self {
        Self {
            xp: report.xp,
            level: report.level,
            xp_to_next_level: report.xp_to_next_level,
            total_topics: report.total_topics,
            total_quizzes: report.total_quizzes,
            quizzes_taken: report.quizzes_taken,
            total_answers: report.total_answers,
            correct_answers: report.correct_answers,
            overall_accuracy: report.overall_accuracy,
            topics: report.topics.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct LeaderboardEntryResponse {
    pub rank: usize,
    pub email: String,
    pub correct: usize,
    pub answered: usize,
    pub accuracy: f64,
    pub completed_at: DateTime<Utc>,
}

impl From<LeaderboardEntry> for LeaderboardEntryResponse {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            rank: entry.rank,
            email: entry.email,
            correct: entry.correct,
            answered: entry.answered,
            accuracy: entry.accuracy,
            completed_at: entry.completed_at,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct LeaderboardResponse {
    #[schema(value_type = String, format = Uuid)]
    pub quiz_id: Uuid,
    pub title: String,
    pub questions: usize,
    pub attempts: usize,
    pub average_score: f64,
    pub highest_score: usize,
    pub lowest_score: usize,
    pub entries: Vec<LeaderboardEntryResponse>,
}

impl From<QuizLeaderboard> for LeaderboardResponse {
    fn from(board: QuizLeaderboard) -> Self {
        Self {
            quiz_id: board.quiz_id,
            title: board.title,
            questions: board.questions,
            attempts: board.attempts,
            average_score: board.average_score,
            highest_score: board.highest_score,
            lowest_score: board.lowest_score,
            entries: board.entries.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
