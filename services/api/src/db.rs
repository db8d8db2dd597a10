//! Data Access Layer
//!
//! The PostgreSQL implementation of `TutorStore`. Queries are checked at run
//! time and rows are mapped through the `FromRow` records in `models`.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use neurogym_core::{
    models::{Answer, ChatMessage, PasswordReset, Quiz, Topic, User},
    store::TutorStore,
};
use sqlx::{PgPool, Postgres, Transaction, types::Json};
use uuid::Uuid;

use crate::models::{AnswerRow, ChatRow, QuizRow, ResetRow, TopicRow, UserRow};

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl TutorStore for Db {
    async fn create_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, name, age, xp, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(i32::try_from(user.age)?)
        .bind(user.xp)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT email, password_hash, name, age, xp, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }

    async fn add_xp(&self, email: &str, amount: i64) -> Result<i64> {
        let xp: Option<i64> =
            sqlx::query_scalar("UPDATE users SET xp = xp + $1 WHERE email = $2 RETURNING xp")
                .bind(amount)
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        xp.ok_or_else(|| anyhow!("user '{}' does not exist", email))
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE email = $2")
            .bind(password_hash)
            .bind(email)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("user '{}' does not exist", email));
        }
        Ok(())
    }

    async fn save_reset_token(&self, reset: &PasswordReset) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM password_resets WHERE email = $1")
            .bind(&reset.email)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO password_resets (token, email, expires_at, used, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&reset.token)
        .bind(&reset.email)
        .bind(reset.expires_at)
        .bind(reset.used)
        .bind(reset.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_reset_token(&self, token: &str) -> Result<Option<PasswordReset>> {
        let row = sqlx::query_as::<_, ResetRow>(
            "SELECT token, email, expires_at, used, created_at FROM password_resets WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(PasswordReset::from))
    }

    async fn mark_reset_token_used(&self, token: &str) -> Result<()> {
        sqlx::query("UPDATE password_resets SET used = TRUE WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_messages(&self, email: &str, messages: &[ChatMessage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_messages(&mut tx, email, messages).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_history(&self, email: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatRow>(
            "SELECT role, content, created_at FROM chats WHERE user_email = $1 ORDER BY id ASC",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn replace_history(&self, email: &str, messages: &[ChatMessage]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chats WHERE user_email = $1")
            .bind(email)
            .execute(&mut *tx)
            .await?;
        insert_messages(&mut tx, email, messages).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_topic(&self, topic: &Topic) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO topics (id, user_email, name, normalized, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(topic.id)
        .bind(&topic.user_email)
        .bind(&topic.name)
        .bind(&topic.normalized)
        .bind(topic.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_topics(&self, email: &str) -> Result<Vec<Topic>> {
        let rows = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, user_email, name, normalized, created_at
            FROM topics
            WHERE user_email = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Topic::from).collect())
    }

    async fn create_quiz(&self, quiz: &Quiz) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quizzes (id, topic_id, title, difficulty, questions, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(quiz.id)
        .bind(quiz.topic_id)
        .bind(&quiz.title)
        .bind(&quiz.difficulty)
        .bind(Json(&quiz.questions))
        .bind(quiz.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_quiz(&self, quiz_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM quizzes WHERE id = $1")
            .bind(quiz_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_quiz(&self, quiz_id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query_as::<_, QuizRow>(
            "SELECT id, topic_id, title, difficulty, questions, created_at FROM quizzes WHERE id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Quiz::from))
    }

    async fn list_quizzes(&self, topic_id: Uuid) -> Result<Vec<Quiz>> {
        let rows = sqlx::query_as::<_, QuizRow>(
            r#"
            SELECT id, topic_id, title, difficulty, questions, created_at
            FROM quizzes
            WHERE topic_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Quiz::from).collect())
    }

    async fn record_answer(&self, answer: &Answer) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO answers
                (id, quiz_id, user_email, question_index, selected_choice, is_correct, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (quiz_id, user_email, question_index) DO NOTHING
            "#,
        )
        .bind(answer.id)
        .bind(answer.quiz_id)
        .bind(&answer.user_email)
        .bind(i32::try_from(answer.question_index)?)
        .bind(i32::try_from(answer.selected_choice)?)
        .bind(answer.is_correct)
        .bind(answer.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_answers_for_user(&self, email: &str) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT id, quiz_id, user_email, question_index, selected_choice, is_correct, created_at
            FROM answers
            WHERE user_email = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Answer::try_from).collect()
    }

    async fn list_answers_for_quiz(&self, quiz_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT id, quiz_id, user_email, question_index, selected_choice, is_correct, created_at
            FROM answers
            WHERE quiz_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Answer::try_from).collect()
    }
}

async fn insert_messages(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    messages: &[ChatMessage],
) -> Result<()> {
    for message in messages {
        sqlx::query(
            "INSERT INTO chats (user_email, role, content, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(email)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
