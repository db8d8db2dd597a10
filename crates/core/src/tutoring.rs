//! Tutoring Content Generation
//!
//! Produces the topic-scoped lesson shown when tutoring starts and the raw
//! quiz text the controller parses into a `Quiz`.

use crate::{models::UserProfile, prompts::PromptLibrary};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;

/// Defines the contract for any service that can generate tutoring content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TutoringService: Send + Sync {
    /// Generates a short lesson introducing `topic`.
    async fn generate_lesson(&self, profile: &UserProfile, topic: &str) -> Result<String>;

    /// Generates a multiple choice quiz about `topic` as raw model output.
    ///
    /// The output is expected to contain a JSON quiz draft but is not
    /// validated here.
    async fn generate_quiz(
        &self,
        profile: &UserProfile,
        topic: &str,
        questions: usize,
    ) -> Result<String>;
}

/// An implementation of `TutoringService` that uses an OpenAI-compatible API.
pub struct LLMTutoringService {
    client: Client<OpenAIConfig>,
    model: String,
    prompts: PromptLibrary,
}

impl LLMTutoringService {
    /// Creates a new LLM-based tutoring service.
    ///
    /// # Arguments
    ///
    /// * `config` - OpenAI API configuration (API key, base URL, etc.).
    /// * `model` - Model identifier to use for generation (e.g., "gpt-4o").
    /// * `prompts` - The templates for the `lesson` and `generate_quiz` prompts.
    pub fn new(config: OpenAIConfig, model: String, prompts: PromptLibrary) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            prompts,
        }
    }

    async fn complete(&self, system: &str, prompt: String) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()?;

        let response = self.client.chat().create(request).await?;

        let answer = response
            .choices
            .first()
            .context("No response choice from LLM")?
            .message
            .content
            .clone()
            .context("No content in LLM response")?;
        Ok(answer)
    }
}

#[async_trait]
impl TutoringService for LLMTutoringService {
    async fn generate_lesson(&self, profile: &UserProfile, topic: &str) -> Result<String> {
        let system = self.prompts.system_prompt(profile, Some(topic));
        self.complete(&system, self.prompts.lesson_prompt(profile, topic))
            .await
    }

    async fn generate_quiz(
        &self,
        profile: &UserProfile,
        topic: &str,
        questions: usize,
    ) -> Result<String> {
        self.complete(
            "You are a helpful assistant that writes quizzes as strict JSON.",
            self.prompts.quiz_prompt(profile, topic, questions),
        )
        .await
    }
}

/// A deterministic `TutoringService` for local development and integration
/// testing. The first choice of every generated question is the correct one.
pub struct OfflineTutoringService;

#[async_trait]
impl TutoringService for OfflineTutoringService {
    async fn generate_lesson(&self, profile: &UserProfile, topic: &str) -> Result<String> {
        Ok(format!(
            "Let's explore {}, {}! We'll start with the core ideas and then check \
             what you know with a quick quiz.",
            topic, profile.name
        ))
    }

    async fn generate_quiz(
        &self,
        _profile: &UserProfile,
        topic: &str,
        questions: usize,
    ) -> Result<String> {
        let questions: Vec<_> = (1..=questions.max(1))
            .map(|i| {
                serde_json::json!({
                    "question": format!("Practice question {} about {}: which statement is right?", i, topic),
                    "choices": [
                        format!("Statement {}.1", i),
                        format!("Statement {}.2", i),
                        format!("Statement {}.3", i),
                    ],
                    "answer": format!("Statement {}.1", i),
                    "explanation": format!("Statement {}.1 is the right one.", i),
                })
            })
            .collect();
        Ok(serde_json::json!({
            "title": format!("{} practice", topic),
            "difficulty": "easy",
            "questions": questions,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::QuizDraft;

    fn ana() -> UserProfile {
        UserProfile {
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            age: 14,
            xp: 10,
        }
    }

    #[tokio::test]
    async fn test_offline_quiz_parses_and_validates() {
        let raw = OfflineTutoringService
            .generate_quiz(&ana(), "fractions", 3)
            .await
            .unwrap();
        let draft = QuizDraft::parse(&raw).unwrap();
        assert_eq!(draft.title, "fractions practice");
        let questions = draft.into_questions().unwrap();
        assert_eq!(questions.len(), 3);
        assert!(questions.iter().all(|q| q.correct_choice == 0));
    }

    #[tokio::test]
    async fn test_offline_lesson_mentions_topic_and_name() {
        let lesson = OfflineTutoringService
            .generate_lesson(&ana(), "fractions")
            .await
            .unwrap();
        assert!(lesson.contains("fractions"));
        assert!(lesson.contains("Ana"));
    }
}
