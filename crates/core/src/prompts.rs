//! Prompt templates and age-appropriate guidance.

use crate::models::UserProfile;
use std::collections::HashMap;

pub const SYSTEM_PROMPT: &str = "system_prompt";
pub const LESSON: &str = "lesson";
pub const GENERATE_QUIZ: &str = "generate_quiz";

const DEFAULT_SYSTEM_PROMPT: &str = "\
## Task and Context
You are a friendly AI tutor helping a student understand topics they struggle with.

## Student Information
The student's name is {name} and their age is {age}. When they ask about themselves, \
answer using this information.

## Age-Appropriate Behavior Guidelines
{age_guidelines}

## Conversation Flow
1. Start with casual, friendly conversation to build rapport.
2. After a few exchanges, use the suggest_topics tool to move to academic work.
3. When the student names a topic, use the create_quiz tool right away.
4. After a quiz, explain the concepts they got wrong until they understand.

{topic_context}";

const DEFAULT_LESSON: &str = "\
Give {name} (age {age}) a short, engaging introduction to \"{topic}\". \
Explain the key ideas in a few paragraphs with one concrete example, \
then tell them a quick quiz is coming up.";

const DEFAULT_GENERATE_QUIZ: &str = "\
Write a multiple choice quiz about \"{topic}\" for a {age} year old student \
with exactly {questions} questions.

Respond with a single JSON object and nothing else, in this shape:
{\"title\": \"...\", \"difficulty\": \"easy|medium|hard\", \"questions\": [
  {\"question\": \"...\", \"choices\": [\"...\", \"...\", \"...\", \"...\"], \"answer\": \"<one of the choices>\", \"explanation\": \"...\"}
]}";

/// Communication guidance for a student's age band.
pub fn age_guidelines(age: u32) -> &'static str {
    match age {
        0..=8 => {
            "### Young Children (5-8)
- Use simple, clear language with short sentences and lots of encouragement.
- Use concrete examples from their world: toys, cartoons, everyday activities.
- Stick to basic fundamentals and avoid abstract concepts.
- Keep quizzes to 3-5 simple questions."
        }
        9..=12 => {
            "### Elementary Students (9-12)
- Use friendly language that is simple but not babyish.
- Add fun facts and analogies to games, sports and school activities.
- Introduce the idea that learning takes practice.
- Quizzes should have 5-7 questions with clear explanations."
        }
        13..=16 => {
            "### Teenagers (13-16)
- Use a mature but relatable tone and acknowledge when topics are hard.
- Use examples from technology, current events and pop culture.
- Encourage critical thinking and real-world applications.
- Quizzes should have 7-10 questions with detailed explanations."
        }
        17..=22 => {
            "### College Students (17-22)
- Use a collegial tone while remaining supportive.
- Draw on research, professional contexts and academic discussion.
- Ask application questions that combine several concepts.
- Quizzes should have 8-12 questions with thorough explanations."
        }
        _ => {
            "### Adult Learners (23+)
- Use a professional, respectful tone that acknowledges their experience.
- Be direct and focus on practical, real-world applications.
- Include case studies and problem-solving scenarios.
- Quizzes should have 10-15 questions focused on practical application."
        }
    }
}

/// The prompt templates used by the controller and the tutoring service.
///
/// Templates are keyed by name; any template missing from the supplied map
/// falls back to a built-in default.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    templates: HashMap<String, String>,
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl PromptLibrary {
    pub fn new(mut templates: HashMap<String, String>) -> Self {
        for (key, default) in [
            (SYSTEM_PROMPT, DEFAULT_SYSTEM_PROMPT),
            (LESSON, DEFAULT_LESSON),
            (GENERATE_QUIZ, DEFAULT_GENERATE_QUIZ),
        ] {
            templates
                .entry(key.to_string())
                .or_insert_with(|| default.to_string());
        }
        Self { templates }
    }

    /// The raw template for `key`, if known.
    pub fn template(&self, key: &str) -> Option<&str> {
        self.templates.get(key).map(String::as_str)
    }

    /// The conversation system prompt, personalized for the student and,
    /// when one is active, scoped to the current topic.
    pub fn system_prompt(&self, profile: &UserProfile, topic: Option<&str>) -> String {
        let topic_context = topic
            .map(|t| format!("## Current Topic\nThe student is currently studying \"{}\".", t))
            .unwrap_or_default();
        self.render(
            SYSTEM_PROMPT,
            profile,
            &[
                ("age_guidelines", age_guidelines(profile.age)),
                ("topic_context", &topic_context),
            ],
        )
    }

    pub fn lesson_prompt(&self, profile: &UserProfile, topic: &str) -> String {
        self.render(LESSON, profile, &[("topic", topic)])
    }

    pub fn quiz_prompt(&self, profile: &UserProfile, topic: &str, questions: usize) -> String {
        self.render(
            GENERATE_QUIZ,
            profile,
            &[("topic", topic), ("questions", &questions.to_string())],
        )
    }

    fn render(&self, key: &str, profile: &UserProfile, vars: &[(&str, &str)]) -> String {
        let mut text = self
            .template(key)
            .unwrap_or_default()
            .replace("{name}", &profile.name)
            .replace("{age}", &profile.age.to_string());
        for (name, value) in vars {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        text.trim_end().to_string()
    }
}
