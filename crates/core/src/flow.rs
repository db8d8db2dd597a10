//! Conversation State
//!
//! The stages of a tutoring conversation and the per-login `SessionContext`
//! that the controller reads and advances on every turn.

use crate::{
    models::{ChatMessage, Question, Quiz, Topic, UserProfile},
    quiz::{MissedQuestion, QuestionView, QuizOutcome},
    tools::StudySession,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The stage a conversation is in.
///
/// `Greeting → CasualChat → TopicSuggestion → Tutoring → QuizInProgress →
/// Feedback`, after which the conversation loops back to `CasualChat` or
/// `TopicSuggestion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStage {
    Greeting,
    CasualChat,
    TopicSuggestion,
    Tutoring,
    QuizInProgress,
    Feedback,
}

impl fmt::Display for ConversationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConversationStage::Greeting => "greeting",
            ConversationStage::CasualChat => "casual_chat",
            ConversationStage::TopicSuggestion => "topic_suggestion",
            ConversationStage::Tutoring => "tutoring",
            ConversationStage::QuizInProgress => "quiz_in_progress",
            ConversationStage::Feedback => "feedback",
        };
        write!(f, "{}", name)
    }
}

/// Progress through the quiz currently being taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizProgress {
    pub quiz: Quiz,
    /// 0-based index of the next unanswered question.
    pub next_question: usize,
    pub correct: usize,
    pub missed: Vec<MissedQuestion>,
}

impl QuizProgress {
    pub fn new(quiz: Quiz) -> Self {
        Self {
            quiz,
            next_question: 0,
            correct: 0,
            missed: Vec::new(),
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.quiz.questions.get(self.next_question)
    }

    pub fn current_view(&self) -> Option<QuestionView> {
        self.current_question().map(|question| {
            QuestionView::new(
                self.quiz.id,
                self.next_question,
                self.quiz.questions.len(),
                question,
            )
        })
    }

    pub fn is_complete(&self) -> bool {
        self.next_question >= self.quiz.questions.len()
    }

    pub fn outcome(&self) -> QuizOutcome {
        QuizOutcome {
            quiz_id: self.quiz.id,
            title: self.quiz.title.clone(),
            correct: self.correct,
            total: self.quiz.questions.len(),
            missed: self.missed.clone(),
        }
    }
}

/// Everything the controller needs to know about one logged-in user's
/// conversation. Owned by exactly one caller at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub profile: UserProfile,
    pub stage: ConversationStage,
    /// Casual exchanges since the last time topics were suggested.
    pub casual_exchanges: u32,
    /// Topic names offered at the last suggestion, in display order.
    pub offered_topics: Vec<String>,
    pub active_topic: Option<Topic>,
    pub quiz: Option<QuizProgress>,
    pub history: Vec<ChatMessage>,
    pub study_sessions: Vec<StudySession>,
}

impl SessionContext {
    pub fn new(profile: UserProfile, history: Vec<ChatMessage>) -> Self {
        Self {
            profile,
            stage: ConversationStage::Greeting,
            casual_exchanges: 0,
            offered_topics: Vec::new(),
            active_topic: None,
            quiz: None,
            history,
            study_sessions: Vec::new(),
        }
    }

    pub fn is_returning(&self) -> bool {
        !self.history.is_empty()
    }
}

/// The selectable options shown with a topic suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicOptions {
    /// Names of the user's previous topics, numbered from 1 when displayed.
    pub topics: Vec<String>,
    /// Whether the user may also type a new topic.
    pub allow_free_text: bool,
}

/// What the controller hands back for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReply {
    pub text: String,
    pub stage: ConversationStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_options: Option<TopicOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<QuizOutcome>,
}

impl TurnReply {
    pub fn text(text: impl Into<String>, stage: ConversationStage) -> Self {
        Self {
            text: text.into(),
            stage,
            topic_options: None,
            question: None,
            outcome: None,
        }
    }
}
