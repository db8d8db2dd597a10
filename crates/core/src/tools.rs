//! Tutor Tools
//!
//! The actions the conversation model may request during casual chat. A raw
//! tool call (name plus JSON arguments) is parsed and validated into a
//! `ToolRequest` before the controller performs any side effect, so an invalid
//! request never touches the store.

use crate::{
    models::Question,
    quiz::{QuestionSpec, QuizDraft},
};
use anyhow::Result;
use async_openai::types::{ChatCompletionTool, ChatCompletionToolArgs, FunctionObjectArgs};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use schemars::{JsonSchema, Schema, schema_for};
use serde::{Deserialize, Serialize};

pub const CREATE_QUIZ: &str = "create_quiz";
pub const SUGGEST_TOPICS: &str = "suggest_topics";
pub const SEARCH: &str = "search";
pub const SCHEDULE_STUDY_SESSION: &str = "schedule_study_session";
pub const SHOW_QUIZ_LEADERBOARD: &str = "show_quiz_leaderboard";

const MAX_SESSION_HOURS: f64 = 12.0;

// --- Data Structures for Tools ---

/// Arguments of the `create_quiz` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct CreateQuizArgs {
    /// The topic the student wants to be quizzed on.
    #[schemars(description = "The topic for the quiz, as identified by the student")]
    pub topic: String,
    /// A short title for the quiz.
    pub title: String,
    #[schemars(description = "The difficulty level: 'easy', 'medium' or 'hard'")]
    #[serde(default)]
    pub difficulty: Option<String>,
    #[schemars(description = "A list of multiple choice questions for the quiz")]
    pub questions: Vec<QuestionSpec>,
}

/// Arguments of the `suggest_topics` tool.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct SuggestTopicsArgs {}

/// Arguments of the `search` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct SearchArgs {
    #[schemars(description = "Words to look for in the student's topics and past quiz questions")]
    pub query: String,
}

/// Arguments of the `show_quiz_leaderboard` tool.
#[derive(Deserialize, JsonSchema, Debug, Default)]
pub struct ShowQuizLeaderboardArgs {}

/// Arguments of the `schedule_study_session` tool.
#[derive(Deserialize, JsonSchema, Debug)]
pub struct ScheduleStudySessionArgs {
    #[schemars(description = "The date on which the session starts, formatted as mm/dd/yy")]
    pub date: String,
    #[schemars(description = "The start time, formatted as 24h HH:MM")]
    pub time: String,
    #[schemars(description = "The number of hours the session lasts for")]
    pub duration_hours: f64,
}

/// A study session placed on the student's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudySession {
    pub starts_at: NaiveDateTime,
    pub duration_minutes: i64,
}

impl StudySession {
    pub fn ends_at(&self) -> NaiveDateTime {
        self.starts_at + Duration::minutes(self.duration_minutes)
    }

    pub fn overlaps(&self, other: &StudySession) -> bool {
        self.starts_at < other.ends_at() && other.starts_at < self.ends_at()
    }
}

/// A validated tool request, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolRequest {
    CreateQuiz {
        topic: String,
        title: String,
        difficulty: String,
        questions: Vec<Question>,
    },
    SuggestTopics,
    Search {
        query: String,
    },
    CalendarLookup(StudySession),
    ShowQuizLeaderboard,
}

impl ToolRequest {
    /// Parses and validates a raw tool call. The error string is meant to be
    /// fed back to the model as the tool result.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, String> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        match name {
            CREATE_QUIZ => {
                let args: CreateQuizArgs = parse_args(name, arguments)?;
                let topic = args.topic.trim().to_string();
                if topic.is_empty() {
                    return Err("'topic' must not be empty".to_string());
                }
                let title = args.title.trim().to_string();
                if title.is_empty() {
                    return Err("'title' must not be empty".to_string());
                }
                let difficulty = args
                    .difficulty
                    .map(|d| d.trim().to_lowercase())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| "medium".to_string());
                let questions = QuizDraft {
                    title: title.clone(),
                    difficulty: difficulty.clone(),
                    questions: args.questions,
                }
                .into_questions()
                .map_err(|e| e.to_string())?;
                Ok(ToolRequest::CreateQuiz {
                    topic,
                    title,
                    difficulty,
                    questions,
                })
            }
            SUGGEST_TOPICS => {
                let _: SuggestTopicsArgs = parse_args(name, arguments)?;
                Ok(ToolRequest::SuggestTopics)
            }
            SEARCH => {
                let args: SearchArgs = parse_args(name, arguments)?;
                let query = args.query.trim().to_string();
                if query.is_empty() {
                    return Err("'query' must not be empty".to_string());
                }
                Ok(ToolRequest::Search { query })
            }
            SCHEDULE_STUDY_SESSION => {
                let args: ScheduleStudySessionArgs = parse_args(name, arguments)?;
                let date = NaiveDate::parse_from_str(args.date.trim(), "%m/%d/%y")
                    .map_err(|_| format!("invalid date '{}', expected mm/dd/yy", args.date))?;
                let time = NaiveTime::parse_from_str(args.time.trim(), "%H:%M")
                    .map_err(|_| format!("invalid time '{}', expected HH:MM", args.time))?;
                if !(args.duration_hours > 0.0 && args.duration_hours <= MAX_SESSION_HOURS) {
                    return Err(format!(
                        "duration must be between 0 and {} hours",
                        MAX_SESSION_HOURS
                    ));
                }
                Ok(ToolRequest::CalendarLookup(StudySession {
                    starts_at: date.and_time(time),
                    duration_minutes: (args.duration_hours * 60.0).round() as i64,
                }))
            }
            SHOW_QUIZ_LEADERBOARD => {
                let _: ShowQuizLeaderboardArgs = parse_args(name, arguments)?;
                Ok(ToolRequest::ShowQuizLeaderboard)
            }
            other => Err(format!("unknown tool '{}'", other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::CreateQuiz { .. } => CREATE_QUIZ,
            ToolRequest::SuggestTopics => SUGGEST_TOPICS,
            ToolRequest::Search { .. } => SEARCH,
            ToolRequest::CalendarLookup(_) => SCHEDULE_STUDY_SESSION,
            ToolRequest::ShowQuizLeaderboard => SHOW_QUIZ_LEADERBOARD,
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: &str, arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments).map_err(|e| format!("invalid arguments for '{}': {}", name, e))
}

/// The tool list advertised to the model on every casual-chat turn.
pub fn tool_definitions() -> Result<Vec<ChatCompletionTool>> {
    let specs: [(&str, &str, Schema); 5] = [
        (
            CREATE_QUIZ,
            "Creates a multiple choice quiz on a topic and starts it right away. Each question needs 'question', 'choices' and 'answer' (one of the choices).",
            schema_for!(CreateQuizArgs),
        ),
        (
            SUGGEST_TOPICS,
            "Shows the topics the student studied before and invites them to pick one or name a new one. Use after a few casual exchanges.",
            schema_for!(SuggestTopicsArgs),
        ),
        (
            SEARCH,
            "Searches the student's previous topics and quiz questions.",
            schema_for!(SearchArgs),
        ),
        (
            SCHEDULE_STUDY_SESSION,
            "Schedules a study session on the student's calendar. Sessions may not overlap.",
            schema_for!(ScheduleStudySessionArgs),
        ),
        (
            SHOW_QUIZ_LEADERBOARD,
            "Shows the student's level, XP and scores on the quizzes they have taken.",
            schema_for!(ShowQuizLeaderboardArgs),
        ),
    ];

    specs
        .into_iter()
        .map(|(name, description, schema)| {
            let mut parameters = serde_json::to_value(&schema)?;
            if let Some(object) = parameters.as_object_mut() {
                object.remove("$schema");
            }
            Ok(ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(name)
                        .description(description)
                        .parameters(parameters)
                        .build()?,
                )
                .build()?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_create_quiz() {
        let args = r#"{
            "topic": " Fractions ",
            "title": "Fraction basics",
            "questions": [
                {"question": "1/2 + 1/4?", "choices": ["3/4", "2/6"], "answer": "3/4"}
            ]
        }"#;
        let request = ToolRequest::parse(CREATE_QUIZ, args).unwrap();
        match request {
            ToolRequest::CreateQuiz {
                topic,
                difficulty,
                questions,
                ..
            } => {
                assert_eq!(topic, "Fractions");
                assert_eq!(difficulty, "medium");
                assert_eq!(questions.len(), 1);
                assert_eq!(questions[0].correct_choice, 0);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_create_quiz_with_bad_question_is_rejected() {
        let args = r#"{"topic": "x", "title": "t", "questions": [
            {"question": "q", "choices": ["a1", "b1"], "answer": "zzz"}]}"#;
        let err = ToolRequest::parse(CREATE_QUIZ, args).unwrap_err();
        assert!(err.contains("answer is not one of the choices"));
    }

    #[test]
    fn test_parse_suggest_topics_accepts_empty_arguments() {
        assert_eq!(
            ToolRequest::parse(SUGGEST_TOPICS, "").unwrap(),
            ToolRequest::SuggestTopics
        );
        assert_eq!(
            ToolRequest::parse(SUGGEST_TOPICS, "{}").unwrap(),
            ToolRequest::SuggestTopics
        );
    }

    #[test]
    fn test_parse_show_quiz_leaderboard() {
        assert_eq!(
            ToolRequest::parse(SHOW_QUIZ_LEADERBOARD, "").unwrap(),
            ToolRequest::ShowQuizLeaderboard
        );
        assert_eq!(
            ToolRequest::ShowQuizLeaderboard.name(),
            SHOW_QUIZ_LEADERBOARD
        );
    }

    #[test]
    fn test_parse_search() {
        assert!(ToolRequest::parse(SEARCH, r#"{"query": "  "}"#).is_err());
        assert_eq!(
            ToolRequest::parse(SEARCH, r#"{"query": "fractions"}"#).unwrap(),
            ToolRequest::Search {
                query: "fractions".to_string()
            }
        );
    }

    #[test]
    fn test_parse_schedule() {
        let request = ToolRequest::parse(
            SCHEDULE_STUDY_SESSION,
            r#"{"date": "06/24/25", "time": "16:30", "duration_hours": 1.5}"#,
        )
        .unwrap();
        let ToolRequest::CalendarLookup(session) = request else {
            panic!("expected a calendar request");
        };
        assert_eq!(session.starts_at.hour(), 16);
        assert_eq!(session.duration_minutes, 90);

        assert!(
            ToolRequest::parse(
                SCHEDULE_STUDY_SESSION,
                r#"{"date": "2025-06-24", "time": "16:30", "duration_hours": 1}"#,
            )
            .is_err()
        );
        assert!(
            ToolRequest::parse(
                SCHEDULE_STUDY_SESSION,
                r#"{"date": "06/24/25", "time": "16:30", "duration_hours": 0}"#,
            )
            .is_err()
        );
    }

    #[test]
    fn test_unknown_tool() {
        assert_eq!(
            ToolRequest::parse("search_emails", "{}").unwrap_err(),
            "unknown tool 'search_emails'"
        );
    }

    #[test]
    fn test_study_session_overlap() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 24)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        let a = StudySession {
            starts_at: start,
            duration_minutes: 60,
        };
        let b = StudySession {
            starts_at: start + Duration::minutes(30),
            duration_minutes: 60,
        };
        let c = StudySession {
            starts_at: start + Duration::minutes(60),
            duration_minutes: 30,
        };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_tool_definitions() {
        let tools = tool_definitions().unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.function.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                CREATE_QUIZ,
                SUGGEST_TOPICS,
                SEARCH,
                SCHEDULE_STUDY_SESSION,
                SHOW_QUIZ_LEADERBOARD
            ]
        );
        let params = tools[0].function.parameters.as_ref().unwrap();
        assert!(params.get("$schema").is_none());
        assert!(params["properties"].get("questions").is_some());
    }
}
