//! Quiz Parsing and Grading
//!
//! Turns LLM output into validated `Question`s, interprets a student's free-text
//! selection, and summarizes a finished quiz.

use crate::{
    error::{TutorError, TutorResult},
    models::Question,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question as the model writes it, before validation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    /// The question text.
    pub question: String,
    /// Between two and six answer options.
    pub choices: Vec<String>,
    /// The correct option, written exactly as it appears in `choices`.
    pub answer: String,
    /// Why the correct option is correct.
    #[serde(default)]
    pub explanation: Option<String>,
}

/// A whole quiz as the model writes it, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDraft {
    pub title: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    pub questions: Vec<QuestionSpec>,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

const MAX_CHOICES: usize = 6;

impl QuizDraft {
    /// Parses a draft from raw model output, tolerating Markdown code fences
    /// and prose around the JSON object.
    pub fn parse(raw: &str) -> TutorResult<Self> {
        let start = raw.find('{');
        let end = raw.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if s < e => &raw[s..=e],
            _ => {
                return Err(TutorError::MalformedGeneration(
                    "no JSON object found in quiz output".to_string(),
                ));
            }
        };
        serde_json::from_str(json)
            .map_err(|e| TutorError::MalformedGeneration(format!("invalid quiz JSON: {}", e)))
    }

    /// Validates every question and resolves each answer to a choice index.
    pub fn into_questions(self) -> TutorResult<Vec<Question>> {
        if self.questions.is_empty() {
            return Err(TutorError::MalformedGeneration(
                "quiz has no questions".to_string(),
            ));
        }
        self.questions
            .into_iter()
            .enumerate()
            .map(|(i, spec)| validate_question(i, spec))
            .collect()
    }
}

fn validate_question(index: usize, spec: QuestionSpec) -> TutorResult<Question> {
    let malformed = |reason: &str| {
        TutorError::MalformedGeneration(format!("question {}: {}", index + 1, reason))
    };

    let prompt = spec.question.trim().to_string();
    if prompt.is_empty() {
        return Err(malformed("empty question text"));
    }
    let choices: Vec<String> = spec.choices.iter().map(|c| c.trim().to_string()).collect();
    if choices.len() < 2 || choices.len() > MAX_CHOICES {
        return Err(malformed("expected between 2 and 6 choices"));
    }
    if choices.iter().any(String::is_empty) {
        return Err(malformed("empty choice"));
    }
    for (i, choice) in choices.iter().enumerate() {
        if choices[..i].iter().any(|c| c.eq_ignore_ascii_case(choice)) {
            return Err(malformed("duplicate choices"));
        }
    }
    let correct_choice =
        resolve_answer(&choices, &spec.answer).ok_or_else(|| malformed("answer is not one of the choices"))?;

    Ok(Question {
        prompt,
        choices,
        correct_choice,
        explanation: spec
            .explanation
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()),
    })
}

/// Resolves the model's `answer` field: the choice text itself, a bare
/// letter ("B"), or a labelled choice ("B) 3/4").
fn resolve_answer(choices: &[String], answer: &str) -> Option<usize> {
    let answer = answer.trim();
    if let Some(i) = match_choice_text(choices, answer) {
        return Some(i);
    }
    if let Some(i) = parse_letter(answer).filter(|&i| i < choices.len()) {
        return Some(i);
    }
    strip_label(answer).and_then(|rest| match_choice_text(choices, rest))
}

/// Interprets a student's selection: the choice text, a letter ("b", "B)")
/// or a 1-based number.
pub fn parse_selection(question: &Question, input: &str) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(i) = match_choice_text(&question.choices, input) {
        return Some(i);
    }
    if let Some(i) = parse_letter(input).filter(|&i| i < question.choices.len()) {
        return Some(i);
    }
    input
        .parse::<usize>()
        .ok()
        .filter(|&n| n >= 1 && n <= question.choices.len())
        .map(|n| n - 1)
}

fn match_choice_text(choices: &[String], text: &str) -> Option<usize> {
    choices.iter().position(|c| c.eq_ignore_ascii_case(text))
}

fn parse_letter(text: &str) -> Option<usize> {
    let text = text.trim_end_matches([')', '.', ':']);
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Some((c.to_ascii_uppercase() as u8 - b'A') as usize)
        }
        _ => None,
    }
}

fn strip_label(text: &str) -> Option<&str> {
    let mut chars = text.char_indices();
    match (chars.next(), chars.next()) {
        (Some((_, c)), Some((i, sep))) if c.is_ascii_alphabetic() && matches!(sep, ')' | '.' | ':') => {
            Some(text[i + 1..].trim())
        }
        _ => None,
    }
}

/// Letter label for a choice index: 0 → 'A'.
pub fn choice_label(index: usize) -> char {
    (b'A' + (index as u8 % 26)) as char
}

/// A question as shown to the student, without the correct answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionView {
    pub quiz_id: Uuid,
    /// 0-based position in the quiz.
    pub index: usize,
    pub total: usize,
    pub prompt: String,
    pub choices: Vec<String>,
}

impl QuestionView {
    pub fn new(quiz_id: Uuid, index: usize, total: usize, question: &Question) -> Self {
        Self {
            quiz_id,
            index,
            total,
            prompt: question.prompt.clone(),
            choices: question.choices.clone(),
        }
    }

    pub fn render(&self) -> String {
        let mut text = format!("Question {}/{}: {}", self.index + 1, self.total, self.prompt);
        for (i, choice) in self.choices.iter().enumerate() {
            text.push_str(&format!("\n{}) {}", choice_label(i), choice));
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissedQuestion {
    pub prompt: String,
    pub your_answer: String,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

/// Result of a completed quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub quiz_id: Uuid,
    pub title: String,
    pub correct: usize,
    pub total: usize,
    pub missed: Vec<MissedQuestion>,
}

impl QuizOutcome {
    /// Score in "correct/total" form, e.g. "2/3".
    pub fn score_label(&self) -> String {
        format!("{}/{}", self.correct, self.total)
    }

    pub fn render(&self) -> String {
        let mut text = format!(
            "Quiz complete! You got {} correct ({}).",
            self.score_label(),
            self.title
        );
        if self.missed.is_empty() {
            text.push_str("\n\nExcellent work, you answered everything correctly!");
            return text;
        }
        text.push_str("\n\nLet's review the questions you missed:");
        for missed in &self.missed {
            text.push_str(&format!(
                "\n- {}\n  Your answer: {}\n  Correct answer: {}",
                missed.prompt, missed.your_answer, missed.correct_answer
            ));
            if let Some(explanation) = &missed.explanation {
                text.push_str(&format!("\n  Why: {}", explanation));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(question: &str, choices: &[&str], answer: &str) -> QuestionSpec {
        QuestionSpec {
            question: question.to_string(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
            answer: answer.to_string(),
            explanation: None,
        }
    }

    #[test]
    fn test_parse_tolerates_fences() {
        let raw = "Here you go:\n```json\n{\"title\": \"Fractions\", \"questions\": [\
            {\"question\": \"1/2 + 1/2?\", \"choices\": [\"1\", \"2\"], \"answer\": \"1\"}]}\n```";
        let draft = QuizDraft::parse(raw).unwrap();
        assert_eq!(draft.title, "Fractions");
        assert_eq!(draft.difficulty, "medium");
        assert_eq!(draft.questions.len(), 1);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            QuizDraft::parse("Sorry, I can't do that."),
            Err(TutorError::MalformedGeneration(_))
        ));
        assert!(matches!(
            QuizDraft::parse("{\"title\": 3}"),
            Err(TutorError::MalformedGeneration(_))
        ));
    }

    #[test]
    fn test_answer_resolution() {
        let choices = ["1/6", "3/4", "2/6"];
        let by_text = validate_question(0, spec("q", &choices, " 3/4 ")).unwrap();
        assert_eq!(by_text.correct_choice, 1);
        let by_letter = validate_question(0, spec("q", &choices, "C")).unwrap();
        assert_eq!(by_letter.correct_choice, 2);
        let by_label = validate_question(0, spec("q", &choices, "b) 3/4")).unwrap();
        assert_eq!(by_label.correct_choice, 1);
    }

    #[test]
    fn test_invalid_questions() {
        assert!(validate_question(0, spec("q", &["only"], "only")).is_err());
        assert!(validate_question(0, spec("q", &["a1", "b1"], "c1")).is_err());
        assert!(validate_question(0, spec("q", &["same", "SAME"], "same")).is_err());
        assert!(validate_question(0, spec("  ", &["x", "y"], "x")).is_err());
        let empty = QuizDraft {
            title: "Empty".to_string(),
            difficulty: "easy".to_string(),
            questions: vec![],
        };
        assert!(empty.into_questions().is_err());
    }

    #[test]
    fn test_parse_selection() {
        let question = validate_question(0, spec("q", &["Paris", "London", "Rome"], "Paris")).unwrap();
        assert_eq!(parse_selection(&question, "paris"), Some(0));
        assert_eq!(parse_selection(&question, "B"), Some(1));
        assert_eq!(parse_selection(&question, "c)"), Some(2));
        assert_eq!(parse_selection(&question, "2"), Some(1));
        assert_eq!(parse_selection(&question, "D"), None);
        assert_eq!(parse_selection(&question, "4"), None);
        assert_eq!(parse_selection(&question, "no idea"), None);
    }

    #[test]
    fn test_numeric_choice_text_wins_over_position() {
        let question = validate_question(0, spec("1 + 1?", &["1", "2", "3"], "2")).unwrap();
        assert_eq!(parse_selection(&question, "2"), Some(1));
        assert_eq!(parse_selection(&question, "3"), Some(2));
    }

    #[test]
    fn test_question_view_render() {
        let question = validate_question(0, spec("Capital of France?", &["Paris", "Rome"], "Paris")).unwrap();
        let view = QuestionView::new(Uuid::nil(), 0, 3, &question);
        assert_eq!(view.render(), "Question 1/3: Capital of France?\nA) Paris\nB) Rome");
    }

    #[test]
    fn test_outcome_render() {
        let outcome = QuizOutcome {
            quiz_id: Uuid::nil(),
            title: "Fractions".to_string(),
            correct: 2,
            total: 3,
            missed: vec![MissedQuestion {
                prompt: "1/2 + 1/4?".to_string(),
                your_answer: "2/6".to_string(),
                correct_answer: "3/4".to_string(),
                explanation: Some("Use a common denominator.".to_string()),
            }],
        };
        assert_eq!(outcome.score_label(), "2/3");
        let text = outcome.render();
        assert!(text.contains("2/3"));
        assert!(text.contains("Correct answer: 3/4"));
        assert!(text.contains("Why: Use a common denominator."));
    }
}
