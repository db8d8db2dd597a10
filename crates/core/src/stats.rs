//! Progress Aggregator
//!
//! Summarizes a user's topics, quizzes and answers, and ranks the people who
//! answered a quiz. Nothing is cached; every call reads the store again.

use crate::{
    error::{TutorError, TutorResult},
    models::{Answer, level_for_xp, xp_to_next_level},
    store::TutorStore,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Entries shown on a quiz leaderboard.
pub const LEADERBOARD_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizStats {
    pub quiz_id: Uuid,
    pub title: String,
    pub difficulty: String,
    pub questions: usize,
    pub answers: usize,
    pub correct: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicStats {
    pub topic_id: Uuid,
    pub name: String,
    pub quizzes_created: usize,
    /// Quizzes with at least one recorded answer.
    pub quizzes_taken: usize,
    pub answers: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub quizzes: Vec<QuizStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub email: String,
    pub xp: i64,
    pub level: i64,
    pub xp_to_next_level: i64,
    pub total_topics: usize,
    pub total_quizzes: usize,
    pub quizzes_taken: usize,
    pub total_answers: usize,
    pub correct_answers: usize,
    pub overall_accuracy: f64,
    pub topics: Vec<TopicStats>,
}

impl ProgressReport {
    /// A plain-text summary for the conversation model.
    pub fn render(&self) -> String {
        let mut text = format!(
            "Level {} with {} XP ({} XP to the next level).",
            self.level, self.xp, self.xp_to_next_level
        );
        if self.total_answers == 0 {
            text.push_str(" No quiz questions answered yet.");
            return text;
        }
        text.push_str(&format!(
            " {} of {} answers correct ({:.0}%).",
            self.correct_answers,
            self.total_answers,
            self.overall_accuracy * 100.0
        ));
        for topic in &self.topics {
            for quiz in topic.quizzes.iter().filter(|q| q.answers > 0) {
                text.push_str(&format!(
                    "\n- {} ({}): {}/{} correct",
                    quiz.title, topic.name, quiz.correct, quiz.answers
                ));
            }
        }
        text
    }
}

/// One person's result on a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub email: String,
    pub correct: usize,
    pub answered: usize,
    pub accuracy: f64,
    /// When the last answer was recorded.
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizLeaderboard {
    pub quiz_id: Uuid,
    pub title: String,
    pub questions: usize,
    /// People with at least one recorded answer.
    pub attempts: usize,
    pub average_score: f64,
    pub highest_score: usize,
    pub lowest_score: usize,
    pub entries: Vec<LeaderboardEntry>,
}

fn accuracy(correct: usize, answers: usize) -> f64 {
    if answers == 0 {
        0.0
    } else {
        correct as f64 / answers as f64
    }
}

/// Computes the progress report for `email`.
pub async fn compute_statistics(
    store: &dyn TutorStore,
    email: &str,
) -> TutorResult<ProgressReport> {
    let user = store
        .find_user(email)
        .await?
        .ok_or_else(|| TutorError::NotFound(format!("user '{}'", email)))?;

    let mut answers_by_quiz: HashMap<Uuid, Vec<Answer>> = HashMap::new();
    for answer in store.list_answers_for_user(email).await? {
        answers_by_quiz
            .entry(answer.quiz_id)
            .or_default()
            .push(answer);
    }

    let mut topics = Vec::new();
    for topic in store.list_topics(email).await? {
        let quizzes: Vec<QuizStats> = store
            .list_quizzes(topic.id)
            .await?
            .into_iter()
            .map(|quiz| {
                let answers = answers_by_quiz.get(&quiz.id).map_or(&[][..], Vec::as_slice);
                let correct = answers.iter().filter(|a| a.is_correct).count();
                QuizStats {
                    quiz_id: quiz.id,
                    title: quiz.title,
                    difficulty: quiz.difficulty,
                    questions: quiz.questions.len(),
                    answers: answers.len(),
                    correct,
                    accuracy: accuracy(correct, answers.len()),
                }
            })
            .collect();

        let answers = quizzes.iter().map(|q| q.answers).sum();
        let correct = quizzes.iter().map(|q| q.correct).sum();
        topics.push(TopicStats {
            topic_id: topic.id,
            name: topic.name,
            quizzes_created: quizzes.len(),
            quizzes_taken: quizzes.iter().filter(|q| q.answers > 0).count(),
            answers,
            correct,
            accuracy: accuracy(correct, answers),
            quizzes,
        });
    }

    let total_answers = topics.iter().map(|t| t.answers).sum();
    let correct_answers = topics.iter().map(|t| t.correct).sum();
    Ok(ProgressReport {
        email: user.email,
        xp: user.xp,
        level: level_for_xp(user.xp),
        xp_to_next_level: xp_to_next_level(user.xp),
        total_topics: topics.len(),
        total_quizzes: topics.iter().map(|t| t.quizzes_created).sum(),
        quizzes_taken: topics.iter().map(|t| t.quizzes_taken).sum(),
        total_answers,
        correct_answers,
        overall_accuracy: accuracy(correct_answers, total_answers),
        topics,
    })
}

/// Ranks everyone who answered `quiz_id` by correct answers, earliest
/// finisher first on ties. Only the owner of the quiz's topic may look.
pub async fn quiz_leaderboard(
    store: &dyn TutorStore,
    email: &str,
    quiz_id: Uuid,
    limit: usize,
) -> TutorResult<QuizLeaderboard> {
    let not_found = || TutorError::NotFound(format!("quiz '{}'", quiz_id));
    let quiz = store.find_quiz(quiz_id).await?.ok_or_else(not_found)?;
    let owned = store
        .list_topics(email)
        .await?
        .iter()
        .any(|t| t.id == quiz.topic_id);
    if !owned {
        return Err(not_found());
    }

    let mut entries: Vec<LeaderboardEntry> = Vec::new();
    for answer in store.list_answers_for_quiz(quiz_id).await? {
        let slot = match entries.iter().position(|e| e.email == answer.user_email) {
            Some(slot) => slot,
            None => {
                entries.push(LeaderboardEntry {
                    rank: 0,
                    email: answer.user_email.clone(),
                    correct: 0,
                    answered: 0,
                    accuracy: 0.0,
                    completed_at: answer.created_at,
                });
                entries.len() - 1
            }
        };
        let entry = &mut entries[slot];
        entry.answered += 1;
        entry.correct += usize::from(answer.is_correct);
        entry.completed_at = entry.completed_at.max(answer.created_at);
    }

    let scores: Vec<usize> = entries.iter().map(|e| e.correct).collect();
    let attempts = entries.len();
    entries.sort_by(|a, b| {
        b.correct
            .cmp(&a.correct)
            .then(a.completed_at.cmp(&b.completed_at))
    });
    entries.truncate(limit);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
        entry.accuracy = accuracy(entry.correct, entry.answered);
    }

    Ok(QuizLeaderboard {
        quiz_id: quiz.id,
        title: quiz.title,
        questions: quiz.questions.len(),
        attempts,
        average_score: if attempts == 0 {
            0.0
        } else {
            scores.iter().sum::<usize>() as f64 / attempts as f64
        },
        highest_score: scores.iter().copied().max().unwrap_or(0),
        lowest_score: scores.iter().copied().min().unwrap_or(0),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Question, Quiz, Topic, User},
        store::MemoryStore,
        topic::normalize,
    };
    use approx::assert_relative_eq;
    use chrono::Utc;

    async fn seed_user(store: &MemoryStore, email: &str) {
        store
            .create_user(&User {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                name: "Ana".to_string(),
                age: 14,
                xp: 10,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn seed_topic(store: &MemoryStore, email: &str, name: &str) -> Topic {
        let topic = Topic {
            id: Uuid::new_v4(),
            user_email: email.to_string(),
            name: name.to_string(),
            normalized: normalize(name),
            created_at: Utc::now(),
        };
        store.create_topic(&topic).await.unwrap();
        topic
    }

    async fn seed_quiz(store: &MemoryStore, topic: &Topic, questions: usize) -> Quiz {
        let quiz = Quiz {
            id: Uuid::new_v4(),
            topic_id: topic.id,
            title: format!("{} quiz", topic.name),
            difficulty: "easy".to_string(),
            questions: (0..questions)
                .map(|i| Question {
                    prompt: format!("Q{}", i),
                    choices: vec!["right".to_string(), "wrong".to_string()],
                    correct_choice: 0,
                    explanation: None,
                })
                .collect(),
            created_at: Utc::now(),
        };
        store.create_quiz(&quiz).await.unwrap();
        quiz
    }

    async fn answer(store: &MemoryStore, quiz: &Quiz, email: &str, index: usize, choice: usize) {
        answer_at(store, quiz, email, index, choice, Utc::now()).await;
    }

    async fn answer_at(
        store: &MemoryStore,
        quiz: &Quiz,
        email: &str,
        index: usize,
        choice: usize,
        at: DateTime<Utc>,
    ) {
        store
            .record_answer(&Answer {
                id: Uuid::new_v4(),
                quiz_id: quiz.id,
                user_email: email.to_string(),
                question_index: index,
                selected_choice: choice,
                is_correct: quiz.questions[index].is_correct(choice),
                created_at: at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_activity_gives_empty_report() {
        let store = MemoryStore::new();
        seed_user(&store, "ana@example.com").await;

        let report = compute_statistics(&store, "ana@example.com").await.unwrap();
        assert!(report.topics.is_empty());
        assert_eq!(report.total_answers, 0);
        assert_eq!(report.overall_accuracy, 0.0);
        assert_eq!(report.level, 1);
        assert_eq!(report.xp_to_next_level, 90);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            compute_statistics(&store, "ghost@example.com").await,
            Err(TutorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_per_topic_and_overall_accuracy() {
        let store = MemoryStore::new();
        let email = "ana@example.com";
        seed_user(&store, email).await;

        let fractions = seed_topic(&store, email, "fractions").await;
        let history = seed_topic(&store, email, "world history").await;
        let quiz_a = seed_quiz(&store, &fractions, 3).await;
        let _untaken = seed_quiz(&store, &fractions, 2).await;
        let quiz_b = seed_quiz(&store, &history, 1).await;

        answer(&store, &quiz_a, email, 0, 0).await;
        answer(&store, &quiz_a, email, 1, 0).await;
        answer(&store, &quiz_a, email, 2, 1).await;
        answer(&store, &quiz_b, email, 0, 1).await;

        let report = compute_statistics(&store, email).await.unwrap();
        assert_eq!(report.total_topics, 2);
        assert_eq!(report.total_quizzes, 3);
        assert_eq!(report.quizzes_taken, 2);
        assert_eq!((report.correct_answers, report.total_answers), (2, 4));
        assert_relative_eq!(report.overall_accuracy, 0.5);

        let topic = &report.topics[0];
        assert_eq!(topic.name, "fractions");
        assert_eq!((topic.quizzes_created, topic.quizzes_taken), (2, 1));
        assert_relative_eq!(topic.accuracy, 2.0 / 3.0);
        assert_relative_eq!(topic.quizzes[0].accuracy, 2.0 / 3.0);
        assert_eq!(topic.quizzes[1].accuracy, 0.0);
        assert_eq!(report.topics[1].accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_other_users_answers_are_ignored() {
        let store = MemoryStore::new();
        seed_user(&store, "ana@example.com").await;
        seed_user(&store, "bob@example.com").await;
        let topic = seed_topic(&store, "ana@example.com", "fractions").await;
        let quiz = seed_quiz(&store, &topic, 1).await;
        answer(&store, &quiz, "bob@example.com", 0, 0).await;

        let report = compute_statistics(&store, "ana@example.com").await.unwrap();
        assert_eq!(report.total_answers, 0);
        assert_eq!(report.topics[0].quizzes_taken, 0);
    }

    #[tokio::test]
    async fn test_leaderboard_ranks_by_score_then_finish_time() {
        let store = MemoryStore::new();
        for email in ["ana@example.com", "bob@example.com", "cy@example.com"] {
            seed_user(&store, email).await;
        }
        let topic = seed_topic(&store, "ana@example.com", "fractions").await;
        let quiz = seed_quiz(&store, &topic, 2).await;

        let start = Utc::now();
        let at = |minutes| start + chrono::Duration::minutes(minutes);
        answer_at(&store, &quiz, "bob@example.com", 0, 0, at(0)).await;
        answer_at(&store, &quiz, "ana@example.com", 0, 0, at(1)).await;
        answer_at(&store, &quiz, "cy@example.com", 0, 1, at(2)).await;
        answer_at(&store, &quiz, "ana@example.com", 1, 1, at(3)).await;
        answer_at(&store, &quiz, "bob@example.com", 1, 1, at(4)).await;

        let board = quiz_leaderboard(&store, "ana@example.com", quiz.id, LEADERBOARD_LIMIT)
            .await
            .unwrap();
        assert_eq!(board.questions, 2);
        assert_eq!(board.attempts, 3);
        assert_eq!((board.highest_score, board.lowest_score), (1, 0));
        assert_relative_eq!(board.average_score, 2.0 / 3.0);
        let ranked: Vec<_> = board
            .entries
            .iter()
            .map(|e| (e.rank, e.email.as_str(), e.correct))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (1, "ana@example.com", 1),
                (2, "bob@example.com", 1),
                (3, "cy@example.com", 0)
            ]
        );
        assert_relative_eq!(board.entries[0].accuracy, 0.5);

        let top = quiz_leaderboard(&store, "ana@example.com", quiz.id, 1)
            .await
            .unwrap();
        assert_eq!(top.entries.len(), 1);
        assert_eq!(top.attempts, 3);
    }

    #[tokio::test]
    async fn test_leaderboard_is_private_to_the_topic_owner() {
        let store = MemoryStore::new();
        seed_user(&store, "ana@example.com").await;
        let topic = seed_topic(&store, "ana@example.com", "fractions").await;
        let quiz = seed_quiz(&store, &topic, 1).await;

        let empty = quiz_leaderboard(&store, "ana@example.com", quiz.id, LEADERBOARD_LIMIT)
            .await
            .unwrap();
        assert!(empty.entries.is_empty());
        assert_eq!(empty.average_score, 0.0);

        for (email, quiz_id) in [
            ("bob@example.com", quiz.id),
            ("ana@example.com", Uuid::new_v4()),
        ] {
            assert!(matches!(
                quiz_leaderboard(&store, email, quiz_id, LEADERBOARD_LIMIT).await,
                Err(TutorError::NotFound(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_report_renders_taken_quizzes() {
        let store = MemoryStore::new();
        let email = "ana@example.com";
        seed_user(&store, email).await;
        let report = compute_statistics(&store, email).await.unwrap();
        assert_eq!(
            report.render(),
            "Level 1 with 10 XP (90 XP to the next level). No quiz questions answered yet."
        );

        let topic = seed_topic(&store, email, "fractions").await;
        let quiz = seed_quiz(&store, &topic, 2).await;
        seed_quiz(&store, &topic, 1).await;
        answer(&store, &quiz, email, 0, 0).await;
        answer(&store, &quiz, email, 1, 1).await;

        let text = compute_statistics(&store, email).await.unwrap().render();
        assert!(text.contains("1 of 2 answers correct (50%)."));
        assert!(text.ends_with("\n- fractions quiz (fractions): 1/2 correct"));
    }
}
