//! Conversation Flow Controller
//!
//! Drives a `SessionContext` through the tutoring stages. Every public
//! operation works on a copy of the context and only writes it back once the
//! whole step, including persisting the new chat messages, has succeeded. A
//! failed LLM or store call therefore leaves the caller's context untouched.

use crate::{
    error::{TutorError, TutorResult},
    flow::{ConversationStage, QuizProgress, SessionContext, TopicOptions, TurnReply},
    llm_client::{LLMAction, LLMClient, collect_stream},
    models::{Answer, ChatMessage, MessageRole, Quiz, Topic, UserProfile, XP_PER_CORRECT_ANSWER},
    prompts::PromptLibrary,
    quiz::{MissedQuestion, QuizDraft, choice_label, parse_selection},
    stats::compute_statistics,
    store::TutorStore,
    tools::{ToolRequest, tool_definitions},
    topic::{extract_topic_name, find_matching, normalize},
    tutoring::TutoringService,
};
use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
};
use chrono::Utc;
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Sent instead of an empty model reply.
pub const EMPTY_REPLY_FALLBACK: &str =
    "I'm sorry, I didn't quite catch that. Could you please rephrase?";

/// Only the most recent messages are sent to the model.
const MAX_CONTEXT_MESSAGES: usize = 40;
const MAX_SEARCH_RESULTS: usize = 5;

/// Tunables of the conversation flow.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSettings {
    /// Casual exchanges before topics are suggested.
    pub casual_exchange_threshold: u32,
    /// Extra quiz generation attempts after a malformed one.
    pub max_generation_retries: u32,
    /// Start the quiz in the same turn a topic is selected.
    pub auto_quiz: bool,
    pub questions_per_quiz: usize,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            casual_exchange_threshold: 3,
            max_generation_retries: 1,
            auto_quiz: true,
            questions_per_quiz: 5,
        }
    }
}

pub struct TutorController {
    llm: Arc<dyn LLMClient>,
    tutoring: Arc<dyn TutoringService>,
    store: Arc<dyn TutorStore>,
    prompts: PromptLibrary,
    settings: FlowSettings,
}

impl TutorController {
    pub fn new(
        llm: Arc<dyn LLMClient>,
        tutoring: Arc<dyn TutoringService>,
        store: Arc<dyn TutorStore>,
        prompts: PromptLibrary,
        settings: FlowSettings,
    ) -> Self {
        Self {
            llm,
            tutoring,
            store,
            prompts,
            settings,
        }
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// `Greeting → CasualChat`: welcomes the user by name.
    pub async fn start_session(&self, ctx: &mut SessionContext) -> TutorResult<TurnReply> {
        expect_stage(ctx, ConversationStage::Greeting, "start the session")?;
        let mut next = ctx.clone();
        enter_casual_chat(&mut next);

        let text = if next.is_returning() {
            format!(
                "Welcome back, {}! It's great to see you again. How have you been?",
                next.profile.name
            )
        } else {
            format!(
                "Hi {}! I'm your AI tutor. Before we dive into learning, tell me a bit \
                 about yourself. How's your day going?",
                next.profile.name
            )
        };
        info!(email = %next.profile.email, returning = next.is_returning(), "Session started");
        self.commit(ctx, next, None, TurnReply::text(text, ConversationStage::CasualChat))
            .await
    }

    /// Routes a free-text message according to the current stage.
    pub async fn handle_message(
        &self,
        ctx: &mut SessionContext,
        text: &str,
    ) -> TutorResult<TurnReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TutorError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let mut next = ctx.clone();
        let reply = match next.stage {
            ConversationStage::Greeting => {
                return Err(TutorError::InvalidTransition {
                    stage: next.stage,
                    action: "send a message",
                });
            }
            ConversationStage::CasualChat => self.casual_turn(&mut next, text).await?,
            ConversationStage::TopicSuggestion => self.topic_choice_turn(&mut next, text).await?,
            ConversationStage::Tutoring => self.begin_quiz(&mut next).await?,
            ConversationStage::QuizInProgress => {
                let selection = next
                    .quiz
                    .as_ref()
                    .and_then(QuizProgress::current_question)
                    .and_then(|question| parse_selection(question, text));
                match selection {
                    Some(index) => self.record_selection(&mut next, index).await?,
                    None => reask(&next)?,
                }
            }
            ConversationStage::Feedback => {
                enter_casual_chat(&mut next);
                self.casual_turn(&mut next, text).await?
            }
        };
        self.commit(ctx, next, Some(text), reply).await
    }

    /// `TopicSuggestion → Tutoring` for a named topic.
    pub async fn select_topic(
        &self,
        ctx: &mut SessionContext,
        topic: &str,
    ) -> TutorResult<TurnReply> {
        expect_stage(ctx, ConversationStage::TopicSuggestion, "select a topic")?;
        let name = topic.trim();
        if name.is_empty() {
            return Err(TutorError::InvalidInput(
                "topic must not be empty".to_string(),
            ));
        }
        let mut next = ctx.clone();
        let reply = self.enter_topic(&mut next, name).await?;
        self.commit(ctx, next, Some(name), reply).await
    }

    /// `Tutoring → QuizInProgress`.
    pub async fn start_quiz(&self, ctx: &mut SessionContext) -> TutorResult<TurnReply> {
        expect_stage(ctx, ConversationStage::Tutoring, "start a quiz")?;
        let mut next = ctx.clone();
        let reply = self.begin_quiz(&mut next).await?;
        self.commit(ctx, next, None, reply).await
    }

    /// Records the answer to the current question. `selection` may be the
    /// choice text, its letter or its 1-based number.
    pub async fn answer_question(
        &self,
        ctx: &mut SessionContext,
        selection: &str,
    ) -> TutorResult<TurnReply> {
        expect_stage(ctx, ConversationStage::QuizInProgress, "answer a question")?;
        let index = ctx
            .quiz
            .as_ref()
            .and_then(QuizProgress::current_question)
            .and_then(|question| parse_selection(question, selection))
            .ok_or_else(|| {
                TutorError::InvalidInput(format!(
                    "'{}' is not one of the choices",
                    selection.trim()
                ))
            })?;
        let mut next = ctx.clone();
        let reply = self.record_selection(&mut next, index).await?;
        self.commit(ctx, next, Some(selection.trim()), reply).await
    }

    /// `Feedback → TopicSuggestion`.
    pub async fn continue_with_topic(&self, ctx: &mut SessionContext) -> TutorResult<TurnReply> {
        expect_stage(ctx, ConversationStage::Feedback, "continue with a topic")?;
        let mut next = ctx.clone();
        self.offer_topics(&mut next).await?;
        let reply = suggestion_reply(&next, "Great, let's keep learning!".to_string());
        self.commit(ctx, next, None, reply).await
    }

    /// `Feedback → CasualChat`.
    pub async fn resume_casual_chat(&self, ctx: &mut SessionContext) -> TutorResult<TurnReply> {
        expect_stage(ctx, ConversationStage::Feedback, "resume casual chat")?;
        let mut next = ctx.clone();
        enter_casual_chat(&mut next);
        let reply = TurnReply::text(
            "Sure, let's take a break from studying. What's on your mind?",
            ConversationStage::CasualChat,
        );
        self.commit(ctx, next, None, reply).await
    }

    /// Deletes the stored chat history. Topics, quizzes and answers are kept.
    pub async fn clear_history(&self, ctx: &mut SessionContext) -> TutorResult<()> {
        self.store.replace_history(&ctx.profile.email, &[]).await?;
        ctx.history.clear();
        info!(email = %ctx.profile.email, "Chat history cleared");
        Ok(())
    }

    async fn commit(
        &self,
        ctx: &mut SessionContext,
        mut next: SessionContext,
        user_text: Option<&str>,
        mut reply: TurnReply,
    ) -> TutorResult<TurnReply> {
        let mut messages = Vec::with_capacity(2);
        if let Some(text) = user_text {
            messages.push(ChatMessage::user(text));
        }
        messages.push(ChatMessage::assistant(reply.text.clone()));

        // A quiz started this turn is persisted before the student sees it.
        let started_quiz = next
            .quiz
            .as_ref()
            .map(|progress| &progress.quiz)
            .filter(|quiz| ctx.quiz.as_ref().map(|progress| progress.quiz.id) != Some(quiz.id));
        if let Some(quiz) = started_quiz {
            self.store.create_quiz(quiz).await?;
            info!(quiz_id = %quiz.id, topic_id = %quiz.topic_id, questions = quiz.questions.len(), "Quiz created");
        }
        if let Err(e) = self
            .store
            .append_messages(&next.profile.email, &messages)
            .await
        {
            if let Some(quiz) = started_quiz {
                if let Err(cleanup) = self.store.delete_quiz(quiz.id).await {
                    warn!(quiz_id = %quiz.id, error = %cleanup, "Failed to remove unshown quiz");
                }
            }
            return Err(e.into());
        }
        next.history.extend(messages);

        reply.stage = next.stage;
        *ctx = next;
        Ok(reply)
    }

    // --- Stage steps ---

    async fn casual_turn(&self, next: &mut SessionContext, text: &str) -> TutorResult<TurnReply> {
        let system_prompt = self.prompts.system_prompt(
            &next.profile,
            next.active_topic.as_ref().map(|t| t.name.as_str()),
        );
        let mut messages = request_messages(&next.history)?;
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(text)
                .build()
                .map_err(anyhow::Error::from)?
                .into(),
        );

        let action = self
            .llm
            .decide_action(system_prompt.clone(), messages.clone(), tool_definitions()?)
            .await?;

        let response = match action {
            LLMAction::TextResponse(response) => response,
            LLMAction::ToolCall(tool_calls) => {
                let mut results = Vec::with_capacity(tool_calls.len());
                for call in &tool_calls {
                    let result =
                        match ToolRequest::parse(&call.function.name, &call.function.arguments) {
                            Ok(request) => self.execute_tool(next, request).await?,
                            Err(e) => {
                                warn!(tool = %call.function.name, error = %e, "Rejected tool request");
                                format!("Error: {}", e)
                            }
                        };
                    results.push(result);
                }

                // Append the tool calls and their results to the history.
                let mut history_with_tools = messages;
                history_with_tools.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .tool_calls(tool_calls.clone())
                        .build()
                        .map_err(anyhow::Error::from)?
                        .into(),
                );
                for (call, result) in tool_calls.iter().zip(results) {
                    history_with_tools.push(
                        ChatCompletionRequestToolMessageArgs::default()
                            .tool_call_id(call.id.clone())
                            .content(result)
                            .build()
                            .map_err(anyhow::Error::from)?
                            .into(),
                    );
                }

                let stream = self
                    .llm
                    .stream_after_tools(system_prompt, history_with_tools)
                    .await?;
                collect_stream(stream).await?
            }
        };

        let response = match response.trim() {
            "" => EMPTY_REPLY_FALLBACK.to_string(),
            trimmed => trimmed.to_string(),
        };

        match next.stage {
            ConversationStage::CasualChat => {
                next.casual_exchanges += 1;
                if next.casual_exchanges >= self.settings.casual_exchange_threshold {
                    self.offer_topics(next).await?;
                    return Ok(suggestion_reply(next, response));
                }
                Ok(TurnReply::text(response, ConversationStage::CasualChat))
            }
            ConversationStage::TopicSuggestion => Ok(suggestion_reply(next, response)),
            ConversationStage::QuizInProgress => Ok(question_reply(next, response)),
            stage => Ok(TurnReply::text(response, stage)),
        }
    }

    async fn topic_choice_turn(
        &self,
        next: &mut SessionContext,
        text: &str,
    ) -> TutorResult<TurnReply> {
        let name = match text.parse::<usize>() {
            Ok(n) if n >= 1 && n <= next.offered_topics.len() => next.offered_topics[n - 1].clone(),
            Ok(_) => {
                return Ok(suggestion_reply(
                    next,
                    "That number isn't one of the options.".to_string(),
                ));
            }
            Err(_) => extract_topic_name(text),
        };
        if name.is_empty() {
            return Ok(suggestion_reply(
                next,
                "Which topic would you like to study?".to_string(),
            ));
        }
        self.enter_topic(next, &name).await
    }

    async fn enter_topic(&self, next: &mut SessionContext, name: &str) -> TutorResult<TurnReply> {
        let topic = self.find_or_create_topic(&next.profile.email, name).await?;
        let lesson = self
            .tutoring
            .generate_lesson(&next.profile, &topic.name)
            .await?;
        let lesson = lesson.trim().to_string();

        next.offered_topics.clear();
        next.quiz = None;
        next.stage = ConversationStage::Tutoring;
        let topic_name = topic.name.clone();
        next.active_topic = Some(topic);

        if self.settings.auto_quiz {
            let mut reply = self.begin_quiz(next).await?;
            reply.text = format!("{}\n\n{}", lesson, reply.text);
            return Ok(reply);
        }
        Ok(TurnReply::text(
            format!(
                "{}\n\nWhenever you're ready, send me a message and I'll quiz you on {}.",
                lesson, topic_name
            ),
            ConversationStage::Tutoring,
        ))
    }

    async fn begin_quiz(&self, next: &mut SessionContext) -> TutorResult<TurnReply> {
        let topic = next
            .active_topic
            .clone()
            .ok_or_else(|| TutorError::NotFound("active topic".to_string()))?;
        let quiz = self.generate_quiz(&next.profile, &topic).await?;
        let intro = format!(
            "Here's a quiz on {} with {} questions. Reply with the letter of your answer.",
            topic.name,
            quiz.questions.len()
        );
        start_quiz_progress(next, quiz);
        Ok(question_reply(next, intro))
    }

    async fn generate_quiz(&self, profile: &UserProfile, topic: &Topic) -> TutorResult<Quiz> {
        let mut attempt = 0;
        loop {
            let raw = self
                .tutoring
                .generate_quiz(profile, &topic.name, self.settings.questions_per_quiz)
                .await?;
            let parsed = QuizDraft::parse(&raw).and_then(|draft| {
                let title = draft.title.trim().to_string();
                let difficulty = draft.difficulty.trim().to_lowercase();
                draft
                    .into_questions()
                    .map(|questions| (title, difficulty, questions))
            });
            match parsed {
                Ok((title, difficulty, questions)) => {
                    return Ok(Quiz {
                        id: Uuid::new_v4(),
                        topic_id: topic.id,
                        title: if title.is_empty() {
                            format!("{} quiz", topic.name)
                        } else {
                            title
                        },
                        difficulty,
                        questions,
                        created_at: Utc::now(),
                    });
                }
                Err(TutorError::MalformedGeneration(reason))
                    if attempt < self.settings.max_generation_retries =>
                {
                    attempt += 1;
                    warn!(topic = %topic.name, attempt, %reason, "Malformed quiz, re-prompting");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_selection(
        &self,
        next: &mut SessionContext,
        index: usize,
    ) -> TutorResult<TurnReply> {
        let email = next.profile.email.clone();
        let mut progress = next
            .quiz
            .take()
            .ok_or_else(|| TutorError::NotFound("quiz in progress".to_string()))?;
        let question = progress
            .current_question()
            .cloned()
            .ok_or_else(|| TutorError::NotFound("current question".to_string()))?;
        if index >= question.choices.len() {
            return Err(TutorError::InvalidInput(format!(
                "choice {} does not exist",
                index + 1
            )));
        }

        let answer = Answer {
            id: Uuid::new_v4(),
            quiz_id: progress.quiz.id,
            user_email: email.clone(),
            question_index: progress.next_question,
            selected_choice: index,
            is_correct: question.is_correct(index),
            created_at: Utc::now(),
        };
        let answer = if self.store.record_answer(&answer).await? {
            if answer.is_correct {
                next.profile.xp = self.store.add_xp(&email, XP_PER_CORRECT_ANSWER).await?;
            }
            answer
        } else {
            // An earlier attempt at this turn already stored the answer and
            // its XP, so grade what was stored.
            if let Some(user) = self.store.find_user(&email).await? {
                next.profile.xp = user.xp;
            }
            self.store
                .list_answers_for_quiz(progress.quiz.id)
                .await?
                .into_iter()
                .find(|a| a.user_email == email && a.question_index == answer.question_index)
                .unwrap_or(answer)
        };
        let is_correct = answer.is_correct;

        let mut text = if is_correct {
            progress.correct += 1;
            format!("Correct! +{} XP", XP_PER_CORRECT_ANSWER)
        } else {
            progress.missed.push(MissedQuestion {
                prompt: question.prompt.clone(),
                your_answer: question
                    .choices
                    .get(answer.selected_choice)
                    .cloned()
                    .unwrap_or_default(),
                correct_answer: question.correct_text().to_string(),
                explanation: question.explanation.clone(),
            });
            let mut text = format!(
                "Not quite. The correct answer is {}) {}.",
                choice_label(question.correct_choice),
                question.correct_text()
            );
            if let Some(explanation) = &question.explanation {
                text.push(' ');
                text.push_str(explanation);
            }
            text
        };
        progress.next_question += 1;
        info!(quiz_id = %progress.quiz.id, question = progress.next_question, is_correct, "Answer recorded");

        if progress.is_complete() {
            let outcome = progress.outcome();
            info!(quiz_id = %outcome.quiz_id, score = %outcome.score_label(), "Quiz completed");
            next.stage = ConversationStage::Feedback;
            text = format!(
                "{}\n\n{}\n\nWould you like to keep studying, or take a break and chat?",
                text,
                outcome.render()
            );
            let mut reply = TurnReply::text(text, ConversationStage::Feedback);
            reply.outcome = Some(outcome);
            return Ok(reply);
        }

        next.quiz = Some(progress);
        Ok(question_reply(next, text))
    }

    // --- Shared transitions ---

    async fn offer_topics(&self, next: &mut SessionContext) -> TutorResult<()> {
        let topics = self.store.list_topics(&next.profile.email).await?;
        next.offered_topics = topics.into_iter().map(|t| t.name).collect();
        next.stage = ConversationStage::TopicSuggestion;
        next.casual_exchanges = 0;
        info!(email = %next.profile.email, offered = next.offered_topics.len(), "Suggesting topics");
        Ok(())
    }

    async fn find_or_create_topic(&self, email: &str, name: &str) -> TutorResult<Topic> {
        let topics = self.store.list_topics(email).await?;
        if let Some(existing) = find_matching(&topics, name) {
            info!(topic = %existing.name, requested = %name, "Reusing existing topic");
            return Ok(existing.clone());
        }

        let topic = Topic {
            id: Uuid::new_v4(),
            user_email: email.to_string(),
            name: name.to_string(),
            normalized: normalize(name),
            created_at: Utc::now(),
        };
        self.store.create_topic(&topic).await?;
        info!(topic = %topic.name, topic_id = %topic.id, "Created topic");
        Ok(topic)
    }

    // --- Tool execution ---

    /// Performs a validated tool request. Store failures abort the turn;
    /// requests that cannot be honored are reported back as an error string.
    async fn execute_tool(
        &self,
        next: &mut SessionContext,
        request: ToolRequest,
    ) -> TutorResult<String> {
        info!(tool = request.name(), "Executing tool");
        match request {
            ToolRequest::CreateQuiz {
                topic,
                title,
                difficulty,
                questions,
            } => {
                if next.stage != ConversationStage::CasualChat {
                    return Ok(format!(
                        "Error: cannot create a quiz during the {} stage",
                        next.stage
                    ));
                }
                let topic = self.find_or_create_topic(&next.profile.email, &topic).await?;
                let quiz = Quiz {
                    id: Uuid::new_v4(),
                    topic_id: topic.id,
                    title,
                    difficulty,
                    questions,
                    created_at: Utc::now(),
                };
                let result = format!(
                    "Created the quiz \"{}\" on {} with {} questions. The first question \
                     is shown to the student after your message, so do not repeat it.",
                    quiz.title,
                    topic.name,
                    quiz.questions.len()
                );
                next.active_topic = Some(topic);
                start_quiz_progress(next, quiz);
                Ok(result)
            }
            ToolRequest::SuggestTopics => {
                if next.stage != ConversationStage::CasualChat {
                    return Ok(format!(
                        "Error: cannot suggest topics during the {} stage",
                        next.stage
                    ));
                }
                self.offer_topics(next).await?;
                if next.offered_topics.is_empty() {
                    Ok("The student has no previous topics. They are invited to name a new one."
                        .to_string())
                } else {
                    Ok(format!(
                        "Showing the student their previous topics: {}. They can also name a new one.",
                        next.offered_topics.join(", ")
                    ))
                }
            }
            ToolRequest::Search { query } => self.search(&next.profile.email, &query).await,
            ToolRequest::ShowQuizLeaderboard => {
                let report = compute_statistics(self.store.as_ref(), &next.profile.email).await?;
                Ok(report.render())
            }
            ToolRequest::CalendarLookup(session) => {
                let when = |s: &crate::tools::StudySession| {
                    s.starts_at.format("%m/%d/%y at %H:%M").to_string()
                };
                if let Some(existing) = next.study_sessions.iter().find(|s| s.overlaps(&session)) {
                    return Ok(format!(
                        "Error: that time overlaps the study session on {}",
                        when(existing)
                    ));
                }
                let result = format!(
                    "Scheduled a {}-minute study session on {}.",
                    session.duration_minutes,
                    when(&session)
                );
                next.study_sessions.push(session);
                next.study_sessions.sort_by_key(|s| s.starts_at);
                Ok(result)
            }
        }
    }

    async fn search(&self, email: &str, query: &str) -> TutorResult<String> {
        let matcher = SkimMatcherV2::default();
        let mut hits: Vec<(i64, String)> = Vec::new();
        for topic in self.store.list_topics(email).await? {
            if let Some(score) = matcher.fuzzy_match(&topic.name, query) {
                hits.push((score, format!("Topic: {}", topic.name)));
            }
            for quiz in self.store.list_quizzes(topic.id).await? {
                for question in &quiz.questions {
                    if let Some(score) = matcher.fuzzy_match(&question.prompt, query) {
                        hits.push((
                            score,
                            format!(
                                "Question from \"{}\": {} (answer: {})",
                                quiz.title,
                                question.prompt,
                                question.correct_text()
                            ),
                        ));
                    }
                }
            }
        }

        if hits.is_empty() {
            return Ok(format!("No topics or questions match '{}'.", query));
        }
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits
            .into_iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|(_, hit)| hit)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn expect_stage(
    ctx: &SessionContext,
    stage: ConversationStage,
    action: &'static str,
) -> TutorResult<()> {
    if ctx.stage == stage {
        Ok(())
    } else {
        Err(TutorError::InvalidTransition {
            stage: ctx.stage,
            action,
        })
    }
}

fn enter_casual_chat(next: &mut SessionContext) {
    next.stage = ConversationStage::CasualChat;
    next.casual_exchanges = 0;
    next.offered_topics.clear();
}

fn start_quiz_progress(next: &mut SessionContext, quiz: Quiz) {
    next.quiz = Some(QuizProgress::new(quiz));
    next.stage = ConversationStage::QuizInProgress;
}

fn topic_options(next: &SessionContext) -> TopicOptions {
    TopicOptions {
        topics: next.offered_topics.clone(),
        allow_free_text: true,
    }
}

fn suggestion_reply(next: &SessionContext, text: String) -> TurnReply {
    let options = topic_options(next);
    let mut text = text;
    if options.topics.is_empty() {
        text.push_str("\n\nWhat would you like to learn about today? Type any topic and we'll get started.");
    } else {
        text.push_str("\n\nWould you like to work on one of your topics?");
        for (i, topic) in options.topics.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, topic));
        }
        text.push_str("\n\nOr type a new topic you'd like to learn about.");
    }
    let mut reply = TurnReply::text(text, ConversationStage::TopicSuggestion);
    reply.topic_options = Some(options);
    reply
}

fn question_reply(next: &SessionContext, text: String) -> TurnReply {
    let view = next.quiz.as_ref().and_then(QuizProgress::current_view);
    let text = match &view {
        Some(view) => format!("{}\n\n{}", text, view.render()),
        None => text,
    };
    let mut reply = TurnReply::text(text, ConversationStage::QuizInProgress);
    reply.question = view;
    reply
}

fn reask(next: &SessionContext) -> TutorResult<TurnReply> {
    if next.quiz.is_none() {
        return Err(TutorError::NotFound("quiz in progress".to_string()));
    }
    Ok(question_reply(
        next,
        "I didn't recognize that answer. Please reply with the letter, number or text of one of the choices."
            .to_string(),
    ))
}

fn request_messages(history: &[ChatMessage]) -> Result<Vec<ChatCompletionRequestMessage>> {
    let start = history.len().saturating_sub(MAX_CONTEXT_MESSAGES);
    let mut messages = Vec::with_capacity(history.len() - start);
    for msg in &history[start..] {
        let message: ChatCompletionRequestMessage = match msg.role {
            MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
        };
        messages.push(message);
    }
    Ok(messages)
}
