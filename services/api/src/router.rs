//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        ErrorResponse, HistoryMessage, LeaderboardEntryResponse, LeaderboardResponse,
        LoginPayload, LoginResponse, MessageResponse, PasswordResetConfirmPayload,
        PasswordResetRequestPayload, PasswordResetRequestResponse, ProfileResponse,
        QuizStatsResponse, RegisterPayload, StatisticsResponse, TopicResponse,
        TopicStatsResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register,
        handlers::login,
        handlers::logout,
        handlers::request_password_reset,
        handlers::confirm_password_reset,
        handlers::get_history,
        handlers::clear_history,
        handlers::list_topics,
        handlers::get_statistics,
        handlers::get_quiz_leaderboard,
    ),
    components(
        schemas(
            RegisterPayload, LoginPayload, LoginResponse, ProfileResponse,
            PasswordResetRequestPayload, PasswordResetRequestResponse, PasswordResetConfirmPayload,
            HistoryMessage, TopicResponse, StatisticsResponse, TopicStatsResponse,
            QuizStatsResponse, LeaderboardResponse, LeaderboardEntryResponse,
            MessageResponse, ErrorResponse
        )
    ),
    tags(
        (name = "NeuroGym API", description = "Accounts, history and progress for the NeuroGym tutor")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/password-reset", post(handlers::request_password_reset))
        .route(
            "/auth/password-reset/confirm",
            post(handlers::confirm_password_reset),
        )
        .route(
            "/history",
            get(handlers::get_history).delete(handlers::clear_history),
        )
        .route("/topics", get(handlers::list_topics))
        .route("/statistics", get(handlers::get_statistics))
        .route(
            "/quizzes/{quiz_id}/leaderboard",
            get(handlers::get_quiz_leaderboard),
        )
        .route("/ws", get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
