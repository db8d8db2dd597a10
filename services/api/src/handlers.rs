//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for accounts,
//! chat history, topics and progress statistics. It uses `utoipa` doc
//! comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use neurogym_core::{
    TutorError,
    identity::Registration,
    stats::{LEADERBOARD_LIMIT, compute_statistics, quiz_leaderboard},
};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        ErrorResponse, HistoryMessage, LeaderboardResponse, LoginPayload, LoginResponse,
        MessageResponse, PasswordResetConfirmPayload, PasswordResetRequestPayload,
        PasswordResetRequestResponse, ProfileResponse, RegisterPayload, StatisticsResponse,
        TopicResponse,
    },
    state::{AppState, CheckoutError},
};

/// The header authenticated routes read the session token from.
pub const SESSION_HEADER: &str = "x-session-token";

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Tutor(TutorError),
    InternalServerError(anyhow::Error),
}

/// The HTTP status each tutoring error is reported with.
pub fn status_for(err: &TutorError) -> StatusCode {
    match err {
        TutorError::DuplicateEmail(_) | TutorError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        TutorError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        TutorError::InvalidInput(_) | TutorError::InvalidResetToken => StatusCode::BAD_REQUEST,
        TutorError::NotFound(_) => StatusCode::NOT_FOUND,
        TutorError::MalformedGeneration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TutorError::ExternalServiceFailure(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Tutor(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!("Upstream failure: {:?}", err);
                } else {
                    warn!(%status, "Request rejected: {}", err);
                }
                let message = err.to_string();
                (status, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        match err.into().downcast::<TutorError>() {
            Ok(err) => Self::Tutor(err),
            Err(err) => Self::InternalServerError(err),
        }
    }
}

impl ApiError {
    fn session(err: CheckoutError) -> Self {
        match err {
            CheckoutError::UnknownToken => Self::Unauthorized(err.to_string()),
            CheckoutError::InUse => Self::Conflict(err.to_string()),
        }
    }
}

fn session_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest(format!("{SESSION_HEADER} header is required")))
}

/// Resolves the session token header to the logged-in user's email.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = session_token(headers)?;
    state
        .sessions
        .email_for(token)
        .await
        .ok_or_else(|| ApiError::session(CheckoutError::UnknownToken))
}

/// Register a new account.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterPayload,
    responses(
        (status = 201, description = "Account created", body = ProfileResponse),
        (status = 400, description = "Invalid registration data", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .identity
        .register(Registration {
            name: payload.name,
            age: payload.age,
            email: payload.email,
            password: payload.password,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse::from(&user.profile())),
    ))
}

/// Log in and open a tutoring session.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginPayload,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ctx = state
        .identity
        .login(&payload.email, &payload.password)
        .await?;
    let profile = ProfileResponse::from(&ctx.profile);
    let session_token = state.sessions.open(ctx).await;
    Ok(Json(LoginResponse {
        session_token,
        profile,
    }))
}

/// Close the current session.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 400, description = "Missing session header", body = ErrorResponse),
        (status = 401, description = "Unknown session", body = ErrorResponse)
    ),
    params(
        ("x-session-token" = String, Header, description = "Token returned by login")
    )
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = session_token(&headers)?;
    if !state.sessions.close(token).await {
        return Err(ApiError::session(CheckoutError::UnknownToken));
    }
    info!("Session closed");
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// Request a password reset token.
///
/// The response never reveals whether the account exists. The token itself
/// is only included when `EXPOSE_RESET_TOKEN` is enabled.
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetRequestPayload,
    responses(
        (status = 200, description = "Request accepted", body = PasswordResetRequestResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetRequestPayload>,
) -> Result<Json<PasswordResetRequestResponse>, ApiError> {
    let reset_token = state
        .identity
        .request_password_reset(&payload.email)
        .await?
        .filter(|_| state.config.expose_reset_token);
    Ok(Json(PasswordResetRequestResponse {
        message: "If an account exists for this email, a reset token has been issued."
            .to_string(),
        reset_token,
    }))
}

/// Set a new password with a reset token.
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmPayload,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    )
)]
pub async fn confirm_password_reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PasswordResetConfirmPayload>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .identity
        .reset_password(&payload.token, &payload.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// Get the stored chat history, oldest first.
#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Chat history", body = [HistoryMessage]),
        (status = 401, description = "Unknown session", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    ),
    params(
        ("x-session-token" = String, Header, description = "Token returned by login")
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<HistoryMessage>>, ApiError> {
    let email = authenticate(&state, &headers).await?;
    let history = state
        .store
        .load_history(&email)
        .await
        .map_err(TutorError::from)?;
    Ok(Json(history.iter().map(HistoryMessage::from).collect()))
}

/// Delete the stored chat history. Topics, quizzes and answers are kept.
#[utoipa::path(
    delete,
    path = "/history",
    responses(
        (status = 200, description = "History cleared", body = MessageResponse),
        (status = 401, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "Session is open in a chat connection", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    ),
    params(
        ("x-session-token" = String, Header, description = "Token returned by login")
    )
)]
pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = session_token(&headers)?;
    let mut ctx = state
        .sessions
        .checkout(token)
        .await
        .map_err(ApiError::session)?;
    let result = state.controller.clear_history(&mut ctx).await;
    state.sessions.checkin(token, ctx).await;
    result?;
    Ok(Json(MessageResponse {
        message: "History cleared".to_string(),
    }))
}

/// List the topics the user has studied.
#[utoipa::path(
    get,
    path = "/topics",
    responses(
        (status = 200, description = "Topics in creation order", body = [TopicResponse]),
        (status = 401, description = "Unknown session", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    ),
    params(
        ("x-session-token" = String, Header, description = "Token returned by login")
    )
)]
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TopicResponse>>, ApiError> {
    let email = authenticate(&state, &headers).await?;
    let topics = state
        .store
        .list_topics(&email)
        .await
        .map_err(TutorError::from)?;
    Ok(Json(topics.into_iter().map(TopicResponse::from).collect()))
}

/// Get learning statistics per topic and quiz.
#[utoipa::path(
    get,
    path = "/statistics",
    responses(
        (status = 200, description = "Progress report", body = StatisticsResponse),
        (status = 401, description = "Unknown session", body = ErrorResponse),
        (status = 404, description = "User no longer exists", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    ),
    params(
        ("x-session-token" = String, Header, description = "Token returned by login")
    )
)]
pub async fn get_statistics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatisticsResponse>, ApiError> {
    let email = authenticate(&state, &headers).await?;
    let report = compute_statistics(state.store.as_ref(), &email).await?;
    Ok(Json(report.into()))
}

/// Rank everyone who answered one of the user's quizzes.
#[utoipa::path(
    get,
    path = "/quizzes/{quiz_id}/leaderboard",
    responses(
        (status = 200, description = "Quiz leaderboard", body = LeaderboardResponse),
        (status = 401, description = "Unknown session", body = ErrorResponse),
        (status = 404, description = "No such quiz among the user's topics", body = ErrorResponse),
        (status = 502, description = "Storage failure", body = ErrorResponse)
    ),
    params(
        ("quiz_id" = String, Path, description = "The quiz id"),
        ("x-session-token" = String, Header, description = "Token returned by login")
    )
)]
pub async fn get_quiz_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(quiz_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let email = authenticate(&state, &headers).await?;
    let board = quiz_leaderboard(state.store.as_ref(), &email, quiz_id, LEADERBOARD_LIMIT).await?;
    Ok(Json(board.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurogym_core::ConversationStage;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&TutorError::DuplicateEmail("a@b.c".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&TutorError::InvalidCredentials),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&TutorError::InvalidTransition {
                stage: ConversationStage::Greeting,
                action: "answer a question",
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&TutorError::MalformedGeneration("no json".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&TutorError::ExternalServiceFailure(anyhow::anyhow!("down"))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_tutor_errors_survive_anyhow() {
        let err: anyhow::Error = TutorError::InvalidResetToken.into();
        match ApiError::from(err) {
            ApiError::Tutor(TutorError::InvalidResetToken) => {}
            _ => panic!("expected the tutoring error to be recovered"),
        }
        match ApiError::from(anyhow::anyhow!("boom")) {
            ApiError::InternalServerError(_) => {}
            _ => panic!("expected an internal error"),
        }
        match ApiError::session(CheckoutError::InUse) {
            ApiError::Conflict(_) => {}
            _ => panic!("expected a conflict"),
        }
    }
}
