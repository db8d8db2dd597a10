//! Manages the WebSocket connection lifecycle for a tutoring chat.

use super::protocol::{ClientMessage, ServerMessage};
use crate::{
    models::{HistoryMessage, ProfileResponse},
    state::AppState,
};
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use neurogym_core::{ConversationStage, SessionContext, TutorError, TutorResult, TurnReply};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// The first message must be `init`, which checks the user's conversation out
/// of the session registry. It is checked back in when the connection ends,
/// however the loop exits.
#[instrument(name = "ws_session", skip_all, fields(session_id, email))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let temp_id: u32 = rand::random();
    tracing::Span::current().record("session_id", &temp_id.to_string());
    info!("New WebSocket connection. Awaiting initialization...");

    let (mut socket_tx, mut socket_rx) = socket.split();

    let attached = match socket_rx.next().await {
        Some(Ok(Message::Text(text))) => attach_session(&text, &state).await,
        Some(Ok(_)) => Err(anyhow!("First message was not a text `init` message.")),
        _ => {
            info!("Client disconnected before sending init message.");
            return;
        }
    };
    let (token, mut ctx) = match attached {
        Ok(attached) => attached,
        Err(e) => {
            warn!("Session initialization failed: {:#}", e);
            let _ = send_msg(
                &mut socket_tx,
                ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            return;
        }
    };
    tracing::Span::current().record("email", ctx.profile.email.as_str());

    if let Err(e) = run_chat(&state, &mut ctx, &mut socket_tx, &mut socket_rx).await {
        error!("Chat session ended with an error: {:?}", e);
    }

    state.sessions.checkin(&token, ctx).await;
    info!("WebSocket connection closed and session returned to the registry.");
}

/// Parses the `init` message and checks out the matching session.
async fn attach_session(text: &str, state: &AppState) -> Result<(String, SessionContext)> {
    match serde_json::from_str::<ClientMessage>(text)? {
        ClientMessage::Init { session_token } => {
            let ctx = state.sessions.checkout(&session_token).await?;
            Ok((session_token, ctx))
        }
        _ => Err(anyhow!("First message must be of type `init`.")),
    }
}

/// Sends the initial state, greets on a fresh session and then serves client
/// actions until the socket closes.
async fn run_chat(
    state: &AppState,
    ctx: &mut SessionContext,
    socket_tx: &mut SplitSink<WebSocket, Message>,
    socket_rx: &mut SplitStream<WebSocket>,
) -> Result<()> {
    let history: Vec<HistoryMessage> = ctx.history.iter().map(HistoryMessage::from).collect();
    let greeting = if ctx.stage == ConversationStage::Greeting {
        Some(state.controller.start_session(ctx).await)
    } else {
        None
    };

    send_msg(
        socket_tx,
        ServerMessage::Initialized {
            profile: ProfileResponse::from(&ctx.profile),
            stage: ctx.stage,
            history,
        },
    )
    .await?;
    if let Some(result) = greeting {
        send_outcome(socket_tx, result).await?;
    }
    info!(stage = %ctx.stage, "Session initialized");

    while let Some(msg_result) = socket_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let outcome = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => dispatch(state, ctx, msg).await,
                    Err(e) => Err(TutorError::InvalidInput(format!(
                        "unrecognized message: {}",
                        e
                    ))),
                };
                send_outcome(socket_tx, outcome).await?;
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary frame.");
            }
            Ok(Message::Close(_)) => {
                info!("Client sent close frame. Shutting down session.");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("Error receiving from client WebSocket: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}

/// Routes one client action to the flow controller.
async fn dispatch(
    state: &AppState,
    ctx: &mut SessionContext,
    msg: ClientMessage,
) -> TutorResult<TurnReply> {
    let controller = &state.controller;
    match msg {
        ClientMessage::Init { .. } => Err(TutorError::InvalidInput(
            "session is already initialized".to_string(),
        )),
        ClientMessage::UserMessage { text } => controller.handle_message(ctx, &text).await,
        ClientMessage::SelectTopic { topic } => controller.select_topic(ctx, &topic).await,
        ClientMessage::StartQuiz => controller.start_quiz(ctx).await,
        ClientMessage::Answer { selection } => controller.answer_question(ctx, &selection).await,
        ClientMessage::ContinueWithTopic => controller.continue_with_topic(ctx).await,
        ClientMessage::ResumeChat => controller.resume_casual_chat(ctx).await,
    }
}

/// Sends a reply, or reports the error while keeping the connection open.
async fn send_outcome(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    outcome: TutorResult<TurnReply>,
) -> Result<()> {
    let msg = match outcome {
        Ok(reply) => ServerMessage::Reply { reply },
        Err(e) => {
            match &e {
                TutorError::ExternalServiceFailure(_) => error!("Turn failed: {:?}", e),
                _ => warn!("Turn rejected: {}", e),
            }
            ServerMessage::Error {
                message: e.to_string(),
            }
        }
    };
    send_msg(socket_tx, msg).await
}

/// A helper function to serialize and send a `ServerMessage` to the client.
pub(crate) async fn send_msg(
    socket_tx: &mut SplitSink<WebSocket, Message>,
    msg: ServerMessage,
) -> Result<()> {
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}
