//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::models::{HistoryMessage, ProfileResponse};
use neurogym_core::{ConversationStage, TurnReply};
use serde::{Deserialize, Serialize};

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attaches the connection to a logged-in session. This must be the first message.
    Init { session_token: String },
    /// Free text, interpreted according to the current stage.
    UserMessage { text: String },
    /// Picks a topic from the suggestion, or names a new one.
    SelectTopic { topic: String },
    StartQuiz,
    /// Answers the current question by choice text, letter or number.
    Answer { selection: String },
    /// After feedback, go back to choosing a topic.
    ContinueWithTopic,
    /// After feedback, go back to casual chat.
    ResumeChat,
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session is attached and provides the stored conversation.
    Initialized {
        profile: ProfileResponse,
        stage: ConversationStage,
        history: Vec<HistoryMessage>,
    },
    /// The tutor's answer to one client action.
    Reply {
        #[serde(flatten)]
        reply: TurnReply,
    },
    /// Reports a rejected action. The session stays usable unless it was `init`.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_messages_parse() {
        let init: ClientMessage =
            serde_json::from_value(json!({"type": "init", "session_token": "abc"})).unwrap();
        assert_eq!(
            init,
            ClientMessage::Init {
                session_token: "abc".to_string()
            }
        );

        let answer: ClientMessage =
            serde_json::from_value(json!({"type": "answer", "selection": "B"})).unwrap();
        assert_eq!(
            answer,
            ClientMessage::Answer {
                selection: "B".to_string()
            }
        );

        let resume: ClientMessage =
            serde_json::from_value(json!({"type": "resume_chat"})).unwrap();
        assert_eq!(resume, ClientMessage::ResumeChat);

        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "set_voice"})).is_err());
    }

    #[test]
    fn test_reply_is_flattened() {
        let msg = ServerMessage::Reply {
            reply: TurnReply::text("Hi Ana!", ConversationStage::CasualChat),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "reply", "text": "Hi Ana!", "stage": "casual_chat"})
        );

        let err = serde_json::to_value(ServerMessage::Error {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(err, json!({"type": "error", "message": "nope"}));
    }
}
