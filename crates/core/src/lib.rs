pub mod controller;
pub mod error;
pub mod flow;
pub mod identity;
pub mod llm_client;
pub mod models;
pub mod prompts;
pub mod quiz;
pub mod stats;
pub mod store;
pub mod tools;
pub mod topic;
pub mod tutoring;

pub use controller::{FlowSettings, TutorController};
pub use error::{TutorError, TutorResult};
pub use flow::{ConversationStage, SessionContext, TurnReply};
