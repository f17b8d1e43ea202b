//! Conversation memory
//!
//! In-process only; nothing survives a restart.

pub mod store;

pub use store::ConversationHistory;
