//! Crypto Chat Agent
//!
//! A conversational assistant for cryptocurrency market questions that:
//! - Streams model answers as they are generated
//! - Lets the model pick market data tools (top list, single coin detail)
//! - Fetches live data from CoinGecko behind a short-lived response cache
//! - Normalizes provider records into one canonical shape
//! - Degrades every failure into a displayable message
//!
//! TURN LOOP:
//! INPUT → HISTORY → MODEL → (TEXT | TOOL: PENDING → TERMINAL) → COMMIT

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod market;
pub mod memory;
pub mod models;
pub mod presentation;
pub mod tools;

#[cfg(test)]
pub mod testing;

pub use error::{ChatError, Result};

// Re-export common types
pub use agent::{Orchestrator, SessionFactory};
pub use models::*;
pub use presentation::DisplayUnit;
