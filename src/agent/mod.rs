//! Seam to the external reasoning agent
//!
//! The agent and its search tools live outside this crate. It sees a session's
//! memory handle and answers one input at a time.

pub mod executor;
pub mod turn;

pub use executor::{AgentExecutor, EchoAgent};
pub use turn::{ChatTurn, TurnOutcome, run_turn};
