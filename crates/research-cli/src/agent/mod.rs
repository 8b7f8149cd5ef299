//! Research agent
//!
//! A plan/act/reflect state machine: the model writes a plan, then for each
//! step proposes Python that runs in a persistent session, then reflects on
//! the output to decide whether to move on, keep going, debug or stop.

mod agent_loop;
mod prompts;
mod state;

pub use agent_loop::ResearchAgent;
pub use prompts::DEFAULT_SYSTEM_PROMPT;
pub use state::AgentConfig;
