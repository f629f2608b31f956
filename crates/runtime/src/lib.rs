pub mod final_answer;
pub mod memory;
pub mod orchestrator;

// Re-exports for convenience.
pub use final_answer::FinalAnswer;
pub use memory::{ConversationMemory, Exchange};
pub use orchestrator::{AgentState, CutoffReason, Orchestrator, TurnReply, TurnStatus};
