//! Agent pipeline that turns a plain-text requirements document into
//! approved tracker stories, with a human approval gate between story
//! drafting and ticket creation.
//!
//! The core is a seven-phase workflow state machine ([`state_machine`])
//! plus a speaker-selection protocol ([`selection`]) that decides which
//! actor role takes the next turn in the shared exchange. Storage and the
//! ticket tracker are external collaborators behind the traits in
//! [`tools`]; the human verdict arrives through the [`approval`] gate.

pub mod agents;
pub mod approval;
pub mod config;
pub mod orchestrator;
pub mod selection;
pub mod state_machine;
pub mod stories;
pub mod telemetry;
pub mod tools;

pub use agents::Actor;
pub use approval::{ApprovalGate, Decision};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use state_machine::{Phase, WorkflowMachine};
pub use stories::{ParserStyle, Story};
