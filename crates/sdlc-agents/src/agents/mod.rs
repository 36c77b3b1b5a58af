//! Actor roles and their per-turn behavior.
//!
//! Each role is a variant of [`Actor`]; its behavior is a free function in
//! the role's module, dispatched by [`take_turn`]. Roles are compared by
//! value, never by object identity, and share nothing beyond the
//! [`TurnContext`] handed to them for one turn.

pub mod analyst;
pub mod coder;
pub mod reviewer;
pub mod ticket_creator;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::approval::ApprovalGate;
use crate::config::PipelineConfig;
use crate::state_machine::WorkflowMachine;
use crate::tools::jira::TicketSink;
use crate::tools::storage::StorageShim;
use crate::tools::ToolError;

/// The four fixed participant roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// Drafts stories from the requirements document.
    Analyst,
    /// Surfaces stories to the human and relays the verdict.
    Reviewer,
    /// Pushes approved stories to the tracker.
    TicketCreator,
    /// Renders approved stories into a code skeleton (post-run step).
    Coder,
}

impl Actor {
    pub fn name(self) -> &'static str {
        match self {
            Self::Analyst => "analyst",
            Self::Reviewer => "reviewer",
            Self::TicketCreator => "ticket_creator",
            Self::Coder => "coder",
        }
    }

    /// Which actors may legally speak after this one.
    ///
    /// Cross-checked against the phase-derived speaker; not the primary
    /// scheduling mechanism.
    pub fn allowed_successors(self) -> &'static [Actor] {
        match self {
            Self::Analyst => &[Actor::Reviewer],
            Self::Reviewer => &[Actor::TicketCreator, Actor::Analyst],
            Self::TicketCreator => &[],
            Self::Coder => &[],
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a role needs to take one turn.
pub struct TurnContext<'a> {
    pub storage: &'a dyn StorageShim,
    pub sink: &'a dyn TicketSink,
    pub gate: &'a ApprovalGate,
    pub machine: &'a WorkflowMachine,
    pub config: &'a PipelineConfig,
}

/// Run one turn for the given role and return the message it emits into the
/// shared channel.
///
/// Only rate-limit failures propagate as errors (the driver retries the
/// whole run); other upstream failures come back as error messages so the
/// machine can capture them.
pub async fn take_turn(actor: Actor, ctx: &TurnContext<'_>) -> Result<String, ToolError> {
    match actor {
        Actor::Analyst => analyst::take_turn(ctx).await,
        Actor::Reviewer => reviewer::take_turn(ctx).await,
        Actor::TicketCreator => ticket_creator::take_turn(ctx).await,
        Actor::Coder => coder::take_turn(ctx).await,
    }
}
