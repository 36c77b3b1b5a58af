//! Reviewer role: surface drafted stories to the human and relay the
//! verdict into the message channel.

use tracing::{debug, info, warn};

use crate::approval::Decision;
use crate::state_machine::Phase;
use crate::tools::ToolError;

use super::TurnContext;

/// Marker the machine expects once stories have been shown.
pub const DISPLAYED_MARKER: &str = "stories displayed";

pub async fn take_turn(ctx: &TurnContext<'_>) -> Result<String, ToolError> {
    match ctx.machine.phase() {
        Phase::DisplayingStories => match ctx.machine.stories() {
            Some(stories) if !stories.is_empty() => {
                ctx.gate.publish(stories);
                Ok(DISPLAYED_MARKER.to_string())
            }
            _ => {
                warn!("no stories to display");
                Ok("error: no stories to display".to_string())
            }
        },

        Phase::WaitingApproval => {
            debug!("awaiting human verdict");
            match ctx.gate.wait_decision().await {
                Decision::Approve => {
                    let stories = ctx.machine.stories().unwrap_or(&[]);
                    info!(count = stories.len(), "approval received, forwarding");
                    Ok(format!(
                        "create these tickets: {}",
                        serde_json::to_string(stories)?
                    ))
                }
                Decision::Revise => Ok("revise: stories rejected by reviewer".to_string()),
            }
        }

        phase => {
            // Should not be scheduled outside the review phases.
            warn!(%phase, "reviewer scheduled outside review phases");
            Ok(String::new())
        }
    }
}
