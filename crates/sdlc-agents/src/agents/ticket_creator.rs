//! TicketCreator role: push the approved stories to the tracker.

use tracing::{info, warn};

use crate::tools::ToolError;

use super::TurnContext;

/// Create one tracker issue per approved story and emit the collected issue
/// keys as a JSON array.
///
/// A rate-limited sink aborts the turn so the driver can retry the whole
/// run; any other creation failure is reported as an error message.
pub async fn take_turn(ctx: &TurnContext<'_>) -> Result<String, ToolError> {
    let Some(stories) = ctx.machine.stories() else {
        warn!("scheduled with no approved stories");
        return Ok("error: no approved stories to create".to_string());
    };

    let mut keys = Vec::with_capacity(stories.len());
    for story in stories {
        match ctx.sink.create(&story.summary, &story.description).await {
            Ok(key) => {
                info!(%key, summary = %story.summary, "ticket created");
                keys.push(key);
            }
            Err(e) if e.is_rate_limited() => return Err(e),
            Err(e) => {
                warn!(summary = %story.summary, error = %e, "ticket creation failed");
                return Ok(format!(
                    "error creating ticket for `{}`: {e}",
                    story.summary
                ));
            }
        }
    }

    Ok(serde_json::to_string(&keys)?)
}
