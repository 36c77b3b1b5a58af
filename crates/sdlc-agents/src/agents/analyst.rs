//! Analyst role: read the requirements document and draft stories.

use tracing::{info, warn};

use crate::stories::parse_requirements;
use crate::tools::ToolError;

use super::TurnContext;

/// Read the run's input document, draft one story per requirement line,
/// persist the drafted collection, and emit it as a JSON payload.
///
/// Storage failures (other than rate limits) are reported as error messages
/// so the run fails through the normal message rules rather than aborting
/// the exchange.
pub async fn take_turn(ctx: &TurnContext<'_>) -> Result<String, ToolError> {
    let input_path = ctx.machine.input_path();

    let content = match ctx.storage.read(input_path).await {
        Ok(content) => content,
        Err(e) if e.is_rate_limited() => return Err(e),
        Err(e) => {
            warn!(path = input_path, error = %e, "failed to read requirements");
            return Ok(format!("error reading {input_path}: {e}"));
        }
    };

    let stories = parse_requirements(&content, ctx.config.parser_style);
    let payload = serde_json::to_string_pretty(&stories)?;

    let out_path = stories_output_path(input_path);
    match ctx.storage.write(&out_path, &payload).await {
        Ok(()) => {
            info!(count = stories.len(), path = %out_path, "drafted stories persisted");
        }
        Err(e) if e.is_rate_limited() => return Err(e),
        Err(e) => {
            warn!(path = %out_path, error = %e, "failed to persist stories");
            return Ok(format!("error writing {out_path}: {e}"));
        }
    }

    Ok(serde_json::to_string(&stories)?)
}

/// Derive the persisted-stories path: `stories_<original-uploaded-filename>`,
/// alongside the input document.
pub fn stories_output_path(input_path: &str) -> String {
    match input_path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/stories_{name}"),
        None => format!("stories_{input_path}"),
    }
}
