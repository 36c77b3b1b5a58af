//! Coder role: render approved stories into a skeleton source file.
//!
//! Not scheduled by the workflow machine; the driver invokes it as an
//! optional step after a run completes.

use tracing::{info, warn};

use crate::stories::Story;
use crate::tools::storage::StorageShim;
use crate::tools::ToolError;

use super::TurnContext;

pub async fn take_turn(ctx: &TurnContext<'_>) -> Result<String, ToolError> {
    let Some(stories) = ctx.machine.stories() else {
        warn!("scheduled with no stories to scaffold");
        return Ok("error: no stories to scaffold".to_string());
    };
    let path = write_skeleton(ctx.storage, ctx.machine.input_path(), stories).await?;
    Ok(format!("code skeleton written to {path}"))
}

/// Write the skeleton for a story collection and return its path.
pub async fn write_skeleton(
    storage: &dyn StorageShim,
    input_path: &str,
    stories: &[Story],
) -> Result<String, ToolError> {
    let path = code_output_path(input_path);
    storage.write(&path, &render_skeleton(stories)).await?;
    info!(count = stories.len(), path = %path, "code skeleton written");
    Ok(path)
}

/// Render one stub function per story, with the story text as docstring.
pub fn render_skeleton(stories: &[Story]) -> String {
    let mut out = String::from("\"\"\"Generated skeleton: one stub per approved story.\"\"\"\n");
    for (i, story) in stories.iter().enumerate() {
        let name = slugify(&story.summary);
        out.push_str(&format!(
            "\n\ndef {name}():\n    \"\"\"{}\n\n    {}\n    \"\"\"\n    raise NotImplementedError(\"story {}\")\n",
            story.summary,
            story.description.lines().next().unwrap_or_default(),
            i + 1,
        ));
    }
    out
}

/// Derive the skeleton path: `code_<input-stem>.py`, alongside the input.
pub fn code_output_path(input_path: &str) -> String {
    let (dir, name) = match input_path.rsplit_once('/') {
        Some((dir, name)) => (Some(dir), name),
        None => (None, input_path),
    };
    let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    match dir {
        Some(dir) => format!("{dir}/code_{stem}.py"),
        None => format!("code_{stem}.py"),
    }
}

/// Lowercased identifier from a story summary.
fn slugify(summary: &str) -> String {
    let mut slug: String = summary
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while slug.contains("__") {
        slug = slug.replace("__", "_");
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() || slug.starts_with(|c: char| c.is_ascii_digit()) {
        format!("story_{slug}")
    } else {
        slug.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_output_path() {
        assert_eq!(code_output_path("upload_1.txt"), "code_upload_1.py");
        assert_eq!(code_output_path("input/req.txt"), "input/code_req.py");
        assert_eq!(code_output_path("noext"), "code_noext.py");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("User login"), "user_login");
        assert_eq!(slugify("As a user, I want to log in"), "as_a_user_i_want_to_log_in");
        assert_eq!(slugify("2FA support"), "story_2fa_support");
    }

    #[test]
    fn test_render_skeleton_contains_stubs() {
        let stories = vec![
            Story::simple("User login"),
            Story::simple("Password reset"),
        ];
        let skeleton = render_skeleton(&stories);
        assert!(skeleton.contains("def user_login():"));
        assert!(skeleton.contains("def password_reset():"));
        assert!(skeleton.contains("Requirement: User login"));
        assert!(skeleton.contains("raise NotImplementedError"));
    }
}
