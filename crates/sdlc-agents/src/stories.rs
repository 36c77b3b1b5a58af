//! Story records and the requirement-document parser.
//!
//! A requirements document is plain text with one requirement per line.
//! Blank lines and `#` comment lines are skipped; every remaining line
//! becomes exactly one [`Story`]. The templated style additionally rewrites
//! list-style lines (`1. ...` or `- ...`) into "As a user, I want to ..."
//! stories with boilerplate acceptance criteria.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Ticket priority as understood by the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// A single requirement translated into a ticket-ready record.
///
/// Immutable once created; revisions replace the whole collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub summary: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<u32>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub story_type: Option<String>,
}

impl Story {
    /// One requirement line, passed through as-is.
    pub fn simple(line: &str) -> Self {
        Self {
            summary: line.to_string(),
            description: format!("Requirement: {line}"),
            priority: None,
            story_points: None,
            story_type: None,
        }
    }

    /// One requirement line rewritten into user-story form with fixed
    /// boilerplate acceptance criteria.
    pub fn templated(text: &str) -> Self {
        let mut chars = text.chars();
        let body = match chars.next() {
            Some(c) => c.to_lowercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        };
        Self {
            summary: format!("As a user, I want to {body}"),
            description: format!(
                "User Story: {text}\n\n\
                 Acceptance Criteria:\n\
                 - The feature is reachable from the main application flow\n\
                 - Input is validated and errors are surfaced to the user\n\
                 - The change is covered by automated tests"
            ),
            priority: Some(Priority::Medium),
            story_points: Some(3),
            story_type: Some("User Story".to_string()),
        }
    }
}

/// How requirement lines are turned into stories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserStyle {
    /// Line becomes the summary verbatim.
    #[default]
    Simple,
    /// List-style lines become templated user stories.
    Templated,
}

/// Parse a requirements document into stories.
pub fn parse_requirements(content: &str, style: ParserStyle) -> Vec<Story> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            Some(match style {
                ParserStyle::Simple => Story::simple(line),
                ParserStyle::Templated => match strip_list_marker(line) {
                    Some(text) => Story::templated(text),
                    None => Story::simple(line),
                },
            })
        })
        .collect()
}

/// Strip a leading `1.` / `23.` / `-` list marker, returning the remainder.
fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix('-') {
        return Some(rest.trim_start());
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix('.') {
            return Some(rest.trim_start());
        }
    }
    None
}

static ARRAY_RE: OnceLock<Regex> = OnceLock::new();

/// Find the first bracketed JSON-array candidate in free-form message text.
///
/// Greedy from the first `[` to the last `]`, spanning newlines, so a payload
/// embedded in surrounding prose is still picked up. The caller decides
/// whether the candidate actually parses.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let re = ARRAY_RE.get_or_init(|| Regex::new(r"(?s)\[.*\]").expect("array pattern is valid"));
    re.find(text).map(|m| m.as_str())
}
