//! Workflow state machine: phases, legal transition guards, and the
//! message rules that move a run forward.
//!
//! One [`WorkflowMachine`] owns the state of a single run: the current
//! [`Phase`], the live story collection, and any captured error. It is
//! mutated only through [`WorkflowMachine::start_processing`] and
//! [`WorkflowMachine::on_message`]; every transition is validated against
//! the phase graph and recorded for replay and diagnostics.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::agents::Actor;
use crate::stories::{extract_json_array, Story};

/// The phases of a run.
///
/// Every run starts at `Initial` and terminates at either `Completed` or
/// `Failed`; exactly one phase is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Run created, nothing observed yet.
    Initial,
    /// Analyst is turning the requirements document into stories.
    ProcessingRequirements,
    /// Reviewer is surfacing the drafted stories to the human.
    DisplayingStories,
    /// Waiting for the human approval verdict.
    WaitingApproval,
    /// TicketCreator is pushing approved stories to the tracker.
    CreatingTickets,
    /// All tickets created (terminal).
    Completed,
    /// Captured error (terminal).
    Failed,
}

impl Phase {
    /// Whether this is a terminal phase (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "Initial"),
            Self::ProcessingRequirements => write!(f, "ProcessingRequirements"),
            Self::DisplayingStories => write!(f, "DisplayingStories"),
            Self::WaitingApproval => write!(f, "WaitingApproval"),
            Self::CreatingTickets => write!(f, "CreatingTickets"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal transitions between phases.
///
/// ```text
/// Initial → ProcessingRequirements
/// ProcessingRequirements → DisplayingStories
/// DisplayingStories → WaitingApproval
/// WaitingApproval → CreatingTickets | ProcessingRequirements (revise)
/// CreatingTickets → Completed
/// any non-terminal → Failed
/// ```
fn is_legal_transition(from: Phase, to: Phase) -> bool {
    use Phase::*;

    // Any non-terminal phase can transition to Failed.
    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Initial, ProcessingRequirements)
            | (ProcessingRequirements, DisplayingStories)
            | (DisplayingStories, WaitingApproval)
            | (WaitingApproval, CreatingTickets)
            // Revision request sends the run back for a fresh draft
            | (WaitingApproval, ProcessingRequirements)
            | (CreatingTickets, Completed)
    )
}

/// A single recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// The phase transitioned from.
    pub from: Phase,
    /// The phase transitioned to.
    pub to: Phase,
    /// Exchange round at the time of transition (0 before the first turn).
    pub round: u32,
    /// Milliseconds since the run was created.
    pub elapsed_ms: u64,
    /// Optional context about why this transition happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub from: Phase,
    pub to: Phase,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// The workflow state machine for one run.
///
/// Holds the run's mutable state and the complete transition log. The run is
/// exclusively owned by its machine for its whole lifetime, so there is no
/// ambient shared state to race on.
pub struct WorkflowMachine {
    phase: Phase,
    input_path: String,
    stories: Option<Vec<Story>>,
    issue_keys: Option<Vec<String>>,
    error_message: Option<String>,
    last_actor: Option<Actor>,
    last_message: Option<String>,
    round: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl WorkflowMachine {
    /// Create a new machine for one input document, starting at `Initial`.
    pub fn new(input_path: impl Into<String>) -> Self {
        Self {
            phase: Phase::Initial,
            input_path: input_path.into(),
            stories: None,
            issue_keys: None,
            error_message: None,
            last_actor: None,
            last_message: None,
            round: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    /// The live story collection, if one has been drafted.
    pub fn stories(&self) -> Option<&[Story]> {
        self.stories.as_deref()
    }

    /// Issue keys reported by the ticket creator, once the run completed.
    pub fn issue_keys(&self) -> Option<&[String]> {
        self.issue_keys.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn last_actor(&self) -> Option<Actor> {
        self.last_actor
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    /// Set the exchange round counter (called by the driver loop).
    pub fn set_round(&mut self, round: u32) {
        self.round = round;
    }

    /// Whether the machine is in a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Get the full transition log.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Begin the run: `Initial → ProcessingRequirements`.
    pub fn start_processing(&mut self) -> Result<(), InvalidTransition> {
        self.advance(Phase::ProcessingRequirements, Some("run started"))
    }

    /// The actor expected to speak in the current phase.
    ///
    /// `None` for `Initial` (nothing to say yet) and for terminal phases.
    pub fn current_actor(&self) -> Option<Actor> {
        match self.phase {
            Phase::ProcessingRequirements => Some(Actor::Analyst),
            Phase::DisplayingStories | Phase::WaitingApproval => Some(Actor::Reviewer),
            Phase::CreatingTickets => Some(Actor::TicketCreator),
            Phase::Initial | Phase::Completed | Phase::Failed => None,
        }
    }

    /// Observe one message from the shared channel and apply at most one
    /// transition rule. First match wins; a message matching no rule is
    /// logged and ignored.
    ///
    /// A bracketed payload candidate that fails to parse is dropped without
    /// a phase change, even if the surrounding text mentions an error; only
    /// payload-free error reports fail the run.
    pub fn on_message(&mut self, text: &str, actor: Actor) {
        self.last_actor = Some(actor);
        self.last_message = Some(text.to_string());

        match (self.phase, actor) {
            (Phase::ProcessingRequirements, Actor::Analyst) => {
                if let Some(raw) = extract_json_array(text) {
                    match serde_json::from_str::<Vec<Story>>(raw) {
                        Ok(stories) => {
                            let count = stories.len();
                            self.stories = Some(stories);
                            self.advance_or_fail(
                                Phase::DisplayingStories,
                                &format!("{count} stories received"),
                            );
                        }
                        Err(e) => {
                            debug!(actor = %actor, error = %e, "dropping malformed story payload");
                        }
                    }
                } else if contains_error(text) {
                    self.error_message = Some(text.to_string());
                    self.fail("analyst reported an error");
                } else {
                    debug!(actor = %actor, "message matched no rule, ignored");
                }
            }

            (Phase::DisplayingStories, Actor::Reviewer) => {
                if text.trim() == "stories displayed" {
                    self.advance_or_fail(Phase::WaitingApproval, "stories shown to reviewer");
                } else {
                    debug!(actor = %actor, "waiting for display marker, ignored");
                }
            }

            (Phase::WaitingApproval, Actor::Reviewer) => {
                let lower = text.trim_start().to_lowercase();
                if lower.starts_with("create these tickets:") {
                    match self.stories.as_deref() {
                        Some(stories) if !stories.is_empty() => {
                            self.advance_or_fail(Phase::CreatingTickets, "approval received");
                        }
                        _ => {
                            self.error_message =
                                Some("approval received with no stories to create".to_string());
                            self.fail("no live story collection at approval");
                        }
                    }
                } else if lower.contains("revise") {
                    // The whole collection is replaced on the next draft.
                    self.stories = None;
                    self.advance_or_fail(Phase::ProcessingRequirements, "revision requested");
                } else {
                    debug!(actor = %actor, "waiting for approval, no transition");
                }
            }

            (Phase::CreatingTickets, Actor::TicketCreator) => {
                if let Some(raw) = extract_json_array(text) {
                    match serde_json::from_str::<Vec<String>>(raw) {
                        Ok(keys) => {
                            let count = keys.len();
                            self.issue_keys = Some(keys);
                            self.advance_or_fail(
                                Phase::Completed,
                                &format!("{count} tickets created"),
                            );
                        }
                        Err(e) => {
                            debug!(actor = %actor, error = %e, "dropping malformed issue-key payload");
                        }
                    }
                } else if contains_error(text) {
                    self.error_message = Some(text.to_string());
                    self.fail("ticket creator reported an error");
                } else {
                    debug!(actor = %actor, "message matched no rule, ignored");
                }
            }

            _ => {
                debug!(phase = %self.phase, actor = %actor, "no rule for phase/actor pair, ignored");
            }
        }
    }

    /// Force the run into `Failed`, capturing the reason.
    ///
    /// Legal from any non-terminal phase; a no-op (with a warning) once the
    /// run is already terminal.
    pub fn fail(&mut self, reason: &str) {
        if self.phase.is_terminal() {
            warn!(phase = %self.phase, reason, "fail requested in terminal phase, ignored");
            return;
        }
        if self.error_message.is_none() {
            self.error_message = Some(reason.to_string());
        }
        // Always legal from non-terminal phases.
        let _ = self.advance(Phase::Failed, Some(reason));
    }

    /// Attempt to advance to the next phase.
    ///
    /// Returns `Err(InvalidTransition)` if the move would violate the phase
    /// graph; the phase is left unchanged in that case.
    fn advance(&mut self, to: Phase, reason: Option<&str>) -> Result<(), InvalidTransition> {
        if !is_legal_transition(self.phase, to) {
            return Err(InvalidTransition {
                from: self.phase,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.phase,
            to,
            round: self.round,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        debug!(from = %self.phase, to = %to, round = self.round, "phase transition");

        self.transitions.push(record);
        self.phase = to;
        Ok(())
    }

    /// Advance, converting an unexpected guard violation into `Failed` so
    /// that nothing escapes message evaluation as a raised error.
    fn advance_or_fail(&mut self, to: Phase, reason: &str) {
        if let Err(e) = self.advance(to, Some(reason)) {
            warn!(error = %e, "rule fired an illegal transition, failing run");
            self.error_message = Some(e.to_string());
            self.fail(&e.to_string());
        }
    }

    /// Compact history string for the run log.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        format!(
            "{} ({} transitions{})",
            self.phase,
            self.transitions.len(),
            if states.is_empty() {
                String::new()
            } else {
                format!(": {}", states.join(" → "))
            }
        )
    }
}

fn contains_error(text: &str) -> bool {
    text.to_lowercase().contains("error")
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY_PAYLOAD: &str = r#"[{"summary":"a","description":"b"}]"#;
    const KEYS_PAYLOAD: &str = r#"["SDLC-1","SDLC-2"]"#;

    fn machine_at_waiting_approval() -> WorkflowMachine {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message(STORY_PAYLOAD, Actor::Analyst);
        m.on_message("stories displayed", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::WaitingApproval);
        m
    }

    #[test]
    fn test_initial_state() {
        let m = WorkflowMachine::new("req.txt");
        assert_eq!(m.phase(), Phase::Initial);
        assert!(!m.is_terminal());
        assert!(m.stories().is_none());
        assert!(m.transitions().is_empty());
        assert_eq!(m.current_actor(), None);
    }

    #[test]
    fn test_start_processing_only_from_initial() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        assert_eq!(m.phase(), Phase::ProcessingRequirements);

        let err = m.start_processing().unwrap_err();
        assert_eq!(err.from, Phase::ProcessingRequirements);
        assert_eq!(err.to, Phase::ProcessingRequirements);
        // Failed attempt does not mutate the phase.
        assert_eq!(m.phase(), Phase::ProcessingRequirements);
    }

    #[test]
    fn test_happy_path() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();

        m.on_message(STORY_PAYLOAD, Actor::Analyst);
        assert_eq!(m.phase(), Phase::DisplayingStories);
        let stories = m.stories().unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].summary, "a");

        m.on_message("stories displayed", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::WaitingApproval);

        m.on_message(
            &format!("Create these tickets: {STORY_PAYLOAD}"),
            Actor::Reviewer,
        );
        assert_eq!(m.phase(), Phase::CreatingTickets);

        m.on_message(KEYS_PAYLOAD, Actor::TicketCreator);
        assert_eq!(m.phase(), Phase::Completed);
        assert!(m.is_terminal());
        assert_eq!(
            m.issue_keys().unwrap(),
            &["SDLC-1".to_string(), "SDLC-2".to_string()]
        );
        assert_eq!(m.transitions().len(), 5);
    }

    #[test]
    fn test_analyst_error_fails_run() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message("Error: timeout", Actor::Analyst);
        assert_eq!(m.phase(), Phase::Failed);
        assert!(m.error_message().is_some());
        assert!(!m.error_message().unwrap().is_empty());
    }

    #[test]
    fn test_ticket_creator_error_fails_run() {
        let mut m = machine_at_waiting_approval();
        m.on_message("create these tickets: go", Actor::Reviewer);
        m.on_message("Error: tracker unavailable", Actor::TicketCreator);
        assert_eq!(m.phase(), Phase::Failed);
        assert_eq!(m.error_message(), Some("Error: tracker unavailable"));
    }

    #[test]
    fn test_unmatched_messages_leave_phase_unchanged() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();

        // Wrong actor for the phase.
        m.on_message(STORY_PAYLOAD, Actor::Reviewer);
        m.on_message("stories displayed", Actor::TicketCreator);
        m.on_message("anything", Actor::Coder);
        // Right actor, no matching condition.
        m.on_message("still thinking about it", Actor::Analyst);
        assert_eq!(m.phase(), Phase::ProcessingRequirements);
        assert!(m.stories().is_none());
    }

    #[test]
    fn test_display_marker_must_match_exactly() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message(STORY_PAYLOAD, Actor::Analyst);

        m.on_message("Stories displayed on UI, waiting", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::DisplayingStories);

        m.on_message("  stories displayed  ", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::WaitingApproval);
    }

    #[test]
    fn test_malformed_payload_is_dropped_even_with_error_text() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message("error in payload: [{\"summary\": }]", Actor::Analyst);
        assert_eq!(m.phase(), Phase::ProcessingRequirements);
        assert!(m.error_message().is_none());
    }

    #[test]
    fn test_empty_array_still_advances() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message("[]", Actor::Analyst);
        assert_eq!(m.phase(), Phase::DisplayingStories);
        assert_eq!(m.stories().unwrap().len(), 0);
    }

    #[test]
    fn test_approval_without_stories_fails() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message("[]", Actor::Analyst);
        m.on_message("stories displayed", Actor::Reviewer);
        m.on_message("create these tickets: []", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::Failed);
        assert!(m
            .error_message()
            .unwrap()
            .contains("no stories to create"));
    }

    #[test]
    fn test_revise_round_trip() {
        let mut m = machine_at_waiting_approval();

        m.on_message("Please revise these stories", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::ProcessingRequirements);
        assert!(m.stories().is_none(), "revision clears the collection");

        // A fresh draft can still complete the run.
        m.on_message(STORY_PAYLOAD, Actor::Analyst);
        m.on_message("stories displayed", Actor::Reviewer);
        m.on_message("Create these tickets: [...]", Actor::Reviewer);
        m.on_message(KEYS_PAYLOAD, Actor::TicketCreator);
        assert_eq!(m.phase(), Phase::Completed);
    }

    #[test]
    fn test_approval_prefix_is_case_insensitive() {
        let mut m = machine_at_waiting_approval();
        m.on_message("Create these tickets: [...]", Actor::Reviewer);
        assert_eq!(m.phase(), Phase::CreatingTickets);
    }

    #[test]
    fn test_current_actor_mapping() {
        let mut m = WorkflowMachine::new("req.txt");
        assert_eq!(m.current_actor(), None);
        m.start_processing().unwrap();
        assert_eq!(m.current_actor(), Some(Actor::Analyst));
        m.on_message(STORY_PAYLOAD, Actor::Analyst);
        assert_eq!(m.current_actor(), Some(Actor::Reviewer));
        m.on_message("stories displayed", Actor::Reviewer);
        assert_eq!(m.current_actor(), Some(Actor::Reviewer));
        m.on_message("create these tickets: go", Actor::Reviewer);
        assert_eq!(m.current_actor(), Some(Actor::TicketCreator));
        m.on_message(KEYS_PAYLOAD, Actor::TicketCreator);
        assert_eq!(m.current_actor(), None);
    }

    #[test]
    fn test_current_actor_is_idempotent() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        assert_eq!(m.current_actor(), m.current_actor());
    }

    #[test]
    fn test_fail_from_any_non_terminal_phase() {
        for phase in [
            Phase::Initial,
            Phase::ProcessingRequirements,
            Phase::DisplayingStories,
            Phase::WaitingApproval,
            Phase::CreatingTickets,
        ] {
            let mut m = WorkflowMachine::new("req.txt");
            m.phase = phase;
            m.fail("boom");
            assert_eq!(m.phase(), Phase::Failed);
            assert_eq!(m.error_message(), Some("boom"));
        }
    }

    #[test]
    fn test_terminal_phase_ignores_everything() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.on_message("some error occurred", Actor::Analyst);
        assert_eq!(m.phase(), Phase::Failed);

        m.on_message(STORY_PAYLOAD, Actor::Analyst);
        m.fail("again");
        assert_eq!(m.phase(), Phase::Failed);
        assert_eq!(m.transitions().len(), 2);
    }

    #[test]
    fn test_transition_record_has_reason() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        let record = &m.transitions()[0];
        assert_eq!(record.from, Phase::Initial);
        assert_eq!(record.to, Phase::ProcessingRequirements);
        assert_eq!(record.reason.as_deref(), Some("run started"));
    }

    #[test]
    fn test_transition_record_serde_round_trip() {
        let record = TransitionRecord {
            from: Phase::WaitingApproval,
            to: Phase::CreatingTickets,
            round: 4,
            elapsed_ms: 1234,
            reason: Some("approval received".into()),
        };
        let json = serde_json::to_string(&record).unwrap();
        let restored: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.from, Phase::WaitingApproval);
        assert_eq!(restored.to, Phase::CreatingTickets);
        assert_eq!(restored.round, 4);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::ProcessingRequirements.to_string(), "ProcessingRequirements");
        assert_eq!(Phase::Failed.to_string(), "Failed");
    }

    #[test]
    fn test_summary_mentions_history() {
        let mut m = WorkflowMachine::new("req.txt");
        m.start_processing().unwrap();
        m.fail("boom");
        let summary = m.summary();
        assert!(summary.contains("Failed"));
        assert!(summary.contains("2 transitions"));
    }
}
