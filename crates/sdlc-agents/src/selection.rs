//! Speaker selection: which actor takes the floor after each message.
//!
//! Consulted by the exchange driver after every turn. Delegates to the
//! workflow machine's phase-to-actor mapping, with two overrides: terminal
//! phases end the exchange, and the reviewer always holds the floor while
//! stories are under review.

use tracing::{debug, warn};

use crate::agents::Actor;
use crate::state_machine::{Phase, WorkflowMachine};

/// Pick the next speaker, or `None` to end the exchange.
pub fn select_next_speaker(
    last_actor: Option<Actor>,
    machine: &WorkflowMachine,
) -> Option<Actor> {
    let phase = machine.phase();

    if phase.is_terminal() {
        debug!(%phase, "terminal phase, ending exchange");
        return None;
    }

    // The reviewer must always be given the floor while stories are being
    // displayed or awaiting a verdict, regardless of who spoke last.
    if matches!(phase, Phase::DisplayingStories | Phase::WaitingApproval) {
        return Some(Actor::Reviewer);
    }

    let next = machine.current_actor()?;

    // Pairwise hand-off guard. The phase mapping and the allowed-successor
    // table normally agree; a mismatch means the phase and the actor history
    // have drifted apart, so halt rather than produce an illegal hand-off.
    // CreatingTickets is exempt: the ticket creator must run once approval
    // has been granted.
    if let Some(last) = last_actor {
        if phase != Phase::CreatingTickets && !last.allowed_successors().contains(&next) {
            warn!(
                %phase,
                last = %last,
                next = %next,
                "hand-off not in allowed-transition table, halting exchange"
            );
            return None;
        }
    }

    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY_PAYLOAD: &str = r#"[{"summary":"a","description":"b"}]"#;

    fn machine_at(phase: Phase) -> WorkflowMachine {
        let mut m = WorkflowMachine::new("req.txt");
        if phase == Phase::Initial {
            return m;
        }
        m.start_processing().unwrap();
        if phase == Phase::Failed {
            m.fail("induced failure");
        }
        if matches!(
            phase,
            Phase::DisplayingStories
                | Phase::WaitingApproval
                | Phase::CreatingTickets
                | Phase::Completed
        ) {
            m.on_message(STORY_PAYLOAD, Actor::Analyst);
        }
        if matches!(
            phase,
            Phase::WaitingApproval | Phase::CreatingTickets | Phase::Completed
        ) {
            m.on_message("stories displayed", Actor::Reviewer);
        }
        if matches!(phase, Phase::CreatingTickets | Phase::Completed) {
            m.on_message("create these tickets: go", Actor::Reviewer);
        }
        if phase == Phase::Completed {
            m.on_message(r#"["SDLC-1"]"#, Actor::TicketCreator);
        }
        assert_eq!(m.phase(), phase);
        m
    }

    #[test]
    fn test_terminal_phases_end_exchange() {
        assert_eq!(
            select_next_speaker(Some(Actor::TicketCreator), &machine_at(Phase::Completed)),
            None
        );
        assert_eq!(
            select_next_speaker(Some(Actor::Analyst), &machine_at(Phase::Failed)),
            None
        );
    }

    #[test]
    fn test_reviewer_forced_while_displaying() {
        let m = machine_at(Phase::DisplayingStories);
        assert_eq!(
            select_next_speaker(Some(Actor::Analyst), &m),
            Some(Actor::Reviewer)
        );
        assert_eq!(select_next_speaker(None, &m), Some(Actor::Reviewer));
    }

    #[test]
    fn test_reviewer_forced_while_waiting_approval() {
        // The phase override beats the pairwise table: even though the table
        // would permit Reviewer → TicketCreator, the reviewer keeps the floor.
        let m = machine_at(Phase::WaitingApproval);
        assert_eq!(
            select_next_speaker(Some(Actor::Reviewer), &m),
            Some(Actor::Reviewer)
        );
    }

    #[test]
    fn test_initial_phase_has_no_speaker() {
        assert_eq!(select_next_speaker(None, &machine_at(Phase::Initial)), None);
    }

    #[test]
    fn test_first_turn_goes_to_analyst() {
        let m = machine_at(Phase::ProcessingRequirements);
        assert_eq!(select_next_speaker(None, &m), Some(Actor::Analyst));
    }

    #[test]
    fn test_desync_halts_exchange() {
        // Analyst spoke but the phase still points at Analyst; the pairwise
        // table (Analyst → Reviewer only) refuses the self hand-off.
        let m = machine_at(Phase::ProcessingRequirements);
        assert_eq!(select_next_speaker(Some(Actor::Analyst), &m), None);
    }

    #[test]
    fn test_creating_tickets_allows_reviewer_hand_off() {
        let m = machine_at(Phase::CreatingTickets);
        assert_eq!(
            select_next_speaker(Some(Actor::Reviewer), &m),
            Some(Actor::TicketCreator)
        );
    }

    #[test]
    fn test_creating_tickets_is_exempt_from_pairwise_guard() {
        // Even a desynced history must not block ticket creation once
        // approval was granted.
        let m = machine_at(Phase::CreatingTickets);
        assert_eq!(
            select_next_speaker(Some(Actor::Analyst), &m),
            Some(Actor::TicketCreator)
        );
    }
}
