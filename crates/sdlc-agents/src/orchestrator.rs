//! Exchange driver: run one requirements document through the agent
//! pipeline.
//!
//! Drives a single cooperative loop: select the next speaker, let the role
//! take its turn, feed the emitted message back into the workflow machine,
//! until a terminal phase, a scheduling halt, or the round limit. A
//! rate-limited upstream aborts the run, and the driver retries the whole
//! run a bounded number of times with a fixed backoff.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};

use crate::agents::{self, Actor, TurnContext};
use crate::approval::ApprovalGate;
use crate::config::PipelineConfig;
use crate::selection::select_next_speaker;
use crate::state_machine::{Phase, TransitionRecord, WorkflowMachine};
use crate::stories::Story;
use crate::tools::jira::TicketSink;
use crate::tools::storage::StorageShim;
use crate::tools::ToolError;

/// One message in the shared exchange history.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub actor: Actor,
    pub content: String,
}

/// Final snapshot of a run.
#[derive(Debug)]
pub struct RunOutcome {
    pub phase: Phase,
    pub stories: Vec<Story>,
    pub issue_keys: Vec<String>,
    pub error_message: Option<String>,
    pub rounds: u32,
    pub history: Vec<ChatMessage>,
    pub transitions: Vec<TransitionRecord>,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.phase == Phase::Completed
    }
}

pub struct Orchestrator {
    config: PipelineConfig,
    storage: Arc<dyn StorageShim>,
    sink: Arc<dyn TicketSink>,
    gate: Arc<ApprovalGate>,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        storage: Arc<dyn StorageShim>,
        sink: Arc<dyn TicketSink>,
        gate: Arc<ApprovalGate>,
    ) -> Self {
        Self {
            config,
            storage,
            sink,
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    /// Run one input document through the pipeline.
    ///
    /// Rate-limited runs are retried from scratch up to
    /// `config.max_attempts` times with `config.retry_backoff` between
    /// attempts, then surface a terminal exhaustion error.
    pub async fn run(&self, input_path: &str) -> Result<RunOutcome> {
        let mut attempt = 1;
        loop {
            match self.drive(input_path).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if rate_limited(&e) => {
                    if attempt >= self.config.max_attempts {
                        bail!("API quota limit exceeded after {attempt} attempts");
                    }
                    warn!(
                        attempt,
                        max_attempts = self.config.max_attempts,
                        backoff_secs = self.config.retry_backoff.as_secs(),
                        error = %e,
                        "rate limited, retrying run"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt: drive the exchange until a terminal phase or a halt.
    async fn drive(&self, input_path: &str) -> Result<RunOutcome> {
        let mut machine = WorkflowMachine::new(input_path);
        machine.start_processing().context("starting run")?;
        info!(input = input_path, "run started");

        let mut history: Vec<ChatMessage> = Vec::new();
        let mut last_actor: Option<Actor> = None;
        let mut rounds = 0u32;

        while rounds < self.config.max_rounds {
            let Some(actor) = select_next_speaker(last_actor, &machine) else {
                break;
            };
            rounds += 1;
            machine.set_round(rounds);

            let turn = {
                let ctx = TurnContext {
                    storage: self.storage.as_ref(),
                    sink: self.sink.as_ref(),
                    gate: self.gate.as_ref(),
                    machine: &machine,
                    config: &self.config,
                };
                agents::take_turn(actor, &ctx).await
            };

            match turn {
                Ok(text) => {
                    debug!(round = rounds, actor = %actor, len = text.len(), "turn produced message");
                    machine.on_message(&text, actor);
                    history.push(ChatMessage {
                        actor,
                        content: text,
                    });
                    last_actor = Some(actor);
                }
                Err(e) if e.is_rate_limited() => return Err(e.into()),
                Err(e) => {
                    // Upstream failure: capture it into the run instead of
                    // escaping the exchange.
                    error!(actor = %actor, error = %e, "turn failed");
                    machine.fail(&e.to_string());
                }
            }
        }

        if !machine.is_terminal() {
            if rounds >= self.config.max_rounds {
                machine.fail(&format!("round limit ({}) reached", self.config.max_rounds));
            } else {
                warn!(phase = %machine.phase(), "exchange halted before a terminal phase");
            }
        }

        info!(phase = %machine.phase(), rounds, history = %machine.summary(), "run finished");

        Ok(RunOutcome {
            phase: machine.phase(),
            stories: machine.stories().map(<[Story]>::to_vec).unwrap_or_default(),
            issue_keys: machine
                .issue_keys()
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            error_message: machine.error_message().map(str::to_string),
            rounds,
            history,
            transitions: machine.transitions().to_vec(),
        })
    }
}

fn rate_limited(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ToolError>()
        .is_some_and(ToolError::is_rate_limited)
}
