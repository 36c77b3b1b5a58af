use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use sdlc_agents::agents::coder;
use sdlc_agents::approval::ApprovalGate;
use sdlc_agents::config::{PipelineConfig, StorageBackend};
use sdlc_agents::orchestrator::Orchestrator;
use sdlc_agents::state_machine::Phase;
use sdlc_agents::stories::ParserStyle;
use sdlc_agents::telemetry;
use sdlc_agents::tools::jira::{JiraSink, TicketSink};
use sdlc_agents::tools::storage::{FsStorage, HttpStorage, StorageShim};

#[derive(Parser)]
#[command(
    name = "sdlc-agents",
    about = "Turn a requirements document into approved Jira stories"
)]
struct Cli {
    /// Requirements document (.txt, one requirement per line).
    input: PathBuf,

    /// Optional TOML config file; environment variables otherwise.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rewrite list-style lines into templated "As a user, ..." stories.
    #[arg(long)]
    templated: bool,

    /// Approve automatically once stories are published (no stdin prompt).
    #[arg(long)]
    auto_approve: bool,

    /// Also render the approved stories into a skeleton code file.
    #[arg(long)]
    generate_code: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    if cli.input.extension().and_then(|e| e.to_str()) != Some("txt") {
        bail!("only .txt requirement documents are supported");
    }

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if cli.templated {
        config.parser_style = ParserStyle::Templated;
    }

    let storage: Arc<dyn StorageShim> = match &config.storage {
        StorageBackend::Local { root } => {
            std::fs::create_dir_all(root)
                .with_context(|| format!("creating storage root {}", root.display()))?;
            Arc::new(FsStorage::new(root))
        }
        StorageBackend::Remote { base_url } => Arc::new(HttpStorage::new(base_url.clone())),
    };

    let Some(jira) = config.jira.clone() else {
        bail!(
            "Jira endpoint not configured \
             (set JIRA_INSTANCE_URL, JIRA_USERNAME and JIRA_API_TOKEN)"
        );
    };
    let sink: Arc<dyn TicketSink> = Arc::new(JiraSink::new(jira));
    let gate = Arc::new(ApprovalGate::new());

    // Stage the upload the same way the web form did: a timestamped copy
    // inside the storage root.
    let raw = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let staged = format!(
        "upload_{}.txt",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    storage
        .write(&staged, &raw)
        .await
        .context("staging uploaded requirements")?;
    info!(file = %staged, "requirements uploaded");

    spawn_story_printer(Arc::clone(&gate));
    if cli.auto_approve {
        spawn_auto_approver(Arc::clone(&gate));
    } else {
        spawn_stdin_reviewer(Arc::clone(&gate));
    }

    let orchestrator = Orchestrator::new(
        config,
        Arc::clone(&storage),
        sink,
        Arc::clone(&gate),
    );
    let outcome = orchestrator.run(&staged).await?;

    match outcome.phase {
        Phase::Completed => {
            info!(rounds = outcome.rounds, "run completed");
            println!("Created {} tickets:", outcome.issue_keys.len());
            for key in &outcome.issue_keys {
                println!("  {key}");
            }
        }
        Phase::Failed => {
            let reason = outcome
                .error_message
                .unwrap_or_else(|| "unknown error".to_string());
            bail!("run failed: {reason}");
        }
        phase => {
            warn!(%phase, "run halted before completion");
            bail!("run halted in phase {phase}");
        }
    }

    if cli.generate_code && outcome.succeeded() {
        let path = coder::write_skeleton(storage.as_ref(), &staged, &outcome.stories)
            .await
            .context("writing code skeleton")?;
        println!("Skeleton code written to {path}");
    }

    Ok(())
}

/// Print each published story collection so the human can review it.
///
/// A publication from before this task subscribed is already visible and
/// will never fire `changed()`, so the current value is handled first.
fn spawn_story_printer(gate: Arc<ApprovalGate>) {
    tokio::spawn(async move {
        let mut rx = gate.subscribe_stories();
        loop {
            let stories = rx.borrow_and_update().clone();
            if !stories.is_empty() {
                println!("\n{} stories ready for review:", stories.len());
                for (i, story) in stories.iter().enumerate() {
                    println!("  {}. {}", i + 1, story.summary);
                    println!("     {}", story.description.lines().next().unwrap_or_default());
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });
}

/// Approve every publication as soon as it appears, including one visible
/// before this task subscribed.
fn spawn_auto_approver(gate: Arc<ApprovalGate>) {
    tokio::spawn(async move {
        let mut rx = gate.subscribe_stories();
        loop {
            if !rx.borrow_and_update().is_empty() {
                match gate.approve() {
                    Ok(()) => info!("stories auto-approved"),
                    Err(e) => warn!(error = %e, "auto-approval skipped"),
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    });
}

/// Read `approve` / `revise` commands from stdin.
fn spawn_stdin_reviewer(gate: Arc<ApprovalGate>) {
    tokio::spawn(async move {
        use tokio::io::{AsyncBufReadExt, BufReader};

        println!("Type `approve` or `revise` once stories are displayed.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim().to_lowercase().as_str() {
                "approve" => {
                    if let Err(e) = gate.approve() {
                        eprintln!("{e}");
                    }
                }
                "revise" => gate.request_revision(),
                "" => {}
                other => eprintln!("unknown command `{other}` (expected approve/revise)"),
            }
        }
    });
}
