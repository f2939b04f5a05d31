use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pixbatch_core::config::AppConfig;
use pixbatch_core::error::PixbatchError;
use pixbatch_core::event::EventBus;
use pixbatch_core::traits::DecisionSource;
use pixbatch_core::types::{ApprovalPrompt, DecisionOrigin, RunRequest, SessionId, WorkflowEvent};

use pixbatch_agent::approval::{parse_decision, prompt_text};
use pixbatch_agent::{
    plan_batches, AnswerDecision, BatchPlanner, BulkGenerateTool, HttpRetriever,
    InMemorySessionStore, LocalRuntime, ToolRegistry, WorkflowContext, WorkflowController,
};
use pixbatch_mcp::McpClientManager;

const DEFAULT_PROMPT: &str =
    "Generate 1 image of a cat on a space station looking out the window at Earth.";

#[derive(Parser)]
#[command(name = "pixbatch", version, about = "Approval-gated bulk image generation")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "pixbatch.toml")]
    config: PathBuf,

    /// Session ID (auto-generated if not provided)
    #[arg(short, long)]
    session: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one image request through the approval workflow
    Run {
        /// Approve large bulks without asking
        #[arg(long)]
        auto_approve: bool,
        /// Answer the approval prompt with this text instead of asking
        #[arg(long, conflicts_with = "auto_approve")]
        answer: Option<String>,
        /// Directory for downloaded images (overrides config)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// The image request
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Show how a bulk of images would be split into generation calls
    Plan {
        /// Number of images requested
        count: u32,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Asks the human on the terminal.
///
/// Prints the pause notice itself so it always lands before the prompt.
struct TerminalDecision;

impl DecisionSource for TerminalDecision {
    fn decide<'a>(
        &'a self,
        prompt: &'a ApprovalPrompt,
    ) -> BoxFuture<'a, pixbatch_core::Result<bool>> {
        Box::pin(async move {
            println!("Pausing for approval...");
            if let Some(hint) = &prompt.hint {
                println!("  {}", hint);
            }
            eprintln!("\nApproval Required:");
            eprintln!("Bulk size exceeds threshold ({} images)", prompt.threshold);
            let question = format!("{} (yes/no)", prompt_text(prompt));

            let answer = tokio::task::spawn_blocking(move || {
                dialoguer::Input::<String>::new()
                    .with_prompt(question)
                    .allow_empty(true)
                    .interact_text()
            })
            .await
            .map_err(|e| PixbatchError::Runtime(format!("approval prompt: {}", e)))?;

            read_decision(answer)
        })
    }
}

/// Turn what the approval prompt returned into a decision.
///
/// Ctrl-C or a closed terminal cancels the run, leaving the paused call
/// unanswered. Other read failures reject.
fn read_decision(
    answer: std::result::Result<String, dialoguer::Error>,
) -> pixbatch_core::Result<bool> {
    match answer {
        Ok(text) => Ok(parse_decision(&text)),
        Err(dialoguer::Error::IO(e))
            if matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            debug!(error = %e, "Approval prompt interrupted");
            Err(PixbatchError::Cancelled)
        }
        Err(e) => {
            warn!(error = %e, "Could not read approval, rejecting");
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pixbatch=info,warn")),
        )
        .with_target(false)
        .init();

    // Pick up REPLICATE_API_TOKEN and friends before ${VAR} expansion
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "pixbatch", &mut std::io::stdout());
        return Ok(());
    }

    let config = if cli.config.exists() {
        AppConfig::load(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
        AppConfig::default()
    };

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Some(Commands::Plan { count }) => {
            print_plan(&config, count);
            Ok(())
        }
        Some(Commands::Run {
            auto_approve,
            answer,
            output,
            prompt,
        }) => {
            let mut config = config;
            if let Some(dir) = output {
                config.retrieval.output_dir = dir.display().to_string();
            }
            let query = if prompt.is_empty() {
                DEFAULT_PROMPT.to_string()
            } else {
                prompt.join(" ")
            };
            let auto_approve = auto_approve || config.workflow.auto_approve;
            run_workflow(config, cli.session, query, auto_approve, answer).await
        }
        None | Some(Commands::Completions { .. }) => {
            let auto_approve = config.workflow.auto_approve;
            run_workflow(config, cli.session, DEFAULT_PROMPT.to_string(), auto_approve, None).await
        }
    }
}

fn print_plan(config: &AppConfig, count: u32) {
    let batches = plan_batches(count, config.agent.max_images_per_call);
    println!(
        "{} images -> {} call(s): {:?}",
        count,
        batches.len(),
        batches
    );
    if count > config.workflow.max_bulk_size {
        println!("Refused: above the maximum of {}", config.workflow.max_bulk_size);
    } else if count > config.workflow.large_bulk {
        println!("Requires approval (threshold {})", config.workflow.large_bulk);
    } else {
        println!("Proceeds without approval");
    }
}

async fn run_workflow(
    config: AppConfig,
    session: Option<String>,
    query: String,
    auto_approve: bool,
    answer: Option<String>,
) -> anyhow::Result<()> {
    let event_bus = Arc::new(EventBus::default());
    let sessions = Arc::new(InMemorySessionStore::new());

    let mut tools = ToolRegistry::new();
    tools.register(BulkGenerateTool::from_config(&config.workflow));

    let mcp = Arc::new(McpClientManager::new());
    if let Some(mcp_config) = &config.mcp {
        let count = pixbatch_mcp::connect_configured(&mcp, mcp_config, &mut tools).await;
        debug!(count, "MCP tools available");
    }
    if tools.get(&config.workflow.generation_tool).is_none() {
        warn!(
            tool = %config.workflow.generation_tool,
            "Generation tool not available; approved bulks will produce no images"
        );
    }

    let planner = BatchPlanner::new(&config.agent, config.workflow.generation_tool.clone())?;
    let runtime = Arc::new(LocalRuntime::new(
        config.agent.clone(),
        Arc::new(planner),
        Arc::new(tools),
        sessions.clone(),
    ));
    let cancel = runtime.cancel_token();

    let interactive = answer.is_none() && !auto_approve;
    let decisions: Arc<dyn DecisionSource> = match answer {
        Some(text) => Arc::new(AnswerDecision::new(text)),
        None => Arc::new(TerminalDecision),
    };
    let retriever = Arc::new(HttpRetriever::new(&config.retrieval)?);

    let controller = WorkflowController::new(
        WorkflowContext {
            config: config.workflow.clone(),
            runtime,
            sessions,
            event_bus: event_bus.clone(),
        },
        decisions,
        retriever,
    );

    let mut request = RunRequest::new(query, auto_approve);
    if let Some(sid) = session {
        request = request.with_session(SessionId::from_str(&sid));
    }

    let printer = spawn_printer(&event_bus, interactive);

    let outcome = tokio::select! {
        result = controller.run(&request) => Some(result),
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            eprintln!("\nProcess interrupted by user");
            None
        }
    };

    // Let the printer drain, then give the generation server time to exit.
    tokio::time::sleep(Duration::from_millis(500)).await;
    printer.abort();

    if let Err(e) = mcp.disconnect_all().await {
        if e.is_shutdown_race() {
            debug!(error = %e, "Ignoring MCP shutdown race");
        } else {
            warn!(error = %e, "MCP disconnect failed");
        }
    }

    match outcome {
        Some(Ok(report)) => {
            debug!(trace = ?report.trace, saved = report.saved(), "Workflow finished");
            Ok(())
        }
        Some(Err(e)) if e.is_shutdown_race() => {
            debug!(error = %e, "Ignoring shutdown race");
            Ok(())
        }
        Some(Err(PixbatchError::Cancelled)) => {
            eprintln!("\nProcess interrupted by user");
            Ok(())
        }
        Some(Err(e)) => {
            error!(error = %e, "Workflow failed");
            Err(e.into())
        }
        None => Ok(()),
    }
}

/// Print workflow progress. With an interactive approver the pause notice is
/// left to the prompt.
fn spawn_printer(event_bus: &EventBus, interactive: bool) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::RunStarted { session_id, query } => {
                    println!("\n{}", "=".repeat(60));
                    println!("Session: {}", session_id);
                    println!("User > {}\n", query);
                }
                WorkflowEvent::AgentText(text) => println!("Agent > {}", text),
                WorkflowEvent::ToolCalled { name, args } => {
                    eprintln!("[tool: {}] {}", name, args);
                }
                WorkflowEvent::ToolResponded { name, response } => {
                    let text = response.to_string();
                    eprintln!("[{}: done] {}", name, truncate(&text, 200));
                }
                WorkflowEvent::ApprovalRequested { .. } if interactive => {}
                WorkflowEvent::ApprovalRequested { hint, .. } => {
                    println!("Pausing for approval...");
                    if let Some(hint) = hint {
                        println!("  {}", hint);
                    }
                }
                WorkflowEvent::ApprovalResolved { approved, origin } => {
                    let verdict = if approved { "APPROVE" } else { "REJECT" };
                    match origin {
                        DecisionOrigin::Auto => println!("Human Decision: {} (auto-approved)\n", verdict),
                        DecisionOrigin::Timeout => println!("Human Decision: {} (timed out)\n", verdict),
                        DecisionOrigin::Human => println!("Human Decision: {}\n", verdict),
                    }
                }
                WorkflowEvent::Nudged => {
                    eprintln!("[no images yet, asking the agent to continue]");
                }
                WorkflowEvent::ImagesFound { count } => {
                    println!("{}", "=".repeat(60));
                    if count == 0 {
                        println!("\nNo images were generated");
                    } else {
                        println!("\nGenerated {} images:", count);
                    }
                }
                WorkflowEvent::ImageSaved {
                    index,
                    reference,
                    path,
                } => {
                    println!("Image {} saved as '{}'", index, path.display());
                    println!("     URL: {}", reference);
                }
                WorkflowEvent::ImageFailed { index, error, .. } => {
                    println!("Failed to download image {}: {}", index, error);
                }
                WorkflowEvent::RunComplete { .. } => break,
            }
        }
    })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(kind: std::io::ErrorKind) -> dialoguer::Error {
        dialoguer::Error::IO(std::io::Error::from(kind))
    }

    #[test]
    fn typed_answer_is_parsed() {
        assert!(read_decision(Ok("Yes".into())).unwrap());
        assert!(!read_decision(Ok("nope".into())).unwrap());
    }

    #[test]
    fn interrupted_prompt_cancels_instead_of_rejecting() {
        for kind in [std::io::ErrorKind::Interrupted, std::io::ErrorKind::UnexpectedEof] {
            assert!(matches!(
                read_decision(Err(io_error(kind))),
                Err(PixbatchError::Cancelled)
            ));
        }
    }

    #[test]
    fn other_read_failures_reject() {
        let answer = read_decision(Err(io_error(std::io::ErrorKind::BrokenPipe)));
        assert!(!answer.unwrap());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("short", 200), "short");
    }
}
