use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use cloudhelper_core::RunResult;
use cloudhelper_tools::{ApprovalGate, ApprovalRequest, DenyAll};
use std::path::PathBuf;
use std::sync::Arc;

mod agent;
mod api;
mod config;
mod workflows;

use config::{AppState, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "cloudhelper")]
#[command(about = "Chat with your cloud environment", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "cloudhelper.toml", env = "CLOUDHELPER_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP webhook listener
    Serve {
        /// Host to bind to (overrides the configuration file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the configuration file and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the agent a single question
    Ask {
        /// What to ask
        utterance: Vec<String>,

        /// Approve every tool call without prompting
        #[arg(long)]
        yes: bool,
    },

    /// Run a built-in workflow
    #[command(subcommand)]
    Workflow(WorkflowCommand),

    /// List the tools the agent can call
    Tools,
}

#[derive(Subcommand, Debug)]
enum WorkflowCommand {
    /// Uppercase and reverse text
    Text { input: String },

    /// List the distinct locations of a subscription's resource groups
    Locations {
        /// Subscription id; defaults to the configured subscription
        subscription: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudhelper=info,tower_http=debug".into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::load(&args.config)?;

    match args.command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let addr = config.server.addr();

            // No one is around to approve tool calls that arrive over the webhook
            let state = AppState::new(config, Arc::new(DenyAll))?;
            tracing::info!("Starting cloudhelper on {}", addr);
            api::serve(&addr, state).await?;
        }
        Command::Ask { utterance, yes } => {
            let gate: Arc<dyn ApprovalGate> = if yes {
                Arc::new(cloudhelper_tools::AutoApprove)
            } else {
                Arc::new(ConsoleApproval)
            };
            let state = AppState::new(config, gate)?;
            let agent = state.agent.context(
                "Chat provider is not configured; set AZURE_OPENAI_API_KEY, \
                 AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_CHAT_DEPLOYMENT_NAME",
            )?;

            let mut history = Vec::new();
            let answer = agent.respond(&mut history, &utterance.join(" ")).await?;
            println!("{}", answer);
        }
        Command::Workflow(command) => {
            let provider = config::build_provider(&config)?;
            let result = match command {
                WorkflowCommand::Text { input } => workflows::text_pipeline()?.run(input).await,
                WorkflowCommand::Locations { subscription } => {
                    let subscription = subscription
                        .or_else(|| config.azure.subscription_id.clone())
                        .context("No subscription given and AZURE_SUBSCRIPTION_ID is not set")?;
                    workflows::resource_locations(provider)?.run(subscription).await
                }
            };
            print_run(&result);
        }
        Command::Tools => {
            let provider = config::build_provider(&config)?;
            let registry = config::build_registry(&config, provider)?;
            for schema in registry.list_schemas() {
                let mode = registry.approval_mode(&schema.name).unwrap_or_default();
                println!("{:<34} {:?}", schema.name, mode);
                println!("    {}", schema.description);
            }
        }
    }

    Ok(())
}

fn print_run(result: &RunResult) {
    for event in result.events() {
        eprintln!("[{}] {}", event.timestamp.format("%H:%M:%S%.3f"), event.message());
    }
    for output in result.get_outputs() {
        let rendered = workflows::render_output(output);
        match rendered {
            serde_json::Value::String(text) => println!("{}", text),
            other => println!(
                "{}",
                serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string())
            ),
        }
    }
    eprintln!("final state: {}", result.get_final_state());
}

/// Asks on the terminal before running a guarded tool
struct ConsoleApproval;

#[async_trait]
impl ApprovalGate for ConsoleApproval {
    async fn approve(&self, request: &ApprovalRequest) -> bool {
        let prompt = format!(
            "Allow tool '{}' with arguments {}? [y/N] ",
            request.tool_name, request.arguments
        );
        let answer = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{}", prompt);
            let _ = stderr.flush();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        matches!(answer, Ok(Ok(line)) if matches!(line.trim(), "y" | "Y" | "yes"))
    }
}
