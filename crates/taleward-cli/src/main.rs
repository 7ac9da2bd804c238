//! Taleward CLI.
//!
//! Run a moderated turn from a conversation file, check how a model id is
//! routed, validate an adventure, or read the game state out of a turn.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use taleward_core::{extract_game_state, AdventureConfig, Message};
use taleward_runtime::{RuntimeConfig, TurnOrchestrator, TurnRequest};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "taleward", version, about = "Moderated storytelling turns")]
struct Cli {
    /// Runtime config (modes, rendezvous timings, router, providers)
    #[arg(long, global = true, env = "TALEWARD_RUNTIME")]
    runtime: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one turn request against an adventure
    Turn {
        /// Adventure file (YAML or JSON)
        #[arg(short, long)]
        adventure: PathBuf,

        /// Mode model name, e.g. cyoa-dual
        #[arg(short, long)]
        model: String,

        /// Conversation as a JSON or YAML list of {role, content}; `-` reads stdin
        conversation: PathBuf,

        /// Seed for difficulty rolls
        #[arg(long)]
        conversation_id: Option<String>,

        #[arg(short, long, value_enum, default_value = "turn")]
        output: TurnOutput,
    },

    /// Show which provider serves a model id
    Route {
        model: String,
    },

    /// List the model names that select each mode
    Models,

    /// Validate an adventure file
    Validate {
        file: PathBuf,
    },

    /// Extract turn counter, choices and inventory from a turn text
    State {
        /// Turn text file; `-` reads stdin
        file: PathBuf,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum TurnOutput {
    /// Engine response with pipeline and refusal traces
    Turn,
    /// OpenAI-style chat.completion body
    Completion,
    /// Turn text only
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let runtime = load_runtime(cli.runtime.as_deref())?;

    match cli.command {
        Commands::Turn {
            adventure,
            model,
            conversation,
            conversation_id,
            output,
        } => run_turn(&runtime, &adventure, model, &conversation, conversation_id, output).await,
        Commands::Route { model } => route(&runtime, &model).await,
        Commands::Models => {
            for id in runtime.modes.identifiers() {
                println!("{}", id);
            }
            Ok(())
        }
        Commands::Validate { file } => validate(&file),
        Commands::State { file } => {
            let text = read_input(&file)?;
            println!("{}", serde_json::to_string_pretty(&extract_game_state(&text))?);
            Ok(())
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("taleward={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn load_runtime(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading runtime config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

async fn run_turn(
    runtime: &RuntimeConfig,
    adventure: &Path,
    model: String,
    conversation: &Path,
    conversation_id: Option<String>,
    output: TurnOutput,
) -> Result<()> {
    let adventure = AdventureConfig::from_file(adventure)
        .with_context(|| format!("loading adventure {}", adventure.display()))?;

    let raw = read_input(conversation)?;
    let messages: Vec<Message> =
        serde_yaml::from_str(&raw).context("conversation must be a list of {role, content}")?;
    if messages.is_empty() {
        bail!("conversation is empty");
    }

    let invoker = Arc::new(runtime.build_invoker()?);
    let engine = TurnOrchestrator::builder(invoker, adventure)
        .runtime_config(runtime)
        .build();

    let mut request = TurnRequest::new(model.clone(), messages);
    if let Some(id) = conversation_id {
        request = request.with_conversation_id(id);
    }

    let response = match engine.handle(request).await {
        Ok(response) => response,
        Err(e) => bail!("[{}] {}", e.status_code(), e),
    };

    match output {
        TurnOutput::Turn => println!("{}", serde_json::to_string_pretty(&response)?),
        TurnOutput::Completion => {
            println!("{}", serde_json::to_string_pretty(&response.into_completion(&model))?)
        }
        TurnOutput::Text => println!("{}", response.content),
    }
    Ok(())
}

async fn route(runtime: &RuntimeConfig, model: &str) -> Result<()> {
    let invoker = runtime.build_invoker()?;
    let route = invoker.router().route(model).await?;
    println!("{}", serde_json::to_string_pretty(&route)?);
    if !invoker.has_provider(route.provider) {
        tracing::warn!(provider = %route.provider, "routed provider is not configured");
    }
    Ok(())
}

fn validate(file: &Path) -> Result<()> {
    let adventure = AdventureConfig::from_file(file)
        .with_context(|| format!("validating {}", file.display()))?;

    println!("Adventure '{}' is valid", adventure.name);
    println!("  storyteller: {}", adventure.storyteller_model);
    let steps = adventure.enabled_steps();
    println!("  judge steps: {} enabled of {}", steps.len(), adventure.judge_steps.len());
    for step in steps {
        println!("    {} [{}] judge={}", step.order, step.label(), step.judge_model);
    }
    println!(
        "  refusal detection: {}",
        if adventure.refusal.is_active() { "on" } else { "off" }
    );
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_turn_arguments() {
        let cli = Cli::try_parse_from([
            "taleward",
            "turn",
            "--adventure",
            "caves.yaml",
            "--model",
            "cyoa-dual",
            "-o",
            "text",
            "-",
        ])
        .unwrap();

        match cli.command {
            Commands::Turn {
                model,
                conversation,
                output,
                conversation_id,
                ..
            } => {
                assert_eq!(model, "cyoa-dual");
                assert_eq!(conversation, PathBuf::from("-"));
                assert_eq!(output, TurnOutput::Text);
                assert!(conversation_id.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_conversation_file_format() {
        let raw = "- role: user\n  content: Start\n- role: assistant\n  content: Turn 1 of 10\n";
        let messages: Vec<Message> = serde_yaml::from_str(raw).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "Turn 1 of 10");
    }
}
