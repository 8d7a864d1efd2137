use warden::config::{self, Config};
use warden::llm::GeminiClient;
use warden::{AgentLoop, AgentOutcome, AgentSettings, Sandbox, ToolRuntime};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Warden - sandboxed coding agent", long_about = None)]
struct Cli {
    /// The prompt; multiple words are joined with spaces
    prompt: Vec<String>,

    /// Print token counts, full call arguments and tool output
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: ./warden.yml, then <config dir>/warden/warden.yml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory the tools are confined to
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Gemini model name
    #[arg(short, long)]
    model: Option<String>,
}

fn print_usage() {
    println!("Warden - sandboxed coding agent");
    println!("\nUsage: warden \"your prompt here\" [--verbose]");
    println!("Example: warden \"How do I fix the calculator?\"");
}

fn setup_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), verbose))
        .init();
}

/// `RUST_LOG` wins; otherwise `--verbose` picks debug over warn.
fn log_filter(rust_log: Option<String>, verbose: bool) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "debug" } else { "warn" }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();
    setup_logging(args.verbose);

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        print_usage();
        return Ok(ExitCode::FAILURE);
    }

    // 1. Load configuration
    let mut config = Config::discover(args.config)?;
    if let Some(model) = args.model {
        config.gemini.model = model;
    }
    let api_key = config.api_key()?;

    // 2. Establish the sandbox
    let workdir = config::resolve_working_directory(args.working_dir, &config)?;
    let sandbox = Sandbox::new(&workdir)
        .with_context(|| format!("Failed to resolve working directory {:?}", workdir))?;
    info!(root = %sandbox.root().display(), model = %config.gemini.model, "sandbox ready");

    let runtime = ToolRuntime {
        sandbox,
        read_limits: config.runtime.read_limits(),
        script_policy: config.runtime.script_policy(),
    };
    let settings = AgentSettings {
        max_iterations: config.runtime.max_iterations,
        system_prompt: config
            .runtime
            .system_prompt
            .clone()
            .unwrap_or_else(|| warden::prompts::SYSTEM_PROMPT.to_string()),
        verbose: args.verbose,
    };
    let client = GeminiClient::new(api_key, config.gemini.model.clone())
        .with_temperature(config.gemini.temperature);

    if args.verbose {
        println!("User prompt: {}\n", prompt);
    }

    // 3. Converse
    let agent = AgentLoop::new(client, runtime, settings);
    match agent.run(&prompt).await {
        Ok(run) => {
            debug!(iterations = run.iterations, messages = run.history.len(), "run finished");
            if let AgentOutcome::Final(text) = run.outcome {
                println!("Final response:");
                println!("{}", text);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: problem calling the model: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
