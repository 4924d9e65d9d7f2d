//! Play one move from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Observation file: {"state": "...", "legal_moves": [{"id": 1, "text": "e4"}, ...]}
//! arena-agent --observation obs.json --provider openai --model gpt-4.1
//!
//! # Sequential rethink sampling through the rig backend
//! arena-agent --observation obs.json --provider together --model meta-llama/Llama-3.3-70B \
//!     --sampler rethink --backend rig
//!
//! # Verbose logs
//! RUST_LOG=arena_harness=debug arena-agent --observation obs.json --provider xai --model grok-3
//! ```
//!
//! The chosen action is printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use arena_agent::{
    build_model_or_unavailable, load_config, Agent, BackendKind, GenerationSettings, Provider,
};
use arena_harness::{
    DefaultPromptBuilder, GameConfiguration, Observation, RetryingModelCaller, SamplerKind,
};
use clap::Parser;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding the observation (state, legal_moves, player, history)
    #[arg(long)]
    observation: PathBuf,

    /// Config file (defaults to ~/.game_arena_config.json, then ./game_arena_config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    provider: Provider,

    /// Provider model name
    #[arg(long)]
    model: String,

    /// Sampling strategy (overrides the config file)
    #[arg(long, value_parser = parse_sampler)]
    sampler: Option<SamplerKind>,

    #[arg(long, value_enum, default_value_t = BackendKind::Http)]
    backend: BackendKind,

    /// API key (overrides the config file and environment)
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, default_value_t = 0.7)]
    temperature: f64,

    #[arg(long, default_value_t = 1024)]
    max_tokens: u32,

    /// Seed for the fallback move RNG
    #[arg(long)]
    seed: Option<u64>,

    /// Game name shown to the model
    #[arg(long, default_value = "chess")]
    game: String,
}

fn parse_sampler(raw: &str) -> Result<SamplerKind, String> {
    raw.parse()
}

fn read_observation(path: &std::path::Path) -> Result<Observation> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read observation {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse observation {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_deref());
    let mut harness = config.harness.clone();
    harness.apply_env_overrides();
    if let Some(kind) = args.sampler {
        harness.sampler_kind = kind;
    }
    if args.seed.is_some() {
        harness.seed = args.seed;
    }
    harness.validate().context("invalid harness configuration")?;

    let observation = read_observation(&args.observation)?;

    let settings = GenerationSettings {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        ..Default::default()
    };
    let model = build_model_or_unavailable(
        args.provider,
        &args.model,
        args.backend,
        args.api_key.as_deref(),
        &config,
        settings,
    );
    let caller = Arc::new(
        RetryingModelCaller::new(model, harness.retry_policy())
            .with_label(format!("{}/{}", args.provider, args.model)),
    );

    let agent = Agent::from_config(&harness, caller, Arc::new(DefaultPromptBuilder::default()));
    info!(
        provider = %args.provider,
        model = %args.model,
        sampler = %agent.sampler_kind(),
        legal_moves = observation.legal_moves.len(),
        "requesting move"
    );

    let record = agent
        .act(&observation, &GameConfiguration::new(args.game))
        .await
        .context("agent could not act")?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
