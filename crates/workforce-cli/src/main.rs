use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use workforce_core::completion::{anthropic, openai};
use workforce_core::stores::TourPolicy;
use workforce_core::{
    AgentKind, AgentRequest, AnthropicClient, ClassifierKind, CompletionClient, ModelClassifier,
    OpenAiClient, Orchestrator, ToolRegistry, Workforce, register_builtin_tools,
};
use workforce_store::SqliteActivityLog;

mod config;
mod fixtures;

use config::{ProviderKind, WorkforceConfig, expand_home};
use fixtures::Fixtures;

#[derive(Parser)]
#[command(name = "workforce")]
#[command(version)]
#[command(about = "Route property management requests to leasing, marketing and property agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,

    /// Classify a request and hand it to the right agent
    Ask {
        /// The request, in plain language
        request: String,

        /// Who is asking, recorded in the activity log
        #[arg(long, default_value = "cli")]
        requester: String,

        /// Context entry as key=value (repeatable), e.g. --context lead_id=lead-1
        #[arg(long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,
    },

    /// Run several agents over one task, in order
    Coordinate {
        /// Agents to run, comma separated (leasing, marketing, property)
        #[arg(long, value_delimiter = ',', required = true)]
        agents: Vec<String>,

        /// Task description
        task: String,

        /// Context entry as key=value (repeatable)
        #[arg(long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,
    },

    /// List recent activity records
    Activities {
        /// Maximum number of records
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only records about this lead, property, campaign or document
        #[arg(long)]
        entity: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Ask {
            request,
            requester,
            context,
        } => cmd_ask(&cli.config, &request, &requester, context).await,
        Commands::Coordinate {
            agents,
            task,
            context,
        } => cmd_coordinate(&cli.config, &agents, &task, context).await,
        Commands::Activities { limit, entity } => {
            cmd_activities(&cli.config, limit, entity.as_deref()).await
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn context_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect()
}

/// Agent names from the command line; unknown names are skipped with a warning
fn parse_agents(names: &[String]) -> Result<Vec<AgentKind>> {
    let mut agents = Vec::with_capacity(names.len());
    for name in names {
        match AgentKind::from_string(name) {
            Some(kind) => agents.push(kind),
            None => warn!("Unknown agent type: {}", name),
        }
    }
    if agents.is_empty() {
        bail!("No known agents in --agents (expected leasing, marketing or property)");
    }
    Ok(agents)
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Workforce initialized at {}", config_dir.display());
    println!(
        "Set OPENAI_API_KEY (or edit {}) before running `workforce ask`.",
        config_path.display()
    );
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = WorkforceConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn build_client(cfg: &WorkforceConfig) -> Result<Arc<dyn CompletionClient>> {
    let provider = &cfg.provider;
    if provider.api_key.trim().is_empty() {
        bail!(
            "No API key configured for {:?}. Set the environment variable referenced by provider.api_key.",
            provider.name
        );
    }

    let client: Arc<dyn CompletionClient> = match provider.name {
        ProviderKind::Openai => Arc::new(OpenAiClient::new(
            provider.api_key.clone(),
            provider.model.clone(),
            provider
                .base_url
                .clone()
                .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
        )?),
        ProviderKind::Anthropic => Arc::new(AnthropicClient::new(
            provider.api_key.clone(),
            provider.model.clone(),
            provider
                .base_url
                .clone()
                .unwrap_or_else(|| anthropic::DEFAULT_BASE_URL.to_string()),
        )?),
    };
    info!(
        "Using {} model {}",
        client.provider_name(),
        client.model()
    );
    Ok(client)
}

fn open_activity_log(cfg: &WorkforceConfig) -> Result<SqliteActivityLog> {
    SqliteActivityLog::new(expand_home(&cfg.activity.db_path))
}

fn build_orchestrator(cfg: &WorkforceConfig) -> Result<Orchestrator> {
    let client = build_client(cfg)?;

    let fixtures = match &cfg.fixtures.path {
        Some(path) => Fixtures::load(&expand_home(path))?,
        None => {
            info!("No fixtures configured, starting with empty stores");
            Fixtures::default()
        }
    };
    let backends = fixtures.into_backends(TourPolicy {
        max_per_slot: cfg.tools.max_tours_per_slot,
        horizon_days: cfg.tools.tour_horizon_days,
    })?;

    let mut registry = ToolRegistry::new().with_timeout(Duration::from_secs(cfg.tools.timeout_secs));
    register_builtin_tools(&mut registry, &backends);
    info!("Registered {} tools", registry.len());

    let activities = Arc::new(open_activity_log(cfg)?);

    let mut builder = Workforce::builder(client.clone(), Arc::new(registry), activities)
        .retry_policy(cfg.retry.policy())
        .model_parameters(cfg.model);
    for (kind, profile) in cfg.agents.profiles() {
        builder = builder.profile(kind, profile);
    }

    let orchestrator = Orchestrator::new(builder.build(), &cfg.orchestrator);
    Ok(match cfg.orchestrator.classifier {
        ClassifierKind::Keyword => orchestrator,
        ClassifierKind::Model => orchestrator.with_classifier(Arc::new(
            ModelClassifier::new(client, cfg.orchestrator.keyword_classifier())
                .with_retry_policy(cfg.retry.policy()),
        )),
    })
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    request: &str,
    requester: &str,
    context: Vec<(String, String)>,
) -> Result<()> {
    let cfg = WorkforceConfig::load(config_path)?;
    let orchestrator = build_orchestrator(&cfg)?;

    let request = AgentRequest::new(request, requester).with_context_map(context_map(context));
    let result = orchestrator.route(&request).await;
    if !result.is_success() {
        warn!("Request did not complete successfully");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_coordinate(
    config_path: &Option<PathBuf>,
    agents: &[String],
    task: &str,
    context: Vec<(String, String)>,
) -> Result<()> {
    let agents = parse_agents(agents)?;
    let cfg = WorkforceConfig::load(config_path)?;
    let orchestrator = build_orchestrator(&cfg)?;

    let result = orchestrator
        .coordinate_multi_agent_task(&agents, task, context_map(context))
        .await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn cmd_activities(
    config_path: &Option<PathBuf>,
    limit: usize,
    entity: Option<&str>,
) -> Result<()> {
    let cfg = WorkforceConfig::load(config_path)?;
    let log = open_activity_log(&cfg)?;

    let records = match entity {
        Some(entity) => log.for_entity(entity, limit).await?,
        None => log.recent(limit).await?,
    };

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
