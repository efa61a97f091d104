use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ostinato::agent::llm::{LlmProvider, OpenAiProvider};
use ostinato::agent::{AgentRunner, Message, MessageRole, ToolContext};
use ostinato::config::{AppConfig, CliConfig, FileConfig, ProviderKind};
use ostinato::durable::{DurableRuntime, SqliteWorkflowStore, WorkflowStore};
use ostinato::refund::{opening_messages, refund_agent, DemoRefundProvider, RefundLedger};
use ostinato::DurableAgentRunner;

#[derive(Parser, Debug)]
#[command(about = "Durable refund-agent demo: interrupt it, re-run it, watch it resume")]
struct CliArgs {
    /// Path to the SQLite workflow database file.
    pub db_path: Option<PathBuf>,

    /// Path to an optional TOML config file (its values override CLI args).
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Invocation identity. Re-running with the same id resumes or replays
    /// that invocation; defaults to a fresh random id.
    #[clap(long)]
    pub invocation_id: Option<String>,

    /// Customer name for the demo conversation.
    #[clap(long, default_value = "Max")]
    pub user: String,

    /// Item the customer wants refunded.
    #[clap(long, default_value = "item_99")]
    pub item_id: String,

    /// Delay between refund stages, in milliseconds.
    #[clap(long, default_value_t = ostinato::refund::DEFAULT_STAGE_DELAY_MS)]
    pub stage_delay_ms: u64,

    /// Maximum completion turns per conversation.
    #[clap(long, default_value_t = 10)]
    pub max_turns: u32,

    /// LLM provider backing the conversation.
    #[clap(long, value_enum, default_value = "scripted")]
    pub provider: ProviderKind,

    /// Base URL for the OpenAI-compatible endpoint.
    #[clap(long, default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    /// Model to request from the endpoint.
    #[clap(long, default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// API key for the endpoint.
    #[clap(long)]
    pub llm_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        max_turns: cli_args.max_turns,
        provider: cli_args.provider,
        llm_base_url: cli_args.llm_base_url.clone(),
        llm_model: cli_args.llm_model.clone(),
        llm_api_key: cli_args.llm_api_key.clone(),
        user: cli_args.user.clone(),
        item_id: cli_args.item_id.clone(),
        stage_delay_ms: cli_args.stage_delay_ms,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let invocation_id = cli_args
        .invocation_id
        .unwrap_or_else(|| format!("refund-{}", uuid::Uuid::new_v4()));

    info!("Opening workflow database at {:?}...", config.db_path);
    let store: Arc<dyn WorkflowStore> = Arc::new(SqliteWorkflowStore::open(&config.db_path)?);
    let runtime = Arc::new(DurableRuntime::new(
        store,
        config.durable.retry_policy(),
    ));

    let ledger = Arc::new(RefundLedger::new());
    let provider: Arc<dyn LlmProvider> = match config.llm.provider {
        ProviderKind::Scripted => Arc::new(DemoRefundProvider::new(&config.demo.item_id)),
        ProviderKind::Openai => {
            info!(
                base_url = %config.llm.base_url,
                model = %config.llm.model,
                "Using OpenAI-compatible endpoint"
            );
            Arc::new(OpenAiProvider::new(
                config.llm.base_url.clone(),
                config.llm.model.clone(),
                config.llm.api_key.clone(),
            ))
        }
    };

    let agent = Arc::new(refund_agent(ledger.clone(), config.demo.stage_delay));
    let runner = Arc::new(AgentRunner::new(provider, config.max_turns));
    let adapter = DurableAgentRunner::new(runtime.clone(), runner, agent, ToolContext::new());

    // An interrupt leaves the invocation incomplete; the next run with the
    // same id resumes it from its recorded steps.
    {
        let invocation_id = invocation_id.clone();
        ctrlc::set_handler(move || {
            eprintln!();
            eprintln!(
                "Interrupted. Re-run with --invocation-id {} to resume from the last completed step.",
                invocation_id
            );
            std::process::exit(130);
        })
        .context("Failed to install interrupt handler")?;
    }

    // Pick up anything a previous process left behind before serving the
    // requested conversation.
    let resumed = runtime.resume_incomplete().await?;
    for (id, result) in &resumed {
        match result {
            Ok(_) => info!(invocation = %id, "Resumed invocation to completion"),
            Err(e) => warn!(invocation = %id, error = %e, "Resumed invocation failed"),
        }
    }

    info!(
        invocation = %invocation_id,
        user = %config.demo.user,
        item = %config.demo.item_id,
        "Starting refund conversation"
    );
    let outcome = adapter
        .run(
            &invocation_id,
            opening_messages(&config.demo.user, &config.demo.item_id),
        )
        .await?;

    print_transcript(&outcome.messages);
    let executed = ledger.stages_for(&invocation_id);
    if executed.is_empty() {
        info!("All steps replayed from storage; no refund stages re-executed");
    } else {
        info!(stages = ?executed, "Refund stages executed in this process");
    }
    info!(turns = outcome.turns, "Conversation complete");

    Ok(())
}

/// Print the conversation the way a customer would read it.
fn print_transcript(messages: &[Message]) {
    println!();
    for message in messages {
        match message.role {
            MessageRole::System => {}
            MessageRole::User => println!("customer: {}", message.content),
            MessageRole::Assistant => {
                if let Some(calls) = &message.tool_calls {
                    for call in calls {
                        println!("agent -> {}({})", call.name, call.arguments);
                    }
                }
                if !message.content.is_empty() {
                    println!("agent: {}", message.content);
                }
            }
            MessageRole::Tool => {
                let name = message.tool_name.as_deref().unwrap_or("tool");
                println!("{} -> {}", name, message.content.replace('\n', " "));
            }
        }
    }
    println!();
}
