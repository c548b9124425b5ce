mod interactive;
mod memory_cmds;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use sqlsage_config::{AppConfig, DEFAULT_CONFIG_PATH, TelemetryConfig};
use sqlsage_llm::{OllamaClient, Provider};
use sqlsage_memory::SessionLog;
use sqlsage_pipeline::{SchemaProvider, SqlDatabase, StaticSchema, build_orchestrator};

#[derive(Debug, Parser)]
#[command(
    name = "sqlsage",
    version,
    about = "Ask questions about a SQL database in plain language"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer a single question and exit.
    Ask {
        #[arg(long, default_value = "local")]
        user: String,
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Read questions from stdin, one per line, keeping conversation memory.
    Chat {
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Serve the Telegram bot.
    Telegram,
    /// Print the schema description the translator is grounded on.
    Schema,
    /// Check configuration, database and model connectivity.
    Doctor,
    /// Inspect the recorded per-user session logs.
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },
    /// Write the effective configuration to the config path.
    InitConfig,
}

#[derive(Debug, Subcommand)]
enum HistoryCommands {
    /// List recorded users, or show a user's most recent turns.
    Show {
        #[arg(long)]
        user: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a user's recorded session.
    Clear {
        #[arg(long)]
        user: String,
        #[arg(long)]
        yes: bool,
    },
    /// Copy a user's recorded session (JSONL) to a file.
    Export {
        #[arg(long)]
        user: String,
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

fn init_tracing(telemetry: &TelemetryConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(telemetry.log_level.as_str()));

    let (file_layer, guard) = if telemetry.log_dir.trim().is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(telemetry.log_dir.trim(), "sqlsage.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    let _log_guard = init_tracing(&config.telemetry);
    tracing::debug!(config = %cli.config.display(), "configuration loaded");

    match cli.command {
        Commands::Ask { user, question } => {
            let orchestrator = build_orchestrator(&config).await?;
            let question = question.join(" ");
            if !interactive::run_ask(&orchestrator, &user, &question).await? {
                std::process::exit(1);
            }
        }
        Commands::Chat { user } => {
            let orchestrator = build_orchestrator(&config).await?;
            interactive::run_chat(&orchestrator, &user, &config.bot.name).await?;
        }
        Commands::Telegram => {
            let orchestrator = Arc::new(build_orchestrator(&config).await?);
            sqlsage_telegram::start_bot(orchestrator, &config.bot).await?;
        }
        Commands::Schema => {
            println!("{}", describe_schema(&config).await?);
        }
        Commands::Doctor => run_doctor(&config).await,
        Commands::History { command } => {
            let log = SessionLog::new(&config.memory.session_log_dir);
            match command {
                HistoryCommands::Show { user, limit } => {
                    memory_cmds::run_history_show(&log, user.as_deref(), limit.max(1)).await?;
                }
                HistoryCommands::Clear { user, yes } => {
                    memory_cmds::run_history_clear(&log, &user, yes).await?;
                }
                HistoryCommands::Export { user, path } => {
                    memory_cmds::run_history_export(&log, &user, &path).await?;
                }
            }
        }
        Commands::InitConfig => {
            config.save_to(&cli.config)?;
            println!("configuration written to {}", cli.config.display());
        }
    }

    Ok(())
}

async fn describe_schema(config: &AppConfig) -> Result<String> {
    let schema_path = config.database.schema_path.trim();
    if !schema_path.is_empty() {
        let schema = StaticSchema::from_file(config.database.dialect_name(), Path::new(schema_path))?;
        return schema.describe().await;
    }
    let database = SqlDatabase::connect(&config.database).await?;
    database.describe().await
}

async fn run_doctor(config: &AppConfig) {
    println!("sqlsage doctor");
    println!(
        "- llm: provider={} translator={} synthesis={}",
        config.llm.provider, config.llm.translator_model, config.llm.synthesis_model
    );
    println!("- dialect: {}", config.database.dialect_name());

    match Provider::parse(&config.llm.provider) {
        Some(Provider::OpenAiCompatible) => {
            let key_set = std::env::var(&config.llm.api_key_env)
                .map(|key| !key.trim().is_empty())
                .unwrap_or(false);
            println!(
                "- api key ({}): {}",
                config.llm.api_key_env,
                if key_set { "set" } else { "MISSING" }
            );
        }
        Some(Provider::Ollama) => {}
        None => println!("- llm provider: UNKNOWN `{}`", config.llm.provider),
    }

    if config.uses_ollama() || config.embeddings.provider.eq_ignore_ascii_case("ollama") {
        let ollama = OllamaClient::new(config.llm.ollama_base_url.clone());
        match ollama.list_models().await {
            Ok(models) => {
                println!("- ollama: reachable at {} ({} models)", ollama.base_url(), models.len());
                let wanted = &config.embeddings.model;
                if config.embeddings.provider.eq_ignore_ascii_case("ollama")
                    && !models.iter().any(|m| m == wanted || m.starts_with(&format!("{wanted}:")))
                {
                    println!("- embeddings model `{wanted}` not pulled (ollama pull {wanted})");
                }
            }
            Err(err) => println!("- ollama: UNREACHABLE at {} ({err})", ollama.base_url()),
        }
    }

    match SqlDatabase::connect(&config.database).await {
        Ok(database) => match database.table_names().await {
            Ok(tables) => println!("- database: connected, {} tables ({})", tables.len(), tables.join(", ")),
            Err(err) => println!("- database: connected but listing tables failed ({err})"),
        },
        Err(err) => println!("- database: UNAVAILABLE ({err:#})"),
    }

    if config.memory.session_log_enabled {
        let log = SessionLog::new(&config.memory.session_log_dir);
        let recorded = log.identities().await.map(|ids| ids.len()).unwrap_or(0);
        println!("- session log: {} ({recorded} users)", log.dir().display());
    } else {
        println!("- session log: disabled");
    }
    println!("- index root: {}", config.index.root_dir);
}
