//! # ARGO RAG CLI (`argo`)
//!
//! ## Usage
//!
//! ```bash
//! argo --config ./config/argo.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `argo ask "<query>"` | Run the full pipeline once and print the answer |
//! | `argo chat` | Multi-turn session with the tool-calling agent |
//! | `argo classify "<query>"` | Show entities, pattern scores, and intent |
//! | `argo extract [FILE]` | Extract `TOOL_CALL:` markers from a file or stdin |
//! | `argo call <tool> --arg k=v` | Dispatch one tool call (`--records` normalizes the payload, `--dry-run` prints the marker) |
//! | `argo tools` | List tool schemas |
//! | `argo serve` | Start the HTTP API |
//!
//! Logs go to stderr; command output goes to stdout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use argo_rag::agent::ToolAgent;
use argo_rag::backend::HttpBackend;
use argo_rag::classifier::{self, IntentClassifier, IntentFallback, LlmIntentFallback};
use argo_rag::completion::OpenAiCompletion;
use argo_rag::config::{self, Config, LoggingConfig};
use argo_rag::entities::is_geographic_term;
use argo_rag::error::CompletionError;
use argo_rag::models::QueryIntent;
use argo_rag::normalize::{normalize_payload, summarize};
use argo_rag::pipeline::Pipeline;
use argo_rag::protocol::{scan_tool_calls, ToolCall, ToolKind};
use argo_rag::server;
use argo_rag::session::Session;
use argo_rag::tools::{coerce_arguments, tool_infos, ToolDispatcher};

/// Natural-language queries over ARGO float profiles.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/argo.example.toml` for a full example. A missing file
/// means defaults everywhere.
#[derive(Parser)]
#[command(name = "argo", version, about = "Natural-language queries over ARGO float profiles")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/argo.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query through classification, retrieval, and synthesis.
    Ask {
        query: String,
        /// Print the whole response object as JSON instead of the answer.
        #[arg(long)]
        json: bool,
    },

    /// Interactive session with the tool-calling agent.
    ///
    /// Reads one question per line from stdin. `/reset` starts a new
    /// session, `/quit` exits.
    Chat,

    /// Classify a query and show how the decision was made.
    Classify { query: String },

    /// Extract `TOOL_CALL:` markers from text.
    Extract {
        /// Input file. Reads stdin when omitted.
        file: Option<PathBuf>,
    },

    /// Dispatch one tool call against the tool server.
    Call {
        /// Tool name, e.g. `retrieveARGO`.
        tool: String,
        /// Arguments as `key=value` pairs, converted to the type the tool's
        /// schema declares for each key.
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,
        /// Print normalized profile records and summary statistics instead
        /// of the raw payload.
        #[arg(long)]
        records: bool,
        /// Validate and print the `TOOL_CALL:` marker without calling the
        /// tool server.
        #[arg(long, conflicts_with = "records")]
        dry_run: bool,
    },

    /// List the available tools and their parameter schemas.
    Tools,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

/// Parse a `key=value` pair for `--arg` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;
    init_logging(&cfg.logging);
    let cfg = Arc::new(cfg);

    match cli.command {
        Commands::Ask { query, json } => run_ask(cfg, &query, json).await?,
        Commands::Chat => run_chat(&cfg).await?,
        Commands::Classify { query } => run_classify(&cfg, &query).await?,
        Commands::Extract { file } => run_extract(file)?,
        Commands::Call {
            tool,
            args,
            records,
            dry_run,
        } => run_call(&cfg, tool, args, records, dry_run).await?,
        Commands::Tools => {
            println!("{}", serde_json::to_string_pretty(&json!({ "tools": tool_infos() }))?);
        }
        Commands::Serve => {
            let pipeline = Arc::new(Pipeline::from_config(cfg)?);
            server::run_server(pipeline).await?;
        }
    }

    Ok(())
}

async fn run_ask(cfg: Arc<Config>, query: &str, as_json: bool) -> Result<()> {
    let pipeline = Pipeline::from_config(cfg)?;
    let mut session = Session::new();
    let response = pipeline.process_query(&mut session, query).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", response.answer);
        for warning in &response.warnings {
            eprintln!("warning: {}", warning);
        }
    }
    Ok(())
}

/// Tool dispatcher over the HTTP tool server named in `[backend]`.
fn http_dispatcher(cfg: &Config) -> Result<ToolDispatcher> {
    let backend = HttpBackend::new(&cfg.backend)?;
    info!(endpoint = backend.endpoint(), "using tool server");
    Ok(ToolDispatcher::from_config(
        Arc::new(backend),
        &cfg.backend,
        &cfg.retrieval,
    ))
}

async fn run_chat(cfg: &Config) -> Result<()> {
    let completion = Arc::new(OpenAiCompletion::new(&cfg.completion)?);
    let tools = Arc::new(http_dispatcher(cfg)?);
    let agent = ToolAgent::new(completion, tools, cfg);

    let mut session = Session::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                let discarded = session.turns();
                session.reset();
                println!("(new session {}, {} turns discarded)", session.id(), discarded);
                continue;
            }
            _ => {}
        }
        let answer = agent.respond(&mut session, line).await;
        println!("{}\n", answer);
    }
    Ok(())
}

/// Fallback used when no completion client can be built: near ties fail
/// open to semantic search.
struct NoFallback(String);

#[async_trait]
impl IntentFallback for NoFallback {
    async fn classify(&self, _text: &str) -> Result<(QueryIntent, f64), CompletionError> {
        Err(CompletionError::MissingApiKey(self.0.clone()))
    }
}

async fn run_classify(cfg: &Config, query: &str) -> Result<()> {
    let fallback: Arc<dyn IntentFallback> = match OpenAiCompletion::new(&cfg.completion) {
        Ok(client) => Arc::new(LlmIntentFallback::new(
            Arc::new(client),
            cfg.completion.classify_temperature,
        )),
        Err(e) => {
            warn!(error = %e, "no completion client, near ties will fail open");
            Arc::new(NoFallback(cfg.completion.api_key_env.clone()))
        }
    };

    let scores = classifier::score(query);
    let decided_by = if scores.decide().is_some() {
        "patterns"
    } else {
        "fallback"
    };
    let context = IntentClassifier::new(fallback).classify(query).await;
    let geographic: Vec<&String> = context
        .extracted_entities
        .ocean_terms
        .iter()
        .filter(|t| is_geographic_term(t))
        .collect();
    let table = classifier::pattern_table();
    let (structured_rules, semantic_rules) = table.len();
    let out = json!({
        "pattern_table_version": table.version,
        "pattern_rules": { "structured": structured_rules, "semantic": semantic_rules },
        "scores": scores,
        "decided_by": decided_by,
        "geographic_terms": geographic,
        "context": context,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn run_extract(file: Option<PathBuf>) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    for entry in scan_tool_calls(&text) {
        let line = match entry {
            Ok(call) => json!({ "ok": call }),
            Err(e) => json!({ "error": e.to_string() }),
        };
        println!("{}", line);
    }
    Ok(())
}

async fn run_call(
    cfg: &Config,
    tool: String,
    args: Vec<(String, String)>,
    records: bool,
    dry_run: bool,
) -> Result<()> {
    let arguments = coerce_arguments(&tool, args);
    let call = ToolCall::new(tool, Value::Object(arguments), "cli");

    if dry_run {
        let dispatcher = http_dispatcher(cfg)?;
        match dispatcher.prepare(&call) {
            Ok(_) => println!("{}", call.to_marker()),
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let result = http_dispatcher(cfg)?.dispatch(&call).await;
    if records {
        let normalized = match (ToolKind::from_name(&call.tool_name), result.payload()) {
            (Some(kind), Some(data)) => normalize_payload(kind, data),
            _ => Vec::new(),
        };
        let out = json!({
            "call_id": result.call_id,
            "success": result.success,
            "error": result.error,
            "summary": summarize(&normalized),
            "records": normalized,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
