//! Statewalk CLI
//!
//! Command-line interface for:
//! - Diagnosing one error message, or a JSON batch of them
//! - Inspecting metagraph paths between two kinds
//! - Running chained-MATCH queries against a graph
//! - Listing an entity's states at an instant or over a window
//!
//! Graphs come from JSON snapshots (`--metagraph`, `--stategraph`) or, when
//! none is given, from Neo4j (`NEO4J_*`, and `META_NEO4J_*` for the
//! metagraph). The reasoning service is configured through `OPENAI_*`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use statewalk_diagnose::{Diagnoser, DiagnosisConfig, FixedKind, PathFinder, StateResolver};
use statewalk_graph::{parse_instant, Interval, Params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod backends;
mod render;

use backends::GraphRole;

#[derive(Parser)]
#[command(name = "statewalk")]
#[command(author, version, about = "Statewalk: root-cause diagnosis over entity state graphs")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Diagnosis settings (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GraphArgs {
    /// Metagraph snapshot (JSON); Neo4j when omitted
    #[arg(long)]
    metagraph: Option<PathBuf>,

    /// Stategraph snapshot (JSON); Neo4j when omitted
    #[arg(long)]
    stategraph: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose one error message.
    Diagnose {
        /// The error message, exactly as logged
        message: String,
        #[command(flatten)]
        graphs: GraphArgs,
        /// Skip event lookup and use this source kind
        #[arg(long)]
        kind: Option<String>,
        /// Print the diagnosis as JSON
        #[arg(long)]
        json: bool,
        /// Also write the JSON diagnosis here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Diagnose every message of a JSON array, one after another.
    Batch {
        /// Input file: `["message", ...]`
        input: PathBuf,
        /// Output file for the per-message results
        #[arg(short, long)]
        out: PathBuf,
        #[command(flatten)]
        graphs: GraphArgs,
    },

    /// Show the shortest metagraph paths between two kinds.
    Paths {
        src: String,
        dest: String,
        /// Kinds at least one of which should lie on the path
        #[arg(long = "prefer")]
        preferred: Vec<String>,
        /// Metagraph snapshot (JSON); Neo4j when omitted
        #[arg(long)]
        metagraph: Option<PathBuf>,
    },

    /// Run a chained-MATCH query against the stategraph.
    Query {
        query: String,
        /// Query parameters as `name=value` (values parsed as JSON when possible)
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Stategraph snapshot (JSON); Neo4j when omitted
        #[arg(long)]
        stategraph: Option<PathBuf>,
    },

    /// List the states of one entity.
    States {
        kind: String,
        id: String,
        /// Instant the states must cover
        #[arg(long, conflicts_with_all = ["from", "to"])]
        at: Option<String>,
        /// Window start (with --to)
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Window end (with --from)
        #[arg(long, requires = "from")]
        to: Option<String>,
        /// Stategraph snapshot (JSON); Neo4j when omitted
        #[arg(long)]
        stategraph: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "statewalk_diagnose=info,statewalk_llm=info,statewalk_graph=info,statewalk=info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("STATEWALK_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel in-flight runs on Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = DiagnosisConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Diagnose {
            message,
            graphs,
            kind,
            json,
            out,
        } => cmd_diagnose(&config, &graphs, &message, kind, json, out.as_deref()).await,
        Commands::Batch { input, out, graphs } => cmd_batch(&config, &graphs, &input, &out).await,
        Commands::Paths {
            src,
            dest,
            preferred,
            metagraph,
        } => cmd_paths(&config, &src, &dest, &preferred, metagraph.as_deref()).await,
        Commands::Query {
            query,
            params,
            stategraph,
        } => cmd_query(&query, &params, stategraph.as_deref()).await,
        Commands::States {
            kind,
            id,
            at,
            from,
            to,
            stategraph,
        } => cmd_states(&config, &kind, &id, at, from.zip(to), stategraph.as_deref()).await,
    }
}

fn diagnoser(config: &DiagnosisConfig, graphs: &GraphArgs) -> Result<Diagnoser> {
    let metagraph = backends::graph(GraphRole::Meta, graphs.metagraph.as_deref())?;
    let stategraph = backends::graph(GraphRole::State, graphs.stategraph.as_deref())?;
    let assistants = backends::assistants()?;
    Ok(Diagnoser::new(metagraph, stategraph, assistants, config.clone())
        .with_cancellation(cancel_on_interrupt()))
}

async fn cmd_diagnose(
    config: &DiagnosisConfig,
    graphs: &GraphArgs,
    message: &str,
    kind: Option<String>,
    json: bool,
    out: Option<&Path>,
) -> Result<()> {
    let mut diagnoser = diagnoser(config, graphs)?;
    if let Some(kind) = kind {
        diagnoser = diagnoser.with_classifier(Arc::new(FixedKind(kind)));
    }
    let diagnosis = diagnoser.diagnose(message).await?;

    let text = serde_json::to_string_pretty(&diagnosis)?;
    if json {
        println!("{text}");
    } else {
        render::diagnosis(&diagnosis);
    }
    if let Some(out) = out {
        write_file(out, &text)?;
    }
    Ok(())
}

async fn cmd_batch(
    config: &DiagnosisConfig,
    graphs: &GraphArgs,
    input: &Path,
    out: &Path,
) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    let messages: Vec<String> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of messages", input.display()))?;
    println!(
        "{} {} message(s) from {}",
        "Diagnosing".green().bold(),
        messages.len(),
        input.display()
    );

    let entries = diagnoser(config, graphs)?.diagnose_batch(&messages).await;
    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    write_file(out, &serde_json::to_string_pretty(&entries)?)?;

    println!(
        "  {} {} diagnosed, {} failed",
        "→".cyan(),
        entries.len() - failed,
        failed
    );
    if entries.len() < messages.len() {
        bail!("batch interrupted after {} of {} messages", entries.len(), messages.len());
    }
    Ok(())
}

async fn cmd_paths(
    config: &DiagnosisConfig,
    src: &str,
    dest: &str,
    preferred: &[String],
    metagraph: Option<&Path>,
) -> Result<()> {
    let backend = backends::graph(GraphRole::Meta, metagraph)?;
    let discovery = PathFinder::new(backend.as_ref(), &config.paths)
        .find(src, dest, preferred)
        .await?;
    match discovery.strategy {
        Some(strategy) => {
            println!("{} {} ({})", "paths".green().bold(), discovery.paths.len(), strategy);
            render::paths(&discovery.paths);
        }
        None => println!("{} no path from {src} to {dest}", "info:".yellow().bold()),
    }
    Ok(())
}

/// `name=value`, with JSON values where they parse and strings otherwise.
fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for item in raw {
        let Some((name, value)) = item.split_once('=') else {
            bail!("parameter '{item}' is not name=value");
        };
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        params.insert(name.trim().to_string(), value);
    }
    Ok(params)
}

async fn cmd_query(query: &str, params: &[String], stategraph: Option<&Path>) -> Result<()> {
    let backend = backends::graph(GraphRole::State, stategraph)?;
    let params = parse_params(params)?;
    let rows = backend.run_query(query, &params).await?;
    info!(rows = rows.len(), "query executed");
    render::rows(&rows);
    println!("{} {} row(s)", "ok".green().bold(), rows.len());
    Ok(())
}

async fn cmd_states(
    config: &DiagnosisConfig,
    kind: &str,
    id: &str,
    at: Option<String>,
    window: Option<(String, String)>,
    stategraph: Option<&Path>,
) -> Result<()> {
    let backend = backends::graph(GraphRole::State, stategraph)?;
    let resolver = StateResolver::new(backend.as_ref(), &config.states);
    let states = match (at, window) {
        (Some(at), _) => resolver.resolve_at(kind, id, parse_instant(&at)?).await?,
        (None, Some((from, to))) => {
            resolver
                .resolve_window(kind, id, Interval::parse(&from, &to)?)
                .await?
        }
        (None, None) => bail!("give --at, or --from and --to"),
    };
    if states.is_empty() {
        println!("{} {kind}({id}) has no state there", "info:".yellow().bold());
    }
    render::states(&states);
    Ok(())
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    eprintln!("{} {}", "wrote".green().bold(), path.display().to_string().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_params_parse_json_then_string() {
        let params = parse_params(&[
            "limit=5".to_string(),
            "message=No such file".to_string(),
            "flags=[1, 2]".to_string(),
        ])
        .unwrap();
        assert_eq!(params["limit"], json!(5));
        assert_eq!(params["message"], json!("No such file"));
        assert_eq!(params["flags"], json!([1, 2]));
        assert!(parse_params(&["oops".to_string()]).is_err());
    }

    #[test]
    fn test_states_window_flags_pair_up() {
        let parsed = Cli::try_parse_from([
            "statewalk",
            "states",
            "Pod",
            "pod-1",
            "--from",
            "2020-12-12T05:00:00Z",
        ]);
        assert!(parsed.is_err(), "--from needs --to");
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/diagnosis.json");
        write_file(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "{}");
    }
}
