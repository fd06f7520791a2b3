//! `lockstep` — compute coordination networks from social-media corpora.
//!
//! # Usage
//!
//! ```text
//! lockstep corpus.db preprocess --format csv messages.csv
//! lockstep corpus.db resolve_urls --n_cpus 8
//! lockstep corpus.db compute co_retweet --time_window 60
//! lockstep corpus.db export_network out.graphml co_retweet
//! ```
//!
//! Exit codes: 0 success, 2 user error, 3 data error, 4 internal failure.

mod commands;
mod http;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use lockstep_core::error::Cancelled;
use lockstep_core::network::NetworkKind;
use lockstep_ingest::RecordFormat;
use lockstep_store_sqlite::SqliteStore;
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
  name = "lockstep",
  version,
  about = "Compute coordination networks from social media data"
)]
struct Cli {
  /// Path to the corpus database; created on first use.
  db: PathBuf,

  /// Optional TOML file with resolver defaults (flags override it).
  #[arg(long, value_name = "FILE", env = "LOCKSTEP_CONFIG", global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Load raw platform files into the corpus.
  Preprocess {
    /// Input file format. All files must share it.
    #[arg(long, value_enum, default_value = "csv")]
    format: FormatArg,

    /// Files to ingest.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Abort with a data error when more than this many records are
    /// skipped or rejected.
    #[arg(long = "max_invalid")]
    max_invalid: Option<u64>,
  },

  /// Resolve redirects for every URL in the corpus without an entry yet.
  #[command(name = "resolve_urls")]
  ResolveUrls {
    /// Concurrent resolver workers.
    #[arg(long = "n_cpus")]
    n_cpus: Option<usize>,

    /// Maximum redirects to follow per URL.
    #[arg(long = "max_redirects")]
    max_redirects: Option<usize>,

    /// Per-URL timeout in seconds.
    #[arg(long)]
    timeout: Option<f64>,

    /// Global resolutions-per-second budget.
    #[arg(long = "rate_limit")]
    rate_limit: Option<u32>,

    /// Stop scheduling new URLs after this many seconds; the rest are
    /// picked up by the next run.
    #[arg(long = "max_duration")]
    max_duration: Option<f64>,

    /// Clear previous failure markers first, so failed URLs are retried.
    #[arg(long = "retry-failed")]
    retry_failed: bool,

    /// Email for the From header, so site operators can reach you.
    #[arg(long, env = "LOCKSTEP_FROM")]
    from: Option<String>,
  },

  /// Materialize one coordination network table.
  Compute {
    #[arg(value_enum)]
    network: NetworkArg,

    /// Seconds between two events for them to count as coordinated.
    #[arg(long = "time_window")]
    time_window: f64,

    /// Worker threads; defaults to the CPU count.
    #[arg(long = "n_cpus")]
    n_cpus: Option<usize>,

    /// Minimum edge weight to materialize.
    #[arg(long = "min_edge_weight", default_value_t = 1)]
    min_edge_weight: u64,

    /// Similarity threshold in [0, 1]; co_similar_tweet only.
    #[arg(long = "similarity_threshold", default_value_t = 0.8)]
    similarity_threshold: f64,

    /// Documents shorter than this many tokens never match;
    /// co_similar_tweet only.
    #[arg(long = "min_document_size", default_value_t = 1)]
    min_document_size: usize,

    /// Join co_link on resolved URLs where available; requires a prior
    /// resolve_urls run to be useful.
    #[arg(long)]
    resolved: bool,
  },

  /// Write a computed network to a file.
  #[command(name = "export_network")]
  ExportNetwork {
    /// Output file path.
    output: PathBuf,

    #[arg(value_enum)]
    network: NetworkArg,

    #[arg(long = "output_format", value_enum, default_value = "graphml")]
    output_format: OutputFormatArg,

    /// Latest-message annotations per node.
    #[arg(long = "n_messages", default_value_t = 10)]
    n_messages: usize,

    /// Drop edges below this weight on export.
    #[arg(long = "min_weight", default_value_t = 1)]
    min_weight: u64,

    /// Keep self-loops (users coordinating with themselves).
    #[arg(long = "include_self_loops")]
    include_self_loops: bool,
  },

  /// Write a user-node annotation CSV for the whole corpus.
  #[command(name = "export_user_nodes")]
  ExportUserNodes {
    /// Output file path.
    output: PathBuf,

    /// Latest-message annotations per user.
    #[arg(long = "n_messages", default_value_t = 10)]
    n_messages: usize,
  },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
  Csv,
  #[value(name = "twitter_json")]
  TwitterJson,
}

impl From<FormatArg> for RecordFormat {
  fn from(arg: FormatArg) -> Self {
    match arg {
      FormatArg::Csv => RecordFormat::Csv,
      FormatArg::TwitterJson => RecordFormat::TwitterJson,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NetworkArg {
  #[value(name = "co_retweet")]
  CoRetweet,
  #[value(name = "co_tweet")]
  CoTweet,
  #[value(name = "co_similar_tweet")]
  CoSimilarTweet,
  #[value(name = "co_link")]
  CoLink,
  #[value(name = "co_reply")]
  CoReply,
  #[value(name = "co_post")]
  CoPost,
}

impl From<NetworkArg> for NetworkKind {
  fn from(arg: NetworkArg) -> Self {
    match arg {
      NetworkArg::CoRetweet => NetworkKind::CoRetweet,
      NetworkArg::CoTweet => NetworkKind::CoTweet,
      NetworkArg::CoSimilarTweet => NetworkKind::CoSimilarTweet,
      NetworkArg::CoLink => NetworkKind::CoLink,
      NetworkArg::CoReply => NetworkKind::CoReply,
      NetworkArg::CoPost => NetworkKind::CoPost,
    }
  }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
  Graphml,
  Csv,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file; resolver defaults only.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  resolver: ResolverSection,
}

#[derive(Debug, Deserialize, Default)]
struct ResolverSection {
  user_agent:    Option<String>,
  from:          Option<String>,
  timeout:       Option<f64>,
  rate_limit:    Option<u32>,
  max_redirects: Option<usize>,
  n_cpus:        Option<usize>,
}

// ─── Error markers ────────────────────────────────────────────────────────────

/// Invalid arguments or missing inputs — exit code 2.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserError(pub String);

/// The corpus data violates the toolkit's invariants — exit code 3.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DataError(pub String);

fn exit_code(error: &anyhow::Error) -> i32 {
  for cause in error.chain() {
    if cause.downcast_ref::<UserError>().is_some() {
      return 2;
    }
    if cause.downcast_ref::<DataError>().is_some() {
      return 3;
    }
    if cause.downcast_ref::<Cancelled>().is_some() {
      return 130;
    }
    if let Some(store) = cause.downcast_ref::<lockstep_store_sqlite::Error>() {
      return match store {
        lockstep_store_sqlite::Error::NetworkNotComputed(_) => 2,
        lockstep_store_sqlite::Error::UnsupportedSchema(_) => 3,
        lockstep_store_sqlite::Error::Database(_) => 4,
      };
    }
    if let Some(io) = cause.downcast_ref::<std::io::Error>() {
      if matches!(
        io.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
      ) {
        return 2;
      }
    }
  }
  4
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  if let Err(error) = run(cli).await {
    eprintln!("error: {error:#}");
    std::process::exit(exit_code(&error));
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let config = load_config(cli.config.as_deref())?;

  let store = SqliteStore::open(&cli.db)
    .await
    .with_context(|| format!("opening corpus {}", cli.db.display()))?;

  match cli.command {
    Command::Preprocess { format, files, max_invalid } => {
      commands::preprocess(&store, format.into(), &files, max_invalid).await
    }
    Command::ResolveUrls {
      n_cpus,
      max_redirects,
      timeout,
      rate_limit,
      max_duration,
      retry_failed,
      from,
    } => {
      let section = &config.resolver;
      let settings = commands::ResolveSettings {
        workers:       n_cpus.or(section.n_cpus).unwrap_or(4),
        rate_limit:    rate_limit.or(section.rate_limit).unwrap_or(25),
        timeout_secs:  timeout.or(section.timeout).unwrap_or(15.0),
        max_duration,
        max_redirects: max_redirects.or(section.max_redirects).unwrap_or(5),
        user_agent:    section
          .user_agent
          .clone()
          .unwrap_or_else(|| {
            format!("lockstep/{}", env!("CARGO_PKG_VERSION"))
          }),
        from:          from.or_else(|| section.from.clone()),
        retry_failed,
      };
      commands::resolve_urls(&store, settings).await
    }
    Command::Compute {
      network,
      time_window,
      n_cpus,
      min_edge_weight,
      similarity_threshold,
      min_document_size,
      resolved,
    } => {
      commands::compute(&store, commands::ComputeSettings {
        kind: network.into(),
        time_window,
        workers: n_cpus,
        min_edge_weight,
        similarity_threshold,
        min_document_size,
        resolved,
      })
      .await
    }
    Command::ExportNetwork {
      output,
      network,
      output_format,
      n_messages,
      min_weight,
      include_self_loops,
    } => {
      let options = lockstep_export::ExportOptions {
        min_weight,
        n_messages,
        include_self_loops,
      };
      match output_format {
        OutputFormatArg::Graphml => {
          commands::export_graphml(&store, &output, network.into(), options)
            .await
        }
        OutputFormatArg::Csv => {
          commands::export_edge_csv(&store, &output, network.into(), options)
            .await
        }
      }
    }
    Command::ExportUserNodes { output, n_messages } => {
      commands::export_user_nodes(&store, &output, n_messages).await
    }
  }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<ConfigFile> {
  let Some(path) = path else {
    return Ok(ConfigFile::default());
  };
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading config file {}", path.display()))?;
  toml::from_str(&raw).context("parsing config file")
}
