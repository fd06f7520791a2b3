//! Command implementations: wire the store, engine, parsers, resolvers and
//! writers together, and translate failures into the exit-code taxonomy.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use lockstep_core::cancel::CancelToken;
use lockstep_core::compute::{ComputeConfig, compute_network};
use lockstep_core::network::NetworkKind;
use lockstep_core::resolver::{ResolveOptions, resolve_all};
use lockstep_core::store::{IngestOutcome, MessageStore, UserSnapshot};
use lockstep_core::text::{Jaccard, MinDocSize, Similarity};
use lockstep_export::ExportOptions;
use lockstep_ingest::RecordFormat;
use lockstep_store_sqlite::SqliteStore;
use tracing::{info, warn};

use crate::http::{HttpResolver, HttpResolverConfig};
use crate::{DataError, UserError};

// ─── preprocess ──────────────────────────────────────────────────────────────

pub async fn preprocess(
  store: &SqliteStore,
  format: RecordFormat,
  files: &[PathBuf],
  max_invalid: Option<u64>,
) -> anyhow::Result<()> {
  let mut totals = IngestOutcome::default();
  let mut skipped = 0u64;

  for path in files {
    info!(file = %path.display(), "preprocessing");
    let file = File::open(path)
      .with_context(|| format!("opening {}", path.display()))?;

    let parsed = lockstep_ingest::parse_records(format, BufReader::new(file))
      .with_context(|| format!("reading {}", path.display()))?;

    for skip in &parsed.skipped {
      warn!(
        file = %path.display(),
        record = skip.record,
        reason = %skip.reason,
        "skipped unparseable record"
      );
    }
    skipped += parsed.skipped.len() as u64;

    let outcome = store.insert_messages(parsed.rows).await?;
    for rejected in &outcome.rejected {
      warn!(
        file = %path.display(),
        message_id = %rejected.message_id,
        reason = %rejected.reason,
        "rejected invalid row"
      );
    }
    totals.absorb(outcome);
  }

  let invalid = skipped + totals.rejected.len() as u64;
  info!(
    inserted = totals.inserted,
    duplicates = totals.duplicates,
    invalid,
    total = store.message_count().await?,
    "preprocess complete"
  );

  if let Some(max) = max_invalid
    && invalid > max
  {
    return Err(
      DataError(format!("{invalid} invalid records exceed --max_invalid {max}"))
        .into(),
    );
  }
  Ok(())
}

// ─── resolve_urls ────────────────────────────────────────────────────────────

pub struct ResolveSettings {
  pub workers:       usize,
  pub rate_limit:    u32,
  pub timeout_secs:  f64,
  pub max_duration:  Option<f64>,
  pub max_redirects: usize,
  pub user_agent:    String,
  pub from:          Option<String>,
  pub retry_failed:  bool,
}

pub async fn resolve_urls(
  store: &SqliteStore,
  settings: ResolveSettings,
) -> anyhow::Result<()> {
  if settings.timeout_secs <= 0.0 {
    return Err(UserError("--timeout must be positive".into()).into());
  }

  if settings.retry_failed {
    let cleared = store.clear_failed_resolutions().await?;
    info!(cleared, "cleared failure markers for retry");
  }

  let resolver = HttpResolver::new(&HttpResolverConfig {
    timeout:       Duration::from_secs_f64(settings.timeout_secs),
    max_redirects: settings.max_redirects,
    user_agent:    settings.user_agent.clone(),
    from:          settings.from.clone(),
  })
  .context("building HTTP client")?;

  let options = ResolveOptions {
    workers:    settings.workers.max(1),
    rate_limit: settings.rate_limit,
    deadline:   settings.max_duration.map(Duration::from_secs_f64),
  };

  let report = resolve_all(store, Arc::new(resolver), &options).await?;
  info!(
    attempted = report.attempted,
    resolved = report.resolved,
    transient = report.transient,
    permanent = report.permanent,
    "resolve_urls complete"
  );
  Ok(())
}

// ─── compute ─────────────────────────────────────────────────────────────────

pub struct ComputeSettings {
  pub kind:                 NetworkKind,
  pub time_window:          f64,
  pub workers:              Option<usize>,
  pub min_edge_weight:      u64,
  pub similarity_threshold: f64,
  pub min_document_size:    usize,
  pub resolved:             bool,
}

pub async fn compute(
  store: &SqliteStore,
  settings: ComputeSettings,
) -> anyhow::Result<()> {
  if !settings.time_window.is_finite() || settings.time_window < 0.0 {
    return Err(
      UserError("--time_window must be a non-negative number".into()).into(),
    );
  }
  if !(0.0..=1.0).contains(&settings.similarity_threshold) {
    return Err(
      UserError("--similarity_threshold must be in [0, 1]".into()).into(),
    );
  }

  // Documents below the size cutoff score 0 against everything.
  let similarity: Arc<dyn Similarity> = if settings.min_document_size > 1 {
    Arc::new(MinDocSize::new(settings.min_document_size))
  } else {
    Arc::new(Jaccard)
  };

  let mut config = ComputeConfig::new(settings.kind, settings.time_window);
  config.min_edge_weight = settings.min_edge_weight;
  config.similarity_threshold = settings.similarity_threshold;
  config.resolved_links = settings.resolved;
  config.similarity = similarity;
  if let Some(workers) = settings.workers {
    config.workers = workers.max(1);
  }

  info!(
    network = %settings.kind,
    time_window = settings.time_window,
    min_edge_weight = settings.min_edge_weight,
    workers = config.workers,
    "computing network"
  );

  // Ctrl-C trips the shared flag; workers notice between window steps.
  let cancel = CancelToken::new();
  let cancel_on_signal = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling compute");
      cancel_on_signal.cancel();
    }
  });

  let report = compute_network(store, &config, &cancel).await?;
  info!(
    events = report.events,
    groups = report.groups,
    edges = report.edges_written,
    "compute complete"
  );
  Ok(())
}

// ─── export ──────────────────────────────────────────────────────────────────

pub async fn export_graphml(
  store: &SqliteStore,
  output: &Path,
  kind: NetworkKind,
  options: ExportOptions,
) -> anyhow::Result<()> {
  let edges = store.network_edges(kind).await?;
  let snapshots = snapshot_map(store, options.n_messages).await?;

  let file = create_output(output)?;
  lockstep_export::write_graphml(
    BufWriter::new(file),
    kind,
    &edges,
    &snapshots,
    &options,
  )
  .with_context(|| format!("writing {}", output.display()))?;

  info!(network = %kind, output = %output.display(), edges = edges.len(), "exported graphml");
  Ok(())
}

pub async fn export_edge_csv(
  store: &SqliteStore,
  output: &Path,
  kind: NetworkKind,
  options: ExportOptions,
) -> anyhow::Result<()> {
  let edges = store.network_edges(kind).await?;

  let file = create_output(output)?;
  lockstep_export::write_edge_csv(BufWriter::new(file), kind, &edges, &options)
    .with_context(|| format!("writing {}", output.display()))?;

  info!(network = %kind, output = %output.display(), edges = edges.len(), "exported edge list");
  Ok(())
}

pub async fn export_user_nodes(
  store: &SqliteStore,
  output: &Path,
  n_messages: usize,
) -> anyhow::Result<()> {
  let snapshots = store.user_snapshots(n_messages).await?;

  let file = create_output(output)?;
  lockstep_export::write_user_nodes_csv(
    BufWriter::new(file),
    &snapshots,
    n_messages,
  )
  .with_context(|| format!("writing {}", output.display()))?;

  info!(output = %output.display(), users = snapshots.len(), "exported user nodes");
  Ok(())
}

async fn snapshot_map(
  store: &SqliteStore,
  n_messages: usize,
) -> anyhow::Result<HashMap<String, UserSnapshot>> {
  let snapshots = store.user_snapshots(n_messages).await?;
  Ok(
    snapshots
      .into_iter()
      .map(|s| (s.user_id.clone(), s))
      .collect(),
  )
}

fn create_output(path: &Path) -> anyhow::Result<File> {
  File::create(path).with_context(|| format!("creating {}", path.display()))
}
