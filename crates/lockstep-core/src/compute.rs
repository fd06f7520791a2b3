//! Compute orchestration: scan events from the store, group them by action
//! key, run the parallel join, and atomically replace the network table.
//!
//! A run moves through `scanning → joining → aggregating → writing → done`;
//! a fatal failure or cancellation aborts the run with the previous
//! materialization intact (the table swap in the store is atomic).

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::EngineError;
use crate::join::{JoinOptions, join_groups};
use crate::network::NetworkKind;
use crate::store::{JoinEvent, MessageStore};
use crate::text::Similarity;
use crate::window::PairPolicy;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Parameters of one `compute` invocation.
#[derive(Clone)]
pub struct ComputeConfig {
  pub kind:                 NetworkKind,
  /// The time window W in seconds; `|Δt| ≤ W` pairs co-occur.
  pub time_window:          f64,
  /// Minimum weight for an edge to be materialized.
  pub min_edge_weight:      u64,
  /// Only used for co-similar-tweet.
  pub similarity_threshold: f64,
  /// Key co-link by resolved URLs where available.
  pub resolved_links:       bool,
  /// Worker thread count; defaults to the number of CPU cores.
  pub workers:              usize,
  /// The similarity capability for co-similar-tweet.
  pub similarity:           Arc<dyn Similarity>,
}

impl ComputeConfig {
  pub fn new(kind: NetworkKind, time_window: f64) -> Self {
    Self {
      kind,
      time_window,
      min_edge_weight: 1,
      similarity_threshold: 0.8,
      resolved_links: false,
      workers: std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1),
      similarity: Arc::new(crate::text::Jaccard),
    }
  }
}

/// What a completed compute did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeReport {
  pub events:        usize,
  pub groups:        usize,
  /// Ordered pairs aggregated before the weight filter.
  pub pairs:         usize,
  /// Edges written to the network table after the weight filter.
  pub edges_written: u64,
}

// ─── Orchestration ───────────────────────────────────────────────────────────

/// Materialize one network table from the corpus.
pub async fn compute_network<S>(
  store: &S,
  config: &ComputeConfig,
  cancel: &CancelToken,
) -> Result<ComputeReport, EngineError<S::Error>>
where
  S: MessageStore,
{
  let kind = config.kind;

  debug!(network = %kind, phase = "scanning", "loading events");
  let events = store
    .join_events(kind, config.resolved_links)
    .await
    .map_err(EngineError::Store)?;
  let n_events = events.len();

  let groups = group_events(kind, events, config.similarity.as_ref());
  let n_groups = groups.len();
  debug!(
    network = %kind,
    phase = "joining",
    events = n_events,
    groups = n_groups,
    workers = config.workers,
    "running temporal join"
  );

  let policy = match kind {
    NetworkKind::CoSimilarTweet => PairPolicy::Threshold {
      similarity: Arc::clone(&config.similarity),
      theta:      config.similarity_threshold,
    },
    _ => PairPolicy::KeyEquality,
  };
  let options = JoinOptions {
    window:  config.time_window,
    workers: config.workers,
  };

  let counts = {
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
      join_groups(groups, &policy, &options, &cancel)
    })
    .await
    .map_err(|_| EngineError::WorkerPanic)??
  };

  debug!(network = %kind, phase = "aggregating", pairs = counts.len(), "aggregated");
  let pairs = counts.len();
  let edges = counts.into_edges();

  debug!(network = %kind, phase = "writing", "replacing network table");
  let edges_written = store
    .write_network(kind, edges, config.min_edge_weight)
    .await
    .map_err(EngineError::Store)?;

  info!(
    network = %kind,
    events = n_events,
    groups = n_groups,
    edges = edges_written,
    "network materialized"
  );

  Ok(ComputeReport {
    events: n_events,
    groups: n_groups,
    pairs,
    edges_written,
  })
}

// ─── Grouping ────────────────────────────────────────────────────────────────

/// Split the store's ordered event stream into independent key groups.
///
/// Equality kinds arrive sorted by `(key, timestamp, message_id)` and split
/// on key change. Co-post is one keyless group. Co-similar-tweet events are
/// re-keyed through `Similarity::bucket` — exactly one bucket per event —
/// preserving the per-bucket `(timestamp, message_id)` order the store
/// delivered.
fn group_events(
  kind: NetworkKind,
  events: Vec<JoinEvent>,
  similarity: &dyn Similarity,
) -> Vec<Vec<JoinEvent>> {
  if events.is_empty() {
    return Vec::new();
  }

  match kind {
    NetworkKind::CoPost => vec![events],
    NetworkKind::CoSimilarTweet => {
      let mut buckets: BTreeMap<String, Vec<JoinEvent>> = BTreeMap::new();
      for mut event in events {
        let bucket = match &event.tokens {
          Some(tokens) => similarity.bucket(tokens),
          None => String::new(),
        };
        event.key = bucket.clone();
        buckets.entry(bucket).or_default().push(event);
      }
      buckets.into_values().collect()
    }
    _ => {
      let mut groups: Vec<Vec<JoinEvent>> = Vec::new();
      for event in events {
        match groups.last_mut() {
          Some(group) if group[0].key == event.key => group.push(event),
          _ => groups.push(vec![event]),
        }
      }
      groups
    }
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
