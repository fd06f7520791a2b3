//! The `MessageStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g.
//! `lockstep-store-sqlite`). Higher layers (the join engine, the URL
//! resolver driver, the CLI) depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::error::RowViolation;
use crate::message::NormalizedMessage;
use crate::network::{Edge, NetworkKind};
use crate::text::TokenSet;

// ─── Ingest types ────────────────────────────────────────────────────────────

/// A row rejected at ingest for violating the corpus invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
  /// May be empty when the violation is the missing id itself.
  pub message_id: String,
  pub reason:     RowViolation,
}

/// Counters returned by [`MessageStore::insert_messages`].
///
/// Duplicate `message_id`s are silent — counted, never an error. The first
/// occurrence per id wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
  pub inserted:   u64,
  pub duplicates: u64,
  pub rejected:   Vec<RejectedRow>,
}

impl IngestOutcome {
  pub fn absorb(&mut self, other: IngestOutcome) {
    self.inserted += other.inserted;
    self.duplicates += other.duplicates;
    self.rejected.extend(other.rejected);
  }
}

// ─── Join types ──────────────────────────────────────────────────────────────

/// One event delivered to the temporal join engine.
///
/// The store yields events grouped by `key` and, within a group, sorted by
/// `(timestamp, message_id)` ascending — the ordering the sliding window
/// depends on. `tokens` is populated only for co-similar-tweet scans.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinEvent {
  pub message_id: String,
  pub user_id:    String,
  pub timestamp:  f64,
  /// The action key: repost id, fingerprint, URL, reply id, or empty for
  /// keyless kinds (co-post, pre-bucketing co-similarity).
  pub key:        String,
  pub tokens:     Option<TokenSet>,
}

// ─── Resolver types ──────────────────────────────────────────────────────────

/// The outcome of resolving one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
  /// Redirects followed to a final canonical URL.
  Resolved(String),
  /// Timeout or 5xx — recorded as a retryable marker. Per current policy
  /// the marker still blocks retries until explicitly cleared.
  TransientFailure(String),
  /// 4xx, malformed URL, or a redirect loop — never retried.
  PermanentFailure(String),
}

/// A resolution outcome ready to be persisted against its raw URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlResolution {
  pub url:     String,
  pub outcome: ResolveOutcome,
}

// ─── Export types ────────────────────────────────────────────────────────────

/// Per-user export annotation: a representative username and the latest-N
/// messages by timestamp descending.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSnapshot {
  pub user_id:  String,
  pub username: String,
  pub messages: Vec<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a corpus store backend.
///
/// Messages are immutable once ingested; network tables are materialized
/// views replaced atomically per compute; URL resolutions are append-only.
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait MessageStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Ingest ────────────────────────────────────────────────────────────

  /// Insert a batch of normalized rows. Rows violating the corpus
  /// invariants are rejected and counted; duplicates by `message_id` are
  /// silently counted.
  fn insert_messages(
    &self,
    rows: Vec<NormalizedMessage>,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_;

  /// Total number of messages in the corpus.
  fn message_count(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Join scans ────────────────────────────────────────────────────────

  /// The event stream for one network kind: filtered per the kind's row
  /// filter, grouped by action key, sorted by `(timestamp, message_id)`
  /// within each group. With `resolved_links` set, co-link keys are the
  /// canonical URL where a resolution exists, the raw URL otherwise.
  fn join_events(
    &self,
    kind: NetworkKind,
    resolved_links: bool,
  ) -> impl Future<Output = Result<Vec<JoinEvent>, Self::Error>> + Send + '_;

  // ── Network tables ────────────────────────────────────────────────────

  /// Atomically replace the kind's network table with the edges at or above
  /// `min_weight`. Returns the number of edges written.
  fn write_network(
    &self,
    kind: NetworkKind,
    edges: Vec<Edge>,
    min_weight: u64,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Read back a materialized network, sorted by `(user_a, user_b)`.
  fn network_edges(
    &self,
    kind: NetworkKind,
  ) -> impl Future<Output = Result<Vec<Edge>, Self::Error>> + Send + '_;

  // ── URL resolutions ───────────────────────────────────────────────────

  /// Distinct URLs with no resolution entry yet, in stable order.
  fn unresolved_urls(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Persist resolution outcomes. Existing entries are never overwritten.
  fn record_resolutions(
    &self,
    rows: Vec<UrlResolution>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Delete failure markers so the next resolver run retries them.
  /// Returns the number of markers cleared.
  fn clear_failed_resolutions(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Export reads ──────────────────────────────────────────────────────

  /// Per-user snapshots: representative username plus the `n_messages`
  /// most recent messages, for every user in the corpus.
  fn user_snapshots(
    &self,
    n_messages: usize,
  ) -> impl Future<Output = Result<Vec<UserSnapshot>, Self::Error>> + Send + '_;
}
