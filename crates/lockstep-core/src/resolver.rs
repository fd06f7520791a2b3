//! The URL-resolution driver: walk every URL in the corpus that has no
//! resolution entry, resolve each through a pluggable [`UrlResolver`]
//! capability under a global token-bucket rate limit, and persist the
//! outcomes through a single writer task.
//!
//! The driver is idempotent and restartable: the store is the work queue,
//! and a URL with any recorded entry — success or failure — is never
//! attempted again. Clearing failure markers is an explicit store
//! operation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::store::{MessageStore, ResolveOutcome, UrlResolution};

/// Resolution outcomes are flushed to the store in batches of this size.
const WRITE_BATCH: usize = 64;

// ─── Capability ──────────────────────────────────────────────────────────────

/// Resolve one URL to its canonical form by following redirects.
///
/// Implementations classify failures as transient (timeout, 5xx) or
/// permanent (4xx, malformed URL); the driver persists both and never
/// retries either. Network access lives entirely behind this trait — the
/// production implementation is `lockstep-cli`'s `reqwest` client.
pub trait UrlResolver: Send + Sync {
  fn resolve<'a>(
    &'a self,
    url: &'a str,
  ) -> impl Future<Output = ResolveOutcome> + Send + 'a;
}

// ─── Rate limiter ────────────────────────────────────────────────────────────

/// A token bucket: capacity and refill rate both equal `per_second`, so
/// sustained throughput averages `per_second` over any one-second window
/// while allowing a burst of at most one bucketful.
pub struct RateLimiter {
  capacity:       f64,
  refill_per_sec: f64,
  state:          tokio::sync::Mutex<BucketState>,
}

struct BucketState {
  tokens:      f64,
  last_refill: Instant,
}

impl RateLimiter {
  pub fn new(per_second: u32) -> Self {
    let capacity = f64::from(per_second.max(1));
    Self {
      capacity,
      refill_per_sec: capacity,
      state: tokio::sync::Mutex::new(BucketState {
        tokens:      capacity,
        last_refill: Instant::now(),
      }),
    }
  }

  /// Take one token, sleeping until the bucket refills if necessary.
  pub async fn acquire(&self) {
    loop {
      let wait = {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens =
          (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
          state.tokens -= 1.0;
          return;
        }
        Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec)
      };
      tokio::time::sleep(wait).await;
    }
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Knobs for one `resolve_urls` run.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
  /// Concurrent resolver workers.
  pub workers:    usize,
  /// Global resolutions-per-second budget (token bucket).
  pub rate_limit: u32,
  /// Optional whole-run deadline; URLs not attempted in time stay
  /// unresolved and are picked up by the next run.
  pub deadline:   Option<Duration>,
}

impl Default for ResolveOptions {
  fn default() -> Self {
    Self {
      workers:    4,
      rate_limit: 25,
      deadline:   None,
    }
  }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
  pub attempted: u64,
  pub resolved:  u64,
  pub transient: u64,
  pub permanent: u64,
  /// URLs skipped because the deadline expired.
  pub expired:   u64,
}

/// Errors from the resolver driver. Per-URL failures are persisted, never
/// propagated; only store failures and worker panics abort the run.
#[derive(Debug, Error)]
pub enum ResolveError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  #[error("store error: {0}")]
  Store(#[source] E),

  #[error("resolver task panicked")]
  TaskPanic,
}

#[derive(Debug, Default)]
struct WorkerTally {
  resolved:  u64,
  transient: u64,
  permanent: u64,
  expired:   u64,
}

/// Resolve every URL in the corpus that has no resolution entry.
pub async fn resolve_all<S, R>(
  store: &S,
  resolver: Arc<R>,
  options: &ResolveOptions,
) -> Result<ResolveReport, ResolveError<S::Error>>
where
  S: MessageStore + Clone + 'static,
  R: UrlResolver + 'static,
{
  let urls = store
    .unresolved_urls()
    .await
    .map_err(ResolveError::Store)?;
  if urls.is_empty() {
    info!("no URLs pending resolution");
    return Ok(ResolveReport::default());
  }
  info!(pending = urls.len(), "resolving URLs");

  let workers = options.workers.max(1);
  let limiter = Arc::new(RateLimiter::new(options.rate_limit));
  let deadline = options.deadline.map(|d| Instant::now() + d);

  // Round-robin partition; the rate limit stays global across workers.
  let mut partitions: Vec<Vec<String>> = vec![Vec::new(); workers];
  for (i, url) in urls.into_iter().enumerate() {
    partitions[i % workers].push(url);
  }

  let (tx, rx) = mpsc::channel::<UrlResolution>(WRITE_BATCH * 2);
  let writer = tokio::spawn(write_back(store.clone(), rx));

  let mut tasks = tokio::task::JoinSet::new();
  for partition in partitions {
    let resolver = Arc::clone(&resolver);
    let limiter = Arc::clone(&limiter);
    let tx = tx.clone();
    tasks
      .spawn(run_worker(resolver, partition, limiter, tx, deadline));
  }
  drop(tx);

  let mut report = ResolveReport::default();
  while let Some(joined) = tasks.join_next().await {
    let tally = joined.map_err(|_| ResolveError::TaskPanic)?;
    report.resolved += tally.resolved;
    report.transient += tally.transient;
    report.permanent += tally.permanent;
    report.expired += tally.expired;
  }
  report.attempted = report.resolved + report.transient + report.permanent;

  writer
    .await
    .map_err(|_| ResolveError::TaskPanic)?
    .map_err(ResolveError::Store)?;

  info!(
    attempted = report.attempted,
    resolved = report.resolved,
    failed = report.transient + report.permanent,
    expired = report.expired,
    "URL resolution finished"
  );
  Ok(report)
}

async fn run_worker<R>(
  resolver: Arc<R>,
  urls: Vec<String>,
  limiter: Arc<RateLimiter>,
  tx: mpsc::Sender<UrlResolution>,
  deadline: Option<Instant>,
) -> WorkerTally
where
  R: UrlResolver,
{
  let mut tally = WorkerTally::default();
  let total = urls.len() as u64;
  let mut attempted = 0u64;

  for url in urls {
    if deadline.is_some_and(|d| Instant::now() >= d) {
      tally.expired = total - attempted;
      break;
    }

    limiter.acquire().await;
    let outcome = resolver.resolve(&url).await;
    attempted += 1;

    match &outcome {
      ResolveOutcome::Resolved(target) => {
        debug!(%url, %target, "resolved");
        tally.resolved += 1;
      }
      ResolveOutcome::TransientFailure(reason) => {
        debug!(%url, %reason, "transient failure");
        tally.transient += 1;
      }
      ResolveOutcome::PermanentFailure(reason) => {
        debug!(%url, %reason, "permanent failure");
        tally.permanent += 1;
      }
    }

    // Writer gone means the store failed; stop producing.
    if tx.send(UrlResolution { url, outcome }).await.is_err() {
      break;
    }
  }

  tally
}

/// The single writer: serializes all ResolvedURL table writes, batched.
async fn write_back<S>(
  store: S,
  mut rx: mpsc::Receiver<UrlResolution>,
) -> Result<(), S::Error>
where
  S: MessageStore,
{
  let mut batch: Vec<UrlResolution> = Vec::with_capacity(WRITE_BATCH);

  while let Some(row) = rx.recv().await {
    batch.push(row);
    if batch.len() >= WRITE_BATCH {
      store.record_resolutions(std::mem::take(&mut batch)).await?;
    }
  }
  if !batch.is_empty() {
    store.record_resolutions(batch).await?;
  }
  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
