//! Integration tests for `SqliteStore` against in-memory corpora, including
//! the full compute and resolve paths running over the real store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lockstep_core::cancel::CancelToken;
use lockstep_core::compute::{ComputeConfig, compute_network};
use lockstep_core::error::RowViolation;
use lockstep_core::network::{Edge, NetworkKind};
use lockstep_core::resolver::{
  ResolveOptions, UrlResolver, resolve_all,
};
use lockstep_core::store::{MessageStore, ResolveOutcome, UrlResolution};
use lockstep_core::{Cancelled, EngineError, NormalizedMessage};

use crate::{Error, SqliteStore};

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

fn msg(id: &str, user: &str, t: f64) -> NormalizedMessage {
  NormalizedMessage {
    message_id: id.into(),
    user_id:    user.into(),
    username:   format!("@{user}"),
    repost_id:  None,
    reply_id:   None,
    message:    format!("message {id}"),
    timestamp:  t,
    urls:       vec![],
  }
}

fn repost(id: &str, user: &str, of: &str, t: f64) -> NormalizedMessage {
  let mut m = msg(id, user, t);
  m.repost_id = Some(of.into());
  m
}

fn reply(id: &str, user: &str, to: &str, t: f64) -> NormalizedMessage {
  let mut m = msg(id, user, t);
  m.reply_id = Some(to.into());
  m
}

fn with_text(mut m: NormalizedMessage, text: &str) -> NormalizedMessage {
  m.message = text.into();
  m
}

fn with_urls(mut m: NormalizedMessage, urls: &[&str]) -> NormalizedMessage {
  m.urls = urls.iter().map(|u| (*u).to_owned()).collect();
  m
}

fn config(kind: NetworkKind, window: f64) -> ComputeConfig {
  let mut config = ComputeConfig::new(kind, window);
  config.workers = 2;
  config
}

async fn compute(
  store: &SqliteStore,
  kind: NetworkKind,
  window: f64,
) -> Result<(), EngineError<Error>> {
  compute_network(store, &config(kind, window), &CancelToken::new())
    .await
    .map(|_| ())
}

async fn edge_map(
  store: &SqliteStore,
  kind: NetworkKind,
) -> HashMap<(String, String), u64> {
  store
    .network_edges(kind)
    .await
    .unwrap()
    .into_iter()
    .map(|e| ((e.user_a, e.user_b), e.weight))
    .collect()
}

fn pair(a: &str, b: &str) -> (String, String) {
  (a.to_owned(), b.to_owned())
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_is_idempotent() {
  let s = store().await;
  let rows = vec![msg("1", "u", 0.0), msg("2", "v", 1.0)];

  let first = s.insert_messages(rows.clone()).await.unwrap();
  assert_eq!(first.inserted, 2);
  assert_eq!(first.duplicates, 0);

  let second = s.insert_messages(rows).await.unwrap();
  assert_eq!(second.inserted, 0);
  assert_eq!(second.duplicates, 2);

  assert_eq!(s.message_count().await.unwrap(), 2);
}

#[tokio::test]
async fn dedup_keeps_the_first_occurrence() {
  let s = store().await;
  s.insert_messages(vec![with_text(msg("1", "u", 0.0), "first")])
    .await
    .unwrap();
  s.insert_messages(vec![with_text(msg("1", "u", 5.0), "second")])
    .await
    .unwrap();

  let snapshots = s.user_snapshots(10).await.unwrap();
  assert_eq!(snapshots.len(), 1);
  assert_eq!(snapshots[0].messages, vec!["first".to_owned()]);
}

#[tokio::test]
async fn invalid_rows_are_rejected_and_counted() {
  let s = store().await;

  let mut both = msg("1", "u", 0.0);
  both.repost_id = Some("9".into());
  both.reply_id = Some("8".into());

  let mut nan = msg("2", "u", 0.0);
  nan.timestamp = f64::NAN;

  let mut anon = msg("3", "", 0.0);
  anon.user_id = String::new();

  let outcome = s
    .insert_messages(vec![both, nan, anon, msg("4", "u", 1.0)])
    .await
    .unwrap();

  assert_eq!(outcome.inserted, 1);
  assert_eq!(outcome.rejected.len(), 3);
  let reasons: Vec<RowViolation> =
    outcome.rejected.iter().map(|r| r.reason).collect();
  assert!(reasons.contains(&RowViolation::RepostAndReply));
  assert!(reasons.contains(&RowViolation::NonFiniteTimestamp));
  assert!(reasons.contains(&RowViolation::EmptyUserId));
  assert_eq!(s.message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn repost_urls_are_not_link_candidates() {
  let s = store().await;
  s.insert_messages(vec![
    with_urls(msg("1", "u", 0.0), &["http://a.example"]),
    with_urls(repost("2", "v", "1", 1.0), &["http://a.example"]),
  ])
  .await
  .unwrap();

  let events = s.join_events(NetworkKind::CoLink, false).await.unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].user_id, "u");
}

// ─── Scenario A: co-retweet ──────────────────────────────────────────────────

#[tokio::test]
async fn co_retweet_chain() {
  let s = store().await;
  s.insert_messages(vec![
    repost("1", "U", "X", 0.0),
    repost("2", "V", "X", 30.0),
    repost("3", "W", "X", 120.0),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoRetweet, 60.0).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoRetweet).await;

  let mut expected = HashMap::new();
  expected.insert(pair("U", "V"), 1);
  expected.insert(pair("V", "U"), 1);
  expected.insert(pair("V", "W"), 1);
  expected.insert(pair("W", "V"), 1);
  assert_eq!(edges, expected);
}

// ─── Scenario B: co-tweet ────────────────────────────────────────────────────

#[tokio::test]
async fn co_tweet_matches_on_normalized_text() {
  let s = store().await;
  s.insert_messages(vec![
    with_text(msg("1", "U", 0.0), "hello"),
    with_text(msg("2", "V", 10.0), "HELLO"),
    with_text(msg("3", "V", 20.0), "hello"),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoTweet, 60.0).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoTweet).await;

  assert_eq!(edges.get(&pair("U", "V")), Some(&2));
  assert_eq!(edges.get(&pair("V", "U")), Some(&2));
  // The self-loop is recorded in the table; export filters it by default.
  assert_eq!(edges.get(&pair("V", "V")), Some(&2));
}

#[tokio::test]
async fn co_tweet_excludes_reposts() {
  let s = store().await;
  s.insert_messages(vec![
    with_text(msg("1", "U", 0.0), "same words"),
    with_text(repost("2", "V", "1", 5.0), "same words"),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoTweet, 60.0).await.unwrap();
  assert!(edge_map(&s, NetworkKind::CoTweet).await.is_empty());
}

// ─── Scenario C: co-link ─────────────────────────────────────────────────────

#[tokio::test]
async fn co_link_counts_each_shared_url() {
  let s = store().await;
  s.insert_messages(vec![
    with_urls(msg("1", "U", 0.0), &["a", "b"]),
    with_urls(msg("2", "V", 30.0), &["a", "b", "c"]),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoLink, 60.0).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoLink).await;

  let mut expected = HashMap::new();
  expected.insert(pair("U", "V"), 2);
  expected.insert(pair("V", "U"), 2);
  assert_eq!(edges, expected);
}

#[tokio::test]
async fn co_link_uses_canonical_urls_when_resolved() {
  let s = store().await;
  s.insert_messages(vec![
    with_urls(msg("1", "U", 0.0), &["http://sho.rt/1"]),
    with_urls(msg("2", "V", 10.0), &["http://sho.rt/2"]),
  ])
  .await
  .unwrap();

  // Both short links point at the same canonical page.
  s.record_resolutions(vec![
    UrlResolution {
      url:     "http://sho.rt/1".into(),
      outcome: ResolveOutcome::Resolved("http://long.example/page".into()),
    },
    UrlResolution {
      url:     "http://sho.rt/2".into(),
      outcome: ResolveOutcome::Resolved("http://long.example/page".into()),
    },
  ])
  .await
  .unwrap();

  // Raw keys differ: no edges.
  compute(&s, NetworkKind::CoLink, 60.0).await.unwrap();
  assert!(edge_map(&s, NetworkKind::CoLink).await.is_empty());

  // Resolved keys collide: one co-occurrence.
  let mut cfg = config(NetworkKind::CoLink, 60.0);
  cfg.resolved_links = true;
  compute_network(&s, &cfg, &CancelToken::new()).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoLink).await;
  assert_eq!(edges.get(&pair("U", "V")), Some(&1));
}

#[tokio::test]
async fn co_link_resolved_falls_back_to_raw_urls() {
  let s = store().await;
  s.insert_messages(vec![
    with_urls(msg("1", "U", 0.0), &["http://plain.example"]),
    with_urls(msg("2", "V", 10.0), &["http://plain.example"]),
  ])
  .await
  .unwrap();

  let mut cfg = config(NetworkKind::CoLink, 60.0);
  cfg.resolved_links = true;
  compute_network(&s, &cfg, &CancelToken::new()).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoLink).await;
  assert_eq!(edges.get(&pair("U", "V")), Some(&1));
}

// ─── Scenario D: co-similarity ───────────────────────────────────────────────

#[tokio::test]
async fn co_similarity_respects_the_threshold() {
  let s = store().await;
  s.insert_messages(vec![
    with_text(msg("1", "U", 0.0), "the cat sat on mat"),
    with_text(msg("2", "V", 30.0), "the cat sat on mat slowly"),
  ])
  .await
  .unwrap();

  // Jaccard is 5/6 ≈ 0.833.
  let mut cfg = config(NetworkKind::CoSimilarTweet, 60.0);
  cfg.similarity_threshold = 0.8;
  compute_network(&s, &cfg, &CancelToken::new()).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoSimilarTweet).await;
  assert_eq!(edges.get(&pair("U", "V")), Some(&1));
  assert_eq!(edges.get(&pair("V", "U")), Some(&1));

  let mut cfg = config(NetworkKind::CoSimilarTweet, 60.0);
  cfg.similarity_threshold = 0.9;
  compute_network(&s, &cfg, &CancelToken::new()).await.unwrap();
  assert!(edge_map(&s, NetworkKind::CoSimilarTweet).await.is_empty());
}

// ─── Scenario E: window boundary ─────────────────────────────────────────────

#[tokio::test]
async fn window_boundary_is_inclusive_end_to_end() {
  let s = store().await;
  s.insert_messages(vec![
    repost("1", "U", "X", 0.0),
    repost("2", "V", "X", 60.0),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoRetweet, 60.0).await.unwrap();
  assert_eq!(
    edge_map(&s, NetworkKind::CoRetweet).await.get(&pair("U", "V")),
    Some(&1)
  );

  compute(&s, NetworkKind::CoRetweet, 59.0).await.unwrap();
  assert!(edge_map(&s, NetworkKind::CoRetweet).await.is_empty());
}

// ─── Monotonicity in W ───────────────────────────────────────────────────────

#[tokio::test]
async fn widening_the_window_never_shrinks_weights() {
  let s = store().await;
  let mut rows = Vec::new();
  for i in 0..20 {
    rows.push(repost(
      &format!("{i}"),
      &format!("u{}", i % 4),
      "X",
      (i as f64) * 13.0,
    ));
  }
  s.insert_messages(rows).await.unwrap();

  compute(&s, NetworkKind::CoRetweet, 30.0).await.unwrap();
  let narrow = edge_map(&s, NetworkKind::CoRetweet).await;
  compute(&s, NetworkKind::CoRetweet, 90.0).await.unwrap();
  let wide = edge_map(&s, NetworkKind::CoRetweet).await;

  for (pair, weight) in &narrow {
    assert!(wide.get(pair).is_some_and(|w| w >= weight), "{pair:?}");
  }
}

// ─── Co-reply & co-post ──────────────────────────────────────────────────────

#[tokio::test]
async fn co_reply_joins_on_the_replied_to_message() {
  let s = store().await;
  s.insert_messages(vec![
    reply("1", "U", "T", 0.0),
    reply("2", "V", "T", 30.0),
    reply("3", "W", "other", 30.0),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoReply, 60.0).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoReply).await;
  assert_eq!(edges.get(&pair("U", "V")), Some(&1));
  assert_eq!(edges.get(&pair("U", "W")), None);
}

#[tokio::test]
async fn co_post_pairs_everything_in_window_except_reposts() {
  let s = store().await;
  s.insert_messages(vec![
    msg("1", "U", 0.0),
    msg("2", "V", 30.0),
    repost("3", "W", "X", 40.0),
  ])
  .await
  .unwrap();

  compute(&s, NetworkKind::CoPost, 60.0).await.unwrap();
  let edges = edge_map(&s, NetworkKind::CoPost).await;
  assert_eq!(edges.get(&pair("U", "V")), Some(&1));
  assert!(!edges.keys().any(|(a, b)| a == "W" || b == "W"));
}

// ─── Network tables ──────────────────────────────────────────────────────────

#[tokio::test]
async fn write_network_filters_by_min_weight() {
  let s = store().await;
  let edges = vec![
    Edge { user_a: "a".into(), user_b: "b".into(), weight: 1 },
    Edge { user_a: "b".into(), user_b: "c".into(), weight: 3 },
  ];
  let written = s
    .write_network(NetworkKind::CoTweet, edges, 2)
    .await
    .unwrap();
  assert_eq!(written, 1);

  let read = s.network_edges(NetworkKind::CoTweet).await.unwrap();
  assert_eq!(read.len(), 1);
  assert_eq!(read[0].user_a, "b");
  assert_eq!(read[0].weight, 3);
}

#[tokio::test]
async fn write_network_replaces_the_previous_table() {
  let s = store().await;
  let first = vec![Edge {
    user_a: "a".into(),
    user_b: "b".into(),
    weight: 5,
  }];
  s.write_network(NetworkKind::CoLink, first, 1).await.unwrap();

  let second = vec![Edge {
    user_a: "x".into(),
    user_b: "y".into(),
    weight: 1,
  }];
  s.write_network(NetworkKind::CoLink, second, 1).await.unwrap();

  let read = s.network_edges(NetworkKind::CoLink).await.unwrap();
  assert_eq!(read.len(), 1);
  assert_eq!(read[0].user_a, "x");
}

#[tokio::test]
async fn reading_an_uncomputed_network_errors() {
  let s = store().await;
  let err = s.network_edges(NetworkKind::CoReply).await.unwrap_err();
  assert!(matches!(err, Error::NetworkNotComputed("co_reply")));
}

#[tokio::test]
async fn cancelled_compute_preserves_the_previous_table() {
  let s = store().await;
  s.insert_messages(vec![
    repost("1", "U", "X", 0.0),
    repost("2", "V", "X", 30.0),
  ])
  .await
  .unwrap();
  compute(&s, NetworkKind::CoRetweet, 60.0).await.unwrap();
  let before = edge_map(&s, NetworkKind::CoRetweet).await;

  let cancel = CancelToken::new();
  cancel.cancel();
  let err = compute_network(
    &s,
    &config(NetworkKind::CoRetweet, 3600.0),
    &cancel,
  )
  .await
  .unwrap_err();
  assert!(matches!(err, EngineError::Cancelled(Cancelled)));

  assert_eq!(edge_map(&s, NetworkKind::CoRetweet).await, before);
}

// ─── Scenario F: URL resolution ──────────────────────────────────────────────

struct MockResolver {
  calls:    AtomicU64,
  outcomes: HashMap<String, ResolveOutcome>,
}

impl MockResolver {
  fn new(outcomes: &[(&str, ResolveOutcome)]) -> Arc<Self> {
    Arc::new(Self {
      calls:    AtomicU64::new(0),
      outcomes: outcomes
        .iter()
        .map(|(url, outcome)| ((*url).to_owned(), outcome.clone()))
        .collect(),
    })
  }

  fn calls(&self) -> u64 {
    self.calls.load(Ordering::SeqCst)
  }
}

impl UrlResolver for MockResolver {
  async fn resolve(&self, url: &str) -> ResolveOutcome {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .outcomes
      .get(url)
      .cloned()
      .unwrap_or(ResolveOutcome::PermanentFailure("unknown url".into()))
  }
}

fn resolve_options() -> ResolveOptions {
  ResolveOptions { workers: 2, rate_limit: 1000, deadline: None }
}

#[tokio::test]
async fn resolver_is_idempotent_across_runs() {
  let s = store().await;
  s.insert_messages(vec![
    with_urls(msg("1", "u", 0.0), &["x"]),
    with_urls(msg("2", "v", 1.0), &["y"]),
  ])
  .await
  .unwrap();

  let mock = MockResolver::new(&[
    ("x", ResolveOutcome::Resolved("X".into())),
    ("y", ResolveOutcome::TransientFailure("timeout".into())),
  ]);

  let report = resolve_all(&s, Arc::clone(&mock), &resolve_options())
    .await
    .unwrap();
  assert_eq!(report.attempted, 2);
  assert_eq!(report.resolved, 1);
  assert_eq!(report.transient, 1);
  assert_eq!(mock.calls(), 2);

  // Second run: the failure marker also blocks retry, so zero calls.
  let report = resolve_all(&s, Arc::clone(&mock), &resolve_options())
    .await
    .unwrap();
  assert_eq!(report.attempted, 0);
  assert_eq!(mock.calls(), 2);
}

#[tokio::test]
async fn clearing_failure_markers_allows_retry() {
  let s = store().await;
  s.insert_messages(vec![with_urls(msg("1", "u", 0.0), &["x", "y"])])
    .await
    .unwrap();

  let mock = MockResolver::new(&[
    ("x", ResolveOutcome::Resolved("X".into())),
    ("y", ResolveOutcome::TransientFailure("http 503".into())),
  ]);
  resolve_all(&s, Arc::clone(&mock), &resolve_options())
    .await
    .unwrap();
  assert_eq!(mock.calls(), 2);

  let cleared = s.clear_failed_resolutions().await.unwrap();
  assert_eq!(cleared, 1);

  // Only the failed URL comes back; the success entry is permanent.
  assert_eq!(s.unresolved_urls().await.unwrap(), vec!["y".to_owned()]);
  resolve_all(&s, Arc::clone(&mock), &resolve_options())
    .await
    .unwrap();
  assert_eq!(mock.calls(), 3);
}

#[tokio::test]
async fn recorded_resolutions_are_never_overwritten() {
  let s = store().await;
  s.insert_messages(vec![with_urls(msg("1", "u", 0.0), &["x"])])
    .await
    .unwrap();

  s.record_resolutions(vec![UrlResolution {
    url:     "x".into(),
    outcome: ResolveOutcome::Resolved("first".into()),
  }])
  .await
  .unwrap();
  s.record_resolutions(vec![UrlResolution {
    url:     "x".into(),
    outcome: ResolveOutcome::Resolved("second".into()),
  }])
  .await
  .unwrap();

  let events = s.join_events(NetworkKind::CoLink, true).await.unwrap();
  assert_eq!(events[0].key, "first");
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn user_snapshots_return_latest_messages_first() {
  let s = store().await;
  s.insert_messages(vec![
    with_text(msg("1", "u", 10.0), "old"),
    with_text(msg("2", "u", 30.0), "newest"),
    with_text(msg("3", "u", 20.0), "middle"),
    with_text(msg("4", "v", 5.0), "only"),
  ])
  .await
  .unwrap();

  let snapshots = s.user_snapshots(2).await.unwrap();
  assert_eq!(snapshots.len(), 2);

  let u = snapshots.iter().find(|s| s.user_id == "u").unwrap();
  assert_eq!(u.messages, vec!["newest".to_owned(), "middle".to_owned()]);
  assert_eq!(u.username, "@u");

  let v = snapshots.iter().find(|s| s.user_id == "v").unwrap();
  assert_eq!(v.messages, vec!["only".to_owned()]);
}

#[tokio::test]
async fn user_snapshots_clamp_to_zero_messages() {
  let s = store().await;
  s.insert_messages(vec![msg("1", "u", 0.0)]).await.unwrap();
  let snapshots = s.user_snapshots(0).await.unwrap();
  assert_eq!(snapshots[0].messages.len(), 0);
}
