//! Network kinds, edges, and the edge-count aggregation table.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ─── NetworkKind ─────────────────────────────────────────────────────────────

/// The six supported coordination-network types.
///
/// Each kind selects a row filter and an action key; the kind's name doubles
/// as the `edge_type` attribute in exports and (suffixed with `_network`) as
/// the materialized table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
  /// Reposting the same original post. Uses only reposts.
  CoRetweet,
  /// Posting identical text (by fingerprint). Excludes reposts.
  CoTweet,
  /// Posting sufficiently similar text (by the configured similarity).
  /// Excludes reposts.
  CoSimilarTweet,
  /// Posting the same URL. Excludes reposts; one event per (message, url).
  CoLink,
  /// Replying to the same post. Uses only replies.
  CoReply,
  /// Any message within the window — the denominator network. Excludes
  /// reposts.
  CoPost,
}

impl NetworkKind {
  pub const ALL: [NetworkKind; 6] = [
    NetworkKind::CoRetweet,
    NetworkKind::CoTweet,
    NetworkKind::CoSimilarTweet,
    NetworkKind::CoLink,
    NetworkKind::CoReply,
    NetworkKind::CoPost,
  ];

  /// The network name used on the CLI and as the `edge_type` export
  /// attribute.
  pub fn name(self) -> &'static str {
    match self {
      Self::CoRetweet => "co_retweet",
      Self::CoTweet => "co_tweet",
      Self::CoSimilarTweet => "co_similar_tweet",
      Self::CoLink => "co_link",
      Self::CoReply => "co_reply",
      Self::CoPost => "co_post",
    }
  }

  /// The materialized table holding this network's edges.
  pub fn table(self) -> &'static str {
    match self {
      Self::CoRetweet => "co_retweet_network",
      Self::CoTweet => "co_tweet_network",
      Self::CoSimilarTweet => "co_similar_tweet_network",
      Self::CoLink => "co_link_network",
      Self::CoReply => "co_reply_network",
      Self::CoPost => "co_post_network",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|k| k.name() == name)
  }
}

impl std::fmt::Display for NetworkKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

// ─── Edge ────────────────────────────────────────────────────────────────────

/// A directed, weighted edge of a materialized network.
///
/// `weight` counts action-key co-occurrences of `user_a` matched to `user_b`
/// within the time window. Self-loops (`user_a == user_b`) are recorded and
/// filtered at export by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
  pub user_a: String,
  pub user_b: String,
  pub weight: u64,
}

// ─── EdgeCounts ──────────────────────────────────────────────────────────────

/// Aggregation table mapping ordered `(user_a, user_b)` pairs to weights.
///
/// Merging is commutative-associative summation, which is what makes the
/// parallel join deterministic regardless of how groups are distributed
/// across workers.
#[derive(Debug, Default)]
pub struct EdgeCounts {
  counts: HashMap<(String, String), u64>,
}

impl EdgeCounts {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record one co-occurrence between `a` and `b`: both ordered directions
  /// gain weight 1. A self-pair (`a == b`) therefore adds 2 to the loop.
  pub fn record_pair(&mut self, a: &str, b: &str) {
    self.add(a, b);
    self.add(b, a);
  }

  fn add(&mut self, from: &str, to: &str) {
    *self
      .counts
      .entry((from.to_owned(), to.to_owned()))
      .or_insert(0) += 1;
  }

  /// Fold another partial table into this one by summation.
  pub fn merge(&mut self, other: EdgeCounts) {
    for (pair, weight) in other.counts {
      *self.counts.entry(pair).or_insert(0) += weight;
    }
  }

  /// The weight recorded for an ordered pair (0 if absent).
  pub fn weight(&self, a: &str, b: &str) -> u64 {
    self
      .counts
      .get(&(a.to_owned(), b.to_owned()))
      .copied()
      .unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.counts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.counts.is_empty()
  }

  /// Drain into a deterministic edge list, sorted by `(user_a, user_b)`.
  pub fn into_edges(self) -> Vec<Edge> {
    let mut edges: Vec<Edge> = self
      .counts
      .into_iter()
      .map(|((user_a, user_b), weight)| Edge { user_a, user_b, weight })
      .collect();
    edges.sort_by(|x, y| {
      (&x.user_a, &x.user_b).cmp(&(&y.user_a, &y.user_b))
    });
    edges
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn names_round_trip() {
    for kind in NetworkKind::ALL {
      assert_eq!(NetworkKind::from_name(kind.name()), Some(kind));
      assert_eq!(kind.table(), format!("{}_network", kind.name()));
    }
    assert_eq!(NetworkKind::from_name("co_everything"), None);
  }

  #[test]
  fn record_pair_emits_both_directions() {
    let mut counts = EdgeCounts::new();
    counts.record_pair("u", "v");
    assert_eq!(counts.weight("u", "v"), 1);
    assert_eq!(counts.weight("v", "u"), 1);
  }

  #[test]
  fn self_pair_counts_twice() {
    let mut counts = EdgeCounts::new();
    counts.record_pair("u", "u");
    assert_eq!(counts.weight("u", "u"), 2);
  }

  #[test]
  fn merge_sums_weights() {
    let mut a = EdgeCounts::new();
    a.record_pair("u", "v");
    let mut b = EdgeCounts::new();
    b.record_pair("u", "v");
    b.record_pair("v", "w");
    a.merge(b);
    assert_eq!(a.weight("u", "v"), 2);
    assert_eq!(a.weight("v", "u"), 2);
    assert_eq!(a.weight("w", "v"), 1);
  }

  #[test]
  fn into_edges_is_sorted() {
    let mut counts = EdgeCounts::new();
    counts.record_pair("b", "a");
    counts.record_pair("a", "c");
    let edges = counts.into_edges();
    let pairs: Vec<(&str, &str)> = edges
      .iter()
      .map(|e| (e.user_a.as_str(), e.user_b.as_str()))
      .collect();
    assert_eq!(pairs, vec![("a", "b"), ("a", "c"), ("b", "a"), ("c", "a")]);
  }
}
