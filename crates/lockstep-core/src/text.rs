//! Deterministic text preprocessing: normalization, fingerprinting,
//! tokenization, and the pluggable similarity capability.
//!
//! Everything here must be stable across processes and versions — the
//! fingerprint and the encoded token set are persisted in the corpus and
//! compared byte-for-byte across runs.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

// ─── Normalization & fingerprint ─────────────────────────────────────────────

/// Normalize text for equality comparison: lowercase, collapse internal
/// whitespace runs to a single space, strip surrounding whitespace.
pub fn normalize(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for word in text.split_whitespace() {
    if !out.is_empty() {
      out.push(' ');
    }
    for c in word.chars() {
      out.extend(c.to_lowercase());
    }
  }
  out
}

/// 64-bit fingerprint of the normalized text, used for co-tweet equality.
///
/// First 8 bytes (big-endian) of the SHA-256 digest. SHA-256 rather than a
/// `std` hasher because the value is persisted and must not change across
/// Rust versions.
pub fn fingerprint(text: &str) -> u64 {
  let digest = Sha256::digest(normalize(text).as_bytes());
  u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

// ─── TokenSet ────────────────────────────────────────────────────────────────

/// The boolean bag-of-words of a message: lowercased, split on boundaries
/// between alphanumeric and non-alphanumeric characters, duplicates dropped.
///
/// Token sets round-trip through a sorted space-joined string for storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet(BTreeSet<String>);

impl TokenSet {
  /// The empty token set. Jaccard against anything is 0.
  pub const fn empty() -> Self {
    Self(BTreeSet::new())
  }

  pub fn from_text(text: &str) -> Self {
    let lowered = text.to_lowercase();
    let tokens = lowered
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| !t.is_empty())
      .map(str::to_owned)
      .collect();
    Self(tokens)
  }

  /// Decode the stored space-joined form.
  pub fn decode(encoded: &str) -> Self {
    Self(encoded.split_whitespace().map(str::to_owned).collect())
  }

  /// Encode as a sorted space-joined string (the stored form).
  pub fn encode(&self) -> String {
    let mut out = String::new();
    for token in &self.0 {
      if !out.is_empty() {
        out.push(' ');
      }
      out.push_str(token);
    }
    out
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Jaccard similarity |A ∩ B| / |A ∪ B|, with 0 when both sets are empty.
  pub fn jaccard(&self, other: &TokenSet) -> f64 {
    if self.0.is_empty() && other.0.is_empty() {
      return 0.0;
    }
    let intersection = self.0.intersection(&other.0).count();
    let union = self.0.len() + other.0.len() - intersection;
    intersection as f64 / union as f64
  }
}

// ─── Similarity capability ───────────────────────────────────────────────────

/// The pluggable similarity capability consumed by the join engine for
/// co-similar-tweet networks.
///
/// `bucket` assigns each event to exactly one candidate group — pairs are
/// only ever compared within a group, and counted at most once. `score`
/// rates a candidate pair in `[0, 1]`; pairs at or above the configured
/// threshold become edges.
pub trait Similarity: Send + Sync {
  /// The action-key bucket for a token set. Must assign each event to
  /// exactly one group.
  fn bucket(&self, tokens: &TokenSet) -> String;

  /// Similarity of two token sets in `[0, 1]`.
  fn score(&self, a: &TokenSet, b: &TokenSet) -> f64;
}

/// Plain Jaccard similarity over a single whole-window candidate group.
///
/// Bucketing everything together keeps the guarantee that every pair
/// meeting the threshold is considered; the sliding window bounds the
/// candidate set.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jaccard;

impl Similarity for Jaccard {
  fn bucket(&self, _tokens: &TokenSet) -> String {
    String::new()
  }

  fn score(&self, a: &TokenSet, b: &TokenSet) -> f64 {
    a.jaccard(b)
  }
}

/// Jaccard similarity that discards short documents.
///
/// A message with fewer than `min_tokens` tokens (a lone mention plus a
/// hashtag, say) scores 0 against everything.
#[derive(Debug, Clone, Copy)]
pub struct MinDocSize {
  min_tokens: usize,
}

impl MinDocSize {
  pub fn new(min_tokens: usize) -> Self {
    Self { min_tokens }
  }
}

impl Similarity for MinDocSize {
  fn bucket(&self, _tokens: &TokenSet) -> String {
    String::new()
  }

  fn score(&self, a: &TokenSet, b: &TokenSet) -> f64 {
    if a.len() < self.min_tokens || b.len() < self.min_tokens {
      return 0.0;
    }
    a.jaccard(b)
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_folds_case_and_whitespace() {
    assert_eq!(normalize("  Hello   WORLD \t\n"), "hello world");
    assert_eq!(normalize(""), "");
  }

  #[test]
  fn fingerprint_matches_after_normalization() {
    assert_eq!(fingerprint("hello"), fingerprint("HELLO"));
    assert_eq!(fingerprint("hello  world"), fingerprint(" Hello World "));
    assert_ne!(fingerprint("hello"), fingerprint("hello world"));
  }

  #[test]
  fn tokenize_drops_punctuation_and_duplicates() {
    let tokens = TokenSet::from_text("The cat, the CAT; sat!");
    assert_eq!(tokens.encode(), "cat sat the");
  }

  #[test]
  fn token_set_round_trips_through_encoding() {
    let tokens = TokenSet::from_text("one two three");
    assert_eq!(TokenSet::decode(&tokens.encode()), tokens);
  }

  #[test]
  fn jaccard_scores() {
    // Scenario from the corpus docs: 5 shared of 6 total ≈ 0.833.
    let a = TokenSet::from_text("the cat sat on mat");
    let b = TokenSet::from_text("the cat sat on mat slowly");
    let score = a.jaccard(&b);
    assert!((score - 5.0 / 6.0).abs() < 1e-9);

    assert_eq!(TokenSet::default().jaccard(&TokenSet::default()), 0.0);
    assert_eq!(a.jaccard(&a), 1.0);
  }

  #[test]
  fn min_doc_size_discards_short_documents() {
    let short = TokenSet::from_text("gm @somebody");
    let long = TokenSet::from_text("gm somebody good morning everyone here");
    let sim = MinDocSize::new(5);
    assert_eq!(sim.score(&short, &long), 0.0);
    assert!(sim.score(&long, &long) == 1.0);
  }
}
