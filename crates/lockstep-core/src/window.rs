//! The sliding-window pass over one key group.
//!
//! Events arrive sorted by `(timestamp, message_id)`; a deque keeps the
//! events still within `window` seconds of the current one. Each admitted
//! pair is recorded in both ordered directions, so co-occurrence counts are
//! symmetric by construction and a user pairing with themself contributes 2
//! to their self-loop.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::Cancelled;
use crate::network::EdgeCounts;
use crate::store::JoinEvent;
use crate::text::{Similarity, TokenSet};

/// How a candidate pair inside the window qualifies as an edge.
#[derive(Clone)]
pub enum PairPolicy {
  /// Membership in the key group is the whole test (equality kinds and
  /// co-post).
  KeyEquality,
  /// Re-score the pair's token sets; only pairs at or above `theta` count.
  Threshold {
    similarity: Arc<dyn Similarity>,
    theta:      f64,
  },
}

impl PairPolicy {
  fn accepts(&self, a: &JoinEvent, b: &JoinEvent) -> bool {
    match self {
      Self::KeyEquality => true,
      Self::Threshold { similarity, theta } => {
        static EMPTY: TokenSet = TokenSet::empty();
        let ta = a.tokens.as_ref().unwrap_or(&EMPTY);
        let tb = b.tokens.as_ref().unwrap_or(&EMPTY);
        similarity.score(ta, tb) >= *theta
      }
    }
  }
}

/// Single pass over one sorted group: evict events older than `t − window`,
/// then pair the arrival with every survivor the policy admits.
///
/// The window test is inclusive — `|Δt| ≤ window` — so `window == 0` still
/// matches exactly-simultaneous events. O(|group| + matches).
pub fn emit_group(
  events: &[JoinEvent],
  window: f64,
  policy: &PairPolicy,
  counts: &mut EdgeCounts,
  cancel: &CancelToken,
) -> Result<(), Cancelled> {
  let mut live: VecDeque<usize> = VecDeque::new();

  for (i, event) in events.iter().enumerate() {
    if cancel.is_cancelled() {
      return Err(Cancelled);
    }

    let horizon = event.timestamp - window;
    while let Some(&front) = live.front() {
      if events[front].timestamp < horizon {
        live.pop_front();
      } else {
        break;
      }
    }

    for &j in &live {
      let earlier = &events[j];
      if policy.accepts(earlier, event) {
        counts.record_pair(&earlier.user_id, &event.user_id);
      }
    }

    live.push_back(i);
  }

  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
