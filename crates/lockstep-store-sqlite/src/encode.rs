//! Encoding helpers between Rust domain types and SQLite column values.

use lockstep_core::NormalizedMessage;
use lockstep_core::store::ResolveOutcome;
use lockstep_core::text::{TokenSet, fingerprint};

/// Status value marking a successful resolution; anything else is a
/// failure reason.
pub const STATUS_OK: &str = "ok";

// ─── Fingerprint ─────────────────────────────────────────────────────────────

// SQLite integers are signed 64-bit; the fingerprint is stored bit-for-bit.

pub fn encode_fingerprint(fp: u64) -> i64 {
  fp as i64
}

pub fn decode_fingerprint(raw: i64) -> u64 {
  raw as u64
}

// ─── Message rows ────────────────────────────────────────────────────────────

/// A validated row with its derived text columns, ready for insertion.
///
/// Reposts carry the original's text and are excluded from every
/// text-keyed network, so their derived columns stay at the sentinels.
pub struct PreparedRow {
  pub message_id:  String,
  pub user_id:     String,
  pub username:    String,
  pub repost_id:   Option<String>,
  pub reply_id:    Option<String>,
  pub message:     String,
  pub fingerprint: i64,
  pub token_set:   String,
  pub timestamp:   f64,
  pub urls:        Vec<String>,
}

impl PreparedRow {
  pub fn derive(row: NormalizedMessage) -> Self {
    let (fp, tokens) = if row.repost_id.is_some() {
      (0, String::new())
    } else {
      (
        encode_fingerprint(fingerprint(&row.message)),
        TokenSet::from_text(&row.message).encode(),
      )
    };

    Self {
      message_id:  row.message_id,
      user_id:     row.user_id,
      username:    row.username,
      repost_id:   row.repost_id,
      reply_id:    row.reply_id,
      message:     row.message,
      fingerprint: fp,
      token_set:   tokens,
      timestamp:   row.timestamp,
      urls:        row.urls,
    }
  }
}

// ─── Resolution outcomes ─────────────────────────────────────────────────────

/// Column triple `(resolved_url, status, retryable)` for a resolution row.
pub fn encode_outcome(
  outcome: &ResolveOutcome,
) -> (Option<&str>, &str, bool) {
  match outcome {
    ResolveOutcome::Resolved(target) => (Some(target), STATUS_OK, false),
    ResolveOutcome::TransientFailure(reason) => (None, reason, true),
    ResolveOutcome::PermanentFailure(reason) => (None, reason, false),
  }
}
