//! The normalized message row — the single unit every ingest adapter
//! produces and the store persists.
//!
//! Messages are immutable once ingested. Deduplication by `message_id`
//! happens in the store; validation of the corpus invariants happens here.

use serde::{Deserialize, Serialize};

use crate::error::RowViolation;

// ─── Classification ──────────────────────────────────────────────────────────

/// What a message is, derived from its reference fields.
///
/// Exactly one classification holds per valid row: reposts are excluded from
/// every network except co-retweet, replies drive co-reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
  /// Verbatim re-publication of another message (`repost_id` set).
  Repost,
  /// Reply to another message (`reply_id` set, `repost_id` unset).
  Reply,
  /// Neither a repost nor a reply.
  Original,
}

// ─── NormalizedMessage ───────────────────────────────────────────────────────

/// A platform message in the normalized ingest schema.
///
/// `timestamp` is double-precision seconds since a fixed epoch; the absolute
/// origin is irrelevant but must be consistent across the corpus. For
/// reposts, `message` carries the original's text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
  pub message_id: String,
  pub user_id:    String,
  /// Display only; may vary across a user's messages.
  pub username:   String,
  pub repost_id:  Option<String>,
  pub reply_id:   Option<String>,
  pub message:    String,
  pub timestamp:  f64,
  /// URLs carried by the message; whitespace-delimited on raw input.
  pub urls:       Vec<String>,
}

impl NormalizedMessage {
  /// Check the §3 corpus invariants. Called by the store before insertion;
  /// violating rows are rejected and counted, not inserted.
  pub fn validate(&self) -> Result<(), RowViolation> {
    if self.message_id.is_empty() {
      return Err(RowViolation::EmptyMessageId);
    }
    if self.user_id.is_empty() {
      return Err(RowViolation::EmptyUserId);
    }
    if !self.timestamp.is_finite() {
      return Err(RowViolation::NonFiniteTimestamp);
    }
    if self.repost_id.is_some() && self.reply_id.is_some() {
      return Err(RowViolation::RepostAndReply);
    }
    Ok(())
  }

  /// Classification of a (valid) row.
  pub fn kind(&self) -> MessageKind {
    if self.repost_id.is_some() {
      MessageKind::Repost
    } else if self.reply_id.is_some() {
      MessageKind::Reply
    } else {
      MessageKind::Original
    }
  }

  pub fn is_repost(&self) -> bool {
    self.repost_id.is_some()
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
