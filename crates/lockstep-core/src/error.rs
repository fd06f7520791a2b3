//! Error types for `lockstep-core`.

use thiserror::Error;

/// Reasons a normalized row can violate the corpus invariants.
///
/// Rejections are surfaced at ingest as part of the
/// [`IngestOutcome`](crate::store::IngestOutcome), never mid-join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowViolation {
  #[error("message_id is empty")]
  EmptyMessageId,

  #[error("user_id is empty")]
  EmptyUserId,

  #[error("timestamp is not finite")]
  NonFiniteTimestamp,

  #[error("both repost_id and reply_id are set")]
  RepostAndReply,
}

/// A compute run was cancelled through its [`CancelToken`](crate::CancelToken).
///
/// Partial results are discarded; any previously materialized network table
/// is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("computation cancelled")]
pub struct Cancelled;

/// Errors from the temporal join engine, generic over the backing store.
#[derive(Debug, Error)]
pub enum EngineError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  #[error("computation cancelled")]
  Cancelled(#[from] Cancelled),

  #[error("store error: {0}")]
  Store(#[source] E),

  /// A join worker thread died. First error cancels the siblings; nothing
  /// has been written.
  #[error("join worker panicked")]
  WorkerPanic,
}
