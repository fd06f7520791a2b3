//! Error type for `lockstep-ingest`.
//!
//! Only stream-level failures surface here; malformed individual records
//! are collected as [`SkippedRecord`](crate::SkippedRecord)s instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
