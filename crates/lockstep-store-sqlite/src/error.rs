//! Error type for `lockstep-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// The corpus file was written by a newer, incompatible build. The data
  /// needs to be reprocessed into a fresh corpus.
  #[error("corpus schema version {0} is not supported by this build")]
  UnsupportedSchema(i64),

  /// Reading back a network table that no `compute` run has materialized.
  #[error("network {0:?} has not been computed on this corpus")]
  NetworkNotComputed(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
