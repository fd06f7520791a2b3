//! Error type for `lockstep-export`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error("csv error: {0}")]
  Csv(#[from] csv::Error),

  #[error("xml error: {0}")]
  Xml(#[from] quick_xml::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
