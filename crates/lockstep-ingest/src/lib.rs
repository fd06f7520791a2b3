//! Platform record parsers: raw corpus files in, normalized rows out.
//!
//! Two input formats are supported:
//!
//! - [`RecordFormat::Csv`] — the normalized schema as a headered CSV file.
//! - [`RecordFormat::TwitterJson`] — line-delimited Twitter API output;
//!   v2 response pages are auto-detected per line, anything else is read
//!   as a v1.1 tweet object.
//!
//! Unparseable records are skipped and reported, never fatal here: the
//! caller decides how many skips it tolerates.

mod csv_format;
mod twitter;

pub mod error;

use std::io::BufRead;

use lockstep_core::NormalizedMessage;

pub use error::{Error, Result};

// ─── Format selection ────────────────────────────────────────────────────────

/// Supported raw input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// Headered CSV in the normalized column order.
  Csv,
  /// Line-delimited Twitter JSON (v1.1 tweets or v2 response pages).
  TwitterJson,
}

// ─── Parse outcome ───────────────────────────────────────────────────────────

/// A record skipped during parsing, with enough context to find it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
  /// 1-based line (JSON) or record (CSV) number within the input.
  pub record: usize,
  pub reason: String,
}

/// Everything a parse pass produced: the usable rows plus the skips.
#[derive(Debug, Default)]
pub struct ParseOutcome {
  pub rows:    Vec<NormalizedMessage>,
  pub skipped: Vec<SkippedRecord>,
}

impl ParseOutcome {
  pub(crate) fn skip(&mut self, record: usize, reason: impl Into<String>) {
    self.skipped.push(SkippedRecord { record, reason: reason.into() });
  }
}

/// Parse one input stream in the given format.
pub fn parse_records<R: BufRead>(
  format: RecordFormat,
  reader: R,
) -> Result<ParseOutcome> {
  match format {
    RecordFormat::Csv => csv_format::parse_csv(reader),
    RecordFormat::TwitterJson => twitter::parse_twitter_json(reader),
  }
}
