//! CSV reader for the normalized row schema.
//!
//! Expected columns, after a header row:
//!
//! ```text
//! message_id, user_id, username, repost_id, reply_id, message, timestamp, urls
//! ```
//!
//! Empty strings in `repost_id`/`reply_id` decode to null; `urls` is a
//! space-delimited list.

use std::io::Read;

use lockstep_core::NormalizedMessage;

use crate::{ParseOutcome, Result};

const EXPECTED_FIELDS: usize = 8;

pub fn parse_csv<R: Read>(reader: R) -> Result<ParseOutcome> {
  let mut csv_reader = csv::ReaderBuilder::new()
    .has_headers(true)
    .flexible(true)
    .from_reader(reader);

  let mut outcome = ParseOutcome::default();

  for (i, record) in csv_reader.records().enumerate() {
    // 1-based, counting the header row the way an editor would.
    let record_no = i + 2;

    let record = match record {
      Ok(r) => r,
      Err(e) => {
        outcome.skip(record_no, e.to_string());
        continue;
      }
    };

    if record.len() != EXPECTED_FIELDS {
      outcome.skip(
        record_no,
        format!("expected {EXPECTED_FIELDS} fields, got {}", record.len()),
      );
      continue;
    }

    let timestamp: f64 = match record[6].trim().parse() {
      Ok(t) => t,
      Err(_) => {
        outcome.skip(record_no, format!("bad timestamp {:?}", &record[6]));
        continue;
      }
    };

    outcome.rows.push(NormalizedMessage {
      message_id: record[0].to_owned(),
      user_id:    record[1].to_owned(),
      username:   record[2].to_owned(),
      repost_id:  optional(&record[3]),
      reply_id:   optional(&record[4]),
      message:    record[5].to_owned(),
      timestamp,
      urls:       record[7].split_whitespace().map(str::to_owned).collect(),
    });
  }

  Ok(outcome)
}

fn optional(field: &str) -> Option<String> {
  if field.is_empty() {
    None
  } else {
    Some(field.to_owned())
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
