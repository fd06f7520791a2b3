//! [`SqliteStore`] — the SQLite implementation of
//! [`MessageStore`](lockstep_core::store::MessageStore).

use std::path::Path;

use lockstep_core::NormalizedMessage;
use lockstep_core::network::{Edge, NetworkKind};
use lockstep_core::store::{
  IngestOutcome, JoinEvent, MessageStore, RejectedRow, UrlResolution,
  UserSnapshot,
};
use lockstep_core::text::TokenSet;
use rusqlite::OptionalExtension as _;
use rusqlite::params;
use tracing::debug;

use crate::encode::{
  PreparedRow, STATUS_OK, decode_fingerprint, encode_outcome,
};
use crate::schema::{SCHEMA, SCHEMA_VERSION, network_table_ddl};
use crate::{Error, Result};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Lockstep corpus backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a corpus at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory corpus — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let version: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
      })
      .await?;

    if version > SCHEMA_VERSION {
      return Err(Error::UnsupportedSchema(version));
    }

    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── MessageStore impl ───────────────────────────────────────────────────────

impl MessageStore for SqliteStore {
  type Error = Error;

  // ── Ingest ────────────────────────────────────────────────────────────

  async fn insert_messages(
    &self,
    rows: Vec<NormalizedMessage>,
  ) -> Result<IngestOutcome> {
    // Validate and derive the text columns before touching the database.
    let mut rejected = Vec::new();
    let mut prepared = Vec::with_capacity(rows.len());
    for row in rows {
      match row.validate() {
        Ok(()) => prepared.push(PreparedRow::derive(row)),
        Err(reason) => rejected.push(RejectedRow {
          message_id: row.message_id,
          reason,
        }),
      }
    }

    let (inserted, duplicates) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0u64;
        let mut duplicates = 0u64;
        {
          let mut insert_message = tx.prepare_cached(
            "INSERT OR IGNORE INTO message (
               message_id, user_id, username, repost_id, reply_id,
               message, fingerprint, token_set, timestamp
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          )?;
          let mut insert_url = tx.prepare_cached(
            "INSERT OR IGNORE INTO message_url
               (message_id, url, user_id, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
          )?;

          for row in &prepared {
            let changed = insert_message.execute(params![
              row.message_id,
              row.user_id,
              row.username,
              row.repost_id,
              row.reply_id,
              row.message,
              row.fingerprint,
              row.token_set,
              row.timestamp,
            ])?;
            if changed == 0 {
              duplicates += 1;
              continue;
            }
            inserted += 1;

            // URLs shared in reposts are never co-link candidates.
            if row.repost_id.is_none() {
              for url in &row.urls {
                insert_url.execute(params![
                  row.message_id,
                  url,
                  row.user_id,
                  row.timestamp,
                ])?;
              }
            }
          }
        }
        tx.commit()?;
        Ok((inserted, duplicates))
      })
      .await?;

    debug!(inserted, duplicates, rejected = rejected.len(), "ingest batch");
    Ok(IngestOutcome { inserted, duplicates, rejected })
  }

  async fn message_count(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM message", [], |row| {
          row.get(0)
        })?)
      })
      .await?;
    Ok(count as u64)
  }

  // ── Join scans ────────────────────────────────────────────────────────

  async fn join_events(
    &self,
    kind: NetworkKind,
    resolved_links: bool,
  ) -> Result<Vec<JoinEvent>> {
    let events = self
      .conn
      .call(move |conn| {
        let events = match kind {
          NetworkKind::CoRetweet => keyed_scan(
            conn,
            "SELECT message_id, user_id, timestamp, repost_id
             FROM message
             WHERE repost_id IS NOT NULL
             ORDER BY repost_id, timestamp, message_id",
          )?,
          NetworkKind::CoReply => keyed_scan(
            conn,
            "SELECT message_id, user_id, timestamp, reply_id
             FROM message
             WHERE repost_id IS NULL AND reply_id IS NOT NULL
             ORDER BY reply_id, timestamp, message_id",
          )?,
          NetworkKind::CoTweet => fingerprint_scan(conn)?,
          NetworkKind::CoLink => {
            if resolved_links {
              keyed_scan(
                conn,
                "SELECT mu.message_id, mu.user_id, mu.timestamp,
                        COALESCE(r.resolved_url, mu.url) AS action_key
                 FROM message_url mu
                 LEFT JOIN resolved_url r
                   ON r.url = mu.url AND r.status = 'ok'
                 ORDER BY action_key, mu.timestamp, mu.message_id",
              )?
            } else {
              keyed_scan(
                conn,
                "SELECT message_id, user_id, timestamp, url
                 FROM message_url
                 ORDER BY url, timestamp, message_id",
              )?
            }
          }
          NetworkKind::CoPost => keyless_scan(conn, false)?,
          NetworkKind::CoSimilarTweet => keyless_scan(conn, true)?,
        };
        Ok(events)
      })
      .await?;
    Ok(events)
  }

  // ── Network tables ────────────────────────────────────────────────────

  async fn write_network(
    &self,
    kind: NetworkKind,
    edges: Vec<Edge>,
    min_weight: u64,
  ) -> Result<u64> {
    let table = kind.table();
    let written = self
      .conn
      .call(move |conn| {
        let scratch = format!("{table}_scratch");
        let tx = conn.transaction()?;
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {scratch}"))?;
        tx.execute_batch(&network_table_ddl(&scratch))?;

        let mut written = 0u64;
        {
          let mut insert = tx.prepare(&format!(
            "INSERT INTO {scratch} (user_a, user_b, weight)
             VALUES (?1, ?2, ?3)"
          ))?;
          for edge in &edges {
            if edge.weight < min_weight {
              continue;
            }
            insert.execute(params![
              edge.user_a,
              edge.user_b,
              edge.weight as i64
            ])?;
            written += 1;
          }
        }

        // The swap is what makes replacement atomic: an aborted compute
        // never touches the previously materialized table.
        tx.execute_batch(&format!(
          "DROP TABLE IF EXISTS {table};
           ALTER TABLE {scratch} RENAME TO {table};"
        ))?;
        tx.commit()?;
        Ok(written)
      })
      .await?;
    Ok(written)
  }

  async fn network_edges(&self, kind: NetworkKind) -> Result<Vec<Edge>> {
    let table = kind.table();
    let edges: Option<Vec<Edge>> = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(None);
        }

        let mut stmt = conn.prepare(&format!(
          "SELECT user_a, user_b, weight FROM {table}
           ORDER BY user_a, user_b"
        ))?;
        let edges = stmt
          .query_map([], |row| {
            Ok(Edge {
              user_a: row.get(0)?,
              user_b: row.get(1)?,
              weight: row.get::<_, i64>(2)? as u64,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(edges))
      })
      .await?;

    edges.ok_or(Error::NetworkNotComputed(kind.name()))
  }

  // ── URL resolutions ───────────────────────────────────────────────────

  async fn unresolved_urls(&self) -> Result<Vec<String>> {
    let urls = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT mu.url
           FROM message_url mu
           LEFT JOIN resolved_url r ON r.url = mu.url
           WHERE r.url IS NULL
           ORDER BY mu.url",
        )?;
        let urls = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(urls)
      })
      .await?;
    Ok(urls)
  }

  async fn record_resolutions(
    &self,
    rows: Vec<UrlResolution>,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut insert = tx.prepare_cached(
            "INSERT OR IGNORE INTO resolved_url
               (url, resolved_url, status, retryable)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for row in &rows {
            let (resolved, status, retryable) = encode_outcome(&row.outcome);
            insert.execute(params![row.url, resolved, status, retryable])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn clear_failed_resolutions(&self) -> Result<u64> {
    let cleared = self
      .conn
      .call(|conn| {
        let cleared = conn.execute(
          "DELETE FROM resolved_url WHERE status != ?1",
          params![STATUS_OK],
        )?;
        Ok(cleared as u64)
      })
      .await?;
    Ok(cleared)
  }

  // ── Export reads ──────────────────────────────────────────────────────

  async fn user_snapshots(
    &self,
    n_messages: usize,
  ) -> Result<Vec<UserSnapshot>> {
    let limit = n_messages as i64;
    let snapshots = self
      .conn
      .call(move |conn| {
        let mut users_stmt = conn.prepare(
          "SELECT user_id, MAX(username)
           FROM message
           GROUP BY user_id
           ORDER BY user_id",
        )?;
        let users = users_stmt
          .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut latest_stmt = conn.prepare(
          "SELECT message
           FROM message
           WHERE user_id = ?1
           ORDER BY timestamp DESC, message_id DESC
           LIMIT ?2",
        )?;

        let mut snapshots = Vec::with_capacity(users.len());
        for (user_id, username) in users {
          let messages = latest_stmt
            .query_map(params![user_id, limit], |row| {
              row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          snapshots.push(UserSnapshot { user_id, username, messages });
        }
        Ok(snapshots)
      })
      .await?;
    Ok(snapshots)
  }
}

// ─── Scan helpers ────────────────────────────────────────────────────────────

/// Run a 4-column `(message_id, user_id, timestamp, key)` scan.
fn keyed_scan(
  conn: &rusqlite::Connection,
  sql: &str,
) -> rusqlite::Result<Vec<JoinEvent>> {
  let mut stmt = conn.prepare(sql)?;
  let events = stmt
    .query_map([], |row| {
      Ok(JoinEvent {
        message_id: row.get(0)?,
        user_id:    row.get(1)?,
        timestamp:  row.get(2)?,
        key:        row.get(3)?,
        tokens:     None,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(events)
}

/// Non-repost scan keyed by the stored text fingerprint.
fn fingerprint_scan(
  conn: &rusqlite::Connection,
) -> rusqlite::Result<Vec<JoinEvent>> {
  let mut stmt = conn.prepare(
    "SELECT message_id, user_id, timestamp, fingerprint
     FROM message
     WHERE repost_id IS NULL
     ORDER BY fingerprint, timestamp, message_id",
  )?;
  let events = stmt
    .query_map([], |row| {
      Ok(JoinEvent {
        message_id: row.get(0)?,
        user_id:    row.get(1)?,
        timestamp:  row.get(2)?,
        key:        decode_fingerprint(row.get(3)?).to_string(),
        tokens:     None,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(events)
}

/// Keyless non-repost scan ordered by time, optionally carrying token sets
/// (co-post without, co-similar-tweet with).
fn keyless_scan(
  conn: &rusqlite::Connection,
  with_tokens: bool,
) -> rusqlite::Result<Vec<JoinEvent>> {
  let mut stmt = conn.prepare(
    "SELECT message_id, user_id, timestamp, token_set
     FROM message
     WHERE repost_id IS NULL
     ORDER BY timestamp, message_id",
  )?;
  let events = stmt
    .query_map([], |row| {
      Ok(JoinEvent {
        message_id: row.get(0)?,
        user_id:    row.get(1)?,
        timestamp:  row.get(2)?,
        key:        String::new(),
        tokens:     if with_tokens {
          Some(TokenSet::decode(&row.get::<_, String>(3)?))
        } else {
          None
        },
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(events)
}
