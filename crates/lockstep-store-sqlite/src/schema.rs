//! SQL schema for the Lockstep corpus store.
//!
//! Applied once at open via `PRAGMA user_version`. Network tables are not
//! part of the base schema — each `{name}_network` table is created (and
//! atomically replaced) by `write_network`.

/// Schema version stamped into `PRAGMA user_version`. Opening a corpus with
/// a higher version fails; the data must be reprocessed.
pub const SCHEMA_VERSION: i64 = 1;

/// Full base-schema DDL; idempotent thanks to `CREATE … IF NOT EXISTS`.
///
/// The partial indexes mirror the join dimensions: each network kind scans
/// its events grouped by action key and ordered by `(timestamp,
/// message_id)`, so every index leads with the key and ends with the sort
/// columns.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

-- Messages are immutable once ingested. Dedup by message_id: the first
-- occurrence wins, later inserts are ignored.
CREATE TABLE IF NOT EXISTS message (
    message_id  TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL,
    username    TEXT NOT NULL,   -- display only; may vary per message
    repost_id   TEXT,
    reply_id    TEXT,
    message     TEXT NOT NULL,
    fingerprint INTEGER NOT NULL, -- hash of normalized text; 0 for reposts
    token_set   TEXT NOT NULL,    -- sorted space-joined tokens; '' for reposts
    timestamp   REAL NOT NULL
);

-- One row per (message, url), non-repost messages only.
CREATE TABLE IF NOT EXISTS message_url (
    message_id  TEXT NOT NULL REFERENCES message(message_id),
    url         TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    timestamp   REAL NOT NULL,
    PRIMARY KEY (message_id, url)
);

-- Append-only resolution results; a row here, success or failure, means
-- the URL is never attempted again.
CREATE TABLE IF NOT EXISTS resolved_url (
    url          TEXT PRIMARY KEY,
    resolved_url TEXT,              -- NULL when resolution failed
    status       TEXT NOT NULL,     -- 'ok' or the failure reason
    retryable    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS message_repost_scan
    ON message(repost_id, timestamp, message_id)
    WHERE repost_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS message_reply_scan
    ON message(reply_id, timestamp, message_id)
    WHERE repost_id IS NULL AND reply_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS message_fingerprint_scan
    ON message(fingerprint, timestamp, message_id)
    WHERE repost_id IS NULL;

CREATE INDEX IF NOT EXISTS message_user_time
    ON message(user_id, timestamp);

CREATE INDEX IF NOT EXISTS message_url_scan
    ON message_url(url, timestamp, message_id);

PRAGMA user_version = 1;
";

/// DDL for one network's scratch table; swapped into place on commit.
pub fn network_table_ddl(table: &str) -> String {
  format!(
    "CREATE TABLE {table} (
        user_a TEXT NOT NULL,
        user_b TEXT NOT NULL,
        weight INTEGER NOT NULL,
        PRIMARY KEY (user_a, user_b)
    ) WITHOUT ROWID"
  )
}
