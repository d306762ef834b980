use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One cached report: last-writer-wins, upsert semantics, no deletion path.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub text: String,
    pub score: f64,
    pub digest: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Coarse,
    Detailed,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Coarse => "coarse",
            Granularity::Detailed => "detailed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    Active,
    Historical,
}

impl BlockStatus {
    fn as_str(&self) -> &'static str {
        match self {
            BlockStatus::Active => "active",
            BlockStatus::Historical => "historical",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "active" {
            BlockStatus::Active
        } else {
            BlockStatus::Historical
        }
    }
}

/// Per-group detail kept alongside a block so the serving layer can render
/// what the summary was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDetail {
    pub sample: String,
    pub count: usize,
    pub last_seen: DateTime<Utc>,
}

/// One time block of a date document.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntry {
    pub block_key: String,
    pub text: String,
    pub score: f64,
    pub events_count: usize,
    pub events_detail: Vec<GroupDetail>,
    pub digest: String,
    pub status: BlockStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayRollup {
    pub summary: String,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Keyed upsert / point-read cache over a single SQLite connection. The
/// original's nested per-date block mapping is flattened to one row per
/// `(date, granularity, block_key)`, so writing a block is naturally a
/// partial update that leaves the date's other blocks untouched.
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(&conn)?;
        Ok(CacheStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(CacheStore { conn })
    }

    fn init(conn: &Connection) -> Result<(), CacheError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS report_cache (
              key         TEXT PRIMARY KEY,
              text        TEXT NOT NULL,
              score       REAL NOT NULL DEFAULT 0,
              digest      TEXT NOT NULL,
              updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS day_blocks (
              date          TEXT NOT NULL,   -- YYYY-MM-DD (UTC)
              granularity   TEXT NOT NULL,   -- coarse | detailed
              block_key     TEXT NOT NULL,   -- "HH" or "HH:MM"
              text          TEXT NOT NULL,
              score         REAL NOT NULL DEFAULT 0,
              events_count  INTEGER NOT NULL DEFAULT 0,
              events_detail TEXT NOT NULL DEFAULT '[]',
              digest        TEXT NOT NULL,
              status        TEXT NOT NULL,
              updated_at    TEXT NOT NULL,
              PRIMARY KEY (date, granularity, block_key)
            );

            CREATE TABLE IF NOT EXISTS day_rollups (
              date        TEXT PRIMARY KEY,
              summary     TEXT NOT NULL,
              score       REAL NOT NULL DEFAULT 0,
              updated_at  TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn read_report(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = self
            .conn
            .query_row(
                "SELECT key, text, score, digest, updated_at FROM report_cache WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(key, text, score, digest, updated_at)| CacheEntry {
            key,
            text,
            score,
            digest,
            updated_at: parse_rfc3339(&updated_at),
        }))
    }

    pub fn upsert_report(
        &self,
        key: &str,
        text: &str,
        score: f64,
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.conn.execute(
            r#"
            INSERT INTO report_cache(key, text, score, digest, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(key) DO UPDATE SET
              text       = excluded.text,
              score      = excluded.score,
              digest     = excluded.digest,
              updated_at = excluded.updated_at
            "#,
            (key, text, score, digest, now.to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn read_block(
        &self,
        date: &str,
        granularity: Granularity,
        block_key: &str,
    ) -> Result<Option<BlockEntry>, CacheError> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT block_key, text, score, events_count, events_detail,
                       digest, status, updated_at
                FROM day_blocks
                WHERE date = ?1 AND granularity = ?2 AND block_key = ?3
                "#,
                (date, granularity.as_str(), block_key),
                Self::block_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Upsert one block under its date. Always writes status=active; pair
    /// with `demote_other_blocks` so only the newest block renders current.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_block(
        &self,
        date: &str,
        granularity: Granularity,
        block_key: &str,
        text: &str,
        score: f64,
        events_count: usize,
        events_detail: &[GroupDetail],
        digest: &str,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let detail_json =
            serde_json::to_string(events_detail).unwrap_or_else(|_| "[]".to_string());
        self.conn.execute(
            r#"
            INSERT INTO day_blocks(date, granularity, block_key, text, score,
                                   events_count, events_detail, digest, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active', ?9)
            ON CONFLICT(date, granularity, block_key) DO UPDATE SET
              text          = excluded.text,
              score         = excluded.score,
              events_count  = excluded.events_count,
              events_detail = excluded.events_detail,
              digest        = excluded.digest,
              status        = 'active',
              updated_at    = excluded.updated_at
            "#,
            (
                date,
                granularity.as_str(),
                block_key,
                text,
                score,
                events_count as i64,
                detail_json,
                digest,
                now.to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    /// Flip every other active block of this date+granularity to historical.
    pub fn demote_other_blocks(
        &self,
        date: &str,
        granularity: Granularity,
        current_key: &str,
    ) -> Result<(), CacheError> {
        self.conn.execute(
            r#"
            UPDATE day_blocks SET status = 'historical'
            WHERE date = ?1 AND granularity = ?2 AND block_key != ?3 AND status = 'active'
            "#,
            (date, granularity.as_str(), current_key),
        )?;
        Ok(())
    }

    /// All blocks of one date+granularity, ordered by block key.
    pub fn read_day_blocks(
        &self,
        date: &str,
        granularity: Granularity,
    ) -> Result<Vec<BlockEntry>, CacheError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT block_key, text, score, events_count, events_detail,
                   digest, status, updated_at
            FROM day_blocks
            WHERE date = ?1 AND granularity = ?2
            ORDER BY block_key ASC
            "#,
        )?;
        let rows = stmt.query_map((date, granularity.as_str()), Self::block_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn upsert_rollup(
        &self,
        date: &str,
        summary: &str,
        score: f64,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        self.conn.execute(
            r#"
            INSERT INTO day_rollups(date, summary, score, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(date) DO UPDATE SET
              summary    = excluded.summary,
              score      = excluded.score,
              updated_at = excluded.updated_at
            "#,
            (date, summary, score, now.to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn read_rollup(&self, date: &str) -> Result<Option<DayRollup>, CacheError> {
        let row = self
            .conn
            .query_row(
                "SELECT summary, score, updated_at FROM day_rollups WHERE date = ?1",
                [date],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(summary, score, updated_at)| DayRollup {
            summary,
            score,
            updated_at: parse_rfc3339(&updated_at),
        }))
    }

    fn block_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockEntry> {
        let detail_raw: String = row.get(4)?;
        let status_raw: String = row.get(6)?;
        let updated_raw: String = row.get(7)?;
        Ok(BlockEntry {
            block_key: row.get(0)?,
            text: row.get(1)?,
            score: row.get(2)?,
            events_count: row.get::<_, i64>(3)? as usize,
            // A detail column this adapter did not write parses to empty
            // rather than failing the read.
            events_detail: serde_json::from_str(&detail_raw).unwrap_or_default(),
            digest: row.get(5)?,
            status: BlockStatus::parse(&status_raw),
            updated_at: parse_rfc3339(&updated_raw),
        })
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
