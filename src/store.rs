use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event has no usable timestamp")]
    MissingTimestamp,
}

/// One event record as handed to the pipeline. The storage row id is
/// dropped before processing; `text` is the first non-empty of the aliased
/// fields `text`, `msg`, `message`.
#[derive(Debug, Clone)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub attrs: serde_json::Map<String, Value>,
}

const TEXT_ALIASES: [&str; 3] = ["text", "msg", "message"];

/// Coerce a stored timestamp value to UTC. Accepts RFC-3339, a handful of
/// naive ISO shapes (read as UTC) and epoch seconds/milliseconds, either as
/// numbers or digit strings.
pub fn coerce_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => coerce_timestamp_str(s),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw >= 1_000_000_000_000 {
                DateTime::<Utc>::from_timestamp(raw / 1000, ((raw % 1000) as u32) * 1_000_000)
            } else {
                DateTime::<Utc>::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

fn coerce_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let fmts = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for f in fmts.iter() {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, f) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        match s.len() {
            10 => return s.parse::<i64>().ok().and_then(|v| DateTime::<Utc>::from_timestamp(v, 0)),
            13 => {
                return s.parse::<i64>().ok().and_then(|v| {
                    DateTime::<Utc>::from_timestamp(v / 1000, ((v % 1000) as u32) * 1_000_000)
                })
            }
            _ => {}
        }
    }
    None
}

fn extract_text(body: &serde_json::Map<String, Value>) -> String {
    for alias in TEXT_ALIASES {
        if let Some(Value::String(s)) = body.get(alias) {
            if !s.is_empty() {
                return s.clone();
            }
        }
    }
    String::new()
}

fn event_from_row(ts_raw: &str, body_raw: &str) -> Option<Event> {
    let body: Value = serde_json::from_str(body_raw).ok()?;
    let obj = body.as_object()?;
    let timestamp = coerce_timestamp_str(ts_raw)
        .or_else(|| obj.get("timestamp").and_then(coerce_timestamp))?;
    let text = extract_text(obj);
    let mut attrs = obj.clone();
    attrs.remove("timestamp");
    for alias in TEXT_ALIASES {
        attrs.remove(alias);
    }
    Some(Event { timestamp, text, attrs })
}

/// Ordered event store over a single SQLite connection (WAL, one writer).
/// Rows whose timestamp cannot be coerced are skipped on read, never fatal.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(&conn)?;
        Ok(EventStore { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(EventStore { conn })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS events (
              id    INTEGER PRIMARY KEY AUTOINCREMENT,
              ts    TEXT NOT NULL,   -- RFC3339 UTC
              body  TEXT NOT NULL    -- raw event JSON
            );

            CREATE INDEX IF NOT EXISTS idx_events_ts ON events(ts);
            "#,
        )?;
        Ok(())
    }

    /// Ingest one raw event. The body must carry a coercible `timestamp`
    /// field; the normalized RFC-3339 form is what range queries order by.
    pub fn append(&self, body: &Value) -> Result<(), StoreError> {
        let ts = body
            .get("timestamp")
            .and_then(coerce_timestamp)
            .ok_or(StoreError::MissingTimestamp)?;
        self.conn.execute(
            "INSERT INTO events(ts, body) VALUES (?1, ?2)",
            (ts.to_rfc3339(), body.to_string()),
        )?;
        Ok(())
    }

    /// All events with timestamp >= cutoff, ascending.
    pub fn read_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Event>, StoreError> {
        self.select(
            "SELECT ts, body FROM events WHERE ts >= ?1 ORDER BY ts ASC",
            [cutoff.to_rfc3339()],
        )
    }

    /// All events with start <= timestamp <= end, ascending.
    pub fn read_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        self.select(
            "SELECT ts, body FROM events WHERE ts >= ?1 AND ts <= ?2 ORDER BY ts ASC",
            [start.to_rfc3339(), end.to_rfc3339()],
        )
    }

    /// The most recent `n` events, returned ascending.
    pub fn read_last(&self, n: usize) -> Result<Vec<Event>, StoreError> {
        let mut out = self.select(
            "SELECT ts, body FROM events ORDER BY ts DESC LIMIT ?1",
            [n as i64],
        )?;
        out.reverse();
        Ok(out)
    }

    fn select<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let ts: String = row.get(0)?;
            let body: String = row.get(1)?;
            Ok((ts, body))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (ts, body) = row?;
            if let Some(evt) = event_from_row(&ts, &body) {
                out.push(evt);
            }
        }
        Ok(out)
    }
}
