use chrono::{DateTime, NaiveTime, TimeZone, Timelike, Utc};
use serde_json::Value;

use crate::cache::{BlockEntry, Granularity, GroupDetail};
use crate::grouping::Group;

pub fn minutes_since_midnight(now: DateTime<Utc>) -> u32 {
    now.hour() * 60 + now.minute()
}

/// Start minute of the bucket containing `now` for a given width:
/// `floor(minutes_since_midnight / width) * width`.
pub fn bucket_start_minute(now: DateTime<Utc>, width_minutes: u32) -> u32 {
    let width = width_minutes.max(1);
    (minutes_since_midnight(now) / width) * width
}

/// The instant the current bucket started, in UTC.
pub fn block_start(now: DateTime<Utc>, width_minutes: u32) -> DateTime<Utc> {
    let start = bucket_start_minute(now, width_minutes);
    let time = NaiveTime::from_hms_opt(start / 60, start % 60, 0)
        .unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&now.date_naive().and_time(time))
}

/// Derived block key for `now`. Pure in current time and width: the same
/// instant always maps to the same key for a given width. Coarse keys render
/// the hour (`"09"`), detailed keys the start minute too (`"09:45"`).
pub fn block_key(now: DateTime<Utc>, width_minutes: u32, granularity: Granularity) -> String {
    let start = bucket_start_minute(now, width_minutes);
    match granularity {
        Granularity::Coarse => format!("{:02}", start / 60),
        Granularity::Detailed => format!("{:02}:{:02}", start / 60, start % 60),
    }
}

/// Calendar day (UTC) a block document belongs to.
pub fn day_string(now: DateTime<Utc>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

/// RFC-3339 block start for the serving layer, reconstructed from the key.
pub fn block_timestamp(day: &str, block_key: &str) -> String {
    if block_key.len() == 5 {
        format!("{day}T{block_key}:00+00:00")
    } else {
        format!("{day}T{block_key}:00:00+00:00")
    }
}

/// Per-group detail rows kept alongside a block payload.
pub fn group_details(groups: &[Group]) -> Vec<GroupDetail> {
    groups
        .iter()
        .map(|g| GroupDetail {
            sample: g.sample.clone(),
            count: g.count,
            last_seen: g.last_seen,
        })
        .collect()
}

/// The serialized form of a grouped batch, shared by the staleness gate and
/// the summarizer submission.
pub fn groups_payload(groups: &[Group]) -> Value {
    serde_json::to_value(groups).unwrap_or_else(|_| Value::Array(Vec::new()))
}

/// Concatenated block texts for the daily rollup input.
pub fn concat_block_texts(blocks: &[BlockEntry]) -> String {
    blocks
        .iter()
        .filter(|b| !b.text.is_empty())
        .map(|b| format!("[{}] {}", b.block_key, b.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fallback daily score when the rollup call does not judge one.
pub fn average_score(blocks: &[BlockEntry]) -> f64 {
    if blocks.is_empty() {
        return 0.0;
    }
    blocks.iter().map(|b| b.score).sum::<f64>() / blocks.len() as f64
}
