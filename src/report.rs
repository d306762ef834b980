use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::blocks::block_timestamp;
use crate::cache::{BlockStatus, CacheError, CacheStore, Granularity, GroupDetail};
use crate::normalize::{sanitize_speech, NO_INFO_TEXT};

pub const NO_DAILY_SUMMARY_TEXT: &str = "No daily summary available.";

/// One rendered time block, shaped for a thin HTTP layer to serve verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct BlockItem {
    /// RFC-3339 start of the block.
    pub block: String,
    pub text: String,
    pub score: f64,
    pub events_count: usize,
    pub events_detail: Vec<GroupDetail>,
    pub is_current: bool,
}

/// Everything the serving layer needs for one date document.
#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub day: String,
    pub granularity: String,
    pub daily_summary: String,
    pub daily_score: f64,
    pub items: Vec<BlockItem>,
}

/// One rendered standing report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub key: String,
    pub text: String,
    pub score: f64,
    pub updated_at: DateTime<Utc>,
}

/// Assemble the per-date view: blocks sorted by key, sanitized text, the
/// `is_current` flag derived from block status, and the rollup fields with
/// fixed fallbacks when absent.
pub fn day_report(
    cache: &CacheStore,
    day: &str,
    granularity: Granularity,
) -> Result<DayReport, CacheError> {
    let blocks = cache.read_day_blocks(day, granularity)?;
    let items = blocks
        .into_iter()
        .map(|b| BlockItem {
            block: block_timestamp(day, &b.block_key),
            text: sanitize_speech(&b.text),
            score: b.score,
            events_count: b.events_count,
            events_detail: b.events_detail,
            is_current: b.status == BlockStatus::Active,
        })
        .collect();
    let rollup = cache.read_rollup(day)?;
    let (daily_summary, daily_score) = match rollup {
        Some(r) => (r.summary, r.score),
        None => (NO_DAILY_SUMMARY_TEXT.to_string(), 0.0),
    };
    Ok(DayReport {
        day: day.to_string(),
        granularity: granularity.as_str().to_string(),
        daily_summary,
        daily_score,
        items,
    })
}

/// Point view of one standing report key, sanitized for speech clients.
pub fn report_view(cache: &CacheStore, key: &str) -> Result<Option<ReportView>, CacheError> {
    let entry = cache.read_report(key)?;
    Ok(entry.map(|e| ReportView {
        key: e.key,
        text: if e.text.is_empty() {
            NO_INFO_TEXT.to_string()
        } else {
            sanitize_speech(&e.text)
        },
        score: e.score,
        updated_at: e.updated_at,
    }))
}
