use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::blocks;
use crate::cache::{CacheError, CacheStore, Granularity};
use crate::config::Config;
use crate::digest::{batch_digest, detect_change, ChangeOutcome, EMPTY_DIGEST};
use crate::grouping::Clusterer;
use crate::store::{EventStore, StoreError};
use crate::summarizer::{GatewayError, Summary, SummaryClient, DAILY_INSTRUCTION};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Standing report kinds refreshed every cycle over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Current,
    Recent,
    Today,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [ReportKind::Current, ReportKind::Recent, ReportKind::Today];

    pub fn key(&self) -> &'static str {
        match self {
            ReportKind::Current => "current",
            ReportKind::Recent => "recent",
            ReportKind::Today => "today",
        }
    }

    pub fn window_minutes(&self) -> i64 {
        match self {
            ReportKind::Current => 5,
            ReportKind::Recent => 180,
            ReportKind::Today => 1440,
        }
    }
}

pub const YESTERDAY_KEY: &str = "yesterday";

/// The context object threaded through a cycle: both store adapters, the
/// summarizer gateway and the configuration, constructed once at startup.
/// No ambient global state.
pub struct Pipeline {
    events: EventStore,
    cache: CacheStore,
    client: SummaryClient,
    clusterer: Clusterer,
    cfg: Config,
}

impl Pipeline {
    /// Open the stores and build the gateway. An unopenable store here is
    /// the one failure that should end the process, so it surfaces
    /// immediately instead of being deferred to the first cycle.
    pub fn new(cfg: Config) -> Result<Self, PipelineError> {
        let events = EventStore::open(&cfg.store.db_path)?;
        let cache = CacheStore::open(&cfg.store.db_path)?;
        let client = SummaryClient::new(cfg.summarizer_settings())?;
        let clusterer = cfg.clusterer();
        Ok(Pipeline { events, cache, client, clusterer, cfg })
    }

    /// Assemble from already-opened parts. Used by tests and tooling that
    /// want in-memory stores.
    pub fn from_parts(
        events: EventStore,
        cache: CacheStore,
        client: SummaryClient,
        cfg: Config,
    ) -> Self {
        let clusterer = cfg.clusterer();
        Pipeline { events, cache, client, clusterer, cfg }
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// One full cycle. Steps run sequentially; whatever writes completed
    /// before an error remain committed (no partial-cycle rollback) and the
    /// error is handled at the scheduler's cycle boundary.
    pub fn run_cycle(&self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        for kind in ReportKind::ALL {
            self.refresh_report(kind, now)?;
        }
        self.refresh_yesterday(now)?;
        self.refresh_block(Granularity::Coarse, self.cfg.blocks.coarse_width_minutes, now)?;
        self.refresh_block(Granularity::Detailed, self.cfg.blocks.detailed_width_minutes, now)?;
        self.refresh_daily_rollup(now)?;
        Ok(())
    }

    fn model_for(&self, kind: ReportKind) -> &str {
        match kind {
            ReportKind::Current => &self.cfg.summarizer.model_current,
            ReportKind::Recent => &self.cfg.summarizer.model_recent,
            ReportKind::Today => &self.cfg.summarizer.model_today,
        }
    }

    /// Staleness-gated refresh of one windowed report kind.
    fn refresh_report(&self, kind: ReportKind, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let cutoff = now - Duration::minutes(kind.window_minutes());
        let events = self.events.read_since(cutoff)?;
        let groups = self.clusterer.cluster(&events);
        let payload = blocks::groups_payload(&groups);
        let prior = self.cache.read_report(kind.key())?;

        match detect_change(prior.as_ref().map(|e| e.digest.as_str()), &payload) {
            ChangeOutcome::Unchanged => {
                debug!("{} unchanged - skipping summarization", kind.key());
                Ok(())
            }
            ChangeOutcome::Changed { digest } => {
                info!(
                    "{} changed - summarizing {} groups from {} events",
                    kind.key(),
                    groups.len(),
                    events.len()
                );
                let summary = self.summarize_or_fallback(kind.key(), || {
                    self.client.summarize_groups(&groups, self.model_for(kind))
                });
                self.cache
                    .upsert_report(kind.key(), &summary.text, summary.score, &digest, now)?;
                Ok(())
            }
        }
    }

    /// The yesterday report is recomputed at most once per UTC day. Its
    /// digest folds in the date so two identical days still differ.
    fn refresh_yesterday(&self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let today = now.date_naive();
        if let Some(prev) = self.cache.read_report(YESTERDAY_KEY)? {
            if prev.updated_at.date_naive() == today {
                debug!("yesterday already computed today - skipping");
                return Ok(());
            }
        }

        let yesterday = today - Duration::days(1);
        let start = yesterday.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let end = yesterday.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc();
        let events = self.events.read_range(start, end)?;
        let groups = self.clusterer.cluster(&events);
        let payload = json!({
            "date": yesterday.format("%Y-%m-%d").to_string(),
            "groups": blocks::groups_payload(&groups),
        });
        let digest = batch_digest(&payload);

        info!(
            "computing yesterday report for {} - {} groups from {} events",
            yesterday, groups.len(), events.len()
        );
        let summary = self.summarize_or_fallback(YESTERDAY_KEY, || {
            self.client
                .summarize_groups(&groups, &self.cfg.summarizer.model_yesterday)
        });
        self.cache
            .upsert_report(YESTERDAY_KEY, &summary.text, summary.score, &digest, now)?;
        Ok(())
    }

    /// Refresh the current time block for one granularity. A window with no
    /// events at all is an explicit state: written once with the no-events
    /// text and the fixed sentinel digest, then left alone while it stays
    /// empty.
    fn refresh_block(
        &self,
        granularity: Granularity,
        width_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let date = blocks::day_string(now);
        let key = blocks::block_key(now, width_minutes, granularity);
        let start = blocks::block_start(now, width_minutes);

        let events = self.events.read_since(start)?;
        let groups = self.clusterer.cluster(&events);
        let payload = blocks::groups_payload(&groups);
        let digest = if events.is_empty() {
            EMPTY_DIGEST.to_string()
        } else {
            batch_digest(&payload)
        };

        if let Some(prev) = self.cache.read_block(&date, granularity, &key)? {
            if prev.digest == digest {
                debug!("block {}/{}/{} unchanged - skipping", date, granularity.as_str(), key);
                return Ok(());
            }
        }

        info!(
            "block {}/{}/{} changed - summarizing {} groups from {} events",
            date,
            granularity.as_str(),
            key,
            groups.len(),
            events.len()
        );
        let label = format!("block {}", key);
        let summary = self.summarize_or_fallback(&label, || {
            self.client
                .summarize_groups(&groups, &self.cfg.summarizer.model_current)
        });
        self.cache.upsert_block(
            &date,
            granularity,
            &key,
            &summary.text,
            summary.score,
            events.len(),
            &blocks::group_details(&groups),
            &digest,
            now,
        )?;
        self.cache.demote_other_blocks(&date, granularity, &key)?;
        Ok(())
    }

    /// Daily rollup over the day's coarse blocks. Tolerates sparse days; a
    /// failed rollup call is logged and the previous rollup stays in place.
    fn refresh_daily_rollup(&self, now: DateTime<Utc>) -> Result<(), PipelineError> {
        let date = blocks::day_string(now);
        let day_blocks = self.cache.read_day_blocks(&date, Granularity::Coarse)?;
        if day_blocks.is_empty() {
            debug!("no blocks yet for {date} - skipping daily rollup");
            return Ok(());
        }
        let text = blocks::concat_block_texts(&day_blocks);
        if text.is_empty() {
            debug!("no block text yet for {date} - skipping daily rollup");
            return Ok(());
        }
        let fallback_score = blocks::average_score(&day_blocks);

        match self.client.summarize_payload(
            &serde_json::Value::String(text),
            DAILY_INSTRUCTION,
            &self.cfg.summarizer.model_daily,
        ) {
            Ok(summary) => {
                let score = if summary.score > 0.0 { summary.score } else { fallback_score };
                self.cache.upsert_rollup(&date, &summary.text, score, now)?;
                info!("daily rollup updated for {date}");
                Ok(())
            }
            Err(e) => {
                warn!("daily rollup call failed for {date}: {e} - keeping previous rollup");
                Ok(())
            }
        }
    }

    /// A gateway failure for one key degrades to a fallback entry rather
    /// than abandoning the whole cycle.
    fn summarize_or_fallback<F>(&self, label: &str, call: F) -> Summary
    where
        F: FnOnce() -> Result<Summary, GatewayError>,
    {
        match call() {
            Ok(summary) => summary,
            Err(e) => {
                error!("summarization failed for {label}: {e} - writing fallback entry");
                Summary::fallback(&e.to_string())
            }
        }
    }
}
