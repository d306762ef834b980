use chrono::{DateTime, TimeZone, Utc};
use eventscope::cache::{CacheStore, Granularity};
use eventscope::config::Config;
use eventscope::digest::EMPTY_DIGEST;
use eventscope::pipeline::{Pipeline, ReportKind, YESTERDAY_KEY};
use eventscope::retry::RetryPolicy;
use eventscope::store::EventStore;
use eventscope::summarizer::{
    SummarizerSettings, SummaryClient, ERROR_TEXT, NOT_CONFIGURED_TEXT, NO_EVENTS_TEXT,
};
use serde_json::json;
use std::time::Duration;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
}

fn offline_client(api_key: Option<&str>) -> SummaryClient {
    SummaryClient::new(SummarizerSettings {
        api_base: "http://127.0.0.1:9".to_string(),
        api_key: api_key.map(|k| k.to_string()),
        timeout: Duration::from_millis(250),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    })
    .unwrap()
}

/// Pipeline over in-memory stores with no usable credential: every grouped
/// window lands on the deterministic not-configured fallback, which keeps
/// the rest of the machinery fully observable without a network.
fn offline_pipeline(api_key: Option<&str>) -> Pipeline {
    Pipeline::from_parts(
        EventStore::open_in_memory().unwrap(),
        CacheStore::open_in_memory().unwrap(),
        offline_client(api_key),
        Config::default(),
    )
}

fn seed(pipeline: &Pipeline, ts: &str, text: &str) {
    pipeline
        .events()
        .append(&json!({"timestamp": ts, "text": text}))
        .unwrap();
}

#[test]
fn a_cycle_populates_reports_blocks_and_rollup() {
    let pipeline = offline_pipeline(None);
    seed(&pipeline, "2026-03-10T09:45:10Z", "front door open");
    seed(&pipeline, "2026-03-10T09:45:40Z", "front  door OPEN!");
    seed(&pipeline, "2026-03-10T09:46:00Z", "water leak detected in basement");

    pipeline.run_cycle(at(9, 47)).unwrap();

    for kind in ReportKind::ALL {
        let entry = pipeline.cache().read_report(kind.key()).unwrap().unwrap();
        assert_eq!(entry.text, NOT_CONFIGURED_TEXT);
        assert_eq!(entry.updated_at, at(9, 47));
    }

    // No events yesterday: the once-per-day report is the no-events text.
    let yesterday = pipeline.cache().read_report(YESTERDAY_KEY).unwrap().unwrap();
    assert_eq!(yesterday.text, NO_EVENTS_TEXT);

    let coarse = pipeline
        .cache()
        .read_block("2026-03-10", Granularity::Coarse, "09")
        .unwrap()
        .unwrap();
    assert_eq!(coarse.events_count, 3);
    assert_eq!(coarse.events_detail.len(), 2); // two groups after clustering
    assert_eq!(coarse.events_detail[0].count, 2);

    let detailed = pipeline
        .cache()
        .read_block("2026-03-10", Granularity::Detailed, "09:45")
        .unwrap()
        .unwrap();
    assert_eq!(detailed.events_count, 3);

    // Rollup exists because the coarse block carries text.
    assert!(pipeline.cache().read_rollup("2026-03-10").unwrap().is_some());
}

#[test]
fn unchanged_batches_skip_summarization_on_the_second_cycle() {
    let pipeline = offline_pipeline(None);
    seed(&pipeline, "2026-03-10T09:45:10Z", "front door open");
    seed(&pipeline, "2026-03-10T09:45:40Z", "front door open");

    pipeline.run_cycle(at(9, 47)).unwrap();
    let first = pipeline.cache().read_report("recent").unwrap().unwrap();

    // Same events, later cycle: digest equality must leave the entry alone.
    pipeline.run_cycle(at(9, 48)).unwrap();
    let second = pipeline.cache().read_report("recent").unwrap().unwrap();
    assert_eq!(second.digest, first.digest);
    assert_eq!(second.updated_at, first.updated_at);

    // A genuinely new event flips the gate again.
    seed(&pipeline, "2026-03-10T09:48:30Z", "garage door opened");
    pipeline.run_cycle(at(9, 49)).unwrap();
    let third = pipeline.cache().read_report("recent").unwrap().unwrap();
    assert_ne!(third.digest, first.digest);
    assert_eq!(third.updated_at, at(9, 49));
}

#[test]
fn empty_windows_write_the_sentinel_once_and_stay_quiet() {
    let pipeline = offline_pipeline(None);

    pipeline.run_cycle(at(9, 47)).unwrap();
    let block = pipeline
        .cache()
        .read_block("2026-03-10", Granularity::Coarse, "09")
        .unwrap()
        .unwrap();
    assert_eq!(block.digest, EMPTY_DIGEST);
    assert_eq!(block.text, NO_EVENTS_TEXT);
    assert_eq!(block.events_count, 0);

    // Still empty on the next cycle: the sentinel digest suppresses rewrite.
    pipeline.run_cycle(at(9, 52)).unwrap();
    let again = pipeline
        .cache()
        .read_block("2026-03-10", Granularity::Coarse, "09")
        .unwrap()
        .unwrap();
    assert_eq!(again.updated_at, block.updated_at);

    let current = pipeline.cache().read_report("current").unwrap().unwrap();
    assert_eq!(current.text, NO_EVENTS_TEXT);
    assert_eq!(current.score, 0.0);
}

#[test]
fn yesterday_is_computed_at_most_once_per_day() {
    let pipeline = offline_pipeline(None);
    seed(&pipeline, "2026-03-09T14:00:00Z", "package delivered yesterday");

    pipeline.run_cycle(at(9, 47)).unwrap();
    let first = pipeline.cache().read_report(YESTERDAY_KEY).unwrap().unwrap();
    assert_eq!(first.text, NOT_CONFIGURED_TEXT);

    pipeline.run_cycle(at(15, 30)).unwrap();
    let second = pipeline.cache().read_report(YESTERDAY_KEY).unwrap().unwrap();
    assert_eq!(second.updated_at, first.updated_at);
}

#[test]
fn gateway_exhaustion_degrades_to_a_fallback_entry_without_failing_the_cycle() {
    // Credential present, endpoint unreachable: every call exhausts its
    // retries and the pipeline must still complete the cycle.
    let pipeline = offline_pipeline(Some("key"));
    seed(&pipeline, "2026-03-10T09:45:10Z", "front door open");

    pipeline.run_cycle(at(9, 47)).unwrap();

    let current = pipeline.cache().read_report("current").unwrap().unwrap();
    assert_eq!(current.text, ERROR_TEXT);
    assert_eq!(current.score, 0.0);
    assert!(!current.digest.is_empty());

    // Block writes completed too, with the same degraded text.
    let block = pipeline
        .cache()
        .read_block("2026-03-10", Granularity::Coarse, "09")
        .unwrap()
        .unwrap();
    assert_eq!(block.text, ERROR_TEXT);
    assert_eq!(block.events_count, 1);
}

#[test]
fn newest_block_is_the_only_active_one() {
    let pipeline = offline_pipeline(None);
    seed(&pipeline, "2026-03-10T08:50:00Z", "morning motion");
    // 08:50 falls in coarse block "06"; by 09:47 the current block is "09".
    pipeline.run_cycle(at(8, 55)).unwrap();
    seed(&pipeline, "2026-03-10T09:45:00Z", "midday motion");
    pipeline.run_cycle(at(9, 47)).unwrap();

    let blocks = pipeline
        .cache()
        .read_day_blocks("2026-03-10", Granularity::Coarse)
        .unwrap();
    let active: Vec<&str> = blocks
        .iter()
        .filter(|b| b.status == eventscope::cache::BlockStatus::Active)
        .map(|b| b.block_key.as_str())
        .collect();
    assert_eq!(active, vec!["09"]);
}
