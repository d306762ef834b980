use chrono::{TimeZone, Utc};
use eventscope::store::{coerce_timestamp, EventStore};
use serde_json::json;

#[test]
fn append_and_read_back_in_timestamp_order() {
    let store = EventStore::open_in_memory().unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:47:00Z", "text": "second"}))
        .unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:45:00Z", "text": "first"}))
        .unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:50:00Z", "text": "third"}))
        .unwrap();

    let cutoff = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
    let events = store.read_since(cutoff).unwrap();
    let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
}

#[test]
fn read_since_excludes_older_events() {
    let store = EventStore::open_in_memory().unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:00:00Z", "text": "old"}))
        .unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:46:00Z", "text": "fresh"}))
        .unwrap();

    let cutoff = Utc.with_ymd_and_hms(2026, 3, 10, 9, 45, 0).unwrap();
    let events = store.read_since(cutoff).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "fresh");
}

#[test]
fn read_range_is_inclusive_on_both_ends() {
    let store = EventStore::open_in_memory().unwrap();
    for (ts, text) in [
        ("2026-03-09T00:00:00Z", "start"),
        ("2026-03-09T12:00:00Z", "middle"),
        ("2026-03-09T23:59:59Z", "end"),
        ("2026-03-10T00:00:00Z", "next day"),
    ] {
        store.append(&json!({"timestamp": ts, "text": text})).unwrap();
    }
    let start = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 3, 9, 23, 59, 59).unwrap();
    let events = store.read_range(start, end).unwrap();
    let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["start", "middle", "end"]);
}

#[test]
fn read_last_returns_most_recent_ascending() {
    let store = EventStore::open_in_memory().unwrap();
    for minute in 0..10 {
        store
            .append(&json!({
                "timestamp": format!("2026-03-10T09:{minute:02}:00Z"),
                "text": format!("event {minute}")
            }))
            .unwrap();
    }
    let events = store.read_last(3).unwrap();
    let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["event 7", "event 8", "event 9"]);
}

#[test]
fn text_falls_back_through_aliases() {
    let store = EventStore::open_in_memory().unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:45:00Z", "msg": "from msg"}))
        .unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:46:00Z", "message": "from message"}))
        .unwrap();
    store
        .append(&json!({"timestamp": "2026-03-10T09:47:00Z", "text": "", "msg": "text was empty"}))
        .unwrap();

    let events = store
        .read_since(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap())
        .unwrap();
    let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["from msg", "from message", "text was empty"]);
}

#[test]
fn extra_attributes_survive_but_consumed_fields_do_not() {
    let store = EventStore::open_in_memory().unwrap();
    store
        .append(&json!({
            "timestamp": "2026-03-10T09:45:00Z",
            "text": "zone breach",
            "zone": "garden",
            "device": 7
        }))
        .unwrap();
    let events = store
        .read_since(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap())
        .unwrap();
    let attrs = &events[0].attrs;
    assert_eq!(attrs.get("zone"), Some(&json!("garden")));
    assert_eq!(attrs.get("device"), Some(&json!(7)));
    assert!(attrs.get("text").is_none());
    assert!(attrs.get("timestamp").is_none());
}

#[test]
fn append_without_timestamp_is_rejected() {
    let store = EventStore::open_in_memory().unwrap();
    let err = store.append(&json!({"text": "no timestamp"}));
    assert!(err.is_err());
}

#[test]
fn timestamps_are_coerced_from_multiple_shapes() {
    let expected = Utc.with_ymd_and_hms(2026, 3, 10, 9, 47, 0).unwrap();
    for v in [
        json!("2026-03-10T09:47:00Z"),
        json!("2026-03-10T09:47:00+00:00"),
        json!("2026-03-10T10:47:00+01:00"),
        json!("2026-03-10 09:47:00"),
        json!("2026-03-10T09:47:00"),
        json!(expected.timestamp()),
        json!(expected.timestamp().to_string()),
        json!(expected.timestamp_millis()),
    ] {
        assert_eq!(coerce_timestamp(&v), Some(expected), "shape {v}");
    }
}

#[test]
fn unparseable_timestamps_coerce_to_none() {
    for v in [json!("not a date"), json!("10/03/2026"), json!(true), json!(null)] {
        assert_eq!(coerce_timestamp(&v), None, "shape {v}");
    }
}

#[test]
fn file_backed_store_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    {
        let store = EventStore::open(&path).unwrap();
        store
            .append(&json!({"timestamp": "2026-03-10T09:45:00Z", "text": "persisted"}))
            .unwrap();
    }
    let store = EventStore::open(&path).unwrap();
    let events = store
        .read_since(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap())
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "persisted");
}
