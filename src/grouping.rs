use ahash::AHashMap;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

use crate::normalize::normalize_text;
use crate::store::Event;

/// A cluster of near- or exactly-duplicate event texts. Built fresh every
/// cycle from the current batch, never mutated across cycles.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub sample: String,
    pub count: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Group {
    fn seed(evt: &Event) -> Self {
        Group {
            sample: evt.text.clone(),
            count: 1,
            first_seen: evt.timestamp,
            last_seen: evt.timestamp,
        }
    }

    fn absorb(&mut self, evt: &Event) {
        self.count += 1;
        if evt.timestamp < self.first_seen {
            self.first_seen = evt.timestamp;
        }
        if evt.timestamp > self.last_seen {
            self.last_seen = evt.timestamp;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FingerprintParams {
    /// Normalized text is truncated to this many characters before shingling.
    pub prefix_len: usize,
    pub shingle_len: usize,
}

impl Default for FingerprintParams {
    fn default() -> Self {
        FingerprintParams { prefix_len: 200, shingle_len: 5 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FuzzyParams {
    /// Minimum similarity ratio for joining an existing group.
    pub threshold: f64,
}

impl Default for FuzzyParams {
    fn default() -> Self {
        FuzzyParams { threshold: 0.95 }
    }
}

/// Interchangeable grouping strategies behind one `cluster` entry point,
/// selected by deployment configuration.
#[derive(Debug, Clone, Copy)]
pub enum Clusterer {
    /// O(n): shingle-fingerprint exact merge. Insensitive to small edits
    /// beyond shingle boundaries.
    Fingerprint(FingerprintParams),
    /// O(n²) worst case: LCS-ratio merge against each group representative.
    /// Use only on bounded-size windows.
    Fuzzy(FuzzyParams),
}

impl Clusterer {
    pub fn cluster(&self, events: &[Event]) -> Vec<Group> {
        match self {
            Clusterer::Fingerprint(p) => cluster_fingerprint(events, *p),
            Clusterer::Fuzzy(p) => cluster_fuzzy(events, *p),
        }
    }
}

/// Shingle fingerprint of one text: normalize, truncate to the prefix bound,
/// split into fixed non-overlapping shingles, join and hash. `None` when the
/// normalized text is empty.
pub fn fingerprint(text: &str, params: FingerprintParams) -> Option<u64> {
    let norm = normalize_text(text);
    if norm.is_empty() {
        return None;
    }
    let prefix: Vec<char> = norm.chars().take(params.prefix_len).collect();
    let shingles: Vec<String> = prefix
        .chunks(params.shingle_len.max(1))
        .map(|c| c.iter().collect())
        .collect();
    Some(xxh3_64(shingles.join("|").as_bytes()))
}

fn cluster_fingerprint(events: &[Event], params: FingerprintParams) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut seen: AHashMap<u64, usize> = AHashMap::new();
    for evt in events {
        let Some(fp) = fingerprint(&evt.text, params) else {
            continue;
        };
        match seen.get(&fp) {
            Some(&idx) => groups[idx].absorb(evt),
            None => {
                seen.insert(fp, groups.len());
                groups.push(Group::seed(evt));
            }
        }
    }
    groups
}

fn cluster_fuzzy(events: &[Event], params: FuzzyParams) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    // Normalized representative per group, index-aligned with `groups`.
    let mut reps: Vec<String> = Vec::new();
    for evt in events {
        let norm = normalize_text(&evt.text);
        if norm.is_empty() {
            continue;
        }
        // First group in encounter order whose representative is close
        // enough wins; `min` keeps that rule under the parallel scan.
        let hit = reps
            .par_iter()
            .enumerate()
            .filter(|(_, rep)| similarity_ratio(&norm, rep) >= params.threshold)
            .map(|(idx, _)| idx)
            .min();
        match hit {
            Some(idx) => groups[idx].absorb(evt),
            None => {
                reps.push(norm);
                groups.push(Group::seed(evt));
            }
        }
    }
    groups
}

/// Longest-common-subsequence similarity ratio in [0.0, 1.0]:
/// `2·lcs / (len_a + len_b)` over characters.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            cur[j] = if a[i - 1] == b[j - 1] {
                prev[j - 1] + 1
            } else {
                prev[j].max(cur[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
        cur[0] = 0;
    }
    let lcs = prev[b.len()];
    (2.0 * lcs as f64) / ((a.len() + b.len()) as f64)
}
