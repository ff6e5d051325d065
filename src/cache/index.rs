//! In-memory LRU index and usage-pattern table
//!
//! Everything here is pure and CPU-bound: callers pass the current time in
//! and perform any filesystem work after releasing the lock that guards
//! the index.

use crate::cache::entry::{CacheEntry, UsagePattern};
use crate::config::CacheSettings;
use crate::provider::Provider;
use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Estimated load time for an already resident model
pub const RESIDENT_LOAD_MS: f64 = 100.0;

/// Parameter-count tiers for models never loaded before, first match wins
const LOAD_TIME_TIERS: &[(&[&str], f64)] = &[
    (&["70b"], 30_000.0),
    (&["13b", "15b"], 15_000.0),
    (&["7b", "8b"], 8_000.0),
    (&["3b"], 4_000.0),
];

const DEFAULT_LOAD_MS: f64 = 10_000.0;

/// Entries listed in each recency section of [`CacheStats`]
const RECENCY_LISTING: usize = 5;

/// Patterns listed in [`CacheStats`]
const PATTERN_LISTING: usize = 10;

#[derive(Debug, Clone)]
struct Slot {
    seq: u64,
    entry: CacheEntry,
}

/// Recency-ordered resident entries plus usage patterns
#[derive(Debug)]
pub struct CacheIndex {
    max_size_gb: f64,
    target_free_fraction: f64,
    grace: chrono::Duration,
    entries: HashMap<String, Slot>,
    /// Access sequence to model id; first is least recently used
    order: BTreeMap<u64, String>,
    next_seq: u64,
    patterns: BTreeMap<String, UsagePattern>,
}

/// Entries removed by an eviction pass
#[derive(Debug, Clone, Default)]
pub struct Eviction {
    pub evicted: Vec<CacheEntry>,
    pub resident_gb: f64,
    pub target_gb: f64,
}

impl Eviction {
    pub fn freed_gb(&self) -> f64 {
        self.evicted.iter().map(|e| e.size_gb).sum()
    }
}

/// Entries removed by a clear
#[derive(Debug, Clone, Default)]
pub struct Cleared {
    pub removed: Vec<CacheEntry>,
    pub kept: usize,
}

/// Operator-facing snapshot of the index
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub cache_size_gb: f64,
    pub max_cache_size_gb: f64,
    pub target_size_gb: f64,
    pub cache_utilization: f64,
    pub num_cached_models: usize,
    pub total_accesses: u64,
    pub target_free_fraction: f64,
    pub most_recently_used: Vec<EntrySummary>,
    pub least_recently_used: Vec<EntrySummary>,
    pub usage_patterns: Vec<PatternSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySummary {
    pub model_id: String,
    pub provider: Provider,
    pub size_gb: f64,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternSummary {
    pub model_id: String,
    pub peak_hour: usize,
    pub peak_day: &'static str,
    pub avg_daily_requests: f64,
    pub total_requests: u64,
}

impl From<&CacheEntry> for EntrySummary {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            model_id: entry.model_id.clone(),
            provider: entry.provider,
            size_gb: entry.size_gb,
            last_accessed: entry.last_accessed,
            access_count: entry.access_count,
        }
    }
}

impl CacheIndex {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            max_size_gb: settings.max_size_gb,
            target_free_fraction: settings.target_free_fraction,
            grace: chrono::Duration::from_std(settings.eviction_grace)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            patterns: BTreeMap::new(),
        }
    }

    /// Resident size the eviction pass works back down to
    pub fn target_gb(&self) -> f64 {
        self.max_size_gb * (1.0 - self.target_free_fraction)
    }

    pub fn resident_gb(&self) -> f64 {
        self.entries.values().map(|s| s.entry.size_gb).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
    }

    pub fn get(&self, model_id: &str) -> Option<&CacheEntry> {
        self.entries.get(model_id).map(|s| &s.entry)
    }

    pub fn pattern(&self, model_id: &str) -> Option<&UsagePattern> {
        self.patterns.get(model_id)
    }

    /// Entries from least to most recently used
    pub fn lru_order(&self) -> impl Iterator<Item = &CacheEntry> {
        self.order
            .values()
            .filter_map(|id| self.entries.get(id).map(|s| &s.entry))
    }

    /// Most recently used entry
    pub fn most_recent(&self) -> Option<&CacheEntry> {
        self.order
            .values()
            .next_back()
            .and_then(|id| self.entries.get(id))
            .map(|s| &s.entry)
    }

    /// Record one access, inserting the entry if it is not resident
    ///
    /// A resident entry keeps its size and path; only recency and count
    /// change. Returns the updated entry and whether it was inserted.
    pub fn record_access(
        &mut self,
        model_id: &str,
        provider: Provider,
        size_gb: f64,
        load_time_ms: f64,
        path: PathBuf,
        now: DateTime<Local>,
    ) -> (CacheEntry, bool) {
        let seq = self.bump_seq();
        let accessed = now.with_timezone(&Utc);

        let (entry, inserted) = match self.entries.get_mut(model_id) {
            Some(slot) => {
                self.order.remove(&slot.seq);
                slot.seq = seq;
                slot.entry.last_accessed = accessed;
                slot.entry.access_count += 1;
                (slot.entry.clone(), false)
            }
            None => {
                let entry = CacheEntry {
                    model_id: model_id.to_string(),
                    provider,
                    size_gb,
                    last_accessed: accessed,
                    access_count: 1,
                    load_time_ms,
                    path,
                    metadata: BTreeMap::new(),
                };
                self.entries.insert(
                    model_id.to_string(),
                    Slot {
                        seq,
                        entry: entry.clone(),
                    },
                );
                (entry, true)
            }
        };
        self.order.insert(seq, model_id.to_string());

        let pattern = self
            .patterns
            .entry(model_id.to_string())
            .or_insert_with(|| UsagePattern::new(model_id));
        pattern.record(now);
        pattern.provider = Some(provider);
        if load_time_ms > 0.0 {
            pattern.last_load_time_ms = Some(load_time_ms);
        }

        (entry, inserted)
    }

    /// Whether admitting `size_gb` more can be satisfied, evicting
    /// eligible entries if needed
    pub fn should_cache(&self, size_gb: f64, now: DateTime<Local>) -> bool {
        let shortfall = self.resident_gb() + size_gb - self.target_gb();
        if shortfall <= 0.0 {
            return true;
        }

        let now = now.with_timezone(&Utc);
        let mut reclaimable = 0.0;
        for slot in self.entries.values() {
            if self.is_eligible(&slot.entry, now) {
                reclaimable += slot.entry.size_gb;
                if reclaimable >= shortfall {
                    return true;
                }
            }
        }
        false
    }

    /// Evict eligible entries, oldest access first, until resident size is
    /// back at or under target
    ///
    /// Entries inside the grace window are never evicted, even when that
    /// leaves the cache over target.
    pub fn evict_over_target(&mut self, now: DateTime<Local>) -> Eviction {
        let target_gb = self.target_gb();
        let mut resident_gb = self.resident_gb();
        if resident_gb <= target_gb {
            return Eviction {
                evicted: Vec::new(),
                resident_gb,
                target_gb,
            };
        }

        let now = now.with_timezone(&Utc);
        let mut candidates: Vec<(DateTime<Utc>, u64, String)> = self
            .entries
            .values()
            .filter(|s| self.is_eligible(&s.entry, now))
            .map(|s| (s.entry.last_accessed, s.seq, s.entry.model_id.clone()))
            .collect();
        candidates.sort();

        let mut evicted = Vec::new();
        for (_, _, model_id) in candidates {
            if resident_gb <= target_gb {
                break;
            }
            if let Some(entry) = self.remove(&model_id) {
                resident_gb -= entry.size_gb;
                evicted.push(entry);
            }
        }

        Eviction {
            evicted,
            resident_gb,
            target_gb,
        }
    }

    /// Non-resident patterns whose peak hour is the next local hour and
    /// whose count for today's weekday exceeds half their daily average
    pub fn prefetch_candidates(&self, now: DateTime<Local>) -> Vec<UsagePattern> {
        let next_hour = (now.hour() as usize + 1) % 24;
        let today = now.weekday().num_days_from_monday() as usize;

        self.patterns
            .values()
            .filter(|p| !self.entries.contains_key(&p.model_id))
            .filter(|p| p.peak_hour == next_hour)
            .filter(|p| p.day_histogram[today] as f64 > p.avg_daily_requests * 0.5)
            .cloned()
            .collect()
    }

    /// Expected milliseconds until `model_id` is usable
    pub fn load_time_estimate(&self, model_id: &str) -> f64 {
        if self.entries.contains_key(model_id) {
            return RESIDENT_LOAD_MS;
        }

        if let Some(ms) = self
            .patterns
            .get(model_id)
            .and_then(|p| p.last_load_time_ms)
            .filter(|ms| *ms > 0.0)
        {
            return ms;
        }

        let lower = model_id.to_ascii_lowercase();
        LOAD_TIME_TIERS
            .iter()
            .find(|(needles, _)| needles.iter().any(|n| lower.contains(n)))
            .map(|(_, ms)| *ms)
            .unwrap_or(DEFAULT_LOAD_MS)
    }

    /// Drop entries; `force` drops everything including patterns, otherwise
    /// the most-accessed fifth (at least one) is kept
    pub fn clear(&mut self, force: bool) -> Cleared {
        if force {
            let removed = self.lru_order().cloned().collect();
            self.entries.clear();
            self.order.clear();
            self.patterns.clear();
            return Cleared { removed, kept: 0 };
        }

        let mut ranked: Vec<(u64, u64, String)> = self
            .entries
            .values()
            .map(|s| (s.entry.access_count, s.seq, s.entry.model_id.clone()))
            .collect();
        // Most accessed first; equal counts rank the more recently used higher
        ranked.sort_by(|a, b| b.cmp(a));

        let keep = (ranked.len() / 5).max(1).min(ranked.len());
        let removed = ranked
            .into_iter()
            .skip(keep)
            .filter_map(|(_, _, id)| self.remove(&id))
            .collect();

        Cleared {
            removed,
            kept: keep,
        }
    }

    pub fn remove(&mut self, model_id: &str) -> Option<CacheEntry> {
        let slot = self.entries.remove(model_id)?;
        self.order.remove(&slot.seq);
        Some(slot.entry)
    }

    pub fn stats(&self) -> CacheStats {
        let cache_size_gb = self.resident_gb();
        let by_recency: Vec<&CacheEntry> = self.lru_order().collect();

        let mut patterns: Vec<&UsagePattern> = self.patterns.values().collect();
        patterns.sort_by(|a, b| b.total_requests.cmp(&a.total_requests));

        CacheStats {
            cache_size_gb,
            max_cache_size_gb: self.max_size_gb,
            target_size_gb: self.target_gb(),
            cache_utilization: if self.max_size_gb > 0.0 {
                cache_size_gb / self.max_size_gb
            } else {
                0.0
            },
            num_cached_models: self.entries.len(),
            total_accesses: self.entries.values().map(|s| s.entry.access_count).sum(),
            target_free_fraction: self.target_free_fraction,
            most_recently_used: by_recency
                .iter()
                .rev()
                .take(RECENCY_LISTING)
                .map(|e| EntrySummary::from(*e))
                .collect(),
            least_recently_used: by_recency
                .iter()
                .take(RECENCY_LISTING)
                .map(|e| EntrySummary::from(*e))
                .collect(),
            usage_patterns: patterns
                .into_iter()
                .take(PATTERN_LISTING)
                .map(|p| PatternSummary {
                    model_id: p.model_id.clone(),
                    peak_hour: p.peak_hour,
                    peak_day: p.peak_day_name(),
                    avg_daily_requests: p.avg_daily_requests,
                    total_requests: p.total_requests,
                })
                .collect(),
        }
    }

    /// Entries in recency order and all patterns, for persistence
    pub fn snapshot(&self) -> (Vec<CacheEntry>, Vec<UsagePattern>) {
        (
            self.lru_order().cloned().collect(),
            self.patterns.values().cloned().collect(),
        )
    }

    /// Replace contents with persisted state
    ///
    /// Entries are ordered by `last_accessed`; a later duplicate of the same
    /// model id replaces the earlier one.
    pub fn restore(&mut self, mut entries: Vec<CacheEntry>, patterns: Vec<UsagePattern>) {
        self.entries.clear();
        self.order.clear();
        self.patterns.clear();

        entries.sort_by_key(|e| e.last_accessed);
        for entry in entries {
            let seq = self.bump_seq();
            if let Some(old) = self.entries.remove(&entry.model_id) {
                self.order.remove(&old.seq);
            }
            self.order.insert(seq, entry.model_id.clone());
            self.entries.insert(entry.model_id.clone(), Slot { seq, entry });
        }

        for mut pattern in patterns {
            pattern.recompute();
            self.patterns.insert(pattern.model_id.clone(), pattern);
        }
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn is_eligible(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.last_accessed >= self.grace
    }
}
