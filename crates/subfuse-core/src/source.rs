//! Source registry records
//!
//! A source is a subscription URL with a tier, a configured weight, and a
//! bounded performance history from which reputation is derived.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Source category affecting scheduling priority and weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Curated, high-trust sources
    Premium,
    /// Consistently healthy sources
    Reliable,
    /// Large aggregators of mixed quality
    Bulk,
    /// Unproven or trial sources
    Experimental,
}

impl SourceTier {
    /// Ordering priority, higher is fetched first
    pub fn priority(&self) -> u8 {
        match self {
            SourceTier::Premium => 4,
            SourceTier::Reliable => 3,
            SourceTier::Bulk => 2,
            SourceTier::Experimental => 1,
        }
    }

    /// Parse a tier name from a config file
    pub fn parse(name: &str) -> Option<SourceTier> {
        match name.to_ascii_lowercase().as_str() {
            "premium" => Some(SourceTier::Premium),
            "reliable" => Some(SourceTier::Reliable),
            "bulk" => Some(SourceTier::Bulk),
            "experimental" => Some(SourceTier::Experimental),
            _ => None,
        }
    }

    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Premium => "premium",
            SourceTier::Reliable => "reliable",
            SourceTier::Bulk => "bulk",
            SourceTier::Experimental => "experimental",
        }
    }
}

/// One fetch outcome recorded against a source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    /// Whether the fetch succeeded
    pub success: bool,
    /// Configurations recovered from the body
    pub config_count: usize,
    /// Wall-clock fetch time
    pub response_time_ms: u64,
    /// When the fetch finished
    pub timestamp: DateTime<Utc>,
    /// Whether the body came from cache rather than the network
    #[serde(default)]
    pub cache_hit: bool,
    /// Failure reason, e.g. "timeout" or "cancelled"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PerformanceRecord {
    /// Record a successful fetch
    pub fn success(config_count: usize, response_time_ms: u64) -> Self {
        Self {
            success: true,
            config_count,
            response_time_ms,
            timestamp: Utc::now(),
            cache_hit: false,
            reason: None,
        }
    }

    /// Record a failed fetch with a reason
    pub fn failure(response_time_ms: u64, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            config_count: 0,
            response_time_ms,
            timestamp: Utc::now(),
            cache_hit: false,
            reason: Some(reason.into()),
        }
    }

    /// Mark the record as served from cache
    pub fn with_cache_hit(mut self) -> Self {
        self.cache_hit = true;
        self
    }
}

/// Fixed-capacity ring of performance records.
///
/// Preallocated with a modular write index; appending beyond capacity
/// overwrites the oldest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRing {
    slots: Vec<Option<PerformanceRecord>>,
    head: usize,
    len: usize,
}

/// Bound on per-source history retained for reputation
pub const HISTORY_CAPACITY: usize = 100;

impl HistoryRing {
    /// Create an empty ring with the given capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            head: 0,
            len: 0,
        }
    }

    /// Append a record, evicting the oldest when full
    pub fn push(&mut self, record: PerformanceRecord) {
        let capacity = self.slots.len();
        self.slots[self.head] = Some(record);
        self.head = (self.head + 1) % capacity;
        if self.len < capacity {
            self.len += 1;
        }
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the ring holds no records
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate records oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &PerformanceRecord> {
        let capacity = self.slots.len();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    /// The most recent record, if any
    pub fn latest(&self) -> Option<&PerformanceRecord> {
        let capacity = self.slots.len();
        if self.len == 0 {
            return None;
        }
        self.slots[(self.head + capacity - 1) % capacity].as_ref()
    }
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

/// Coefficients combining success rate, recency, and configured weight
/// into a reputation score
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReputationWeights {
    /// Success-rate coefficient
    pub success: f64,
    /// Recency coefficient
    pub recency: f64,
    /// Configured-weight coefficient
    pub weight: f64,
    /// Half-life of the recency decay
    pub half_life_hours: f64,
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            success: 0.6,
            recency: 0.25,
            weight: 0.15,
            half_life_hours: 24.0,
        }
    }
}

/// Registry record for one subscription source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// Subscription URL, the unique registry key
    pub url: String,
    /// Tier assignment
    pub tier: SourceTier,
    /// Configured weight in [0, 1]
    pub weight: f64,
    /// Whether the source participates in fetch rounds
    pub enabled: bool,
    /// Whether the source has been blacklisted
    pub blacklisted: bool,
    /// Why the source was blacklisted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklist_reason: Option<String>,
    /// Protocols the source is expected to serve
    #[serde(default)]
    pub protocols: Vec<String>,
    /// Update frequency string, `Nm`/`Nh`/`Nd`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_frequency: Option<String>,
    /// Last completed fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<DateTime<Utc>>,
    /// Bounded fetch history
    #[serde(default)]
    pub history: HistoryRing,
    /// Consecutive attempts spent below the reputation floor
    #[serde(default)]
    pub low_reputation_streak: u32,
}

impl SourceMetadata {
    /// Create a source with defaults for the given tier
    pub fn new(url: impl Into<String>, tier: SourceTier) -> Self {
        Self {
            url: url.into(),
            tier,
            weight: 0.5,
            enabled: true,
            blacklisted: false,
            blacklist_reason: None,
            protocols: Vec::new(),
            update_frequency: None,
            last_fetch: None,
            history: HistoryRing::default(),
            low_reputation_streak: 0,
        }
    }

    /// Fraction of recorded fetches that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let successes = self.history.iter().filter(|r| r.success).count();
        successes as f64 / self.history.len() as f64
    }

    /// Mean response time over the history
    pub fn avg_response_time_ms(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let total: u64 = self.history.iter().map(|r| r.response_time_ms).sum();
        total as f64 / self.history.len() as f64
    }

    /// Mean configuration yield over successful fetches
    pub fn avg_config_count(&self) -> f64 {
        let successes: Vec<_> = self.history.iter().filter(|r| r.success).collect();
        if successes.is_empty() {
            return 0.0;
        }
        let total: usize = successes.iter().map(|r| r.config_count).sum();
        total as f64 / successes.len() as f64
    }

    /// Reputation in [0, 1]: weighted success rate, recency decay, and
    /// configured weight.
    ///
    /// A source with no history scores only on its configured weight.
    pub fn reputation_score(&self, now: DateTime<Utc>, weights: &ReputationWeights) -> f64 {
        let recency = match self.history.latest() {
            Some(record) => {
                let age_hours = now
                    .signed_duration_since(record.timestamp)
                    .num_seconds()
                    .max(0) as f64
                    / 3600.0;
                0.5f64.powf(age_hours / weights.half_life_hours)
            }
            None => 0.0,
        };
        let score = weights.success * self.success_rate()
            + weights.recency * recency
            + weights.weight * self.weight;
        score.clamp(0.0, 1.0)
    }

    /// Parsed update frequency, if one is configured and well-formed
    pub fn update_interval(&self) -> Option<Duration> {
        self.update_frequency
            .as_deref()
            .and_then(parse_update_frequency)
    }

    /// Whether the source is due for another fetch
    pub fn should_update(&self, now: DateTime<Utc>) -> bool {
        match (self.last_fetch, self.update_interval()) {
            (Some(last), Some(interval)) => now >= last + interval,
            // Never fetched, or no schedule configured: always due.
            _ => true,
        }
    }

    /// Whether the source is eligible for fetch rounds
    pub fn is_active(&self) -> bool {
        self.enabled && !self.blacklisted
    }
}

/// Parse `Nm`/`Nh`/`Nd` update-frequency strings
pub fn parse_update_frequency(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 {
        return None;
    }
    let (amount, unit) = value.split_at(value.len() - 1);
    let amount: i64 = amount.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        "m" | "M" => Some(Duration::minutes(amount)),
        "h" | "H" => Some(Duration::hours(amount)),
        "d" | "D" => Some(Duration::days(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_bounded() {
        let mut ring = HistoryRing::with_capacity(3);
        for i in 0..5 {
            ring.push(PerformanceRecord::success(i, 10));
        }
        assert_eq!(ring.len(), 3);
        let counts: Vec<usize> = ring.iter().map(|r| r.config_count).collect();
        assert_eq!(counts, vec![2, 3, 4]);
        assert_eq!(ring.latest().unwrap().config_count, 4);
    }

    #[test]
    fn test_success_rate() {
        let mut source = SourceMetadata::new("https://example.com/sub", SourceTier::Bulk);
        source.history.push(PerformanceRecord::success(10, 100));
        source.history.push(PerformanceRecord::failure(50, "timeout"));
        assert!((source.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reputation_decays_with_age() {
        let weights = ReputationWeights::default();
        let mut source = SourceMetadata::new("https://example.com/sub", SourceTier::Reliable);
        source.history.push(PerformanceRecord::success(10, 100));

        let fresh = source.reputation_score(Utc::now(), &weights);
        let stale = source.reputation_score(Utc::now() + Duration::hours(48), &weights);
        assert!(fresh > stale);
        assert!((0.0..=1.0).contains(&fresh));
    }

    #[test]
    fn test_reputation_without_history() {
        let weights = ReputationWeights::default();
        let source = SourceMetadata::new("https://example.com/sub", SourceTier::Premium);
        let score = source.reputation_score(Utc::now(), &weights);
        assert!((score - weights.weight * source.weight).abs() < 1e-9);
    }

    #[test]
    fn test_parse_update_frequency() {
        assert_eq!(parse_update_frequency("30m"), Some(Duration::minutes(30)));
        assert_eq!(parse_update_frequency("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_update_frequency("1d"), Some(Duration::days(1)));
        assert_eq!(parse_update_frequency("fast"), None);
        assert_eq!(parse_update_frequency("0h"), None);
    }

    #[test]
    fn test_should_update_schedule() {
        let mut source = SourceMetadata::new("https://example.com/sub", SourceTier::Bulk);
        source.update_frequency = Some("1h".into());
        let now = Utc::now();

        assert!(source.should_update(now));
        source.last_fetch = Some(now);
        assert!(!source.should_update(now + Duration::minutes(30)));
        assert!(source.should_update(now + Duration::minutes(61)));
    }

    #[test]
    fn test_tier_priority_order() {
        assert!(SourceTier::Premium.priority() > SourceTier::Reliable.priority());
        assert!(SourceTier::Reliable.priority() > SourceTier::Bulk.priority());
        assert!(SourceTier::Bulk.priority() > SourceTier::Experimental.priority());
    }
}
