use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A pool this limit also draws on, with the weight charged to that pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedLimitWeightPair {
    pub limit_id: String,
    pub weight: u32,
}

impl LinkedLimitWeightPair {
    pub fn new(limit_id: impl Into<String>, weight: u32) -> Self {
        Self {
            limit_id: limit_id.into(),
            weight,
        }
    }
}

/// One exchange-defined quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit_id: String,
    /// Maximum total weight admitted per window.
    pub capacity: u32,
    #[serde(with = "duration_secs")]
    pub window: Duration,
    /// Weight charged to this limit per call.
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub linked_limits: Vec<LinkedLimitWeightPair>,
    /// Headroom kept below `capacity`, in percent (0 to 100).
    #[serde(default)]
    pub safety_margin_pct: f64,
}

fn default_weight() -> u32 {
    1
}

impl RateLimit {
    /// Create a limit with weight 1, no links and no safety margin.
    pub fn new(limit_id: impl Into<String>, capacity: u32, window: Duration) -> Self {
        Self {
            limit_id: limit_id.into(),
            capacity,
            window,
            weight: 1,
            linked_limits: Vec::new(),
            safety_margin_pct: 0.0,
        }
    }

    /// Also charge `weight` to the pool `limit_id` on every call.
    pub fn with_linked(mut self, limit_id: impl Into<String>, weight: u32) -> Self {
        self.linked_limits
            .push(LinkedLimitWeightPair::new(limit_id, weight));
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_safety_margin(mut self, pct: f64) -> Self {
        self.safety_margin_pct = pct.clamp(0.0, 100.0);
        self
    }

    /// Whether this limit lists `limit_id` as a linked pool.
    pub fn links_to(&self, limit_id: &str) -> bool {
        self.linked_limits.iter().any(|l| l.limit_id == limit_id)
    }

    /// Capacity after the safety margin and the global share are applied.
    ///
    /// `floor(capacity * share/100 * (1 - margin/100))`, never below 1 so a
    /// tiny share cannot starve a limit completely.
    pub fn effective_capacity(&self, share_pct: f64) -> u32 {
        let share = share_pct.clamp(0.0, 100.0) / 100.0;
        let margin = 1.0 - self.safety_margin_pct.clamp(0.0, 100.0) / 100.0;
        let scaled = (self.capacity as f64 * share * margin).floor() as u32;
        scaled.max(1)
    }
}

/// One admitted call: when it happened and which limits it was charged to.
#[derive(Debug, Clone)]
pub struct TaskLog {
    pub timestamp: Instant,
    pub consumed: Vec<(String, u32)>,
}

impl TaskLog {
    /// Weight this entry charged to `limit_id`, zero if unrelated.
    pub fn weight_for(&self, limit_id: &str) -> u32 {
        self.consumed
            .iter()
            .filter(|(id, _)| id == limit_id)
            .map(|(_, w)| *w)
            .sum()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("window must be a non-negative number of seconds"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
