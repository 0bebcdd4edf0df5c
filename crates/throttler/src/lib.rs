//! Client-side admission control for exchange API quotas.
//!
//! A [`RateLimit`] describes one quota (`capacity` calls per `window`). Limits
//! may be linked: a call against a path-specific limit also draws on every
//! pool it lists in `linked_limits`. The [`AsyncThrottler`] keeps a sliding
//! window ledger of [`TaskLog`] entries and delays callers until every related
//! limit has room.
//!
//! The throttler never errors. A caller that cannot wait forever wraps
//! `acquire` in its own timeout.

pub mod rate_limit;
pub mod throttler;

pub use rate_limit::{LinkedLimitWeightPair, RateLimit, TaskLog};
pub use throttler::{create_throttler, AsyncThrottler, SharedThrottler, RETRY_INTERVAL};
