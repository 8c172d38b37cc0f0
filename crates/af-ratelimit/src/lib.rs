// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-ratelimit
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub use af_config::{DegradationPolicy, RateLimitAlgorithm};

// ---------------------------------------------------------------------------
// Cache seam
// ---------------------------------------------------------------------------

/// Errors from the shared counter cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache could not be reached.
    #[error("rate-limit cache unavailable: {reason}")]
    Unavailable {
        /// Human-readable failure detail.
        reason: String,
    },
}

/// A weighted sliding-window observation, after counting this request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSample {
    /// Weighted request count for the window, including this request.
    pub count: u64,
    /// Unix second at which the current window rolls over.
    pub reset_unix: u64,
}

/// A token-bucket observation, after attempting to take one token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSample {
    /// Whether a token was granted.
    pub granted: bool,
    /// Whole tokens remaining after this attempt.
    pub remaining: u64,
    /// Unix second at which at least one token will be available.
    pub reset_unix: u64,
}

/// Shared counter storage. Implementations are approximate by design; the
/// only hard requirement is that repeated counting within one window never
/// moves backwards.
#[async_trait]
pub trait RateCache: Send + Sync {
    /// Count one request against a sliding window.
    async fn window_incr(&self, key: &str, window: Duration) -> Result<WindowSample, CacheError>;

    /// Attempt to take one token from a bucket.
    async fn bucket_take(
        &self,
        key: &str,
        capacity: u32,
        refill_per_sec: f64,
    ) -> Result<BucketSample, CacheError>;
}

// ---------------------------------------------------------------------------
// In-memory cache
// ---------------------------------------------------------------------------

struct WindowState {
    window_start: u64,
    current: u64,
    previous: u64,
}

struct BucketState {
    tokens: f64,
    updated_unix: f64,
}

/// Per-process reference cache. Replicas sharing state would swap this for
/// a networked implementation of [`RateCache`].
#[derive(Default)]
pub struct MemoryCache {
    windows: Mutex<HashMap<String, WindowState>>,
    buckets: Mutex<HashMap<String, BucketState>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn unix_now_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[async_trait]
impl RateCache for MemoryCache {
    async fn window_incr(&self, key: &str, window: Duration) -> Result<WindowSample, CacheError> {
        let window_secs = window.as_secs().max(1);
        let now = unix_now_f64();
        let aligned = (now as u64 / window_secs) * window_secs;

        let mut windows = self.windows.lock().await;
        let state = windows.entry(key.to_string()).or_insert(WindowState {
            window_start: aligned,
            current: 0,
            previous: 0,
        });

        if aligned > state.window_start {
            state.previous = if aligned - state.window_start >= 2 * window_secs {
                0
            } else {
                state.current
            };
            state.current = 0;
            state.window_start = aligned;
        }

        state.current += 1;
        // Weight the previous window by how much of it still overlaps the
        // trailing window ending now.
        let elapsed = now - state.window_start as f64;
        let overlap = 1.0 - (elapsed / window_secs as f64).clamp(0.0, 1.0);
        let weighted = state.current as f64 + state.previous as f64 * overlap;

        Ok(WindowSample {
            count: weighted.ceil() as u64,
            reset_unix: state.window_start + window_secs,
        })
    }

    async fn bucket_take(
        &self,
        key: &str,
        capacity: u32,
        refill_per_sec: f64,
    ) -> Result<BucketSample, CacheError> {
        let now = unix_now_f64();
        let mut buckets = self.buckets.lock().await;
        let state = buckets.entry(key.to_string()).or_insert(BucketState {
            tokens: f64::from(capacity),
            updated_unix: now,
        });

        let refill = (now - state.updated_unix).max(0.0) * refill_per_sec;
        state.tokens = (state.tokens + refill).min(f64::from(capacity));
        state.updated_unix = now;

        let granted = state.tokens >= 1.0;
        if granted {
            state.tokens -= 1.0;
        }
        let until_next = if state.tokens >= 1.0 || refill_per_sec <= 0.0 {
            0.0
        } else {
            (1.0 - state.tokens) / refill_per_sec
        };
        Ok(BucketSample {
            granted,
            remaining: state.tokens.floor().max(0.0) as u64,
            reset_unix: (now + until_next).ceil() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// An admit/deny decision with the quota headers attached to every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request is admitted.
    pub allowed: bool,
    /// The limit in effect for this key.
    pub limit: u32,
    /// Remaining quota in the current window.
    pub remaining: u32,
    /// Unix second at which the quota resets.
    pub reset_unix: u64,
    /// Seconds to wait before retrying, on deny.
    pub retry_after_secs: Option<u64>,
}

/// A per-tenant and/or per-endpoint limit override.
///
/// Resolution order: tenant+endpoint > tenant > endpoint > default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOverride {
    /// Tenant the override applies to (`None` = any tenant).
    pub tenant: Option<String>,
    /// Endpoint class the override applies to (`None` = any endpoint).
    pub endpoint: Option<String>,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Bucket capacity for token-bucket mode.
    pub burst_size: Option<u32>,
}

/// Settings for a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct LimiterSettings {
    /// Selected algorithm.
    pub algorithm: RateLimitAlgorithm,
    /// Window length.
    pub window: Duration,
    /// Default requests per window.
    pub max_requests: u32,
    /// Default bucket capacity.
    pub burst_size: u32,
    /// Behavior when the cache is unreachable.
    pub degradation: DegradationPolicy,
}

impl From<&af_config::RateLimitConfig> for LimiterSettings {
    fn from(cfg: &af_config::RateLimitConfig) -> Self {
        Self {
            algorithm: cfg.algorithm,
            window: cfg.window,
            max_requests: cfg.max_requests,
            burst_size: cfg.burst_size,
            degradation: cfg.degradation,
        }
    }
}

/// The distributed rate limiter of the admission pipeline.
pub struct RateLimiter {
    cache: std::sync::Arc<dyn RateCache>,
    settings: LimiterSettings,
    overrides: Vec<LimitOverride>,
}

impl RateLimiter {
    /// Create a limiter over the given cache.
    pub fn new(cache: std::sync::Arc<dyn RateCache>, settings: LimiterSettings) -> Self {
        Self {
            cache,
            settings,
            overrides: Vec::new(),
        }
    }

    /// Install limit overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<LimitOverride>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve the effective `(max_requests, burst_size)` for a key.
    #[must_use]
    pub fn resolve_limit(&self, tenant: &str, endpoint: &str) -> (u32, u32) {
        let matches = |o: &&LimitOverride, want_tenant: bool, want_endpoint: bool| {
            o.tenant.is_some() == want_tenant
                && o.endpoint.is_some() == want_endpoint
                && o.tenant.as_deref().is_none_or(|t| t == tenant)
                && o.endpoint.as_deref().is_none_or(|e| e == endpoint)
        };
        // tenant+endpoint > tenant > endpoint > default
        for (want_tenant, want_endpoint) in [(true, true), (true, false), (false, true)] {
            if let Some(o) = self
                .overrides
                .iter()
                .find(|o| matches(o, want_tenant, want_endpoint))
            {
                return (o.max_requests, o.burst_size.unwrap_or(self.settings.burst_size));
            }
        }
        (self.settings.max_requests, self.settings.burst_size)
    }

    /// Check one request. `mutating` selects the degradation branch when
    /// the cache is down.
    pub async fn check(
        &self,
        tenant: &str,
        endpoint: &str,
        user: Option<&str>,
        mutating: bool,
    ) -> Decision {
        let (limit, burst) = self.resolve_limit(tenant, endpoint);
        let key = match user {
            Some(user) => format!("{tenant}:{endpoint}:{user}"),
            None => format!("{tenant}:{endpoint}"),
        };

        let result = match self.settings.algorithm {
            RateLimitAlgorithm::SlidingWindow => self
                .cache
                .window_incr(&key, self.settings.window)
                .await
                .map(|sample| {
                    let allowed = sample.count <= u64::from(limit);
                    let remaining = u64::from(limit).saturating_sub(sample.count) as u32;
                    Decision {
                        allowed,
                        limit,
                        remaining,
                        reset_unix: sample.reset_unix,
                        retry_after_secs: (!allowed).then(|| {
                            sample
                                .reset_unix
                                .saturating_sub(unix_now_f64() as u64)
                                .max(1)
                        }),
                    }
                }),
            RateLimitAlgorithm::TokenBucket => {
                let refill = f64::from(limit) / self.settings.window.as_secs_f64();
                self.cache
                    .bucket_take(&key, burst, refill)
                    .await
                    .map(|sample| Decision {
                        allowed: sample.granted,
                        limit: burst,
                        remaining: sample.remaining.min(u64::from(burst)) as u32,
                        reset_unix: sample.reset_unix,
                        retry_after_secs: (!sample.granted).then(|| {
                            sample
                                .reset_unix
                                .saturating_sub(unix_now_f64() as u64)
                                .max(1)
                        }),
                    })
            }
        };

        match result {
            Ok(decision) => decision,
            Err(CacheError::Unavailable { reason }) => {
                tracing::warn!(%reason, mutating, "rate-limit cache unreachable; degrading");
                self.degraded(limit, mutating)
            }
        }
    }

    fn degraded(&self, limit: u32, mutating: bool) -> Decision {
        let fail_open = match self.settings.degradation {
            DegradationPolicy::AlwaysOpen => true,
            DegradationPolicy::AlwaysClosed => false,
            DegradationPolicy::ReadOpenWriteClosed => !mutating,
        };
        let window = self.settings.window.as_secs();
        let reset = unix_now_f64() as u64 + window;
        if fail_open {
            Decision {
                allowed: true,
                limit,
                remaining: limit.saturating_sub(1),
                reset_unix: reset,
                retry_after_secs: None,
            }
        } else {
            Decision {
                allowed: false,
                limit,
                remaining: 0,
                reset_unix: reset,
                retry_after_secs: Some(window.max(1)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
