//! C1: Rate Limiter.
//!
//! Bounds two independent quantities: the number of concurrent in-flight
//! provider requests across the whole process, and the per-provider
//! requests-per-minute rate. Concurrency is a counting semaphore; rate is a
//! token bucket per provider tag, falling back to the global bucket when a
//! provider has no specific RPM configured.

use shared::ProviderId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Configuration for the rate limiter. `0` means unlimited for either cap.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub global_concurrency: u32,
    pub global_rpm: u32,
    pub per_provider_rpm: HashMap<ProviderId, u32>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 0,
            global_rpm: 0,
            per_provider_rpm: HashMap::new(),
        }
    }
}

/// Signals that the caller's context was cancelled while waiting for
/// admission. This is the only error `acquire` ever returns.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("rate limiter acquire cancelled")]
pub struct AcquireCancelled;

/// A held admission ticket. Dropping it releases the concurrency slot; the
/// rate-limit token is never released (it is time-based and simply expires
/// from the bucket's perspective by having already been spent).
pub struct RateLimitTicket {
    _permit: Option<OwnedSemaphorePermit>,
}

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Capacity equals the configured RPM itself, so a run can burst up to
    /// the full per-minute allowance immediately and then settles into the
    /// steady refill rate: a 60s window never exceeds RPM by more than one
    /// token.
    fn new(rpm: u32) -> Self {
        let capacity = (rpm as f64).max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: rpm as f64 / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempt to consume one token. Returns `None` on success, or
    /// `Some(wait)` with the minimum time until a token will be available.
    fn try_consume(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_secs = if self.refill_per_sec > 0.0 {
                deficit / self.refill_per_sec
            } else {
                0.0
            };
            Some(Duration::from_secs_f64(wait_secs.max(0.0)))
        }
    }
}

pub struct RateLimiter {
    concurrency: Option<Arc<Semaphore>>,
    global_bucket: Option<Arc<Mutex<TokenBucket>>>,
    per_provider: HashMap<ProviderId, Arc<Mutex<TokenBucket>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        let concurrency = if config.global_concurrency == 0 {
            None
        } else {
            Some(Arc::new(Semaphore::new(config.global_concurrency as usize)))
        };

        let global_bucket = if config.global_rpm == 0 {
            None
        } else {
            Some(Arc::new(Mutex::new(TokenBucket::new(config.global_rpm))))
        };

        let per_provider = config
            .per_provider_rpm
            .into_iter()
            .filter(|(_, rpm)| *rpm > 0)
            .map(|(provider, rpm)| (provider, Arc::new(Mutex::new(TokenBucket::new(rpm)))))
            .collect();

        Self {
            concurrency,
            global_bucket,
            per_provider,
        }
    }

    fn bucket_for(&self, provider: ProviderId) -> Option<Arc<Mutex<TokenBucket>>> {
        self.per_provider
            .get(&provider)
            .cloned()
            .or_else(|| self.global_bucket.clone())
    }

    /// Block until both a global concurrency slot and a per-provider rate
    /// token are available, or until `cancel` fires. Acquisition order is
    /// fixed: concurrency slot first (cheap), then the rate token (may
    /// block) — this ordering is also what makes deadlock impossible, since
    /// every caller acquires the two locks in the same order.
    pub async fn acquire(
        &self,
        provider: ProviderId,
        cancel: &CancellationToken,
    ) -> Result<RateLimitTicket, AcquireCancelled> {
        let permit = match &self.concurrency {
            None => None,
            Some(sem) => {
                let sem = sem.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AcquireCancelled),
                    res = sem.acquire_owned() => Some(res.expect("semaphore never closed")),
                }
            }
        };

        if let Some(bucket) = self.bucket_for(provider) {
            loop {
                let wait = { bucket.lock().await.try_consume() };
                match wait {
                    None => break,
                    Some(duration) => {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                // release the concurrency slot before returning
                                drop(permit);
                                return Err(AcquireCancelled);
                            }
                            _ = tokio::time::sleep(duration) => {}
                        }
                    }
                }
            }
        }

        Ok(RateLimitTicket { _permit: permit })
    }
}
