use parking_lot::Mutex;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use crate::error::ServiceError;

const WINDOW: Duration = Duration::from_secs(60);
/// How often the server sweeps expired buckets.
pub const PURGE_INTERVAL: Duration = WINDOW;
/// Bucket count above which expired windows are swept on the next check.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// Fixed one-minute window counter per client key.
pub struct RateLimiter {
    per_minute: u32,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: &str) -> Result<(), ServiceError> {
        self.check_at(client, Instant::now())
    }

    pub fn check_at(&self, client: &str, now: Instant) -> Result<(), ServiceError> {
        let mut buckets = self.buckets.lock();
        if buckets.len() > SWEEP_THRESHOLD {
            drop_expired(&mut buckets, now);
        }

        let bucket = buckets.entry(client.to_string()).or_insert(Bucket {
            count: 0,
            reset_at: now + WINDOW,
        });
        if now > bucket.reset_at {
            *bucket = Bucket {
                count: 0,
                reset_at: now + WINDOW,
            };
        }
        bucket.count += 1;

        if bucket.count > self.per_minute {
            let retry_after_secs = bucket.reset_at.saturating_duration_since(now).as_secs().max(1);
            tracing::warn!("rate limit hit for {} ({} req)", client, bucket.count);
            return Err(ServiceError::RateLimited { retry_after_secs });
        }
        Ok(())
    }

    /// Drops buckets whose window has elapsed. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        drop_expired(&mut self.buckets.lock(), now)
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().len()
    }
}

fn drop_expired(buckets: &mut HashMap<String, Bucket>, now: Instant) -> usize {
    let before = buckets.len();
    buckets.retain(|_, b| now <= b.reset_at);
    before - buckets.len()
}
