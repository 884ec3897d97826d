use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use vista_core::models::JobKind;

#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let tokens_to_add = elapsed * self.refill_rate;

        self.tokens = (self.tokens + tokens_to_add).min(self.capacity);
        self.last_refill = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_next_token(&self) -> Duration {
        if self.tokens >= 1.0 {
            Duration::from_secs(0)
        } else {
            let tokens_needed = 1.0 - self.tokens;
            let seconds = tokens_needed / self.refill_rate;
            Duration::from_secs_f64(seconds.max(0.0))
        }
    }
}

/// Sharded token-bucket rate limiter keyed by job kind.
///
/// Kinds without a configured rate are never throttled. Each bucket holds up
/// to two seconds worth of tokens, so short bursts pass without waiting.
#[derive(Clone)]
pub struct RateLimiter {
    shards: Vec<Arc<Mutex<HashMap<JobKind, TokenBucket>>>>,
    shard_count: usize,
    rates: Arc<HashMap<JobKind, f64>>,
}

impl RateLimiter {
    fn shard_index(&self, kind: &JobKind) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        kind.hash(&mut hasher);
        (hasher.finish() as usize) % self.shard_count
    }

    /// Limit the embedding kinds (`embed_media`, `embed_text`) to
    /// `embedding_rate` jobs per second (default 16 shards).
    pub fn new(embedding_rate: f64) -> Self {
        Self::with_rates(
            [
                (JobKind::EmbedMedia, embedding_rate),
                (JobKind::EmbedText, embedding_rate),
            ],
            16,
        )
    }

    /// Create a rate limiter with explicit per-kind rates and shard count.
    /// Non-positive rates are ignored.
    pub fn with_rates(rates: impl IntoIterator<Item = (JobKind, f64)>, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let shards = (0..shard_count)
            .map(|_| Arc::new(Mutex::new(HashMap::new())))
            .collect();
        let rates = rates.into_iter().filter(|(_, rate)| *rate > 0.0).collect();
        Self {
            shards,
            shard_count,
            rates: Arc::new(rates),
        }
    }

    /// A limiter that never throttles.
    pub fn unlimited() -> Self {
        Self::with_rates(std::iter::empty(), 1)
    }

    pub fn is_limited(&self, kind: &JobKind) -> bool {
        self.rates.contains_key(kind)
    }

    fn initial_bucket(rate: f64) -> TokenBucket {
        TokenBucket::new(rate * 2.0, rate)
    }

    /// Acquire a token for the given kind, waiting until one is available
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self, kind: &JobKind) {
        let Some(&rate) = self.rates.get(kind) else {
            return;
        };

        loop {
            let wait_duration = {
                let shard = &self.shards[self.shard_index(kind)];
                let mut buckets = shard.lock().await;
                let bucket = buckets
                    .entry(*kind)
                    .or_insert_with(|| Self::initial_bucket(rate));

                if bucket.try_acquire() {
                    tracing::trace!(
                        job.kind = %kind,
                        tokens_remaining = bucket.tokens,
                        "Rate limit token acquired"
                    );
                    return;
                }

                bucket.time_until_next_token()
            };

            if wait_duration > Duration::from_secs(0) {
                tracing::debug!(
                    job.kind = %kind,
                    wait_ms = wait_duration.as_millis(),
                    "Rate limit reached, waiting for token"
                );
                tokio::time::sleep(wait_duration).await;
            }
        }
    }

    /// Try to acquire a token without waiting
    #[tracing::instrument(skip(self))]
    pub async fn try_acquire(&self, kind: &JobKind) -> bool {
        let Some(&rate) = self.rates.get(kind) else {
            return true;
        };

        let shard = &self.shards[self.shard_index(kind)];
        let mut buckets = shard.lock().await;
        let bucket = buckets
            .entry(*kind)
            .or_insert_with(|| Self::initial_bucket(rate));

        bucket.try_acquire()
    }

    /// Current number of available tokens, or `None` for unthrottled kinds.
    pub async fn available_tokens(&self, kind: &JobKind) -> Option<f64> {
        let &rate = self.rates.get(kind)?;

        let shard = &self.shards[self.shard_index(kind)];
        let mut buckets = shard.lock().await;
        let bucket = buckets
            .entry(*kind)
            .or_insert_with(|| Self::initial_bucket(rate));

        bucket.refill();
        Some(bucket.tokens)
    }
}
