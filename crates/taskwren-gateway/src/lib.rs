//! Entry point between channels and the dispatch core.
//!
//! Applies a per-user token-bucket rate limit, publishes lifecycle events on
//! the bus, and hands the message to the orchestrator. Refused turns get a
//! polite reply instead of an error so the transport never has to special-
//! case them.

use std::collections::HashMap;
use std::sync::Arc;

use taskwren_bus::BusPublisher;
use taskwren_core::Orchestrator;
use taskwren_schema::{BusMessage, InboundMessage, OutboundMessage, UserId};
use tokio::sync::Mutex;

const RATE_LIMIT_REPLY: &str =
    "You're sending messages faster than I can handle. Give me a moment and try again.";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            burst: 10,
        }
    }
}

struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: chrono::DateTime<chrono::Utc>,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            tokens: config.burst as f64,
            max_tokens: config.burst as f64,
            refill_rate: config.requests_per_minute as f64 / 60.0,
            last_refill: chrono::Utc::now(),
        }
    }

    fn try_consume(&mut self) -> bool {
        let now = chrono::Utc::now();
        let elapsed = (now - self.last_refill).num_milliseconds() as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    buckets: Mutex<HashMap<UserId, TokenBucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub async fn check(&self, user: UserId) -> bool {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets
            .entry(user)
            .or_insert_with(|| TokenBucket::new(&self.config));
        bucket.try_consume()
    }
}

pub struct Gateway {
    orchestrator: Arc<Orchestrator>,
    bus: BusPublisher,
    rate_limiter: RateLimiter,
}

impl Gateway {
    pub fn new(orchestrator: Arc<Orchestrator>, bus: BusPublisher, rate_limiter: RateLimiter) -> Self {
        Self {
            orchestrator,
            bus,
            rate_limiter,
        }
    }

    pub async fn handle_inbound(&self, inbound: InboundMessage) -> OutboundMessage {
        if !self.rate_limiter.check(inbound.user).await {
            tracing::warn!(user = %inbound.user, "rate limited");
            return OutboundMessage::reply_to(&inbound, RATE_LIMIT_REPLY);
        }

        let _ = self
            .bus
            .publish(BusMessage::InboundReceived {
                inbound: inbound.clone(),
            })
            .await;
        let _ = self
            .bus
            .publish(BusMessage::MessageAccepted {
                trace_id: inbound.trace_id,
            })
            .await;

        self.orchestrator.handle_inbound(inbound).await
    }

    /// Reset the user's conversation (the `/start` path).
    pub async fn reset(&self, user: UserId) -> bool {
        self.orchestrator.reset_session(user).await
    }
}
