//! Engine configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::retry::{BackoffStrategy, RetryPolicy};

pub const CHECKOUT_MAX_RETRIES: &str = "RENTWISE_CHECKOUT_MAX_RETRIES";
pub const CHECKOUT_BASE_DELAY_MS: &str = "RENTWISE_CHECKOUT_BASE_DELAY_MS";
pub const CHECKOUT_MAX_DELAY_MS: &str = "RENTWISE_CHECKOUT_MAX_DELAY_MS";
pub const CHECKOUT_JITTER: &str = "RENTWISE_CHECKOUT_JITTER";
pub const PAYMENT_WORKER_TICK_MS: &str = "RENTWISE_PAYMENT_WORKER_TICK_MS";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Backoff applied when a checkout or a status write loses a version race.
    pub retry: RetryPolicy,
    /// How often the payment worker checks for shutdown while idle.
    pub payment_worker_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            payment_worker_tick: Duration::from_millis(250),
        }
    }
}

impl EngineConfig {
    /// Read `RENTWISE_*` variables; anything missing or unparsable keeps its default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_attempts = parse_or(&lookup, CHECKOUT_MAX_RETRIES, defaults.retry.max_attempts);
        let base_delay_ms = parse_or(
            &lookup,
            CHECKOUT_BASE_DELAY_MS,
            defaults.retry.base_delay.as_millis() as u64,
        );
        let max_delay_ms = parse_or(
            &lookup,
            CHECKOUT_MAX_DELAY_MS,
            defaults.retry.max_delay.as_millis() as u64,
        );
        let mut jitter = parse_or(&lookup, CHECKOUT_JITTER, defaults.retry.jitter);
        if !(0.0..=1.0).contains(&jitter) {
            tracing::warn!(
                key = CHECKOUT_JITTER,
                value = jitter,
                "jitter must be within 0.0-1.0, using default"
            );
            jitter = defaults.retry.jitter;
        }
        let tick_ms = parse_or(
            &lookup,
            PAYMENT_WORKER_TICK_MS,
            defaults.payment_worker_tick.as_millis() as u64,
        );

        Self {
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms.max(base_delay_ms)),
                strategy: BackoffStrategy::Exponential,
                jitter,
            },
            payment_worker_tick: Duration::from_millis(tick_ms.max(1)),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + core::fmt::Debug,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(
            key,
            value = %raw,
            default = ?default,
            "unparsable configuration value, using default"
        );
        default
    })
}
