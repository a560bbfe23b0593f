//! Resilience primitives shared by the enrichment and dispatch stages.
//!
//! Each primitive is an explicit value owned by the stage that uses it and
//! shared through `Arc`; none of them is looked up globally.

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{IntervalRateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, RetryPolicy};
