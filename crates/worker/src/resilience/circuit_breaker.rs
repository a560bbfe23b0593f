//! Count-based circuit breaker.
//!
//! Closed: outcomes go into a sliding window of the last
//! `sliding_window_size` calls. Once `minimum_number_of_calls` are recorded
//! and the failure rate reaches `failure_rate_threshold` percent, the
//! breaker opens.
//!
//! Open: every call is rejected with `CircuitOpen` until
//! `wait_duration_in_open_ms` has elapsed.
//!
//! HalfOpen: up to `permitted_calls_in_half_open` trial calls are let
//! through. When all trials have reported, the breaker closes (window
//! cleared) if their failure rate is below the threshold, otherwise it
//! opens again.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use processor_core::{Error, Result};
use serde::{Deserialize, Serialize};
use telemetry::ComponentHealth;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure percentage at or above which the breaker opens
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// Number of most recent calls considered while closed
    #[serde(default = "default_sliding_window_size")]
    pub sliding_window_size: usize,
    /// Calls required in the window before the rate is evaluated
    #[serde(default = "default_minimum_number_of_calls")]
    pub minimum_number_of_calls: usize,
    /// How long the breaker rejects calls once open
    #[serde(default = "default_wait_duration_in_open_ms")]
    pub wait_duration_in_open_ms: u64,
    /// Trial calls allowed while half-open
    #[serde(default = "default_permitted_calls_in_half_open")]
    pub permitted_calls_in_half_open: usize,
}

fn default_failure_rate_threshold() -> f64 {
    50.0
}

fn default_sliding_window_size() -> usize {
    10
}

fn default_minimum_number_of_calls() -> usize {
    5
}

fn default_wait_duration_in_open_ms() -> u64 {
    30_000
}

fn default_permitted_calls_in_half_open() -> usize {
    1
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: default_failure_rate_threshold(),
            sliding_window_size: default_sliding_window_size(),
            minimum_number_of_calls: default_minimum_number_of_calls(),
            wait_duration_in_open_ms: default_wait_duration_in_open_ms(),
            permitted_calls_in_half_open: default_permitted_calls_in_half_open(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn wait_duration_in_open(&self) -> Duration {
        Duration::from_millis(self.wait_duration_in_open_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(Error::config(
                "circuit_breaker.failure_rate_threshold must be in (0, 100]",
            ));
        }
        if self.sliding_window_size == 0 || self.permitted_calls_in_half_open == 0 {
            return Err(Error::config(
                "circuit_breaker window and half-open call counts must be positive",
            ));
        }
        if self.minimum_number_of_calls > self.sliding_window_size {
            return Err(Error::config(
                "circuit_breaker.minimum_number_of_calls exceeds sliding_window_size",
            ));
        }
        Ok(())
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed,
    Open {
        until: Instant,
    },
    HalfOpen {
        issued: usize,
        successes: usize,
        failures: usize,
    },
}

#[derive(Debug)]
struct Inner {
    state: State,
    /// Closed-state outcomes, `true` for a failure
    window: VecDeque<bool>,
    /// Bumped on every transition so late outcomes from an older state are ignored
    generation: u64,
}

/// A circuit breaker guarding one downstream dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    health: Option<&'static ComponentHealth>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = VecDeque::with_capacity(config.sliding_window_size);
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                window,
                generation: 0,
            }),
            health: None,
        }
    }

    /// Mirrors open/closed transitions onto a health registry entry.
    pub fn with_health(mut self, health: &'static ComponentHealth) -> Self {
        health.set_healthy();
        self.health = Some(health);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        match self.inner.lock().state {
            State::Closed => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Asks to make one call.
    ///
    /// Fails with `CircuitOpen` without touching the dependency when the
    /// breaker is open or all half-open trial slots are taken.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let State::Open { until } = inner.state {
            if Instant::now() < until {
                return Err(Error::circuit_open(&self.name));
            }
            self.transition(
                inner,
                State::HalfOpen {
                    issued: 0,
                    successes: 0,
                    failures: 0,
                },
            );
        }

        if let State::HalfOpen { issued, .. } = &mut inner.state {
            if *issued >= self.config.permitted_calls_in_half_open {
                return Err(Error::circuit_open(&self.name));
            }
            *issued += 1;
        }

        Ok(CallPermit {
            breaker: self,
            generation: inner.generation,
            reported: false,
        })
    }

    fn on_outcome(&self, generation: u64, failed: bool) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if inner.generation != generation {
            return;
        }

        let next = match &mut inner.state {
            State::Closed => {
                if inner.window.len() == self.config.sliding_window_size {
                    inner.window.pop_front();
                }
                inner.window.push_back(failed);

                let calls = inner.window.len();
                let failures = inner.window.iter().filter(|f| **f).count();
                let trips = calls >= self.config.minimum_number_of_calls
                    && self.exceeds_threshold(failures, calls);
                trips.then_some(CircuitState::Open)
            }
            State::HalfOpen {
                successes,
                failures,
                ..
            } => {
                if failed {
                    *failures += 1;
                } else {
                    *successes += 1;
                }
                let done = *successes + *failures;

                if done < self.config.permitted_calls_in_half_open {
                    None
                } else if self.exceeds_threshold(*failures, done) {
                    Some(CircuitState::Open)
                } else {
                    Some(CircuitState::Closed)
                }
            }
            State::Open { .. } => None,
        };

        match next {
            Some(CircuitState::Open) => self.open(inner),
            Some(CircuitState::Closed) => {
                inner.window.clear();
                self.transition(inner, State::Closed);
            }
            _ => {}
        }
    }

    fn on_abandon(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        if let State::HalfOpen { issued, .. } = &mut inner.state {
            *issued = issued.saturating_sub(1);
        }
    }

    fn exceeds_threshold(&self, failures: usize, calls: usize) -> bool {
        calls > 0 && (failures as f64 * 100.0 / calls as f64) >= self.config.failure_rate_threshold
    }

    fn open(&self, inner: &mut Inner) {
        let until = Instant::now() + self.config.wait_duration_in_open();
        self.transition(inner, State::Open { until });
    }

    fn transition(&self, inner: &mut Inner, next: State) {
        inner.generation += 1;
        match next {
            State::Open { .. } => {
                warn!(
                    breaker = %self.name,
                    wait_ms = self.config.wait_duration_in_open_ms,
                    "Circuit breaker opened"
                );
                if let Some(health) = self.health {
                    health.set_unhealthy(format!("circuit breaker '{}' is open", self.name));
                }
            }
            State::HalfOpen { .. } => {
                info!(breaker = %self.name, "Circuit breaker half-open, permitting trial calls");
            }
            State::Closed => {
                info!(breaker = %self.name, "Circuit breaker closed");
                if let Some(health) = self.health {
                    health.set_healthy();
                }
            }
        }
        inner.state = next;
    }
}

/// Permission for one call through a breaker.
///
/// Report the outcome with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping the permit without
/// reporting leaves the breaker statistics untouched and frees a half-open
/// trial slot.
#[must_use = "report the call outcome on the permit"]
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    reported: bool,
}

impl CallPermit<'_> {
    pub fn record_success(mut self) {
        self.reported = true;
        self.breaker.on_outcome(self.generation, false);
    }

    pub fn record_failure(mut self) {
        self.reported = true;
        self.breaker.on_outcome(self.generation, true);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.on_abandon(self.generation);
        }
    }
}
