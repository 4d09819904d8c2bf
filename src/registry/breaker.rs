//! Per-engine circuit breaker.
//!
//! Closed is the normal state; Open refuses dispatch. There is no stored
//! half-open state: an open circuit is probed lazily when availability is
//! next queried after the cooldown, never by a background timer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 3,
            cooldown: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Default)]
struct EngineHealth {
    consecutive_failures: u32,
    consecutive_successes: u32,
    circuit_open: bool,
    last_failure: Option<Instant>,
}

/// Read-only view of one engine's health for introspection endpoints.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct HealthSnapshot {
    pub consecutive_failures: u32,
    pub circuit_open: bool,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    health: Mutex<HashMap<String, EngineHealth>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Record a dispatch failure. Opens the circuit once the consecutive
    /// failure count reaches the threshold.
    pub fn record_failure(&self, engine: &str) {
        if !self.config.enabled {
            return;
        }
        let mut health = self.health.lock().expect("breaker lock poisoned");
        let entry = health.entry(engine.to_string()).or_default();
        entry.consecutive_failures += 1;
        entry.consecutive_successes = 0;
        entry.last_failure = Some(Instant::now());
        if entry.consecutive_failures >= self.config.failure_threshold && !entry.circuit_open {
            entry.circuit_open = true;
            tracing::warn!(
                engine = engine,
                failures = entry.consecutive_failures,
                "circuit opened, dispatch to engine suspended"
            );
        }
    }

    /// Record a successful dispatch. Enough consecutive successes clear the
    /// failure count, but never close an open circuit before its cooldown.
    pub fn record_success(&self, engine: &str) {
        if !self.config.enabled {
            return;
        }
        let mut health = self.health.lock().expect("breaker lock poisoned");
        let entry = health.entry(engine.to_string()).or_default();
        entry.consecutive_successes += 1;
        if entry.consecutive_successes >= self.config.success_threshold {
            entry.consecutive_failures = 0;
        }
    }

    /// Whether dispatch to the engine is currently allowed. Probes an open
    /// circuit closed once the cooldown since the last failure has elapsed.
    pub fn is_available(&self, engine: &str) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut health = self.health.lock().expect("breaker lock poisoned");
        let Some(entry) = health.get_mut(engine) else {
            return true;
        };
        if !entry.circuit_open {
            return true;
        }
        let cooled_down = entry
            .last_failure
            .is_some_and(|at| at.elapsed() > self.config.cooldown);
        if cooled_down {
            entry.circuit_open = false;
            entry.consecutive_failures = 0;
            tracing::info!(engine = engine, "circuit closed after cooldown");
            return true;
        }
        false
    }

    pub fn snapshot(&self, engine: &str) -> Option<HealthSnapshot> {
        let health = self.health.lock().expect("breaker lock poisoned");
        health.get(engine).map(|h| HealthSnapshot {
            consecutive_failures: h.consecutive_failures,
            circuit_open: h.circuit_open,
        })
    }

    #[cfg(test)]
    fn backdate_last_failure(&self, engine: &str, age: Duration) {
        let mut health = self.health.lock().expect("breaker lock poisoned");
        if let Some(entry) = health.get_mut(engine) {
            entry.last_failure = Instant::now().checked_sub(age);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            enabled: true,
            failure_threshold,
            success_threshold: 3,
            cooldown,
        })
    }

    #[test]
    fn opens_after_exactly_threshold_failures() {
        let breaker = breaker(5, Duration::from_secs(300));
        for _ in 0..4 {
            breaker.record_failure("x");
            assert!(breaker.is_available("x"));
        }
        breaker.record_failure("x");
        assert!(!breaker.is_available("x"));
        assert!(breaker.snapshot("x").unwrap().circuit_open);
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let breaker = breaker(3, Duration::from_secs(300));
        breaker.record_failure("x");
        breaker.record_failure("x");
        for _ in 0..3 {
            breaker.record_success("x");
        }
        assert_eq!(breaker.snapshot("x").unwrap().consecutive_failures, 0);
        // Two fresh failures stay under the threshold again.
        breaker.record_failure("x");
        breaker.record_failure("x");
        assert!(breaker.is_available("x"));
    }

    #[test]
    fn success_does_not_close_an_open_circuit_before_cooldown() {
        let breaker = breaker(2, Duration::from_secs(300));
        breaker.record_failure("x");
        breaker.record_failure("x");
        assert!(!breaker.is_available("x"));
        for _ in 0..5 {
            breaker.record_success("x");
        }
        assert!(!breaker.is_available("x"));
    }

    #[test]
    fn cooldown_probe_closes_the_circuit_lazily() {
        let cooldown = Duration::from_secs(300);
        let breaker = breaker(1, cooldown);
        breaker.record_failure("x");
        assert!(!breaker.is_available("x"));

        // Just short of the cooldown: still refused.
        breaker.backdate_last_failure("x", cooldown - Duration::from_secs(1));
        assert!(!breaker.is_available("x"));

        // Past the cooldown: first query closes the circuit and resets.
        breaker.backdate_last_failure("x", cooldown + Duration::from_secs(1));
        assert!(breaker.is_available("x"));
        let snap = breaker.snapshot("x").unwrap();
        assert!(!snap.circuit_open);
        assert_eq!(snap.consecutive_failures, 0);
    }

    #[test]
    fn disabled_breaker_never_refuses() {
        let breaker = CircuitBreaker::new(BreakerConfig {
            enabled: false,
            ..BreakerConfig::default()
        });
        for _ in 0..20 {
            breaker.record_failure("x");
        }
        assert!(breaker.is_available("x"));
    }

    #[test]
    fn engines_are_tracked_independently() {
        let breaker = breaker(1, Duration::from_secs(300));
        breaker.record_failure("flaky");
        assert!(!breaker.is_available("flaky"));
        assert!(breaker.is_available("steady"));
    }
}
