#![allow(dead_code)]

use std::collections::HashMap;
use std::future::pending;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use db_health_check::config::{Config, Settings};
use db_health_check::probe::{ProbeClient, ProbeOutcome};
use envconfig::Envconfig;

/// Fake backing store. Tracks how many executions overlap, can be toggled up and down, and can
/// be made to hang forever.
#[derive(Default)]
pub struct FakeProbe {
    up: AtomicBool,
    delay: Duration,
    hang: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    executions: AtomicUsize,
    pings: AtomicUsize,
    closed: AtomicBool,
}

impl FakeProbe {
    pub fn instant() -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(true),
            ..Default::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(true),
            delay,
            ..Default::default()
        })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Default::default()
        })
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProbeClient for FakeProbe {
    async fn execute(&self) -> ProbeOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.hang {
            pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.executions.fetch_add(1, Ordering::SeqCst);

        if self.up.load(Ordering::SeqCst) {
            ProbeOutcome::succeeded(Some("result: 1".to_owned()))
        } else {
            ProbeOutcome::failed("database unreachable")
        }
    }

    async fn ping(&self, timeout: Duration) -> bool {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            // A real client gives up when its timeout runs out.
            tokio::time::sleep(timeout).await;
            return false;
        }
        self.up.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Validated settings bound to ephemeral localhost ports, with the given overrides applied on
/// top of the environment defaults.
pub fn test_settings(overrides: &[(&str, &str)]) -> Settings {
    let mut env: HashMap<String, String> = [
        ("BIND_HOST", "127.0.0.1"),
        ("HEALTH_PORT", "0"),
        ("METRICS_PORT", "0"),
        ("READINESS_TIMEOUT_SECS", "1"),
        ("SHUTDOWN_GRACE_SECS", "1"),
        ("LISTENER_DRAIN_SECS", "1"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        env.insert(k.to_string(), v.to_string());
    }

    Config::init_from_hashmap(&env)
        .expect("test config should parse")
        .validate()
        .expect("test config should validate")
}

/// Poll `check` every few milliseconds until it holds or `within` elapses.
pub async fn eventually(within: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
