#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use listing_tracker::scheduler::Clock;
use listing_tracker::source::{SampleSource, SourceError};

/// One scripted answer to `fetch_count`.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Count(u64),
    Fail,
}

/// Sample source driven entirely by the test.
///
/// Count answers are scripted per query string; once a script runs dry the
/// fallback count is returned. Every call can be delayed, and top-items calls
/// can be held back until [`ScriptedSource::release_top`] is called.
#[derive(Default)]
pub struct ScriptedSource {
    counts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: u64,
    delay: Duration,
    top: Mutex<HashMap<String, Vec<String>>>,
    top_fails: bool,
    top_gate: Option<Arc<Semaphore>>,
    pub count_starts: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub top_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            fallback: 1,
            ..Self::default()
        }
    }

    pub fn script(self, query: &str, steps: &[Step]) -> Self {
        self.counts
            .lock()
            .insert(query.to_string(), steps.iter().copied().collect());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_top(self, query: &str, items: &[&str]) -> Self {
        self.top
            .lock()
            .insert(query.to_string(), items.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn failing_top(mut self) -> Self {
        self.top_fails = true;
        self
    }

    pub fn gated_top(mut self) -> Self {
        self.top_gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release_top(&self) {
        if let Some(gate) = &self.top_gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }
}

#[async_trait]
impl SampleSource for ScriptedSource {
    async fn fetch_count(&self, _region: &str, query: &str) -> Result<u64, SourceError> {
        self.count_starts.lock().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let step = self
            .counts
            .lock()
            .get_mut(query)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Count(self.fallback));
        match step {
            Step::Count(n) => Ok(n),
            Step::Fail => Err(SourceError::Unparsable("scripted failure".into())),
        }
    }

    async fn fetch_top_items(&self, _region: &str, query: &str) -> Result<Vec<String>, SourceError> {
        self.top_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.top_gate {
            let _pass = gate.acquire().await;
        }
        if self.top_fails {
            return Err(SourceError::Status(503));
        }
        Ok(self.top.lock().get(query).cloned().unwrap_or_default())
    }
}

/// Clock whose reading is set by the test.
pub struct ManualClock(Mutex<f64>);

impl ManualClock {
    pub fn new(start: f64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(start)))
    }

    pub fn set(&self, t: f64) {
        *self.0.lock() = t;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.0.lock()
    }
}

/// Polls `check` until it holds or about a second has passed.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
