// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::api::{FetchError, RateSource};
use crate::models::RateTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Loading { generation: u64 },
}

#[derive(Debug)]
pub struct RefreshResult {
    pub generation: u64,
    pub outcome: Result<RateTable, FetchError>,
}

/// Runs at most one rate fetch at a time.
///
/// Starting a fetch aborts the one in flight; a result that still slips
/// through carries an old generation and is dropped by [`Refresher::accept`].
pub struct Refresher {
    source: Arc<dyn RateSource>,
    results: UnboundedSender<RefreshResult>,
    state: RefreshState,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Refresher {
    pub fn new(source: Arc<dyn RateSource>, results: UnboundedSender<RefreshResult>) -> Self {
        Self {
            source,
            results,
            state: RefreshState::Idle,
            generation: 0,
            task: None,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, RefreshState::Loading { .. })
    }

    pub fn start(&mut self) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(generation = self.generation, "cancelled in-flight refresh");
        }

        self.generation += 1;
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let results = self.results.clone();

        self.task = Some(tokio::spawn(async move {
            let outcome = source.fetch().await;
            // The receiver is gone only when the session is shutting down
            let _ = results.send(RefreshResult {
                generation,
                outcome,
            });
        }));
        self.state = RefreshState::Loading { generation };
        debug!(generation, "refresh started");

        generation
    }

    /// Returns the outcome of the current fetch, or `None` for a superseded one.
    pub fn accept(&mut self, result: RefreshResult) -> Option<Result<RateTable, FetchError>> {
        match self.state {
            RefreshState::Loading { generation } if generation == result.generation => {
                self.state = RefreshState::Idle;
                self.task = None;
                Some(result.outcome)
            }
            _ => {
                debug!(generation = result.generation, "discarded superseded refresh result");
                None
            }
        }
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// True when there is no table yet or it is older than `interval`.
pub fn is_stale(table: Option<&RateTable>, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
    match table {
        Some(table) => now - table.fetched_at() > interval,
        None => true,
    }
}

/// Trailing-edge debounce: fires once `window` has passed since the last poke.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn poke(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_table, Currency};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Answers call `n` after `delays[n]`, tagging the table date with the call index.
    struct ScriptedSource {
        calls: AtomicUsize,
        delays: Vec<Duration>,
        fail: Mutex<bool>,
    }

    impl ScriptedSource {
        fn new(delays: Vec<Duration>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delays,
                fail: Mutex::new(false),
            }
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        async fn fetch(&self) -> Result<RateTable, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.get(call).copied().unwrap_or_default();
            tokio::time::sleep(delay).await;

            if *self.fail.lock().unwrap() {
                let err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
                return Err(FetchError::Parse(err));
            }

            Ok(RateTable::new(
                "USD",
                format!("call-{}", call),
                Utc::now(),
                vec![Currency::new("EUR", "Euro", 0.9)],
            ))
        }
    }

    #[tokio::test]
    async fn test_new_refresh_supersedes_in_flight_one() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Arc::new(ScriptedSource::new(vec![
            Duration::from_millis(500),
            Duration::from_millis(10),
        ]));
        let mut refresher = Refresher::new(source.clone(), tx);

        let first = refresher.start();
        // Let the first fetch get under way before superseding it
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = refresher.start();
        assert!(second > first);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.state(), RefreshState::Loading { generation: second });

        let result = rx.recv().await.unwrap();
        assert_eq!(result.generation, second);

        let table = refresher.accept(result).unwrap().unwrap();
        assert_eq!(table.rate_date(), "call-1");
        assert!(!refresher.is_loading());

        // The aborted first fetch never reports back
        let late = tokio::time::timeout(Duration::from_millis(700), rx.recv()).await;
        assert!(late.is_err());
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let source = Arc::new(ScriptedSource::new(vec![Duration::from_secs(5); 2]));
        let mut refresher = Refresher::new(source, tx);

        let first = refresher.start();
        refresher.start();

        let stale = RefreshResult {
            generation: first,
            outcome: Ok(sample_table()),
        };
        assert!(refresher.accept(stale).is_none());
        assert!(refresher.is_loading());
    }

    #[tokio::test]
    async fn test_failure_is_delivered_and_ends_loading() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let source = Arc::new(ScriptedSource::new(vec![]));
        *source.fail.lock().unwrap() = true;
        let mut refresher = Refresher::new(source, tx);

        refresher.start();
        let result = rx.recv().await.unwrap();
        let outcome = refresher.accept(result).unwrap();

        assert!(matches!(outcome, Err(FetchError::Parse(_))));
        assert_eq!(refresher.state(), RefreshState::Idle);
    }

    #[test]
    fn test_is_stale() {
        let table = sample_table();
        let interval = chrono::Duration::seconds(3600);
        let fetched = table.fetched_at();

        assert!(is_stale(None, fetched, interval));
        assert!(!is_stale(Some(&table), fetched + chrono::Duration::seconds(60), interval));
        assert!(is_stale(Some(&table), fetched + chrono::Duration::seconds(3601), interval));
    }

    #[test]
    fn test_debouncer_fires_once_after_quiet_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();

        assert!(!debouncer.fire(start));

        debouncer.poke(start);
        debouncer.poke(start + Duration::from_millis(200));
        assert!(!debouncer.fire(start + Duration::from_millis(400)));
        assert!(debouncer.fire(start + Duration::from_millis(500)));
        assert!(!debouncer.fire(start + Duration::from_millis(900)));
        assert!(debouncer.deadline().is_none());
    }
}
