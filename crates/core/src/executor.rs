use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;

use crate::fixtures::{FixtureStore, ResultSet};
use crate::history::{HistoryRecord, QueryHistory};

pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("Query cannot be empty")]
    EmptyQuery,
    #[error("Query ID is required")]
    MissingQueryId,
    #[error("No results found for this query")]
    NoResultsForQuery { query_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayStrategy {
    Random { min: Duration, max: Duration },
    Fixed(Duration),
}

impl Default for DelayStrategy {
    fn default() -> Self {
        Self::Random {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }
}

impl DelayStrategy {
    fn pick(self) -> Duration {
        match self {
            Self::Fixed(delay) => delay,
            Self::Random { min, max } => {
                let min_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
                let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                if max_ms <= min_ms {
                    return min;
                }
                Duration::from_millis(rand::thread_rng().gen_range(min_ms..max_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionTicket(u64);

impl ExecutionTicket {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct PendingExecution<C> {
    ticket: ExecutionTicket,
    query: String,
    query_id: String,
    tab_name: String,
    delay: Duration,
    due_at: Instant,
    completion: Option<C>,
}

#[derive(Debug)]
pub struct CompletedExecution<C> {
    pub ticket: ExecutionTicket,
    pub query_id: String,
    pub completion: Option<C>,
    pub outcome: Result<Arc<ResultSet>, ExecutionError>,
    pub execution_time: Option<String>,
}

impl<C> CompletedExecution<C> {
    #[must_use]
    pub fn rows(&self) -> Option<&Arc<ResultSet>> {
        self.outcome.as_ref().ok()
    }
}

#[derive(Debug)]
pub struct ExecutionSimulator<C> {
    fixtures: Arc<FixtureStore>,
    delay: DelayStrategy,
    next_ticket: u64,
    pending: Vec<PendingExecution<C>>,
    current_result: Option<Arc<ResultSet>>,
    execution_time: Option<String>,
    error: Option<ExecutionError>,
    history: QueryHistory,
}

impl<C> ExecutionSimulator<C> {
    #[must_use]
    pub fn new(fixtures: Arc<FixtureStore>, delay: DelayStrategy, history: QueryHistory) -> Self {
        Self {
            fixtures,
            delay,
            next_ticket: 0,
            pending: Vec::new(),
            current_result: None,
            execution_time: None,
            error: None,
            history,
        }
    }

    #[must_use]
    pub fn fixtures(&self) -> &Arc<FixtureStore> {
        &self.fixtures
    }

    pub fn set_delay_strategy(&mut self, delay: DelayStrategy) {
        self.delay = delay;
    }

    /// Blank text or a missing id fail immediately and schedule nothing.
    pub fn submit(
        &mut self,
        query: &str,
        query_id: Option<&str>,
        tab_name: &str,
        completion: Option<C>,
        now: Instant,
    ) -> Result<ExecutionTicket, ExecutionError> {
        self.error = None;

        if query.trim().is_empty() {
            return Err(self.fail(ExecutionError::EmptyQuery));
        }
        let Some(query_id) = query_id.filter(|id| !id.is_empty()) else {
            return Err(self.fail(ExecutionError::MissingQueryId));
        };

        self.next_ticket = self.next_ticket.saturating_add(1);
        let ticket = ExecutionTicket(self.next_ticket);
        let delay = self.delay.pick();
        tracing::debug!(
            ticket = ticket.get(),
            query_id,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling simulated execution"
        );
        self.pending.push(PendingExecution {
            ticket,
            query: query.to_string(),
            query_id: query_id.to_string(),
            tab_name: tab_name.to_string(),
            delay,
            due_at: now + delay,
            completion,
        });

        Ok(ticket)
    }

    fn fail(&mut self, error: ExecutionError) -> ExecutionError {
        tracing::debug!(%error, "rejected execution request");
        self.error = Some(error.clone());
        error
    }

    pub fn poll(&mut self, now: Instant) -> Vec<CompletedExecution<C>> {
        let (mut due, pending): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|execution| execution.due_at <= now);
        self.pending = pending;
        due.sort_by_key(|execution| (execution.due_at, execution.ticket));

        due.into_iter().map(|execution| self.finish(execution)).collect()
    }

    fn finish(&mut self, execution: PendingExecution<C>) -> CompletedExecution<C> {
        let rows = self
            .fixtures
            .results_for(&execution.query_id)
            .filter(|rows| !rows.is_empty());

        let Some(rows) = rows else {
            let error = ExecutionError::NoResultsForQuery {
                query_id: execution.query_id.clone(),
            };
            tracing::warn!(query_id = %execution.query_id, "simulated execution found no rows");
            self.error = Some(error.clone());
            self.current_result = None;
            return CompletedExecution {
                ticket: execution.ticket,
                query_id: execution.query_id,
                completion: execution.completion,
                outcome: Err(error),
                execution_time: None,
            };
        };

        let execution_time = format_execution_time(execution.delay);
        tracing::info!(
            query_id = %execution.query_id,
            rows = rows.len(),
            execution_time = %execution_time,
            "simulated execution completed"
        );
        self.current_result = Some(Arc::clone(&rows));
        self.execution_time = Some(execution_time.clone());
        self.history.record(HistoryRecord::new(
            execution.query,
            execution.query_id.clone(),
            execution.tab_name,
            execution_time.clone(),
            rows.len(),
        ));

        CompletedExecution {
            ticket: execution.ticket,
            query_id: execution.query_id,
            completion: execution.completion,
            outcome: Ok(rows),
            execution_time: Some(execution_time),
        }
    }

    pub fn cancel(&mut self, ticket: ExecutionTicket) -> bool {
        let original_len = self.pending.len();
        self.pending.retain(|execution| execution.ticket != ticket);
        self.pending.len() != original_len
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        if cancelled > 0 {
            tracing::debug!(cancelled, "cancelling pending executions");
        }
        self.pending.clear();
        cancelled
    }

    /// Keeps matching executions scheduled but strips their completion so the
    /// result is recorded without being delivered anywhere.
    pub fn detach_completions(&mut self, mut matches: impl FnMut(&C) -> bool) -> usize {
        let mut detached = 0;
        for execution in &mut self.pending {
            if execution.completion.as_ref().is_some_and(&mut matches) {
                execution.completion = None;
                detached += 1;
            }
        }
        detached
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|execution| execution.due_at).min()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn current_result(&self) -> Option<&Arc<ResultSet>> {
        self.current_result.as_ref()
    }

    #[must_use]
    pub fn execution_time(&self) -> Option<&str> {
        self.execution_time.as_deref()
    }

    #[must_use]
    pub fn error(&self) -> Option<&ExecutionError> {
        self.error.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &QueryHistory {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn clear_results(&mut self) {
        self.current_result = None;
        self.execution_time = None;
        self.error = None;
    }
}

#[must_use]
pub fn format_execution_time(delay: Duration) -> String {
    format!("{:.3}s", delay.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::{format_execution_time, DelayStrategy, ExecutionError, ExecutionSimulator};
    use crate::fixtures::{FixtureStore, PredefinedQuery, ResultSet};
    use crate::history::QueryHistory;

    const DELAY: Duration = Duration::from_millis(300);

    fn simulator() -> ExecutionSimulator<&'static str> {
        let mut fixtures = FixtureStore::builtin().expect("fixtures");
        fixtures.insert(
            PredefinedQuery {
                id: "empty".to_string(),
                name: "Nothing".to_string(),
                description: String::new(),
                query: "SELECT * FROM void;".to_string(),
                execution_time: None,
            },
            ResultSet::empty(),
        );
        ExecutionSimulator::new(
            Arc::new(fixtures),
            DelayStrategy::Fixed(DELAY),
            QueryHistory::default(),
        )
    }

    #[test]
    fn blank_query_or_missing_id_fail_fast() {
        let mut simulator = simulator();
        let now = Instant::now();

        let err = simulator
            .submit("   ", Some("q1"), "New Query", None, now)
            .expect_err("blank text should fail");
        assert_eq!(err, ExecutionError::EmptyQuery);
        assert_eq!(simulator.error(), Some(&ExecutionError::EmptyQuery));
        assert!(!simulator.is_loading());

        let err = simulator
            .submit("SELECT * FROM users;", None, "New Query", None, now)
            .expect_err("missing id should fail");
        assert_eq!(err, ExecutionError::MissingQueryId);
        assert!(simulator
            .submit("SELECT * FROM users;", Some(""), "New Query", None, now)
            .is_err());
        assert_eq!(simulator.pending_count(), 0);
    }

    #[test]
    fn rows_arrive_only_after_delay() {
        let mut simulator = simulator();
        let now = Instant::now();
        simulator
            .submit("SELECT * FROM users;", Some("q1"), "New Query", Some("tab"), now)
            .expect("submit should succeed");
        assert!(simulator.is_loading());

        assert!(simulator.poll(now + Duration::from_millis(299)).is_empty());
        let completed = simulator.poll(now + DELAY);
        assert_eq!(completed.len(), 1);
        let done = &completed[0];
        assert_eq!(done.completion, Some("tab"));
        assert_eq!(done.rows().map(|rows| rows.len()), Some(15));
        assert_eq!(done.execution_time.as_deref(), Some("0.300s"));

        assert!(!simulator.is_loading());
        assert_eq!(simulator.execution_time(), Some("0.300s"));
        let latest = simulator.history().latest().expect("history entry");
        assert_eq!(latest.row_count, 15);
        assert_eq!(latest.tab_name, "New Query");
    }

    #[test]
    fn empty_fixture_reports_error_and_skips_history() {
        let mut simulator = simulator();
        let now = Instant::now();
        simulator
            .submit("SELECT * FROM users;", Some("q1"), "t", None, now)
            .expect("submit");
        simulator.poll(now + DELAY);
        assert!(simulator.current_result().is_some());

        simulator
            .submit("SELECT * FROM void;", Some("empty"), "t", Some("tab"), now)
            .expect("submit");
        let completed = simulator.poll(now + DELAY);

        assert!(completed[0].rows().is_none());
        assert_eq!(
            simulator.error(),
            Some(&ExecutionError::NoResultsForQuery {
                query_id: "empty".to_string()
            })
        );
        assert!(simulator.current_result().is_none());
        assert_eq!(simulator.history().len(), 1);
    }

    #[test]
    fn cancelled_work_never_fires() {
        let mut simulator = simulator();
        let now = Instant::now();
        let first = simulator
            .submit("SELECT * FROM users;", Some("q1"), "t", Some("a"), now)
            .expect("submit");
        simulator
            .submit("SELECT * FROM users;", Some("q1"), "t", Some("b"), now)
            .expect("submit");

        assert!(simulator.cancel(first));
        assert!(!simulator.cancel(first));
        let completed = simulator.poll(now + DELAY);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].completion, Some("b"));

        simulator
            .submit("SELECT * FROM users;", Some("q1"), "t", Some("c"), now)
            .expect("submit");
        assert_eq!(simulator.cancel_all(), 1);
        assert!(simulator.poll(now + DELAY * 10).is_empty());
        assert!(simulator.next_deadline().is_none());
    }

    #[test]
    fn detached_completion_still_records_history() {
        let mut simulator = simulator();
        let now = Instant::now();
        simulator
            .submit("SELECT * FROM users;", Some("q1"), "t", Some("gone"), now)
            .expect("submit");

        assert_eq!(simulator.detach_completions(|target| *target == "gone"), 1);
        let completed = simulator.poll(now + DELAY);
        assert!(completed[0].completion.is_none());
        assert_eq!(simulator.history().len(), 1);
    }

    #[test]
    fn random_delay_stays_in_range() {
        let strategy = DelayStrategy::default();
        for _ in 0..200 {
            let delay = strategy.pick();
            assert!(delay >= Duration::from_millis(200));
            assert!(delay < Duration::from_millis(1_000));
        }
        let fixtures = Arc::new(FixtureStore::new(
            vec![PredefinedQuery {
                id: "x".to_string(),
                name: "x".to_string(),
                description: String::new(),
                query: "SELECT 1;".to_string(),
                execution_time: None,
            }],
            HashMap::new(),
        )
        .expect("fixtures"));
        let mut simulator: ExecutionSimulator<()> =
            ExecutionSimulator::new(fixtures, strategy, QueryHistory::default());
        let now = Instant::now();
        simulator
            .submit("SELECT 1;", Some("x"), "t", None, now)
            .expect("submit");
        let deadline = simulator.next_deadline().expect("deadline");
        assert!(deadline >= now + Duration::from_millis(200));
    }

    #[test]
    fn execution_time_has_three_decimals() {
        assert_eq!(format_execution_time(Duration::from_millis(437)), "0.437s");
        assert_eq!(format_execution_time(Duration::from_millis(1_000)), "1.000s");
    }
}
