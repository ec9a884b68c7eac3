use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::config::{ConfigError, WorkbenchConfig};
use crate::executor::{CompletedExecution, DelayStrategy, ExecutionError, ExecutionSimulator};
use crate::fixtures::FixtureStore;
use crate::history::{HistoryRecord, QueryHistory};
use crate::layout::Layout;
use crate::naming::table_tab_name;
use crate::schema::select_table_sql;
use crate::sync::{reconcile, Selection, SyncEvent};
use crate::tabs::{
    Confirmer, EditorTabId, OutputCompletion, OutputTabId, Panel, RefillRequest,
    StaleHistoryReference, TabManager, TabTarget,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    StaleHistory(#[from] StaleHistoryReference),
    #[error("You can only execute queries from the predefined list. Please select a query from the dropdown.")]
    UnmatchedFreeText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Fill(OutputCompletion),
    Refill(OutputTabId),
    FromHistory(OutputCompletion),
}

impl Completion {
    #[must_use]
    pub fn target(self) -> OutputTabId {
        match self {
            Self::Fill(completion) | Self::FromHistory(completion) => completion.tab_id(),
            Self::Refill(tab_id) => tab_id,
        }
    }
}

#[derive(Debug)]
pub struct Session {
    fixtures: Arc<FixtureStore>,
    tabs: TabManager,
    executor: ExecutionSimulator<Completion>,
    layout: Layout,
    custom_error: Option<SessionError>,
    query_modified: bool,
}

impl Session {
    #[must_use]
    pub fn new(
        fixtures: Arc<FixtureStore>,
        delay: DelayStrategy,
        history: QueryHistory,
        layout: Layout,
    ) -> Self {
        let tabs = TabManager::new(&fixtures);
        let executor = ExecutionSimulator::new(Arc::clone(&fixtures), delay, history);
        Self {
            fixtures,
            tabs,
            executor,
            layout,
            custom_error: None,
            query_modified: false,
        }
    }

    pub fn from_config(config: &WorkbenchConfig) -> Result<Self, ConfigError> {
        let settings = config.settings();
        settings.execution.validate()?;
        let fixtures = settings.fixtures.load()?;
        tracing::info!(
            queries = fixtures.list_queries().len(),
            config_path = %config.path().display(),
            "starting workbench session"
        );

        Ok(Self::new(
            Arc::new(fixtures),
            settings.execution.delay_strategy(),
            QueryHistory::new(settings.history.max_entries),
            settings.layout.build(),
        ))
    }

    #[must_use]
    pub fn fixtures(&self) -> &Arc<FixtureStore> {
        &self.fixtures
    }

    #[must_use]
    pub fn tabs(&self) -> &TabManager {
        &self.tabs
    }

    #[must_use]
    pub fn executor(&self) -> &ExecutionSimulator<Completion> {
        &self.executor
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut Layout {
        &mut self.layout
    }

    #[must_use]
    pub fn history(&self) -> &QueryHistory {
        self.executor.history()
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection::of(&self.tabs)
    }

    #[must_use]
    pub fn custom_error(&self) -> Option<&SessionError> {
        self.custom_error.as_ref()
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.custom_error
            .as_ref()
            .map(ToString::to_string)
            .or_else(|| self.executor.error().map(ToString::to_string))
    }

    #[must_use]
    pub fn query_modified(&self) -> bool {
        self.query_modified
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.executor.is_loading()
    }

    #[must_use]
    pub fn has_results(&self) -> bool {
        self.executor.current_result().is_some()
    }

    pub fn add_editor_tab(&mut self) -> EditorTabId {
        self.tabs.add_editor_tab(&self.fixtures)
    }

    pub fn close_editor_tab(&mut self, id: EditorTabId) -> bool {
        self.tabs.close_editor_tab(id)
    }

    pub fn begin_rename(&mut self, id: EditorTabId) -> bool {
        let Some(name) = self.tabs.editor_tab(id).map(|tab| tab.name().to_string()) else {
            return false;
        };
        self.tabs.begin_rename(id, &name)
    }

    pub fn set_rename_draft(&mut self, draft: impl Into<String>) {
        self.tabs.set_rename_draft(draft);
    }

    pub fn commit_rename(&mut self) -> bool {
        self.tabs.commit_rename()
    }

    pub fn cancel_rename(&mut self) {
        self.tabs.cancel_rename();
    }

    pub fn update_query_text(&mut self, id: EditorTabId, text: impl Into<String>) -> bool {
        let changed = self.tabs.update_query_text(id, text);
        if changed {
            self.custom_error = None;
        }
        changed
    }

    pub fn apply(&mut self, event: SyncEvent) -> Selection {
        if matches!(event, SyncEvent::QueryEdited(_) | SyncEvent::QuerySelected { .. }) {
            self.custom_error = None;
        }
        reconcile(&mut self.tabs, event)
    }

    pub fn select_fixture(&mut self, query_id: &str) -> bool {
        let active = self.tabs.active_editor_id();
        if !self.tabs.apply_fixture(active, query_id, &self.fixtures) {
            return false;
        }
        self.custom_error = None;
        self.query_modified = true;
        true
    }

    pub fn open_table(&mut self, table: &str, custom_sql: Option<&str>) -> EditorTabId {
        let query = custom_sql.map_or_else(|| select_table_sql(table), str::to_string);
        let id = self
            .tabs
            .add_table_tab(table_tab_name(table), query, &self.fixtures);
        self.tabs.set_active_panel(Panel::Editor);
        id
    }

    pub fn execute(&mut self, now: Instant) -> Result<OutputTabId, SessionError> {
        let text = self.tabs.active_editor_tab().query().to_string();
        self.execute_text(&text, now)
    }

    /// Runs free text, which must match a fixture exactly (ignoring
    /// surrounding whitespace). Creates the output tab right away.
    pub fn execute_text(&mut self, text: &str, now: Instant) -> Result<OutputTabId, SessionError> {
        self.custom_error = None;
        self.query_modified = false;

        let Some(matched) = self.fixtures.find_by_text(text) else {
            tracing::debug!("refusing to execute text outside the fixture list");
            self.custom_error = Some(SessionError::UnmatchedFreeText);
            return Err(SessionError::UnmatchedFreeText);
        };
        let query_id = matched.id.clone();

        let active = self.tabs.active_editor_tab();
        let active_id = active.id();
        let tab_name = active.name().to_string();

        let completion = self
            .tabs
            .execute_and_create_output_tab(text, &query_id, &tab_name);
        self.tabs.set_query_id(active_id, Some(query_id.clone()));

        if let Err(error) = self.executor.submit(
            text,
            Some(&query_id),
            &tab_name,
            Some(Completion::Fill(completion)),
            now,
        ) {
            self.tabs.complete_output(completion, None, None);
            return Err(error.into());
        }
        Ok(completion.tab_id())
    }

    pub fn open_history(
        &mut self,
        record: &HistoryRecord,
        execute: bool,
        now: Instant,
    ) -> Result<EditorTabId, SessionError> {
        let id = match self
            .tabs
            .create_editor_tab_from_history(record, &self.fixtures)
        {
            Ok(id) => id,
            Err(stale) => {
                let error = SessionError::from(stale);
                self.custom_error = Some(error.clone());
                return Err(error);
            }
        };
        self.custom_error = None;

        if execute {
            let tab_name = self
                .tabs
                .editor_tab(id)
                .map(|tab| tab.name().to_string())
                .unwrap_or_default();
            let completion =
                self.tabs
                    .execute_and_create_output_tab(&record.query, &record.query_id, &tab_name);
            if let Err(error) = self.executor.submit(
                &record.query,
                Some(&record.query_id),
                &tab_name,
                Some(Completion::FromHistory(completion)),
                now,
            ) {
                self.tabs.complete_output(completion, None, None);
                return Err(error.into());
            }
        }
        Ok(id)
    }

    pub fn select_tab(&mut self, target: impl Into<TabTarget>, now: Instant) {
        let Some(request) = self.tabs.select_tab(target, &self.fixtures) else {
            return;
        };
        self.submit_refill(request, now);
    }

    fn submit_refill(&mut self, request: RefillRequest, now: Instant) {
        let submitted = self.executor.submit(
            &request.query,
            Some(&request.query_id),
            &request.tab_name,
            Some(Completion::Refill(request.tab_id)),
            now,
        );
        if let Err(error) = submitted {
            tracing::warn!(tab_id = %request.tab_id, %error, "could not refill output tab");
            self.tabs.complete_refill(request.tab_id, None);
        }
    }

    pub fn create_visualization(&mut self, source: OutputTabId) -> Option<OutputTabId> {
        self.tabs.create_visualization_tab(source)
    }

    /// Closes an output tab. Executions still headed for it keep running but
    /// deliver nowhere.
    pub fn close_output_tab(&mut self, id: OutputTabId, confirmer: &dyn Confirmer) -> bool {
        if !self.tabs.close_output_tab(id, confirmer) {
            return false;
        }
        let detached = self
            .executor
            .detach_completions(|completion| completion.target() == id);
        if detached > 0 {
            tracing::debug!(tab_id = %id, detached, "detached pending results from closed tab");
        }
        true
    }

    pub fn clear_results(&mut self, confirmer: &dyn Confirmer) -> bool {
        self.layout.set_fullscreen(false);
        if !self.tabs.clear_all_output_tabs(confirmer) {
            return false;
        }
        self.executor.detach_completions(|_| true);
        self.executor.clear_results();
        true
    }

    pub fn clear_history(&mut self) {
        self.executor.clear_history();
    }

    pub fn toggle_output_mode(&mut self) {
        if self
            .layout
            .toggle_output_mode(self.has_results(), self.is_loading())
        {
            self.tabs.set_active_panel(Panel::Results);
        }
    }

    pub fn poll(&mut self, now: Instant) -> usize {
        let completed = self.executor.poll(now);
        let finished = completed.len();
        for execution in completed {
            self.deliver(execution);
        }
        if finished > 0 {
            self.layout.check_exit_fullscreen(self.has_results());
        }
        finished
    }

    fn deliver(&mut self, execution: CompletedExecution<Completion>) {
        let Some(completion) = execution.completion else {
            return;
        };
        let rows = execution.outcome.ok();
        match completion {
            Completion::Fill(output) => {
                self.tabs
                    .complete_output(output, rows, execution.execution_time);
            }
            Completion::Refill(tab_id) => {
                self.tabs.complete_refill(tab_id, rows);
            }
            Completion::FromHistory(output) => {
                if self
                    .tabs
                    .complete_output(output, rows, execution.execution_time)
                {
                    self.tabs.set_active_panel(Panel::Results);
                }
            }
        }
    }

    pub async fn run_until_idle(&mut self) -> usize {
        let mut finished = 0;
        while let Some(deadline) = self.executor.next_deadline() {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            finished += self.poll(Instant::now());
        }
        finished
    }

    pub fn teardown(&mut self) {
        let cancelled = self.executor.cancel_all();
        tracing::debug!(cancelled, "session torn down");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.executor.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::{Session, SessionError};
    use crate::executor::DelayStrategy;
    use crate::fixtures::{FixtureStore, PredefinedQuery, ResultSet};
    use crate::history::{HistoryRecord, QueryHistory};
    use crate::layout::{Layout, LayoutDirection};
    use crate::sync::SyncEvent;
    use crate::tabs::Panel;

    const DELAY: Duration = Duration::from_millis(250);

    fn session_with(fixtures: FixtureStore) -> Session {
        Session::new(
            Arc::new(fixtures),
            DelayStrategy::Fixed(DELAY),
            QueryHistory::default(),
            Layout::default(),
        )
    }

    fn session() -> Session {
        session_with(FixtureStore::builtin().expect("fixtures"))
    }

    fn yes(_: &str) -> bool {
        true
    }

    fn no(_: &str) -> bool {
        false
    }

    #[test]
    fn execute_fills_output_tab_after_delay() {
        let mut session = session();
        let now = Instant::now();

        let output = session.execute(now).expect("execute");
        assert!(session.is_loading());
        assert!(session.tabs().cached_result(output).is_none());
        assert_eq!(session.poll(now + DELAY / 2), 0);

        assert_eq!(session.poll(now + DELAY), 1);
        let cached = session.tabs().cached_result(output).expect("rows");
        assert_eq!(cached.rows().len(), 15);
        assert_eq!(cached.execution_time(), Some("0.250s"));
        assert!(!session.is_loading());
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().latest().map(|entry| entry.row_count), Some(15));
    }

    #[test]
    fn unmatched_text_is_refused() {
        let mut session = session();
        let err = session
            .execute_text("SELECT * FROM somewhere_else;", Instant::now())
            .expect_err("free text");

        assert_eq!(err, SessionError::UnmatchedFreeText);
        assert!(session.tabs().output_tabs().is_empty());
        assert!(!session.is_loading());
        assert_eq!(
            session.error_message().as_deref(),
            Some(
                "You can only execute queries from the predefined list. \
                 Please select a query from the dropdown."
            )
        );

        let id = session.tabs().active_editor_id();
        session.update_query_text(id, "SELECT 2;");
        assert!(session.custom_error().is_none());
    }

    #[test]
    fn matching_text_repoints_active_tab() {
        let mut session = session();
        let q2 = session
            .fixtures()
            .query("q2")
            .map(|query| query.query.clone())
            .expect("q2");

        session
            .execute_text(&format!("  {q2}\n"), Instant::now())
            .expect("execute q2");
        assert_eq!(session.tabs().active_editor_tab().query_id(), Some("q2"));
        assert_eq!(
            session.tabs().active_output_tab().map(|tab| tab.name()),
            Some("New Query Output")
        );
    }

    #[test]
    fn fixture_selection_marks_query_modified() {
        let mut session = session();
        assert!(session.select_fixture("q3"));
        assert!(session.query_modified());
        assert_eq!(session.selection().query_id.as_deref(), Some("q3"));
        assert_eq!(session.selection().tab_name, "Customer Order Analysis");

        session.execute(Instant::now()).expect("execute");
        assert!(!session.query_modified());
        assert!(!session.select_fixture("missing"));
    }

    #[test]
    fn empty_fixture_leaves_tab_without_cache() {
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
        let mut session = session_with(fixtures);
        let now = Instant::now();

        let output = session
            .execute_text("SELECT * FROM void;", now)
            .expect("execute");
        session.poll(now + DELAY);

        assert!(session.tabs().cached_result(output).is_none());
        assert_eq!(session.tabs().active_output_id(), Some(output));
        assert!(session.history().is_empty());
        assert_eq!(
            session.error_message().as_deref(),
            Some("No results found for this query")
        );
    }

    #[test]
    fn revisit_refills_and_closing_detaches() {
        let mut fixtures = FixtureStore::builtin().expect("fixtures");
        fixtures.insert(
            PredefinedQuery {
                id: "q1".to_string(),
                name: "All Users".to_string(),
                description: String::new(),
                query: "SELECT * FROM users;".to_string(),
                execution_time: None,
            },
            ResultSet::empty(),
        );
        let mut session = session_with(fixtures);
        let now = Instant::now();

        let output = session.execute(now).expect("execute");
        session.poll(now + DELAY);
        assert!(session.tabs().cached_result(output).is_none());

        session.select_tab(Panel::Editor, now + DELAY);
        session.select_tab(output, now + DELAY);
        assert_eq!(session.executor().pending_count(), 1);
        session.select_tab(output, now + DELAY);
        assert_eq!(session.executor().pending_count(), 1);

        assert!(session.close_output_tab(output, &yes));
        assert_eq!(session.executor().pending_count(), 1);
        session.poll(now + DELAY * 3);
        assert!(session.tabs().output_tabs().is_empty());
    }

    #[test]
    fn revisiting_output_tab_during_first_run_does_not_resubmit() {
        let mut session = session();
        let start = Instant::now();

        let output = session.execute(start).expect("execute");
        session.select_tab(Panel::Editor, start);
        session.select_tab(output, start + Duration::from_millis(10));
        assert_eq!(session.executor().pending_count(), 1);

        assert_eq!(session.poll(start + DELAY), 1);
        assert_eq!(session.history().len(), 1);
        let cached = session.tabs().cached_result(output).expect("rows");
        assert_eq!(cached.execution_time(), Some("0.250s"));

        assert_eq!(session.poll(start + DELAY * 3), 0);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn failed_history_rerun_leaves_tab_refillable() {
        let mut session = session();
        let now = Instant::now();
        let record = HistoryRecord::new("   ", "q1", "All Users", "0.250s", 15);

        let err = session
            .open_history(&record, true, now)
            .expect_err("empty query cannot run");
        assert!(matches!(err, SessionError::Execution(_)));
        let output = session.tabs().active_output_id().expect("output tab");
        assert!(session
            .tabs()
            .output_tab(output)
            .is_some_and(|tab| !tab.is_pending()));
    }

    #[test]
    fn declined_close_keeps_delivery() {
        let mut session = session();
        let now = Instant::now();
        let output = session.execute(now).expect("execute");

        assert!(!session.close_output_tab(output, &no));
        session.poll(now + DELAY);
        assert!(session.tabs().cached_result(output).is_some());
    }

    #[test]
    fn closing_pending_tab_still_records_history() {
        let mut session = session();
        let now = Instant::now();
        let output = session.execute(now).expect("execute");

        assert!(session.close_output_tab(output, &yes));
        assert_eq!(session.poll(now + DELAY), 1);
        assert!(session.tabs().output_tab(output).is_none());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn clear_results_needs_confirmation() {
        let mut session = session();
        let now = Instant::now();
        session.execute(now).expect("execute");
        session.poll(now + DELAY);
        session.layout_mut().set_fullscreen(true);

        assert!(!session.clear_results(&no));
        assert!(!session.layout().is_fullscreen());
        assert_eq!(session.tabs().output_tabs().len(), 1);
        assert!(session.has_results());

        assert!(session.clear_results(&yes));
        assert!(session.tabs().output_tabs().is_empty());
        assert!(!session.has_results());
        assert!(session.executor().execution_time().is_none());
    }

    #[test]
    fn history_reopen_and_rerun() {
        let mut session = session();
        let now = Instant::now();
        session.execute(now).expect("execute");
        session.poll(now + DELAY);
        let record = session.history().latest().cloned().expect("history");

        let tab = session
            .open_history(&record, true, now + DELAY)
            .expect("reopen");
        assert_eq!(session.tabs().active_editor_id(), tab);
        assert_eq!(session.tabs().active_panel(), Panel::Editor);
        assert_eq!(session.tabs().output_tabs().len(), 2);

        session.poll(now + DELAY * 2);
        assert_eq!(session.tabs().active_panel(), Panel::Results);
        assert_eq!(
            session.tabs().active_output_tab().map(|tab| tab.name()),
            Some("All Users Output")
        );
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn stale_history_sets_message() {
        let mut session = session();
        let record = HistoryRecord::new("SELECT 1;", "gone", "Old", "0.1s", 1);
        let err = session
            .open_history(&record, true, Instant::now())
            .expect_err("stale");

        assert!(matches!(err, SessionError::StaleHistory(_)));
        assert_eq!(
            session.error_message().as_deref(),
            Some("Cannot load this query from history as it's no longer in the predefined list.")
        );
        assert_eq!(session.tabs().editor_tabs().len(), 1);
        assert!(!session.is_loading());
    }

    #[test]
    fn open_table_builds_select_tab() {
        let mut session = session();
        let id = session.open_table("orders", None);
        let tab = session.tabs().editor_tab(id).expect("tab");
        assert_eq!(tab.name(), "SELECT orders");
        assert_eq!(tab.query(), "SELECT * FROM orders LIMIT 100;");
        assert!(tab.query_id().is_none());

        let id = session.open_table("users", Some("SELECT * FROM users;"));
        assert_eq!(
            session.tabs().editor_tab(id).and_then(|tab| tab.query_id()),
            Some("q1")
        );
    }

    #[test]
    fn output_mode_brings_results_forward() {
        let mut session = session();
        let now = Instant::now();
        session.execute(now).expect("execute");
        session.poll(now + DELAY);
        session.select_tab(Panel::Editor, now + DELAY);

        session.toggle_output_mode();
        assert_eq!(session.layout().direction(), LayoutDirection::Horizontal);
        assert_eq!(session.tabs().active_panel(), Panel::Results);
    }

    #[test]
    fn teardown_cancels_pending_work() {
        let mut session = session();
        let now = Instant::now();
        let output = session.execute(now).expect("execute");

        session.teardown();
        assert_eq!(session.poll(now + DELAY * 4), 0);
        assert!(session.tabs().cached_result(output).is_none());
        assert!(session.history().is_empty());
    }

    #[test]
    fn edits_through_apply_clear_session_error() {
        let mut session = session();
        session
            .execute_text("SELECT nothing;", Instant::now())
            .expect_err("free text");
        assert!(session.custom_error().is_some());

        let selection = session.apply(SyncEvent::QueryEdited("DELETE FROM users;".into()));
        assert_eq!(selection.tab_name, "DELETE users");
        assert!(session.custom_error().is_none());
        assert!(session.error_message().is_none());
    }

    #[tokio::test]
    async fn run_until_idle_waits_for_all_deliveries() {
        let mut session = Session::new(
            Arc::new(FixtureStore::builtin().expect("fixtures")),
            DelayStrategy::Fixed(Duration::from_millis(5)),
            QueryHistory::default(),
            Layout::default(),
        );
        let first = session.execute(Instant::now()).expect("first");
        session.select_fixture("q2");
        let second = session.execute(Instant::now()).expect("second");

        assert_eq!(session.run_until_idle().await, 2);
        assert!(session.tabs().cached_result(first).is_some());
        assert_eq!(
            session.tabs().cached_result(second).map(|cached| cached.rows().len()),
            Some(10)
        );
    }
}
