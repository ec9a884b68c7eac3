use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::fixtures::{FixtureStore, ResultSet};
use crate::history::HistoryRecord;
use crate::naming::{derive_tab_name, output_tab_name, visualization_tab_name, DEFAULT_TAB_NAME};

pub const CLOSE_OUTPUT_TAB_PROMPT: &str = "Are you sure you want to close this tab?";
pub const CLEAR_OUTPUT_TABS_PROMPT: &str =
    "This will close all output tabs. Are you sure you want to continue?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EditorTabId(Uuid);

impl EditorTabId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EditorTabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EditorTabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "editor-{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputTabId(Uuid);

impl OutputTabId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OutputTabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OutputTabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output-{}", self.0.simple())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorTab {
    id: EditorTabId,
    name: String,
    renamed: bool,
    query_id: Option<String>,
    query: String,
}

impl EditorTab {
    fn new(name: impl Into<String>, query_id: Option<String>, query: impl Into<String>) -> Self {
        Self {
            id: EditorTabId::new(),
            name: name.into(),
            renamed: false,
            query_id,
            query: query.into(),
        }
    }

    #[must_use]
    pub fn id(&self) -> EditorTabId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn renamed(&self) -> bool {
        self.renamed
    }

    #[must_use]
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Results,
    Visualization,
}

impl OutputKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Results => "results",
            Self::Visualization => "visualization",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    rows: Arc<ResultSet>,
    execution_time: Option<String>,
}

impl CachedResult {
    #[must_use]
    pub fn new(rows: Arc<ResultSet>, execution_time: Option<String>) -> Self {
        Self {
            rows,
            execution_time,
        }
    }

    #[must_use]
    pub fn rows(&self) -> &ResultSet {
        &self.rows
    }

    #[must_use]
    pub fn shared_rows(&self) -> &Arc<ResultSet> {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut ResultSet {
        Arc::make_mut(&mut self.rows)
    }

    #[must_use]
    pub fn execution_time(&self) -> Option<&str> {
        self.execution_time.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputTab {
    id: OutputTabId,
    name: String,
    query_id: Option<String>,
    query_tab_id: EditorTabId,
    source_tab_id: Option<OutputTabId>,
    created_at: DateTime<Utc>,
    sequence: u64,
    kind: OutputKind,
    cached: Option<CachedResult>,
    pending: bool,
}

impl OutputTab {
    #[must_use]
    pub fn id(&self) -> OutputTabId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn query_id(&self) -> Option<&str> {
        self.query_id.as_deref()
    }

    /// Editor tab that was active when this tab was created. May dangle.
    #[must_use]
    pub fn query_tab_id(&self) -> EditorTabId {
        self.query_tab_id
    }

    /// Output tab whose rows a visualization was copied from. May dangle.
    #[must_use]
    pub fn source_tab_id(&self) -> Option<OutputTabId> {
        self.source_tab_id
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    #[must_use]
    pub fn cached(&self) -> Option<&CachedResult> {
        self.cached.as_ref()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn recency(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    Editor,
    Results,
}

impl Panel {
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Editor => "editor-panel",
            Self::Results => "results-panel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabTarget {
    Panel(Panel),
    Output(OutputTabId),
    Editor(EditorTabId),
}

impl From<Panel> for TabTarget {
    fn from(panel: Panel) -> Self {
        Self::Panel(panel)
    }
}

impl From<OutputTabId> for TabTarget {
    fn from(id: OutputTabId) -> Self {
        Self::Output(id)
    }
}

impl From<EditorTabId> for TabTarget {
    fn from(id: EditorTabId) -> Self {
        Self::Editor(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameSession {
    pub tab_id: EditorTabId,
    pub draft: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameKey {
    Enter,
    Escape,
    Other,
}

pub trait Confirmer {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> Confirmer for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "the output tab stays empty unless its completion is delivered"]
pub struct OutputCompletion {
    tab_id: OutputTabId,
}

impl OutputCompletion {
    #[must_use]
    pub fn tab_id(self) -> OutputTabId {
        self.tab_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefillRequest {
    pub tab_id: OutputTabId,
    pub tab_name: String,
    pub query_id: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot load this query from history as it's no longer in the predefined list.")]
pub struct StaleHistoryReference {
    pub query_id: String,
}

#[derive(Debug, Clone)]
pub struct TabManager {
    editor_tabs: Vec<EditorTab>,
    active_editor: EditorTabId,
    output_tabs: Vec<OutputTab>,
    active_output: Option<OutputTabId>,
    active_panel: Panel,
    rename: Option<RenameSession>,
    output_sequence: u64,
}

impl TabManager {
    #[must_use]
    pub fn new(fixtures: &FixtureStore) -> Self {
        let first = fixtures.first_query();
        let tab = EditorTab::new(
            DEFAULT_TAB_NAME,
            Some(first.id.clone()),
            first.query.clone(),
        );
        Self {
            active_editor: tab.id,
            editor_tabs: vec![tab],
            output_tabs: Vec::new(),
            active_output: None,
            active_panel: Panel::Editor,
            rename: None,
            output_sequence: 0,
        }
    }

    #[must_use]
    pub fn editor_tabs(&self) -> &[EditorTab] {
        &self.editor_tabs
    }

    #[must_use]
    pub fn editor_tab(&self, id: EditorTabId) -> Option<&EditorTab> {
        self.editor_tabs.iter().find(|tab| tab.id == id)
    }

    fn editor_tab_mut(&mut self, id: EditorTabId) -> Option<&mut EditorTab> {
        self.editor_tabs.iter_mut().find(|tab| tab.id == id)
    }

    #[must_use]
    pub fn active_editor_id(&self) -> EditorTabId {
        self.active_editor
    }

    #[must_use]
    pub fn active_editor_tab(&self) -> &EditorTab {
        self.editor_tab(self.active_editor)
            .unwrap_or(&self.editor_tabs[0])
    }

    #[must_use]
    pub fn output_tabs(&self) -> &[OutputTab] {
        &self.output_tabs
    }

    #[must_use]
    pub fn output_tab(&self, id: OutputTabId) -> Option<&OutputTab> {
        self.output_tabs.iter().find(|tab| tab.id == id)
    }

    fn output_tab_mut(&mut self, id: OutputTabId) -> Option<&mut OutputTab> {
        self.output_tabs.iter_mut().find(|tab| tab.id == id)
    }

    #[must_use]
    pub fn active_output_id(&self) -> Option<OutputTabId> {
        self.active_output
    }

    #[must_use]
    pub fn active_output_tab(&self) -> Option<&OutputTab> {
        self.active_output.and_then(|id| self.output_tab(id))
    }

    #[must_use]
    pub fn active_panel(&self) -> Panel {
        self.active_panel
    }

    pub fn set_active_panel(&mut self, panel: Panel) {
        self.active_panel = panel;
    }

    #[must_use]
    pub fn cached_result(&self, id: OutputTabId) -> Option<&CachedResult> {
        self.output_tab(id).and_then(OutputTab::cached)
    }

    pub fn cached_result_mut(&mut self, id: OutputTabId) -> Option<&mut CachedResult> {
        self.output_tab_mut(id).and_then(|tab| tab.cached.as_mut())
    }

    #[must_use]
    pub fn active_cached_result(&self) -> Option<&CachedResult> {
        self.active_output.and_then(|id| self.cached_result(id))
    }

    #[must_use]
    pub fn tab_kind(&self, id: OutputTabId) -> Option<OutputKind> {
        self.output_tab(id).map(OutputTab::kind)
    }

    pub fn result_cache(&self) -> impl Iterator<Item = (OutputTabId, &CachedResult)> {
        self.output_tabs
            .iter()
            .filter_map(|tab| tab.cached.as_ref().map(|cached| (tab.id, cached)))
    }

    pub fn tab_kinds(&self) -> impl Iterator<Item = (OutputTabId, OutputKind)> + '_ {
        self.output_tabs.iter().map(|tab| (tab.id, tab.kind))
    }

    #[must_use]
    pub fn rename_session(&self) -> Option<&RenameSession> {
        self.rename.as_ref()
    }

    pub fn add_editor_tab(&mut self, fixtures: &FixtureStore) -> EditorTabId {
        let first = fixtures.first_query();
        self.push_editor_tab(EditorTab::new(
            DEFAULT_TAB_NAME,
            Some(first.id.clone()),
            first.query.clone(),
        ))
    }

    pub fn add_table_tab(
        &mut self,
        name: impl Into<String>,
        query: impl Into<String>,
        fixtures: &FixtureStore,
    ) -> EditorTabId {
        let query = query.into();
        let query_id = fixtures.find_by_text(&query).map(|found| found.id.clone());
        self.push_editor_tab(EditorTab::new(name, query_id, query))
    }

    fn push_editor_tab(&mut self, tab: EditorTab) -> EditorTabId {
        let id = tab.id;
        tracing::debug!(tab_id = %id, name = %tab.name, "opening editor tab");
        self.editor_tabs.push(tab);
        self.active_editor = id;
        id
    }

    /// Closing the last tab is a no-op. When the active tab closes, the last
    /// remaining tab becomes active.
    pub fn close_editor_tab(&mut self, id: EditorTabId) -> bool {
        if self.editor_tabs.len() == 1 {
            return false;
        }
        let original_len = self.editor_tabs.len();
        self.editor_tabs.retain(|tab| tab.id != id);
        if self.editor_tabs.len() == original_len {
            return false;
        }

        if self.rename.as_ref().is_some_and(|session| session.tab_id == id) {
            self.rename = None;
        }
        if id == self.active_editor {
            if let Some(last) = self.editor_tabs.last() {
                self.active_editor = last.id;
            }
        }
        tracing::debug!(tab_id = %id, "closed editor tab");
        true
    }

    pub fn begin_rename(&mut self, id: EditorTabId, current_name: &str) -> bool {
        if self.editor_tab(id).is_none() {
            return false;
        }
        self.rename = Some(RenameSession {
            tab_id: id,
            draft: current_name.to_string(),
        });
        true
    }

    pub fn set_rename_draft(&mut self, draft: impl Into<String>) {
        if let Some(session) = self.rename.as_mut() {
            session.draft = draft.into();
        }
    }

    pub fn commit_rename(&mut self) -> bool {
        let Some(session) = self.rename.take() else {
            return false;
        };
        let trimmed = session.draft.trim();
        if trimmed.is_empty() {
            return false;
        }
        let Some(tab) = self.editor_tab_mut(session.tab_id) else {
            return false;
        };
        tab.name = trimmed.to_string();
        tab.renamed = true;
        true
    }

    pub fn cancel_rename(&mut self) {
        self.rename = None;
    }

    pub fn rename_blurred(&mut self) -> bool {
        self.commit_rename()
    }

    pub fn handle_rename_key(&mut self, key: RenameKey) -> bool {
        match key {
            RenameKey::Enter => self.commit_rename(),
            RenameKey::Escape => {
                self.cancel_rename();
                false
            }
            RenameKey::Other => false,
        }
    }

    pub fn update_query_text(&mut self, id: EditorTabId, text: impl Into<String>) -> bool {
        let text = text.into();
        let Some(tab) = self.editor_tab_mut(id) else {
            return false;
        };
        if tab.query == text {
            return false;
        }
        tab.query = text;
        self.auto_derive_name(id);
        true
    }

    pub fn apply_fixture(
        &mut self,
        id: EditorTabId,
        query_id: &str,
        fixtures: &FixtureStore,
    ) -> bool {
        let Some(fixture) = fixtures.query(query_id) else {
            return false;
        };
        let Some(tab) = self.editor_tab_mut(id) else {
            return false;
        };
        if !tab.renamed {
            tab.name.clone_from(&fixture.name);
        }
        tab.query_id = Some(fixture.id.clone());
        tab.query.clone_from(&fixture.query);
        true
    }

    pub(crate) fn set_query_id(&mut self, id: EditorTabId, query_id: Option<String>) -> bool {
        let Some(tab) = self.editor_tab_mut(id) else {
            return false;
        };
        if tab.query_id == query_id {
            return false;
        }
        tab.query_id = query_id;
        true
    }

    pub(crate) fn set_query_text(&mut self, id: EditorTabId, query: String) -> bool {
        let Some(tab) = self.editor_tab_mut(id) else {
            return false;
        };
        if tab.query == query {
            return false;
        }
        tab.query = query;
        true
    }

    pub fn auto_derive_name(&mut self, id: EditorTabId) -> bool {
        if self.rename.as_ref().is_some_and(|session| session.tab_id == id) {
            return false;
        }
        let Some(tab) = self.editor_tab_mut(id) else {
            return false;
        };
        if tab.renamed {
            return false;
        }
        let derived = derive_tab_name(&tab.query);
        if derived == tab.name {
            return false;
        }
        tab.name = derived;
        true
    }

    pub(crate) fn activate_editor(&mut self, id: EditorTabId) -> bool {
        if self.editor_tab(id).is_none() {
            return false;
        }
        self.active_editor = id;
        true
    }

    pub fn execute_and_create_output_tab(
        &mut self,
        query_text: &str,
        query_id: &str,
        source_tab_name: &str,
    ) -> OutputCompletion {
        let id = self.push_output_tab(
            output_tab_name(source_tab_name),
            Some(query_id.to_string()),
            self.active_editor,
            None,
            OutputKind::Results,
            None,
        );
        if let Some(tab) = self.output_tab_mut(id) {
            tab.pending = true;
        }
        tracing::debug!(
            tab_id = %id,
            query_id,
            sql_preview = %query_text.chars().take(50).collect::<String>(),
            "created output tab ahead of results"
        );
        OutputCompletion { tab_id: id }
    }

    /// Stores rows for a tab created by [`TabManager::execute_and_create_output_tab`].
    /// `None` leaves the tab without a cache entry. A tab that has since been
    /// closed is ignored.
    pub fn complete_output(
        &mut self,
        completion: OutputCompletion,
        rows: Option<Arc<ResultSet>>,
        execution_time: Option<String>,
    ) -> bool {
        self.fill(completion.tab_id, rows, execution_time)
    }

    fn fill(
        &mut self,
        id: OutputTabId,
        rows: Option<Arc<ResultSet>>,
        execution_time: Option<String>,
    ) -> bool {
        let Some(tab) = self.output_tab_mut(id) else {
            tracing::warn!(tab_id = %id, "discarding rows for closed output tab");
            return false;
        };
        tab.pending = false;
        let Some(rows) = rows else {
            return false;
        };
        tab.cached = Some(CachedResult::new(rows, execution_time));
        true
    }

    pub fn create_visualization_tab(&mut self, source_id: OutputTabId) -> Option<OutputTabId> {
        let source = self.output_tab(source_id)?;
        let cached = source.cached.clone()?;
        let name = visualization_tab_name(&source.name);
        let query_id = source.query_id.clone();
        let query_tab_id = source.query_tab_id;

        Some(self.push_output_tab(
            name,
            query_id,
            query_tab_id,
            Some(source_id),
            OutputKind::Visualization,
            Some(cached),
        ))
    }

    fn push_output_tab(
        &mut self,
        name: String,
        query_id: Option<String>,
        query_tab_id: EditorTabId,
        source_tab_id: Option<OutputTabId>,
        kind: OutputKind,
        cached: Option<CachedResult>,
    ) -> OutputTabId {
        self.output_sequence = self.output_sequence.saturating_add(1);
        let tab = OutputTab {
            id: OutputTabId::new(),
            name,
            query_id,
            query_tab_id,
            source_tab_id,
            created_at: Utc::now(),
            sequence: self.output_sequence,
            kind,
            cached,
            pending: false,
        };
        let id = tab.id;
        self.output_tabs.push(tab);
        self.active_output = Some(id);
        id
    }

    pub fn select_tab(
        &mut self,
        target: impl Into<TabTarget>,
        fixtures: &FixtureStore,
    ) -> Option<RefillRequest> {
        match target.into() {
            TabTarget::Panel(panel) => {
                self.active_panel = panel;
                None
            }
            TabTarget::Output(id) => self.select_output_tab(id, fixtures),
            TabTarget::Editor(id) => {
                if self.activate_editor(id) {
                    self.active_panel = Panel::Editor;
                }
                None
            }
        }
    }

    fn select_output_tab(
        &mut self,
        id: OutputTabId,
        fixtures: &FixtureStore,
    ) -> Option<RefillRequest> {
        let tab = self.output_tab_mut(id)?;
        if tab.cached.is_some() || tab.pending {
            self.active_panel = Panel::Results;
            self.active_output = Some(id);
            return None;
        }

        let request = tab
            .query_id
            .as_deref()
            .and_then(|query_id| fixtures.query(query_id))
            .map(|fixture| RefillRequest {
                tab_id: id,
                tab_name: tab.name.clone(),
                query_id: fixture.id.clone(),
                query: fixture.query.clone(),
            });
        if request.is_some() {
            tab.pending = true;
            tracing::debug!(tab_id = %id, "output tab revisited without rows, refilling");
        }

        self.active_panel = Panel::Results;
        self.active_output = Some(id);
        request
    }

    pub fn complete_refill(&mut self, id: OutputTabId, rows: Option<Arc<ResultSet>>) -> bool {
        self.fill(id, rows, None)
    }

    /// Closes an output tab after confirmation. If it was active, the most
    /// recently created remaining tab takes over.
    pub fn close_output_tab(&mut self, id: OutputTabId, confirmer: &dyn Confirmer) -> bool {
        if self.output_tab(id).is_none() {
            return false;
        }
        if !confirmer.confirm(CLOSE_OUTPUT_TAB_PROMPT) {
            return false;
        }

        self.output_tabs.retain(|tab| tab.id != id);
        if self.active_output == Some(id) {
            self.active_output = self
                .output_tabs
                .iter()
                .max_by_key(|tab| tab.recency())
                .map(|tab| tab.id);
        }
        tracing::debug!(tab_id = %id, "closed output tab");
        true
    }

    pub fn clear_all_output_tabs(&mut self, confirmer: &dyn Confirmer) -> bool {
        if !confirmer.confirm(CLEAR_OUTPUT_TABS_PROMPT) {
            return false;
        }
        tracing::debug!(closed = self.output_tabs.len(), "cleared all output tabs");
        self.output_tabs.clear();
        self.active_output = None;
        true
    }

    /// Reopens a history entry in a new editor tab. Entries whose fixture no
    /// longer exists are rejected without touching any state.
    pub fn create_editor_tab_from_history(
        &mut self,
        record: &HistoryRecord,
        fixtures: &FixtureStore,
    ) -> Result<EditorTabId, StaleHistoryReference> {
        let Some(fixture) = fixtures.query(&record.query_id) else {
            tracing::warn!(
                query_id = %record.query_id,
                "history entry points at a removed fixture"
            );
            return Err(StaleHistoryReference {
                query_id: record.query_id.clone(),
            });
        };

        let id = self.push_editor_tab(EditorTab::new(
            fixture.name.clone(),
            Some(record.query_id.clone()),
            record.query.clone(),
        ));
        self.active_panel = Panel::Editor;
        Ok(id)
    }
}
