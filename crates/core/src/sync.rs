use crate::tabs::{EditorTabId, TabManager};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TabActivated(EditorTabId),
    /// The global selection changed from outside the tab strip, e.g. a
    /// fixture picker. Names are left alone.
    QuerySelected {
        query_id: Option<String>,
        query: String,
    },
    QueryEdited(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub tab_id: EditorTabId,
    pub tab_name: String,
    pub query_id: Option<String>,
    pub query: String,
}

impl Selection {
    #[must_use]
    pub fn of(tabs: &TabManager) -> Self {
        let tab = tabs.active_editor_tab();
        Self {
            tab_id: tab.id(),
            tab_name: tab.name().to_string(),
            query_id: tab.query_id().map(str::to_string),
            query: tab.query().to_string(),
        }
    }
}

pub fn reconcile(tabs: &mut TabManager, event: SyncEvent) -> Selection {
    match event {
        SyncEvent::TabActivated(id) => {
            if !tabs.activate_editor(id) {
                tracing::debug!(tab_id = %id, "ignoring activation of unknown editor tab");
            }
        }
        SyncEvent::QuerySelected { query_id, query } => {
            let id = tabs.active_editor_id();
            tabs.set_query_id(id, query_id);
            tabs.set_query_text(id, query);
        }
        SyncEvent::QueryEdited(text) => {
            let id = tabs.active_editor_id();
            tabs.update_query_text(id, text);
        }
    }
    Selection::of(tabs)
}

#[cfg(test)]
mod tests {
    use super::{reconcile, Selection, SyncEvent};
    use crate::fixtures::FixtureStore;
    use crate::tabs::{EditorTabId, TabManager};

    fn setup() -> (FixtureStore, TabManager) {
        let fixtures = FixtureStore::builtin().expect("fixtures");
        let tabs = TabManager::new(&fixtures);
        (fixtures, tabs)
    }

    #[test]
    fn activating_tab_exposes_its_query() {
        let (fixtures, mut tabs) = setup();
        let first = tabs.active_editor_id();
        let second = tabs.add_editor_tab(&fixtures);
        reconcile(&mut tabs, SyncEvent::QueryEdited("SELECT * FROM products;".into()));

        let selection = reconcile(&mut tabs, SyncEvent::TabActivated(first));
        assert_eq!(selection.tab_id, first);
        assert_eq!(selection.query, "SELECT * FROM users;");

        let selection = reconcile(&mut tabs, SyncEvent::TabActivated(second));
        assert_eq!(selection.query, "SELECT * FROM products;");
        assert_eq!(selection.tab_name, "SELECT products");
    }

    #[test]
    fn external_selection_writes_into_active_tab_without_renaming() {
        let (_fixtures, mut tabs) = setup();
        let selection = reconcile(
            &mut tabs,
            SyncEvent::QuerySelected {
                query_id: Some("q4".into()),
                query: "SELECT * FROM inventory;".into(),
            },
        );

        assert_eq!(selection.query_id.as_deref(), Some("q4"));
        assert_eq!(selection.query, "SELECT * FROM inventory;");
        assert_eq!(selection.tab_name, "New Query");
        assert_eq!(tabs.active_editor_tab().query(), "SELECT * FROM inventory;");
    }

    #[test]
    fn edits_derive_names() {
        let (_fixtures, mut tabs) = setup();
        let selection = reconcile(
            &mut tabs,
            SyncEvent::QueryEdited("DELETE FROM sessions WHERE expired;".into()),
        );
        assert_eq!(selection.tab_name, "DELETE sessions");
    }

    #[test]
    fn unknown_tab_keeps_current_selection() {
        let (_fixtures, mut tabs) = setup();
        let before = Selection::of(&tabs);
        let after = reconcile(&mut tabs, SyncEvent::TabActivated(EditorTabId::new()));
        assert_eq!(before, after);
    }
}
