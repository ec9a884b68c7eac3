use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Cell, Clear, Paragraph, Row, Table};
use ratatui::{Frame, Terminal};
use sqlpad_adapters::export::{export_result, suggested_file_name, ExportFormat};
use sqlpad_core::fixtures::{CellValue, ResultSet};
use sqlpad_core::layout::LayoutDirection;
use sqlpad_core::schema::{count_table_sql, SchemaCatalog};
use sqlpad_core::session::Session;
use sqlpad_core::tabs::{
    OutputKind, OutputTabId, Panel, CLEAR_OUTPUT_TABS_PROMPT, CLOSE_OUTPUT_TAB_PROMPT,
};
use thiserror::Error;

const TICK_RATE: Duration = Duration::from_millis(50);
const ROW_PX: f64 = 16.0;
const COLUMN_PX: f64 = 8.0;
const RESIZE_STEP_PX: f64 = 80.0;
const CHART_BAR_LIMIT: usize = 24;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pane {
    Workspace,
    History,
    Explorer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Text,
    Command,
    Filter,
    Rename,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    PageUp,
    PageDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingConfirm {
    CloseOutput(OutputTabId),
    ClearResults,
}

impl PendingConfirm {
    fn prompt(self) -> &'static str {
        match self {
            Self::CloseOutput(_) => CLOSE_OUTPUT_TAB_PROMPT,
            Self::ClearResults => CLEAR_OUTPUT_TABS_PROMPT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NextPane,
    Execute,
    NewTab,
    CloseTab,
    NextTab,
    PrevTab,
    Rename,
    NextFixture,
    Visualize,
    ClearResults,
    ToggleOutputMode,
    ToggleFullscreen,
    ToggleSidebar,
    ResizeSplit(i8),
    InsertChar(char),
    DeleteChar,
    Newline,
    Navigate(DirectionKey),
    Submit,
    Cancel,
    RerunHistory,
    ClearHistory,
    Export(ExportFormat),
    CountRows,
    Confirm(bool),
    Tick,
}

struct TuiApp {
    session: Session,
    export_dir: PathBuf,
    pane: Pane,
    confirm: Option<PendingConfirm>,
    show_help: bool,
    should_quit: bool,
    results_offset: usize,
    history_cursor: usize,
    explorer_filter: String,
    explorer_cursor: usize,
    viewport: (u16, u16),
    status_line: String,
}

impl TuiApp {
    fn new(session: Session, export_dir: PathBuf) -> Self {
        Self {
            session,
            export_dir,
            pane: Pane::Workspace,
            confirm: None,
            show_help: false,
            should_quit: false,
            results_offset: 0,
            history_cursor: 0,
            explorer_filter: String::new(),
            explorer_cursor: 0,
            viewport: (120, 40),
            status_line: "F5 runs the active tab, F1 shows all keys".to_string(),
        }
    }

    fn input_mode(&self) -> InputMode {
        if self.confirm.is_some() {
            InputMode::Confirm
        } else if self.session.tabs().rename_session().is_some() {
            InputMode::Rename
        } else {
            match self.pane {
                Pane::Workspace if self.session.tabs().active_panel() == Panel::Editor => {
                    InputMode::Text
                }
                Pane::Explorer => InputMode::Filter,
                Pane::Workspace | Pane::History => InputMode::Command,
            }
        }
    }

    fn handle(&mut self, msg: Msg) {
        let now = Instant::now();
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.show_help = !self.show_help,
            Msg::NextPane => self.next_pane(now),
            Msg::Execute => self.execute(now),
            Msg::NewTab => {
                self.session.add_editor_tab();
                self.session.select_tab(Panel::Editor, now);
                self.pane = Pane::Workspace;
                self.status_line = "Opened a new query tab".to_string();
            }
            Msg::CloseTab => self.close_tab(),
            Msg::NextTab => self.cycle_tab(1, now),
            Msg::PrevTab => self.cycle_tab(-1, now),
            Msg::Rename => {
                let id = self.session.tabs().active_editor_id();
                self.session.begin_rename(id);
            }
            Msg::NextFixture => self.next_fixture(),
            Msg::Visualize => self.visualize(),
            Msg::ClearResults => self.confirm = Some(PendingConfirm::ClearResults),
            Msg::ToggleOutputMode => {
                self.session.toggle_output_mode();
                self.status_line = format!(
                    "Layout: {}",
                    self.session.layout().direction().as_str()
                );
            }
            Msg::ToggleFullscreen => self.session.layout_mut().toggle_fullscreen(),
            Msg::ToggleSidebar => {
                self.session.layout_mut().toggle_sidebar();
                if !self.session.layout().sidebar_open() {
                    self.pane = Pane::Workspace;
                }
            }
            Msg::ResizeSplit(step) => self.resize_split(step),
            Msg::InsertChar(character) => self.insert_char(character),
            Msg::DeleteChar => self.delete_char(),
            Msg::Newline => self.insert_char('\n'),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::Submit => self.submit(now),
            Msg::Cancel => {
                if self.session.tabs().rename_session().is_some() {
                    self.session.cancel_rename();
                } else {
                    self.show_help = false;
                }
            }
            Msg::RerunHistory => self.open_history(true, now),
            Msg::ClearHistory => {
                self.session.clear_history();
                self.history_cursor = 0;
                self.status_line = "History cleared".to_string();
            }
            Msg::Export(format) => self.export(format),
            Msg::CountRows => self.open_table(true),
            Msg::Confirm(answer) => self.resolve_confirm(answer),
            Msg::Tick => self.on_tick(now),
        }
    }

    fn on_tick(&mut self, now: Instant) {
        if self.session.poll(now) > 0 {
            self.status_line = match self.session.error_message() {
                Some(error) => error,
                None => format!(
                    "Query finished in {}",
                    self.session.executor().execution_time().unwrap_or("-")
                ),
            };
        }
    }

    fn execute(&mut self, now: Instant) {
        self.results_offset = 0;
        match self.session.execute(now) {
            Ok(_) => self.status_line = "Running query...".to_string(),
            Err(error) => self.status_line = error.to_string(),
        }
    }

    fn next_pane(&mut self, now: Instant) {
        let sidebar_open = self.session.layout().sidebar_open();
        match (self.pane, self.session.tabs().active_panel()) {
            (Pane::Workspace, Panel::Editor) => self.session.select_tab(Panel::Results, now),
            (Pane::Workspace, Panel::Results) if sidebar_open => self.pane = Pane::History,
            (Pane::History, _) => self.pane = Pane::Explorer,
            (Pane::Workspace, Panel::Results) | (Pane::Explorer, _) => {
                self.pane = Pane::Workspace;
                self.session.select_tab(Panel::Editor, now);
            }
        }
    }

    fn cycle_tab(&mut self, step: isize, now: Instant) {
        let tabs = self.session.tabs();
        if tabs.active_panel() == Panel::Editor {
            let ids = tabs.editor_tabs().iter().map(|tab| tab.id()).collect::<Vec<_>>();
            let current = ids
                .iter()
                .position(|id| *id == tabs.active_editor_id())
                .unwrap_or(0);
            let next = ids[wrap_index(current, step, ids.len())];
            self.session.select_tab(next, now);
        } else {
            let ids = tabs.output_tabs().iter().map(|tab| tab.id()).collect::<Vec<_>>();
            if ids.is_empty() {
                return;
            }
            let current = tabs
                .active_output_id()
                .and_then(|active| ids.iter().position(|id| *id == active))
                .unwrap_or(0);
            let next = ids[wrap_index(current, step, ids.len())];
            self.results_offset = 0;
            self.session.select_tab(next, now);
        }
    }

    fn close_tab(&mut self) {
        let tabs = self.session.tabs();
        if tabs.active_panel() == Panel::Editor {
            let id = tabs.active_editor_id();
            if !self.session.close_editor_tab(id) {
                self.status_line = "The last query tab cannot be closed".to_string();
            }
        } else if let Some(id) = tabs.active_output_id() {
            self.confirm = Some(PendingConfirm::CloseOutput(id));
        }
    }

    fn resolve_confirm(&mut self, answer: bool) {
        let Some(pending) = self.confirm.take() else {
            return;
        };
        let confirmer = |_: &str| answer;
        match pending {
            PendingConfirm::CloseOutput(id) => {
                if self.session.close_output_tab(id, &confirmer) {
                    self.results_offset = 0;
                    self.status_line = "Output tab closed".to_string();
                }
            }
            PendingConfirm::ClearResults => {
                if self.session.clear_results(&confirmer) {
                    self.results_offset = 0;
                    self.status_line = "Results cleared".to_string();
                }
            }
        }
    }

    fn next_fixture(&mut self) {
        let fixtures = self.session.fixtures();
        let queries = fixtures.list_queries();
        if queries.is_empty() {
            return;
        }
        let current = self
            .session
            .tabs()
            .active_editor_tab()
            .query_id()
            .and_then(|id| queries.iter().position(|query| query.id == id));
        let next = current.map_or(0, |index| (index + 1) % queries.len());
        let query_id = queries[next].id.clone();
        let name = queries[next].name.clone();
        if self.session.select_fixture(&query_id) {
            self.status_line = format!("Selected `{name}`, press F5 to run it");
        }
    }

    fn visualize(&mut self) {
        let Some(source) = self.session.tabs().active_output_id() else {
            self.status_line = "Run a query before opening a chart".to_string();
            return;
        };
        match self.session.create_visualization(source) {
            Some(_) => self.status_line = "Opened visualization tab".to_string(),
            None => self.status_line = "This tab has no rows to chart yet".to_string(),
        }
    }

    fn resize_split(&mut self, step: i8) {
        let direction = self.session.layout().direction();
        let container_px = match direction {
            LayoutDirection::Vertical => f64::from(self.viewport.1) * ROW_PX,
            LayoutDirection::Horizontal => f64::from(self.viewport.0) * COLUMN_PX,
        };
        let layout = self.session.layout_mut();
        layout.begin_split_resize(0.0);
        layout.split_resize_to(f64::from(step) * RESIZE_STEP_PX, container_px);
        layout.end_split_resize();
    }

    fn insert_char(&mut self, character: char) {
        match self.input_mode() {
            InputMode::Rename => {
                if let Some(session) = self.session.tabs().rename_session() {
                    let mut draft = session.draft.clone();
                    draft.push(character);
                    self.session.set_rename_draft(draft);
                }
            }
            InputMode::Filter => {
                self.explorer_filter.push(character);
                self.explorer_cursor = 0;
            }
            InputMode::Text => {
                let tab = self.session.tabs().active_editor_tab();
                let id = tab.id();
                let mut text = tab.query().to_string();
                text.push(character);
                self.session.update_query_text(id, text);
            }
            InputMode::Command | InputMode::Confirm => {}
        }
    }

    fn delete_char(&mut self) {
        match self.input_mode() {
            InputMode::Rename => {
                if let Some(session) = self.session.tabs().rename_session() {
                    let mut draft = session.draft.clone();
                    draft.pop();
                    self.session.set_rename_draft(draft);
                }
            }
            InputMode::Filter => {
                self.explorer_filter.pop();
                self.explorer_cursor = 0;
            }
            InputMode::Text => {
                let tab = self.session.tabs().active_editor_tab();
                let id = tab.id();
                let mut text = tab.query().to_string();
                text.pop();
                self.session.update_query_text(id, text);
            }
            InputMode::Command | InputMode::Confirm => {}
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        let step = match direction {
            DirectionKey::Up => -1,
            DirectionKey::Down => 1,
            DirectionKey::PageUp => -10,
            DirectionKey::PageDown => 10,
        };
        match self.pane {
            Pane::Workspace => {
                let rows = self
                    .session
                    .tabs()
                    .active_cached_result()
                    .map_or(0, |cached| cached.rows().len());
                self.results_offset = move_cursor(self.results_offset, step, rows);
            }
            Pane::History => {
                let entries = self.session.history().len();
                self.history_cursor = move_cursor(self.history_cursor, step, entries);
            }
            Pane::Explorer => {
                let tables = self.explorer_tables().len();
                self.explorer_cursor = move_cursor(self.explorer_cursor, step, tables);
            }
        }
    }

    fn submit(&mut self, now: Instant) {
        if self.session.tabs().rename_session().is_some() {
            self.session.commit_rename();
            return;
        }
        match self.pane {
            Pane::History => self.open_history(false, now),
            Pane::Explorer => self.open_table(false),
            Pane::Workspace => {}
        }
    }

    fn open_history(&mut self, execute: bool, now: Instant) {
        if self.pane != Pane::History {
            return;
        }
        let Some(record) = self.session.history().nth(self.history_cursor).cloned() else {
            self.status_line = "History is empty".to_string();
            return;
        };
        match self.session.open_history(&record, execute, now) {
            Ok(_) => {
                self.pane = Pane::Workspace;
                self.status_line = format!("Reopened `{}` from history", record.tab_name);
            }
            Err(error) => self.status_line = error.to_string(),
        }
    }

    fn explorer_tables(&self) -> Vec<(String, String)> {
        SchemaCatalog::builtin()
            .filter(&self.explorer_filter)
            .databases
            .into_iter()
            .flat_map(|database| {
                database
                    .tables
                    .into_iter()
                    .map(move |table| (database.name.clone(), table.name))
            })
            .collect()
    }

    fn open_table(&mut self, count: bool) {
        let tables = self.explorer_tables();
        let Some((_, table)) = tables.get(self.explorer_cursor) else {
            self.status_line = "No table matches the filter".to_string();
            return;
        };
        let custom_sql = count.then(|| count_table_sql(table));
        self.session.open_table(table, custom_sql.as_deref());
        self.pane = Pane::Workspace;
        self.status_line = format!("Opened `{table}` in a new tab");
    }

    fn export(&mut self, format: ExportFormat) {
        let tabs = self.session.tabs();
        let (Some(tab), Some(cached)) = (tabs.active_output_tab(), tabs.active_cached_result())
        else {
            self.status_line = "Nothing to export".to_string();
            return;
        };
        let path = self
            .export_dir
            .join(suggested_file_name(tab.name(), format));
        self.status_line = match export_result(&path, format, cached.rows()) {
            Ok(rows) => format!("Exported {rows} rows to {}", path.display()),
            Err(error) => {
                tracing::warn!(%error, "export failed");
                format!("Export failed: {error}")
            }
        };
    }
}

fn wrap_index(current: usize, step: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let len = isize::try_from(len).unwrap_or(isize::MAX);
    let current = isize::try_from(current).unwrap_or(0);
    usize::try_from((current + step).rem_euclid(len)).unwrap_or(0)
}

fn move_cursor(current: usize, step: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    current.saturating_add_signed(step).min(len - 1)
}

#[must_use]
pub fn ui_name() -> &'static str {
    "sqlpad-tui"
}

pub fn run(session: Session, export_dir: PathBuf) -> Result<(), TuiError> {
    tracing::info!(export_dir = %export_dir.display(), "starting workbench ui");
    let mut terminal = setup_terminal()?;
    let mut app = TuiApp::new(session, export_dir);
    let run_result = run_loop(&mut terminal, &mut app);
    app.session.teardown();
    let restore_result = restore_terminal(&mut terminal);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut TuiApp,
) -> Result<(), TuiError> {
    let mut last_tick = Instant::now();

    loop {
        let size = terminal.size()?;
        app.viewport = (size.width, size.height);
        terminal.draw(|frame| render(frame, app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key, app.input_mode()) {
                        app.handle(message);
                    }
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.handle(Msg::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);

    let layout = app.session.layout();
    let mut body = chunks[1];
    if layout.sidebar_open() && !layout.is_fullscreen() {
        let sidebar_cells = (f64::from(layout.sidebar_width()) / COLUMN_PX).round();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let sidebar_cells = sidebar_cells as u16;
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(sidebar_cells), Constraint::Min(20)])
            .split(body);
        render_sidebar(frame, app, columns[0]);
        body = columns[1];
    }

    if layout.is_fullscreen() {
        render_results(frame, app, body);
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let editor_share = layout.split_percent().round() as u16;
        let direction = match layout.direction() {
            LayoutDirection::Vertical => Direction::Vertical,
            LayoutDirection::Horizontal => Direction::Horizontal,
        };
        let split = Layout::default()
            .direction(direction)
            .constraints([
                Constraint::Percentage(editor_share),
                Constraint::Percentage(100_u16.saturating_sub(editor_share)),
            ])
            .split(body);
        render_editor(frame, app, split[0]);
        render_results(frame, app, split[1]);
    }

    let footer = Paragraph::new(vec![
        Line::from(footer_hint(app.input_mode())),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Keys"));
    frame.render_widget(footer, chunks[2]);

    if let Some(pending) = app.confirm {
        render_confirm(frame, pending);
    } else if app.show_help {
        render_help_popup(frame);
    }
}

fn render_header(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let selection = app.session.selection();
    let fixture_name = selection
        .query_id
        .as_deref()
        .and_then(|id| app.session.fixtures().query(id))
        .map_or("custom text", |query| query.name.as_str());

    let mut spans = vec![
        Span::styled(
            format!(" {} ", selection.tab_name),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Fixture: {fixture_name}")),
        Span::raw(" | "),
        Span::raw(if app.session.is_loading() {
            "Query: running"
        } else {
            "Query: idle"
        }),
    ];
    if app.session.query_modified() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            "Query changed, press F5 to run it",
            Style::default().fg(Color::Cyan),
        ));
    }
    if let Some(error) = app.session.error_message() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(error, Style::default().fg(Color::Red)));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("SQL Pad"));
    frame.render_widget(header, area);
}

fn tab_strip<'a>(labels: impl Iterator<Item = (String, bool)>) -> Line<'a> {
    let mut spans = Vec::new();
    for (label, active) in labels {
        let style = if active {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {label} "), style));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn render_editor(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let tabs = app.session.tabs();
    let rename = tabs.rename_session();
    let strip = tab_strip(tabs.editor_tabs().iter().map(|tab| {
        let label = match rename {
            Some(session) if session.tab_id == tab.id() => format!("{}_", session.draft),
            _ if tab.renamed() => format!("{}*", tab.name()),
            _ => tab.name().to_string(),
        };
        (label, tab.id() == tabs.active_editor_id())
    }));

    let mut lines = vec![strip, Line::from("")];
    lines.extend(
        tabs.active_editor_tab()
            .query()
            .split('\n')
            .map(|line| Line::from(line.to_string())),
    );

    let focused = app.pane == Pane::Workspace && tabs.active_panel() == Panel::Editor;
    let editor = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(focus_style(focused))
            .title("Editor"),
    );
    frame.render_widget(editor, area);
}

fn render_results(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let tabs = app.session.tabs();
    let focused = app.pane == Pane::Workspace && tabs.active_panel() == Panel::Results;
    let title = match app.session.executor().execution_time() {
        Some(time) => format!("Results ({time})"),
        None => "Results".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_style(focused))
        .title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(inner);

    let strip = tab_strip(tabs.output_tabs().iter().map(|tab| {
        let marker = match tab.kind() {
            OutputKind::Results => "",
            OutputKind::Visualization => "~ ",
        };
        (
            format!("{marker}{}", tab.name()),
            Some(tab.id()) == tabs.active_output_id(),
        )
    }));
    frame.render_widget(Paragraph::new(strip), sections[0]);

    let Some(active) = tabs.active_output_tab() else {
        frame.render_widget(
            Paragraph::new("No output yet. Run a query with F5."),
            sections[1],
        );
        return;
    };

    match (active.cached(), active.kind()) {
        (Some(cached), OutputKind::Results) => {
            render_table(frame, cached.rows(), app.results_offset, sections[1]);
        }
        (Some(cached), OutputKind::Visualization) => {
            render_chart(frame, cached.rows(), sections[1]);
        }
        (None, _) if app.session.is_loading() || active.is_pending() => {
            frame.render_widget(Paragraph::new("Loading..."), sections[1]);
        }
        (None, _) => {
            frame.render_widget(
                Paragraph::new("No results for this tab.")
                    .style(Style::default().fg(Color::Red)),
                sections[1],
            );
        }
    }
}

fn render_table(frame: &mut Frame<'_>, rows: &ResultSet, offset: usize, area: Rect) {
    let visible = usize::from(area.height.saturating_sub(1)).max(1);
    let start = offset.min(rows.len().saturating_sub(1));
    let header = Row::new(
        rows.columns()
            .iter()
            .map(|column| Cell::from(column.clone()))
            .collect::<Vec<_>>(),
    )
    .style(Style::default().add_modifier(Modifier::BOLD));
    let body = rows.rows().iter().skip(start).take(visible).map(|row| {
        Row::new(
            row.iter()
                .map(|value| Cell::from(value.to_string()))
                .collect::<Vec<_>>(),
        )
    });
    let widths = vec![Constraint::Min(6); rows.columns().len().max(1)];
    frame.render_widget(Table::new(body, widths).header(header), area);
}

fn chart_bars(rows: &ResultSet) -> Vec<(String, u64)> {
    let Some(first) = rows.record(0) else {
        return Vec::new();
    };
    let value_column = first
        .iter()
        .find(|(_, value)| matches!(value, CellValue::Number(_)))
        .map(|(column, _)| column.to_string());
    let label_column = first
        .iter()
        .find(|(_, value)| matches!(value, CellValue::Text(_)))
        .map(|(column, _)| column.to_string());
    let Some(value_column) = value_column else {
        return Vec::new();
    };

    rows.records()
        .take(CHART_BAR_LIMIT)
        .enumerate()
        .map(|(index, record)| {
            let label = label_column
                .as_deref()
                .and_then(|column| record.get(column))
                .map_or_else(|| (index + 1).to_string(), ToString::to_string);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let value = record
                .get(&value_column)
                .and_then(CellValue::as_f64)
                .map_or(0, |number| number.max(0.0).round() as u64);
            (label, value)
        })
        .collect()
}

fn render_chart(frame: &mut Frame<'_>, rows: &ResultSet, area: Rect) {
    let bars = chart_bars(rows);
    if bars.is_empty() {
        frame.render_widget(Paragraph::new("No numeric column to chart."), area);
        return;
    }
    let bars = bars
        .into_iter()
        .map(|(label, value)| Bar::default().value(value).label(Line::from(label)))
        .collect::<Vec<_>>();
    let chart = BarChart::default()
        .data(BarGroup::default().bars(&bars))
        .bar_width(7)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Cyan));
    frame.render_widget(chart, area);
}

fn render_sidebar(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let mut history = Vec::new();
    for (index, entry) in app.session.history().entries().enumerate() {
        let marker = if index == app.history_cursor { ">" } else { " " };
        history.push(Line::from(format!(
            "{marker} {} {} ({} rows, {})",
            entry.time_label(),
            entry.tab_name,
            entry.row_count,
            entry.execution_time
        )));
    }
    if history.is_empty() {
        history.push(Line::from("No queries run yet"));
    }
    frame.render_widget(
        Paragraph::new(history).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(focus_style(app.pane == Pane::History))
                .title("History"),
        ),
        sections[0],
    );

    let catalog = SchemaCatalog::builtin().filter(&app.explorer_filter);
    let mut explorer = vec![Line::from(format!("Filter: {}", app.explorer_filter))];
    let mut index = 0;
    for database in &catalog.databases {
        explorer.push(Line::from(Span::styled(
            database.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for table in &database.tables {
            let selected = index == app.explorer_cursor;
            explorer.push(Line::from(format!(
                "{} {}",
                if selected { ">" } else { " " },
                table.name
            )));
            if selected {
                for column in &table.columns {
                    explorer.push(Line::from(format!(
                        "     {} {}{}",
                        column.name,
                        column.data_type,
                        if column.primary_key { " PK" } else { "" }
                    )));
                }
            }
            index += 1;
        }
    }
    frame.render_widget(
        Paragraph::new(explorer).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(focus_style(app.pane == Pane::Explorer))
                .title("Explorer"),
        ),
        sections[1],
    );
}

fn footer_hint(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Text => {
            "F5 run | F2 rename | F3 next fixture | Ctrl+T new tab | Ctrl+W close | \
             Tab results | F1 help"
        }
        InputMode::Command => {
            "Up/Down scroll | Ctrl+Left/Right switch tab | x close | v chart | c/J export | \
             Enter/r reopen history"
        }
        InputMode::Filter => {
            "Type to filter | Enter open table | Ctrl+N count rows | Tab next pane"
        }
        InputMode::Rename => "Enter save name | Esc cancel",
        InputMode::Confirm => "y confirm | n cancel",
    }
}

fn render_confirm(frame: &mut Frame<'_>, pending: PendingConfirm) {
    let area = centered_rect(50, 20, frame.area());
    frame.render_widget(Clear, area);
    let dialog = Paragraph::new(vec![
        Line::from(pending.prompt()),
        Line::from(""),
        Line::from("y: yes    n: no"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Confirm"));
    frame.render_widget(dialog, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Global keymap"),
        Line::from("Ctrl+Q: quit"),
        Line::from("F1: toggle help"),
        Line::from("Tab: editor -> results -> history -> explorer"),
        Line::from("F5 / Ctrl+R: run the active query tab"),
        Line::from("Ctrl+T / Ctrl+W: open / close tab"),
        Line::from("Ctrl+Left / Ctrl+Right: previous / next tab"),
        Line::from("F2: rename tab, F3: next predefined query"),
        Line::from("F4: chart the active output tab"),
        Line::from("Ctrl+L: clear all output tabs"),
        Line::from("Ctrl+O: toggle output layout, Ctrl+F: fullscreen results"),
        Line::from("Ctrl+B: toggle sidebar, Ctrl+Up / Ctrl+Down: resize split"),
        Line::from("Results: c export CSV, J export JSON, x close, v chart"),
        Line::from("History: Enter reopen, r reopen and run, D clear"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}

fn map_key_event(key: KeyEvent, mode: InputMode) -> Option<Msg> {
    match mode {
        InputMode::Confirm => {
            return match key.code {
                KeyCode::Char('y' | 'Y') | KeyCode::Enter => Some(Msg::Confirm(true)),
                KeyCode::Char('n' | 'N') | KeyCode::Esc => Some(Msg::Confirm(false)),
                _ => None,
            };
        }
        InputMode::Rename => {
            return match key.code {
                KeyCode::Enter => Some(Msg::Submit),
                KeyCode::Esc => Some(Msg::Cancel),
                KeyCode::Backspace => Some(Msg::DeleteChar),
                KeyCode::Char(character) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(Msg::InsertChar(character))
                }
                _ => None,
            };
        }
        InputMode::Text | InputMode::Command | InputMode::Filter => {}
    }

    let global = match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('q')) => Some(Msg::Quit),
        (_, KeyCode::F(1)) => Some(Msg::ToggleHelp),
        (_, KeyCode::Esc) => Some(Msg::Cancel),
        (_, KeyCode::Tab) => Some(Msg::NextPane),
        (_, KeyCode::F(5)) | (KeyModifiers::CONTROL, KeyCode::Char('r')) => Some(Msg::Execute),
        (KeyModifiers::CONTROL, KeyCode::Char('t')) => Some(Msg::NewTab),
        (KeyModifiers::CONTROL, KeyCode::Char('w')) => Some(Msg::CloseTab),
        (KeyModifiers::CONTROL, KeyCode::Right) => Some(Msg::NextTab),
        (KeyModifiers::CONTROL, KeyCode::Left) => Some(Msg::PrevTab),
        (KeyModifiers::CONTROL, KeyCode::Up) => Some(Msg::ResizeSplit(-1)),
        (KeyModifiers::CONTROL, KeyCode::Down) => Some(Msg::ResizeSplit(1)),
        (_, KeyCode::F(2)) => Some(Msg::Rename),
        (_, KeyCode::F(3)) => Some(Msg::NextFixture),
        (_, KeyCode::F(4)) => Some(Msg::Visualize),
        (_, KeyCode::F(11)) | (KeyModifiers::CONTROL, KeyCode::Char('f')) => {
            Some(Msg::ToggleFullscreen)
        }
        (KeyModifiers::CONTROL, KeyCode::Char('l')) => Some(Msg::ClearResults),
        (KeyModifiers::CONTROL, KeyCode::Char('o')) => Some(Msg::ToggleOutputMode),
        (KeyModifiers::CONTROL, KeyCode::Char('b')) => Some(Msg::ToggleSidebar),
        (KeyModifiers::CONTROL, KeyCode::Char('n')) if mode == InputMode::Filter => {
            Some(Msg::CountRows)
        }
        (_, KeyCode::Up) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::PageUp) => Some(Msg::Navigate(DirectionKey::PageUp)),
        (_, KeyCode::PageDown) => Some(Msg::Navigate(DirectionKey::PageDown)),
        _ => None,
    };
    if global.is_some() {
        return global;
    }

    match (mode, key.code) {
        (InputMode::Text, KeyCode::Enter) => Some(Msg::Newline),
        (InputMode::Text | InputMode::Filter, KeyCode::Backspace) => Some(Msg::DeleteChar),
        (InputMode::Text | InputMode::Filter, KeyCode::Char(character))
            if !key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Msg::InsertChar(character))
        }
        (InputMode::Filter | InputMode::Command, KeyCode::Enter) => Some(Msg::Submit),
        (InputMode::Command, KeyCode::Char('x')) => Some(Msg::CloseTab),
        (InputMode::Command, KeyCode::Char('v')) => Some(Msg::Visualize),
        (InputMode::Command, KeyCode::Char('c')) => Some(Msg::Export(ExportFormat::Csv)),
        (InputMode::Command, KeyCode::Char('J')) => Some(Msg::Export(ExportFormat::Json)),
        (InputMode::Command, KeyCode::Char('r')) => Some(Msg::RerunHistory),
        (InputMode::Command, KeyCode::Char('D')) => Some(Msg::ClearHistory),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use sqlpad_adapters::export::ExportFormat;
    use sqlpad_core::executor::DelayStrategy;
    use sqlpad_core::fixtures::FixtureStore;
    use sqlpad_core::history::QueryHistory;
    use sqlpad_core::layout::Layout;
    use sqlpad_core::session::Session;
    use sqlpad_core::tabs::Panel;
    use tempfile::TempDir;

    use super::{chart_bars, map_key_event, wrap_index, InputMode, Msg, Pane, TuiApp};

    fn app(temp_dir: &TempDir) -> TuiApp {
        let session = Session::new(
            Arc::new(FixtureStore::builtin().expect("fixtures")),
            DelayStrategy::Fixed(Duration::ZERO),
            QueryHistory::default(),
            Layout::default(),
        );
        TuiApp::new(session, temp_dir.path().to_path_buf())
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(character: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(character), KeyModifiers::CONTROL)
    }

    fn type_text(app: &mut TuiApp, text: &str) {
        for character in text.chars() {
            app.handle(Msg::InsertChar(character));
        }
    }

    fn clear_editor(app: &mut TuiApp) {
        let len = app.session.tabs().active_editor_tab().query().chars().count();
        for _ in 0..len {
            app.handle(Msg::DeleteChar);
        }
    }

    #[test]
    fn keymap_supports_required_global_keys() {
        assert_eq!(map_key_event(ctrl('q'), InputMode::Text), Some(Msg::Quit));
        assert_eq!(map_key_event(key(KeyCode::F(5)), InputMode::Command), Some(Msg::Execute));
        assert_eq!(map_key_event(ctrl('r'), InputMode::Text), Some(Msg::Execute));
        assert_eq!(map_key_event(key(KeyCode::Tab), InputMode::Filter), Some(Msg::NextPane));
        assert_eq!(map_key_event(ctrl('l'), InputMode::Command), Some(Msg::ClearResults));
    }

    #[test]
    fn letters_type_in_editor_but_act_in_results() {
        assert_eq!(
            map_key_event(key(KeyCode::Char('x')), InputMode::Text),
            Some(Msg::InsertChar('x'))
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('x')), InputMode::Command),
            Some(Msg::CloseTab)
        );
        assert_eq!(
            map_key_event(key(KeyCode::Char('J')), InputMode::Command),
            Some(Msg::Export(ExportFormat::Json))
        );
        assert_eq!(map_key_event(key(KeyCode::Enter), InputMode::Text), Some(Msg::Newline));
    }

    #[test]
    fn confirm_and_rename_modes_capture_keys() {
        assert_eq!(
            map_key_event(key(KeyCode::Char('y')), InputMode::Confirm),
            Some(Msg::Confirm(true))
        );
        assert_eq!(map_key_event(key(KeyCode::Esc), InputMode::Confirm), Some(Msg::Confirm(false)));
        assert_eq!(map_key_event(ctrl('q'), InputMode::Confirm), None);
        assert_eq!(map_key_event(key(KeyCode::Esc), InputMode::Rename), Some(Msg::Cancel));
        assert_eq!(
            map_key_event(key(KeyCode::Char('q')), InputMode::Rename),
            Some(Msg::InsertChar('q'))
        );
    }

    #[test]
    fn typing_rederives_tab_name() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);

        clear_editor(&mut app);
        assert_eq!(app.session.tabs().active_editor_tab().name(), "New Query");
        type_text(&mut app, "UPDATE orders SET status='shipped';");
        assert_eq!(app.session.tabs().active_editor_tab().name(), "UPDATE orders");
    }

    #[test]
    fn rename_flow_commits_draft() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);

        app.handle(Msg::Rename);
        assert_eq!(app.input_mode(), InputMode::Rename);
        for _ in 0.."New Query".len() {
            app.handle(Msg::DeleteChar);
        }
        type_text(&mut app, "Mine");
        app.handle(Msg::Submit);

        assert_eq!(app.input_mode(), InputMode::Text);
        let tab = app.session.tabs().active_editor_tab();
        assert_eq!(tab.name(), "Mine");
        assert!(tab.renamed());
    }

    #[test]
    fn execute_tick_and_confirmed_close() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);

        app.handle(Msg::Execute);
        app.handle(Msg::Tick);
        let output = app.session.tabs().active_output_id().expect("output tab");
        assert_eq!(
            app.session.tabs().cached_result(output).map(|cached| cached.rows().len()),
            Some(15)
        );

        app.handle(Msg::NextPane);
        assert_eq!(app.session.tabs().active_panel(), Panel::Results);
        app.handle(Msg::CloseTab);
        assert_eq!(app.input_mode(), InputMode::Confirm);
        app.handle(Msg::Confirm(false));
        assert!(app.session.tabs().output_tab(output).is_some());

        app.handle(Msg::CloseTab);
        app.handle(Msg::Confirm(true));
        assert!(app.session.tabs().output_tab(output).is_none());
    }

    #[test]
    fn unmatched_text_reports_error() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);

        type_text(&mut app, " -- edited");
        app.handle(Msg::Execute);
        assert!(app.status_line.starts_with("You can only execute queries"));
        assert!(app.session.tabs().output_tabs().is_empty());
    }

    #[test]
    fn export_writes_active_result() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);

        app.handle(Msg::Execute);
        app.handle(Msg::Tick);
        app.handle(Msg::Export(ExportFormat::Csv));

        let path = temp_dir.path().join("New Query Output.csv");
        let content = std::fs::read_to_string(path).expect("export file");
        assert!(content.starts_with("id,username,name,email,registration_date,is_active"));
        assert_eq!(content.lines().count(), 16);
    }

    #[test]
    fn history_pane_reopens_entries() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);
        app.handle(Msg::Execute);
        app.handle(Msg::Tick);

        app.handle(Msg::ToggleSidebar);
        app.handle(Msg::NextPane);
        app.handle(Msg::NextPane);
        assert_eq!(app.pane, Pane::History);
        app.handle(Msg::Submit);

        assert_eq!(app.pane, Pane::Workspace);
        assert_eq!(app.session.tabs().editor_tabs().len(), 2);
        assert_eq!(app.session.tabs().active_editor_tab().name(), "All Users");
    }

    #[test]
    fn explorer_filter_and_open_table() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut app = app(&temp_dir);
        app.pane = Pane::Explorer;

        type_text(&mut app, "campaigns");
        assert_eq!(app.explorer_tables().len(), 1);
        app.handle(Msg::CountRows);

        let tab = app.session.tabs().active_editor_tab();
        assert_eq!(tab.name(), "SELECT campaigns");
        assert_eq!(tab.query(), "SELECT COUNT(*) FROM campaigns;");
    }

    #[test]
    fn chart_uses_first_numeric_column() {
        let fixtures = FixtureStore::builtin().expect("fixtures");
        let rows = fixtures.results_for("q2").expect("q2 rows");
        let bars = chart_bars(&rows);
        assert_eq!(bars.len(), 10);
        assert!(bars.iter().all(|(label, _)| !label.is_empty()));
    }

    #[test]
    fn tab_cycling_wraps() {
        assert_eq!(wrap_index(0, -1, 3), 2);
        assert_eq!(wrap_index(2, 1, 3), 0);
        assert_eq!(wrap_index(0, 1, 0), 0);
    }
}
