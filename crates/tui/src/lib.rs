use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use doclens_adapters::memory::MemoryBackend;
use doclens_core::completion::{byte_offset, CompletionEngine, CompletionEvent};
use doclens_core::connection_manager::{ConnectionManager, ConnectionOptions};
use doclens_core::console_templates::ConsoleTemplate;
use doclens_core::grid_view::GridView;
use doclens_core::projection::{project, Projection};
use doclens_core::query_runner::{
    DocumentEngine, ExecutionSummary, QueryRunner, QueryRunnerError, TransactionCommand,
};
use doclens_core::query_task::{QueryTask, TaskId};
use doclens_core::settings::FileSettingsStore;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::{Frame, Terminal};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

const TICK_RATE: Duration = Duration::from_millis(120);
const NOT_CONNECTED_MESSAGE: &str = "The database has not been opened!";
const POPUP_ROWS: usize = 8;
const RESULTS_PAGE: usize = 10;
const MAX_CELL_WIDTH: usize = 28;

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to start background runtime: {0}")]
    Runtime(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum SqlFileError {
    #[error("failed to read SQL file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write SQL file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn load_sql_file(path: &Path) -> Result<String, SqlFileError> {
    std::fs::read_to_string(path).map_err(|source| SqlFileError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn save_sql_file(path: &Path, text: &str) -> Result<(), SqlFileError> {
    std::fs::write(path, text).map_err(|source| SqlFileError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug)]
pub struct TuiOptions {
    pub settings: FileSettingsStore,
    pub startup_connection: Option<ConnectionOptions>,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ResultView {
    #[default]
    Grid,
    Text,
    Parameters,
}

impl ResultView {
    fn next(self) -> Self {
        match self {
            Self::Grid => Self::Text,
            Self::Text => Self::Parameters,
            Self::Parameters => Self::Grid,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Grid => "Grid",
            Self::Text => "Text",
            Self::Parameters => "Parameters",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    ToggleHelp,
    NewTab,
    CloseTab,
    NextTab,
    Run,
    Transaction(TransactionCommand),
    NextResultView,
    OpenTemplates,
    OpenDatabasePrompt,
    CloseDatabase,
    LoadSql,
    SaveSql,
    ToggleConnectOnStart,
    Input(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Home,
    End,
    Escape,
    Navigate(DirectionKey),
    ScrollResults(DirectionKey),
    Tick,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Editor {
    text: String,
    caret: usize,
}

impl Editor {
    fn with_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            caret: text.chars().count(),
        }
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn insert(&mut self, character: char) {
        let at = byte_offset(&self.text, self.caret);
        self.text.insert(at, character);
        self.caret += 1;
    }

    fn backspace(&mut self) {
        if self.caret == 0 {
            return;
        }
        self.caret -= 1;
        let at = byte_offset(&self.text, self.caret);
        self.text.remove(at);
    }

    fn delete(&mut self) {
        if self.caret < self.len() {
            let at = byte_offset(&self.text, self.caret);
            self.text.remove(at);
        }
    }

    fn move_left(&mut self) {
        self.caret = self.caret.saturating_sub(1);
    }

    fn move_right(&mut self) {
        self.caret = (self.caret + 1).min(self.len());
    }

    fn move_home(&mut self) {
        let (_, column) = self.caret_position();
        self.caret -= column;
    }

    fn move_end(&mut self) {
        self.caret += self
            .text
            .chars()
            .skip(self.caret)
            .take_while(|character| *character != '\n')
            .count();
    }

    fn move_vertical(&mut self, down: bool) {
        let (line, column) = self.caret_position();
        let target = if down {
            line + 1
        } else {
            let Some(previous) = line.checked_sub(1) else {
                return;
            };
            previous
        };

        let lengths = self
            .text
            .split('\n')
            .map(|line| line.chars().count())
            .collect::<Vec<_>>();
        let Some(target_len) = lengths.get(target) else {
            return;
        };
        let line_start = lengths[..target].iter().map(|len| len + 1).sum::<usize>();
        self.caret = line_start + column.min(*target_len);
    }

    fn caret_position(&self) -> (usize, usize) {
        let mut line = 0;
        let mut column = 0;
        for character in self.text.chars().take(self.caret) {
            if character == '\n' {
                line += 1;
                column = 0;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    fn word_at_caret(&self) -> Option<String> {
        let chars = self.text.chars().collect::<Vec<_>>();
        let is_word = |character: &char| character.is_ascii_alphanumeric() || *character == '_';
        let caret = self.caret.min(chars.len());
        let start = chars[..caret]
            .iter()
            .rposition(|character| !is_word(character))
            .map_or(0, |index| index + 1);
        let end = chars[caret..]
            .iter()
            .position(|character| !is_word(character))
            .map_or(chars.len(), |index| caret + index);
        (start < end).then(|| chars[start..end].iter().collect())
    }
}

#[derive(Debug)]
struct ConsoleTab {
    task: QueryTask,
    editor: Editor,
    completion: CompletionEngine,
    projection: Option<Projection>,
    summary: Option<ExecutionSummary>,
    view: ResultView,
    results_scroll: usize,
    running: bool,
    file: Option<PathBuf>,
}

impl ConsoleTab {
    fn new(task: QueryTask, text: &str) -> Self {
        Self {
            task,
            editor: Editor::with_text(text),
            completion: CompletionEngine::new(),
            projection: None,
            summary: None,
            view: ResultView::Grid,
            results_scroll: 0,
            running: false,
            file: None,
        }
    }

    fn content_len(&self) -> usize {
        let Some(projection) = &self.projection else {
            return 0;
        };
        match self.view {
            ResultView::Grid => projection.grid.row_count(),
            ResultView::Text => projection.text.lines().count(),
            ResultView::Parameters => projection.parameters.lines().count(),
        }
    }
}

#[derive(Debug)]
struct QueryCompletion {
    tab: TaskId,
    task: QueryTask,
    projection: Projection,
    result: Result<ExecutionSummary, QueryRunnerError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Overlay {
    #[default]
    None,
    Help,
    Templates {
        selected: usize,
        collection: Option<String>,
    },
    OpenPrompt {
        input: String,
        recent: Option<usize>,
    },
    FilePrompt {
        action: FileAction,
        input: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Load,
    Save,
}

impl FileAction {
    fn title(self) -> &'static str {
        match self {
            Self::Load => "Load SQL file",
            Self::Save => "Save SQL file",
        }
    }
}

#[derive(Debug)]
struct TuiApp {
    runtime: Handle,
    connections: ConnectionManager<MemoryBackend>,
    settings: FileSettingsStore,
    runner: QueryRunner,
    export_dir: PathBuf,
    tabs: Vec<ConsoleTab>,
    active_tab: usize,
    overlay: Overlay,
    running: Option<TaskId>,
    completions_tx: UnboundedSender<QueryCompletion>,
    completions_rx: UnboundedReceiver<QueryCompletion>,
    status_line: String,
    should_quit: bool,
}

impl TuiApp {
    fn new(runtime: Handle, options: TuiOptions) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let mut app = Self {
            runtime,
            connections: ConnectionManager::new(MemoryBackend),
            runner: QueryRunner::new(options.settings.settings().row_limit),
            settings: options.settings,
            export_dir: options.export_dir,
            tabs: vec![ConsoleTab::new(QueryTask::new(), "")],
            active_tab: 0,
            overlay: Overlay::None,
            running: None,
            completions_tx,
            completions_rx,
            status_line: "Ctrl+O opens a database, F1 shows help".to_string(),
            should_quit: false,
        };

        if let Some(connection) = options.startup_connection {
            app.open_database(connection);
        }
        app
    }

    fn active(&self) -> &ConsoleTab {
        &self.tabs[self.active_tab]
    }

    fn active_mut(&mut self) -> &mut ConsoleTab {
        &mut self.tabs[self.active_tab]
    }

    fn handle(&mut self, msg: Msg) {
        if self.handle_overlay(msg) {
            return;
        }

        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::ToggleHelp => self.overlay = Overlay::Help,
            Msg::NewTab => self.push_tab(ConsoleTab::new(QueryTask::new(), "")),
            Msg::CloseTab => self.close_tab(),
            Msg::NextTab => {
                self.active_mut().completion.dismiss();
                self.active_tab = (self.active_tab + 1) % self.tabs.len();
                self.status_line = format!("Switched to {}", self.active().task.title());
            }
            Msg::Run => self.run_active(None),
            Msg::Transaction(command) => self.run_active(Some(command.sql())),
            Msg::NextResultView => {
                let tab = self.active_mut();
                tab.view = tab.view.next();
                tab.results_scroll = 0;
            }
            Msg::OpenTemplates => {
                let tab = self.active_mut();
                tab.completion.dismiss();
                let collection = tab.editor.word_at_caret();
                self.overlay = Overlay::Templates {
                    selected: 0,
                    collection,
                };
            }
            Msg::OpenDatabasePrompt => {
                self.active_mut().completion.dismiss();
                let input = self
                    .settings
                    .last_connection()
                    .map(|entry| entry.path.clone())
                    .unwrap_or_default();
                self.overlay = Overlay::OpenPrompt {
                    input,
                    recent: None,
                };
            }
            Msg::CloseDatabase => self.close_database(),
            Msg::LoadSql => {
                self.active_mut().completion.dismiss();
                self.overlay = Overlay::FilePrompt {
                    action: FileAction::Load,
                    input: self.export_dir.display().to_string(),
                };
            }
            Msg::SaveSql => {
                self.active_mut().completion.dismiss();
                let tab = self.active();
                let path = tab.file.clone().unwrap_or_else(|| {
                    self.export_dir.join(format!("{}.sql", tab.task.title()))
                });
                let input = path.display().to_string();
                self.overlay = Overlay::FilePrompt {
                    action: FileAction::Save,
                    input,
                };
            }
            Msg::ToggleConnectOnStart => {
                let enabled = !self.settings.settings().open_last_on_start;
                self.settings.set_open_last_on_start(enabled);
                self.save_settings();
                self.status_line = if enabled {
                    "Last database will open on start".to_string()
                } else {
                    "No database will open on start".to_string()
                };
            }
            Msg::Input(character) => self.type_char(character),
            Msg::Enter => {
                if self.active().completion.is_open() {
                    self.commit_completion();
                } else {
                    self.active_mut().editor.insert('\n');
                }
            }
            Msg::Tab => {
                if self.active().completion.is_open() {
                    self.commit_completion();
                } else {
                    self.type_char(' ');
                    self.type_char(' ');
                }
            }
            Msg::Backspace => {
                let tab = self.active_mut();
                tab.completion.handle(CompletionEvent::Backspace {
                    document: &tab.editor.text,
                    caret_offset: tab.editor.caret,
                });
                tab.editor.backspace();
            }
            Msg::Delete => {
                let tab = self.active_mut();
                tab.completion.dismiss();
                tab.editor.delete();
            }
            Msg::Home => {
                let tab = self.active_mut();
                tab.completion.dismiss();
                tab.editor.move_home();
            }
            Msg::End => {
                let tab = self.active_mut();
                tab.completion.dismiss();
                tab.editor.move_end();
            }
            Msg::Escape => self.active_mut().completion.dismiss(),
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::ScrollResults(direction) => self.scroll_results(direction),
            Msg::Tick => self.on_tick(),
        }
    }

    fn handle_overlay(&mut self, msg: Msg) -> bool {
        if matches!(msg, Msg::Tick | Msg::Quit) {
            return false;
        }

        self.overlay = match std::mem::take(&mut self.overlay) {
            Overlay::None => return false,
            Overlay::Help => match msg {
                Msg::ToggleHelp | Msg::Escape | Msg::Enter => Overlay::None,
                _ => Overlay::Help,
            },
            Overlay::Templates {
                selected,
                collection,
            } => match msg {
                Msg::Navigate(DirectionKey::Up) => Overlay::Templates {
                    selected: selected
                        .checked_sub(1)
                        .unwrap_or(ConsoleTemplate::ALL.len() - 1),
                    collection,
                },
                Msg::Navigate(DirectionKey::Down) => Overlay::Templates {
                    selected: (selected + 1) % ConsoleTemplate::ALL.len(),
                    collection,
                },
                Msg::Enter => {
                    if let Some(template) = ConsoleTemplate::ALL.get(selected) {
                        self.open_template(*template, collection.as_deref());
                    }
                    Overlay::None
                }
                Msg::Escape | Msg::OpenTemplates => Overlay::None,
                _ => Overlay::Templates {
                    selected,
                    collection,
                },
            },
            Overlay::OpenPrompt { mut input, recent } => match msg {
                Msg::Input(character) => {
                    input.push(character);
                    Overlay::OpenPrompt {
                        input,
                        recent: None,
                    }
                }
                Msg::Backspace => {
                    input.pop();
                    Overlay::OpenPrompt {
                        input,
                        recent: None,
                    }
                }
                Msg::Navigate(direction @ (DirectionKey::Up | DirectionKey::Down)) => {
                    self.cycle_recent(input, recent, direction == DirectionKey::Down)
                }
                Msg::Delete => {
                    self.settings.clear_history();
                    self.save_settings();
                    self.status_line = "Connection history cleared".to_string();
                    Overlay::OpenPrompt {
                        input,
                        recent: None,
                    }
                }
                Msg::Enter if input.trim().is_empty() => Overlay::OpenPrompt { input, recent },
                Msg::Enter => {
                    let options = recent
                        .and_then(|index| self.settings.settings().recent.get(index))
                        .filter(|entry| entry.path == input)
                        .map_or_else(
                            || ConnectionOptions::new(input.trim()),
                            |entry| entry.to_options(),
                        );
                    self.open_database(options);
                    Overlay::None
                }
                Msg::Escape | Msg::OpenDatabasePrompt => Overlay::None,
                _ => Overlay::OpenPrompt { input, recent },
            },
            Overlay::FilePrompt { action, mut input } => match msg {
                Msg::Input(character) => {
                    input.push(character);
                    Overlay::FilePrompt { action, input }
                }
                Msg::Backspace => {
                    input.pop();
                    Overlay::FilePrompt { action, input }
                }
                Msg::Enter if input.trim().is_empty() => Overlay::FilePrompt { action, input },
                Msg::Enter => {
                    let path = PathBuf::from(input.trim());
                    match action {
                        FileAction::Load => self.load_sql(&path),
                        FileAction::Save => self.save_sql(&path),
                    }
                    Overlay::None
                }
                Msg::Escape => Overlay::None,
                _ => Overlay::FilePrompt { action, input },
            },
        };
        true
    }

    fn cycle_recent(&self, input: String, recent: Option<usize>, forward: bool) -> Overlay {
        let entries = &self.settings.settings().recent;
        if entries.is_empty() {
            return Overlay::OpenPrompt { input, recent };
        }

        let index = match (recent, forward) {
            (None, _) => 0,
            (Some(index), true) => (index + 1) % entries.len(),
            (Some(index), false) => index.checked_sub(1).unwrap_or(entries.len() - 1),
        };
        Overlay::OpenPrompt {
            input: entries[index].path.clone(),
            recent: Some(index),
        }
    }

    fn on_tick(&mut self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.apply_completion(completion);
        }
    }

    fn type_char(&mut self, character: char) {
        let tab = self.active_mut();
        tab.completion.handle(CompletionEvent::TextEntering {
            document: &tab.editor.text,
            input: character,
            caret_offset: tab.editor.caret,
            has_selection: false,
        });
        tab.editor.insert(character);
    }

    fn commit_completion(&mut self) {
        let tab = self.active_mut();
        if let Some(caret) = tab.completion.commit(&mut tab.editor.text, tab.editor.caret) {
            tab.editor.caret = caret;
        }
    }

    fn navigate(&mut self, direction: DirectionKey) {
        let tab = self.active_mut();
        if tab.completion.is_open() {
            match direction {
                DirectionKey::Up => return tab.completion.select_previous(),
                DirectionKey::Down => return tab.completion.select_next(),
                DirectionKey::Left | DirectionKey::Right => tab.completion.dismiss(),
            }
        }

        match direction {
            DirectionKey::Up => tab.editor.move_vertical(false),
            DirectionKey::Down => tab.editor.move_vertical(true),
            DirectionKey::Left => tab.editor.move_left(),
            DirectionKey::Right => tab.editor.move_right(),
        }
    }

    fn scroll_results(&mut self, direction: DirectionKey) {
        let tab = self.active_mut();
        let last = tab.content_len().saturating_sub(1);
        tab.results_scroll = match direction {
            DirectionKey::Up | DirectionKey::Left => tab.results_scroll.saturating_sub(RESULTS_PAGE),
            DirectionKey::Down | DirectionKey::Right => {
                (tab.results_scroll + RESULTS_PAGE).min(last)
            }
        };
    }

    fn push_tab(&mut self, tab: ConsoleTab) {
        self.active_mut().completion.dismiss();
        self.tabs.push(tab);
        self.active_tab = self.tabs.len() - 1;
    }

    fn close_tab(&mut self) {
        let closed = self.tabs.remove(self.active_tab);
        debug!(task_id = closed.task.id().get(), "console closed");
        if self.tabs.is_empty() {
            self.tabs.push(ConsoleTab::new(QueryTask::new(), ""));
        }
        self.active_tab = self.active_tab.min(self.tabs.len() - 1);
    }

    fn load_sql(&mut self, path: &Path) {
        match load_sql_file(path) {
            Ok(text) => {
                let title = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |name| {
                        name.to_string_lossy().into_owned()
                    });
                let mut tab = ConsoleTab::new(QueryTask::with_source(title, ""), &text);
                tab.file = Some(path.to_path_buf());
                self.push_tab(tab);
                info!(path = %path.display(), "sql file loaded");
                self.status_line = format!("Loaded {}", path.display());
            }
            Err(error) => {
                warn!(%error, "sql file load failed");
                self.status_line = error.to_string();
            }
        }
    }

    fn save_sql(&mut self, path: &Path) {
        let result = save_sql_file(path, &self.active().editor.text);
        match result {
            Ok(()) => {
                self.active_mut().file = Some(path.to_path_buf());
                info!(path = %path.display(), "sql file saved");
                self.status_line = format!("Saved {}", path.display());
            }
            Err(error) => {
                warn!(%error, "sql file save failed");
                self.status_line = error.to_string();
            }
        }
    }

    fn open_template(&mut self, template: ConsoleTemplate, collection: Option<&str>) {
        match template.render(collection, &self.export_dir) {
            Ok(sql) => {
                let task = match collection.filter(|_| template.requires_collection()) {
                    Some(name) => QueryTask::with_source(name, ""),
                    None => QueryTask::new(),
                };
                info!(template = template.title(), "console opened from template");
                self.push_tab(ConsoleTab::new(task, &sql));
                self.status_line = format!("{} ready, F5 to run", template.title());
            }
            Err(error) => self.status_line = error.to_string(),
        }
    }

    fn run_active(&mut self, statement: Option<&str>) {
        if let Some(running) = self.running {
            self.status_line = format!("Query {} is still running", running.get());
            return;
        }
        let Some(engine) = self.connections.engine().filter(|engine| engine.is_open()) else {
            self.status_line = NOT_CONNECTED_MESSAGE.to_string();
            return;
        };

        let runner = self.runner;
        let sender = self.completions_tx.clone();
        let tab = &mut self.tabs[self.active_tab];
        tab.completion.dismiss();
        let text = statement.map_or_else(|| tab.editor.text.clone(), str::to_string);
        let mut task = tab.task.clone();
        let tab_id = task.id();
        tab.running = true;
        self.running = Some(tab_id);
        self.status_line = "Running...".to_string();
        debug!(task_id = tab_id.get(), "query dispatched");

        self.runtime.spawn(async move {
            let result = runner.execute(Some(&*engine), &mut task, &text).await;
            let projection = project(&task);
            let completion = QueryCompletion {
                tab: tab_id,
                task,
                projection,
                result,
            };
            if sender.send(completion).is_err() {
                debug!("query finished after the console closed");
            }
        });
    }

    fn apply_completion(&mut self, completion: QueryCompletion) {
        if self.running == Some(completion.tab) {
            self.running = None;
        }
        let Some(tab) = self
            .tabs
            .iter_mut()
            .find(|tab| tab.task.id() == completion.tab)
        else {
            debug!(task_id = completion.tab.get(), "completion for a closed console dropped");
            return;
        };

        tab.running = false;
        match completion.result {
            Ok(summary) => {
                tab.task = completion.task;
                tab.projection = Some(completion.projection);
                tab.summary = Some(summary);
                tab.results_scroll = 0;
                self.status_line = if summary.failed {
                    "Query failed".to_string()
                } else {
                    format!("{} statement(s) executed", summary.statements)
                };
            }
            Err(QueryRunnerError::NotConnected) => {
                self.status_line = NOT_CONNECTED_MESSAGE.to_string();
            }
        }
    }

    fn open_database(&mut self, options: ConnectionOptions) {
        if self.running.is_some() {
            self.status_line = "Wait for the running query to finish".to_string();
            return;
        }
        if let Err(error) = self.runtime.block_on(self.connections.disconnect()) {
            warn!(%error, "failed to close previous database");
        }

        let path = options.path.clone();
        match self.runtime.block_on(self.connections.connect(options.clone())) {
            Ok(latency) => {
                self.settings.record_connection(&options, Utc::now());
                self.save_settings();
                self.status_line = format!("Opened {path} in {} ms", latency.as_millis());
            }
            Err(error) => {
                self.status_line = format!("Open failed: {error}");
            }
        }
    }

    fn close_database(&mut self) {
        if self.connections.active_options().is_none() {
            self.status_line = NOT_CONNECTED_MESSAGE.to_string();
            return;
        }
        self.status_line = match self.runtime.block_on(self.connections.disconnect()) {
            Ok(()) => "Database closed".to_string(),
            Err(error) => format!("Close failed: {error}"),
        };
    }

    fn save_settings(&self) {
        if let Err(error) = self.settings.persist() {
            warn!(%error, "failed to save settings");
        }
    }

    fn shutdown(&mut self) {
        if let Err(error) = self.runtime.block_on(self.connections.disconnect()) {
            warn!(%error, "failed to close database on exit");
        }
    }
}

pub fn run(options: TuiOptions) -> Result<(), TuiError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(TuiError::Runtime)?;
    let mut app = TuiApp::new(runtime.handle().clone(), options);

    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut app);
    let restore_result = restore_terminal(&mut terminal);
    app.shutdown();

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
        terminal.draw(|frame| render(frame, app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(message) = map_key_event(key) {
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
            Constraint::Percentage(40),
            Constraint::Min(6),
            Constraint::Length(4),
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_editor(frame, app, chunks[1]);
    render_results(frame, app.active(), chunks[2]);
    render_footer(frame, app, chunks[3]);

    match &app.overlay {
        Overlay::None => {}
        Overlay::Help => render_help_popup(frame),
        Overlay::Templates {
            selected,
            collection,
        } => render_templates_popup(frame, *selected, collection.as_deref()),
        Overlay::OpenPrompt { input, recent } => render_open_prompt(frame, app, input, *recent),
        Overlay::FilePrompt { action, input } => render_file_prompt(frame, *action, input),
    }
}

fn render_header(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let mut spans = Vec::new();
    for (index, tab) in app.tabs.iter().enumerate() {
        let marker = if tab.running { "*" } else { "" };
        let label = format!(" {}{marker} ", tab.task.title());
        let style = if index == app.active_tab {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw("|"));
    }

    let status = app.connections.status();
    spans.push(Span::raw(match status.path {
        Some(path) if status.read_only => format!(" DB: {path} (read-only)"),
        Some(path) => format!(" DB: {path}"),
        None => " DB: not opened".to_string(),
    }));

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("doclens"));
    frame.render_widget(header, area);
}

fn render_editor(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let tab = app.active();
    let (line, column) = tab.editor.caret_position();
    let inner_height = usize::from(area.height.saturating_sub(2)).max(1);
    let top = line.saturating_sub(inner_height - 1);

    let lines = tab
        .editor
        .text
        .split('\n')
        .skip(top)
        .take(inner_height)
        .map(|text| Line::from(text.to_string()))
        .collect::<Vec<_>>();
    let editor = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{} - F5 run", tab.task.title())),
    );
    frame.render_widget(editor, area);

    if !matches!(app.overlay, Overlay::None) {
        return;
    }
    let x = area
        .x
        .saturating_add(1)
        .saturating_add(u16::try_from(column).unwrap_or(u16::MAX))
        .min(area.right().saturating_sub(2));
    let y = area
        .y
        .saturating_add(1)
        .saturating_add(u16::try_from(line - top).unwrap_or(0));
    frame.set_cursor_position(Position::new(x, y));

    if tab.completion.is_open() {
        render_completion_popup(frame, &tab.completion, x, y);
    }
}

fn render_completion_popup(frame: &mut Frame<'_>, completion: &CompletionEngine, x: u16, y: u16) {
    let suggestions = completion.suggestions();
    let selected = completion.selected_index();
    let start = selected.saturating_sub(POPUP_ROWS - 1);

    let mut lines = suggestions
        .iter()
        .enumerate()
        .skip(start)
        .take(POPUP_ROWS)
        .map(|(index, keyword)| {
            let style = if index == selected {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            };
            Line::from(Span::styled((*keyword).to_string(), style))
        })
        .collect::<Vec<_>>();
    if lines.is_empty() {
        lines.push(Line::from("(no match)"));
    }

    let width = suggestions
        .iter()
        .map(|keyword| keyword.len())
        .max()
        .unwrap_or(0)
        .max(12)
        + 2;
    let screen = frame.area();
    let height = u16::try_from(lines.len() + 2).unwrap_or(u16::MAX);
    let width = u16::try_from(width).unwrap_or(u16::MAX).min(screen.width);
    let area = Rect {
        x: x.min(screen.right().saturating_sub(width)),
        y: y.saturating_add(1).min(screen.bottom().saturating_sub(height)),
        width,
        height: height.min(screen.height),
    };

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL)),
        area,
    );
}

fn render_results(frame: &mut Frame<'_>, tab: &ConsoleTab, area: Rect) {
    let height = usize::from(area.height.saturating_sub(2)).max(1);
    let lines = match (&tab.projection, tab.running) {
        (_, true) => vec![Line::from("Running...")],
        (None, false) => vec![Line::from("Press F5 to run the statements in the editor.")],
        (Some(projection), false) => match tab.view {
            ResultView::Grid => grid_lines(&projection.grid, tab.results_scroll, height),
            ResultView::Text => text_lines(&projection.text, tab.results_scroll, height),
            ResultView::Parameters => {
                text_lines(&projection.parameters, tab.results_scroll, height)
            }
        },
    };

    let results = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Results [{}] - F7 switch view", tab.view.label())),
        )
        .alignment(Alignment::Left);
    frame.render_widget(results, area);
}

fn grid_lines(grid: &GridView, start: usize, height: usize) -> Vec<Line<'static>> {
    let rows = grid.visible_rows(start, height.saturating_sub(2).max(1));
    let columns = grid.columns();
    let widths = columns
        .iter()
        .map(|column| {
            rows.iter()
                .map(|row| {
                    row.get(column.name.as_str())
                        .map_or(0, |value| value.cell_text().chars().count())
                })
                .chain(std::iter::once(column.name.chars().count()))
                .max()
                .unwrap_or(0)
                .min(MAX_CELL_WIDTH)
        })
        .collect::<Vec<_>>();

    let header = columns
        .iter()
        .zip(&widths)
        .map(|(column, width)| fit_cell(&column.name, *width))
        .collect::<Vec<_>>()
        .join(" | ");
    let rule = "-".repeat(header.chars().count());
    let mut lines = vec![
        Line::from(Span::styled(
            header,
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(rule),
    ];

    for row in rows {
        let cells = columns
            .iter()
            .zip(&widths)
            .map(|(column, width)| {
                let text = row
                    .get(column.name.as_str())
                    .map(|value| value.cell_text())
                    .unwrap_or_default();
                fit_cell(&text, *width)
            })
            .collect::<Vec<_>>()
            .join(" | ");
        lines.push(Line::from(cells));
    }
    lines
}

fn fit_cell(text: &str, width: usize) -> String {
    let flat = text.replace(['\n', '\r'], " ");
    if flat.chars().count() > width {
        let mut cut = flat
            .chars()
            .take(width.saturating_sub(1))
            .collect::<String>();
        cut.push('~');
        cut
    } else {
        format!("{flat:<width$}")
    }
}

fn text_lines(text: &str, start: usize, height: usize) -> Vec<Line<'static>> {
    text.lines()
        .skip(start)
        .take(height)
        .map(|line| Line::from(line.to_string()))
        .collect()
}

fn render_footer(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let summary = app
        .active()
        .projection
        .as_ref()
        .map(|projection| {
            format!(
                "{} | {}",
                projection.summary.count_text, projection.summary.elapsed_text
            )
        })
        .unwrap_or_default();
    let footer = Paragraph::new(vec![
        Line::from(summary),
        Line::from(format!("Status: {}", app.status_line)),
    ])
    .block(Block::default().borders(Borders::ALL).title("F1 help"));
    frame.render_widget(footer, area);
}

fn render_help_popup(frame: &mut Frame<'_>) {
    let area = centered_rect(70, 70, frame.area());
    frame.render_widget(Clear, area);
    let help = Paragraph::new(vec![
        Line::from("Keymap"),
        Line::from("Ctrl+Q: quit"),
        Line::from("F1: toggle help"),
        Line::from("F5: run editor statements"),
        Line::from("F2 / F3 / F4 / F6: BEGIN / COMMIT / ROLLBACK / CHECKPOINT"),
        Line::from("F7: switch Grid / Text / Parameters"),
        Line::from("PgUp / PgDn: scroll results"),
        Line::from("Ctrl+T / Ctrl+W / Ctrl+N: new / close / next console"),
        Line::from("Ctrl+P: console templates for the word under the caret"),
        Line::from("Ctrl+O / Ctrl+D: open / close database"),
        Line::from("Ctrl+L / Ctrl+S: load / save console SQL file"),
        Line::from("F8: toggle opening the last database on start"),
        Line::from("Completion: arrows move, Tab or Enter insert, Esc dismiss"),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    frame.render_widget(help, area);
}

fn render_templates_popup(frame: &mut Frame<'_>, selected: usize, collection: Option<&str>) {
    let area = centered_rect(50, 60, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(format!("Collection: {}", collection.unwrap_or("-"))),
        Line::from(""),
    ];
    for (index, template) in ConsoleTemplate::ALL.iter().enumerate() {
        let marker = if index == selected { ">" } else { " " };
        lines.push(Line::from(format!("{marker} {}", template.title())));
    }
    let palette = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Templates (Enter open, Esc close)"),
    );
    frame.render_widget(palette, area);
}

fn render_open_prompt(frame: &mut Frame<'_>, app: &TuiApp, input: &str, recent: Option<usize>) {
    let area = centered_rect(70, 50, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from("Path (:memory: for a temporary database)"),
        Line::from(Span::styled(
            format!("> {input}"),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Recent:"),
    ];
    for (index, entry) in app.settings.settings().recent.iter().enumerate() {
        let marker = if Some(index) == recent { ">" } else { " " };
        let read_only = if entry.read_only { " (read-only)" } else { "" };
        lines.push(Line::from(format!(
            "{marker} {}{read_only}  {}",
            entry.path,
            entry.last_opened.format("%Y-%m-%d %H:%M")
        )));
    }
    let prompt = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Open database (Enter open, arrows recent, Del clear history, Esc cancel)"),
    );
    frame.render_widget(prompt, area);
}

fn render_file_prompt(frame: &mut Frame<'_>, action: FileAction, input: &str) {
    let area = centered_rect(70, 20, frame.area());
    frame.render_widget(Clear, area);
    let prompt = Paragraph::new(vec![
        Line::from("Path"),
        Line::from(Span::styled(
            format!("> {input}"),
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("{} (Enter confirm, Esc cancel)", action.title())),
    );
    frame.render_widget(prompt, area);
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

fn map_key_event(key: KeyEvent) -> Option<Msg> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('q')) => Some(Msg::Quit),
        (KeyModifiers::CONTROL, KeyCode::Char('t')) => Some(Msg::NewTab),
        (KeyModifiers::CONTROL, KeyCode::Char('w')) => Some(Msg::CloseTab),
        (KeyModifiers::CONTROL, KeyCode::Char('n')) => Some(Msg::NextTab),
        (KeyModifiers::CONTROL, KeyCode::Char('p')) => Some(Msg::OpenTemplates),
        (KeyModifiers::CONTROL, KeyCode::Char('o')) => Some(Msg::OpenDatabasePrompt),
        (KeyModifiers::CONTROL, KeyCode::Char('d')) => Some(Msg::CloseDatabase),
        (KeyModifiers::CONTROL, KeyCode::Char('l')) => Some(Msg::LoadSql),
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => Some(Msg::SaveSql),
        (_, KeyCode::F(1)) => Some(Msg::ToggleHelp),
        (_, KeyCode::F(2)) => Some(Msg::Transaction(TransactionCommand::Begin)),
        (_, KeyCode::F(3)) => Some(Msg::Transaction(TransactionCommand::Commit)),
        (_, KeyCode::F(4)) => Some(Msg::Transaction(TransactionCommand::Rollback)),
        (_, KeyCode::F(5)) => Some(Msg::Run),
        (_, KeyCode::F(6)) => Some(Msg::Transaction(TransactionCommand::Checkpoint)),
        (_, KeyCode::F(7)) => Some(Msg::NextResultView),
        (_, KeyCode::F(8)) => Some(Msg::ToggleConnectOnStart),
        (_, KeyCode::Enter) => Some(Msg::Enter),
        (_, KeyCode::Tab) => Some(Msg::Tab),
        (_, KeyCode::Esc) => Some(Msg::Escape),
        (_, KeyCode::Backspace) => Some(Msg::Backspace),
        (_, KeyCode::Delete) => Some(Msg::Delete),
        (_, KeyCode::Home) => Some(Msg::Home),
        (_, KeyCode::End) => Some(Msg::End),
        (_, KeyCode::PageUp) => Some(Msg::ScrollResults(DirectionKey::Up)),
        (_, KeyCode::PageDown) => Some(Msg::ScrollResults(DirectionKey::Down)),
        (_, KeyCode::Up) => Some(Msg::Navigate(DirectionKey::Up)),
        (_, KeyCode::Down) => Some(Msg::Navigate(DirectionKey::Down)),
        (_, KeyCode::Left) => Some(Msg::Navigate(DirectionKey::Left)),
        (_, KeyCode::Right) => Some(Msg::Navigate(DirectionKey::Right)),
        (KeyModifiers::NONE | KeyModifiers::SHIFT, KeyCode::Char(character)) => {
            Some(Msg::Input(character))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use doclens_core::connection_manager::ConnectionOptions;
    use doclens_core::query_runner::TransactionCommand;
    use doclens_core::settings::FileSettingsStore;
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    use super::{
        map_key_event, DirectionKey, Editor, FileAction, Msg, Overlay, ResultView, TuiApp,
        TuiOptions, NOT_CONNECTED_MESSAGE,
    };

    fn test_app(runtime: &Runtime, startup: Option<ConnectionOptions>) -> (TuiApp, TempDir) {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let settings = FileSettingsStore::load_from_path(temp_dir.path().join("settings.toml"))
            .expect("failed to load settings");
        let app = TuiApp::new(
            runtime.handle().clone(),
            TuiOptions {
                settings,
                startup_connection: startup,
                export_dir: temp_dir.path().to_path_buf(),
            },
        );
        (app, temp_dir)
    }

    fn type_text(app: &mut TuiApp, text: &str) {
        for character in text.chars() {
            app.handle(Msg::Input(character));
        }
    }

    fn wait_for_completion(app: &mut TuiApp) {
        for _ in 0..400 {
            app.handle(Msg::Tick);
            if app.running.is_none() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("query did not finish");
    }

    #[test]
    fn keymap_supports_required_global_keys() {
        assert!(matches!(
            map_key_event(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::CONTROL)),
            Some(Msg::Quit)
        ));
        assert!(matches!(
            map_key_event(KeyEvent::new(KeyCode::F(5), KeyModifiers::NONE)),
            Some(Msg::Run)
        ));
        assert!(matches!(
            map_key_event(KeyEvent::new(KeyCode::Char('p'), KeyModifiers::CONTROL)),
            Some(Msg::OpenTemplates)
        ));
        assert!(matches!(
            map_key_event(KeyEvent::new(KeyCode::F(6), KeyModifiers::NONE)),
            Some(Msg::Transaction(TransactionCommand::Checkpoint))
        ));
    }

    #[test]
    fn plain_and_shifted_characters_are_text_input() {
        assert!(matches!(
            map_key_event(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(Msg::Input('q'))
        ));
        assert!(matches!(
            map_key_event(KeyEvent::new(KeyCode::Char('S'), KeyModifiers::SHIFT)),
            Some(Msg::Input('S'))
        ));
        assert!(map_key_event(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::ALT)).is_none());
    }

    #[test]
    fn result_view_cycles_in_expected_order() {
        assert_eq!(ResultView::Grid.next(), ResultView::Text);
        assert_eq!(ResultView::Text.next(), ResultView::Parameters);
        assert_eq!(ResultView::Parameters.next(), ResultView::Grid);
    }

    #[test]
    fn editor_moves_by_characters_and_lines() {
        let mut editor = Editor::with_text("SELECT $\nFROM café");
        assert_eq!(editor.caret_position(), (1, 9));

        editor.backspace();
        editor.insert('é');
        assert_eq!(editor.text, "SELECT $\nFROM café");

        editor.move_vertical(false);
        assert_eq!(editor.caret_position(), (0, 8));
        editor.move_home();
        assert_eq!(editor.caret, 0);
        editor.move_end();
        assert_eq!(editor.caret, 8);
        editor.move_vertical(true);
        editor.move_left();
        assert_eq!(editor.word_at_caret().as_deref(), Some("caf"));
    }

    #[test]
    fn word_under_caret_spans_both_sides() {
        let mut editor = Editor::with_text("SELECT $ FROM users_2;");
        editor.caret = 16;
        assert_eq!(editor.word_at_caret().as_deref(), Some("users_2"));
        editor.caret = 8;
        assert_eq!(editor.word_at_caret(), None);
    }

    #[test]
    fn run_without_database_reports_not_connected() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, _temp_dir) = test_app(&runtime, None);

        type_text(&mut app, "SELECT $ FROM a");
        app.handle(Msg::Run);

        assert_eq!(app.status_line, NOT_CONNECTED_MESSAGE);
        assert!(!app.active().running);
        assert!(app.active().projection.is_none());
    }

    #[test]
    fn query_results_arrive_through_single_hand_off() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, _temp_dir) = test_app(&runtime, Some(ConnectionOptions::in_memory()));
        assert_eq!(
            app.settings.last_connection().map(|entry| entry.path.as_str()),
            Some(":memory:")
        );

        type_text(
            &mut app,
            r#"INSERT INTO a VALUES {"x": 1}; SELECT * FROM a"#,
        );
        app.handle(Msg::Run);
        assert!(app.active().running);
        wait_for_completion(&mut app);

        let tab = app.active();
        let projection = tab.projection.as_ref().expect("projection applied");
        assert_eq!(projection.grid.column_names(), vec!["_id", "x"]);
        assert_eq!(projection.summary.count_text, "1 document");
        assert_eq!(
            tab.task.source_text(),
            r#"INSERT INTO a VALUES {"x": 1}; SELECT * FROM a"#
        );
        assert!(!tab.running);
    }

    #[test]
    fn transaction_keys_run_against_active_console() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, _temp_dir) = test_app(&runtime, Some(ConnectionOptions::in_memory()));

        app.handle(Msg::Transaction(TransactionCommand::Begin));
        wait_for_completion(&mut app);
        assert_eq!(app.active().task.source_text(), "BEGIN");
        assert_eq!(app.active().editor.text, "");
        assert_eq!(app.status_line, "1 statement(s) executed");
    }

    #[test]
    fn completion_popup_commits_highlighted_keyword() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, _temp_dir) = test_app(&runtime, None);

        type_text(&mut app, "x S");
        assert!(app.active().completion.is_open());
        assert_eq!(app.active().completion.selected_suggestion(), Some("SELECT"));

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Enter);
        assert_eq!(app.active().editor.text, "x SET");
        assert_eq!(app.active().editor.caret, 5);
        assert!(!app.active().completion.is_open());

        app.handle(Msg::Enter);
        assert_eq!(app.active().editor.text, "x SET\n");
    }

    #[test]
    fn template_palette_opens_prefilled_console() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, _temp_dir) = test_app(&runtime, None);

        type_text(&mut app, "users");
        app.handle(Msg::OpenTemplates);
        assert_eq!(
            app.overlay,
            Overlay::Templates {
                selected: 0,
                collection: Some("users".to_string())
            }
        );

        app.handle(Msg::Navigate(DirectionKey::Down));
        app.handle(Msg::Enter);
        assert_eq!(app.overlay, Overlay::None);
        assert_eq!(app.tabs.len(), 2);
        assert_eq!(app.active().task.title(), "users");
        assert_eq!(app.active().editor.text, "SELECT $ FROM users;");

        app.handle(Msg::CloseTab);
        assert_eq!(app.tabs.len(), 1);
        assert_eq!(app.active().editor.text, "users");
    }

    #[test]
    fn open_prompt_opens_file_database_and_records_history() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, temp_dir) = test_app(&runtime, None);
        let path = temp_dir.path().join("studio.db").display().to_string();

        app.handle(Msg::OpenDatabasePrompt);
        type_text(&mut app, &path);
        app.handle(Msg::Enter);

        assert_eq!(app.overlay, Overlay::None);
        assert!(app.status_line.starts_with("Opened "));
        assert!(app.connections.status().is_connected);
        assert_eq!(
            app.settings.last_connection().map(|entry| entry.path.clone()),
            Some(path)
        );

        app.handle(Msg::CloseDatabase);
        assert_eq!(app.status_line, "Database closed");
        assert!(!app.connections.status().is_connected);
    }

    fn submit_file_prompt(app: &mut TuiApp, path: &str) {
        if let Overlay::FilePrompt { input, .. } = &mut app.overlay {
            input.clear();
        }
        type_text(app, path);
        app.handle(Msg::Enter);
    }

    #[test]
    fn save_then_load_sql_round_trips_console_text() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, temp_dir) = test_app(&runtime, None);
        let path = temp_dir.path().join("report.sql");

        app.tabs[0].editor = Editor::with_text("SELECT $\nFROM users;");
        app.handle(Msg::SaveSql);
        assert!(matches!(
            app.overlay,
            Overlay::FilePrompt {
                action: FileAction::Save,
                ..
            }
        ));
        submit_file_prompt(&mut app, &path.display().to_string());
        assert_eq!(app.status_line, format!("Saved {}", path.display()));
        assert_eq!(app.active().file.as_deref(), Some(path.as_path()));

        app.handle(Msg::LoadSql);
        submit_file_prompt(&mut app, &path.display().to_string());
        assert_eq!(app.tabs.len(), 2);
        assert_eq!(app.active().task.title(), "report.sql");
        assert_eq!(app.active().editor.text, "SELECT $\nFROM users;");
        assert_eq!(app.active().file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn sql_file_errors_reach_the_status_line() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, temp_dir) = test_app(&runtime, None);
        let missing = temp_dir.path().join("missing.sql");

        app.handle(Msg::LoadSql);
        submit_file_prompt(&mut app, &missing.display().to_string());
        assert!(app
            .status_line
            .starts_with(&format!("failed to read SQL file {}", missing.display())));
        assert_eq!(app.tabs.len(), 1);

        app.handle(Msg::SaveSql);
        let unwritable = temp_dir.path().join("no").join("such.sql");
        submit_file_prompt(&mut app, &unwritable.display().to_string());
        assert!(app.status_line.starts_with("failed to write SQL file"));
        assert_eq!(app.active().file, None);
    }

    #[test]
    fn connect_on_start_toggle_is_persisted() {
        let runtime = Runtime::new().expect("runtime");
        let (mut app, temp_dir) = test_app(&runtime, None);
        assert!(!app.settings.settings().open_last_on_start);

        app.handle(Msg::ToggleConnectOnStart);
        assert_eq!(app.status_line, "Last database will open on start");
        let reloaded = FileSettingsStore::load_from_path(temp_dir.path().join("settings.toml"))
            .expect("failed to reload settings");
        assert!(reloaded.settings().open_last_on_start);

        app.handle(Msg::ToggleConnectOnStart);
        assert!(!app.settings.settings().open_last_on_start);
    }
}
