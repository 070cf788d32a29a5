use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, Paragraph, Row, Table, Wrap};

use crate::app::{
    App, CatalogResult, DownloadResult, ExportPlan, FetchedResource, InfoResult, ProgressEvent,
    ProgressSink, ProgressSinkKind,
};
use crate::catalog::filter_catalog;
use crate::collector::CancelToken;
use crate::domain::{CatalogEntry, CatalogResource, FetchProgress, ResourceFormat, ResourceId};
use crate::error::ExplorerError;
use crate::i18n::{Key, Lang, fill, group_thousands, t};
use crate::session::{FetchState, FetchTicket, Session};
use crate::table::{self, display_value};
use crate::transport::PortalTransport;

const EVENTS_MAX: usize = 6;
const LOGS_MAX: usize = 200;
const COLUMN_WIDTH: u16 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Dashboard,
    Columns,
    Catalog,
    Logs,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Verify,
    Store,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Verify => "Verify",
            Phase::Store => "Store",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Fetch {
        target: String,
        max_rows: Option<usize>,
    },
    Rows(Option<usize>),
    Info(Option<String>),
    Catalog {
        refresh: bool,
    },
    Search(String),
    Open(usize),
    Filter(String),
    Export,
    Download,
    Cancel,
    Lang(Option<Lang>),
    Show(View),
    Quit,
}

enum WorkerMessage {
    Fetched {
        ticket: FetchTicket,
        result: Result<FetchedResource, ExplorerError>,
    },
    Info(InfoResult),
    Catalog(CatalogResult),
    Saved(Result<DownloadResult, ExplorerError>),
}

/// A worker's result, tagged with the operation it was spawned under.
struct Completed {
    op_seq: u64,
    message: WorkerMessage,
}

/// Live operation state, written by worker threads through [`TuiProgress`].
#[derive(Debug)]
struct OpState {
    op: Option<ProgressSinkKind>,
    accepting: u64,
    status: String,
    phase: Phase,
    progress: Option<FetchProgress>,
    latency_ms: Option<u128>,
    retries: u32,
    request_count: u64,
    started: Instant,
    active: bool,
    events: VecDeque<String>,
    logs: VecDeque<String>,
}

struct TuiProgress {
    state: Arc<Mutex<OpState>>,
    op_seq: u64,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.accepting != self.op_seq {
            return;
        }
        let message = event.message.trim().to_string();
        if let Some(progress) = event.progress {
            state.progress = Some(progress);
        } else if let Some((phase, payload)) = parse_phase(&message) {
            state.phase = phase;
            state.status = payload.to_string();
        } else if let Some(latency) = parse_latency(&message) {
            state.latency_ms = Some(latency);
        } else if message.contains("retry") {
            state.retries = state.retries.saturating_add(1);
        }
        if message.contains(".request") {
            state.request_count = state.request_count.saturating_add(1);
        }
        if event.progress.is_none() {
            push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
        }
        push_bounded(&mut state.logs, format!("[{}] {message}", timestamp()), LOGS_MAX);
    }
}

/// Interactive dashboard. Work runs on background threads; results come back
/// over a channel and are published through the [`Session`].
pub struct Tui<T: PortalTransport + Clone + 'static> {
    app: Arc<App<T>>,
    session: Session,
    state: Arc<Mutex<OpState>>,
    view: View,
    input: String,
    history: Vec<String>,
    history_index: Option<usize>,
    scroll: usize,
    col_offset: usize,
    catalog_needle: String,
    last_saved: Option<DownloadResult>,
    info: Option<InfoResult>,
    notice: Option<String>,
    op_seq: u64,
    tx: Sender<Completed>,
    rx: Receiver<Completed>,
}

impl<T: PortalTransport + Clone + 'static> Tui<T> {
    pub fn new(app: App<T>, lang: Lang, max_rows: Option<usize>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            app: Arc::new(app),
            session: Session::new(lang, max_rows),
            state: Arc::new(Mutex::new(OpState {
                op: None,
                accepting: 0,
                status: "ready".to_string(),
                phase: Phase::Resolve,
                progress: None,
                latency_ms: None,
                retries: 0,
                request_count: 0,
                started: Instant::now(),
                active: false,
                events: VecDeque::new(),
                logs: VecDeque::new(),
            })),
            view: View::Dashboard,
            input: String::new(),
            history: Vec::new(),
            history_index: None,
            scroll: 0,
            col_offset: 0,
            catalog_needle: String::new(),
            last_saved: None,
            info: None,
            notice: None,
            op_seq: 0,
            tx,
            rx,
        }
    }

    /// Opens the dashboard with `initial` commands already submitted, in order.
    pub fn run(mut self, initial: Vec<String>) -> miette::Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let result = self.event_loop(initial);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        self.session.cancel();
        result
    }

    fn event_loop(&mut self, initial: Vec<String>) -> miette::Result<()> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        for command in initial {
            if self.submit(&command) {
                return Ok(());
            }
        }

        let mut tick = 0usize;
        loop {
            while let Ok(completed) = self.rx.try_recv() {
                self.receive(completed);
            }

            if let Ok(state) = self.state.lock() {
                let tui = &*self;
                terminal
                    .draw(|frame| draw_ui(frame, tui, &state, tick))
                    .into_diagnostic()?;
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        return Ok(());
                    }
                }
            }
            tick = tick.wrapping_add(1);
        }
    }

    fn lang(&self) -> Lang {
        self.session.lang
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        match key.code {
            KeyCode::F(1) => self.show(View::Help),
            KeyCode::F(2) => self.show(View::Catalog),
            KeyCode::F(3) => self.show(View::Dashboard),
            KeyCode::F(4) => self.show(View::Logs),
            KeyCode::F(5) => self.show(View::Columns),
            KeyCode::Esc => {
                if !self.input.is_empty() {
                    self.input.clear();
                } else if self.session.is_loading() {
                    self.session.cancel();
                    self.end_op(t(self.lang(), Key::Cancelled));
                } else {
                    return true;
                }
            }
            KeyCode::Enter => {
                let Some(command) = self.take_command() else {
                    return false;
                };
                return self.submit(&command);
            }
            KeyCode::Tab => {
                let completed = autocomplete(&self.input);
                self.input = completed;
            }
            KeyCode::Up => self.history_up(),
            KeyCode::Down => self.history_down(),
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            KeyCode::PageDown => self.scroll = self.scroll.saturating_add(10),
            KeyCode::Left => self.col_offset = self.col_offset.saturating_sub(1),
            KeyCode::Right => self.col_offset = self.col_offset.saturating_add(1),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) => self.input.push(ch),
            _ => {}
        }
        false
    }

    /// Runs one command line. Returns `true` when the dashboard should close.
    fn submit(&mut self, line: &str) -> bool {
        self.notice = None;
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(message) => {
                self.notice = Some(message);
                return false;
            }
        };
        match command {
            Command::Quit => return true,
            Command::Fetch { target, max_rows } => {
                if let Some(max) = max_rows {
                    self.session.max_rows = (max > 0).then_some(max);
                }
                match target.parse::<ResourceId>() {
                    Ok(id) => self.start_fetch(id),
                    Err(err) => self.notice = Some(err.to_string()),
                }
            }
            Command::Rows(max) => {
                self.session.max_rows = max.filter(|max| *max > 0);
            }
            Command::Info(target) => {
                let id = match target {
                    Some(target) => target.parse::<ResourceId>().map(Some),
                    None => Ok(self.session.selected().cloned()),
                };
                match id {
                    Ok(Some(id)) => self.start_info(id),
                    Ok(None) => self.notice = Some(t(self.lang(), Key::WarnNoResource).to_string()),
                    Err(err) => self.notice = Some(err.to_string()),
                }
            }
            Command::Catalog { refresh } => {
                self.show(View::Catalog);
                if refresh || self.session.catalog().is_none() {
                    self.start_catalog(refresh);
                }
            }
            Command::Search(needle) => {
                self.catalog_needle = needle;
                self.show(View::Catalog);
                if self.session.catalog().is_none() && !self.is_busy() {
                    self.start_catalog(false);
                }
            }
            Command::Open(index) => self.open_catalog_row(index),
            Command::Filter(needle) => {
                self.session.filter = needle;
                self.scroll = 0;
                self.show(View::Dashboard);
            }
            Command::Export => self.start_export(),
            Command::Download => self.start_download(),
            Command::Cancel => {
                if self.session.is_loading() {
                    self.session.cancel();
                    self.end_op(t(self.lang(), Key::Cancelled));
                }
            }
            Command::Lang(Some(lang)) => self.session.lang = lang,
            Command::Lang(None) => self.session.toggle_lang(),
            Command::Show(view) => self.show(view),
        }
        false
    }

    fn start_fetch(&mut self, id: ResourceId) {
        self.info = None;
        self.last_saved = None;
        self.scroll = 0;
        self.col_offset = 0;
        self.show(View::Dashboard);
        let ticket = self.session.begin_fetch(id);
        let app = self.app.clone();
        let max_rows = self.session.max_rows;
        self.spawn(ProgressSinkKind::Fetch, move |sink| {
            let result = app.fetch(&ticket.resource, max_rows, sink, &ticket.cancel);
            WorkerMessage::Fetched { ticket, result }
        });
    }

    fn start_info(&mut self, id: ResourceId) {
        let app = self.app.clone();
        self.spawn(ProgressSinkKind::Info, move |sink| {
            WorkerMessage::Info(app.info(&id, sink))
        });
    }

    fn start_catalog(&mut self, refresh: bool) {
        let app = self.app.clone();
        self.spawn(ProgressSinkKind::Catalog, move |sink| {
            WorkerMessage::Catalog(app.catalog(refresh, sink))
        });
    }

    fn start_export(&mut self) {
        let Some(id) = self.session.selected().cloned() else {
            self.notice = Some(t(self.lang(), Key::WarnNoResource).to_string());
            return;
        };
        let (Some(records), Some(meta)) = (self.session.records(), self.session.meta().cloned())
        else {
            self.notice = Some(t(self.lang(), Key::IdleInfo).to_string());
            return;
        };
        let fetched = FetchedResource {
            id,
            meta,
            collected: (*records).clone(),
        };
        let filter = self.session.filter.clone();
        let app = self.app.clone();
        self.spawn(ProgressSinkKind::Download, move |sink| {
            WorkerMessage::Saved(app.save_csv(&fetched, &filter, None, sink))
        });
    }

    fn start_download(&mut self) {
        let Some(id) = self.session.selected().cloned() else {
            self.notice = Some(t(self.lang(), Key::WarnNoResource).to_string());
            return;
        };
        let app = self.app.clone();
        let max_rows = self.session.max_rows;
        let cached = self.session.meta().cloned();
        let records = self.session.records();
        self.spawn(ProgressSinkKind::Download, move |sink| {
            let meta = cached.unwrap_or_else(|| app.resolve_meta(&id));
            let result = match (App::<T>::export_plan(&meta), records) {
                (ExportPlan::Csv, Some(records)) => {
                    let fetched = FetchedResource {
                        id,
                        meta,
                        collected: (*records).clone(),
                    };
                    app.save_csv(&fetched, "", None, sink)
                }
                (ExportPlan::Csv, None) => {
                    app.export(&id, max_rows, None, sink, &CancelToken::new())
                }
                (ExportPlan::Raw(_), _) => app.save_raw(&id, &meta, None, sink),
            };
            WorkerMessage::Saved(result)
        });
    }

    fn open_catalog_row(&mut self, index: usize) {
        let Some(entries) = self.session.catalog() else {
            self.notice = Some(t(self.lang(), Key::CatalogEmpty).to_string());
            return;
        };
        let rows = catalog_rows(&entries, &self.catalog_needle);
        let Some((_, resource)) = index.checked_sub(1).and_then(|i| rows.get(i)) else {
            self.notice = Some(format!("no catalog row {index}"));
            return;
        };
        let id = match resource.id.parse::<ResourceId>() {
            Ok(id) => id,
            Err(err) => {
                self.notice = Some(err.to_string());
                return;
            }
        };
        let format: ResourceFormat = resource.format.parse().unwrap_or(ResourceFormat::Unknown);
        if format.is_tabular() || format == ResourceFormat::Unknown {
            self.start_fetch(id);
        } else {
            // no datastore rows; selected for `download`
            self.info = None;
            self.last_saved = None;
            self.session.select(id.clone());
            self.start_info(id);
            self.show(View::Dashboard);
        }
    }

    fn spawn<F>(&mut self, kind: ProgressSinkKind, job: F)
    where
        F: FnOnce(&dyn ProgressSink) -> WorkerMessage + Send + 'static,
    {
        self.op_seq += 1;
        if let Ok(mut state) = self.state.lock() {
            state.op = Some(kind);
            state.accepting = self.op_seq;
            state.active = true;
            state.started = Instant::now();
            state.phase = Phase::Resolve;
            state.progress = None;
            state.latency_ms = None;
            state.retries = 0;
            state.request_count = 0;
            state.status = t(self.session.lang, Key::Connecting).to_string();
        }
        let op_seq = self.op_seq;
        let sink = TuiProgress {
            state: self.state.clone(),
            op_seq,
        };
        let tx = self.tx.clone();
        thread::spawn(move || {
            let message = job(&sink);
            let _ = tx.send(Completed { op_seq, message });
        });
    }

    /// Applies a worker result. Only the latest operation may touch the
    /// op state; a fetch additionally has to hold the session's current ticket.
    fn receive(&mut self, completed: Completed) {
        let lang = self.lang();
        let Completed { op_seq, message } = completed;
        let current = op_seq == self.op_seq;
        if !current && !matches!(message, WorkerMessage::Fetched { .. }) {
            self.log(t(lang, Key::StaleResult));
            return;
        }
        match message {
            WorkerMessage::Fetched { ticket, result } => {
                let (result, meta) = match result {
                    Ok(fetched) => (Ok(fetched.collected), Some(fetched.meta)),
                    Err(err) => (Err(err), None),
                };
                if let Some(meta) = meta {
                    self.session.set_meta(&ticket, meta);
                }
                if !self.session.complete(&ticket, result) {
                    self.log(t(lang, Key::StaleResult));
                    return;
                }
                let status = match self.session.state() {
                    FetchState::Ready(collected) => format!(
                        "{}: {}",
                        t(lang, Key::RowsFetched),
                        group_thousands(collected.records.len())
                    ),
                    FetchState::Failed(err) => failure_text(lang, err).to_string(),
                    _ => String::new(),
                };
                if current {
                    self.end_op(&status);
                } else {
                    self.log(&status);
                }
            }
            WorkerMessage::Info(info) => {
                self.end_op(&info.display_name);
                self.info = Some(info);
            }
            WorkerMessage::Catalog(result) => {
                let status = if result.datasets.is_empty() {
                    t(lang, Key::CatalogEmpty).to_string()
                } else {
                    format!("{} {}", group_thousands(result.count), t(lang, Key::CatalogHeader))
                };
                if !result.datasets.is_empty() {
                    self.session.set_catalog(result.datasets);
                }
                self.end_op(&status);
            }
            WorkerMessage::Saved(Ok(saved)) => {
                let caption = fill(
                    t(lang, Key::DownloadCaption),
                    &[("filename", saved.path.clone())],
                );
                self.end_op(&caption);
                self.last_saved = Some(saved);
            }
            WorkerMessage::Saved(Err(err)) => {
                let text = match &err {
                    ExplorerError::Download(_) => t(lang, Key::DownloadFailed).to_string(),
                    other => other.to_string(),
                };
                self.log(&format!("error: {err}"));
                self.end_op(&text);
            }
        }
    }

    fn end_op(&mut self, status: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.active = false;
            state.accepting = 0;
            state.status = status.to_string();
            push_bounded(
                &mut state.logs,
                format!("[{}] {status}", timestamp()),
                LOGS_MAX,
            );
        }
    }

    fn log(&self, message: &str) {
        if let Ok(mut state) = self.state.lock() {
            push_bounded(
                &mut state.logs,
                format!("[{}] {message}", timestamp()),
                LOGS_MAX,
            );
        }
    }

    fn is_busy(&self) -> bool {
        self.state.lock().map(|state| state.active).unwrap_or(false)
    }

    fn show(&mut self, view: View) {
        if self.view != view {
            self.scroll = 0;
        }
        self.view = view;
    }

    fn take_command(&mut self) -> Option<String> {
        let current = self.input.trim().to_string();
        if current.is_empty() {
            return None;
        }
        self.history.push(current.clone());
        self.history_index = None;
        self.input.clear();
        Some(current)
    }

    fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let next = match self.history_index {
            Some(index) if index > 0 => index - 1,
            Some(_) => 0,
            None => self.history.len().saturating_sub(1),
        };
        self.history_index = Some(next);
        if let Some(value) = self.history.get(next).cloned() {
            self.input = value;
        }
    }

    fn history_down(&mut self) {
        if self.history.is_empty() {
            return;
        }
        match self.history_index {
            Some(index) if index + 1 < self.history.len() => {
                self.history_index = Some(index + 1);
                if let Some(value) = self.history.get(index + 1).cloned() {
                    self.input = value;
                }
            }
            _ => {
                self.history_index = None;
                self.input.clear();
            }
        }
    }
}

fn parse_command(input: &str) -> Result<Command, String> {
    let trimmed = input.trim().trim_start_matches(':').trim();
    if trimmed.is_empty() {
        return Err("empty command".to_string());
    }
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    match head.to_lowercase().as_str() {
        "fetch" | "f" => {
            let mut parts = rest.split_whitespace();
            let target = parts
                .next()
                .ok_or_else(|| "fetch requires a resource id".to_string())?
                .to_string();
            // Some(0) lifts the cap for this and later fetches
            let max_rows = parts
                .next()
                .map(|value| parse_row_cap(value).map(|cap| cap.unwrap_or(0)))
                .transpose()?;
            Ok(Command::Fetch { target, max_rows })
        }
        "rows" | "max" => {
            let value = arg.ok_or_else(|| "rows requires a number or `all`".to_string())?;
            Ok(Command::Rows(parse_row_cap(&value)?))
        }
        "info" | "i" => Ok(Command::Info(arg)),
        "catalog" | "c" => Ok(Command::Catalog {
            refresh: rest == "refresh",
        }),
        "search" | "s" => Ok(Command::Search(rest.to_string())),
        "open" | "o" => rest
            .parse::<usize>()
            .map(Command::Open)
            .map_err(|_| "open requires a catalog row number".to_string()),
        "filter" | "/" => Ok(Command::Filter(rest.to_string())),
        "export" | "csv" => Ok(Command::Export),
        "download" | "dl" => Ok(Command::Download),
        "cancel" => Ok(Command::Cancel),
        "lang" => match arg {
            Some(value) => value.parse::<Lang>().map(|lang| Command::Lang(Some(lang))),
            None => Ok(Command::Lang(None)),
        },
        "cols" | "columns" => Ok(Command::Show(View::Columns)),
        "logs" => Ok(Command::Show(View::Logs)),
        "help" | "?" => Ok(Command::Show(View::Help)),
        "home" | "table" => Ok(Command::Show(View::Dashboard)),
        "q" | "quit" | "exit" => Ok(Command::Quit),
        _ if rest.is_empty() && trimmed.parse::<ResourceId>().is_ok() => Ok(Command::Fetch {
            target: trimmed.to_string(),
            max_rows: None,
        }),
        other => Err(format!("unknown command: {other}")),
    }
}

/// `all` (or `0`) lifts the cap.
fn parse_row_cap(value: &str) -> Result<Option<usize>, String> {
    match value.trim() {
        "all" | "0" => Ok(None),
        other => other
            .replace(['_', ','], "")
            .parse::<usize>()
            .map(Some)
            .map_err(|_| format!("invalid row count: {other}")),
    }
}

fn autocomplete(input: &str) -> String {
    const COMMANDS: &[&str] = &[
        "fetch ", "rows ", "info", "catalog", "search ", "open ", "filter ", "export",
        "download", "cancel", "lang", "cols", "logs", "help", "quit",
    ];
    let current = input.trim_start();
    if current.is_empty() || current.contains(' ') {
        return input.to_string();
    }
    let mut matches = COMMANDS.iter().filter(|cmd| cmd.starts_with(current));
    match (matches.next(), matches.next()) {
        (Some(only), None) => only.to_string(),
        _ => input.to_string(),
    }
}

/// Catalog resources flattened in display order, paired with their dataset.
fn catalog_rows<'a>(
    entries: &'a [CatalogEntry],
    needle: &str,
) -> Vec<(&'a CatalogEntry, &'a CatalogResource)> {
    filter_catalog(entries, needle)
        .into_iter()
        .flat_map(|entry| entry.resources.iter().map(move |res| (entry, res)))
        .collect()
}

fn failure_text(lang: Lang, err: &ExplorerError) -> &'static str {
    match err {
        ExplorerError::EmptyResult(_) => t(lang, Key::NoRecords),
        ExplorerError::Cancelled => t(lang, Key::Cancelled),
        ExplorerError::Download(_) => t(lang, Key::DownloadFailed),
        _ => t(lang, Key::ErrorMsg),
    }
}

fn draw_ui<T: PortalTransport + Clone + 'static>(
    frame: &mut ratatui::Frame,
    tui: &Tui<T>,
    state: &OpState,
    tick: usize,
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, state, tick), chunks[0]);
    draw_progress(frame, tui.lang(), state, chunks[1]);

    match tui.view {
        View::Dashboard => draw_dashboard(frame, tui, state, chunks[2]),
        View::Columns => draw_columns(frame, tui, chunks[2]),
        View::Catalog => draw_catalog(frame, tui, chunks[2]),
        View::Logs => frame.render_widget(draw_logs_view(state, tui.scroll), chunks[2]),
        View::Help => frame.render_widget(draw_help(tui.lang()), chunks[2]),
    }

    draw_command_line(frame, tui, chunks[3]);
}

fn draw_header<T: PortalTransport + Clone + 'static>(
    tui: &Tui<T>,
    state: &OpState,
    tick: usize,
) -> Paragraph<'static> {
    let lang = tui.lang();
    let hb = if state.active && tick % 2 == 0 { "*" } else { " " };
    let op_label = state.op.map(ProgressSinkKind::label).unwrap_or("Idle");
    let latency = state
        .latency_ms
        .map(|v| format!("{v} ms"))
        .unwrap_or_else(|| "--".to_string());
    let header_line = Line::from(vec![
        Span::styled(
            t(lang, Key::Title),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw(format!("   Lang: {lang}   Op: ")),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw("   "),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ]);
    let status_line = Line::from(vec![
        Span::styled(
            format!("{:<8}", state.phase.label()),
            Style::default().fg(if state.active {
                Color::Cyan
            } else {
                Color::Green
            }),
        ),
        Span::raw(state.status.clone()),
        Span::styled(
            format!(
                "   Req: {}  Latency: {latency}  Retries: {}",
                state.request_count, state.retries
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    Paragraph::new(vec![header_line, status_line])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_progress(frame: &mut ratatui::Frame, lang: Lang, state: &OpState, area: Rect) {
    let progress = state.progress.unwrap_or(FetchProgress {
        fetched: 0,
        total: None,
    });
    let total = progress
        .total
        .map(group_thousands)
        .unwrap_or_else(|| "?".to_string());
    let label = fill(
        t(lang, Key::ProgressText),
        &[("fetched", group_thousands(progress.fetched)), ("total", total)],
    );
    let percent = if state.progress.is_some() {
        progress.percent()
    } else {
        0
    };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::BOTTOM))
        .gauge_style(Style::default().fg(Color::Cyan))
        .percent(u16::from(percent))
        .label(format!(
            "{label}  {}",
            elapsed_label(state.started.elapsed(), state.active)
        ));
    frame.render_widget(gauge, area);
}

fn draw_dashboard<T: PortalTransport + Clone + 'static>(
    frame: &mut ratatui::Frame,
    tui: &Tui<T>,
    state: &OpState,
    area: Rect,
) {
    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(38), Constraint::Min(20)])
        .split(area);
    frame.render_widget(draw_sidebar(tui, state), main[0]);

    let lang = tui.lang();
    match tui.session.state() {
        FetchState::Ready(collected) => {
            let records = &collected.records;
            let rows = table::filter_rows(records, &tui.session.filter);
            let body = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(4)])
                .split(main[1]);

            let mut metrics = vec![Line::from(vec![
                Span::styled(format!("{}: ", t(lang, Key::RowsFetched)), label_style()),
                Span::raw(group_thousands(records.len())),
                Span::styled(format!("   {}: ", t(lang, Key::Columns)), label_style()),
                Span::raw(records.columns().len().to_string()),
                Span::styled(format!("   {}: ", t(lang, Key::EstMemory)), label_style()),
                Span::raw(table::format_bytes(records.estimated_bytes())),
            ])];
            if !tui.session.filter.is_empty() {
                metrics.push(Line::from(Span::styled(
                    fill(
                        t(lang, Key::FilterCaption),
                        &[
                            ("shown", group_thousands(rows.len())),
                            ("total", group_thousands(records.len())),
                        ],
                    ),
                    label_style(),
                )));
            }
            frame.render_widget(
                Paragraph::new(metrics).block(Block::default().borders(Borders::BOTTOM)),
                body[0],
            );

            let visible_cols = ((body[1].width / COLUMN_WIDTH).max(1)) as usize;
            let col_offset = tui
                .col_offset
                .min(records.columns().len().saturating_sub(1));
            let columns: Vec<&String> = records
                .columns()
                .iter()
                .skip(col_offset)
                .take(visible_cols)
                .collect();
            let height = body[1].height.saturating_sub(3) as usize;
            let start = tui.scroll.min(rows.len().saturating_sub(1));
            let table_rows: Vec<Row> = rows
                .iter()
                .skip(start)
                .take(height)
                .map(|record| {
                    Row::new(
                        columns
                            .iter()
                            .map(|col| Cell::from(display_value(record.get(col.as_str()))))
                            .collect::<Vec<_>>(),
                    )
                })
                .collect();
            let header = Row::new(
                columns
                    .iter()
                    .map(|col| Cell::from(col.to_string()))
                    .collect::<Vec<_>>(),
            )
            .style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            );
            let widths = vec![Constraint::Length(COLUMN_WIDTH); columns.len()];
            let preview = Table::new(table_rows, widths).header(header).block(
                Block::default().borders(Borders::TOP).title(format!(
                    "{} ({}-{} / {})",
                    t(lang, Key::PreviewHeader),
                    (start + 1).min(rows.len()),
                    (start + height).min(rows.len()),
                    group_thousands(rows.len())
                )),
            );
            frame.render_widget(preview, body[1]);
        }
        FetchState::Failed(err) => {
            let lines = vec![
                Line::from(Span::styled(
                    failure_text(lang, err),
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(err.to_string(), label_style())),
            ];
            frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), main[1]);
        }
        FetchState::Loading(_) => {
            let lines: Vec<Line> = state
                .events
                .iter()
                .map(|event| Line::from(format!("- {event}")))
                .collect();
            frame.render_widget(
                Paragraph::new(lines)
                    .block(
                        Block::default()
                            .borders(Borders::NONE)
                            .title(t(lang, Key::Connecting)),
                    )
                    .wrap(Wrap { trim: true }),
                main[1],
            );
        }
        FetchState::Idle => {
            let lines = vec![
                Line::from(t(lang, Key::IdleInfo)),
                Line::from(""),
                Line::from(Span::styled(
                    t(lang, Key::HowToHeader),
                    Style::default().fg(Color::Cyan),
                )),
                Line::from(t(lang, Key::HowToBody)),
            ];
            frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), main[1]);
        }
    }
}

fn draw_sidebar<T: PortalTransport + Clone + 'static>(
    tui: &Tui<T>,
    state: &OpState,
) -> Paragraph<'static> {
    let lang = tui.lang();
    let session = &tui.session;
    let mut lines = vec![
        Line::from(Span::styled(
            t(lang, Key::ResourceIdLabel).to_string(),
            label_style(),
        )),
        Line::from(
            session
                .selected()
                .map(ResourceId::to_string)
                .unwrap_or_else(|| "--".to_string()),
        ),
        Line::from(vec![
            Span::styled(format!("{}: ", t(lang, Key::MaxRowsLabel)), label_style()),
            Span::raw(
                session
                    .max_rows
                    .map(group_thousands)
                    .unwrap_or_else(|| "all".to_string()),
            ),
        ]),
        Line::from(""),
    ];

    if let Some(meta) = session.meta() {
        lines.push(Line::from(Span::styled(
            t(lang, Key::DatasetHeader).to_string(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(meta.display_name.clone()));
        lines.push(Line::from(format!("Format: {}", meta.resource_format())));
    }
    if let Some(info) = &tui.info {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            info.display_name.clone(),
            Style::default().fg(Color::Cyan),
        )));
        lines.push(Line::from(format!("{} · {}", info.format, info.mime)));
        lines.push(Line::from(format!(
            "{}: {}",
            t(lang, Key::RowsFetched),
            info.total_rows
                .map(group_thousands)
                .unwrap_or_else(|| "?".to_string())
        )));
    }
    if !session.filter.is_empty() {
        lines.push(Line::from(vec![
            Span::styled(format!("{}: ", t(lang, Key::FilterLabel)), label_style()),
            Span::raw(session.filter.clone()),
        ]));
    }
    if let Some(saved) = &tui.last_saved {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            fill(
                t(lang, Key::DownloadCaption),
                &[("filename", saved.path.clone())],
            ),
            Style::default().fg(Color::Green),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled("Recent events:", label_style())));
    for event in state.events.iter().rev().take(3) {
        lines.push(Line::from(format!("- {event}")));
    }

    Paragraph::new(lines)
        .block(Block::default().borders(Borders::RIGHT))
        .wrap(Wrap { trim: true })
}

fn draw_columns<T: PortalTransport + Clone + 'static>(
    frame: &mut ratatui::Frame,
    tui: &Tui<T>,
    area: Rect,
) {
    let lang = tui.lang();
    let Some(collected) = tui.session.records() else {
        frame.render_widget(Paragraph::new(t(lang, Key::IdleInfo)), area);
        return;
    };
    let stats = table::column_stats(&collected.records);
    let rows: Vec<Row> = stats
        .iter()
        .skip(tui.scroll)
        .map(|stat| {
            Row::new(vec![
                Cell::from(stat.name.clone()),
                Cell::from(group_thousands(stat.non_null)),
                Cell::from(group_thousands(stat.null)),
                Cell::from(stat.kind.to_string()),
                Cell::from(stat.sample.clone()),
            ])
        })
        .collect();
    let header = Row::new(vec![
        Cell::from(t(lang, Key::ColName)),
        Cell::from(t(lang, Key::ColNonNull)),
        Cell::from(t(lang, Key::ColNull)),
        Cell::from(t(lang, Key::ColType)),
        Cell::from(t(lang, Key::ColSample)),
    ])
    .style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    let widths = [
        Constraint::Percentage(25),
        Constraint::Length(10),
        Constraint::Length(10),
        Constraint::Length(9),
        Constraint::Min(10),
    ];
    let view = Table::new(rows, widths).header(header).block(
        Block::default()
            .borders(Borders::TOP)
            .title(t(lang, Key::ColumnInfo)),
    );
    frame.render_widget(view, area);
}

fn draw_catalog<T: PortalTransport + Clone + 'static>(
    frame: &mut ratatui::Frame,
    tui: &Tui<T>,
    area: Rect,
) {
    let lang = tui.lang();
    let Some(entries) = tui.session.catalog() else {
        frame.render_widget(
            Paragraph::new(t(lang, Key::Connecting)).block(
                Block::default()
                    .borders(Borders::TOP)
                    .title(t(lang, Key::CatalogHeader)),
            ),
            area,
        );
        return;
    };
    let rows = catalog_rows(&entries, &tui.catalog_needle);
    let height = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(tui.scroll)
        .take(height)
        .map(|(index, (entry, resource))| {
            let format_color = match resource.format.parse::<ResourceFormat>() {
                Ok(format) if format.is_tabular() => Color::Green,
                _ => Color::Yellow,
            };
            Line::from(vec![
                Span::styled(format!("{:>4} ", index + 1), label_style()),
                Span::styled(
                    format!("{:<7}", resource.format.to_uppercase()),
                    Style::default().fg(format_color),
                ),
                Span::raw(format!("{} / {}", entry.title, resource.name)),
                Span::styled(
                    format!(
                        "  {} · {}",
                        entry.organization,
                        short_date(&entry.last_modified)
                    ),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect();
    let title = if tui.catalog_needle.is_empty() {
        format!(
            "{} ({} datasets, {} resources)",
            t(lang, Key::CatalogHeader),
            group_thousands(entries.len()),
            group_thousands(rows.len())
        )
    } else {
        format!(
            "{} \"{}\" ({} resources)",
            t(lang, Key::CatalogHeader),
            tui.catalog_needle,
            group_thousands(rows.len())
        )
    };
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::TOP).title(title)),
        area,
    );
}

fn draw_logs_view(state: &OpState, scroll: usize) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .logs
        .iter()
        .skip(scroll)
        .map(|line| Line::from(line.clone()))
        .collect();
    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::TOP)
                .title("LOGS (PgUp/PgDown)"),
        )
        .wrap(Wrap { trim: true })
}

fn draw_help(lang: Lang) -> Paragraph<'static> {
    let lines = vec![
        Line::from("F1 Help  F2 Catalog  F3 Data  F4 Logs  F5 Columns  Esc cancel/quit"),
        Line::from("fetch <id|url> [rows|all]   rows <n|all>   info [id]"),
        Line::from("catalog [refresh]   search <text>   open <n>"),
        Line::from("filter <text>   export   download   cancel   lang [en|fr]   quit"),
        Line::from("PgUp/PgDown scroll rows, Left/Right scroll columns, Tab completes"),
        Line::from(""),
        Line::from(Span::styled(
            t(lang, Key::HowToHeader),
            Style::default().fg(Color::Cyan),
        )),
        Line::from(t(lang, Key::HowToBody)),
    ];
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::TOP).title("Help"))
        .wrap(Wrap { trim: true })
}

fn draw_command_line<T: PortalTransport + Clone + 'static>(
    frame: &mut ratatui::Frame,
    tui: &Tui<T>,
    area: Rect,
) {
    let prefix = ": ";
    let hint = match &tui.notice {
        Some(notice) => Span::styled(notice.clone(), Style::default().fg(Color::Yellow)),
        None => Span::styled(
            command_preview(&tui.input),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let lines = vec![
        Line::from(vec![
            Span::styled(
                prefix,
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(tui.input.clone(), Style::default().fg(Color::White)),
        ]),
        Line::from(vec![Span::styled("= ", Style::default().fg(Color::DarkGray)), hint]),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::TOP)),
        area,
    );
    let cursor_x = area
        .x
        .saturating_add((prefix.len() + tui.input.chars().count()) as u16)
        .min(area.x.saturating_add(area.width.saturating_sub(1)));
    frame.set_cursor_position((cursor_x, area.y.saturating_add(1)));
}

fn command_preview(input: &str) -> String {
    match parse_command(input) {
        Ok(Command::Fetch { target, max_rows }) => match max_rows {
            Some(0) => format!("fetch {target} (all rows)"),
            Some(max) => format!("fetch {target} (max {max})"),
            None => format!("fetch {target}"),
        },
        Ok(_) => input.trim().to_string(),
        Err(_) if input.trim().is_empty() => "ready (F1 for help)".to_string(),
        Err(message) => message,
    }
}

fn label_style() -> Style {
    Style::default().fg(Color::Gray)
}

fn elapsed_label(elapsed: Duration, active: bool) -> String {
    if active {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        String::new()
    }
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = match name {
        "Resolve" => Phase::Resolve,
        "Fetch" => Phase::Fetch,
        "Verify" => Phase::Verify,
        "Store" => Phase::Store,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn parse_latency(message: &str) -> Option<u128> {
    message
        .split("latency_ms=")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse::<u128>().ok())
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// `2024-05-01T12:34:56.123456` to `2024-05-01`; unparsable input is returned as is.
fn short_date(value: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| value.to_string())
}
