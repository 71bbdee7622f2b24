// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap};
use std::collections::BTreeSet;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use time::{Date, OffsetDateTime};
use torre_app::{
    Bucket, BulkFailure, BulkKind, BulkOutcome, BulkPhase, BulkRequest, DEFAULT_SETTLE_DELAY,
    DashboardCounts, DeleteConfirmation, EMPTY_DISPLAY, FetchTicket, FilterConfig, ListCommand,
    RankedRow, Staleness, StatusFilter, Trip, TripId, TripListState, TripQuery, TripUpdate,
    UpdateCategory, UpdateFormInput, display_or_dash,
};
use tracing::{debug, warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_CLEAR_DELAY: Duration = Duration::from_secs(4);
const PASSWORD_MASK: &str = "********";
const TABLE_COLUMNS: [&str; 8] = [
    "", "elapsed", "trip", "driver", "plate", "destination", "project", "latest",
];

/// Side of the console that talks to the outside world.
pub trait TripRuntime {
    fn now(&self) -> OffsetDateTime;

    /// Date sent as the `date` parameter in today scope.
    fn today(&self) -> Date {
        self.now().date()
    }

    fn project_query(&self) -> Vec<String>;

    fn settle_delay(&self) -> Duration {
        DEFAULT_SETTLE_DELAY
    }

    fn load_trips(&mut self, query: &TripQuery) -> Result<Vec<Trip>>;
    fn load_trip_updates(&mut self, trip_id: TripId) -> Result<Vec<TripUpdate>>;
    fn run_bulk(
        &mut self,
        request: &BulkRequest,
        on_progress: &mut dyn FnMut(usize, usize),
    ) -> BulkOutcome;

    fn spawn_load_trips(
        &mut self,
        ticket: FetchTicket,
        query: TripQuery,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let result = self
            .load_trips(&query)
            .map_err(|error| format!("{error:#}"));
        tx.send(InternalEvent::TripsLoaded { ticket, result })
            .map_err(|_| anyhow!("trip event channel closed"))?;
        Ok(())
    }

    fn spawn_bulk(&mut self, request: BulkRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let token = request.token;
        let progress_tx = tx.clone();
        let outcome = self.run_bulk(&request, &mut |completed, total| {
            let _ = progress_tx.send(InternalEvent::BulkProgress {
                token,
                completed,
                total,
            });
        });
        tx.send(InternalEvent::BulkFinished(outcome))
            .map_err(|_| anyhow!("bulk event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    TripsLoaded {
        ticket: FetchTicket,
        result: std::result::Result<Vec<Trip>, String>,
    },
    BulkProgress {
        token: u64,
        completed: usize,
        total: usize,
    },
    BulkFinished(BulkOutcome),
    BulkSettle {
        token: u64,
    },
    ClearStatus {
        token: u64,
    },
    Tick,
}

/// Sends [`InternalEvent::Tick`] on a fixed interval until stopped or dropped.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn start(tx: Sender<InternalEvent>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let slice = interval.min(Duration::from_millis(50));
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let mut waited = Duration::ZERO;
            while !flag.load(Ordering::Relaxed) {
                thread::sleep(slice);
                waited += slice;
                if waited < interval {
                    continue;
                }
                waited = Duration::ZERO;
                if flag.load(Ordering::Relaxed) || tx.send(InternalEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FormFocus {
    #[default]
    Category,
    Notes,
    ImageUrl,
}

impl FormFocus {
    const fn next(self) -> Self {
        match self {
            Self::Category => Self::Notes,
            Self::Notes => Self::ImageUrl,
            Self::ImageUrl => Self::Category,
        }
    }

    const fn prev(self) -> Self {
        match self {
            Self::Category => Self::ImageUrl,
            Self::Notes => Self::Category,
            Self::ImageUrl => Self::Notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct UpdateFormUi {
    category: usize,
    notes: String,
    image_url: String,
    focus: FormFocus,
}

impl UpdateFormUi {
    fn new() -> Self {
        let category = UpdateCategory::ALL
            .iter()
            .position(|category| *category == UpdateCategory::TrackingCheckpoint)
            .unwrap_or(0);
        Self {
            category,
            notes: String::new(),
            image_url: String::new(),
            focus: FormFocus::Category,
        }
    }

    fn category(&self) -> UpdateCategory {
        UpdateCategory::ALL
            .get(self.category)
            .copied()
            .unwrap_or(UpdateCategory::TrackingCheckpoint)
    }

    fn to_input(&self) -> UpdateFormInput {
        UpdateFormInput {
            category: self.category(),
            notes: self.notes.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Overlay {
    #[default]
    None,
    Search,
    Projects {
        cursor: usize,
    },
    UpdateForm(UpdateFormUi),
    ConfirmDelete(DeleteConfirmation),
    Dashboard,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ViewData {
    cursor: usize,
    overlay: Overlay,
    status_token: u64,
}

pub fn run_app<R: TripRuntime>(state: &mut TripListState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();
    let mut ticker = Ticker::start(internal_tx.clone(), TICK_INTERVAL);

    state.dispatch(ListCommand::Tick(runtime.now()));
    start_fetch(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(Duration::from_millis(120)).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if !has_event {
            continue;
        }
        match event::read().context("read event") {
            Ok(Event::Key(key)) => {
                if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                    break;
                }
            }
            Ok(_) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }
    }

    ticker.stop();
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::TripsLoaded { ticket, result } => {
                let failed = result.is_err();
                if state.apply_fetch(ticket, result.map_err(anyhow::Error::msg)) {
                    clamp_cursor(state, view_data);
                    if failed {
                        arm_status_clear(view_data, tx);
                    }
                }
            }
            InternalEvent::BulkProgress {
                token, completed, ..
            } => {
                state.bulk_progress(token, completed);
            }
            InternalEvent::BulkFinished(outcome) => {
                let token = outcome.token;
                let succeeded = outcome.failure.is_none();
                if state.finish_bulk(outcome).is_empty() {
                    continue;
                }
                clamp_cursor(state, view_data);
                if succeeded {
                    schedule_bulk_settle(tx, token, runtime.settle_delay());
                    arm_status_clear(view_data, tx);
                }
            }
            InternalEvent::BulkSettle { token } => {
                state.bulk.settle(token);
            }
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(ListCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::Tick => {
                state.dispatch(ListCommand::Tick(runtime.now()));
            }
        }
    }
}

fn start_fetch<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let ticket = state.begin_fetch();
    let query = TripQuery::for_scope(state.scope, runtime.today(), &runtime.project_query());
    debug!(request_id = ticket.request_id, scope = state.scope.as_str(), "requesting trips");
    if let Err(error) = runtime.spawn_load_trips(ticket, query, tx.clone()) {
        emit_status(state, view_data, tx, format!("load failed: {error:#}"));
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_DELAY);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn schedule_bulk_settle(internal_tx: &Sender<InternalEvent>, token: u64, delay: Duration) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(delay);
        let _ = sender.send(InternalEvent::BulkSettle { token });
    });
}

fn arm_status_clear(view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn emit_status(
    state: &mut TripListState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(ListCommand::SetStatus(message.into()));
    arm_status_clear(view_data, internal_tx);
}

fn clamp_cursor(state: &TripListState, view_data: &mut ViewData) {
    let len = state.rows().len();
    if len == 0 {
        view_data.cursor = 0;
    } else if view_data.cursor >= len {
        view_data.cursor = len - 1;
    }
}

fn move_cursor(state: &TripListState, view_data: &mut ViewData, delta: isize) {
    let len = state.rows().len();
    if len == 0 {
        view_data.cursor = 0;
        return;
    }
    let next = (view_data.cursor as isize + delta).clamp(0, len as isize - 1);
    view_data.cursor = next as usize;
}

fn handle_key_event<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    match view_data.overlay {
        Overlay::Search => {
            handle_search_key(state, view_data, key);
            return false;
        }
        Overlay::Projects { .. } => {
            handle_project_picker_key(state, view_data, key);
            return false;
        }
        Overlay::UpdateForm(_) => {
            handle_update_form_key(state, runtime, view_data, internal_tx, key);
            return false;
        }
        Overlay::ConfirmDelete(_) => {
            handle_confirm_delete_key(state, runtime, view_data, internal_tx, key);
            return false;
        }
        Overlay::Dashboard | Overlay::Help => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Char('D') | KeyCode::Char('?') | KeyCode::Char('q')
            ) {
                view_data.overlay = Overlay::None;
                if state.fetch_cancelled() {
                    start_fetch(state, runtime, view_data, internal_tx);
                }
            }
            return false;
        }
        Overlay::None => {}
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('q'), _) => return true,
        (KeyCode::Char('j') | KeyCode::Down, _) => move_cursor(state, view_data, 1),
        (KeyCode::Char('k') | KeyCode::Up, _) => move_cursor(state, view_data, -1),
        (KeyCode::Char('g') | KeyCode::Home, _) => view_data.cursor = 0,
        (KeyCode::Char('G') | KeyCode::End, _) => {
            view_data.cursor = state.rows().len().saturating_sub(1);
        }
        (KeyCode::Char(' '), modifiers) => {
            state.dispatch(ListCommand::ToggleRow {
                index: view_data.cursor,
                shift: modifiers.contains(KeyModifiers::SHIFT),
            });
        }
        (KeyCode::Char('X'), _) => {
            state.dispatch(ListCommand::ToggleRow {
                index: view_data.cursor,
                shift: true,
            });
        }
        (KeyCode::Char('a'), _) => {
            let checked = !state.selection.all_selected(&state.row_ids());
            state.dispatch(ListCommand::SelectAll(checked));
            let message = format!("{} selected", state.selection.len());
            emit_status(state, view_data, internal_tx, message);
        }
        (KeyCode::Char('/'), _) => view_data.overlay = Overlay::Search,
        (KeyCode::Char('s'), _) => {
            state.dispatch(ListCommand::CycleStatusFilter);
            clamp_cursor(state, view_data);
            arm_status_clear(view_data, internal_tx);
        }
        (KeyCode::Char('p'), _) => view_data.overlay = Overlay::Projects { cursor: 0 },
        (KeyCode::Char('t'), _) => {
            let scope = state.scope.toggled();
            state.dispatch(ListCommand::SetScope(scope));
            arm_status_clear(view_data, internal_tx);
            start_fetch(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Char('r'), _) => match state.opened {
            Some(trip_id) => refresh_opened_trip(state, runtime, view_data, internal_tx, trip_id),
            None => start_fetch(state, runtime, view_data, internal_tx),
        },
        (KeyCode::Char('u'), _) => {
            if state.bulk_targets().is_empty() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "select trips or open one before recording an update",
                );
            } else {
                view_data.overlay = Overlay::UpdateForm(UpdateFormUi::new());
            }
        }
        (KeyCode::Char('d'), _) => match state.delete_confirmation() {
            Some(confirmation) => view_data.overlay = Overlay::ConfirmDelete(confirmation),
            None => emit_status(
                state,
                view_data,
                internal_tx,
                "select trips or open one before deleting",
            ),
        },
        (KeyCode::Enter, _) => {
            if let Some(trip_id) = state.row_ids().get(view_data.cursor).copied() {
                state.dispatch(ListCommand::OpenTrip(trip_id));
            }
        }
        (KeyCode::Esc, _) => {
            if state.bulk.dismiss() {
                state.dispatch(ListCommand::ClearStatus);
            } else if state.opened.is_some() {
                state.dispatch(ListCommand::CloseTrip);
            } else if !state.selection.is_empty() {
                state.dispatch(ListCommand::ClearSelection);
            }
        }
        (KeyCode::Char('D'), _) => {
            state.dispatch(ListCommand::Navigate);
            clamp_cursor(state, view_data);
            view_data.overlay = Overlay::Dashboard;
        }
        (KeyCode::Char('?'), _) => view_data.overlay = Overlay::Help,
        _ => {}
    }
    false
}

fn handle_search_key(state: &mut TripListState, view_data: &mut ViewData, key: KeyEvent) {
    let mut query = state.filter.query.clone();
    match key.code {
        KeyCode::Enter => {
            view_data.overlay = Overlay::None;
            return;
        }
        KeyCode::Esc => {
            query.clear();
            view_data.overlay = Overlay::None;
        }
        KeyCode::Backspace => {
            query.pop();
        }
        KeyCode::Char(c) => query.push(c),
        _ => return,
    }
    state.dispatch(ListCommand::SetQuery(query));
    clamp_cursor(state, view_data);
}

fn project_options(state: &TripListState) -> Vec<String> {
    let mut options: BTreeSet<String> = state.known_projects().into_iter().collect();
    options.extend(state.filter.projects.iter().cloned());
    options.into_iter().collect()
}

fn handle_project_picker_key(state: &mut TripListState, view_data: &mut ViewData, key: KeyEvent) {
    let Overlay::Projects { cursor } = view_data.overlay else {
        return;
    };
    let options = project_options(state);
    match key.code {
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('p') => view_data.overlay = Overlay::None,
        KeyCode::Char('j') | KeyCode::Down => {
            let next = (cursor + 1).min(options.len().saturating_sub(1));
            view_data.overlay = Overlay::Projects { cursor: next };
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.overlay = Overlay::Projects {
                cursor: cursor.saturating_sub(1),
            };
        }
        KeyCode::Char(' ') => {
            if let Some(project) = options.get(cursor) {
                state.dispatch(ListCommand::ToggleProject(project.clone()));
                clamp_cursor(state, view_data);
            }
        }
        KeyCode::Char('c') => {
            state.dispatch(ListCommand::ClearProjects);
            clamp_cursor(state, view_data);
        }
        _ => {}
    }
}

fn handle_update_form_key<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Overlay::UpdateForm(form) = &mut view_data.overlay else {
        return;
    };
    let categories = UpdateCategory::ALL.len();
    match key.code {
        KeyCode::Esc => view_data.overlay = Overlay::None,
        KeyCode::Tab => form.focus = form.focus.next(),
        KeyCode::BackTab => form.focus = form.focus.prev(),
        KeyCode::Enter => {
            let input = form.to_input();
            submit_update_form(state, runtime, view_data, internal_tx, input);
        }
        KeyCode::Up | KeyCode::Char('k') if form.focus == FormFocus::Category => {
            form.category = (form.category + categories - 1) % categories;
        }
        KeyCode::Down | KeyCode::Char('j') if form.focus == FormFocus::Category => {
            form.category = (form.category + 1) % categories;
        }
        KeyCode::Backspace => match form.focus {
            FormFocus::Notes => {
                form.notes.pop();
            }
            FormFocus::ImageUrl => {
                form.image_url.pop();
            }
            FormFocus::Category => {}
        },
        KeyCode::Char(c) => match form.focus {
            FormFocus::Notes => form.notes.push(c),
            FormFocus::ImageUrl => form.image_url.push(c),
            FormFocus::Category => {}
        },
        _ => {}
    }
}

fn submit_update_form<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    input: UpdateFormInput,
) {
    if let Err(error) = input.validate() {
        emit_status(state, view_data, internal_tx, format!("{error:#}"));
        return;
    }
    view_data.overlay = Overlay::None;

    let kind = BulkKind::StatusUpdate(input.category);
    match state.begin_bulk(kind, input.notes.trim().to_owned(), input.image_url()) {
        Ok(request) => submit_bulk(state, runtime, request, internal_tx),
        Err(error) => emit_status(state, view_data, internal_tx, format!("{error:#}")),
    }
}

fn handle_confirm_delete_key<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => {
            view_data.overlay = Overlay::None;
            match state.begin_bulk(BulkKind::Delete, String::new(), None) {
                Ok(request) => submit_bulk(state, runtime, request, internal_tx),
                Err(error) => emit_status(state, view_data, internal_tx, format!("{error:#}")),
            }
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_data.overlay = Overlay::None;
            emit_status(state, view_data, internal_tx, "delete canceled");
        }
        _ => {}
    }
}

fn submit_bulk<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    request: BulkRequest,
    internal_tx: &Sender<InternalEvent>,
) {
    let token = request.token;
    let kind = request.kind;
    let total = request.targets.len();
    let first = request.targets.first().copied();

    if let Err(error) = runtime.spawn_bulk(request, internal_tx.clone()) {
        warn!(token, "could not start bulk action: {error:#}");
        state.finish_bulk(BulkOutcome {
            token,
            kind,
            total,
            applied: Vec::new(),
            failure: first.map(|trip_id| BulkFailure {
                kind,
                completed: 0,
                total,
                failed_at: 1,
                trip_id,
                message: format!("{error:#}"),
            }),
        });
    }
}

fn refresh_opened_trip<R: TripRuntime>(
    state: &mut TripListState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    trip_id: TripId,
) {
    match runtime.load_trip_updates(trip_id) {
        Ok(updates) => {
            let count = updates.len();
            state.replace_updates(trip_id, updates);
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("{count} updates loaded for trip {trip_id}"),
            );
        }
        Err(error) => emit_status(
            state,
            view_data,
            internal_tx,
            format!("load updates failed: {error:#}"),
        ),
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &TripListState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_text(state)).block(
        Block::default()
            .title("torre de control")
            .borders(Borders::ALL),
    );
    frame.render_widget(header, layout[0]);

    let opened = state
        .opened
        .and_then(|trip_id| state.trip(trip_id).map(|trip| (trip_id, trip)));
    match opened {
        Some((trip_id, trip)) => {
            let body = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
                .split(layout[1]);
            render_table(frame, body[0], state, view_data);
            let staleness = state
                .rows()
                .iter()
                .find(|row| row.trip_id == trip_id)
                .map(|row| row.staleness);
            let detail = Paragraph::new(render_detail_text(trip, staleness))
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .title(format!("trip {}", trip.display_code()))
                        .borders(Borders::ALL),
                );
            frame.render_widget(detail, body[1]);
        }
        None => render_table(frame, layout[1], state, view_data),
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    let overlay = match &view_data.overlay {
        Overlay::None | Overlay::Search => None,
        Overlay::Projects { cursor } => Some((
            "projects",
            render_project_picker_text(&project_options(state), &state.filter, *cursor),
        )),
        Overlay::UpdateForm(form) => Some((
            "record update",
            render_update_form_text(form, state.bulk_targets().len()),
        )),
        Overlay::ConfirmDelete(confirmation) => Some(("delete", confirmation.prompt())),
        Overlay::Dashboard => Some(("dashboard", render_dashboard_text(&state.dashboard_counts()))),
        Overlay::Help => Some(("help", help_overlay_text().to_owned())),
    };
    if let Some((title, text)) = overlay {
        let area = centered_rect(60, 50, frame.area());
        frame.render_widget(Clear, area);
        let widget = Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(title)
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Cyan)),
            );
        frame.render_widget(widget, area);
    }
}

fn render_table(frame: &mut ratatui::Frame<'_>, area: Rect, state: &TripListState, view_data: &ViewData) {
    let header = Row::new(TABLE_COLUMNS.iter().map(|label| {
        Cell::from(*label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = state.rows().iter().enumerate().filter_map(|(index, row)| {
        let trip = state.trip(row.trip_id)?;
        let checked = state.selection.is_selected(row.trip_id);
        let incident = trip
            .latest_category()
            .is_some_and(UpdateCategory::is_incident);

        let cells = row_cells(row, trip, checked)
            .into_iter()
            .enumerate()
            .map(|(column, text)| {
                let mut style = Style::default();
                if checked {
                    style = style.fg(Color::Cyan);
                }
                if column == 1 && row.bucket == Bucket::Overdue {
                    style = style.fg(Color::Red).add_modifier(Modifier::BOLD);
                }
                if column == 7 && incident {
                    style = style.fg(Color::LightRed);
                }
                Cell::from(text).style(style)
            })
            .collect::<Vec<_>>();

        let mut row_style = Style::default();
        if index == view_data.cursor {
            row_style = row_style.bg(Color::DarkGray);
        }
        Some(Row::new(cells).style(row_style))
    });

    let widths = [
        Constraint::Length(3),
        Constraint::Length(7),
        Constraint::Min(8),
        Constraint::Min(10),
        Constraint::Length(9),
        Constraint::Min(10),
        Constraint::Min(8),
        Constraint::Min(12),
    ];
    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(format!("trips ({})", state.rows().len()))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn row_cells(row: &RankedRow, trip: &Trip, checked: bool) -> [String; 8] {
    [
        if checked { "[x]" } else { "[ ]" }.to_owned(),
        row.staleness.display(),
        trip.display_code().to_owned(),
        display_or_dash(&trip.driver_name).to_owned(),
        display_or_dash(&trip.plate_number).to_owned(),
        display_or_dash(&trip.destination).to_owned(),
        display_or_dash(&trip.project).to_owned(),
        trip.latest_category()
            .map_or(EMPTY_DISPLAY, UpdateCategory::label)
            .to_owned(),
    ]
}

fn header_text(state: &TripListState) -> String {
    let counts = state.dashboard_counts();
    let mut parts = vec![
        state.scope.label().to_owned(),
        format!("{} trips", counts.total),
        format!("{} overdue", counts.overdue),
        format!("{} recent", counts.recent),
    ];
    if !state.selection.is_empty() {
        parts.push(format!("{} selected", state.selection.len()));
    }
    if let Some(filter) = filter_summary(&state.filter) {
        parts.push(filter);
    }
    if state.is_fetching() {
        parts.push("loading".to_owned());
    }
    parts.join(" | ")
}

fn filter_summary(filter: &FilterConfig) -> Option<String> {
    if !filter.is_active() {
        return None;
    }
    let mut parts = Vec::new();
    if !filter.query.is_empty() {
        parts.push(format!("/{}", filter.query));
    }
    if let StatusFilter::Category(category) = filter.status {
        parts.push(format!("status: {}", category.label()));
    }
    if !filter.projects.is_empty() {
        let projects: Vec<&str> = filter.projects.iter().map(String::as_str).collect();
        parts.push(format!("projects: {}", projects.join(", ")));
    }
    Some(format!("filter {}", parts.join(" ")))
}

fn status_text(state: &TripListState, view_data: &ViewData) -> String {
    if view_data.overlay == Overlay::Search {
        return format!("/{}", state.filter.query);
    }
    match state.bulk.phase() {
        BulkPhase::Idle => {}
        BulkPhase::Failed(failure) => return format!("{} (esc to dismiss)", failure.summary()),
        BulkPhase::Submitting { .. } | BulkPhase::Completed { .. } => {
            if let Some(label) = state.bulk.progress_label() {
                return label;
            }
        }
    }
    if let Some(line) = &state.status_line {
        return line.clone();
    }
    "j/k move  space select  a all  u update  d delete  / search  p projects  t scope  ? help"
        .to_owned()
}

fn format_timestamp(at: OffsetDateTime) -> String {
    at.format(&time::macros::format_description!(
        "[year]-[month]-[day] [hour]:[minute]"
    ))
    .unwrap_or_else(|_| at.to_string())
}

fn render_detail_text(trip: &Trip, staleness: Option<Staleness>) -> String {
    let mut lines = vec![
        format!(
            "trip {}  system {}",
            trip.display_code(),
            display_or_dash(&trip.system_trip_id)
        ),
        format!(
            "driver {}  phone {}  doc {}",
            display_or_dash(&trip.driver_name),
            display_or_dash(&trip.driver_phone),
            display_or_dash(&trip.driver_document)
        ),
        format!(
            "route {} -> {}",
            display_or_dash(&trip.origin),
            display_or_dash(&trip.destination)
        ),
        format!(
            "project {}  plate {}  property {}  shift {}",
            display_or_dash(&trip.project),
            display_or_dash(&trip.plate_number),
            trip.property_type
                .map_or(EMPTY_DISPLAY, |property| property.as_str()),
            display_or_dash(&trip.shift)
        ),
        format!(
            "status {}  delivery {}",
            trip.status.label(),
            display_or_dash(trip.delivery_date.get(..10).unwrap_or(&trip.delivery_date))
        ),
    ];
    if let Some(staleness) = staleness {
        lines.push(format!(
            "elapsed {} ({})",
            staleness.display(),
            staleness.bucket().label()
        ));
    }

    lines.push(String::new());
    lines.push("updates".to_owned());
    if trip.updates.is_empty() {
        lines.push(format!("  {EMPTY_DISPLAY}"));
    }
    for update in &trip.updates {
        let mut line = format!(
            "  {}  {}",
            format_timestamp(update.created_at),
            update.category.label()
        );
        if !update.notes.trim().is_empty() {
            line.push_str("  ");
            line.push_str(update.notes.trim());
        }
        if !update.author.trim().is_empty() {
            line.push_str(&format!("  ({})", update.author.trim()));
        }
        if let Some(url) = &update.image_url {
            line.push_str(&format!("  [{url}]"));
        }
        lines.push(line);
    }

    lines.push(String::new());
    lines.push("gps".to_owned());
    if trip.gps_devices.is_empty() {
        lines.push(format!("  {}", display_or_dash(&trip.gps_provider)));
    }
    for device in &trip.gps_devices {
        let password = if device.password.is_empty() {
            EMPTY_DISPLAY
        } else {
            PASSWORD_MASK
        };
        lines.push(format!(
            "  {}  {}  user {}  password {}",
            display_or_dash(&device.provider),
            display_or_dash(&device.uri),
            display_or_dash(&device.username),
            password
        ));
    }
    lines.join("\n")
}

fn render_project_picker_text(options: &[String], filter: &FilterConfig, cursor: usize) -> String {
    if options.is_empty() {
        return "no projects in the loaded trips".to_owned();
    }
    let mut lines: Vec<String> = options
        .iter()
        .enumerate()
        .map(|(index, project)| {
            let marker = if index == cursor { ">" } else { " " };
            let check = if filter.projects.contains(project) {
                "[x]"
            } else {
                "[ ]"
            };
            format!("{marker} {check} {project}")
        })
        .collect();
    lines.push(String::new());
    lines.push("space toggle  c clear  esc close".to_owned());
    lines.join("\n")
}

fn render_update_form_text(form: &UpdateFormUi, targets: usize) -> String {
    let focus = |field: FormFocus| if form.focus == field { ">" } else { " " };
    let mut lines = vec![
        match targets {
            1 => "recording on 1 trip".to_owned(),
            count => format!("recording on {count} trips"),
        },
        String::new(),
        format!("{} category", focus(FormFocus::Category)),
    ];
    for (index, category) in UpdateCategory::ALL.iter().enumerate() {
        let marker = if index == form.category { "(*)" } else { "( )" };
        lines.push(format!("    {marker} {}", category.label()));
    }
    lines.push(format!("{} notes: {}", focus(FormFocus::Notes), form.notes));
    lines.push(format!(
        "{} evidence url: {}",
        focus(FormFocus::ImageUrl),
        form.image_url
    ));
    lines.push(String::new());
    lines.push("tab next field  enter submit  esc cancel".to_owned());
    lines.join("\n")
}

fn render_dashboard_text(counts: &DashboardCounts) -> String {
    let mut lines = vec![
        format!("trips: {}", counts.total),
        format!("overdue: {}", counts.overdue),
        format!("recent: {}", counts.recent),
        format!("never updated: {}", counts.never_updated),
        format!("without updates: {}", counts.without_updates),
        String::new(),
        "latest update".to_owned(),
    ];
    for category in UpdateCategory::ALL {
        lines.push(format!(
            "  {:<20} {}",
            category.label(),
            counts.count_for(category)
        ));
    }
    lines.join("\n")
}

fn help_overlay_text() -> &'static str {
    "j/k      move\n\
     space    toggle row (shift+space or X selects a range)\n\
     a        select or clear all visible rows\n\
     enter    open trip detail\n\
     u        record an update on the selection\n\
     d        delete the selection\n\
     /        search\n\
     s        cycle status filter\n\
     p        filter by project\n\
     t        switch today / all trips\n\
     r        refresh\n\
     D        dashboard\n\
     esc      dismiss error, close detail, clear selection\n\
     q        quit"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        InternalEvent, Overlay, Ticker, TripRuntime, ViewData, handle_key_event,
        process_internal_events, render_dashboard_text, render_detail_text, row_cells,
        start_fetch, status_text,
    };
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::sync::mpsc;
    use std::time::Duration;
    use time::OffsetDateTime;
    use torre_app::{
        BulkOutcome, BulkPhase, BulkRequest, FilterScope, GpsDevice, Trip, TripBackend, TripId,
        TripListState, TripQuery, TripScope, TripUpdate, UpdateCategory,
    };
    use torre_testkit::{FIXTURE_NOW, MemoryBackend, trip_updated_minutes_ago};

    struct TestRuntime {
        backend: MemoryBackend,
        now: OffsetDateTime,
        projects: Vec<String>,
        queries: Vec<TripQuery>,
    }

    impl TestRuntime {
        fn new(trips: Vec<Trip>) -> Self {
            Self {
                backend: MemoryBackend::new(trips).with_clock(FIXTURE_NOW),
                now: FIXTURE_NOW,
                projects: Vec::new(),
                queries: Vec::new(),
            }
        }

        fn fleet() -> Self {
            Self::new(vec![
                trip_updated_minutes_ago(1, 5, UpdateCategory::RouteStart),
                trip_updated_minutes_ago(2, 45, UpdateCategory::Loaded),
                trip_updated_minutes_ago(3, 25, UpdateCategory::Breakdown),
            ])
        }
    }

    impl TripRuntime for TestRuntime {
        fn now(&self) -> OffsetDateTime {
            self.now
        }

        fn project_query(&self) -> Vec<String> {
            self.projects.clone()
        }

        fn load_trips(&mut self, query: &TripQuery) -> anyhow::Result<Vec<Trip>> {
            self.queries.push(query.clone());
            self.backend.list_trips(query)
        }

        fn load_trip_updates(&mut self, trip_id: TripId) -> anyhow::Result<Vec<TripUpdate>> {
            self.backend.list_trip_updates(trip_id)
        }

        fn run_bulk(
            &mut self,
            request: &BulkRequest,
            on_progress: &mut dyn FnMut(usize, usize),
        ) -> BulkOutcome {
            torre_app::run_bulk(&self.backend, request, on_progress)
        }
    }

    struct Harness {
        state: TripListState,
        runtime: TestRuntime,
        view_data: ViewData,
        tx: mpsc::Sender<InternalEvent>,
        rx: mpsc::Receiver<InternalEvent>,
    }

    impl Harness {
        fn idle(runtime: TestRuntime) -> Self {
            let (tx, rx) = mpsc::channel();
            Self {
                state: TripListState::new(TripScope::All, FilterScope::View, FIXTURE_NOW),
                runtime,
                view_data: ViewData::default(),
                tx,
                rx,
            }
        }

        fn loaded(runtime: TestRuntime) -> Self {
            let mut harness = Self::idle(runtime);
            harness.fetch();
            harness.pump();
            harness
        }

        fn fetch(&mut self) {
            start_fetch(&mut self.state, &mut self.runtime, &mut self.view_data, &self.tx);
        }

        fn pump(&mut self) {
            process_internal_events(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                &self.rx,
            );
        }

        fn press(&mut self, key: KeyEvent) -> bool {
            let quit = handle_key_event(
                &mut self.state,
                &mut self.runtime,
                &mut self.view_data,
                &self.tx,
                key,
            );
            self.pump();
            quit
        }

        fn keys(&mut self, script: &str) {
            for c in script.chars() {
                self.press(char_key(c));
            }
        }

        fn order(&self) -> Vec<i64> {
            self.state.row_ids().iter().map(|id| id.get()).collect()
        }
    }

    fn char_key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn initial_fetch_ranks_overdue_first() {
        let harness = Harness::loaded(TestRuntime::fleet());
        assert_eq!(harness.order(), vec![2, 3, 1]);
        assert_eq!(harness.runtime.queries.len(), 1);
        assert_eq!(harness.runtime.queries[0].date, None);
    }

    #[test]
    fn space_and_shift_space_select_a_range() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.press(char_key(' '));
        harness.keys("jj");
        harness.press(KeyEvent::new(KeyCode::Char(' '), KeyModifiers::SHIFT));
        assert_eq!(harness.state.selection.len(), 3);

        harness.press(key(KeyCode::Esc));
        assert!(harness.state.selection.is_empty());
    }

    #[test]
    fn select_all_toggles_visible_rows() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.keys("a");
        assert_eq!(harness.state.selection.len(), 3);
        assert_eq!(harness.state.status_line.as_deref(), Some("3 selected"));
        harness.keys("a");
        assert!(harness.state.selection.is_empty());
    }

    #[test]
    fn search_filters_live_and_escape_clears() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.keys("/v-3");
        assert_eq!(harness.order(), vec![3]);
        assert_eq!(status_text(&harness.state, &harness.view_data), "/v-3");

        harness.press(key(KeyCode::Esc));
        assert_eq!(harness.view_data.overlay, Overlay::None);
        assert_eq!(harness.order(), vec![2, 3, 1]);
    }

    #[test]
    fn scope_toggle_refetches_with_date() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.keys("at");
        assert_eq!(harness.state.scope, TripScope::Today);
        assert!(harness.state.selection.is_empty());
        let last = harness.runtime.queries.last().expect("refetch issued");
        assert_eq!(last.date, Some(FIXTURE_NOW.date()));
    }

    #[test]
    fn late_fetch_response_is_dropped() -> anyhow::Result<()> {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        start_fetch(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.runtime.backend.delete_trip(TripId::new(1))?;
        start_fetch(
            &mut harness.state,
            &mut harness.runtime,
            &mut harness.view_data,
            &harness.tx,
        );
        harness.pump();
        assert_eq!(harness.order(), vec![2, 3]);
        Ok(())
    }

    #[test]
    fn bulk_update_records_category_on_selection() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.press(char_key(' '));
        harness.keys("j");
        harness.press(char_key(' '));
        harness.keys("u");
        assert!(matches!(harness.view_data.overlay, Overlay::UpdateForm(_)));

        harness.press(key(KeyCode::Tab));
        harness.keys("peaje km 40");
        harness.press(key(KeyCode::Enter));

        assert_eq!(harness.view_data.overlay, Overlay::None);
        assert_eq!(
            harness.state.status_line.as_deref(),
            Some("recorded Tracking checkpoint on 2 trips")
        );
        for id in [2, 3] {
            let trip = harness.state.trip(TripId::new(id)).expect("trip present");
            assert_eq!(
                trip.latest_category(),
                Some(UpdateCategory::TrackingCheckpoint)
            );
            assert_eq!(trip.updates[0].notes, "peaje km 40");
        }
        assert_eq!(harness.order(), vec![1, 2, 3]);
    }

    #[test]
    fn invalid_evidence_url_keeps_form_open() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.press(key(KeyCode::Enter));
        harness.keys("u");
        harness.press(key(KeyCode::BackTab));
        harness.keys("ftp://x");
        harness.press(key(KeyCode::Enter));

        assert!(matches!(harness.view_data.overlay, Overlay::UpdateForm(_)));
        assert!(
            harness
                .state
                .status_line
                .as_deref()
                .is_some_and(|line| line.contains("http or https"))
        );
    }

    #[test]
    fn partial_delete_failure_waits_for_dismissal() -> anyhow::Result<()> {
        let harness_runtime = TestRuntime::fleet();
        harness_runtime.backend.fail_writes_for(TripId::new(3))?;
        let mut harness = Harness::loaded(harness_runtime);

        harness.keys("ad");
        assert!(matches!(harness.view_data.overlay, Overlay::ConfirmDelete(_)));
        harness.keys("y");

        assert_eq!(harness.order(), vec![3, 1]);
        let BulkPhase::Failed(failure) = harness.state.bulk.phase() else {
            panic!("expected failed phase, got {:?}", harness.state.bulk.phase());
        };
        assert_eq!(failure.failed_at, 2);
        assert_eq!(failure.trip_id, TripId::new(3));
        assert!(status_text(&harness.state, &harness.view_data).contains("esc to dismiss"));

        harness.keys("d");
        assert!(matches!(harness.view_data.overlay, Overlay::ConfirmDelete(_)));
        harness.keys("y");
        assert!(matches!(harness.state.bulk.phase(), BulkPhase::Failed(_)));

        harness.press(key(KeyCode::Esc));
        assert_eq!(harness.state.bulk.phase(), &BulkPhase::Idle);
        assert_eq!(harness.state.status_line, None);
        Ok(())
    }

    #[test]
    fn tick_reclassifies_recent_trip() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        assert_eq!(harness.state.dashboard_counts().overdue, 2);

        harness.runtime.now = FIXTURE_NOW + time::Duration::minutes(15);
        harness.tx.send(InternalEvent::Tick).expect("channel open");
        harness.pump();
        assert_eq!(harness.state.dashboard_counts().overdue, 3);
    }

    #[test]
    fn dashboard_resets_view_filter() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.keys("/v-1");
        harness.press(key(KeyCode::Enter));
        assert_eq!(harness.order(), vec![1]);

        harness.keys("D");
        assert_eq!(harness.view_data.overlay, Overlay::Dashboard);
        assert_eq!(harness.order(), vec![2, 3, 1]);
        let text = render_dashboard_text(&harness.state.dashboard_counts());
        assert!(text.contains("overdue: 2"));
        assert!(text.contains("Breakdown"));
    }

    #[test]
    fn leaving_dashboard_reloads_a_dropped_fetch() {
        let mut harness = Harness::idle(TestRuntime::fleet());
        harness.fetch();
        harness.keys("D");
        assert!(harness.order().is_empty());
        assert!(!harness.state.is_fetching());

        harness.press(key(KeyCode::Esc));
        assert_eq!(harness.view_data.overlay, Overlay::None);
        assert_eq!(harness.order(), vec![2, 3, 1]);
        assert!(!harness.state.is_fetching());
        assert_eq!(harness.runtime.queries.len(), 2);
    }

    #[test]
    fn leaving_dashboard_after_load_does_not_refetch() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        harness.keys("D");
        harness.press(key(KeyCode::Esc));
        assert_eq!(harness.runtime.queries.len(), 1);
    }

    #[test]
    fn quit_key_exits() {
        let mut harness = Harness::loaded(TestRuntime::fleet());
        assert!(harness.press(char_key('q')));
    }

    #[test]
    fn detail_masks_gps_password() {
        let mut trip = trip_updated_minutes_ago(4, 30, UpdateCategory::LostContact);
        trip.gps_devices.push(GpsDevice {
            provider: "Wialon".to_owned(),
            uri: "https://hosting.example".to_owned(),
            username: "flota1".to_owned(),
            password: "hunter2".to_owned(),
        });
        let text = render_detail_text(&trip, None);
        assert!(text.contains("Lost contact"));
        assert!(text.contains("flota1"));
        assert!(text.contains("********"));
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn row_cells_show_placeholders() {
        let harness = Harness::loaded(TestRuntime::fleet());
        let row = harness.state.rows()[0];
        let trip = harness.state.trip(row.trip_id).expect("trip present");
        let cells = row_cells(&row, trip, true);
        assert_eq!(cells[0], "[x]");
        assert_eq!(cells[1], "0:45");
        assert_eq!(cells[3], "—");
        assert_eq!(cells[7], "Loaded");
    }

    #[test]
    fn ticker_stops_on_drop() {
        let (tx, rx) = mpsc::channel();
        let ticker = Ticker::start(tx, Duration::from_millis(5));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(2)),
            Ok(InternalEvent::Tick)
        );
        drop(ticker);
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }
}
