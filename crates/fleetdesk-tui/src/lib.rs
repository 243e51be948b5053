// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use fleetdesk_app::{
    ActionDispatcher, ActionError, ActionKind, AppCommand, AppEvent, AppMode, AppState,
    Collection, DeleteReport, DeleteTarget, FetchOutcome, FetchStatus, Notice, RemoteActions,
    RowId, RowPatch, RowRecord, SortDirection, TableController, ViewLifetime,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use serde_json::Value;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const PAGE_SIZE_STEP: usize = 5;
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const SELECTED_MARK: &str = "●";
const SORT_ASC_MARK: &str = "▲";
const SORT_DESC_MARK: &str = "▼";

pub trait ConsoleRuntime {
    fn remote(&mut self, collection: Collection) -> RemoteActions;
    // Returns the name the backend knows the user by.
    fn sign_in(&mut self, identifier: &str, password: &str) -> Result<String>;
    fn sign_out(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    Fetched {
        mount_id: u64,
        request_id: u64,
        result: Result<FetchOutcome, ActionError>,
    },
    Deleted {
        mount_id: u64,
        collection: Collection,
        result: Result<DeleteReport, ActionError>,
    },
    Saved {
        mount_id: u64,
        collection: Collection,
        kind: ActionKind,
        result: Result<RowRecord, ActionError>,
    },
    Viewed {
        mount_id: u64,
        request_id: u64,
        result: Result<RowRecord, ActionError>,
    },
}

// Replaced wholesale on every tab switch.
#[derive(Debug)]
struct MountedView {
    id: u64,
    table: TableController,
    dispatcher: ActionDispatcher,
    lifetime: ViewLifetime,
    fetch_request: Option<u64>,
    detail_request: Option<u64>,
}

#[derive(Debug, Default)]
struct SignInForm {
    identifier: String,
    password: String,
    on_password: bool,
}

impl SignInForm {
    fn field_mut(&mut self) -> &mut String {
        if self.on_password {
            &mut self.password
        } else {
            &mut self.identifier
        }
    }
}

#[derive(Debug)]
struct ViewData {
    view: Option<MountedView>,
    page_size: usize,
    cursor_row: usize,
    cursor_col: usize,
    input: String,
    pending_delete: Vec<DeleteTarget>,
    // None while editing means a new row.
    edit_target: Option<RowId>,
    detail: Option<RowRecord>,
    sign_in: SignInForm,
    next_id: u64,
    status_token: u64,
}

impl ViewData {
    fn new(page_size: usize) -> Self {
        Self {
            view: None,
            page_size: page_size.max(1),
            cursor_row: 0,
            cursor_col: 0,
            input: String::new(),
            pending_delete: Vec::new(),
            edit_target: None,
            detail: None,
            sign_in: SignInForm::default(),
            next_id: 0,
            status_token: 0,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id = self.next_id.saturating_add(1);
        self.next_id
    }

    fn cursor_row_id(&self) -> Option<RowId> {
        let view = self.view.as_ref()?;
        view.table
            .page_rows()
            .get(self.cursor_row)
            .map(|row| row.id)
    }
}

pub fn run_app<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    page_size: usize,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(page_size);
    let (internal_tx, internal_rx) = mpsc::channel();
    mount_active_tab(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);

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
        if has_event {
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
    }

    unmount(&mut view_data);
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        handle_internal_event(state, view_data, tx, event);
    }
}

fn handle_internal_event(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: InternalEvent,
) {
    match event {
        InternalEvent::ClearStatus { token } if token == view_data.status_token => {
            state.dispatch(AppCommand::ClearStatus);
        }
        InternalEvent::ClearStatus { .. } => {}
        InternalEvent::Fetched {
            mount_id,
            request_id,
            result,
        } => apply_fetch(state, view_data, tx, mount_id, request_id, result),
        InternalEvent::Deleted {
            mount_id,
            collection,
            result,
        } => apply_delete(state, view_data, tx, mount_id, collection, result),
        InternalEvent::Saved {
            mount_id,
            collection,
            kind,
            result,
        } => apply_save(state, view_data, tx, mount_id, collection, kind, result),
        InternalEvent::Viewed {
            mount_id,
            request_id,
            result,
        } => apply_detail(state, view_data, tx, mount_id, request_id, result),
    }
}

fn apply_fetch(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    mount_id: u64,
    request_id: u64,
    result: Result<FetchOutcome, ActionError>,
) {
    let Some(view) = view_data
        .view
        .as_mut()
        .filter(|view| view.id == mount_id && view.fetch_request == Some(request_id))
    else {
        debug!(mount_id, request_id, "stale fetch result discarded");
        return;
    };
    view.fetch_request = None;

    let mut notices = Vec::new();
    let status = view.dispatcher.finish_fetch(
        &mut view.table,
        &view.lifetime,
        result,
        |notice| notices.push(notice),
    );
    if status == Ok(FetchStatus::Deferred) {
        notices.push(ActionError::Deferred.notice());
    }
    clamp_cursor(view_data);
    show_notices(state, &mut view_data.status_token, tx, notices);
}

// A mutation always reports, even after its view is gone.
fn apply_delete(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    mount_id: u64,
    collection: Collection,
    result: Result<DeleteReport, ActionError>,
) {
    let mut notices = Vec::new();
    match view_data.view.as_mut().filter(|view| view.id == mount_id) {
        Some(view) => {
            let _ = view
                .dispatcher
                .finish_delete(&mut view.table, result, |notice| notices.push(notice));
        }
        None => {
            let _ = ActionDispatcher::report_delete(collection, result, |notice| {
                notices.push(notice)
            });
        }
    }
    clamp_cursor(view_data);
    show_notices(state, &mut view_data.status_token, tx, notices);
}

fn apply_save(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    mount_id: u64,
    collection: Collection,
    kind: ActionKind,
    result: Result<RowRecord, ActionError>,
) {
    let mut notices = Vec::new();
    match view_data.view.as_mut().filter(|view| view.id == mount_id) {
        Some(view) => {
            let _ = view.dispatcher.finish_save(&mut view.table, kind, result, |notice| {
                notices.push(notice)
            });
        }
        None => {
            let result = result.map(|row| row.id);
            let _ = ActionDispatcher::report_save(collection, kind, result, |notice| {
                notices.push(notice)
            });
        }
    }
    show_notices(state, &mut view_data.status_token, tx, notices);
}

fn apply_detail(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    mount_id: u64,
    request_id: u64,
    result: Result<RowRecord, ActionError>,
) {
    let Some(view) = view_data
        .view
        .as_mut()
        .filter(|view| view.id == mount_id && view.detail_request == Some(request_id))
    else {
        debug!(mount_id, request_id, "stale detail result discarded");
        return;
    };
    view.detail_request = None;
    let collection = view.table.collection();

    match result {
        Ok(row) if state.mode == AppMode::Nav => {
            view_data.detail = Some(row);
            state.dispatch(AppCommand::ShowDetail);
            state.dispatch(AppCommand::ClearStatus);
        }
        Ok(row) => {
            debug!(id = row.id.get(), "detail arrived outside nav mode; dropped");
        }
        Err(failure) => {
            if failure != ActionError::Deferred {
                error!(collection = collection.as_str(), "{failure}");
            }
            emit_status(state, &mut view_data.status_token, tx, failure.to_string());
        }
    }
}

// The status line holds one message; the latest notice wins.
fn show_notices(
    state: &mut AppState,
    status_token: &mut u64,
    tx: &Sender<InternalEvent>,
    notices: Vec<Notice>,
) {
    if let Some(notice) = notices.into_iter().last() {
        emit_status(state, status_token, tx, notice.message);
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    status_token: &mut u64,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.set_status(message);
    *status_token = status_token.saturating_add(1);
    schedule_status_clear(internal_tx, *status_token);
}

// Stays until replaced; no clear timer.
fn hold_status(state: &mut AppState, status_token: &mut u64, message: impl Into<String>) {
    state.set_status(message);
    *status_token = status_token.saturating_add(1);
}

fn mount_active_tab<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    unmount(view_data);
    let collection = state.active_tab;
    let id = view_data.next_id();
    view_data.view = Some(MountedView {
        id,
        table: TableController::new(collection, view_data.page_size),
        dispatcher: ActionDispatcher::new(runtime.remote(collection)),
        lifetime: ViewLifetime::mounted(),
        fetch_request: None,
        detail_request: None,
    });
    view_data.cursor_row = 0;
    view_data.cursor_col = 0;
    debug!(collection = collection.as_str(), mount_id = id, "view mounted");
    start_fetch(state, view_data, tx);
}

fn unmount(view_data: &mut ViewData) {
    if let Some(view) = view_data.view.take() {
        view.lifetime.unmount();
        debug!(
            collection = view.table.collection().as_str(),
            mount_id = view.id,
            "view unmounted"
        );
    }
    view_data.pending_delete.clear();
    view_data.edit_target = None;
    view_data.detail = None;
    view_data.input.clear();
}

fn start_fetch(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let request_id = view_data.next_id();
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let mut notices = Vec::new();
    match view.dispatcher.begin_fetch(|notice| notices.push(notice)) {
        Ok(true) => {
            view.fetch_request = Some(request_id);
            let remote = view.dispatcher.remote().clone();
            let lifetime = view.lifetime.clone();
            let mount_id = view.id;
            let sender = tx.clone();
            thread::spawn(move || {
                let result = remote.fetch_rows();
                if !lifetime.is_mounted() {
                    debug!(
                        collection = remote.collection().as_str(),
                        request_id, "view unmounted; fetch result dropped"
                    );
                    return;
                }
                let _ = sender.send(InternalEvent::Fetched {
                    mount_id,
                    request_id,
                    result,
                });
            });
        }
        Ok(false) => notices.push(ActionError::Deferred.notice()),
        Err(_) => {}
    }
    show_notices(state, &mut view_data.status_token, tx, notices);
}

fn handle_key_event<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return true;
    }
    match state.mode {
        AppMode::Nav => handle_nav_key(state, runtime, view_data, internal_tx, key),
        AppMode::Filter => {
            handle_filter_key(state, view_data, key);
            false
        }
        AppMode::Edit => {
            handle_edit_key(state, view_data, internal_tx, key);
            false
        }
        AppMode::Confirm => {
            handle_confirm_key(state, view_data, internal_tx, key);
            false
        }
        AppMode::SignIn => {
            handle_sign_in_key(state, runtime, view_data, internal_tx, key);
            false
        }
        AppMode::Detail => {
            if matches!(
                key.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')
            ) {
                view_data.detail = None;
                state.dispatch(AppCommand::ExitToNav);
            }
            false
        }
    }
}

fn handle_nav_key<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('f') | KeyCode::Tab => {
            switch_tab(state, runtime, view_data, tx, AppCommand::NextTab)
        }
        KeyCode::Char('b') | KeyCode::BackTab => {
            switch_tab(state, runtime, view_data, tx, AppCommand::PrevTab)
        }
        KeyCode::Char('j') | KeyCode::Down => move_row(view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_row(view_data, -1),
        KeyCode::Char('l') | KeyCode::Right => move_col(view_data, 1),
        KeyCode::Char('h') | KeyCode::Left => move_col(view_data, -1),
        KeyCode::Char(']') | KeyCode::PageDown => turn_page(view_data, 1),
        KeyCode::Char('[') | KeyCode::PageUp => turn_page(view_data, -1),
        KeyCode::Char('+') => resize_page(state, view_data, tx, true),
        KeyCode::Char('-') => resize_page(state, view_data, tx, false),
        KeyCode::Char('s') => cycle_sort(state, view_data, tx),
        KeyCode::Char('S') => {
            if let Some(view) = view_data.view.as_mut() {
                view.table.clear_sort();
                emit_status(state, &mut view_data.status_token, tx, "sort cleared");
            }
        }
        KeyCode::Char('/') => {
            if let Some(view) = &view_data.view {
                view_data.input = view.table.view().filter.clone();
                state.dispatch(AppCommand::EnterFilter);
            }
        }
        KeyCode::Char(' ') => {
            if let Some(id) = view_data.cursor_row_id()
                && let Some(view) = view_data.view.as_mut()
            {
                view.table.toggle_row_selected(id);
            }
        }
        KeyCode::Char('a') => {
            if let Some(view) = view_data.view.as_mut() {
                view.table.toggle_all_on_page(true);
            }
        }
        KeyCode::Char('A') => {
            if let Some(view) = view_data.view.as_mut() {
                view.table.toggle_all_on_page(false);
            }
        }
        KeyCode::Char('d') => request_delete(state, view_data, tx),
        KeyCode::Char('e') => match view_data.cursor_row_id() {
            Some(id) => open_editor(state, view_data, Some(id)),
            None => emit_status(
                state,
                &mut view_data.status_token,
                tx,
                ActionError::NothingSelected.to_string(),
            ),
        },
        KeyCode::Char('n') => open_editor(state, view_data, None),
        KeyCode::Enter => open_detail(state, view_data, tx),
        KeyCode::Char('r') => start_fetch(state, view_data, tx),
        KeyCode::Char('i') => {
            view_data.sign_in = SignInForm::default();
            state.dispatch(AppCommand::EnterSignIn);
        }
        KeyCode::Char('L') => sign_out(state, runtime, view_data, tx),
        KeyCode::Esc => {
            if let Some(view) = view_data.view.as_mut() {
                view.dispatcher.tracker_mut().dismiss_all();
            }
            state.dispatch(AppCommand::ClearStatus);
        }
        _ => {}
    }
    false
}

fn switch_tab<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::TabChanged(_)))
    {
        mount_active_tab(state, runtime, view_data, tx);
    }
}

fn move_row(view_data: &mut ViewData, delta: isize) {
    view_data.cursor_row = view_data.cursor_row.saturating_add_signed(delta);
    clamp_cursor(view_data);
}

fn move_col(view_data: &mut ViewData, delta: isize) {
    view_data.cursor_col = view_data.cursor_col.saturating_add_signed(delta);
    clamp_cursor(view_data);
}

fn turn_page(view_data: &mut ViewData, delta: isize) {
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let page = view.table.view().page_index.saturating_add_signed(delta);
    view.table.set_page(page);
    view_data.cursor_row = 0;
}

fn resize_page(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    grow: bool,
) {
    let size = if grow {
        view_data.page_size.saturating_add(PAGE_SIZE_STEP)
    } else {
        view_data.page_size.saturating_sub(PAGE_SIZE_STEP).max(1)
    };
    view_data.page_size = size;
    if let Some(view) = view_data.view.as_mut() {
        view.table.set_page_size(size);
    }
    clamp_cursor(view_data);
    emit_status(
        state,
        &mut view_data.status_token,
        tx,
        format!("page size {size}"),
    );
}

fn cycle_sort(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let Some(column) = view.table.columns().get(view_data.cursor_col) else {
        return;
    };
    let direction = view.table.cycle_sort(column.key);
    let message = match direction {
        SortDirection::Asc => format!("sort {} ascending", column.label),
        SortDirection::Desc => format!("sort {} descending", column.label),
        SortDirection::Unsorted => "sort cleared".to_owned(),
    };
    emit_status(state, &mut view_data.status_token, tx, message);
}

fn request_delete(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let cursor = view_data.cursor_row_id();
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let mut ids = view.table.selected_ids().iter().copied().collect::<Vec<_>>();
    if ids.is_empty() {
        ids.extend(cursor);
    }

    let mut notices = Vec::new();
    match view
        .dispatcher
        .request_delete(&view.table, &ids, |notice| notices.push(notice))
    {
        Ok(pending) => {
            view_data.pending_delete = pending.targets;
            state.dispatch(AppCommand::AskConfirm);
            hold_status(
                state,
                &mut view_data.status_token,
                pending.confirmation.prompt(),
            );
        }
        Err(_) => show_notices(state, &mut view_data.status_token, tx, notices),
    }
}

fn handle_confirm_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => confirm_delete(state, view_data, tx),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            view_data.pending_delete.clear();
            if let Some(view) = view_data.view.as_mut() {
                view.dispatcher.cancel_delete();
            }
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, &mut view_data.status_token, tx, "delete cancelled");
        }
        _ => {}
    }
}

fn confirm_delete(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    state.dispatch(AppCommand::ExitToNav);
    let targets = std::mem::take(&mut view_data.pending_delete);
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let mut notices = Vec::new();
    if view
        .dispatcher
        .begin_delete(|notice| notices.push(notice))
        .is_err()
    {
        show_notices(state, &mut view_data.status_token, tx, notices);
        return;
    }

    let collection = view.table.collection();
    let count = targets.len();
    let remote = view.dispatcher.remote().clone();
    let mount_id = view.id;
    let sender = tx.clone();
    thread::spawn(move || {
        let result = remote.delete_keys(&targets);
        let _ = sender.send(InternalEvent::Deleted {
            mount_id,
            collection,
            result,
        });
    });
    hold_status(
        state,
        &mut view_data.status_token,
        format!("deleting {count} from {}", collection.label()),
    );
}

fn open_editor(state: &mut AppState, view_data: &mut ViewData, target: Option<RowId>) {
    if view_data.view.is_none() {
        return;
    }
    view_data.edit_target = target;
    view_data.input.clear();
    state.dispatch(AppCommand::EnterEdit);
}

fn handle_edit_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.input.clear();
            view_data.edit_target = None;
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Enter => submit_edit(state, view_data, tx),
        KeyCode::Backspace => {
            view_data.input.pop();
        }
        KeyCode::Char(ch) => view_data.input.push(ch),
        _ => {}
    }
}

// A refused save keeps the editor open so the input can be corrected.
fn submit_edit(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let target = view_data.edit_target;
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let collection = view.table.collection();

    let patch = match RowPatch::parse(collection, &view_data.input) {
        Ok(patch) => patch,
        Err(error) => {
            emit_status(state, &mut view_data.status_token, tx, format!("{error:#}"));
            return;
        }
    };
    let mut notices = Vec::new();
    let job = match view
        .dispatcher
        .begin_save(&view.table, target, &patch, |notice| notices.push(notice))
    {
        Ok(job) => job,
        Err(_) => {
            show_notices(state, &mut view_data.status_token, tx, notices);
            return;
        }
    };

    let kind = job.kind;
    let remote = view.dispatcher.remote().clone();
    let mount_id = view.id;
    let sender = tx.clone();
    thread::spawn(move || {
        let result = job.run(&remote);
        let _ = sender.send(InternalEvent::Saved {
            mount_id,
            collection,
            kind,
            result,
        });
    });

    view_data.input.clear();
    view_data.edit_target = None;
    state.dispatch(AppCommand::ExitToNav);
    let message = match target {
        Some(id) => format!("updating row {id}"),
        None => format!("creating row in {}", collection.label()),
    };
    hold_status(state, &mut view_data.status_token, message);
}

fn open_detail(state: &mut AppState, view_data: &mut ViewData, tx: &Sender<InternalEvent>) {
    let request_id = view_data.next_id();
    let cursor = view_data.cursor_row_id();
    let Some(view) = view_data.view.as_mut() else {
        return;
    };
    let Some(row) = cursor.and_then(|id| view.table.row(id)) else {
        emit_status(
            state,
            &mut view_data.status_token,
            tx,
            ActionError::NothingSelected.to_string(),
        );
        return;
    };
    let remote = view.dispatcher.remote().clone();
    if !remote.has_token() {
        emit_status(
            state,
            &mut view_data.status_token,
            tx,
            ActionError::Deferred.to_string(),
        );
        return;
    }

    let id = row.id;
    let key = row.remote_key(remote.collection());
    let mount_id = view.id;
    view.detail_request = Some(request_id);
    let sender = tx.clone();
    thread::spawn(move || {
        let result = remote.get_row(&key);
        let _ = sender.send(InternalEvent::Viewed {
            mount_id,
            request_id,
            result,
        });
    });
    hold_status(
        state,
        &mut view_data.status_token,
        format!("loading row {id}"),
    );
}

fn handle_filter_key(state: &mut AppState, view_data: &mut ViewData, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
        KeyCode::Esc => {
            view_data.input.clear();
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Backspace => {
            view_data.input.pop();
        }
        KeyCode::Char(ch) => view_data.input.push(ch),
        _ => return,
    }
    if let Some(view) = view_data.view.as_mut() {
        view.table.set_filter(&view_data.input);
    }
    view_data.cursor_row = 0;
    clamp_cursor(view_data);
}

fn handle_sign_in_key<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc => {
            view_data.sign_in = SignInForm::default();
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Tab | KeyCode::BackTab => {
            view_data.sign_in.on_password = !view_data.sign_in.on_password;
        }
        KeyCode::Enter if !view_data.sign_in.on_password => {
            view_data.sign_in.on_password = true;
        }
        KeyCode::Enter => submit_sign_in(state, runtime, view_data, tx),
        KeyCode::Backspace => {
            view_data.sign_in.field_mut().pop();
        }
        KeyCode::Char(ch) => view_data.sign_in.field_mut().push(ch),
        _ => {}
    }
}

fn submit_sign_in<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    let identifier = view_data.sign_in.identifier.trim().to_owned();
    if identifier.is_empty() {
        view_data.sign_in.on_password = false;
        emit_status(
            state,
            &mut view_data.status_token,
            tx,
            "identifier is required -- enter a username or email",
        );
        return;
    }
    let password = std::mem::take(&mut view_data.sign_in.password);
    match runtime.sign_in(&identifier, &password) {
        Ok(user) => {
            view_data.sign_in = SignInForm::default();
            state.dispatch(AppCommand::ExitToNav);
            info!(user = %user, "signed in");
            mount_active_tab(state, runtime, view_data, tx);
            emit_status(
                state,
                &mut view_data.status_token,
                tx,
                format!("signed in as {user}"),
            );
        }
        Err(error) => {
            warn!(identifier = %identifier, "sign in failed: {error:#}");
            emit_status(
                state,
                &mut view_data.status_token,
                tx,
                format!("sign in failed: {error:#}"),
            );
        }
    }
}

fn sign_out<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
) {
    if let Err(error) = runtime.sign_out() {
        emit_status(
            state,
            &mut view_data.status_token,
            tx,
            format!("sign out failed: {error:#}"),
        );
        return;
    }
    info!("signed out");
    // Remount so rows fetched with the old token leave the screen.
    mount_active_tab(state, runtime, view_data, tx);
    emit_status(state, &mut view_data.status_token, tx, "signed out");
}

fn clamp_cursor(view_data: &mut ViewData) {
    let (rows, columns) = view_data.view.as_ref().map_or((0, 0), |view| {
        (view.table.page_rows().len(), view.table.columns().len())
    });
    view_data.cursor_row = view_data.cursor_row.min(rows.saturating_sub(1));
    view_data.cursor_col = view_data.cursor_col.min(columns.saturating_sub(1));
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(2),
        ])
        .split(frame.area());

    let selected = Collection::ALL
        .iter()
        .position(|tab| *tab == state.active_tab)
        .unwrap_or(0);
    let tab_titles = Collection::ALL
        .iter()
        .map(|tab| tab.label().to_owned())
        .collect::<Vec<String>>();
    let tabs = Tabs::new(tab_titles)
        .block(Block::default().title("fleetdesk").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    render_table(frame, layout[1], state, view_data);

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::TOP));
    frame.render_widget(status_widget, layout[2]);

    match state.mode {
        AppMode::Confirm => {
            let area = centered_rect(50, 20, frame.area());
            frame.render_widget(Clear, area);
            let prompt = state.status_line.clone().unwrap_or_default();
            let overlay = Paragraph::new(format!("{prompt}\n\ny delete | n cancel"))
                .wrap(Wrap { trim: true })
                .block(Block::default().title("confirm").borders(Borders::ALL));
            frame.render_widget(overlay, area);
        }
        AppMode::Edit => {
            let area = centered_rect(70, 30, frame.area());
            frame.render_widget(Clear, area);
            let title = match view_data.edit_target {
                Some(id) => format!("edit row {id}"),
                None => "new row".to_owned(),
            };
            let overlay = Paragraph::new(edit_overlay_text(state, view_data))
                .wrap(Wrap { trim: false })
                .block(Block::default().title(title).borders(Borders::ALL));
            frame.render_widget(overlay, area);
        }
        AppMode::SignIn => {
            let area = centered_rect(50, 30, frame.area());
            frame.render_widget(Clear, area);
            let overlay = Paragraph::new(sign_in_overlay_text(state, &view_data.sign_in))
                .block(Block::default().title("sign in").borders(Borders::ALL));
            frame.render_widget(overlay, area);
        }
        AppMode::Detail => {
            if let Some(row) = &view_data.detail {
                let area = centered_rect(70, 70, frame.area());
                frame.render_widget(Clear, area);
                let overlay = Paragraph::new(detail_overlay_text(state.active_tab, row))
                    .wrap(Wrap { trim: false })
                    .block(
                        Block::default()
                            .title(format!("row {}", row.id))
                            .borders(Borders::ALL),
                    );
                frame.render_widget(overlay, area);
            }
        }
        AppMode::Nav | AppMode::Filter => {}
    }
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let Some(view) = &view_data.view else {
        let empty = Paragraph::new(String::new()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(state.active_tab.label()),
        );
        frame.render_widget(empty, area);
        return;
    };

    let columns = view.table.columns();
    let mut widths = vec![Constraint::Length(1)];
    widths.extend(columns.iter().map(|_| Constraint::Min(8)));

    let header_cells = std::iter::once(String::new())
        .chain(
            columns
                .iter()
                .map(|column| header_label(&view.table, column.key, column.label)),
        )
        .map(|label| {
            Cell::from(label).style(
                Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
            )
        });
    let header = Row::new(header_cells);

    let selected_ids = view.table.selected_ids();
    let rows = view
        .table
        .page_rows()
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            let cursor_row = row_index == view_data.cursor_row;
            let mark = if selected_ids.contains(&row.id) {
                SELECTED_MARK
            } else {
                ""
            };
            let mut cells = vec![Cell::from(mark).style(Style::default().fg(Color::Cyan))];
            cells.extend(columns.iter().enumerate().map(|(column_index, column)| {
                let mut style = Style::default();
                if cursor_row {
                    style = style.bg(Color::DarkGray);
                }
                if cursor_row && column_index == view_data.cursor_col {
                    style = Style::default()
                        .fg(Color::Black)
                        .bg(Color::Cyan)
                        .add_modifier(Modifier::BOLD);
                }
                Cell::from(row.display(column.key)).style(style)
            }));
            Row::new(cells)
        })
        .collect::<Vec<_>>();

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(
            Block::default()
                .title(table_title(view))
                .borders(Borders::ALL),
        );
    frame.render_widget(table, area);
}

fn header_label(table: &TableController, key: &str, label: &str) -> String {
    match &table.view().sort {
        Some(sort) if sort.column == key => match sort.direction {
            SortDirection::Asc => format!("{label} {SORT_ASC_MARK}"),
            SortDirection::Desc => format!("{label} {SORT_DESC_MARK}"),
            SortDirection::Unsorted => label.to_owned(),
        },
        _ => label.to_owned(),
    }
}

fn table_title(view: &MountedView) -> String {
    let table = &view.table;
    let state = table.view();
    let mut title = format!(
        "{} r:{}/{} p:{}/{}",
        table.collection().label(),
        table.filtered_count(),
        table.total_count(),
        state.page_index + 1,
        table.page_count().max(1),
    );
    if !state.filter.is_empty() {
        title.push_str(&format!(" filter:{}", state.filter));
    }
    let selected = table.selected_ids().len();
    if selected > 0 {
        title.push_str(&format!(" sel:{selected}"));
    }
    for kind in ActionKind::ALL {
        if view.dispatcher.tracker().is_busy(kind) {
            title.push_str(&format!(" [{}...]", kind.as_str()));
        }
    }
    title
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let hints = match state.mode {
        AppMode::Nav => {
            "j/k/h/l move | [ ] page | +/- size | s/S sort | / filter | space/a/A select | enter view | d del | e edit | n new | r reload | b/f tab | i sign in | L sign out | q quit"
        }
        AppMode::Filter => "type to filter | enter keep | esc clear",
        AppMode::Edit => "field=value; field=value | enter save | esc cancel",
        AppMode::Confirm => "y delete | n cancel",
        AppMode::SignIn => "tab switch field | enter next/sign in | esc cancel",
        AppMode::Detail => "esc close",
    };
    let mut parts = vec![state.mode.label().to_owned()];
    if state.mode == AppMode::Filter {
        parts.push(format!("/{}", view_data.input));
    }
    if let Some(status) = &state.status_line {
        parts.push(status.clone());
    }
    parts.push(hints.to_owned());
    parts.join(" | ")
}

fn edit_overlay_text(state: &AppState, view_data: &ViewData) -> String {
    let fields = state
        .active_tab
        .columns()
        .iter()
        .map(|column| column.key)
        .collect::<Vec<_>>()
        .join(" ");
    let mut lines = vec![format!("> {}_", view_data.input), String::new()];
    if let Some(status) = &state.status_line {
        lines.push(status.clone());
        lines.push(String::new());
    }
    lines.push(format!("fields: {fields}"));
    lines.join("\n")
}

fn sign_in_overlay_text(state: &AppState, form: &SignInForm) -> String {
    let (identifier_cursor, password_cursor) = if form.on_password {
        ("", "_")
    } else {
        ("_", "")
    };
    let mut lines = vec![
        format!("identifier: {}{identifier_cursor}", form.identifier),
        format!(
            "password:   {}{password_cursor}",
            "*".repeat(form.password.chars().count())
        ),
    ];
    if let Some(status) = &state.status_line {
        lines.push(String::new());
        lines.push(status.clone());
    }
    lines.join("\n")
}

fn detail_overlay_text(collection: Collection, row: &RowRecord) -> String {
    let mut lines = collection
        .columns()
        .iter()
        .map(|column| format!("{}: {}", column.label, row.display(column.key)))
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("record".to_owned());
    for (field, value) in &row.source {
        let value = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        lines.push(format!("  {field} = {value}"));
    }
    lines.join("\n")
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
