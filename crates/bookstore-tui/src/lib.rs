// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use bookstore_app::dates::{self, DATE_SEPARATOR_NOTICE};
use bookstore_app::find::{self, FindOutcome};
use bookstore_app::{
    ChoiceSource, CrudOption, DeleteOutcome, Entity, FieldKey, FieldKind, FindQuery, FormMode,
    GridColumn, GridRow, ListingField, ListingOrder, ListingRequest, MenuItem, Numeral, Pane,
    Record, RecordForm, RowChange, SaveOptions, SaveOutcome, Screen, Selector, SelectorKey,
    SelectorMode, SelectorOutcome, Session, SessionCommand, SessionEvent, split_enumeration,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::Date;
use tracing::warn;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOCK_NOTICE: &str = "Database is locked, please wait.";
const RECORD_NOT_FOUND: &str = "Record not found";
// Header, prompt, borders and the grid header row.
const GRID_CHROME_ROWS: u16 = 11;

/// Whether `begin_write` got the database write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteLock {
    Granted,
    /// Another session holds it; the request is retried on the next tick.
    Busy,
}

/// What the screens need from storage. At most one write session is open at a time:
/// `begin_write` opens it, `end_write` closes it.
pub trait AppRuntime {
    fn load_full_set(&mut self, entity: Entity) -> Result<Vec<GridRow>>;
    fn find_rows(&mut self, query: &FindQuery) -> Result<Vec<GridRow>>;
    fn read_record(&mut self, entity: Entity, numeral: Numeral) -> Result<Option<Record>>;
    fn choices(&mut self, source: ChoiceSource) -> Result<Vec<String>>;
    /// Why the record cannot be deleted, if something still references it.
    fn delete_blocker(&mut self, entity: Entity, numeral: Numeral) -> Result<Option<String>>;
    fn begin_write(&mut self) -> Result<WriteLock>;
    fn next_numeral(&mut self, entity: Entity) -> Result<Numeral>;
    fn save_record(
        &mut self,
        mode: FormMode,
        record: &Record,
        original_numeral: Option<Numeral>,
        options: SaveOptions,
    ) -> Result<SaveOutcome>;
    fn delete_record(&mut self, entity: Entity, numeral: Numeral) -> Result<DeleteOutcome>;
    fn end_write(&mut self, commit: bool) -> Result<()>;
    /// Runs the integrity pass inside the open write session and returns the report lines.
    fn check_integrity(&mut self) -> Result<Vec<String>>;
    fn write_listing(&mut self, request: &ListingRequest, order: ListingOrder) -> Result<PathBuf>;
    fn today(&mut self) -> Date {
        dates::today()
    }
    fn currency_symbol(&self) -> &str {
        "€"
    }
}

pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    form: RecordForm,
    error: Option<String>,
    /// Answers to "create it as a new one?" given while this form is open.
    options: SaveOptions,
    holds_lock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ChooserUiState {
    key: FieldKey,
    multi: bool,
    entries: Vec<String>,
    cursor: usize,
    picked: BTreeSet<usize>,
}

impl ChooserUiState {
    fn value(&self) -> String {
        if self.multi && !self.picked.is_empty() {
            return self
                .picked
                .iter()
                .filter_map(|index| self.entries.get(*index))
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
        }
        self.entries.get(self.cursor).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogAction {
    DiscardForm,
    ConfirmDelete,
    CreateAuthor,
    CreatePublisher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DialogUiState {
    prompt: &'static str,
    action: DialogAction,
    ok_focused: bool,
}

impl DialogUiState {
    fn new(prompt: &'static str, action: DialogAction) -> Self {
        Self {
            prompt,
            action,
            ok_focused: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct ListingUiState {
    request: ListingRequest,
    field_index: usize,
    last_report: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormRequest {
    entity: Entity,
    mode: FormMode,
    numeral: Option<Numeral>,
}

/// Work waiting for the database write lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingWrite {
    Form(FormRequest),
    Integrity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewData {
    selector: Option<Selector>,
    form: Option<FormUiState>,
    chooser: Option<ChooserUiState>,
    dialog: Option<DialogUiState>,
    listing: ListingUiState,
    integrity_report: Option<Vec<String>>,
    pending_write: Option<PendingWrite>,
    today: Date,
    currency_symbol: String,
    page_rows: usize,
    status_token: u64,
}

impl Default for ViewData {
    fn default() -> Self {
        Self {
            selector: None,
            form: None,
            chooser: None,
            dialog: None,
            listing: ListingUiState::default(),
            integrity_report: None,
            pending_write: None,
            today: dates::today(),
            currency_symbol: "€".to_owned(),
            page_rows: 10,
            status_token: 0,
        }
    }
}

pub fn run_app<R: AppRuntime>(session: &mut Session, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData {
        currency_symbol: runtime.currency_symbol().to_owned(),
        ..ViewData::default()
    };
    let (internal_tx, internal_rx) = mpsc::channel();

    let mut result = Ok(());
    loop {
        process_internal_events(session, &mut view_data, &internal_rx);
        retry_pending_write(session, runtime, &mut view_data, &internal_tx);
        view_data.today = runtime.today();

        match terminal.size() {
            Ok(size) => {
                view_data.page_rows =
                    usize::from(size.height.saturating_sub(GRID_CHROME_ROWS)).max(1);
            }
            Err(error) => {
                result = Err(error).context("read terminal size");
                break;
            }
        }

        if let Err(error) = terminal.draw(|frame| render(frame, session, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let event = match next_event(Duration::from_millis(120)) {
            Ok(event) => event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if let Some(Event::Key(key)) = event
            && handle_key_event(session, runtime, &mut view_data, &internal_tx, key)
        {
            break;
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn next_event(timeout: Duration) -> Result<Option<Event>> {
    if !event::poll(timeout).context("poll event")? {
        return Ok(None);
    }
    event::read().context("read event").map(Some)
}

fn process_internal_events(
    session: &mut Session,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                session.dispatch(SessionCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(4));
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    session: &mut Session,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    session.dispatch(SessionCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        if view_data.form.take().is_some_and(|ui| ui.holds_lock)
            && let Err(error) = runtime.end_write(false)
        {
            warn!("rollback on quit failed: {error:#}");
        }
        return true;
    }

    // The lock wait cannot be cancelled; keys are dropped until it is granted.
    if view_data.pending_write.is_some() {
        return false;
    }

    if view_data.dialog.is_some() {
        handle_dialog_key(session, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.chooser.is_some() {
        handle_chooser_key(view_data, key);
        return false;
    }

    if view_data.form.is_some() {
        handle_form_key(session, runtime, view_data, internal_tx, key);
        return false;
    }

    match session.screen {
        Screen::Menu => handle_menu_key(session, runtime, view_data, internal_tx, key),
        Screen::Selector(entity) => {
            handle_selector_key(session, runtime, view_data, internal_tx, entity, key)
        }
        Screen::Listing => handle_listing_key(session, runtime, view_data, internal_tx, key),
        Screen::Integrity => handle_integrity_key(session, runtime, view_data, internal_tx, key),
    }
}

fn dispatch_and_apply<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: SessionCommand,
) -> bool {
    let events = session.dispatch(command);
    apply_session_events(session, runtime, view_data, internal_tx, events)
}

/// Carries out what the session asked for. Returns true when the program should quit.
fn apply_session_events<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    events: Vec<SessionEvent>,
) -> bool {
    for event in events {
        match event {
            SessionEvent::ScreenChanged(Screen::Selector(entity)) => {
                view_data.selector = Some(Selector::new(entity));
            }
            SessionEvent::ScreenChanged(Screen::Listing) => {
                view_data.listing = ListingUiState::default();
            }
            SessionEvent::ScreenChanged(Screen::Integrity) => {
                view_data.integrity_report = None;
                request_write(session, runtime, view_data, internal_tx, PendingWrite::Integrity);
            }
            SessionEvent::ScreenChanged(Screen::Menu) => {
                view_data.selector = None;
                view_data.integrity_report = None;
            }
            SessionEvent::FullSetRequested(entity) => {
                reload_full_set(session, runtime, view_data, internal_tx, entity);
            }
            SessionEvent::QuitRequested => return true,
            SessionEvent::MenuMoved(_)
            | SessionEvent::RowsChanged(_)
            | SessionEvent::StatusUpdated(_)
            | SessionEvent::StatusCleared => {}
        }
    }
    false
}

fn reload_full_set<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    entity: Entity,
) {
    match runtime.load_full_set(entity) {
        Ok(rows) => session.load_full_set(entity, rows),
        Err(error) => emit_status(
            session,
            view_data,
            internal_tx,
            format!("load failed: {error:#}"),
        ),
    }
}

fn handle_menu_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let command = match key.code {
        KeyCode::Up | KeyCode::BackTab => SessionCommand::MenuPrev,
        KeyCode::Down | KeyCode::Tab => SessionCommand::MenuNext,
        KeyCode::Enter => SessionCommand::MenuSelect,
        _ => return false,
    };
    dispatch_and_apply(session, runtime, view_data, internal_tx, command)
}

fn selector_key(key: KeyEvent) -> Option<SelectorKey> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return None;
    }
    let mapped = match key.code {
        KeyCode::Up => SelectorKey::Up,
        KeyCode::Down => SelectorKey::Down,
        KeyCode::PageUp => SelectorKey::PageUp,
        KeyCode::PageDown => SelectorKey::PageDown,
        KeyCode::Home => SelectorKey::Home,
        KeyCode::End => SelectorKey::End,
        KeyCode::Left => SelectorKey::Left,
        KeyCode::Right => SelectorKey::Right,
        KeyCode::Tab => SelectorKey::Tab,
        KeyCode::Enter => SelectorKey::Enter,
        KeyCode::Esc => SelectorKey::Esc,
        KeyCode::Backspace => SelectorKey::Backspace,
        KeyCode::Char(ch) => SelectorKey::Char(ch),
        _ => return None,
    };
    Some(mapped)
}

fn handle_selector_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    entity: Entity,
    key: KeyEvent,
) -> bool {
    let Some(selector_key) = selector_key(key) else {
        return false;
    };
    let page_rows = view_data.page_rows;
    let selector = view_data
        .selector
        .get_or_insert_with(|| Selector::new(entity));
    selector.set_page_size(page_rows);
    let outcome = selector.press(selector_key, session.working_set_mut(entity));

    match outcome {
        SelectorOutcome::None | SelectorOutcome::Rejected => false,
        SelectorOutcome::Find(literal) => {
            run_find(session, runtime, view_data, internal_tx, entity, &literal);
            false
        }
        SelectorOutcome::ResetFullSet => {
            reload_full_set(session, runtime, view_data, internal_tx, entity);
            false
        }
        SelectorOutcome::Open { option, numeral } => {
            open_record(
                session,
                runtime,
                view_data,
                internal_tx,
                entity,
                option,
                numeral,
            );
            false
        }
        SelectorOutcome::Exit => dispatch_and_apply(
            session,
            runtime,
            view_data,
            internal_tx,
            SessionCommand::BackToMenu,
        ),
    }
}

fn run_find<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    entity: Entity,
    literal: &str,
) {
    let query = match find::resolve(literal, entity, session.date_format) {
        Ok(FindOutcome::Reset) => {
            reload_full_set(session, runtime, view_data, internal_tx, entity);
            return;
        }
        Ok(FindOutcome::Query(query)) => query,
        Err(error) => {
            emit_status(session, view_data, internal_tx, error.to_string());
            return;
        }
    };

    if query.separator_warning {
        emit_status(session, view_data, internal_tx, DATE_SEPARATOR_NOTICE);
    }
    match runtime.find_rows(&query) {
        Ok(rows) => session.load_subset(entity, rows),
        Err(error) => emit_status(
            session,
            view_data,
            internal_tx,
            format!("find failed: {error:#}"),
        ),
    }
}

fn open_record<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    entity: Entity,
    option: CrudOption,
    numeral: Option<Numeral>,
) {
    let Some(mode) = FormMode::from_option(option) else {
        return;
    };
    if let Some(numeral) = numeral {
        session.working_set_mut(entity).select_numeral(numeral);
    }

    // Delete pre-checks run before the lock and the confirmation prompt.
    if mode == FormMode::Delete
        && let Some(numeral) = numeral
    {
        let blocker = match runtime.delete_blocker(entity, numeral) {
            Ok(blocker) => blocker,
            Err(error) => Some(format!("delete check failed: {error:#}")),
        };
        if let Some(message) = blocker {
            emit_status(session, view_data, internal_tx, message);
            selector_form_closed(view_data);
            return;
        }
    }

    let request = FormRequest {
        entity,
        mode,
        numeral,
    };
    if mode.writes() {
        let pending = PendingWrite::Form(request);
        request_write(session, runtime, view_data, internal_tx, pending);
    } else {
        open_form(session, runtime, view_data, internal_tx, request, false);
    }
}

fn request_write<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    pending: PendingWrite,
) {
    view_data.pending_write = Some(pending);
    retry_pending_write(session, runtime, view_data, internal_tx);
}

/// One attempt at the write lock for the pending request. A busy database leaves the
/// request in place with a notice; the event loop calls back on every tick.
fn retry_pending_write<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(pending) = view_data.pending_write else {
        return;
    };

    match runtime.begin_write() {
        Ok(WriteLock::Busy) => {
            if session.status_line.as_deref() != Some(LOCK_NOTICE) {
                session.dispatch(SessionCommand::SetStatus(LOCK_NOTICE.to_owned()));
            }
        }
        Ok(WriteLock::Granted) => {
            view_data.pending_write = None;
            if session.status_line.as_deref() == Some(LOCK_NOTICE) {
                session.dispatch(SessionCommand::ClearStatus);
            }
            match pending {
                PendingWrite::Form(request) => {
                    open_form(session, runtime, view_data, internal_tx, request, true);
                }
                PendingWrite::Integrity => {
                    run_integrity_check(session, runtime, view_data, internal_tx);
                }
            }
        }
        Err(error) => {
            view_data.pending_write = None;
            emit_status(session, view_data, internal_tx, format!("{error:#}"));
            match pending {
                PendingWrite::Form(_) => selector_form_closed(view_data),
                PendingWrite::Integrity => {
                    dispatch_and_apply(
                        session,
                        runtime,
                        view_data,
                        internal_tx,
                        SessionCommand::BackToMenu,
                    );
                }
            }
        }
    }
}

fn open_form<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    request: FormRequest,
    holds_lock: bool,
) {
    let FormRequest {
        entity,
        mode,
        numeral,
    } = request;
    let date_format = session.date_format;
    let form = match (mode, numeral) {
        (FormMode::Create, _) => runtime
            .next_numeral(entity)
            .map(|next| Some(RecordForm::create(entity, next, view_data.today, date_format))),
        (_, Some(numeral)) => runtime
            .read_record(entity, numeral)
            .map(|record| record.map(|record| RecordForm::open(mode, &record, date_format))),
        (_, None) => Ok(None),
    };

    let failure = match form {
        Ok(Some(form)) => {
            view_data.form = Some(FormUiState {
                form,
                error: None,
                options: SaveOptions::default(),
                holds_lock,
            });
            if mode == FormMode::Delete {
                view_data.dialog = Some(DialogUiState::new(
                    "Select OK to confirm deletion",
                    DialogAction::ConfirmDelete,
                ));
            }
            return;
        }
        Ok(None) => RECORD_NOT_FOUND.to_owned(),
        Err(error) => format!("open failed: {error:#}"),
    };

    if holds_lock {
        end_write(session, runtime, view_data, internal_tx, false);
    }
    emit_status(session, view_data, internal_tx, failure);
    selector_form_closed(view_data);
}

fn end_write<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    commit: bool,
) {
    if let Err(error) = runtime.end_write(commit) {
        emit_status(
            session,
            view_data,
            internal_tx,
            format!("release lock failed: {error:#}"),
        );
    }
}

fn selector_form_closed(view_data: &mut ViewData) {
    if let Some(selector) = view_data.selector.as_mut() {
        selector.form_closed();
    }
}

/// Leaves the open form: releases its lock, hands the row change to the session and
/// reloads whatever the session asks for.
fn close_form<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    change: RowChange,
    commit: bool,
) {
    let Some(ui) = view_data.form.take() else {
        return;
    };
    view_data.chooser = None;
    view_data.dialog = None;
    if ui.holds_lock {
        end_write(session, runtime, view_data, internal_tx, commit);
    }
    selector_form_closed(view_data);

    let events = session.dispatch(SessionCommand::FormClosed {
        entity: ui.form.entity(),
        mode: ui.form.mode(),
        change,
    });
    apply_session_events(session, runtime, view_data, internal_tx, events);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormKeyAction {
    None,
    Submit,
    Leave,
    OpenChooser,
    ConfirmDelete,
}

fn handle_form_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(ui) = view_data.form.as_mut() else {
        return;
    };
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    let mode = ui.form.mode();

    let action = match key.code {
        KeyCode::Char('s') if control => FormKeyAction::Submit,
        KeyCode::Esc => FormKeyAction::Leave,
        KeyCode::Tab | KeyCode::Down => {
            ui.form.focus_next();
            FormKeyAction::None
        }
        KeyCode::BackTab | KeyCode::Up => {
            ui.form.focus_prev();
            FormKeyAction::None
        }
        KeyCode::F(2) => FormKeyAction::OpenChooser,
        KeyCode::Enter => match mode {
            FormMode::Read => FormKeyAction::Leave,
            FormMode::Delete => FormKeyAction::ConfirmDelete,
            FormMode::Create | FormMode::Update => {
                let on_last = ui.form.focus_index() + 1 == ui.form.fields().len();
                if matches!(
                    ui.form.focused().spec.kind,
                    FieldKind::Choice(_) | FieldKind::MultiChoice(_)
                ) {
                    FormKeyAction::OpenChooser
                } else if on_last {
                    FormKeyAction::Submit
                } else {
                    ui.form.focus_next();
                    FormKeyAction::None
                }
            }
        },
        KeyCode::Backspace => {
            if ui.form.backspace() {
                ui.error = None;
            }
            FormKeyAction::None
        }
        KeyCode::Char(ch) if !control => {
            if ui.form.insert_char(ch) {
                ui.error = None;
            }
            FormKeyAction::None
        }
        _ => FormKeyAction::None,
    };

    match action {
        FormKeyAction::None => {}
        FormKeyAction::Submit => submit_form(session, runtime, view_data, internal_tx),
        FormKeyAction::Leave => leave_form(session, runtime, view_data, internal_tx),
        FormKeyAction::OpenChooser => open_chooser(session, runtime, view_data, internal_tx),
        FormKeyAction::ConfirmDelete => {
            view_data.dialog = Some(DialogUiState::new(
                "Select OK to confirm deletion",
                DialogAction::ConfirmDelete,
            ));
        }
    }
}

fn leave_form<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(ui) = view_data.form.as_ref() else {
        return;
    };
    if ui.form.mode() == FormMode::Delete {
        close_form(session, runtime, view_data, internal_tx, RowChange::Unchanged, false);
        emit_status(session, view_data, internal_tx, "Record was NOT deleted");
        return;
    }
    match ui.form.discard_prompt() {
        Some(prompt) => {
            view_data.dialog = Some(DialogUiState::new(prompt, DialogAction::DiscardForm));
        }
        None => close_form(session, runtime, view_data, internal_tx, RowChange::Unchanged, false),
    }
}

fn submit_form<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(ui) = view_data.form.as_mut() else {
        return;
    };
    if !ui.form.is_editable() {
        return;
    }

    ui.form.strip_fields();
    let entity = ui.form.entity();
    if let Err(error) = ui.form.check_field_values(session.working_set(entity)) {
        ui.form.focus_key(error.key);
        ui.error = Some(error.message.clone());
        emit_status(session, view_data, internal_tx, error.message);
        return;
    }

    let mode = ui.form.mode();
    let record = ui.form.to_record();
    let original = if mode == FormMode::Update {
        ui.form.original_numeral()
    } else {
        None
    };
    let options = ui.options;

    match runtime.save_record(mode, &record, original, options) {
        Ok(SaveOutcome::Saved { row, notices }) => {
            let (change, done) = if mode == FormMode::Create {
                (RowChange::Created(row), "Record created")
            } else {
                (RowChange::Updated(row), "Record saved")
            };
            let message = if notices.is_empty() {
                done.to_owned()
            } else {
                format!("{done}. {}", notices.join(" "))
            };
            close_form(session, runtime, view_data, internal_tx, change, true);
            emit_status(session, view_data, internal_tx, message);
        }
        Ok(SaveOutcome::MissingAuthor(_)) => {
            view_data.dialog = Some(DialogUiState::new(
                "Author was not found. Create it as a new one?",
                DialogAction::CreateAuthor,
            ));
        }
        Ok(SaveOutcome::MissingPublisher(_)) => {
            view_data.dialog = Some(DialogUiState::new(
                "Publisher was not found. Create it as a new one?",
                DialogAction::CreatePublisher,
            ));
        }
        Ok(SaveOutcome::Rejected(message) | SaveOutcome::Conflict(message)) => {
            if let Some(ui) = view_data.form.as_mut() {
                ui.error = Some(message.clone());
            }
            emit_status(session, view_data, internal_tx, message);
        }
        Err(error) => emit_status(
            session,
            view_data,
            internal_tx,
            format!("save failed: {error:#}"),
        ),
    }
}

fn delete_open_record<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(ui) = view_data.form.as_ref() else {
        return;
    };
    let entity = ui.form.entity();
    let Some(numeral) = ui.form.original_numeral() else {
        close_form(session, runtime, view_data, internal_tx, RowChange::Unchanged, false);
        emit_status(session, view_data, internal_tx, RECORD_NOT_FOUND);
        return;
    };

    let (change, commit, message) = match runtime.delete_record(entity, numeral) {
        Ok(DeleteOutcome::Deleted(id)) => (RowChange::Deleted(id), true, "Record deleted".to_owned()),
        Ok(DeleteOutcome::Blocked(reason)) => (RowChange::Unchanged, false, reason.to_owned()),
        Err(error) => (
            RowChange::Unchanged,
            false,
            format!("delete failed: {error:#}"),
        ),
    };
    close_form(session, runtime, view_data, internal_tx, change, commit);
    emit_status(session, view_data, internal_tx, message);
}

fn handle_dialog_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(dialog) = view_data.dialog.as_mut() else {
        return;
    };
    let accepted = match key.code {
        KeyCode::Left | KeyCode::Right | KeyCode::Tab | KeyCode::BackTab => {
            dialog.ok_focused = !dialog.ok_focused;
            return;
        }
        KeyCode::Enter => dialog.ok_focused,
        KeyCode::Esc => false,
        _ => return,
    };
    let action = dialog.action;
    view_data.dialog = None;

    match (action, accepted) {
        (DialogAction::DiscardForm, true) => {
            close_form(session, runtime, view_data, internal_tx, RowChange::Unchanged, false);
        }
        (DialogAction::ConfirmDelete, true) => {
            delete_open_record(session, runtime, view_data, internal_tx);
        }
        (DialogAction::ConfirmDelete, false) => {
            close_form(session, runtime, view_data, internal_tx, RowChange::Unchanged, false);
            emit_status(session, view_data, internal_tx, "Record was NOT deleted");
        }
        (DialogAction::CreateAuthor, true) => {
            if let Some(ui) = view_data.form.as_mut() {
                ui.options.create_missing_author = true;
            }
            submit_form(session, runtime, view_data, internal_tx);
        }
        (DialogAction::CreatePublisher, true) => {
            if let Some(ui) = view_data.form.as_mut() {
                ui.options.create_missing_publisher = true;
            }
            submit_form(session, runtime, view_data, internal_tx);
        }
        // The form stays open with the user's edits.
        (
            DialogAction::DiscardForm | DialogAction::CreateAuthor | DialogAction::CreatePublisher,
            false,
        ) => {}
    }
}

fn open_chooser<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(ui) = view_data.form.as_ref() else {
        return;
    };
    if !ui.form.is_editable() {
        return;
    }
    let field = ui.form.focused();
    let (source, multi) = match field.spec.kind {
        FieldKind::Choice(source) => (source, false),
        FieldKind::MultiChoice(source) => (source, true),
        _ => return,
    };
    let key = field.spec.key;
    let current = field.value.clone();

    let entries = match source.fixed_values() {
        Some(values) => Ok(values.iter().map(|value| (*value).to_owned()).collect()),
        None => runtime.choices(source),
    };
    let entries: Vec<String> = match entries {
        Ok(entries) => entries,
        Err(error) => {
            emit_status(
                session,
                view_data,
                internal_tx,
                format!("choices failed: {error:#}"),
            );
            return;
        }
    };
    if entries.is_empty() {
        emit_status(session, view_data, internal_tx, "Nothing to choose from");
        return;
    }

    let selected = split_enumeration(&current);
    let picked = if multi {
        entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| selected.contains(entry))
            .map(|(index, _)| index)
            .collect()
    } else {
        BTreeSet::new()
    };
    let cursor = entries
        .iter()
        .position(|entry| entry.eq_ignore_ascii_case(current.trim()))
        .unwrap_or(0);
    view_data.chooser = Some(ChooserUiState {
        key,
        multi,
        entries,
        cursor,
        picked,
    });
}

fn handle_chooser_key(view_data: &mut ViewData, key: KeyEvent) {
    let Some(chooser) = view_data.chooser.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Up => chooser.cursor = chooser.cursor.saturating_sub(1),
        KeyCode::Down => {
            chooser.cursor = (chooser.cursor + 1).min(chooser.entries.len().saturating_sub(1));
        }
        KeyCode::Home => chooser.cursor = 0,
        KeyCode::End => chooser.cursor = chooser.entries.len().saturating_sub(1),
        KeyCode::Char(' ') if chooser.multi => {
            if !chooser.picked.remove(&chooser.cursor) {
                chooser.picked.insert(chooser.cursor);
            }
        }
        KeyCode::Enter => {
            let value = chooser.value();
            let field = chooser.key;
            view_data.chooser = None;
            if let Some(ui) = view_data.form.as_mut()
                && ui.form.set_value(field, value)
            {
                ui.error = None;
            }
        }
        KeyCode::Esc => view_data.chooser = None,
        _ => {}
    }
}

fn handle_listing_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let count = ListingField::ALL.len();
    let listing = &mut view_data.listing;
    let field = ListingField::ALL[listing.field_index.min(count - 1)];

    match key.code {
        KeyCode::Esc => {
            return dispatch_and_apply(
                session,
                runtime,
                view_data,
                internal_tx,
                SessionCommand::BackToMenu,
            );
        }
        KeyCode::Tab | KeyCode::Down => listing.field_index = (listing.field_index + 1) % count,
        KeyCode::BackTab | KeyCode::Up => {
            listing.field_index = (listing.field_index + count - 1) % count;
        }
        KeyCode::Left if field == ListingField::Order => cycle_listing_order(listing, -1),
        KeyCode::Right if field == ListingField::Order => cycle_listing_order(listing, 1),
        KeyCode::Enter => submit_listing(session, runtime, view_data, internal_tx),
        KeyCode::Backspace => {
            listing.request.value_mut(field).pop();
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            listing.request.value_mut(field).push(ch);
        }
        _ => {}
    }
    false
}

fn cycle_listing_order(listing: &mut ListingUiState, delta: isize) {
    let current = ListingOrder::from_label(&listing.request.order).unwrap_or(ListingOrder::Title);
    let len = ListingOrder::ALL.len() as isize;
    let index = ListingOrder::ALL
        .iter()
        .position(|order| *order == current)
        .unwrap_or(0) as isize;
    let next = ListingOrder::ALL[(index + delta).rem_euclid(len) as usize];
    listing.request.order = next.label().to_owned();
}

fn submit_listing<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let order = match view_data.listing.request.validate() {
        Ok(order) => order,
        Err((field, message)) => {
            view_data.listing.field_index = ListingField::ALL
                .iter()
                .position(|candidate| *candidate == field)
                .unwrap_or(0);
            emit_status(session, view_data, internal_tx, message);
            return;
        }
    };

    match runtime.write_listing(&view_data.listing.request, order) {
        Ok(path) => {
            let message = format!("Book listing written to {}", path.display());
            view_data.listing.last_report = Some(path);
            emit_status(session, view_data, internal_tx, message);
        }
        Err(error) => emit_status(
            session,
            view_data,
            internal_tx,
            format!("listing failed: {error:#}"),
        ),
    }
}

fn run_integrity_check<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let report = runtime.check_integrity();
    end_write(session, runtime, view_data, internal_tx, report.is_ok());
    match report {
        Ok(lines) => view_data.integrity_report = Some(lines),
        Err(error) => {
            emit_status(
                session,
                view_data,
                internal_tx,
                format!("integrity check failed: {error:#}"),
            );
            dispatch_and_apply(
                session,
                runtime,
                view_data,
                internal_tx,
                SessionCommand::BackToMenu,
            );
        }
    }
}

fn handle_integrity_key<R: AppRuntime>(
    session: &mut Session,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if view_data.integrity_report.is_none() {
        return false;
    }
    match key.code {
        KeyCode::Esc | KeyCode::Enter => dispatch_and_apply(
            session,
            runtime,
            view_data,
            internal_tx,
            SessionCommand::BackToMenu,
        ),
        _ => false,
    }
}

fn render(frame: &mut ratatui::Frame<'_>, session: &Session, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_text(
        session,
        view_data,
        usize::from(layout[0].width.saturating_sub(2)),
    ))
    .block(Block::default().title("bookstore").borders(Borders::ALL));
    frame.render_widget(header, layout[0]);

    match session.screen {
        Screen::Menu => render_menu(frame, layout[1], session),
        Screen::Selector(entity) => render_grid(frame, layout[1], session, view_data, entity),
        Screen::Listing => {
            let body = Paragraph::new(listing_text(&view_data.listing))
                .block(Block::default().title("book listing").borders(Borders::ALL));
            frame.render_widget(body, layout[1]);
        }
        Screen::Integrity => {
            let text = match &view_data.integrity_report {
                Some(lines) => lines.join("\n"),
                None => "Checking database integrity...".to_owned(),
            };
            let body = Paragraph::new(text)
                .block(Block::default().title("integrity check").borders(Borders::ALL));
            frame.render_widget(body, layout[1]);
        }
    }

    let status = Paragraph::new(status_text(session, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[2]);

    if let Some(ui) = &view_data.form {
        let area = centered_rect(80, 80, frame.area());
        frame.render_widget(Clear, area);
        let title = format!("{} - {}", ui.form.entity().label(), ui.form.mode().label());
        let inner_width = usize::from(area.width.saturating_sub(2));
        let form = Paragraph::new(form_text(ui, &view_data.currency_symbol, inner_width))
            .block(Block::default().title(title).borders(Borders::ALL));
        frame.render_widget(form, area);
    }

    if let Some(chooser) = &view_data.chooser {
        let area = centered_rect(50, 50, frame.area());
        frame.render_widget(Clear, area);
        let title = if chooser.multi { "choose (space marks)" } else { "choose" };
        let list = Paragraph::new(chooser_text(chooser)).block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(list, area);
    }

    if let Some(dialog) = &view_data.dialog {
        let area = centered_rect(56, 24, frame.area());
        frame.render_widget(Clear, area);
        let prompt = Paragraph::new(dialog_text(dialog)).block(
            Block::default()
                .title("confirm")
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Yellow)),
        );
        frame.render_widget(prompt, area);
    }

    if view_data.pending_write.is_some() {
        let area = centered_rect(48, 16, frame.area());
        frame.render_widget(Clear, area);
        let notice = Paragraph::new(LOCK_NOTICE)
            .block(Block::default().title("wait").borders(Borders::ALL));
        frame.render_widget(notice, area);
    }
}

fn header_text(session: &Session, view_data: &ViewData, width: usize) -> String {
    let title = match session.screen {
        Screen::Menu => format!("bookstore {VERSION} - Main menu"),
        Screen::Selector(entity) => session.selector_title(entity, VERSION),
        Screen::Listing => format!("bookstore {VERSION} - Book listing"),
        Screen::Integrity => format!("bookstore {VERSION} - Integrity check"),
    };
    let date = session.date_format.format(view_data.today);
    let used = title.chars().count() + date.chars().count();
    let gap = width.saturating_sub(used).max(1);
    format!("{title}{}{date}", " ".repeat(gap))
}

fn status_text(session: &Session, view_data: &ViewData) -> String {
    let prompt = if let Some(ui) = &view_data.form {
        if ui.form.is_editable() {
            "Tab=Next field   Enter=Choose/Next   F2=List   Ctrl+S=Save   Esc=Leave".to_owned()
        } else {
            "Enter/Esc=Close".to_owned()
        }
    } else {
        match session.screen {
            Screen::Menu => "Up/Down=Move   Enter=Select   Ctrl+Q=Quit".to_owned(),
            Screen::Selector(_) => view_data
                .selector
                .as_ref()
                .map(Selector::status_text)
                .unwrap_or_default(),
            Screen::Listing => {
                "Tab=Next field   Left/Right=Order   Enter=Write report   Esc=Back".to_owned()
            }
            Screen::Integrity => "Enter/Esc=Back to menu".to_owned(),
        }
    };

    let detail = match (&session.status_line, &view_data.selector) {
        (Some(status), _) => status.clone(),
        (None, Some(selector))
            if view_data.form.is_none()
                && matches!(selector.mode(), SelectorMode::DetailInput(_)) =>
        {
            format!("> {}", selector.input())
        }
        (None, _) => String::new(),
    };
    format!("{prompt}\n{detail}")
}

fn render_menu(frame: &mut ratatui::Frame<'_>, area: Rect, session: &Session) {
    let lines = MenuItem::ALL
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let style = if index == session.menu_index {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            Line::from(Span::styled(format!(" {} ", item.label()), style))
        })
        .collect::<Vec<_>>();
    let menu =
        Paragraph::new(lines).block(Block::default().title("main menu").borders(Borders::ALL));
    frame.render_widget(menu, area);
}

/// Grid columns of one pane, with their index into a row's cells.
fn pane_columns(entity: Entity, pane: Pane) -> Vec<(usize, GridColumn)> {
    entity
        .grid_columns()
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, column)| column.pane == pane)
        .collect()
}

fn render_grid(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    session: &Session,
    view_data: &ViewData,
    entity: Entity,
) {
    let pane = view_data
        .selector
        .as_ref()
        .map_or(Pane::Left, Selector::pane);
    let columns = pane_columns(entity, pane);
    let set = session.working_set(entity);
    let selected = set.current_index();

    let header = Row::new(columns.iter().map(|(_, column)| {
        Cell::from(column.label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = set.rows().iter().enumerate().map(|(row_index, row)| {
        let style = if Some(row_index) == selected {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let cells = columns
            .iter()
            .map(|(cell_index, _)| Cell::from(row.cell(*cell_index).to_owned()))
            .collect::<Vec<_>>();
        Row::new(cells).style(style)
    });

    // Column widths already include the gap to the next column.
    let widths = columns
        .iter()
        .map(|(_, column)| Constraint::Length(column.width))
        .collect::<Vec<_>>();
    let title = match pane {
        Pane::Left if entity.has_right_pane() => format!("{} [->]", entity.plural()),
        Pane::Left => entity.plural().to_owned(),
        Pane::Right => format!("{} [<-]", entity.plural()),
    };

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(0)
        .block(Block::default().title(title).borders(Borders::ALL));
    let mut table_state = TableState::default().with_selected(selected);
    frame.render_stateful_widget(table, area, &mut table_state);
}

/// Marker, label column and the spaces around them.
const FORM_LABEL_COLUMNS: usize = 19;

/// Fits a field value into `width` columns. The focused field shows its tail so the
/// insertion point stays visible; the others show their head.
fn field_window(value: &str, width: usize, focused: bool) -> String {
    let count = value.chars().count();
    if count <= width || width == 0 {
        return value.to_owned();
    }
    let keep = width - 1;
    if focused {
        let tail: String = value.chars().skip(count - keep).collect();
        format!("…{tail}")
    } else {
        let head: String = value.chars().take(keep).collect();
        format!("{head}…")
    }
}

fn form_text(ui: &FormUiState, currency_symbol: &str, inner_width: usize) -> String {
    let value_width = inner_width.saturating_sub(FORM_LABEL_COLUMNS);
    let focus = ui.form.focus_index();
    let mut lines = ui
        .form
        .fields()
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let marker = if index == focus { '>' } else { ' ' };
            let label = match field.spec.kind {
                FieldKind::Money => format!("{} ({currency_symbol})", field.spec.label),
                _ => field.spec.label.to_owned(),
            };
            let value = match field.spec.kind {
                FieldKind::Password => "*".repeat(field.value.chars().count().min(12)),
                _ => field_window(&field.value, value_width, index == focus),
            };
            format!("{marker} {label:<16} {value}")
        })
        .collect::<Vec<_>>();
    if let Some(error) = &ui.error {
        lines.push(String::new());
        lines.push(error.clone());
    }
    lines.join("\n")
}

fn chooser_text(chooser: &ChooserUiState) -> String {
    chooser
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let marker = if index == chooser.cursor { '>' } else { ' ' };
            if chooser.multi {
                let mark = if chooser.picked.contains(&index) { 'x' } else { ' ' };
                format!("{marker} [{mark}] {entry}")
            } else {
                format!("{marker} {entry}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn dialog_text(dialog: &DialogUiState) -> String {
    let (ok, cancel) = if dialog.ok_focused {
        ("[ OK ]", "  Cancel  ")
    } else {
        ("  OK  ", "[ Cancel ]")
    };
    format!("{}\n\n      {ok}    {cancel}", dialog.prompt)
}

fn listing_text(listing: &ListingUiState) -> String {
    let mut lines = ListingField::ALL
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let marker = if index == listing.field_index { '>' } else { ' ' };
            format!(
                "{marker} {:<12} {}",
                field.label(),
                listing.request.value(*field)
            )
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push(format!(
        "Orders: {}",
        ListingOrder::ALL
            .iter()
            .map(|order| order.label())
            .collect::<Vec<_>>()
            .join(" | ")
    ));
    if let Some(path) = &listing.last_report {
        lines.push(format!("Last report: {}", path.display()));
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
