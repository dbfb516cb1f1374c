// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use crate::dates::DateFormat;
use crate::forms::FormMode;
use crate::working_set::{SetKind, WorkingSet};
use crate::{Entity, GridRow, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Table(Entity),
    BookListing,
    IntegrityCheck,
    Quit,
}

impl MenuItem {
    pub const ALL: [Self; 8] = [
        Self::Table(Entity::Book),
        Self::Table(Entity::Author),
        Self::Table(Entity::Publisher),
        Self::Table(Entity::Warehouse),
        Self::Table(Entity::User),
        Self::BookListing,
        Self::IntegrityCheck,
        Self::Quit,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Table(entity) => entity.plural(),
            Self::BookListing => "Book listing",
            Self::IntegrityCheck => "Integrity check",
            Self::Quit => "Quit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Menu,
    Selector(Entity),
    Listing,
    Integrity,
}

/// What a closed form did to its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Unchanged,
    Created(GridRow),
    Updated(GridRow),
    Deleted(RecordId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    MenuNext,
    MenuPrev,
    MenuSelect,
    BackToMenu,
    FormClosed {
        entity: Entity,
        mode: FormMode,
        change: RowChange,
    },
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    ScreenChanged(Screen),
    MenuMoved(usize),
    /// The selector for this table must be refilled from the database.
    FullSetRequested(Entity),
    RowsChanged(Entity),
    StatusUpdated(String),
    StatusCleared,
    QuitRequested,
}

/// Everything the screens share: which table is active, one working set per table,
/// and the last table and operation a form touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub screen: Screen,
    pub menu_index: usize,
    pub remember_subset: bool,
    pub date_format: DateFormat,
    pub status_line: Option<String>,
    working_sets: BTreeMap<Entity, WorkingSet>,
    last_table: Option<Entity>,
    last_operation: Option<FormMode>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(true, DateFormat::default())
    }
}

impl Session {
    pub fn new(remember_subset: bool, date_format: DateFormat) -> Self {
        Self {
            screen: Screen::Menu,
            menu_index: 0,
            remember_subset,
            date_format,
            status_line: None,
            working_sets: Entity::ALL
                .into_iter()
                .map(|entity| (entity, WorkingSet::new(entity)))
                .collect(),
            last_table: None,
            last_operation: None,
        }
    }

    pub fn working_set(&self, entity: Entity) -> &WorkingSet {
        &self.working_sets[&entity]
    }

    pub fn working_set_mut(&mut self, entity: Entity) -> &mut WorkingSet {
        self.working_sets
            .entry(entity)
            .or_insert_with(|| WorkingSet::new(entity))
    }

    pub fn last_table(&self) -> Option<Entity> {
        self.last_table
    }

    pub fn last_operation(&self) -> Option<FormMode> {
        self.last_operation
    }

    pub fn menu_item(&self) -> MenuItem {
        MenuItem::ALL[self.menu_index.min(MenuItem::ALL.len() - 1)]
    }

    /// Whether a selector returning from a form must reload its table. Create and
    /// Delete always reload so the change shows in the unfiltered view.
    pub fn needs_full_reload(&self, entity: Entity) -> bool {
        !self.remember_subset
            || self.last_table != Some(entity)
            || matches!(
                self.last_operation,
                Some(FormMode::Create | FormMode::Delete)
            )
    }

    pub fn dispatch(&mut self, command: SessionCommand) -> Vec<SessionEvent> {
        match command {
            SessionCommand::MenuNext => self.move_menu(1),
            SessionCommand::MenuPrev => self.move_menu(-1),
            SessionCommand::MenuSelect => self.select_menu(),
            SessionCommand::BackToMenu => {
                self.screen = Screen::Menu;
                vec![SessionEvent::ScreenChanged(self.screen)]
            }
            SessionCommand::FormClosed {
                entity,
                mode,
                change,
            } => self.form_closed(entity, mode, change),
            SessionCommand::SetStatus(message) => vec![self.set_status(&message)],
            SessionCommand::ClearStatus => {
                self.status_line = None;
                vec![SessionEvent::StatusCleared]
            }
        }
    }

    fn move_menu(&mut self, delta: isize) -> Vec<SessionEvent> {
        let len = MenuItem::ALL.len() as isize;
        self.menu_index = (self.menu_index as isize + delta).rem_euclid(len) as usize;
        vec![SessionEvent::MenuMoved(self.menu_index)]
    }

    fn select_menu(&mut self) -> Vec<SessionEvent> {
        match self.menu_item() {
            MenuItem::Table(entity) => {
                self.screen = Screen::Selector(entity);
                // Entering from the menu always shows the whole table.
                vec![
                    SessionEvent::ScreenChanged(self.screen),
                    SessionEvent::FullSetRequested(entity),
                ]
            }
            MenuItem::BookListing => {
                self.screen = Screen::Listing;
                vec![SessionEvent::ScreenChanged(self.screen)]
            }
            MenuItem::IntegrityCheck => {
                self.screen = Screen::Integrity;
                vec![SessionEvent::ScreenChanged(self.screen)]
            }
            MenuItem::Quit => vec![SessionEvent::QuitRequested],
        }
    }

    fn form_closed(
        &mut self,
        entity: Entity,
        mode: FormMode,
        change: RowChange,
    ) -> Vec<SessionEvent> {
        self.last_table = Some(entity);
        self.last_operation = Some(mode);

        let set = self.working_set_mut(entity);
        let changed = match change {
            RowChange::Unchanged => false,
            RowChange::Created(row) => {
                set.append_row(row);
                true
            }
            RowChange::Updated(row) => {
                let numeral = row.numeral;
                let patched = set.patch_row(row.id, row);
                set.select_numeral(numeral);
                patched
            }
            RowChange::Deleted(id) => set.remove_row(id),
        };

        let mut events = Vec::new();
        if changed {
            events.push(SessionEvent::RowsChanged(entity));
        }
        if self.needs_full_reload(entity) {
            events.push(SessionEvent::FullSetRequested(entity));
        }
        events
    }

    /// Refills a table's working set with every row, keeping the current numeral.
    pub fn load_full_set(&mut self, entity: Entity, rows: Vec<GridRow>) {
        self.working_set_mut(entity).load_full_set(rows);
    }

    pub fn load_subset(&mut self, entity: Entity, rows: Vec<GridRow>) {
        self.working_set_mut(entity).load_subset(rows);
    }

    /// Selector title: program, table, set kind and size.
    pub fn selector_title(&self, entity: Entity, version: &str) -> String {
        let set = self.working_set(entity);
        let size = match (set.kind(), set.len()) {
            (SetKind::Full, count) => format!("Full set: {count} rows"),
            (SetKind::Subset, 0) => "[Find] subset: No records found".to_owned(),
            (SetKind::Subset, count) => format!("[Find] subset: {count} rows"),
        };
        format!("bookstore {version} - {} selector - {size}", entity.label())
    }

    fn set_status(&mut self, message: &str) -> SessionEvent {
        self.status_line = Some(message.to_owned());
        SessionEvent::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{MenuItem, RowChange, Screen, Session, SessionCommand, SessionEvent};
    use crate::dates::DateFormat;
    use crate::forms::FormMode;
    use crate::{Entity, GridRow, Numeral, RecordId};

    fn row(id: i64, numeral: i64, name: &str) -> GridRow {
        GridRow {
            id: RecordId::new(id),
            numeral: Numeral::new(numeral),
            cells: vec![
                numeral.to_string(),
                name.to_owned(),
                String::new(),
                String::new(),
                String::new(),
            ],
        }
    }

    fn session_with_authors() -> Session {
        let mut session = Session::default();
        session.load_full_set(
            Entity::Author,
            vec![row(1, 1, "Galdós"), row(2, 2, "Pardo Bazán"), row(3, 3, "Clarín")],
        );
        session
    }

    #[test]
    fn menu_wraps_and_opens_selector() {
        let mut session = Session::default();
        let events = session.dispatch(SessionCommand::MenuPrev);
        assert_eq!(events, vec![SessionEvent::MenuMoved(7)]);
        assert_eq!(session.menu_item(), MenuItem::Quit);

        session.dispatch(SessionCommand::MenuNext);
        session.dispatch(SessionCommand::MenuNext);
        let events = session.dispatch(SessionCommand::MenuSelect);
        assert_eq!(session.screen, Screen::Selector(Entity::Author));
        assert_eq!(
            events,
            vec![
                SessionEvent::ScreenChanged(Screen::Selector(Entity::Author)),
                SessionEvent::FullSetRequested(Entity::Author),
            ]
        );
    }

    #[test]
    fn quit_item_requests_quit() {
        let mut session = Session {
            menu_index: 7,
            ..Session::default()
        };
        assert_eq!(
            session.dispatch(SessionCommand::MenuSelect),
            vec![SessionEvent::QuitRequested]
        );
    }

    #[test]
    fn update_patches_the_subset_when_remembering() {
        let mut session = session_with_authors();
        session.load_subset(Entity::Author, vec![row(2, 2, "Pardo Bazán")]);
        let events = session.dispatch(SessionCommand::FormClosed {
            entity: Entity::Author,
            mode: FormMode::Update,
            change: RowChange::Updated(row(2, 2, "Emilia Pardo Bazán")),
        });
        assert_eq!(events, vec![SessionEvent::RowsChanged(Entity::Author)]);
        let set = session.working_set(Entity::Author);
        assert_eq!(set.len(), 1);
        assert_eq!(set.rows()[0].cell(1), "Emilia Pardo Bazán");
        assert_eq!(
            session.selector_title(Entity::Author, "0.1.0"),
            "bookstore 0.1.0 - Author selector - [Find] subset: 1 rows"
        );
    }

    #[test]
    fn create_and_delete_always_reload() {
        for (mode, change) in [
            (FormMode::Create, RowChange::Created(row(4, 4, "Valle-Inclán"))),
            (FormMode::Delete, RowChange::Deleted(RecordId::new(1))),
        ] {
            let mut session = session_with_authors();
            let events = session.dispatch(SessionCommand::FormClosed {
                entity: Entity::Author,
                mode,
                change,
            });
            assert_eq!(
                events,
                vec![
                    SessionEvent::RowsChanged(Entity::Author),
                    SessionEvent::FullSetRequested(Entity::Author),
                ],
                "{mode:?}"
            );
        }
    }

    #[test]
    fn forgetting_subsets_reloads_after_any_form() {
        let mut session = session_with_authors();
        session.remember_subset = false;
        let events = session.dispatch(SessionCommand::FormClosed {
            entity: Entity::Author,
            mode: FormMode::Read,
            change: RowChange::Unchanged,
        });
        assert_eq!(events, vec![SessionEvent::FullSetRequested(Entity::Author)]);
    }

    #[test]
    fn delete_moves_selection_to_previous_row() {
        let mut session = session_with_authors();
        session
            .working_set_mut(Entity::Author)
            .select_numeral(Numeral::new(2));
        session.dispatch(SessionCommand::FormClosed {
            entity: Entity::Author,
            mode: FormMode::Delete,
            change: RowChange::Deleted(RecordId::new(2)),
        });
        let current = session.working_set(Entity::Author).current();
        assert_eq!(current.map(|row| row.numeral), Some(Numeral::new(1)));
    }

    #[test]
    fn titles_describe_the_set() {
        let mut session = session_with_authors();
        assert_eq!(
            session.selector_title(Entity::Author, "1.2.3"),
            "bookstore 1.2.3 - Author selector - Full set: 3 rows"
        );
        session.load_subset(Entity::Author, Vec::new());
        assert_eq!(
            session.selector_title(Entity::Author, "1.2.3"),
            "bookstore 1.2.3 - Author selector - [Find] subset: No records found"
        );
    }

    #[test]
    fn status_round_trip() {
        let mut session = Session::new(false, DateFormat::default());
        let events = session.dispatch(SessionCommand::SetStatus("Record saved".to_owned()));
        assert_eq!(events, vec![SessionEvent::StatusUpdated("Record saved".to_owned())]);
        assert_eq!(session.status_line.as_deref(), Some("Record saved"));
        session.dispatch(SessionCommand::ClearStatus);
        assert!(session.status_line.is_none());
    }
}
