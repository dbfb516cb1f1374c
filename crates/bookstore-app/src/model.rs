// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;

use crate::{Numeral, RecordId};

pub const GENRES: [&str; 5] = ["Narrative", "Theatre", "Poetry", "Short story", "Essay"];

pub const COVER_TYPES: [&str; 5] = [
    "Softcover with one-sided board",
    "Silk softcover",
    "Printed paper case hardcover",
    "Cloth hardcover",
    "Hardcover with dust jacket",
];

/// Screen width every grid pane is laid out for.
pub const GRID_WIDTH: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Entity {
    Book,
    Author,
    Publisher,
    Warehouse,
    User,
}

impl Entity {
    pub const ALL: [Self; 5] = [
        Self::Book,
        Self::Author,
        Self::Publisher,
        Self::Warehouse,
        Self::User,
    ];

    pub const fn table(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Author => "author",
            Self::Publisher => "publisher",
            Self::Warehouse => "warehouse",
            Self::User => "user",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Book => "Book",
            Self::Author => "Author",
            Self::Publisher => "Publisher",
            Self::Warehouse => "Warehouse",
            Self::User => "User",
        }
    }

    pub const fn plural(self) -> &'static str {
        match self {
            Self::Book => "Books",
            Self::Author => "Authors",
            Self::Publisher => "Publishers",
            Self::Warehouse => "Warehouses",
            Self::User => "Users",
        }
    }

    /// Maximum digits of a numeral in this table.
    pub const fn numeral_digits(self) -> usize {
        match self {
            Self::Book => 6,
            Self::Author | Self::Publisher | Self::Warehouse | Self::User => 3,
        }
    }

    /// The field besides the numeral that must be unique within the table.
    pub const fn unique_key(self) -> FieldKey {
        match self {
            Self::Book => FieldKey::Isbn,
            Self::Author | Self::Publisher => FieldKey::Name,
            Self::Warehouse => FieldKey::Code,
            Self::User => FieldKey::Login,
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Book => BOOK_FIELDS,
            Self::Author => AUTHOR_FIELDS,
            Self::Publisher => PUBLISHER_FIELDS,
            Self::Warehouse => WAREHOUSE_FIELDS,
            Self::User => USER_FIELDS,
        }
    }

    pub fn field(self, key: FieldKey) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.key == key)
    }

    pub fn grid_columns(self) -> &'static [GridColumn] {
        match self {
            Self::Book => BOOK_GRID,
            Self::Author => AUTHOR_GRID,
            Self::Publisher => PUBLISHER_GRID,
            Self::Warehouse => WAREHOUSE_GRID,
            Self::User => USER_GRID,
        }
    }

    pub fn has_right_pane(self) -> bool {
        self.grid_columns()
            .iter()
            .any(|column| column.pane == Pane::Right)
    }

    /// Field names accepted on the left of `field:literal` in a Find.
    pub fn find_fields(self) -> &'static [FindField] {
        match self {
            Self::Book => BOOK_FIND,
            Self::Author => AUTHOR_FIND,
            Self::Publisher => PUBLISHER_FIND,
            Self::Warehouse => WAREHOUSE_FIND,
            Self::User => USER_FIND,
        }
    }

    /// The date column searched alone when an unqualified Find literal is a date.
    pub fn date_key(self) -> Option<FieldKey> {
        match self {
            Self::Book | Self::User => Some(FieldKey::CreationDate),
            Self::Author | Self::Publisher | Self::Warehouse => None,
        }
    }

    /// Projects a full record onto the grid columns.
    pub fn grid_row(self, id: RecordId, record: &Record) -> Option<GridRow> {
        let numeral = record.numeral()?;
        let cells = self
            .grid_columns()
            .iter()
            .map(|column| record.get(column.key).to_owned())
            .collect();
        Some(GridRow { id, numeral, cells })
    }

    pub fn grid_column_index(self, key: FieldKey) -> Option<usize> {
        self.grid_columns()
            .iter()
            .position(|column| column.key == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldKey {
    Numeral,
    Title,
    OriginalTitle,
    Author,
    Description,
    Isbn,
    Year,
    Publisher,
    CreationDate,
    Genre,
    CoverType,
    Warehouses,
    Price,
    Name,
    Address,
    Bio,
    Url,
    Phone,
    Code,
    Login,
    UserName,
    Level,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    Authors,
    Publishers,
    Warehouses,
    Genres,
    CoverTypes,
}

impl ChoiceSource {
    /// Lists that never change at runtime.
    pub fn fixed_values(self) -> Option<&'static [&'static str]> {
        match self {
            Self::Genres => Some(&GENRES),
            Self::CoverTypes => Some(&COVER_TYPES),
            Self::Authors | Self::Publishers | Self::Warehouses => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeral,
    Text,
    Integer,
    Date,
    Money,
    Choice(ChoiceSource),
    MultiChoice(ChoiceSource),
    Login,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mandatory {
    Always,
    OnCreate,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub label: &'static str,
    pub kind: FieldKind,
    pub mandatory: Mandatory,
    pub max_len: Option<usize>,
}

const fn field(
    key: FieldKey,
    label: &'static str,
    kind: FieldKind,
    mandatory: Mandatory,
    max_len: Option<usize>,
) -> FieldSpec {
    FieldSpec {
        key,
        label,
        kind,
        mandatory,
        max_len,
    }
}

const BOOK_FIELDS: &[FieldSpec] = &[
    field(FieldKey::Numeral, "Numeral", FieldKind::Numeral, Mandatory::Always, Some(6)),
    field(FieldKey::Title, "Title", FieldKind::Text, Mandatory::Always, None),
    field(FieldKey::OriginalTitle, "Orig. title", FieldKind::Text, Mandatory::Never, None),
    field(
        FieldKey::Author,
        "Author",
        FieldKind::Choice(ChoiceSource::Authors),
        Mandatory::Always,
        None,
    ),
    field(FieldKey::Description, "Description", FieldKind::Text, Mandatory::Never, None),
    field(FieldKey::Isbn, "ISBN/SKU", FieldKind::Text, Mandatory::Always, Some(17)),
    field(FieldKey::Year, "Public. year", FieldKind::Integer, Mandatory::Always, Some(5)),
    field(
        FieldKey::Publisher,
        "Publisher",
        FieldKind::Choice(ChoiceSource::Publishers),
        Mandatory::Always,
        None,
    ),
    field(FieldKey::CreationDate, "Creation date", FieldKind::Date, Mandatory::Always, None),
    field(
        FieldKey::Genre,
        "Genre",
        FieldKind::Choice(ChoiceSource::Genres),
        Mandatory::Always,
        None,
    ),
    field(
        FieldKey::CoverType,
        "Cover type",
        FieldKind::Choice(ChoiceSource::CoverTypes),
        Mandatory::Always,
        None,
    ),
    field(
        FieldKey::Warehouses,
        "Warehouses",
        FieldKind::MultiChoice(ChoiceSource::Warehouses),
        Mandatory::Never,
        None,
    ),
    field(FieldKey::Price, "Price", FieldKind::Money, Mandatory::Always, Some(8)),
];

const AUTHOR_FIELDS: &[FieldSpec] = &[
    field(FieldKey::Numeral, "Numeral", FieldKind::Numeral, Mandatory::Always, Some(3)),
    field(FieldKey::Name, "Name", FieldKind::Text, Mandatory::Always, None),
    field(FieldKey::Address, "Address", FieldKind::Text, Mandatory::Never, None),
    field(FieldKey::Bio, "Bio", FieldKind::Text, Mandatory::Never, None),
    field(FieldKey::Url, "URL", FieldKind::Text, Mandatory::Never, None),
];

const PUBLISHER_FIELDS: &[FieldSpec] = &[
    field(FieldKey::Numeral, "Numeral", FieldKind::Numeral, Mandatory::Always, Some(3)),
    field(FieldKey::Name, "Name", FieldKind::Text, Mandatory::Always, None),
    field(FieldKey::Address, "Address", FieldKind::Text, Mandatory::Never, None),
    field(FieldKey::Phone, "Phone", FieldKind::Text, Mandatory::Never, None),
    field(FieldKey::Url, "URL", FieldKind::Text, Mandatory::Never, None),
];

const WAREHOUSE_FIELDS: &[FieldSpec] = &[
    field(FieldKey::Numeral, "Numeral", FieldKind::Numeral, Mandatory::Always, Some(3)),
    field(FieldKey::Code, "Code", FieldKind::Text, Mandatory::Always, None),
    field(FieldKey::Address, "Address", FieldKind::Text, Mandatory::Never, None),
    field(FieldKey::Phone, "Phone", FieldKind::Text, Mandatory::Never, None),
];

const USER_FIELDS: &[FieldSpec] = &[
    field(FieldKey::Numeral, "Numeral", FieldKind::Numeral, Mandatory::Always, Some(3)),
    field(FieldKey::Login, "User", FieldKind::Login, Mandatory::Always, None),
    field(FieldKey::UserName, "User name", FieldKind::Text, Mandatory::Always, None),
    field(FieldKey::Level, "User level", FieldKind::Integer, Mandatory::Always, None),
    field(FieldKey::CreationDate, "Creation date", FieldKind::Date, Mandatory::Always, None),
    field(FieldKey::Password, "Password", FieldKind::Password, Mandatory::OnCreate, None),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Left,
    Right,
}

impl Pane {
    pub fn toggled(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridColumn {
    pub key: FieldKey,
    pub label: &'static str,
    pub width: u16,
    pub pane: Pane,
}

const fn column(key: FieldKey, label: &'static str, width: u16, pane: Pane) -> GridColumn {
    GridColumn {
        key,
        label,
        width,
        pane,
    }
}

const BOOK_GRID: &[GridColumn] = &[
    column(FieldKey::Numeral, "Numeral", 8, Pane::Left),
    column(FieldKey::Title, "Title", 29, Pane::Left),
    column(FieldKey::Author, "Author", 24, Pane::Left),
    column(FieldKey::Year, "Year", 5, Pane::Left),
    column(FieldKey::Publisher, "Publisher", 14, Pane::Left),
    column(FieldKey::CreationDate, "Date", 9, Pane::Right),
    column(FieldKey::Isbn, "ISBN/SKU", 71, Pane::Right),
];

const AUTHOR_GRID: &[GridColumn] = &[
    column(FieldKey::Numeral, "Numeral", 8, Pane::Left),
    column(FieldKey::Name, "Name", 28, Pane::Left),
    column(FieldKey::Address, "Address", 21, Pane::Left),
    column(FieldKey::Bio, "Bio", 12, Pane::Left),
    column(FieldKey::Url, "URL", 11, Pane::Left),
];

const PUBLISHER_GRID: &[GridColumn] = &[
    column(FieldKey::Numeral, "Numeral", 8, Pane::Left),
    column(FieldKey::Name, "Name", 28, Pane::Left),
    column(FieldKey::Address, "Address", 21, Pane::Left),
    column(FieldKey::Phone, "Phone", 12, Pane::Left),
    column(FieldKey::Url, "URL", 11, Pane::Left),
];

const WAREHOUSE_GRID: &[GridColumn] = &[
    column(FieldKey::Numeral, "Numeral", 8, Pane::Left),
    column(FieldKey::Code, "Code", 12, Pane::Left),
    column(FieldKey::Address, "Address", 45, Pane::Left),
    column(FieldKey::Phone, "Phone", 15, Pane::Left),
];

const USER_GRID: &[GridColumn] = &[
    column(FieldKey::Numeral, "Numeral", 8, Pane::Left),
    column(FieldKey::Login, "User", 12, Pane::Left),
    column(FieldKey::UserName, "User name", 26, Pane::Left),
    column(FieldKey::Level, "Level", 6, Pane::Left),
    column(FieldKey::CreationDate, "Date", 10, Pane::Left),
    column(FieldKey::Password, "Password", 18, Pane::Left),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindField {
    pub name: &'static str,
    pub key: FieldKey,
}

const fn find(name: &'static str, key: FieldKey) -> FindField {
    FindField { name, key }
}

const BOOK_FIND: &[FindField] = &[
    find("numeral", FieldKey::Numeral),
    find("title", FieldKey::Title),
    find("author", FieldKey::Author),
    find("year", FieldKey::Year),
    find("publisher", FieldKey::Publisher),
    find("date", FieldKey::CreationDate),
    find("isbn", FieldKey::Isbn),
];

const AUTHOR_FIND: &[FindField] = &[
    find("numeral", FieldKey::Numeral),
    find("name", FieldKey::Name),
    find("address", FieldKey::Address),
    find("bio", FieldKey::Bio),
    find("url", FieldKey::Url),
];

const PUBLISHER_FIND: &[FindField] = &[
    find("numeral", FieldKey::Numeral),
    find("name", FieldKey::Name),
    find("address", FieldKey::Address),
    find("phone", FieldKey::Phone),
    find("url", FieldKey::Url),
];

const WAREHOUSE_FIND: &[FindField] = &[
    find("numeral", FieldKey::Numeral),
    find("code", FieldKey::Code),
    find("address", FieldKey::Address),
    find("phone", FieldKey::Phone),
];

const USER_FIND: &[FindField] = &[
    find("numeral", FieldKey::Numeral),
    find("user", FieldKey::Login),
    find("name", FieldKey::UserName),
    find("level", FieldKey::Level),
    find("date", FieldKey::CreationDate),
    find("password", FieldKey::Password),
];

/// One row of an entity table with every value in its on-screen text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub entity: Entity,
    pub id: Option<RecordId>,
    values: BTreeMap<FieldKey, String>,
}

impl Record {
    pub fn blank(entity: Entity) -> Self {
        let values = entity
            .fields()
            .iter()
            .map(|spec| (spec.key, String::new()))
            .collect();
        Self {
            entity,
            id: None,
            values,
        }
    }

    pub fn get(&self, key: FieldKey) -> &str {
        self.values.get(&key).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, key: FieldKey, value: impl Into<String>) {
        self.values.insert(key, value.into());
    }

    pub fn with(mut self, key: FieldKey, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn numeral(&self) -> Option<Numeral> {
        Numeral::parse(self.get(FieldKey::Numeral))
    }

    pub fn values(&self) -> impl Iterator<Item = (FieldKey, &str)> {
        self.values.iter().map(|(key, value)| (*key, value.as_str()))
    }

    /// Warehouse codes of a book, split on commas with blanks dropped.
    pub fn warehouse_codes(&self) -> Vec<String> {
        split_enumeration(self.get(FieldKey::Warehouses))
    }
}

/// The projection of a record shown in a selector grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub id: RecordId,
    pub numeral: Numeral,
    pub cells: Vec<String>,
}

impl GridRow {
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

pub fn split_enumeration(raw: &str) -> Vec<String> {
    let mut items = Vec::new();
    for item in raw.split(',') {
        let item = item.trim();
        if !item.is_empty() && !items.iter().any(|existing: &String| existing == item) {
            items.push(item.to_owned());
        }
    }
    items
}

pub fn genre_index(name: &str) -> Option<i64> {
    position_in(&GENRES, name)
}

pub fn cover_type_index(name: &str) -> Option<i64> {
    position_in(&COVER_TYPES, name)
}

pub fn genre_name(index: i64) -> &'static str {
    name_at(&GENRES, index)
}

pub fn cover_type_name(index: i64) -> &'static str {
    name_at(&COVER_TYPES, index)
}

// Lists are stored 1-based.
fn position_in(list: &[&str], name: &str) -> Option<i64> {
    list.iter()
        .position(|entry| entry.eq_ignore_ascii_case(name.trim()))
        .map(|index| index as i64 + 1)
}

fn name_at(list: &[&'static str], index: i64) -> &'static str {
    usize::try_from(index - 1)
        .ok()
        .and_then(|index| list.get(index))
        .copied()
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::{
        Entity, FieldKey, GRID_WIDTH, Pane, Record, cover_type_index, genre_index, genre_name,
        split_enumeration,
    };
    use crate::{Numeral, RecordId};

    #[test]
    fn left_panes_fill_the_screen_width() {
        for entity in Entity::ALL {
            let left: u16 = entity
                .grid_columns()
                .iter()
                .filter(|column| column.pane == Pane::Left)
                .map(|column| column.width)
                .sum();
            assert_eq!(left, GRID_WIDTH, "{entity:?}");
        }
    }

    #[test]
    fn only_books_have_a_right_pane() {
        assert!(Entity::Book.has_right_pane());
        for entity in [
            Entity::Author,
            Entity::Publisher,
            Entity::Warehouse,
            Entity::User,
        ] {
            assert!(!entity.has_right_pane(), "{entity:?}");
        }
    }

    #[test]
    fn unique_key_is_shown_in_every_grid() {
        for entity in Entity::ALL {
            assert!(
                entity.grid_column_index(entity.unique_key()).is_some(),
                "{entity:?}"
            );
            assert_eq!(entity.grid_column_index(FieldKey::Numeral), Some(0));
        }
    }

    #[test]
    fn grid_row_projects_columns_in_order() {
        let record = Record::blank(Entity::Author)
            .with(FieldKey::Numeral, "12")
            .with(FieldKey::Name, "Pérez Galdós")
            .with(FieldKey::Url, "https://example.org");
        let row = Entity::Author
            .grid_row(RecordId::new(4), &record)
            .expect("numeral is valid");
        assert_eq!(row.numeral, Numeral::new(12));
        assert_eq!(row.cell(0), "12");
        assert_eq!(row.cell(1), "Pérez Galdós");
        assert_eq!(row.cell(4), "https://example.org");
    }

    #[test]
    fn enumeration_split_drops_blanks_and_duplicates() {
        assert_eq!(
            split_enumeration("A1, B2,,A1 , C3,"),
            vec!["A1".to_owned(), "B2".to_owned(), "C3".to_owned()]
        );
        assert!(split_enumeration(" , ").is_empty());
    }

    #[test]
    fn fixed_lists_are_one_based() {
        assert_eq!(genre_index("Narrative"), Some(1));
        assert_eq!(genre_index("essay"), Some(5));
        assert_eq!(genre_index("Opera"), None);
        assert_eq!(genre_name(3), "Poetry");
        assert_eq!(genre_name(0), "");
        assert_eq!(cover_type_index("Cloth hardcover"), Some(4));
    }
}
