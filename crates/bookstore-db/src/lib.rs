// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use bookstore_app::dates::from_db_timestamp;
use bookstore_app::money::format_price;
use bookstore_app::{
    ChoiceSource, Comparator, DateFormat, Entity, FieldKey, FindQuery, FindTarget, GridRow,
    Numeral, Record, RecordId, cover_type_name, genre_name,
};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

mod integrity;
mod listing;
mod session;

pub use integrity::IntegrityReport;
pub use listing::{ListingRow, listing_file_name, render_listing_report, write_listing_report};
pub use bookstore_app::{DeleteOutcome, SaveOptions, SaveOutcome};
pub use session::{LockPolicy, WriteSession};

pub const APP_NAME: &str = "bookstore";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(2);

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "author",
        &["id", "numeral", "name", "address", "bio", "url"],
    ),
    (
        "publisher",
        &["id", "numeral", "name", "address", "phone", "url"],
    ),
    ("warehouse", &["id", "numeral", "code", "address", "phone"]),
    (
        "book",
        &[
            "id",
            "numeral",
            "book_title",
            "original_title",
            "description",
            "isbn",
            "year",
            "publisher_num",
            "creation_date",
            "genre_id",
            "cover_type",
            "price_cents",
        ],
    ),
    (
        "book_author",
        &["id", "book_num", "author_num", "is_main_author"],
    ),
    (
        "book_warehouse",
        &["id", "book_num", "warehouse_num", "bookshelf", "stock"],
    ),
    (
        "user",
        &[
            "id",
            "numeral",
            "login",
            "user_name",
            "user_level",
            "creation_date",
            "password",
        ],
    ),
    ("numeral_seq", &["table_name", "last_numeral"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_book_author_book_num",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_book_author_book_num ON book_author (book_num);",
    },
    RequiredIndex {
        name: "idx_book_author_author_num",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_book_author_author_num ON book_author (author_num);",
    },
    RequiredIndex {
        name: "idx_book_warehouse_book_num",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_book_warehouse_book_num ON book_warehouse (book_num);",
    },
    RequiredIndex {
        name: "idx_book_warehouse_warehouse_num",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_book_warehouse_warehouse_num ON book_warehouse (warehouse_num);",
    },
    RequiredIndex {
        name: "idx_book_publisher_num",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_book_publisher_num ON book (publisher_num);",
    },
];

/// How a stored column turns into on-screen text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stored {
    Text,
    Timestamp,
    Cents,
    Genre,
    CoverType,
}

#[derive(Debug, Clone, Copy)]
struct StoredColumn {
    key: FieldKey,
    expr: &'static str,
    stored: Stored,
}

const fn stored(key: FieldKey, expr: &'static str, stored: Stored) -> StoredColumn {
    StoredColumn { key, expr, stored }
}

const MAIN_AUTHOR_EXPR: &str = "COALESCE((
      SELECT a.name
      FROM book_author ba
      JOIN author a ON a.numeral = ba.author_num
      WHERE ba.book_num = t.numeral
      ORDER BY ba.is_main_author DESC, ba.id ASC
      LIMIT 1
    ), '')";

const BOOK_COLUMNS: &[StoredColumn] = &[
    stored(FieldKey::Numeral, "t.numeral", Stored::Text),
    stored(FieldKey::Title, "t.book_title", Stored::Text),
    stored(FieldKey::OriginalTitle, "t.original_title", Stored::Text),
    stored(FieldKey::Author, MAIN_AUTHOR_EXPR, Stored::Text),
    stored(FieldKey::Description, "t.description", Stored::Text),
    stored(FieldKey::Isbn, "t.isbn", Stored::Text),
    stored(FieldKey::Year, "t.year", Stored::Text),
    stored(FieldKey::Publisher, "COALESCE(p.name, '')", Stored::Text),
    stored(FieldKey::CreationDate, "t.creation_date", Stored::Timestamp),
    stored(FieldKey::Genre, "t.genre_id", Stored::Genre),
    stored(FieldKey::CoverType, "t.cover_type", Stored::CoverType),
    stored(FieldKey::Price, "t.price_cents", Stored::Cents),
];

const AUTHOR_COLUMNS: &[StoredColumn] = &[
    stored(FieldKey::Numeral, "t.numeral", Stored::Text),
    stored(FieldKey::Name, "t.name", Stored::Text),
    stored(FieldKey::Address, "t.address", Stored::Text),
    stored(FieldKey::Bio, "t.bio", Stored::Text),
    stored(FieldKey::Url, "t.url", Stored::Text),
];

const PUBLISHER_COLUMNS: &[StoredColumn] = &[
    stored(FieldKey::Numeral, "t.numeral", Stored::Text),
    stored(FieldKey::Name, "t.name", Stored::Text),
    stored(FieldKey::Address, "t.address", Stored::Text),
    stored(FieldKey::Phone, "t.phone", Stored::Text),
    stored(FieldKey::Url, "t.url", Stored::Text),
];

const WAREHOUSE_COLUMNS: &[StoredColumn] = &[
    stored(FieldKey::Numeral, "t.numeral", Stored::Text),
    stored(FieldKey::Code, "t.code", Stored::Text),
    stored(FieldKey::Address, "t.address", Stored::Text),
    stored(FieldKey::Phone, "t.phone", Stored::Text),
];

const USER_COLUMNS: &[StoredColumn] = &[
    stored(FieldKey::Numeral, "t.numeral", Stored::Text),
    stored(FieldKey::Login, "t.login", Stored::Text),
    stored(FieldKey::UserName, "t.user_name", Stored::Text),
    stored(FieldKey::Level, "t.user_level", Stored::Text),
    stored(FieldKey::CreationDate, "t.creation_date", Stored::Timestamp),
    stored(FieldKey::Password, "t.password", Stored::Text),
];

fn stored_columns(entity: Entity) -> &'static [StoredColumn] {
    match entity {
        Entity::Book => BOOK_COLUMNS,
        Entity::Author => AUTHOR_COLUMNS,
        Entity::Publisher => PUBLISHER_COLUMNS,
        Entity::Warehouse => WAREHOUSE_COLUMNS,
        Entity::User => USER_COLUMNS,
    }
}

fn stored_column(entity: Entity, key: FieldKey) -> Option<&'static StoredColumn> {
    stored_columns(entity)
        .iter()
        .find(|column| column.key == key)
}

// Every entity query aliases its table as `t`.
fn source(entity: Entity) -> &'static str {
    match entity {
        Entity::Book => "book t LEFT JOIN publisher p ON p.numeral = t.publisher_num",
        Entity::Author => "author t",
        Entity::Publisher => "publisher t",
        Entity::Warehouse => "warehouse t",
        Entity::User => "user t",
    }
}

/// Column name a grid or Find query exposes for a field.
fn grid_alias(key: FieldKey) -> &'static str {
    match key {
        FieldKey::Numeral => "numeral",
        FieldKey::Title => "title",
        FieldKey::OriginalTitle => "original_title",
        FieldKey::Author => "author",
        FieldKey::Description => "description",
        FieldKey::Isbn => "isbn",
        FieldKey::Year => "year",
        FieldKey::Publisher => "publisher",
        FieldKey::CreationDate => "creation_date",
        FieldKey::Genre => "genre",
        FieldKey::CoverType => "cover_type",
        FieldKey::Warehouses => "warehouses",
        FieldKey::Price => "price",
        FieldKey::Name => "name",
        FieldKey::Address => "address",
        FieldKey::Bio => "bio",
        FieldKey::Url => "url",
        FieldKey::Phone => "phone",
        FieldKey::Code => "code",
        FieldKey::Login => "login",
        FieldKey::UserName => "user_name",
        FieldKey::Level => "level",
        FieldKey::Password => "password",
    }
}

/// `SELECT id, <grid columns>` for one entity, to be wrapped by list and Find queries.
fn grid_select(entity: Entity) -> String {
    let columns = entity
        .grid_columns()
        .iter()
        .filter_map(|column| stored_column(entity, column.key))
        .map(|column| format!("{} AS {}", column.expr, grid_alias(column.key)))
        .collect::<Vec<_>>();
    format!(
        "SELECT t.id AS id, {} FROM {}",
        columns.join(", "),
        source(entity)
    )
}

fn is_numeric_key(key: FieldKey) -> bool {
    matches!(key, FieldKey::Numeral | FieldKey::Year | FieldKey::Level)
}

pub struct Store {
    conn: Connection,
    date_format: DateFormat,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            date_format: DateFormat::default(),
        })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self {
            conn,
            date_format: DateFormat::default(),
        })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    /// How long one lock attempt waits inside SQLite before it reports busy.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            bail!("busy timeout must be positive");
        }
        self.conn
            .busy_timeout(timeout)
            .context("set sqlite busy timeout")
    }

    pub fn set_date_format(&mut self, date_format: DateFormat) {
        self.date_format = date_format;
    }

    pub fn date_format(&self) -> DateFormat {
        self.date_format
    }

    /// The full set of a table, ordered by numeral.
    pub fn list_rows(&self, entity: Entity) -> Result<Vec<GridRow>> {
        let sql = format!(
            "SELECT * FROM ({}) AS grid ORDER BY numeral ASC",
            grid_select(entity)
        );
        let rows = self.query_grid(entity, &sql, Vec::new())?;
        debug!(table = entity.table(), rows = rows.len(), "loaded full set");
        Ok(rows)
    }

    /// Runs a resolved Find against its table.
    pub fn find_rows(&self, query: &FindQuery) -> Result<Vec<GridRow>> {
        let entity = query.entity;
        let (condition, values) = match query.target {
            FindTarget::AllColumns => {
                let terms = entity
                    .find_fields()
                    .iter()
                    .map(|field| format!("{} LIKE ?", grid_alias(field.key)))
                    .collect::<Vec<_>>();
                let values = terms
                    .iter()
                    .map(|_| Value::Text(query.value.clone()))
                    .collect::<Vec<_>>();
                (terms.join(" OR "), values)
            }
            FindTarget::Column(key) => {
                let column = grid_alias(key);
                let numeric = is_numeric_key(key)
                    .then(|| query.value.trim().parse::<i64>().ok())
                    .flatten();
                match (query.comparator, numeric) {
                    (Comparator::Like, _) => (
                        format!("{column} LIKE ?"),
                        vec![Value::Text(query.value.clone())],
                    ),
                    (comparator, Some(number)) => (
                        format!("{column} {} ?", comparator.sql()),
                        vec![Value::Integer(number)],
                    ),
                    (comparator, None) => (
                        format!("{column} {} ? COLLATE NOCASE", comparator.sql()),
                        vec![Value::Text(query.value.clone())],
                    ),
                }
            }
        };

        let sql = format!(
            "SELECT * FROM ({}) AS grid WHERE {condition} ORDER BY numeral ASC",
            grid_select(entity)
        );
        let rows = self.query_grid(entity, &sql, values)?;
        debug!(
            table = entity.table(),
            rows = rows.len(),
            value = %query.value,
            "find subset"
        );
        Ok(rows)
    }

    pub fn grid_row(&self, entity: Entity, id: RecordId) -> Result<Option<GridRow>> {
        let sql = format!("SELECT * FROM ({}) AS grid WHERE id = ?", grid_select(entity));
        let mut rows = self.query_grid(entity, &sql, vec![Value::Integer(id.get())])?;
        Ok(rows.pop())
    }

    fn query_grid(&self, entity: Entity, sql: &str, values: Vec<Value>) -> Result<Vec<GridRow>> {
        let date_format = self.date_format;
        let layout = entity
            .grid_columns()
            .iter()
            .filter_map(|column| stored_column(entity, column.key))
            .collect::<Vec<_>>();

        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("prepare {} grid query", entity.table()))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let id = RecordId::new(row.get(0)?);
                let numeral = Numeral::new(row.get(1)?);
                let mut cells = Vec::with_capacity(layout.len());
                for (index, column) in layout.iter().enumerate() {
                    cells.push(display_value(
                        column.stored,
                        row.get_ref(index + 1)?,
                        date_format,
                    ));
                }
                Ok(GridRow { id, numeral, cells })
            })
            .with_context(|| format!("query {} rows", entity.table()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("collect {} rows", entity.table()))
    }

    /// Every field of one record in its on-screen form.
    pub fn read_record(&self, entity: Entity, numeral: Numeral) -> Result<Option<Record>> {
        let layout = stored_columns(entity);
        let exprs = layout
            .iter()
            .map(|column| column.expr)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT t.id, {exprs} FROM {} WHERE t.numeral = ?",
            source(entity)
        );
        let date_format = self.date_format;

        let record = self
            .conn
            .query_row(&sql, params![numeral.get()], |row| {
                let mut record = Record::blank(entity);
                record.id = Some(RecordId::new(row.get(0)?));
                for (index, column) in layout.iter().enumerate() {
                    let value = display_value(column.stored, row.get_ref(index + 1)?, date_format);
                    record.set(column.key, value);
                }
                Ok(record)
            })
            .optional()
            .with_context(|| format!("load {} {numeral}", entity.table()))?;

        let Some(mut record) = record else {
            return Ok(None);
        };
        if entity == Entity::Book {
            let codes = self.book_warehouse_codes(numeral)?;
            record.set(FieldKey::Warehouses, codes.join(", "));
        }
        Ok(Some(record))
    }

    fn book_warehouse_codes(&self, book: Numeral) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT w.code
                FROM book_warehouse bw
                JOIN warehouse w ON w.numeral = bw.warehouse_num
                WHERE bw.book_num = ?
                ORDER BY bw.id ASC
                ",
            )
            .context("prepare book warehouses query")?;
        let rows = stmt
            .query_map(params![book.get()], |row| row.get::<_, String>(0))
            .context("query book warehouses")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect book warehouses")
    }

    /// The numeral a new record gets. Deleted numerals are never handed out again.
    pub fn next_numeral(&self, entity: Entity) -> Result<Numeral> {
        let sql = format!(
            "
            SELECT MAX(
              COALESCE((SELECT last_numeral FROM numeral_seq WHERE table_name = ?1), 0),
              COALESCE((SELECT MAX(numeral) FROM {}), 0)
            ) + 1
            ",
            entity.table()
        );
        let next: i64 = self
            .conn
            .query_row(&sql, params![entity.table()], |row| row.get(0))
            .with_context(|| format!("compute next {} numeral", entity.table()))?;
        Ok(Numeral::new(next))
    }

    /// Values offered by a chooser popup.
    pub fn choices(&self, source: ChoiceSource) -> Result<Vec<String>> {
        if let Some(values) = source.fixed_values() {
            return Ok(values.iter().map(|value| (*value).to_owned()).collect());
        }
        let sql = match source {
            ChoiceSource::Authors => "SELECT name FROM author ORDER BY name COLLATE NOCASE ASC",
            ChoiceSource::Publishers => {
                "SELECT name FROM publisher ORDER BY name COLLATE NOCASE ASC"
            }
            ChoiceSource::Warehouses => "SELECT code FROM warehouse ORDER BY code ASC",
            ChoiceSource::Genres | ChoiceSource::CoverTypes => {
                return Err(anyhow!("fixed choice list {source:?} has no table"));
            }
        };
        let mut stmt = self.conn.prepare(sql).context("prepare choices query")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("query choices")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect choices")
    }

    /// Why a record cannot be deleted, when something still references it.
    pub fn delete_blocker(&self, entity: Entity, numeral: Numeral) -> Result<Option<&'static str>> {
        let (sql, reason) = match entity {
            Entity::Author => (
                "SELECT EXISTS(SELECT 1 FROM book_author WHERE author_num = ?)",
                "You cannot delete this author because (s)he is listed in a book.",
            ),
            Entity::Publisher => (
                "SELECT EXISTS(SELECT 1 FROM book WHERE publisher_num = ?)",
                "You cannot delete this publisher because it is referenced by a book.",
            ),
            Entity::Warehouse => (
                "SELECT EXISTS(SELECT 1 FROM book_warehouse WHERE warehouse_num = ?)",
                "You cannot delete this warehouse because it stocks a book.",
            ),
            Entity::Book | Entity::User => return Ok(None),
        };
        let referenced: i64 = self
            .conn
            .query_row(sql, params![numeral.get()], |row| row.get(0))
            .with_context(|| format!("check references to {} {numeral}", entity.table()))?;
        Ok((referenced == 1).then_some(reason))
    }

    pub fn count_rows(&self, entity: Entity) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", entity.table()),
                [],
                |row| row.get(0),
            )
            .with_context(|| format!("count {} rows", entity.table()))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn display_value(stored: Stored, value: ValueRef<'_>, date_format: DateFormat) -> String {
    match (stored, value) {
        (_, ValueRef::Null) => String::new(),
        (Stored::Cents, ValueRef::Integer(cents)) => format_price(cents),
        (Stored::Genre, ValueRef::Integer(index)) => genre_name(index).to_owned(),
        (Stored::CoverType, ValueRef::Integer(index)) => cover_type_name(index).to_owned(),
        (Stored::Timestamp, ValueRef::Text(raw)) => {
            let raw = String::from_utf8_lossy(raw);
            from_db_timestamp(&raw)
                .map(|date| date_format.format(date))
                .unwrap_or_else(|| raw.into_owned())
        }
        (_, ValueRef::Integer(number)) => number.to_string(),
        (_, ValueRef::Real(number)) => number.to_string(),
        (_, ValueRef::Text(raw)) => String::from_utf8_lossy(raw).into_owned(),
        (_, ValueRef::Blob(_)) => String::new(),
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("BOOKSTORE_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let app_dir = data_dir()?;
    Ok(app_dir.join("bookstore.db"))
}

/// Where book listings are written unless the config names a directory.
pub fn default_reports_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("reports"))
}

pub fn default_log_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

fn data_dir() -> Result<PathBuf> {
    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set BOOKSTORE_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir)
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

/// Stored form of a user password.
pub fn hash_password(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; use a bookstore database or migrate first"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; run migration before launching",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )
    .context("configure sqlite pragmas")?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        .context("set sqlite busy timeout")
}

#[cfg(test)]
mod tests {
    use super::{Store, grid_select, hash_password, validate_db_path};
    use anyhow::Result;
    use bookstore_app::{ChoiceSource, Entity};

    #[test]
    fn grid_select_exposes_grid_columns_in_order() {
        let sql = grid_select(Entity::User);
        assert!(sql.starts_with("SELECT t.id AS id, t.numeral AS numeral, t.login AS login"));
        assert!(sql.contains("t.user_level AS level"));
        assert!(sql.ends_with("FROM user t"));
    }

    #[test]
    fn book_grid_joins_publisher() {
        let sql = grid_select(Entity::Book);
        assert!(sql.contains("COALESCE(p.name, '') AS publisher"));
        assert!(sql.contains("LEFT JOIN publisher p"));
    }

    #[test]
    fn validate_db_path_allows_memory() {
        assert!(validate_db_path(":memory:").is_ok());
        assert!(validate_db_path("").is_err());
    }

    #[test]
    fn password_digest_is_lower_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn bootstrap_is_idempotent() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        store.bootstrap()?;
        assert_eq!(store.count_rows(Entity::Book)?, 0);
        Ok(())
    }

    #[test]
    fn fixed_choices_do_not_touch_the_database() -> Result<()> {
        let store = Store::open_memory()?;
        let genres = store.choices(ChoiceSource::Genres)?;
        assert_eq!(genres.len(), 5);
        assert_eq!(genres[0], "Narrative");
        Ok(())
    }
}
