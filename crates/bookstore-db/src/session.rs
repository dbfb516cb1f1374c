// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use bookstore_app::dates::to_db_timestamp;
use bookstore_app::money::parse_price;
use bookstore_app::{
    DeleteOutcome, Entity, FieldKey, FormMode, Numeral, Record, RecordId, SaveOptions,
    SaveOutcome, cover_type_index, genre_index,
};
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params, params_from_iter};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::{Store, hash_password};

const SAVEPOINT: &str = "record_write";

/// How long `begin_exclusive` keeps retrying a busy database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockPolicy {
    /// `None` retries until the lock is granted.
    pub max_attempts: Option<u32>,
}

/// Holds the exclusive write lock of the database until committed or dropped.
pub struct WriteSession<'a> {
    store: &'a Store,
    finished: bool,
}

impl Store {
    /// Takes the database write lock, retrying while another session holds it. Each busy
    /// attempt waits the connection's busy timeout, then calls `on_busy` with the attempt
    /// number.
    pub fn begin_exclusive(
        &self,
        policy: LockPolicy,
        mut on_busy: impl FnMut(u32),
    ) -> Result<WriteSession<'_>> {
        let mut attempt = 0u32;
        loop {
            match self.conn.execute_batch("BEGIN EXCLUSIVE") {
                Ok(()) => {
                    debug!(attempt, "exclusive lock acquired");
                    return Ok(WriteSession {
                        store: self,
                        finished: false,
                    });
                }
                Err(error) if is_busy(&error) => {
                    attempt += 1;
                    warn!(attempt, "database is locked by another session");
                    on_busy(attempt);
                    if policy.max_attempts.is_some_and(|max| attempt >= max) {
                        bail!(
                            "database stayed locked after {attempt} attempts; close other bookstore sessions and retry"
                        );
                    }
                }
                Err(error) => return Err(error).context("begin exclusive transaction"),
            }
        }
    }
}

impl WriteSession<'_> {
    pub fn store(&self) -> &Store {
        self.store
    }

    fn conn(&self) -> &Connection {
        &self.store.conn
    }

    pub fn next_numeral(&self, entity: Entity) -> Result<Numeral> {
        self.store.next_numeral(entity)
    }

    /// Writes a record from a Create or Update form. Everything the save touches is
    /// undone when the outcome is anything but `Saved`.
    pub fn save(
        &mut self,
        mode: FormMode,
        record: &Record,
        original_numeral: Option<Numeral>,
        options: SaveOptions,
    ) -> Result<SaveOutcome> {
        if !matches!(mode, FormMode::Create | FormMode::Update) {
            bail!("{} form does not write records", mode.label());
        }
        let entity = record.entity;

        self.conn()
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
            .context("open savepoint")?;
        let result = self.write_record(mode, record, original_numeral, options);

        match result {
            Ok(SaveOutcome::Saved { row, notices }) => {
                self.release_savepoint()?;
                info!(
                    table = entity.table(),
                    numeral = %row.numeral,
                    mode = mode.label(),
                    "record saved"
                );
                Ok(SaveOutcome::Saved { row, notices })
            }
            Ok(other) => {
                self.rollback_savepoint()?;
                Ok(other)
            }
            Err(error) if is_unique_violation(&error) => {
                self.rollback_savepoint()?;
                warn!(table = entity.table(), "save conflicts with an existing record");
                Ok(SaveOutcome::Conflict(conflict_message(entity).to_owned()))
            }
            Err(error) => {
                self.rollback_savepoint()?;
                Err(error)
            }
        }
    }

    /// Deletes a record unless something still references it. Books take their
    /// author and warehouse links with them.
    pub fn delete(&mut self, entity: Entity, numeral: Numeral) -> Result<DeleteOutcome> {
        if let Some(reason) = self.store.delete_blocker(entity, numeral)? {
            return Ok(DeleteOutcome::Blocked(reason));
        }
        let id = self
            .record_id(entity, numeral)?
            .ok_or_else(|| anyhow!("{} {numeral} not found -- reload the grid and retry", entity.table()))?;

        let conn = self.conn();
        if entity == Entity::Book {
            conn.execute(
                "DELETE FROM book_author WHERE book_num = ?",
                params![numeral.get()],
            )
            .context("delete book author links")?;
            conn.execute(
                "DELETE FROM book_warehouse WHERE book_num = ?",
                params![numeral.get()],
            )
            .context("delete book warehouse links")?;
        }
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?", entity.table()),
            params![id.get()],
        )
        .with_context(|| format!("delete {} {numeral}", entity.table()))?;

        info!(table = entity.table(), %numeral, "record deleted");
        Ok(DeleteOutcome::Deleted(id))
    }

    /// A failed COMMIT leaves the transaction open; dropping `self` then rolls it back.
    pub fn commit(mut self) -> Result<()> {
        self.conn()
            .execute_batch("COMMIT")
            .context("commit write session")?;
        self.finished = true;
        Ok(())
    }

    fn release_savepoint(&self) -> Result<()> {
        self.conn()
            .execute_batch(&format!("RELEASE {SAVEPOINT}"))
            .context("release savepoint")
    }

    fn rollback_savepoint(&self) -> Result<()> {
        self.conn()
            .execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT}"))
            .context("roll back savepoint")
    }

    fn record_id(&self, entity: Entity, numeral: Numeral) -> Result<Option<RecordId>> {
        let id = self
            .conn()
            .query_row(
                &format!("SELECT id FROM {} WHERE numeral = ?", entity.table()),
                params![numeral.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .with_context(|| format!("look up {} {numeral}", entity.table()))?;
        Ok(id.map(RecordId::new))
    }

    fn write_record(
        &self,
        mode: FormMode,
        record: &Record,
        original_numeral: Option<Numeral>,
        options: SaveOptions,
    ) -> Result<SaveOutcome> {
        let entity = record.entity;
        let numeral = record
            .numeral()
            .ok_or_else(|| anyhow!("{} record has no valid numeral", entity.table()))?;
        let id = match mode {
            FormMode::Create => None,
            _ => Some(
                record
                    .id
                    .ok_or_else(|| anyhow!("{} {numeral} has no id to update", entity.table()))?,
            ),
        };
        let renamed_from = original_numeral.filter(|original| *original != numeral && id.is_some());
        let mut notices = Vec::new();

        let book = if entity == Entity::Book {
            match self.resolve_book_links(record, options, &mut notices)? {
                Ok(links) => Some(links),
                Err(outcome) => return Ok(outcome),
            }
        } else {
            None
        };

        if let Some(old) = renamed_from {
            self.renumber_references(entity, old, numeral)?;
        }

        let columns = self.encode(record, numeral, book.as_ref())?;
        let id = self.write_row(entity, id, &columns)?;
        if let Some(links) = &book {
            self.write_book_links(numeral, links)?;
        }
        self.record_numeral(entity, numeral)?;

        let row = self
            .store
            .grid_row(entity, id)?
            .ok_or_else(|| anyhow!("{} {numeral} vanished after save", entity.table()))?;
        Ok(SaveOutcome::Saved { row, notices })
    }

    fn resolve_book_links(
        &self,
        record: &Record,
        options: SaveOptions,
        notices: &mut Vec<String>,
    ) -> Result<Result<BookLinks, SaveOutcome>> {
        let author_name = record.get(FieldKey::Author).trim();
        let author = match self.lookup_numeral("SELECT numeral FROM author WHERE name = ?", author_name)? {
            Some(numeral) => numeral,
            None if options.create_missing_author => {
                notices.push(
                    "A new author was created. Remember to fulfill all the data in its file."
                        .to_owned(),
                );
                self.insert_stub(Entity::Author, "name", author_name)?
            }
            None => return Ok(Err(SaveOutcome::MissingAuthor(author_name.to_owned()))),
        };

        let publisher_name = record.get(FieldKey::Publisher).trim();
        let publisher = match self.lookup_numeral(
            "SELECT numeral FROM publisher WHERE name = ? COLLATE NOCASE",
            publisher_name,
        )? {
            Some(numeral) => numeral,
            None if options.create_missing_publisher => {
                notices.push(
                    "A new publisher was created. Remember to fulfill all the data in its file."
                        .to_owned(),
                );
                self.insert_stub(Entity::Publisher, "name", publisher_name)?
            }
            None => return Ok(Err(SaveOutcome::MissingPublisher(publisher_name.to_owned()))),
        };

        let mut warehouses = Vec::new();
        for code in record.warehouse_codes() {
            match self.lookup_numeral("SELECT numeral FROM warehouse WHERE code = ?", &code)? {
                Some(numeral) => warehouses.push(numeral),
                None => {
                    return Ok(Err(SaveOutcome::Rejected(format!(
                        "Warehouse '{code}' was not found. Create it beforehand."
                    ))));
                }
            }
        }

        Ok(Ok(BookLinks {
            author,
            publisher,
            warehouses,
        }))
    }

    fn lookup_numeral(&self, sql: &str, value: &str) -> Result<Option<Numeral>> {
        let numeral = self
            .conn()
            .query_row(sql, params![value], |row| row.get::<_, i64>(0))
            .optional()
            .with_context(|| format!("look up {value:?}"))?;
        Ok(numeral.map(Numeral::new))
    }

    /// Inserts a record holding only its numeral and name.
    fn insert_stub(&self, entity: Entity, column: &str, value: &str) -> Result<Numeral> {
        let numeral = self.store.next_numeral(entity)?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO {} (numeral, {column}) VALUES (?, ?)",
                    entity.table()
                ),
                params![numeral.get(), value],
            )
            .with_context(|| format!("insert new {} {value:?}", entity.table()))?;
        self.record_numeral(entity, numeral)?;
        info!(table = entity.table(), %numeral, "created referenced record");
        Ok(numeral)
    }

    fn renumber_references(&self, entity: Entity, old: Numeral, new: Numeral) -> Result<()> {
        let updates: &[&str] = match entity {
            Entity::Book => &[
                "UPDATE book_author SET book_num = ?1 WHERE book_num = ?2",
                "UPDATE book_warehouse SET book_num = ?1 WHERE book_num = ?2",
            ],
            Entity::Author => &["UPDATE book_author SET author_num = ?1 WHERE author_num = ?2"],
            Entity::Publisher => &["UPDATE book SET publisher_num = ?1 WHERE publisher_num = ?2"],
            Entity::Warehouse => {
                &["UPDATE book_warehouse SET warehouse_num = ?1 WHERE warehouse_num = ?2"]
            }
            Entity::User => &[],
        };
        for sql in updates {
            self.conn()
                .execute(sql, params![new.get(), old.get()])
                .with_context(|| format!("renumber {} {old} to {new}", entity.table()))?;
        }
        debug!(table = entity.table(), %old, %new, "renumbered references");
        Ok(())
    }

    /// Stored column values of a record, converted from their on-screen text.
    fn encode(
        &self,
        record: &Record,
        numeral: Numeral,
        book: Option<&BookLinks>,
    ) -> Result<Vec<(&'static str, Value)>> {
        let text = |key: FieldKey| Value::Text(record.get(key).trim().to_owned());
        let numeral = ("numeral", Value::Integer(numeral.get()));

        let columns = match record.entity {
            Entity::Book => {
                let links = book.ok_or_else(|| anyhow!("book links were not resolved"))?;
                vec![
                    numeral,
                    ("book_title", text(FieldKey::Title)),
                    ("original_title", text(FieldKey::OriginalTitle)),
                    ("description", text(FieldKey::Description)),
                    ("isbn", text(FieldKey::Isbn)),
                    ("year", Value::Integer(self.integer(record, FieldKey::Year)?)),
                    ("publisher_num", Value::Integer(links.publisher.get())),
                    ("creation_date", Value::Text(self.timestamp(record)?)),
                    (
                        "genre_id",
                        Value::Integer(
                            genre_index(record.get(FieldKey::Genre))
                                .ok_or_else(|| anyhow!("unknown genre {:?}", record.get(FieldKey::Genre)))?,
                        ),
                    ),
                    (
                        "cover_type",
                        Value::Integer(cover_type_index(record.get(FieldKey::CoverType)).ok_or_else(
                            || anyhow!("unknown cover type {:?}", record.get(FieldKey::CoverType)),
                        )?),
                    ),
                    (
                        "price_cents",
                        Value::Integer(
                            parse_price(record.get(FieldKey::Price))
                                .map_err(|error| anyhow!("{error}"))?,
                        ),
                    ),
                ]
            }
            Entity::Author => vec![
                numeral,
                ("name", text(FieldKey::Name)),
                ("address", text(FieldKey::Address)),
                ("bio", text(FieldKey::Bio)),
                ("url", text(FieldKey::Url)),
            ],
            Entity::Publisher => vec![
                numeral,
                ("name", text(FieldKey::Name)),
                ("address", text(FieldKey::Address)),
                ("phone", text(FieldKey::Phone)),
                ("url", text(FieldKey::Url)),
            ],
            Entity::Warehouse => vec![
                numeral,
                ("code", text(FieldKey::Code)),
                ("address", text(FieldKey::Address)),
                ("phone", text(FieldKey::Phone)),
            ],
            Entity::User => {
                let mut columns = vec![
                    numeral,
                    ("login", text(FieldKey::Login)),
                    ("user_name", text(FieldKey::UserName)),
                    ("user_level", Value::Integer(self.integer(record, FieldKey::Level)?)),
                    ("creation_date", Value::Text(self.timestamp(record)?)),
                ];
                // An empty password on Update keeps the stored digest.
                let password = record.get(FieldKey::Password).trim();
                if !password.is_empty() {
                    columns.push(("password", Value::Text(hash_password(password))));
                } else if record.id.is_none() {
                    bail!("a new user needs a password");
                }
                columns
            }
        };
        Ok(columns)
    }

    fn integer(&self, record: &Record, key: FieldKey) -> Result<i64> {
        let raw = record.get(key).trim();
        raw.parse::<i64>()
            .with_context(|| format!("{key:?} value {raw:?} is not an integer"))
    }

    fn timestamp(&self, record: &Record) -> Result<String> {
        let date = self
            .store
            .date_format
            .parse(record.get(FieldKey::CreationDate))
            .map_err(|error| anyhow!("{error}"))?;
        Ok(to_db_timestamp(date))
    }

    fn write_row(
        &self,
        entity: Entity,
        id: Option<RecordId>,
        columns: &[(&'static str, Value)],
    ) -> Result<RecordId> {
        let names = columns.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        let values = columns.iter().map(|(_, value)| value);

        match id {
            None => {
                let marks = vec!["?"; names.len()].join(", ");
                self.conn()
                    .execute(
                        &format!(
                            "INSERT INTO {} ({}) VALUES ({marks})",
                            entity.table(),
                            names.join(", ")
                        ),
                        params_from_iter(values),
                    )
                    .with_context(|| format!("insert {}", entity.table()))?;
                Ok(RecordId::new(self.conn().last_insert_rowid()))
            }
            Some(id) => {
                let assignments = names
                    .iter()
                    .map(|name| format!("{name} = ?"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let id_value = Value::Integer(id.get());
                let rows_affected = self
                    .conn()
                    .execute(
                        &format!("UPDATE {} SET {assignments} WHERE id = ?", entity.table()),
                        params_from_iter(values.chain(std::iter::once(&id_value))),
                    )
                    .with_context(|| format!("update {} {id}", entity.table()))?;
                if rows_affected == 0 {
                    bail!(
                        "{} {id} not found -- reload the grid and retry",
                        entity.table()
                    );
                }
                Ok(id)
            }
        }
    }

    /// Points the book at its main author and brings its warehouse links in line with
    /// the form, inserting new codes and dropping removed ones.
    fn write_book_links(&self, book: Numeral, links: &BookLinks) -> Result<()> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE book_author SET author_num = ? WHERE book_num = ? AND is_main_author = 1",
                params![links.author.get(), book.get()],
            )
            .context("update book author")?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO book_author (book_num, author_num, is_main_author) VALUES (?, ?, 1)",
                params![book.get(), links.author.get()],
            )
            .context("insert book author")?;
        }

        let existing = {
            let mut stmt = conn
                .prepare("SELECT warehouse_num FROM book_warehouse WHERE book_num = ?")
                .context("prepare book warehouses query")?;
            let rows = stmt
                .query_map(params![book.get()], |row| row.get::<_, i64>(0))
                .context("query book warehouses")?;
            rows.collect::<rusqlite::Result<BTreeSet<_>>>()
                .context("collect book warehouses")?
        };
        let wanted = links
            .warehouses
            .iter()
            .map(|numeral| numeral.get())
            .collect::<BTreeSet<_>>();

        for warehouse in wanted.difference(&existing) {
            conn.execute(
                "INSERT INTO book_warehouse (book_num, warehouse_num) VALUES (?, ?)",
                params![book.get(), warehouse],
            )
            .context("insert book warehouse")?;
        }
        for warehouse in existing.difference(&wanted) {
            conn.execute(
                "DELETE FROM book_warehouse WHERE book_num = ? AND warehouse_num = ?",
                params![book.get(), warehouse],
            )
            .context("delete book warehouse")?;
        }
        Ok(())
    }

    fn record_numeral(&self, entity: Entity, numeral: Numeral) -> Result<()> {
        self.conn()
            .execute(
                "
                INSERT INTO numeral_seq (table_name, last_numeral) VALUES (?1, ?2)
                ON CONFLICT(table_name)
                DO UPDATE SET last_numeral = MAX(last_numeral, excluded.last_numeral)
                ",
                params![entity.table(), numeral.get()],
            )
            .with_context(|| format!("record {} numeral {numeral}", entity.table()))?;
        Ok(())
    }
}

impl Drop for WriteSession<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(error) = self.store.conn.execute_batch("ROLLBACK") {
            warn!(%error, "roll back abandoned write session");
        } else {
            debug!("write session rolled back");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BookLinks {
    author: Numeral,
    publisher: Numeral,
    warehouses: Vec<Numeral>,
}

fn conflict_message(entity: Entity) -> &'static str {
    match entity {
        Entity::Book => "Numeral or ISBN/SKU of book already exists.",
        Entity::Author => "Numeral or name of author already exists.",
        Entity::Publisher => "Numeral or name of publisher already exists.",
        Entity::Warehouse => "Numeral or code of warehouse already exists.",
        Entity::User => "Numeral or user already exists.",
    }
}

pub(crate) fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn is_unique_violation(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(failure, _))
                if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    })
}

#[cfg(test)]
mod tests {
    use super::{LockPolicy, conflict_message, is_busy};
    use crate::Store;
    use anyhow::Result;
    use bookstore_app::Entity;
    use rusqlite::ffi;

    #[test]
    fn failed_commit_rolls_back_and_frees_the_connection() -> Result<()> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        store.raw_connection().execute_batch(
            "
            PRAGMA foreign_keys = ON;
            CREATE TABLE shelf (id INTEGER PRIMARY KEY);
            CREATE TABLE slot (
              shelf_id INTEGER REFERENCES shelf (id) DEFERRABLE INITIALLY DEFERRED
            );
            ",
        )?;

        let session = store.begin_exclusive(LockPolicy::default(), |_| {})?;
        store
            .raw_connection()
            .execute("INSERT INTO slot (shelf_id) VALUES (7)", [])?;
        let error = session
            .commit()
            .expect_err("deferred foreign key should fail the commit");
        assert!(format!("{error:#}").contains("FOREIGN KEY"));
        assert!(store.raw_connection().is_autocommit());

        let retry = store.begin_exclusive(LockPolicy::default(), |_| {})?;
        let slots: i64 = store
            .raw_connection()
            .query_row("SELECT COUNT(*) FROM slot", [], |row| row.get(0))?;
        assert_eq!(slots, 0);
        retry.commit()?;
        Ok(())
    }

    #[test]
    fn busy_and_locked_codes_are_retryable() {
        let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        let locked = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_LOCKED), None);
        let readonly = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_READONLY), None);
        assert!(is_busy(&busy));
        assert!(is_busy(&locked));
        assert!(!is_busy(&readonly));
    }

    #[test]
    fn conflict_messages_name_the_unique_field() {
        assert_eq!(
            conflict_message(Entity::Author),
            "Numeral or name of author already exists."
        );
        assert_eq!(conflict_message(Entity::User), "Numeral or user already exists.");
    }
}
