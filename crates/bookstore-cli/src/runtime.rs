// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use bookstore_app::{
    ChoiceSource, DeleteOutcome, Entity, FindQuery, FormMode, GridRow, ListingOrder,
    ListingRequest, Numeral, Record, SaveOptions, SaveOutcome,
};
use bookstore_db::{LockPolicy, Store, WriteSession, write_listing_report};
use bookstore_tui::WriteLock;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Connects the screens to one open database. At most one write session is held.
pub struct DbRuntime<'a> {
    store: &'a Store,
    session: Option<WriteSession<'a>>,
    reports_dir: PathBuf,
    lock_attempts: Option<u32>,
    busy_count: u32,
    currency_symbol: String,
}

impl<'a> DbRuntime<'a> {
    pub fn new(store: &'a Store, reports_dir: PathBuf) -> Self {
        Self {
            store,
            session: None,
            reports_dir,
            lock_attempts: None,
            busy_count: 0,
            currency_symbol: "€".to_owned(),
        }
    }

    /// Gives up on a busy database after this many tries; `None` waits forever.
    pub fn with_lock_attempts(mut self, lock_attempts: Option<u32>) -> Self {
        self.lock_attempts = lock_attempts;
        self
    }

    pub fn with_currency_symbol(mut self, symbol: &str) -> Self {
        self.currency_symbol = symbol.to_owned();
        self
    }

    fn session(&mut self) -> Result<&mut WriteSession<'a>> {
        self.session
            .as_mut()
            .ok_or_else(|| anyhow!("no write session is open; reopen the form"))
    }
}

impl bookstore_tui::AppRuntime for DbRuntime<'_> {
    fn load_full_set(&mut self, entity: Entity) -> Result<Vec<GridRow>> {
        let rows = self.store.list_rows(entity)?;
        debug!(table = entity.table(), rows = rows.len(), "full set loaded");
        Ok(rows)
    }

    fn find_rows(&mut self, query: &FindQuery) -> Result<Vec<GridRow>> {
        self.store.find_rows(query)
    }

    fn read_record(&mut self, entity: Entity, numeral: Numeral) -> Result<Option<Record>> {
        self.store.read_record(entity, numeral)
    }

    fn choices(&mut self, source: ChoiceSource) -> Result<Vec<String>> {
        self.store.choices(source)
    }

    fn delete_blocker(&mut self, entity: Entity, numeral: Numeral) -> Result<Option<String>> {
        Ok(self
            .store
            .delete_blocker(entity, numeral)?
            .map(str::to_owned))
    }

    /// One lock attempt per call; the caller retries on the next tick while busy.
    fn begin_write(&mut self) -> Result<WriteLock> {
        if self.session.is_some() {
            bail!("a write session is already open");
        }

        let mut busy = false;
        let attempt = self.store.begin_exclusive(
            LockPolicy {
                max_attempts: Some(1),
            },
            |_| busy = true,
        );
        match attempt {
            Ok(session) => {
                self.session = Some(session);
                self.busy_count = 0;
                Ok(WriteLock::Granted)
            }
            Err(_) if busy => {
                self.busy_count += 1;
                if let Some(limit) = self.lock_attempts
                    && self.busy_count >= limit
                {
                    let tries = self.busy_count;
                    self.busy_count = 0;
                    bail!(
                        "database stayed locked after {tries} attempts; close other bookstore sessions and retry"
                    );
                }
                Ok(WriteLock::Busy)
            }
            Err(error) => Err(error),
        }
    }

    fn next_numeral(&mut self, entity: Entity) -> Result<Numeral> {
        match self.session.as_ref() {
            Some(session) => session.next_numeral(entity),
            None => self.store.next_numeral(entity),
        }
    }

    fn save_record(
        &mut self,
        mode: FormMode,
        record: &Record,
        original_numeral: Option<Numeral>,
        options: SaveOptions,
    ) -> Result<SaveOutcome> {
        self.session()?.save(mode, record, original_numeral, options)
    }

    fn delete_record(&mut self, entity: Entity, numeral: Numeral) -> Result<DeleteOutcome> {
        self.session()?.delete(entity, numeral)
    }

    fn end_write(&mut self, commit: bool) -> Result<()> {
        let Some(session) = self.session.take() else {
            warn!("write session was already closed");
            return Ok(());
        };
        if commit {
            session.commit()
        } else {
            // Dropping the guard rolls back.
            drop(session);
            Ok(())
        }
    }

    fn check_integrity(&mut self) -> Result<Vec<String>> {
        Ok(self.session()?.check_integrity()?.lines())
    }

    fn write_listing(&mut self, request: &ListingRequest, order: ListingOrder) -> Result<PathBuf> {
        let rows = self
            .store
            .book_listing(request, order)
            .context("query book listing")?;
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        write_listing_report(&self.reports_dir, &rows, now)
    }

    fn currency_symbol(&self) -> &str {
        &self.currency_symbol
    }
}

#[cfg(test)]
mod tests {
    use super::DbRuntime;
    use anyhow::Result;
    use bookstore_app::{
        Entity, FieldKey, FormMode, ListingOrder, ListingRequest, Numeral, Record, SaveOptions,
        SaveOutcome,
    };
    use bookstore_db::{LockPolicy, Store};
    use bookstore_testkit::temp_db_path;
    use bookstore_tui::{AppRuntime, WriteLock};
    use std::time::Duration;

    fn bootstrapped() -> Result<Store> {
        let store = Store::open_memory()?;
        store.bootstrap()?;
        Ok(store)
    }

    fn author(numeral: i64, name: &str) -> Record {
        Record::blank(Entity::Author)
            .with(FieldKey::Numeral, numeral.to_string())
            .with(FieldKey::Name, name)
    }

    #[test]
    fn committed_save_shows_in_full_set() -> Result<()> {
        let store = bootstrapped()?;
        let temp = tempfile::tempdir()?;
        let mut runtime = DbRuntime::new(&store, temp.path().to_path_buf());

        assert_eq!(runtime.begin_write()?, WriteLock::Granted);
        let next = runtime.next_numeral(Entity::Author)?;
        assert_eq!(next, Numeral::new(1));
        let outcome = runtime.save_record(
            FormMode::Create,
            &author(1, "Leopoldo Alas"),
            None,
            SaveOptions::default(),
        )?;
        assert!(matches!(outcome, SaveOutcome::Saved { .. }));
        runtime.end_write(true)?;

        let rows = runtime.load_full_set(Entity::Author)?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cell(1), "Leopoldo Alas");
        Ok(())
    }

    #[test]
    fn abandoned_write_rolls_back() -> Result<()> {
        let store = bootstrapped()?;
        let temp = tempfile::tempdir()?;
        let mut runtime = DbRuntime::new(&store, temp.path().to_path_buf());

        runtime.begin_write()?;
        runtime.save_record(
            FormMode::Create,
            &author(1, "Leopoldo Alas"),
            None,
            SaveOptions::default(),
        )?;
        runtime.end_write(false)?;

        assert!(runtime.load_full_set(Entity::Author)?.is_empty());
        Ok(())
    }

    #[test]
    fn save_without_lock_is_an_error() -> Result<()> {
        let store = bootstrapped()?;
        let temp = tempfile::tempdir()?;
        let mut runtime = DbRuntime::new(&store, temp.path().to_path_buf());

        let error = runtime
            .save_record(
                FormMode::Create,
                &author(1, "Leopoldo Alas"),
                None,
                SaveOptions::default(),
            )
            .expect_err("save outside a write session should fail");
        assert!(error.to_string().contains("no write session is open"));
        Ok(())
    }

    #[test]
    fn busy_database_reports_busy_then_gives_up_at_the_limit() -> Result<()> {
        let (_dir, path) = temp_db_path()?;
        let holder = Store::open(&path)?;
        holder.bootstrap()?;
        let waiter = Store::open(&path)?;
        waiter.set_busy_timeout(Duration::from_millis(20))?;
        let temp = tempfile::tempdir()?;
        let mut runtime =
            DbRuntime::new(&waiter, temp.path().to_path_buf()).with_lock_attempts(Some(2));

        let held = holder.begin_exclusive(LockPolicy::default(), |_| {})?;
        assert_eq!(runtime.begin_write()?, WriteLock::Busy);
        let error = runtime
            .begin_write()
            .expect_err("second busy attempt reaches the limit");
        assert!(error.to_string().contains("stayed locked after 2 attempts"));

        held.commit()?;
        assert_eq!(runtime.begin_write()?, WriteLock::Granted);
        runtime.end_write(false)?;
        Ok(())
    }

    #[test]
    fn blocked_author_delete_explains_why() -> Result<()> {
        let store = bootstrapped()?;
        let temp = tempfile::tempdir()?;
        let mut runtime = DbRuntime::new(&store, temp.path().to_path_buf());
        store.raw_connection().execute_batch(
            "
            INSERT INTO author (numeral, name) VALUES (1, 'Rosalía de Castro');
            INSERT INTO book_author (book_num, author_num, is_main_author) VALUES (1, 1, 1);
            ",
        )?;

        let blocker = runtime.delete_blocker(Entity::Author, Numeral::new(1))?;
        assert_eq!(
            blocker.as_deref(),
            Some("You cannot delete this author because (s)he is listed in a book.")
        );
        Ok(())
    }

    #[test]
    fn integrity_report_runs_inside_the_write_session() -> Result<()> {
        let store = bootstrapped()?;
        let temp = tempfile::tempdir()?;
        let mut runtime = DbRuntime::new(&store, temp.path().to_path_buf());

        assert!(runtime.check_integrity().is_err());
        runtime.begin_write()?;
        let lines = runtime.check_integrity()?;
        runtime.end_write(true)?;
        assert_eq!(lines.last().map(String::as_str), Some("Database integrity check finished."));
        Ok(())
    }

    #[test]
    fn listing_is_written_to_the_reports_dir() -> Result<()> {
        let store = bootstrapped()?;
        let temp = tempfile::tempdir()?;
        let reports = temp.path().join("reports");
        let mut runtime = DbRuntime::new(&store, reports.clone());

        let path = runtime.write_listing(&ListingRequest::default(), ListingOrder::Title)?;
        assert!(path.starts_with(&reports));
        let report = std::fs::read_to_string(&path)?;
        assert!(report.starts_with("Book title"));
        Ok(())
    }

    #[test]
    fn currency_symbol_is_configurable() -> Result<()> {
        let store = bootstrapped()?;
        let runtime = DbRuntime::new(&store, std::env::temp_dir()).with_currency_symbol("$");
        assert_eq!(runtime.currency_symbol(), "$");
        Ok(())
    }
}
