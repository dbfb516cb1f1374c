// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use tracing::info;

use crate::WriteSession;

/// What an integrity pass found. Missing references are only reported; duplicate
/// join rows are deleted and counted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub findings: Vec<String>,
    pub removed_duplicates: usize,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.removed_duplicates == 0
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.findings.clone();
        if self.is_clean() {
            lines.push("No problems found.".to_owned());
        }
        lines.push(format!(
            "Duplicated links removed: {}",
            self.removed_duplicates
        ));
        lines.push("Database integrity check finished.".to_owned());
        lines
    }
}

impl WriteSession<'_> {
    pub fn check_integrity(&mut self) -> Result<IntegrityReport> {
        let conn = &self.store().conn;
        let mut report = IntegrityReport::default();

        check_books(conn, &mut report)?;
        check_links(
            conn,
            "SELECT id, book_num, author_num FROM book_author ORDER BY id ASC",
            "author",
            "book_author",
            &mut report,
        )?;
        check_links(
            conn,
            "SELECT id, book_num, warehouse_num FROM book_warehouse ORDER BY id ASC",
            "warehouse",
            "book_warehouse",
            &mut report,
        )?;
        remove_duplicates(
            conn,
            "SELECT id, book_num, 0 FROM book_author ORDER BY book_num ASC, id ASC",
            "book_author",
            &mut report,
        )?;
        remove_duplicates(
            conn,
            "SELECT id, book_num, warehouse_num FROM book_warehouse ORDER BY book_num ASC, warehouse_num ASC, id ASC",
            "book_warehouse",
            &mut report,
        )?;

        info!(
            findings = report.findings.len(),
            removed = report.removed_duplicates,
            "integrity check finished"
        );
        Ok(report)
    }
}

fn check_books(conn: &Connection, report: &mut IntegrityReport) -> Result<()> {
    let books = {
        let mut stmt = conn
            .prepare("SELECT numeral, publisher_num FROM book ORDER BY id ASC")
            .context("prepare books query")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .context("query books")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect books")?
    };

    for (book, publisher) in books {
        let authors = numbers(conn, "SELECT author_num FROM book_author WHERE book_num = ?", book)?;
        if authors.is_empty() {
            report
                .findings
                .push(format!("Book with numeral {book} has no assigned author."));
        }
        for author in authors {
            if !exists(conn, "author", author)? {
                report
                    .findings
                    .push(format!("Author of book with numeral {book} was not found."));
            }
        }
        if !exists(conn, "publisher", publisher)? {
            report
                .findings
                .push(format!("Publisher of book with numeral {book} was not found."));
        }

        let warehouses = numbers(
            conn,
            "SELECT warehouse_num FROM book_warehouse WHERE book_num = ?",
            book,
        )?;
        if warehouses.is_empty() {
            report
                .findings
                .push(format!("Book with numeral {book} has no assigned warehouse."));
        }
        for warehouse in warehouses {
            if !exists(conn, "warehouse", warehouse)? {
                report
                    .findings
                    .push(format!("Warehouse of book with numeral {book} was not found."));
            }
        }
    }
    Ok(())
}

fn check_links(
    conn: &Connection,
    sql: &str,
    target: &str,
    table: &str,
    report: &mut IntegrityReport,
) -> Result<()> {
    for (id, book, other) in triples(conn, sql)? {
        if !exists(conn, "book", book)? {
            report
                .findings
                .push(format!("Book in {table} with id={id} was not found."));
        }
        if !exists(conn, target, other)? {
            let label = capitalized(target);
            report
                .findings
                .push(format!("{label} in {table} with id={id} was not found."));
        }
    }
    Ok(())
}

/// Deletes every row after the first of each group of equal keys. Rows must come
/// ordered by key.
fn remove_duplicates(
    conn: &Connection,
    sql: &str,
    table: &str,
    report: &mut IntegrityReport,
) -> Result<()> {
    let mut last_key = None;
    for (id, book, other) in triples(conn, sql)? {
        let key = (book, other);
        if last_key == Some(key) {
            conn.execute(&format!("DELETE FROM {table} WHERE id = ?"), params![id])
                .with_context(|| format!("delete duplicate {table} row {id}"))?;
            report.findings.push(format!(
                "Book in {table} with id={id} is duplicated. (Duplicated record was deleted)"
            ));
            report.removed_duplicates += 1;
            continue;
        }
        last_key = Some(key);
    }
    Ok(())
}

fn triples(conn: &Connection, sql: &str) -> Result<Vec<(i64, i64, i64)>> {
    let mut stmt = conn.prepare(sql).context("prepare link query")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .context("query links")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect links")
}

fn numbers(conn: &Connection, sql: &str, key: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(sql).context("prepare numeral query")?;
    let rows = stmt
        .query_map(params![key], |row| row.get::<_, i64>(0))
        .context("query numerals")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("collect numerals")
}

fn exists(conn: &Connection, table: &str, numeral: i64) -> Result<bool> {
    let found: i64 = conn
        .prepare_cached(&format!(
            "SELECT EXISTS(SELECT 1 FROM {table} WHERE numeral = ?)"
        ))
        .and_then(|mut stmt| stmt.query_row(params![numeral], |row| row.get(0)))
        .with_context(|| format!("check {table} {numeral}"))?;
    Ok(found == 1)
}

fn capitalized(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::{IntegrityReport, capitalized};

    #[test]
    fn clean_report_says_so() {
        let report = IntegrityReport::default();
        assert!(report.is_clean());
        assert_eq!(report.lines()[0], "No problems found.");
    }

    #[test]
    fn capitalized_handles_ascii_words() {
        assert_eq!(capitalized("warehouse"), "Warehouse");
        assert_eq!(capitalized(""), "");
    }
}
