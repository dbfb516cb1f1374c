// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use bookstore_app::{BoundFilter, BoundSql, FilterBackend, ListingOrder, ListingRequest, genre_name};
use rusqlite::params_from_iter;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, info};

use crate::Store;

const LISTING_COLUMNS: [(&str, usize); 6] = [
    ("Book title", 34),
    ("Author", 26),
    ("Year", 6),
    ("Publisher", 24),
    ("Warehouse", 24),
    ("Genre", 11),
];

const RULE_WIDTH: usize = 125;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRow {
    pub title: String,
    pub author: String,
    pub year: i64,
    pub publisher: String,
    /// Comma-joined codes; `None` when the book is stocked nowhere.
    pub warehouses: Option<String>,
    pub genre: String,
}

impl ListingRow {
    fn sort_key(&self, order: ListingOrder) -> Vec<String> {
        let title = self.title.to_lowercase();
        let publisher = self.publisher.to_lowercase();
        match order {
            ListingOrder::Title => vec![title, publisher],
            ListingOrder::AuthorTitle => vec![self.author.to_lowercase(), title, publisher],
            ListingOrder::PublisherTitle => vec![publisher, title],
            ListingOrder::GenreTitle => vec![self.genre.to_lowercase(), title, publisher],
            ListingOrder::WarehouseTitle => vec![
                self.warehouses.as_deref().unwrap_or("None").to_lowercase(),
                title,
                publisher,
            ],
        }
    }

    fn cells(&self) -> [String; 6] {
        [
            self.title.clone(),
            self.author.clone(),
            self.year.to_string(),
            self.publisher.clone(),
            self.warehouses.clone().unwrap_or_default(),
            self.genre.clone(),
        ]
    }
}

impl Store {
    /// Books matching every filter of a validated listing request, merged and sorted
    /// for the report.
    pub fn book_listing(
        &self,
        request: &ListingRequest,
        order: ListingOrder,
    ) -> Result<Vec<ListingRow>> {
        let mut warehouse = BoundSql.compile("w.code", &request.warehouse);
        if request.admits_unstocked() {
            warehouse = warehouse.admit_null("w.code");
        }
        let filters: [BoundFilter; 5] = [
            BoundSql.compile("t.book_title", &request.book),
            BoundSql.compile("a.name", &request.author),
            BoundSql.compile("p.name", &request.publisher),
            BoundSql.compile("t.genre_id", &request.genre),
            warehouse,
        ];
        let condition = filters
            .iter()
            .map(|filter| filter.sql.as_str())
            .collect::<Vec<_>>()
            .join(" AND ");
        let values = filters
            .iter()
            .flat_map(|filter| filter.params.iter())
            .collect::<Vec<_>>();

        let sql = format!(
            "
            SELECT t.book_title, a.name, t.year, p.name, w.code, t.genre_id
            FROM book t
            JOIN book_author ba ON ba.book_num = t.numeral
            JOIN author a ON a.numeral = ba.author_num
            JOIN publisher p ON p.numeral = t.publisher_num
            LEFT JOIN book_warehouse bw ON bw.book_num = t.numeral
            LEFT JOIN warehouse w ON w.numeral = bw.warehouse_num
            WHERE {condition}
            GROUP BY t.book_title, p.name, w.code
            ORDER BY t.book_title ASC, p.name ASC, w.code ASC
            "
        );
        debug!(%sql, "book listing query");

        let mut stmt = self.conn.prepare(&sql).context("prepare book listing query")?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok(ListingRow {
                    title: row.get(0)?,
                    author: row.get(1)?,
                    year: row.get(2)?,
                    publisher: row.get(3)?,
                    warehouses: row.get(4)?,
                    genre: genre_name(row.get(5)?).to_owned(),
                })
            })
            .context("query book listing")?;
        let rows = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("collect book listing")?;

        let mut rows = if order.merges_warehouses() {
            merge_warehouses(rows)
        } else {
            rows
        };
        rows.sort_by_cached_key(|row| row.sort_key(order));
        Ok(rows)
    }
}

/// Folds the rows of one book in several warehouses into a single row.
fn merge_warehouses(rows: Vec<ListingRow>) -> Vec<ListingRow> {
    let mut merged: Vec<ListingRow> = Vec::with_capacity(rows.len());
    let mut positions = BTreeMap::new();
    for row in rows {
        let key = (row.title.clone(), row.author.clone(), row.publisher.clone());
        match positions.get(&key) {
            Some(&index) => {
                let target: &mut ListingRow = &mut merged[index];
                if let Some(code) = row.warehouses {
                    target.warehouses = Some(match target.warehouses.take() {
                        Some(codes) => format!("{codes}, {code}"),
                        None => code,
                    });
                }
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(row);
            }
        }
    }
    merged
}

pub fn render_listing_report(rows: &[ListingRow]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut report = String::new();

    let header = LISTING_COLUMNS
        .iter()
        .map(|(label, width)| pad(label, *width))
        .collect::<String>();
    report.push_str(header.trim_end());
    report.push('\n');
    report.push_str(&rule);
    report.push('\n');

    for row in rows {
        let line = row
            .cells()
            .iter()
            .zip(LISTING_COLUMNS)
            .map(|(cell, (_, width))| pad(cell, width))
            .collect::<String>();
        report.push_str(line.trim_end());
        report.push('\n');
    }

    report.push_str(&rule);
    report.push('\n');
    report
}

/// Cuts a cell to one less than its column width so columns never touch, then pads it.
fn pad(cell: &str, width: usize) -> String {
    let truncated = cell.chars().take(width.saturating_sub(1)).collect::<String>();
    format!("{truncated:<width$}")
}

pub fn listing_file_name(now: OffsetDateTime) -> Result<String> {
    let stamp = now
        .format(&format_description!(
            "[year repr:last_two][month][day][hour][minute][second]"
        ))
        .context("format listing timestamp")?;
    Ok(format!("book_listing-{stamp}.txt"))
}

pub fn write_listing_report(dir: &Path, rows: &[ListingRow], now: OffsetDateTime) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("create reports directory {}", dir.display()))?;
    let path = dir.join(listing_file_name(now)?);
    fs::write(&path, render_listing_report(rows))
        .with_context(|| format!("write book listing {}", path.display()))?;
    info!(path = %path.display(), rows = rows.len(), "book listing written");
    Ok(path)
}
