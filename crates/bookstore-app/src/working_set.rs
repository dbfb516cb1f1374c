// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{Entity, FieldKey, GridRow, Numeral, RecordId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Full,
    Subset,
}

/// The rows a selector grid shows, in display order, plus the current row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingSet {
    entity: Entity,
    rows: Vec<GridRow>,
    kind: SetKind,
    current: Option<usize>,
}

impl WorkingSet {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            rows: Vec::new(),
            kind: SetKind::Full,
            current: None,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replaces the set with every row of the table. The current numeral survives the
    /// reload when it is still present.
    pub fn load_full_set(&mut self, rows: Vec<GridRow>) {
        let keep = self.current().map(|row| row.numeral);
        self.rows = rows;
        self.kind = SetKind::Full;
        self.current = keep
            .and_then(|numeral| self.position_of(numeral))
            .or_else(|| self.first_index());
    }

    pub fn load_subset(&mut self, rows: Vec<GridRow>) {
        self.rows = rows;
        self.kind = SetKind::Subset;
        self.current = self.first_index();
    }

    /// Replaces the row with the same id in place. Returns false when it is not cached.
    pub fn patch_row(&mut self, id: RecordId, row: GridRow) -> bool {
        let Some(index) = self.rows.iter().position(|cached| cached.id == id) else {
            return false;
        };
        self.rows[index] = row;
        true
    }

    pub fn remove_row(&mut self, id: RecordId) -> bool {
        let Some(index) = self.rows.iter().position(|row| row.id == id) else {
            return false;
        };
        self.rows.remove(index);
        self.current = match self.current {
            _ if self.rows.is_empty() => None,
            Some(current) if current == index => Some(index.saturating_sub(1)),
            Some(current) if current > index => Some(current - 1),
            other => other,
        };
        true
    }

    pub fn append_row(&mut self, row: GridRow) {
        self.rows.push(row);
        self.current = Some(self.rows.len() - 1);
    }

    pub fn current(&self) -> Option<&GridRow> {
        self.current.and_then(|index| self.rows.get(index))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn position_of(&self, numeral: Numeral) -> Option<usize> {
        self.rows.iter().position(|row| row.numeral == numeral)
    }

    pub fn row_by_numeral(&self, numeral: Numeral) -> Option<&GridRow> {
        self.rows.iter().find(|row| row.numeral == numeral)
    }

    pub fn select_numeral(&mut self, numeral: Numeral) -> bool {
        match self.position_of(numeral) {
            Some(index) => {
                self.current = Some(index);
                true
            }
            None => false,
        }
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() as isize - 1;
        let from = self.current.unwrap_or(0) as isize;
        self.current = Some((from + delta).clamp(0, last) as usize);
    }

    pub fn select_first(&mut self) {
        self.current = self.first_index();
    }

    pub fn select_last(&mut self) {
        self.current = self.rows.len().checked_sub(1);
    }

    /// True when another row already carries `value` in the column for `key`. Rows whose
    /// value equals `exempt` are the record being edited and do not count.
    pub fn contains_value(&self, key: FieldKey, value: &str, exempt: Option<&str>) -> bool {
        let Some(column) = self.entity.grid_column_index(key) else {
            return false;
        };
        if exempt == Some(value) {
            return false;
        }
        self.rows.iter().any(|row| row.cell(column) == value)
    }

    fn first_index(&self) -> Option<usize> {
        if self.rows.is_empty() { None } else { Some(0) }
    }
}
