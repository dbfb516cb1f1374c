// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;

use crate::dates::{DateFormat, DateProbe, to_db_date_prefix, to_db_timestamp};
use crate::{Entity, FieldKey};

/// Longest literal the Find input accepts.
pub const MAX_FIND_LITERAL: usize = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Like,
    Eq,
    Lt,
    Gt,
}

impl Comparator {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Gt => ">",
        }
    }

    fn from_prefix(ch: char) -> Option<Self> {
        match ch {
            '=' => Some(Self::Eq),
            '<' => Some(Self::Lt),
            '>' => Some(Self::Gt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindTarget {
    /// OR across every searchable column of the table.
    AllColumns,
    Column(FieldKey),
}

/// A resolved Find, ready to be bound against one table. `value` is the bound
/// parameter, already wrapped in `%` for LIKE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindQuery {
    pub entity: Entity,
    pub target: FindTarget,
    pub comparator: Comparator,
    pub value: String,
    /// The literal looked like a date with the other separator.
    pub separator_warning: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindOutcome {
    /// Empty literal: go back to the full set.
    Reset,
    Query(FindQuery),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindError {
    WrongField,
    ComparatorWithoutField,
    DateLiteral,
}

impl fmt::Display for FindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongField => f.write_str("Find: Wrong field or literal"),
            Self::ComparatorWithoutField => {
                f.write_str("Find: Must specify field: when using a comparator")
            }
            Self::DateLiteral => f.write_str("Find: Error in date literal"),
        }
    }
}

impl std::error::Error for FindError {}

pub fn resolve(
    literal: &str,
    entity: Entity,
    date_format: DateFormat,
) -> Result<FindOutcome, FindError> {
    if literal.trim().is_empty() {
        return Ok(FindOutcome::Reset);
    }

    let (field, rest) = match literal.split_once(':') {
        Some((name, rest)) => {
            let wanted = name.trim().to_lowercase();
            let field = entity
                .find_fields()
                .iter()
                .find(|field| field.name == wanted)
                .ok_or(FindError::WrongField)?;
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(FindError::WrongField);
            }
            (Some(field.key), rest)
        }
        None => (None, literal.trim()),
    };

    let mut chars = rest.chars();
    let (comparator, value) = match chars.next().and_then(Comparator::from_prefix) {
        Some(comparator) => (comparator, chars.as_str()),
        None => (Comparator::Like, rest),
    };
    if comparator != Comparator::Like && field.is_none() {
        return Err(FindError::ComparatorWithoutField);
    }

    let probe = date_format.probe(value);
    let is_date_field = field.is_some() && field == entity.date_key();
    let date = match probe {
        DateProbe::Date(date) => Some(date),
        DateProbe::WrongSeparators | DateProbe::NotADate if is_date_field => {
            return Err(FindError::DateLiteral);
        }
        DateProbe::WrongSeparators | DateProbe::NotADate => None,
    };

    let target = match (field, date, entity.date_key()) {
        (Some(key), _, _) => FindTarget::Column(key),
        (None, Some(_), Some(date_key)) => FindTarget::Column(date_key),
        (None, _, _) => FindTarget::AllColumns,
    };

    let value = match (comparator, date) {
        (Comparator::Like, Some(date)) => format!("%{}%", to_db_date_prefix(date)),
        (Comparator::Like, None) => format!("%{value}%"),
        (_, Some(date)) => to_db_timestamp(date),
        (_, None) => value.to_owned(),
    };

    Ok(FindOutcome::Query(FindQuery {
        entity,
        target,
        comparator,
        value,
        separator_warning: probe == DateProbe::WrongSeparators,
    }))
}

#[cfg(test)]
mod tests {
    use super::{Comparator, FindError, FindOutcome, FindQuery, FindTarget, resolve};
    use crate::dates::DateFormat;
    use crate::{Entity, FieldKey};

    fn query(literal: &str, entity: Entity) -> FindQuery {
        match resolve(literal, entity, DateFormat::default()) {
            Ok(FindOutcome::Query(query)) => query,
            other => panic!("expected a query for {literal:?}, got {other:?}"),
        }
    }

    #[test]
    fn bare_literal_searches_every_column() {
        let resolved = query("Pérez", Entity::Author);
        assert_eq!(resolved.target, FindTarget::AllColumns);
        assert_eq!(resolved.comparator, Comparator::Like);
        assert_eq!(resolved.value, "%Pérez%");
    }

    #[test]
    fn field_without_comparator_is_a_substring_match() {
        let resolved = query("numeral:17", Entity::Book);
        assert_eq!(resolved.target, FindTarget::Column(FieldKey::Numeral));
        assert_eq!(resolved.comparator, Comparator::Like);
        assert_eq!(resolved.value, "%17%");
    }

    #[test]
    fn comparators_keep_the_value_unwrapped() {
        let exact = query("numeral:=7", Entity::Book);
        assert_eq!(exact.comparator, Comparator::Eq);
        assert_eq!(exact.value, "7");

        let newer = query("year:>1999", Entity::Book);
        assert_eq!(newer.target, FindTarget::Column(FieldKey::Year));
        assert_eq!(newer.comparator, Comparator::Gt);
        assert_eq!(newer.value, "1999");
    }

    #[test]
    fn field_names_are_case_insensitive() {
        let resolved = query("NAME: Galdós ", Entity::Publisher);
        assert_eq!(resolved.target, FindTarget::Column(FieldKey::Name));
        assert_eq!(resolved.value, "%Galdós%");
    }

    #[test]
    fn empty_literal_resets() {
        assert_eq!(
            resolve("", Entity::Book, DateFormat::default()),
            Ok(FindOutcome::Reset)
        );
        assert_eq!(
            resolve("   ", Entity::User, DateFormat::default()),
            Ok(FindOutcome::Reset)
        );
    }

    #[test]
    fn rejects_unknown_field_and_empty_value() {
        let format = DateFormat::default();
        assert_eq!(
            resolve("colour:red", Entity::Book, format),
            Err(FindError::WrongField)
        );
        assert_eq!(
            resolve("title:  ", Entity::Book, format),
            Err(FindError::WrongField)
        );
    }

    #[test]
    fn comparator_requires_a_field() {
        assert_eq!(
            resolve(">1999", Entity::Book, DateFormat::default()),
            Err(FindError::ComparatorWithoutField)
        );
    }

    #[test]
    fn invalid_calendar_date_is_rejected() {
        let error = resolve("date:31/02/24", Entity::Book, DateFormat::default())
            .expect_err("no such day");
        assert_eq!(error, FindError::DateLiteral);
        assert_eq!(error.to_string(), "Find: Error in date literal");
    }

    #[test]
    fn bare_date_searches_only_the_date_column() {
        let resolved = query("05/03/24", Entity::Book);
        assert_eq!(resolved.target, FindTarget::Column(FieldKey::CreationDate));
        assert_eq!(resolved.value, "%2024-03-05%");

        let exact = query("date:=05/03/24", Entity::User);
        assert_eq!(exact.value, "2024-03-05 00:00:00.000");
    }

    #[test]
    fn date_on_a_table_without_dates_is_plain_text() {
        let resolved = query("05/03/24", Entity::Warehouse);
        assert_eq!(resolved.target, FindTarget::AllColumns);
        assert_eq!(resolved.value, "%05/03/24%");
    }

    #[test]
    fn wrong_separators_are_flagged() {
        let resolved = query("05-03-24", Entity::Book);
        assert!(resolved.separator_warning);
        assert_eq!(resolved.target, FindTarget::AllColumns);
    }
}
