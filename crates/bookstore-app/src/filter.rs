// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Listing filter grammar.
//!
//! A filter is an OR-group of LIKE patterns separated by `|`, followed by any number of
//! `!=` terms, each a NOT LIKE pattern:
//!
//! ```text
//! %ab% | %cd%                 -> (col LIKE '%ab%' OR col LIKE '%cd%')
//! != %ab%                     -> (col NOT LIKE '%ab%')
//! %a% != %ab%                 -> (col LIKE '%a%') AND (col NOT LIKE '%ab%')
//! %ab% | %cd% != %def% != %e% -> (... OR ...) AND (col NOT LIKE '%def%') AND (col NOT LIKE '%e%')
//! ```
//!
//! Patterns keep their `%` and `_` wildcards verbatim. Rendering is behind
//! [`FilterBackend`] so the same parse feeds either inline SQL or bound parameters.

/// The parsed form of one filter string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpr {
    pub any_of: Vec<String>,
    pub none_of: Vec<String>,
}

impl FilterExpr {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let mut groups = raw.split("!=");
        let head = groups.next().unwrap_or("");
        let none_of = groups.map(|term| term.trim().to_owned()).collect();
        let any_of = if head.is_empty() {
            Vec::new()
        } else {
            head.split('|').map(|term| term.trim().to_owned()).collect()
        };
        Self { any_of, none_of }
    }
}

pub trait FilterBackend {
    type Fragment;

    fn render(&self, column: &str, expr: &FilterExpr) -> Self::Fragment;

    fn compile(&self, column: &str, raw: &str) -> Self::Fragment {
        self.render(column, &FilterExpr::parse(raw))
    }
}

/// Inlines every pattern into the SQL text. Patterns are not escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralSql;

impl FilterBackend for LiteralSql {
    type Fragment = String;

    fn render(&self, column: &str, expr: &FilterExpr) -> String {
        let bound = BoundSql.render(column, expr);
        let mut values = bound.params.iter();
        let mut sql = String::with_capacity(bound.sql.len());
        for ch in bound.sql.chars() {
            if ch == '?'
                && let Some(value) = values.next()
            {
                sql.push('\'');
                sql.push_str(value);
                sql.push('\'');
                continue;
            }
            sql.push(ch);
        }
        sql
    }
}

/// Renders `?` placeholders with the patterns as parameters, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundSql;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundFilter {
    pub sql: String,
    pub params: Vec<String>,
}

impl BoundFilter {
    /// Widens the fragment so rows where `column` is NULL also pass.
    pub fn admit_null(mut self, column: &str) -> Self {
        if self.sql.ends_with(')') {
            self.sql.pop();
            self.sql.push_str(&format!(" OR {column} IS NULL)"));
        }
        self
    }
}

impl FilterBackend for BoundSql {
    type Fragment = BoundFilter;

    fn render(&self, column: &str, expr: &FilterExpr) -> BoundFilter {
        let mut sql = String::from("(");
        let mut params = Vec::with_capacity(expr.any_of.len() + expr.none_of.len());

        if !expr.any_of.is_empty() {
            let likes = expr
                .any_of
                .iter()
                .map(|_| format!("{column} LIKE ?"))
                .collect::<Vec<_>>();
            sql.push_str(&likes.join(" OR "));
            sql.push(')');
            params.extend(expr.any_of.iter().cloned());
        }

        for (index, term) in expr.none_of.iter().enumerate() {
            // An empty OR-group leaves the opening parenthesis for the first NOT.
            if index > 0 || !expr.any_of.is_empty() {
                sql.push_str(" AND (");
            }
            sql.push_str(&format!("{column} NOT LIKE ?)"));
            params.push(term.clone());
        }

        BoundFilter { sql, params }
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundSql, FilterBackend, FilterExpr, LiteralSql};

    #[test]
    fn or_group_and_not_chain() {
        assert_eq!(
            LiteralSql.compile("book_title", "%ab% | %cd% != %def%"),
            "(book_title LIKE '%ab%' OR book_title LIKE '%cd%') AND (book_title NOT LIKE '%def%')"
        );
    }

    #[test]
    fn help_text_cases() {
        let cases = [
            ("%ab% | %cd%", "(t LIKE '%ab%' OR t LIKE '%cd%')"),
            ("!= %ab%", "(t NOT LIKE '%ab%')"),
            ("%a% != %ab%", "(t LIKE '%a%') AND (t NOT LIKE '%ab%')"),
            (
                "%ab% | %cd% != %def% != %efg%",
                "(t LIKE '%ab%' OR t LIKE '%cd%') AND (t NOT LIKE '%def%') AND (t NOT LIKE '%efg%')",
            ),
            (
                "!= %ab% %cde% != %fg%",
                "(t NOT LIKE '%ab% %cde%') AND (t NOT LIKE '%fg%')",
            ),
            ("%", "(t LIKE '%')"),
        ];
        for (input, expected) in cases {
            assert_eq!(LiteralSql.compile("t", input), expected, "input {input:?}");
        }
    }

    #[test]
    fn compile_is_pure() {
        let first = LiteralSql.compile("name", "%Pérez% | %Galdós% != %x_z%");
        let second = LiteralSql.compile("name", "%Pérez% | %Galdós% != %x_z%");
        assert_eq!(first, second);
    }

    #[test]
    fn bound_backend_keeps_the_grammar() {
        let bound = BoundSql.compile("author.name", "%O'Brien% != %Jr%");
        assert_eq!(bound.sql, "(author.name LIKE ?) AND (author.name NOT LIKE ?)");
        assert_eq!(bound.params, vec!["%O'Brien%".to_owned(), "%Jr%".to_owned()]);
    }

    #[test]
    fn admit_null_widens_the_last_group() {
        let bound = BoundSql.compile("warehouse.code", "%").admit_null("warehouse.code");
        assert_eq!(bound.sql, "(warehouse.code LIKE ? OR warehouse.code IS NULL)");
        assert_eq!(bound.params, vec!["%".to_owned()]);
    }

    #[test]
    fn parse_splits_on_operators() {
        let expr = FilterExpr::parse("  a | b != c != d ");
        assert_eq!(expr.any_of, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(expr.none_of, vec!["c".to_owned(), "d".to_owned()]);
        assert!(FilterExpr::parse("!= c").any_of.is_empty());
    }
}
