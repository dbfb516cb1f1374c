// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::fmt;

use time::Date;

use crate::dates::DateFormat;
use crate::money::{format_price, parse_price};
use crate::working_set::WorkingSet;
use crate::{
    CrudOption, Entity, FieldKey, FieldKind, FieldSpec, GridRow, Mandatory, Numeral, Record,
    RecordId,
};

pub const MANDATORY_EMPTY: &str = "Error:  Mandatory field is empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormMode {
    Create,
    Read,
    Update,
    Delete,
}

impl FormMode {
    pub fn from_option(option: CrudOption) -> Option<Self> {
        match option {
            CrudOption::Create => Some(Self::Create),
            CrudOption::Read => Some(Self::Read),
            CrudOption::Update => Some(Self::Update),
            CrudOption::Delete => Some(Self::Delete),
            CrudOption::Find => None,
        }
    }

    /// Modes that write and therefore hold the exclusive lock while open.
    pub const fn writes(self) -> bool {
        !matches!(self, Self::Read)
    }

    pub const fn editable(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Read => "Read",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Answers the user already gave to "create it as a new one?" prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOptions {
    pub create_missing_author: bool,
    pub create_missing_publisher: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { row: GridRow, notices: Vec<String> },
    /// The book names an author that does not exist yet.
    MissingAuthor(String),
    MissingPublisher(String),
    /// The save cannot go ahead; the message says why.
    Rejected(String),
    /// Another record already holds the numeral or unique field.
    Conflict(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(RecordId),
    Blocked(&'static str),
}

/// The first validation rule a form broke, and the field focus returns to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub key: FieldKey,
    pub message: String,
}

impl FieldError {
    fn new(key: FieldKey, message: impl Into<String>) -> Self {
        Self {
            key,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FieldError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub spec: FieldSpec,
    pub value: String,
}

/// One open record form. Modes never change while the form is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordForm {
    entity: Entity,
    mode: FormMode,
    id: Option<RecordId>,
    date_format: DateFormat,
    fields: Vec<FormField>,
    backup: BTreeMap<FieldKey, String>,
    focus: usize,
}

impl RecordForm {
    /// A blank Create form with the next numeral and today's date filled in.
    pub fn create(entity: Entity, next: Numeral, today: Date, date_format: DateFormat) -> Self {
        let mut form = Self::build(entity, FormMode::Create, None, date_format, |_| String::new());
        form.set_raw(FieldKey::Numeral, next.to_string());
        if let Some(key) = entity.date_key() {
            form.set_raw(key, date_format.format(today));
        }
        form.backup_fields();
        form
    }

    pub fn open(mode: FormMode, record: &Record, date_format: DateFormat) -> Self {
        let mut form = Self::build(record.entity, mode, record.id, date_format, |key| {
            record.get(key).to_owned()
        });
        // The stored digest is never edited; an empty password keeps it.
        if mode == FormMode::Update {
            form.set_raw(FieldKey::Password, String::new());
        }
        form.backup_fields();
        form
    }

    fn build(
        entity: Entity,
        mode: FormMode,
        id: Option<RecordId>,
        date_format: DateFormat,
        value: impl Fn(FieldKey) -> String,
    ) -> Self {
        let fields = entity
            .fields()
            .iter()
            .map(|spec| FormField {
                spec: *spec,
                value: value(spec.key),
            })
            .collect();
        Self {
            entity,
            mode,
            id,
            date_format,
            fields,
            backup: BTreeMap::new(),
            focus: 0,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn date_format(&self) -> DateFormat {
        self.date_format
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn is_editable(&self) -> bool {
        self.mode.editable()
    }

    pub fn value(&self, key: FieldKey) -> &str {
        self.fields
            .iter()
            .find(|field| field.spec.key == key)
            .map(|field| field.value.as_str())
            .unwrap_or("")
    }

    pub fn backup_value(&self, key: FieldKey) -> &str {
        self.backup.get(&key).map(String::as_str).unwrap_or("")
    }

    /// The numeral the record had when the form opened.
    pub fn original_numeral(&self) -> Option<Numeral> {
        Numeral::parse(self.backup_value(FieldKey::Numeral))
    }

    pub fn backup_fields(&mut self) {
        self.backup = self
            .fields
            .iter()
            .map(|field| (field.spec.key, field.value.clone()))
            .collect();
    }

    pub fn exists_changes(&self) -> bool {
        self.fields
            .iter()
            .any(|field| self.backup_value(field.spec.key) != field.value)
    }

    /// Prompt shown before leaving without saving, if leaving needs confirmation.
    pub fn discard_prompt(&self) -> Option<&'static str> {
        match self.mode {
            FormMode::Create => Some("Discard creation?"),
            FormMode::Update if self.exists_changes() => Some("Discard changes?"),
            FormMode::Update | FormMode::Read | FormMode::Delete => None,
        }
    }

    /// Sets a field from a chooser or a paste. Ignored on read-only forms.
    pub fn set_value(&mut self, key: FieldKey, value: impl Into<String>) -> bool {
        if !self.is_editable() {
            return false;
        }
        self.set_raw(key, value.into());
        true
    }

    fn set_raw(&mut self, key: FieldKey, value: String) {
        if let Some(field) = self.fields.iter_mut().find(|field| field.spec.key == key) {
            field.value = value;
        }
    }

    pub fn focused(&self) -> &FormField {
        &self.fields[self.focus]
    }

    pub fn focus_index(&self) -> usize {
        self.focus
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len();
    }

    pub fn focus_prev(&mut self) {
        self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }

    pub fn focus_key(&mut self, key: FieldKey) {
        if let Some(index) = self.fields.iter().position(|field| field.spec.key == key) {
            self.focus = index;
        }
    }

    /// Types one character into the focused field, filtered by the field kind.
    pub fn insert_char(&mut self, ch: char) -> bool {
        if !self.is_editable() || ch.is_control() {
            return false;
        }
        let limit = self.input_limit(&self.fields[self.focus].spec);
        let date_separator = self.date_format.separator;
        let field = &mut self.fields[self.focus];
        let allowed = match field.spec.kind {
            FieldKind::Numeral | FieldKind::Integer => ch.is_ascii_digit(),
            FieldKind::Money => {
                ch.is_ascii_digit()
                    || (matches!(ch, '.' | ',') && !field.value.contains(['.', ',']))
            }
            FieldKind::Date => ch.is_ascii_digit() || ch == date_separator,
            FieldKind::Login | FieldKind::Password => !ch.is_whitespace(),
            FieldKind::Text | FieldKind::Choice(_) | FieldKind::MultiChoice(_) => true,
        };
        if !allowed || limit.is_some_and(|limit| field.value.chars().count() >= limit) {
            return false;
        }
        field.value.push(ch);
        true
    }

    pub fn backspace(&mut self) -> bool {
        if !self.is_editable() {
            return false;
        }
        self.fields[self.focus].value.pop().is_some()
    }

    fn input_limit(&self, spec: &FieldSpec) -> Option<usize> {
        match spec.kind {
            FieldKind::Date => Some(self.date_format.width()),
            _ => spec.max_len,
        }
    }

    pub fn strip_fields(&mut self) {
        for field in &mut self.fields {
            let trimmed = field.value.trim();
            if trimmed.len() != field.value.len() {
                field.value = trimmed.to_owned();
            }
        }
    }

    /// Runs every rule in order: mandatory, then type and format, then length, then
    /// uniqueness against the cached rows. Stops at the first failure.
    pub fn check_field_values(&self, rows: &WorkingSet) -> Result<(), FieldError> {
        for field in &self.fields {
            if field.value.trim().is_empty() && self.is_mandatory(&field.spec) {
                return Err(FieldError::new(field.spec.key, MANDATORY_EMPTY));
            }
        }
        for field in &self.fields {
            if !field.value.trim().is_empty() {
                self.check_format(field)?;
            }
        }
        for field in &self.fields {
            self.check_length(field)?;
        }
        self.check_unique(rows)
    }

    fn is_mandatory(&self, spec: &FieldSpec) -> bool {
        match spec.mandatory {
            Mandatory::Always => true,
            Mandatory::OnCreate => self.mode == FormMode::Create,
            Mandatory::Never => false,
        }
    }

    fn check_format(&self, field: &FormField) -> Result<(), FieldError> {
        let key = field.spec.key;
        let value = field.value.trim();
        let fail = |message: &str| -> Result<(), FieldError> { Err(FieldError::new(key, message)) };
        match field.spec.kind {
            FieldKind::Numeral if Numeral::parse(value).is_none() => {
                fail("Error: Numeral must be integer")
            }
            FieldKind::Integer if !value.bytes().all(|byte| byte.is_ascii_digit()) => {
                match key {
                    FieldKey::Year => fail("Error: Year must be integer"),
                    _ => fail(&format!("Error: {} must be integer", field.spec.label)),
                }
            }
            FieldKind::Date => self
                .date_format
                .parse(value)
                .map(|_| ())
                .map_err(|error| FieldError::new(key, error.to_string())),
            FieldKind::Money => parse_price(value)
                .map(|_| ())
                .map_err(|error| FieldError::new(key, error.to_string())),
            FieldKind::Choice(source) => match source.fixed_values() {
                Some(values) if !values.iter().any(|entry| entry.eq_ignore_ascii_case(value)) => {
                    fail(&format!("Error: {} is not in the list", field.spec.label))
                }
                _ => Ok(()),
            },
            FieldKind::Login => check_login(key, value),
            FieldKind::Password if value.contains(char::is_whitespace) => {
                fail("Error: Password must be a single word")
            }
            _ => Ok(()),
        }
    }

    fn check_length(&self, field: &FormField) -> Result<(), FieldError> {
        let limit = match field.spec.kind {
            FieldKind::Numeral => Some(self.entity.numeral_digits()),
            _ => field.spec.max_len,
        };
        let Some(limit) = limit else {
            return Ok(());
        };
        let value = match field.spec.kind {
            // Leading zeros do not count toward a numeral's digits.
            FieldKind::Numeral => Numeral::parse(&field.value)
                .map(|numeral| numeral.to_string())
                .unwrap_or_default(),
            _ => field.value.trim().to_owned(),
        };
        if value.chars().count() > limit {
            let label = match field.spec.key {
                FieldKey::Year => "Year",
                _ => field.spec.label,
            };
            return Err(FieldError::new(
                field.spec.key,
                format!("Error: {label} maximum length exceeded"),
            ));
        }
        Ok(())
    }

    fn check_unique(&self, rows: &WorkingSet) -> Result<(), FieldError> {
        let numeral = normalized_numeral(self.value(FieldKey::Numeral));
        let backup_numeral = normalized_numeral(self.backup_value(FieldKey::Numeral));
        let exempt = (self.mode != FormMode::Create).then_some(backup_numeral.as_str());
        if rows.contains_value(FieldKey::Numeral, &numeral, exempt) {
            return Err(FieldError::new(
                FieldKey::Numeral,
                "Error:  Numeral already exists",
            ));
        }

        let key = self.entity.unique_key();
        let value = self.value(key).trim();
        let exempt = (self.mode != FormMode::Create).then_some(self.backup_value(key));
        if rows.contains_value(key, value, exempt) {
            let label = self.entity.field(key).map_or("Value", |spec| spec.label);
            return Err(FieldError::new(key, format!("Error:  {label} already exists")));
        }
        Ok(())
    }

    /// The form's values in their normalized on-screen form.
    pub fn to_record(&self) -> Record {
        let mut record = Record::blank(self.entity);
        record.id = self.id;
        for field in &self.fields {
            let value = field.value.trim();
            let normalized = match field.spec.kind {
                FieldKind::Numeral => normalized_numeral(value),
                FieldKind::Money => parse_price(value)
                    .map(format_price)
                    .unwrap_or_else(|_| value.to_owned()),
                FieldKind::Date => self
                    .date_format
                    .parse(value)
                    .map(|date| self.date_format.format(date))
                    .unwrap_or_else(|_| value.to_owned()),
                FieldKind::Integer => value
                    .parse::<i64>()
                    .map(|number| number.to_string())
                    .unwrap_or_else(|_| value.to_owned()),
                _ => value.to_owned(),
            };
            record.set(field.spec.key, normalized);
        }
        record
    }
}

fn normalized_numeral(raw: &str) -> String {
    Numeral::parse(raw).map_or_else(|| raw.trim().to_owned(), |numeral| numeral.to_string())
}

fn check_login(key: FieldKey, value: &str) -> Result<(), FieldError> {
    if value.contains(char::is_whitespace) {
        return Err(FieldError::new(key, "Error: User must be a single word"));
    }
    if !value.chars().next().is_some_and(char::is_alphabetic) {
        return Err(FieldError::new(
            key,
            "Error: User field must start with a letter",
        ));
    }
    if !value.chars().all(char::is_alphanumeric) {
        return Err(FieldError::new(key, "Error: User field must be alphanumeric"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{FormMode, MANDATORY_EMPTY, RecordForm};
    use crate::dates::DateFormat;
    use crate::working_set::WorkingSet;
    use crate::{Entity, FieldKey, GridRow, Numeral, Record, RecordId};
    use time::{Date, Month};

    fn today() -> Date {
        Date::from_calendar_date(2026, Month::March, 14).expect("valid date")
    }

    fn authors() -> WorkingSet {
        let mut set = WorkingSet::new(Entity::Author);
        set.load_full_set(vec![
            GridRow {
                id: RecordId::new(1),
                numeral: Numeral::new(1),
                cells: vec![
                    "1".to_owned(),
                    "Benito Pérez Galdós".to_owned(),
                    String::new(),
                    String::new(),
                    String::new(),
                ],
            },
            GridRow {
                id: RecordId::new(2),
                numeral: Numeral::new(2),
                cells: vec![
                    "2".to_owned(),
                    "Emilia Pardo Bazán".to_owned(),
                    String::new(),
                    String::new(),
                    String::new(),
                ],
            },
        ]);
        set
    }

    fn filled_book() -> RecordForm {
        let mut form = RecordForm::create(
            Entity::Book,
            Numeral::new(12),
            today(),
            DateFormat::default(),
        );
        for (key, value) in [
            (FieldKey::Title, "Fortunata y Jacinta"),
            (FieldKey::Author, "Benito Pérez Galdós"),
            (FieldKey::Isbn, "978-84-376-0494-7"),
            (FieldKey::Year, "1887"),
            (FieldKey::Publisher, "Cátedra"),
            (FieldKey::Genre, "Narrative"),
            (FieldKey::CoverType, "Silk softcover"),
            (FieldKey::Price, "24,5"),
        ] {
            assert!(form.set_value(key, value));
        }
        form
    }

    #[test]
    fn create_prefills_numeral_and_date() {
        let form = RecordForm::create(Entity::User, Numeral::new(8), today(), DateFormat::default());
        assert_eq!(form.value(FieldKey::Numeral), "8");
        assert_eq!(form.value(FieldKey::CreationDate), "14/03/26");
        assert_eq!(form.discard_prompt(), Some("Discard creation?"));
    }

    #[test]
    fn mandatory_check_runs_before_format() {
        let mut form = filled_book();
        form.set_value(FieldKey::Year, "19x9");
        form.set_value(FieldKey::Title, "");
        let error = form
            .check_field_values(&WorkingSet::new(Entity::Book))
            .expect_err("title is mandatory");
        assert_eq!(error.key, FieldKey::Title);
        assert_eq!(error.message, MANDATORY_EMPTY);
    }

    #[test]
    fn format_errors_name_the_rule() {
        let empty = WorkingSet::new(Entity::Book);
        let mut form = filled_book();
        form.set_value(FieldKey::Year, "19x9");
        assert_eq!(
            form.check_field_values(&empty).map_err(|error| error.message),
            Err("Error: Year must be integer".to_owned())
        );

        let mut form = filled_book();
        form.set_value(FieldKey::CreationDate, "30/02/24");
        assert_eq!(
            form.check_field_values(&empty).map_err(|error| error.message),
            Err("Error: Incorrect date; format is dd/mm/yy".to_owned())
        );

        let mut form = filled_book();
        form.set_value(FieldKey::Price, "12.3.4");
        assert_eq!(
            form.check_field_values(&empty).map_err(|error| error.key),
            Err(FieldKey::Price)
        );
    }

    #[test]
    fn length_limits_apply_after_format() {
        let empty = WorkingSet::new(Entity::Book);
        let mut form = filled_book();
        form.set_value(FieldKey::Numeral, "1234567");
        assert_eq!(
            form.check_field_values(&empty).map_err(|error| error.message),
            Err("Error: Numeral maximum length exceeded".to_owned())
        );

        let mut form = filled_book();
        form.set_value(FieldKey::Isbn, "978-84-376-0494-7-X");
        assert_eq!(
            form.check_field_values(&empty).map_err(|error| error.key),
            Err(FieldKey::Isbn)
        );
    }

    #[test]
    fn duplicate_numeral_and_name_are_rejected() {
        let rows = authors();
        let mut form =
            RecordForm::create(Entity::Author, Numeral::new(2), today(), DateFormat::default());
        form.set_value(FieldKey::Name, "Someone");
        assert_eq!(
            form.check_field_values(&rows).map_err(|error| error.message),
            Err("Error:  Numeral already exists".to_owned())
        );

        form.set_value(FieldKey::Numeral, "3");
        form.set_value(FieldKey::Name, "Emilia Pardo Bazán");
        assert_eq!(
            form.check_field_values(&rows).map_err(|error| error.message),
            Err("Error:  Name already exists".to_owned())
        );
    }

    #[test]
    fn update_exempts_its_own_values() {
        let rows = authors();
        let record = Record::blank(Entity::Author)
            .with(FieldKey::Numeral, "2")
            .with(FieldKey::Name, "Emilia Pardo Bazán");
        let mut form = RecordForm::open(FormMode::Update, &record, DateFormat::default());
        assert_eq!(form.check_field_values(&rows), Ok(()));
        assert!(!form.exists_changes());
        assert_eq!(form.discard_prompt(), None);

        form.set_value(FieldKey::Name, "Benito Pérez Galdós");
        assert!(form.exists_changes());
        assert_eq!(form.discard_prompt(), Some("Discard changes?"));
        assert!(form.check_field_values(&rows).is_err());
    }

    #[test]
    fn read_and_delete_forms_are_read_only() {
        let record = Record::blank(Entity::Warehouse)
            .with(FieldKey::Numeral, "1")
            .with(FieldKey::Code, "A1");
        for mode in [FormMode::Read, FormMode::Delete] {
            let mut form = RecordForm::open(mode, &record, DateFormat::default());
            assert!(!form.set_value(FieldKey::Code, "Z9"));
            assert!(!form.insert_char('x'));
            assert_eq!(form.value(FieldKey::Code), "A1");
        }
    }

    #[test]
    fn user_rules() {
        let rows = WorkingSet::new(Entity::User);
        let mut form =
            RecordForm::create(Entity::User, Numeral::new(1), today(), DateFormat::default());
        form.set_value(FieldKey::Login, "9lives");
        form.set_value(FieldKey::UserName, "Nine");
        form.set_value(FieldKey::Level, "1");
        form.set_value(FieldKey::Password, "secret");
        assert_eq!(
            form.check_field_values(&rows).map_err(|error| error.message),
            Err("Error: User field must start with a letter".to_owned())
        );
        form.set_value(FieldKey::Login, "nine_lives");
        assert_eq!(
            form.check_field_values(&rows).map_err(|error| error.message),
            Err("Error: User field must be alphanumeric".to_owned())
        );
        form.set_value(FieldKey::Login, "nine");
        assert_eq!(form.check_field_values(&rows), Ok(()));
    }

    #[test]
    fn password_is_mandatory_only_on_create() {
        let rows = WorkingSet::new(Entity::User);
        let record = Record::blank(Entity::User)
            .with(FieldKey::Numeral, "1")
            .with(FieldKey::Login, "ana")
            .with(FieldKey::UserName, "Ana")
            .with(FieldKey::Level, "2")
            .with(FieldKey::CreationDate, "01/01/26")
            .with(FieldKey::Password, "5e884898da28");
        let form = RecordForm::open(FormMode::Update, &record, DateFormat::default());
        assert_eq!(form.value(FieldKey::Password), "");
        assert_eq!(form.check_field_values(&rows), Ok(()));
    }

    #[test]
    fn typing_is_filtered_by_kind() {
        let mut form = filled_book();
        form.focus_key(FieldKey::Numeral);
        assert!(!form.insert_char('a'));
        assert!(form.insert_char('3'));
        assert_eq!(form.value(FieldKey::Numeral), "123");

        form.set_value(FieldKey::Price, "");
        form.focus_key(FieldKey::Price);
        for ch in "12,5".chars() {
            assert!(form.insert_char(ch));
        }
        assert!(!form.insert_char('.'));
        assert!(form.backspace());
        assert_eq!(form.value(FieldKey::Price), "12,");

        form.focus_key(FieldKey::CreationDate);
        assert_eq!(form.value(FieldKey::CreationDate), "14/03/26");
        assert!(!form.insert_char('7'));
    }

    #[test]
    fn to_record_normalizes_values() {
        let mut form = filled_book();
        form.set_value(FieldKey::Numeral, "0012");
        let record = form.to_record();
        assert_eq!(record.get(FieldKey::Numeral), "12");
        assert_eq!(record.get(FieldKey::Price), "24.50");
        assert_eq!(record.get(FieldKey::CreationDate), "14/03/26");
        assert_eq!(record.numeral(), Some(Numeral::new(12)));
    }

    #[test]
    fn focus_wraps_both_ways() {
        let mut form =
            RecordForm::create(Entity::Warehouse, Numeral::new(1), today(), DateFormat::default());
        form.focus_prev();
        assert_eq!(form.focused().spec.key, FieldKey::Phone);
        form.focus_next();
        assert_eq!(form.focused().spec.key, FieldKey::Numeral);
    }
}
