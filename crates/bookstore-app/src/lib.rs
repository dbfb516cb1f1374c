// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

pub mod dates;
pub mod filter;
pub mod find;
pub mod forms;
pub mod ids;
pub mod listing;
pub mod model;
pub mod money;
pub mod selector;
pub mod state;
pub mod working_set;

pub use dates::{DateFormat, DateOrder, DateProbe};
pub use filter::{BoundFilter, BoundSql, FilterBackend, FilterExpr, LiteralSql};
pub use find::{Comparator, FindError, FindOutcome, FindQuery, FindTarget};
pub use forms::{DeleteOutcome, FieldError, FormMode, RecordForm, SaveOptions, SaveOutcome};
pub use ids::*;
pub use listing::{ListingField, ListingOrder, ListingRequest};
pub use model::*;
pub use money::MoneyError;
pub use selector::{CrudOption, Selector, SelectorKey, SelectorMode, SelectorOutcome};
pub use state::*;
pub use working_set::{SetKind, WorkingSet};
