// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::forms::MANDATORY_EMPTY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOrder {
    Title,
    AuthorTitle,
    PublisherTitle,
    GenreTitle,
    WarehouseTitle,
}

impl ListingOrder {
    pub const ALL: [Self; 5] = [
        Self::Title,
        Self::AuthorTitle,
        Self::PublisherTitle,
        Self::GenreTitle,
        Self::WarehouseTitle,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Title => "Book title",
            Self::AuthorTitle => "Author and title",
            Self::PublisherTitle => "Publisher and title",
            Self::GenreTitle => "Genre and title",
            Self::WarehouseTitle => "Warehouse and title",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|order| order.label().eq_ignore_ascii_case(label.trim()))
    }

    /// Rows of one book in several warehouses collapse into one line except when the
    /// warehouse is the sort key.
    pub const fn merges_warehouses(self) -> bool {
        !matches!(self, Self::WarehouseTitle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingField {
    Book,
    Author,
    Publisher,
    Genre,
    Warehouse,
    Order,
}

impl ListingField {
    pub const ALL: [Self; 6] = [
        Self::Book,
        Self::Author,
        Self::Publisher,
        Self::Genre,
        Self::Warehouse,
        Self::Order,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Book => "Book filter",
            Self::Author => "Author filter",
            Self::Publisher => "Publisher filter",
            Self::Genre => "Book genre filter",
            Self::Warehouse => "Warehouse filter",
            Self::Order => "Order by",
        }
    }
}

/// The book listing form. Every filter is a filter-grammar string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub book: String,
    pub author: String,
    pub publisher: String,
    pub genre: String,
    pub warehouse: String,
    pub order: String,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            book: "%".to_owned(),
            author: "%".to_owned(),
            publisher: "%".to_owned(),
            genre: "%".to_owned(),
            warehouse: "%".to_owned(),
            order: ListingOrder::Title.label().to_owned(),
        }
    }
}

impl ListingRequest {
    pub fn value(&self, field: ListingField) -> &str {
        match field {
            ListingField::Book => &self.book,
            ListingField::Author => &self.author,
            ListingField::Publisher => &self.publisher,
            ListingField::Genre => &self.genre,
            ListingField::Warehouse => &self.warehouse,
            ListingField::Order => &self.order,
        }
    }

    pub fn value_mut(&mut self, field: ListingField) -> &mut String {
        match field {
            ListingField::Book => &mut self.book,
            ListingField::Author => &mut self.author,
            ListingField::Publisher => &mut self.publisher,
            ListingField::Genre => &mut self.genre,
            ListingField::Warehouse => &mut self.warehouse,
            ListingField::Order => &mut self.order,
        }
    }

    /// Trims every field and checks none is empty and the order is known.
    pub fn validate(&mut self) -> Result<ListingOrder, (ListingField, &'static str)> {
        for field in ListingField::ALL {
            let value = self.value_mut(field);
            *value = value.trim().to_owned();
            if value.is_empty() {
                return Err((field, MANDATORY_EMPTY));
            }
        }
        ListingOrder::from_label(&self.order).ok_or((ListingField::Order, "Error:  Wrong order"))
    }

    /// Only the untouched `%` warehouse filter lets through books stocked nowhere.
    pub fn admits_unstocked(&self) -> bool {
        self.warehouse.trim() == "%"
    }
}

#[cfg(test)]
mod tests {
    use super::{ListingField, ListingOrder, ListingRequest};

    #[test]
    fn defaults_are_wildcards_by_title() {
        let mut request = ListingRequest::default();
        assert_eq!(request.validate(), Ok(ListingOrder::Title));
        assert!(request.admits_unstocked());
    }

    #[test]
    fn empty_filter_is_rejected_in_field_order() {
        let mut request = ListingRequest {
            publisher: "  ".to_owned(),
            warehouse: String::new(),
            ..ListingRequest::default()
        };
        assert_eq!(
            request.validate(),
            Err((ListingField::Publisher, "Error:  Mandatory field is empty"))
        );
    }

    #[test]
    fn order_must_be_known() {
        let mut request = ListingRequest {
            order: "Price".to_owned(),
            ..ListingRequest::default()
        };
        assert_eq!(
            request.validate(),
            Err((ListingField::Order, "Error:  Wrong order"))
        );
        request.order = "warehouse AND TITLE".to_owned();
        assert_eq!(request.validate(), Ok(ListingOrder::WarehouseTitle));
        assert!(!ListingOrder::WarehouseTitle.merges_warehouses());
    }

    #[test]
    fn narrowed_warehouse_filter_excludes_unstocked() {
        let request = ListingRequest {
            warehouse: "A%".to_owned(),
            ..ListingRequest::default()
        };
        assert!(!request.admits_unstocked());
    }
}
