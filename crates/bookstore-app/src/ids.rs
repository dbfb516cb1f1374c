// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Database-assigned surrogate key. Never shown, never reused.
entity_id!(RecordId);
// User-facing key, unique per table; join tables reference it instead of the id.
entity_id!(Numeral);

impl Numeral {
    /// Parses a numeral typed by the user. Only plain ASCII digits are accepted.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        trimmed.parse::<i64>().ok().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::Numeral;

    #[test]
    fn numeral_parse_accepts_digits_only() {
        assert_eq!(Numeral::parse("17"), Some(Numeral::new(17)));
        assert_eq!(Numeral::parse(" 007 "), Some(Numeral::new(7)));
        assert_eq!(Numeral::parse(""), None);
        assert_eq!(Numeral::parse("-3"), None);
        assert_eq!(Numeral::parse("1a"), None);
    }
}
