// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::fmt;
use std::str::FromStr;

use anyhow::{Error, bail};
use time::{Date, Month, OffsetDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayMonth,
    MonthDay,
}

/// One of the eight display layouts accepted for dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFormat {
    pub order: DateOrder,
    pub separator: char,
    pub long_year: bool,
}

impl Default for DateFormat {
    fn default() -> Self {
        Self::new(DateOrder::DayMonth, '/', false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateProbe {
    Date(Date),
    /// Separators sit where the layout puts them but are not the layout's.
    WrongSeparators,
    NotADate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateError {
    pub pattern: String,
}

impl fmt::Display for DateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: Incorrect date; format is {}", self.pattern)
    }
}

impl std::error::Error for DateError {}

pub const DATE_SEPARATOR_NOTICE: &str = "Error in date separators.";

impl DateFormat {
    pub const ALL: [Self; 8] = [
        Self::new(DateOrder::DayMonth, '-', false),
        Self::new(DateOrder::DayMonth, '/', false),
        Self::new(DateOrder::DayMonth, '-', true),
        Self::new(DateOrder::DayMonth, '/', true),
        Self::new(DateOrder::MonthDay, '-', false),
        Self::new(DateOrder::MonthDay, '/', false),
        Self::new(DateOrder::MonthDay, '-', true),
        Self::new(DateOrder::MonthDay, '/', true),
    ];

    pub const fn new(order: DateOrder, separator: char, long_year: bool) -> Self {
        Self {
            order,
            separator,
            long_year,
        }
    }

    pub fn pattern(self) -> String {
        let sep = self.separator;
        let year = if self.long_year { "yyyy" } else { "yy" };
        match self.order {
            DateOrder::DayMonth => format!("dd{sep}mm{sep}{year}"),
            DateOrder::MonthDay => format!("mm{sep}dd{sep}{year}"),
        }
    }

    pub fn width(self) -> usize {
        if self.long_year { 10 } else { 8 }
    }

    pub fn format(self, date: Date) -> String {
        let sep = self.separator;
        let day = date.day();
        let month = u8::from(date.month());
        let year = if self.long_year {
            format!("{:04}", date.year())
        } else {
            format!("{:02}", date.year().rem_euclid(100))
        };
        match self.order {
            DateOrder::DayMonth => format!("{day:02}{sep}{month:02}{sep}{year}"),
            DateOrder::MonthDay => format!("{month:02}{sep}{day:02}{sep}{year}"),
        }
    }

    /// Parses a date typed in this layout. Both 2- and 4-digit years are accepted.
    pub fn parse(self, text: &str) -> Result<Date, DateError> {
        parse_with(self, text.trim()).ok_or_else(|| self.error())
    }

    pub fn probe(self, literal: &str) -> DateProbe {
        let literal = literal.trim();
        if let Some(date) = parse_with(self, literal) {
            return DateProbe::Date(date);
        }
        let bytes = literal.as_bytes();
        if matches!(literal.len(), 8 | 10)
            && [bytes[2], bytes[5]]
                .iter()
                .all(|byte| matches!(byte, b'-' | b'/'))
        {
            return DateProbe::WrongSeparators;
        }
        DateProbe::NotADate
    }

    pub fn error(self) -> DateError {
        DateError {
            pattern: self.pattern(),
        }
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern())
    }
}

impl FromStr for DateFormat {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        match Self::ALL.into_iter().find(|format| format.pattern() == wanted) {
            Some(format) => Ok(format),
            None => bail!(
                "unknown date format {raw:?} -- use one of {}",
                Self::ALL.map(Self::pattern).join(", ")
            ),
        }
    }
}

fn parse_with(format: DateFormat, text: &str) -> Option<Date> {
    if !matches!(text.len(), 8 | 10) || !text.is_ascii() {
        return None;
    }
    let bytes = text.as_bytes();
    let separator = format.separator as u8;
    if bytes[2] != separator || bytes[5] != separator {
        return None;
    }
    let first = digits(&text[0..2])?;
    let second = digits(&text[3..5])?;
    let year_text = &text[6..];
    let year = digits(year_text)?;
    let year = if year_text.len() == 2 {
        if year > 69 { 1900 + year } else { 2000 + year }
    } else {
        year
    };
    let (day, month) = match format.order {
        DateOrder::DayMonth => (first, second),
        DateOrder::MonthDay => (second, first),
    };
    let month = Month::try_from(u8::try_from(month).ok()?).ok()?;
    Date::from_calendar_date(year as i32, month, u8::try_from(day).ok()?).ok()
}

fn digits(text: &str) -> Option<u32> {
    if !text.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// The stored form of a date column.
pub fn to_db_timestamp(date: Date) -> String {
    format!("{} 00:00:00.000", to_db_date_prefix(date))
}

/// The leading `YYYY-MM-DD` of a stored timestamp, used to match a date in a Find.
pub fn to_db_date_prefix(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub fn from_db_timestamp(text: &str) -> Option<Date> {
    let prefix = text.trim().get(0..10)?;
    let bytes = prefix.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let year = digits(&prefix[0..4])?;
    let month = Month::try_from(u8::try_from(digits(&prefix[5..7])?).ok()?).ok()?;
    let day = u8::try_from(digits(&prefix[8..10])?).ok()?;
    Date::from_calendar_date(year as i32, month, day).ok()
}

pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

#[cfg(test)]
mod tests {
    use super::{
        DateFormat, DateOrder, DateProbe, from_db_timestamp, to_db_date_prefix, to_db_timestamp,
    };
    use time::{Date, Month};

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).expect("valid date")
    }

    #[test]
    fn default_layout_is_day_month_short_year() {
        let format = DateFormat::default();
        assert_eq!(format.pattern(), "dd/mm/yy");
        assert_eq!(format.format(date(2024, Month::March, 5)), "05/03/24");
    }

    #[test]
    fn two_digit_years_pivot_at_seventy() {
        let format = DateFormat::default();
        assert_eq!(format.parse("01/01/69"), Ok(date(2069, Month::January, 1)));
        assert_eq!(format.parse("01/01/70"), Ok(date(1970, Month::January, 1)));
        assert_eq!(format.parse("31/12/1999"), Ok(date(1999, Month::December, 31)));
    }

    #[test]
    fn parse_rejects_impossible_dates() {
        let format = DateFormat::default();
        let error = format.parse("31/02/24").expect_err("february has no 31st");
        assert_eq!(error.to_string(), "Error: Incorrect date; format is dd/mm/yy");
        assert!(format.parse("1/2/24").is_err());
        assert!(format.parse("01/13/24").is_err());
        assert!(format.parse("aa/bb/cc").is_err());
    }

    #[test]
    fn month_first_layouts_swap_fields() {
        let format = DateFormat::new(DateOrder::MonthDay, '-', true);
        assert_eq!(format.pattern(), "mm-dd-yyyy");
        assert_eq!(format.parse("12-25-2023"), Ok(date(2023, Month::December, 25)));
        assert_eq!(format.format(date(2023, Month::December, 25)), "12-25-2023");
    }

    #[test]
    fn probe_flags_the_other_separator() {
        let format = DateFormat::default();
        assert_eq!(
            format.probe("05/03/24"),
            DateProbe::Date(date(2024, Month::March, 5))
        );
        assert_eq!(format.probe("05-03-24"), DateProbe::WrongSeparators);
        assert_eq!(format.probe("Pérez"), DateProbe::NotADate);
    }

    #[test]
    fn from_str_accepts_every_layout() {
        for format in DateFormat::ALL {
            let parsed: DateFormat = format.pattern().parse().expect("known layout");
            assert_eq!(parsed, format);
        }
        assert!("yyyy-mm-dd".parse::<DateFormat>().is_err());
    }

    #[test]
    fn db_timestamps_round_trip_the_date() {
        let day = date(2001, Month::July, 9);
        assert_eq!(to_db_timestamp(day), "2001-07-09 00:00:00.000");
        assert_eq!(to_db_date_prefix(day), "2001-07-09");
        assert_eq!(from_db_timestamp("2001-07-09 00:00:00.000"), Some(day));
        assert_eq!(from_db_timestamp("garbage"), None);
    }
}
