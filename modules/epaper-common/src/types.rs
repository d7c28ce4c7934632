use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EpaperError;

// --- Publications ---

/// A publication tracked by the pipeline: display name plus the site's code token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub name: String,
    /// Site-specific token used in upload filenames, e.g. `TH-+Delhi`.
    pub code: String,
}

impl Publication {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Code as used in archived filenames (`+` replaced with `-`).
    pub fn file_code(&self) -> String {
        self.code.replace('+', "-")
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

// --- Edition dates ---

/// The logical edition date. Captured once per run; every other date
/// representation (filename token, history key, month label) derives from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditionDate(NaiveDate);

impl EditionDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Compact `DD-MM` token used in site filenames and archive filenames.
    pub fn token(&self) -> String {
        self.0.format("%d-%m").to_string()
    }

    /// `DD/MM`, as shown to humans in notifications.
    pub fn display_token(&self) -> String {
        self.0.format("%d/%m").to_string()
    }

    /// `YYYY-MM-DD`, the key of the history document.
    pub fn history_key(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn month(&self) -> MonthLabel {
        MonthLabel::of(self.0)
    }
}

impl fmt::Display for EditionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.history_key())
    }
}

impl FromStr for EditionDate {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

// --- Month labels ---

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Archive folder label, rendered as fixed-width `MMMYY` (e.g. `MAR24`).
///
/// Ordering is chronological on `(year, month)`. The rendered labels do not
/// sort chronologically as strings (`APR24` < `MAR24`), so comparisons always
/// go through the parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthLabel {
    year: i32,
    month: u32,
}

impl MonthLabel {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The label `n` calendar months before this one.
    pub fn months_back(&self, n: u32) -> Self {
        let back = i32::try_from(n).unwrap_or(i32::MAX);
        let index = (self.year * 12 + self.month as i32 - 1).saturating_sub(back);
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn previous(&self) -> Self {
        self.months_back(1)
    }
}

impl fmt::Display for MonthLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02}",
            MONTH_ABBREVIATIONS[(self.month - 1) as usize],
            self.year.rem_euclid(100)
        )
    }
}

impl FromStr for MonthLabel {
    type Err = EpaperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EpaperError::MonthLabel(s.to_string());
        if s.len() != 5 || !s.is_ascii() {
            return Err(invalid());
        }
        let (name, yy) = s.split_at(3);
        let month = MONTH_ABBREVIATIONS
            .iter()
            .position(|m| m.eq_ignore_ascii_case(name))
            .ok_or_else(invalid)? as u32
            + 1;
        if !yy.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let yy: i32 = yy.parse().map_err(|_| invalid())?;
        Ok(Self {
            year: 2000 + yy,
            month,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> EditionDate {
        EditionDate::from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn edition_tokens_derive_from_one_date() {
        let d = date(2024, 3, 14);
        assert_eq!(d.token(), "14-03");
        assert_eq!(d.display_token(), "14/03");
        assert_eq!(d.history_key(), "2024-03-14");
        assert_eq!(d.month().to_string(), "MAR24");
    }

    #[test]
    fn edition_date_parses_iso() {
        let d: EditionDate = "2025-12-01".parse().unwrap();
        assert_eq!(d, date(2025, 12, 1));
        assert!("01/12/2025".parse::<EditionDate>().is_err());
    }

    #[test]
    fn file_code_replaces_plus() {
        let p = Publication::new("The Hindu", "TH-+Delhi");
        assert_eq!(p.file_code(), "TH--Delhi");
    }

    #[test]
    fn month_label_round_trips_through_display() {
        let label: MonthLabel = "DEC24".parse().unwrap();
        assert_eq!(label, MonthLabel::new(2024, 12).unwrap());
        assert_eq!(label.to_string(), "DEC24");
    }

    #[test]
    fn month_label_parse_is_case_insensitive() {
        let label: MonthLabel = "jan05".parse().unwrap();
        assert_eq!(label.to_string(), "JAN05");
    }

    #[test]
    fn month_label_rejects_garbage() {
        for bad in ["", "MAR2024", "XYZ24", "MAR2x", "MARCH", "ÄÄR24"] {
            assert!(bad.parse::<MonthLabel>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn month_label_orders_chronologically_not_lexically() {
        let mar: MonthLabel = "MAR24".parse().unwrap();
        let apr: MonthLabel = "APR24".parse().unwrap();
        let dec_prev: MonthLabel = "DEC23".parse().unwrap();
        assert!(mar < apr);
        assert!(dec_prev < mar);
        assert!("APR24" < "MAR24", "string order differs, hence the parsed comparison");
    }

    #[test]
    fn months_back_crosses_year_boundary() {
        let jan = MonthLabel::new(2025, 1).unwrap();
        assert_eq!(jan.previous(), MonthLabel::new(2024, 12).unwrap());
        assert_eq!(jan.months_back(2), MonthLabel::new(2024, 11).unwrap());
        assert_eq!(jan.months_back(0), jan);
        assert_eq!(jan.months_back(13), MonthLabel::new(2023, 12).unwrap());
        assert!(jan.months_back(u32::MAX) < jan);
    }

    #[test]
    fn month_label_new_validates_month() {
        assert!(MonthLabel::new(2024, 0).is_none());
        assert!(MonthLabel::new(2024, 13).is_none());
    }
}
