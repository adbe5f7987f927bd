//! Supported notification languages and language-stable date formatting.
//!
//! Parents pick one of a closed set of languages; anything else coerces to
//! the default (French). Due dates are rendered as "day month-name year" in
//! the target language so the downstream text-generation call never has to
//! guess a locale.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Closed set of languages supported by reminders and broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ar,
    Fr,
    En,
}

impl Language {
    pub const DEFAULT: Language = Language::Fr;

    pub const ALL: [Language; 3] = [Language::Ar, Language::Fr, Language::En];

    /// Parse a stored language code, coercing unknown or missing values
    /// to the default.
    pub fn parse(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_lowercase()).as_deref() {
            Some("ar") => Language::Ar,
            Some("fr") => Language::Fr,
            Some("en") => Language::En,
            _ => Language::DEFAULT,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Ar => "ar",
            Language::Fr => "fr",
            Language::En => "en",
        }
    }

    /// Format a date as "day month-name year" in this language.
    pub fn format_date(&self, date: NaiveDate) -> String {
        format!("{} {} {}", date.day(), self.month_name(date.month()), date.year())
    }

    fn month_name(&self, month: u32) -> &'static str {
        let idx = (month as usize).saturating_sub(1).min(11);
        match self {
            Language::Fr => FR_MONTHS[idx],
            Language::En => EN_MONTHS[idx],
            // Moroccan month names as used in official calendars.
            Language::Ar => AR_MONTHS[idx],
        }
    }
}

const FR_MONTHS: [&str; 12] = [
    "janvier", "février", "mars", "avril", "mai", "juin",
    "juillet", "août", "septembre", "octobre", "novembre", "décembre",
];

const EN_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

const AR_MONTHS: [&str; 12] = [
    "يناير", "فبراير", "مارس", "أبريل", "ماي", "يونيو",
    "يوليوز", "غشت", "شتنبر", "أكتوبر", "نونبر", "دجنبر",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_codes() {
        assert_eq!(Language::parse(Some("ar")), Language::Ar);
        assert_eq!(Language::parse(Some("fr")), Language::Fr);
        assert_eq!(Language::parse(Some("en")), Language::En);
        assert_eq!(Language::parse(Some(" EN ")), Language::En);
    }

    #[test]
    fn test_parse_unknown_coerces_to_default() {
        assert_eq!(Language::parse(Some("darija")), Language::Fr);
        assert_eq!(Language::parse(Some("")), Language::Fr);
        assert_eq!(Language::parse(None), Language::Fr);
    }

    #[test]
    fn test_format_date_french() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 14).unwrap();
        assert_eq!(Language::Fr.format_date(d), "14 janvier 2026");
    }

    #[test]
    fn test_format_date_english() {
        let d = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(Language::En.format_date(d), "3 August 2026");
    }

    #[test]
    fn test_format_date_arabic() {
        let d = NaiveDate::from_ymd_opt(2026, 12, 1).unwrap();
        assert_eq!(Language::Ar.format_date(d), "1 دجنبر 2026");
    }
}
