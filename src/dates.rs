//! Resolution of the board's relative date phrases.

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};

/// Token the board displays for "today".
const TODAY_TOKEN: &str = "heute";
/// Token the board displays for "yesterday".
const YESTERDAY_TOKEN: &str = "gestern";

/// Clock readings captured once at the start of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub started_at: NaiveDateTime,
}

impl RunContext {
    /// Capture the local wall clock, truncated to whole seconds.
    #[must_use]
    pub fn now() -> Self {
        let now = Local::now().naive_local();
        Self::at(now.with_nanosecond(0).unwrap_or(now))
    }

    #[must_use]
    pub fn at(started_at: NaiveDateTime) -> Self {
        Self { started_at }
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.started_at.date()
    }

    /// Timestamp stamped on every record extracted during this run.
    #[must_use]
    pub fn crawl_timestamp(&self) -> NaiveDateTime {
        self.started_at
    }

    #[must_use]
    pub fn date_normalizer(&self) -> DateNormalizer {
        DateNormalizer::new(self.today())
    }
}

/// Turns "heute" / "gestern" phrases into `%Y-%m-%d` dates.
///
/// [`normalize`](Self::normalize) is for last-post cells, where an absolute
/// date is followed by a time: only the first whitespace-delimited token is
/// kept. [`normalize_date_cell`](Self::normalize_date_cell) keeps the whole
/// cell instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateNormalizer {
    today: NaiveDate,
}

impl DateNormalizer {
    #[must_use]
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    fn relative(&self, phrase: &str) -> Option<String> {
        let lowered = phrase.to_lowercase();
        let date = if lowered.contains(TODAY_TOKEN) {
            self.today
        } else if lowered.contains(YESTERDAY_TOKEN) {
            self.today.pred_opt().unwrap_or(self.today)
        } else {
            return None;
        };
        Some(date.format("%Y-%m-%d").to_string())
    }

    #[must_use]
    pub fn normalize(&self, phrase: &str) -> String {
        self.relative(phrase).unwrap_or_else(|| {
            phrase
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string()
        })
    }

    /// Like [`normalize`](Self::normalize), but an absolute date such as
    /// "01. Januar 2021" or a placeholder is kept whole, only trimmed.
    #[must_use]
    pub fn normalize_date_cell(&self, cell: &str) -> String {
        self.relative(cell)
            .unwrap_or_else(|| cell.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> DateNormalizer {
        DateNormalizer::new(NaiveDate::from_ymd_opt(2023, 3, 1).unwrap())
    }

    #[test]
    fn test_today_resolves_to_run_date() {
        let n = normalizer();
        assert_eq!(n.normalize("Heute 14:02"), "2023-03-01");
        assert_eq!(n.normalize("heute"), n.normalize("HEUTE"));
    }

    #[test]
    fn test_yesterday_crosses_month_boundary() {
        assert_eq!(normalizer().normalize("Gestern 23:59"), "2023-02-28");
    }

    #[test]
    fn test_absolute_date_passes_first_token() {
        let n = normalizer();
        assert_eq!(n.normalize("2022-11-05 10:15"), "2022-11-05");
        assert_eq!(n.normalize("  2022-11-05"), "2022-11-05");
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_date_cell_keeps_absolute_text() {
        let n = normalizer();
        assert_eq!(n.normalize_date_cell(" 01. Januar 2021 "), "01. Januar 2021");
        assert_eq!(n.normalize_date_cell("Nicht angegeben"), "Nicht angegeben");
        assert_eq!(n.normalize_date_cell("Heute"), "2023-03-01");
        assert_eq!(n.normalize_date_cell("gestern"), "2023-02-28");
    }

    #[test]
    fn test_run_context_is_stable() {
        let ctx = RunContext::at(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 5)
                .unwrap(),
        );
        let first = ctx.date_normalizer().normalize("gestern");
        let second = ctx.date_normalizer().normalize("gestern");
        assert_eq!(first, "2023-12-31");
        assert_eq!(first, second);
    }
}
