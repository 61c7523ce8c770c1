use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{error, warn};

use super::{parse_count_field, selector, text_of, FieldError};
use crate::dates::{DateNormalizer, RunContext};
use crate::fetch::resolve_link;
use crate::records::UserGeneralRecord;

static TBODY: LazyLock<Selector> = LazyLock::new(|| selector("tbody"));
static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static NEXT_LINK: LazyLock<Selector> = LazyLock::new(|| selector(r#"link[rel="next"]"#));

/// One page of the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListPage {
    /// `None` when the page has no row container at all.
    pub rows: Option<Vec<UserGeneralRecord>>,
    /// Absolute URL of the next page, if the page declares one.
    pub next: Option<String>,
}

/// Extracts the rows of a user directory page.
#[derive(Debug, Clone, Copy)]
pub struct UserListExtractor {
    ctx: RunContext,
    dates: DateNormalizer,
}

impl UserListExtractor {
    #[must_use]
    pub fn new(ctx: RunContext) -> Self {
        Self {
            ctx,
            dates: ctx.date_normalizer(),
        }
    }

    /// Extract the rows and the `next` link of the page at `page_url`.
    #[must_use]
    pub fn extract_page(&self, document: &Html, page_url: &str) -> UserListPage {
        let rows = document.select(&TBODY).next().map(|tbody| {
            tbody
                .select(&ROW)
                .enumerate()
                .filter_map(|(idx, row)| match self.row(&row) {
                    Ok(user) => Some(user),
                    Err(e) => {
                        warn!(url = %page_url, row = idx + 1, error = %e, "Could not extract user row, skipping it");
                        None
                    }
                })
                .collect()
        });

        if rows.is_none() {
            error!(url = %page_url, "Can't find user list on page");
        }

        UserListPage {
            rows,
            next: next_page(document, page_url),
        }
    }

    fn row(&self, row: &ElementRef) -> Result<UserGeneralRecord, FieldError> {
        let cells: Vec<ElementRef> = row.select(&CELL).collect();
        let cell = |idx: usize, field: &'static str| cells.get(idx).ok_or(FieldError::Missing(field));

        let anchor = cell(0, "name")?
            .select(&ANCHOR)
            .next()
            .ok_or(FieldError::Missing("name"))?;
        let profile_link = anchor
            .value()
            .attr("href")
            .ok_or(FieldError::Missing("profile_link"))?
            .to_string();

        let posts = first_token(cell(2, "post_count")?).ok_or(FieldError::Missing("post_count"))?;
        let points = first_token(cell(3, "points")?).ok_or(FieldError::Missing("points"))?;

        Ok(UserGeneralRecord {
            name: text_of(&anchor),
            title: text_of(cell(1, "title")?),
            profile_link,
            post_count: parse_count_field("post_count", &posts)?,
            points: parse_count_field("points", &points)?,
            registration_date: self.dates.normalize_date_cell(&text_of(cell(4, "registration_date")?)),
            crawl_timestamp: self.ctx.crawl_timestamp(),
        })
    }
}

fn first_token(cell: &ElementRef) -> Option<String> {
    text_of(cell).split_whitespace().next().map(str::to_string)
}

/// The page's declared `<link rel="next">`, resolved against the page URL.
#[must_use]
pub fn next_page(document: &Html, page_url: &str) -> Option<String> {
    document
        .select(&NEXT_LINK)
        .find_map(|link| link.value().attr("href"))
        .map(|href| resolve_link(page_url, href))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const PAGE_URL: &str = "http://forum.test/userlist.php?p=1";

    fn extractor() -> UserListExtractor {
        UserListExtractor::new(RunContext::at(
            NaiveDate::from_ymd_opt(2023, 7, 15)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        ))
    }

    fn row(name: &str, posts: &str, reg: &str) -> String {
        format!(
            r#"<tr><td class="tcl"><a href="profile.php?id={name}">{name}</a></td>
            <td class="tc2">Mitglied</td><td class="tc3">{posts} Beiträge</td>
            <td class="tc4">12 Punkte</td><td class="tcr">{reg}</td></tr>"#
        )
    }

    #[test]
    fn test_extract_rows_and_next() {
        let html = format!(
            r#"<html><head><link rel="next" href="userlist.php?p=2"></head><body>
            <table><thead><tr><th>Name</th></tr></thead><tbody>{}{}</tbody></table></body></html>"#,
            row("alice", "1,024", "Heute"),
            row("bob", "3", "2021-04-01")
        );
        let page = extractor().extract_page(&Html::parse_document(&html), PAGE_URL);
        let rows = page.rows.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "alice");
        assert_eq!(rows[0].profile_link, "profile.php?id=alice");
        assert_eq!(rows[0].title, "Mitglied");
        assert_eq!(rows[0].post_count, 1024);
        assert_eq!(rows[0].points, 12);
        assert_eq!(rows[0].registration_date, "2023-07-15");
        assert_eq!(rows[1].registration_date, "2021-04-01");
        assert_eq!(
            page.next.as_deref(),
            Some("http://forum.test/userlist.php?p=2")
        );
    }

    #[test]
    fn test_yesterday_registration() {
        let html = format!("<table><tbody>{}</tbody></table>", row("carol", "0", "Gestern"));
        let page = extractor().extract_page(&Html::parse_document(&html), PAGE_URL);
        assert_eq!(page.rows.unwrap()[0].registration_date, "2023-07-14");
    }

    #[test]
    fn test_absolute_registration_keeps_full_text() {
        let html = format!(
            "<table><tbody>{}{}</tbody></table>",
            row("erin", "7", "01. Januar 2021"),
            row("frank", "2", " Nicht angegeben ")
        );
        let page = extractor().extract_page(&Html::parse_document(&html), PAGE_URL);
        let rows = page.rows.unwrap();
        assert_eq!(rows[0].registration_date, "01. Januar 2021");
        assert_eq!(rows[1].registration_date, "Nicht angegeben");
    }

    #[test]
    fn test_short_row_is_skipped() {
        let html = format!(
            r#"<table><tbody><tr><td>Keine Benutzer</td></tr>{}</tbody></table>"#,
            row("dave", "5", "2020-01-01")
        );
        let page = extractor().extract_page(&Html::parse_document(&html), PAGE_URL);
        let rows = page.rows.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "dave");
    }

    #[test]
    fn test_missing_row_container() {
        let page = extractor().extract_page(&Html::parse_document("<p>leer</p>"), PAGE_URL);
        assert!(page.rows.is_none());
        assert!(page.next.is_none());
    }
}
