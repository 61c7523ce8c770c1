use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{first_text, parse_count_field, selector, text_of, FieldError};
use crate::records::{FeedbackEntry, FeedbackStatistic, ProfileDetails, TradeActivity};

static TRADE_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("li.first-item"));
static LEGEND_H4: LazyLock<Selector> = LazyLock::new(|| selector("h4.ct-legend"));
static LEGEND_H3: LazyLock<Selector> = LazyLock::new(|| selector("h3.ct-legend"));
static LIST_ITEM: LazyLock<Selector> = LazyLock::new(|| selector("li"));
static STRONG: LazyLock<Selector> = LazyLock::new(|| selector("strong"));
static FEEDBACK_ROW: LazyLock<Selector> =
    LazyLock::new(|| selector("div#trade-scroll tbody tr"));
static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static LINKED: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static BADGE_LINK: LazyLock<Selector> = LazyLock::new(|| selector("li a"));
static PRE: LazyLock<Selector> = LazyLock::new(|| selector("pre"));
static PUBLIC_KEY: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"pre[style="line-height:15px;user-select:all"]"#));
static ALPHA_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[a-zA-Z]+").expect("Invalid regex"));

const TRADE_LABEL: &str = "Handelspunkte";
const AVERAGES_LABEL: &str = "Feedback-Durchschnittswerte";
const ENTRIES_LABEL: &str = "Feedback zum Verkäufer";
const BADGE_LABEL: &str = "Abzeichen";
/// Link text appended to feedback dates that have a detail page.
const DETAILS_SUFFIX: &str = "(Einzelheiten)";

/// Extract the optional sections of a user's profile page.
///
/// Each section is looked up on its own; a missing or malformed section is
/// reported as `None` and never affects the others.
#[must_use]
pub fn extract_profile_details(document: &Html) -> ProfileDetails {
    ProfileDetails {
        badge: badge(document),
        trade_activity: trade_activity(document),
        feedback_statistic: feedback_statistic(document),
        feedback_entries: feedback_entries(document),
        fingerprint: document.select(&PRE).next().map(|pre| text_of(&pre)),
        public_key: document.select(&PUBLIC_KEY).next().map(|pre| text_of(&pre)),
    }
}

/// First element matching `selector` whose text contains `label`.
fn labeled<'a>(document: &'a Html, selector: &Selector, label: &str) -> Option<ElementRef<'a>> {
    document
        .select(selector)
        .find(|e| e.text().collect::<String>().contains(label))
}

fn parent_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.parent().and_then(ElementRef::wrap)
}

fn next_sibling_element<'a>(element: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

/// The `<strong>` values of the first `n` list items under `container`.
fn strong_values(container: &ElementRef, n: usize) -> Option<Vec<String>> {
    let values: Vec<String> = container
        .select(&LIST_ITEM)
        .take(n)
        .filter_map(|li| first_text(&li, &STRONG))
        .collect();
    (values.len() == n).then_some(values)
}

fn trade_activity(document: &Html) -> Option<TradeActivity> {
    let item = labeled(document, &TRADE_ITEM, TRADE_LABEL)?;
    debug!("Trading activity exists, extracting it");

    let parsed = parent_element(&item)
        .and_then(|list| strong_values(&list, 4))
        .ok_or(FieldError::Missing("trade_activity"))
        .and_then(|values| {
            Ok(TradeActivity {
                points: parse_count_field("trade_points", &values[0])?,
                positive: parse_count_field("positive_feedbacks", &values[1])?,
                neutral: parse_count_field("neutral_feedbacks", &values[2])?,
                negative: parse_count_field("negative_feedbacks", &values[3])?,
            })
        });

    parsed
        .map_err(|e| warn!(error = %e, "Malformed trading activity section"))
        .ok()
}

fn feedback_statistic(document: &Html) -> Option<FeedbackStatistic> {
    let legend = labeled(document, &LEGEND_H4, AVERAGES_LABEL)?;
    debug!("Feedback averages exist, extracting them");

    let Some(values) = next_sibling_element(&legend).and_then(|list| strong_values(&list, 3)) else {
        warn!("Malformed feedback averages section");
        return None;
    };
    let mut values = values.into_iter();

    Some(FeedbackStatistic {
        packaging: values.next().unwrap_or_default(),
        contact_delivery: values.next().unwrap_or_default(),
        product: values.next().unwrap_or_default(),
    })
}

fn feedback_entries(document: &Html) -> Option<Vec<FeedbackEntry>> {
    let legend = labeled(document, &LEGEND_H3, ENTRIES_LABEL)?;
    debug!("Feedback table exists, extracting it");

    let Some(section) = parent_element(&legend) else {
        warn!("Feedback table legend has no parent");
        return None;
    };

    let entries = section
        .select(&FEEDBACK_ROW)
        .filter_map(|row| {
            let cells: Vec<ElementRef> = row.select(&CELL).collect();
            if cells.len() < 4 {
                return None;
            }
            Some(FeedbackEntry {
                date: feedback_date(&cells[0]),
                mark: normalize_mark(&text_of(&cells[1])),
                comment: text_of(&cells[2]),
                author: feedback_author(&cells[3]),
            })
        })
        .collect();

    Some(entries)
}

/// Date cell text without the embedded id span and the details link.
fn feedback_date(cell: &ElementRef) -> String {
    let mut date = text_of(cell);
    if let Some(span) = cell.select(&SPAN).next() {
        let id = text_of(&span);
        if !id.is_empty() {
            date = date.replace(&id, "");
        }
    }
    date.replace(DETAILS_SUFFIX, "").trim().to_string()
}

/// The buyer is the second link of the cell; the first links the item.
fn feedback_author(cell: &ElementRef) -> String {
    let links: Vec<ElementRef> = cell.select(&LINKED).take(2).collect();
    links
        .last()
        .map_or_else(|| text_of(cell), |link| text_of(link))
}

/// Rewrite a feedback grade as `"<Polarity>, <rest>"`.
///
/// The polarity is found case-insensitively; `rest` is whatever followed its
/// last occurrence in the original text. Grades without a known polarity
/// are returned trimmed.
#[must_use]
pub fn normalize_mark(raw: &str) -> String {
    const POLARITIES: [(&str, &str); 3] = [
        ("positiv", "Positiv"),
        ("negativ", "Negativ"),
        ("neutral", "Neutral"),
    ];

    let trimmed = raw.trim();
    // ASCII lowercasing keeps byte offsets aligned with `trimmed`.
    let lowered = trimmed.to_ascii_lowercase();
    for (needle, label) in POLARITIES {
        if let Some(pos) = lowered.rfind(needle) {
            return format!("{label}, {}", &trimmed[pos + needle.len()..]);
        }
    }
    trimmed.to_string()
}

fn badge(document: &Html) -> Option<String> {
    let legend = labeled(document, &LEGEND_H4, BADGE_LABEL)?;
    debug!("Badge exists, extracting it");

    let text = next_sibling_element(&legend)
        .and_then(|list| list.select(&BADGE_LINK).next())
        .map(|link| text_of(&link));
    let badge = text
        .as_deref()
        .and_then(|t| ALPHA_RUN.find(t))
        .map(|m| m.as_str().to_string());

    if badge.is_none() {
        warn!("Malformed badge section");
    }
    badge
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PROFILE: &str = r#"
<html><body>
<div class="profile">
  <h4 class="ct-legend">Abzeichen</h4><ul><li><a href="/badges/3">Gold-Händler 3</a></li></ul>
  <ul class="trade">
    <li class="first-item"><span>Handelspunkte</span> <strong>1,250</strong></li>
    <li><span>Positiv</span> <strong>40</strong></li>
    <li><span>Neutral</span> <strong>2</strong></li>
    <li><span>Negativ</span> <strong>1</strong></li>
  </ul>
  <h4 class="ct-legend">Feedback-Durchschnittswerte</h4><ul>
    <li>Produktverpackung <strong>sehr gut</strong></li>
    <li>Kontakt &amp; Lieferung <strong>gut</strong></li>
    <li>Produkt/Dienstleistung <strong>befriedigend</strong></li>
  </ul>
  <div class="feedback">
    <h3 class="ct-legend">Feedback zum Verkäufer</h3>
    <div id="trade-scroll"><table><tbody>
      <tr><td>2023-02-01 <span>#991</span> (Einzelheiten)</td><td>Positiv (Lieferung)</td>
          <td>Alles bestens</td><td><a href="/item/1">Ware</a> von <a href="/u/7">frank</a></td></tr>
      <tr><td>2023-01-15</td><td>NEGATIV (3 Tage)</td><td>zu spät</td><td><a href="/u/8">gina</a></td></tr>
      <tr><td>kaputt</td><td>nur drei</td><td>Zellen</td></tr>
    </tbody></table></div>
  </div>
  <pre>AB12 CD34 EF56</pre>
  <pre style="line-height:15px;user-select:all">-----BEGIN PGP PUBLIC KEY BLOCK-----</pre>
</div>
</body></html>"#;

    #[test]
    fn test_full_profile() {
        let details = extract_profile_details(&Html::parse_document(FULL_PROFILE));

        assert_eq!(details.badge.as_deref(), Some("Gold"));
        assert_eq!(
            details.trade_activity,
            Some(TradeActivity {
                points: 1250,
                positive: 40,
                neutral: 2,
                negative: 1,
            })
        );
        assert_eq!(
            details.feedback_statistic,
            Some(FeedbackStatistic {
                packaging: "sehr gut".to_string(),
                contact_delivery: "gut".to_string(),
                product: "befriedigend".to_string(),
            })
        );

        let entries = details.feedback_entries.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, "2023-02-01");
        assert_eq!(entries[0].mark, "Positiv,  (Lieferung)");
        assert_eq!(entries[0].comment, "Alles bestens");
        assert_eq!(entries[0].author, "frank");
        assert_eq!(entries[1].mark, "Negativ,  (3 Tage)");
        assert_eq!(entries[1].author, "gina");

        assert_eq!(details.fingerprint.as_deref(), Some("AB12 CD34 EF56"));
        assert_eq!(
            details.public_key.as_deref(),
            Some("-----BEGIN PGP PUBLIC KEY BLOCK-----")
        );
    }

    #[test]
    fn test_empty_profile_has_no_sections() {
        let details = extract_profile_details(&Html::parse_document(
            "<html><body><p>Kein Profil</p></body></html>",
        ));
        assert_eq!(details, ProfileDetails::default());
    }

    #[test]
    fn test_malformed_section_does_not_affect_others() {
        let html = r#"<html><body>
            <ul><li class="first-item">Handelspunkte <strong>viele</strong></li><li><strong>1</strong></li>
                <li><strong>2</strong></li><li><strong>3</strong></li></ul>
            <pre>FINGERPRINT</pre>
        </body></html>"#;
        let details = extract_profile_details(&Html::parse_document(html));

        assert!(details.trade_activity.is_none());
        assert_eq!(details.fingerprint.as_deref(), Some("FINGERPRINT"));
    }

    #[test]
    fn test_normalize_mark() {
        assert_eq!(normalize_mark("Negativ (3 Tage)"), "Negativ,  (3 Tage)");
        assert_eq!(normalize_mark("  positiv"), "Positiv, ");
        assert_eq!(normalize_mark("Neutral - ok"), "Neutral,  - ok");
        assert_eq!(normalize_mark("unbekannt"), "unbekannt");
    }
}
