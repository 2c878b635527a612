// =============================================================================
// html_source.rs — SCREEN-SCRAPING THE LANDING PAGE
// =============================================================================
//
// The very last resort. www.na.org.br/virtual/ renders the meeting list as a
// plain table:
//
//   <tr>
//     <td>Quarta-feira</td> <td>19:30</td> <td>20:30</td>
//     <td>Grupo Esperança</td> <td>Zoom</td> ... <a href="https://zoom.us/j/…">
//   </tr>
//
// Columns are positional. Weekdays are Portuguese names, times are hh:mm,
// and the video link (when there is one) is an anchor anywhere in the row.
// One failed GET means this source is done; there is no TLS downgrade here.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::http::{PageFetcher, TlsMode};
use crate::models::{CanonicalMeeting, CivilTime, LinkPolicy, UNNAMED_MEETING};
use crate::patterns;
use crate::sources::MeetingSource;

/// Portuguese weekday names (lower-cased), Sunday = 0.
const WEEKDAYS: &[(&str, u8)] = &[
    ("domingo", 0),
    ("segunda-feira", 1),
    ("segunda", 1),
    ("terça-feira", 2),
    ("terça", 2),
    ("terca-feira", 2),
    ("terca", 2),
    ("quarta-feira", 3),
    ("quarta", 3),
    ("quinta-feira", 4),
    ("quinta", 4),
    ("sexta-feira", 5),
    ("sexta", 5),
    ("sábado", 6),
    ("sabado", 6),
];

/// Used when a time cell is blank.
const MIDNIGHT: &str = "00:00";

pub struct HtmlSource {
    fetcher: Arc<dyn PageFetcher>,
    url: String,
    policy: LinkPolicy,
    offset: FixedOffset,
}

impl HtmlSource {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        url: String,
        policy: LinkPolicy,
        offset: FixedOffset,
    ) -> Self {
        Self {
            fetcher,
            url,
            policy,
            offset,
        }
    }
}

#[async_trait]
impl MeetingSource for HtmlSource {
    fn name(&self) -> &str {
        "html-landing-page"
    }

    async fn fetch(&self) -> Option<Vec<CanonicalMeeting>> {
        info!(url = self.url.as_str(), "Falling back to scraping {}", self.url);

        let body = match self.fetcher.get_text(&self.url, TlsMode::Verify).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = self.url.as_str(), error = %e, "HTML fallback failed: {}", e);
                return None;
            }
        };

        let meetings = parse_listing(&body, self.policy, self.offset);
        info!(meetings = meetings.len(), "HTML fallback parsed {} rows", meetings.len());

        (!meetings.is_empty()).then_some(meetings)
    }
}

struct Selectors {
    rows: Selector,
    cells: Selector,
    anchors: Selector,
}

impl Selectors {
    fn build() -> Option<Self> {
        Some(Self {
            rows: Selector::parse("table tbody tr").ok()?,
            cells: Selector::parse("td").ok()?,
            anchors: Selector::parse("a[href]").ok()?,
        })
    }
}

/// Extract every usable meeting row from the landing page, in page order.
pub fn parse_listing(html: &str, policy: LinkPolicy, offset: FixedOffset) -> Vec<CanonicalMeeting> {
    let Some(selectors) = Selectors::build() else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let rows: Vec<ElementRef> = document.select(&selectors.rows).collect();
    if rows.is_empty() {
        warn!("No <tr> rows found in HTML fallback");
        return Vec::new();
    }

    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let meeting = parse_row(row, &selectors, policy, offset);
            if meeting.is_none() {
                debug!(row = index, "Skipping landing page row {}", index);
            }
            meeting
        })
        .collect()
}

fn parse_row(
    row: ElementRef,
    selectors: &Selectors,
    policy: LinkPolicy,
    offset: FixedOffset,
) -> Option<CanonicalMeeting> {
    let cells: Vec<ElementRef> = row.select(&selectors.cells).collect();
    if cells.len() < 4 {
        return None;
    }

    let weekday = weekday_from_name(&cell_text(cells[0]))?;
    let start = CivilTime::new(patterns::parse_clock(&clock_prefix(&cell_text(cells[1])))?, offset);
    let end = CivilTime::new(patterns::parse_clock(&clock_prefix(&cell_text(cells[2])))?, offset);

    let name = spaced_text(cells[3]);
    let name = if name.is_empty() {
        UNNAMED_MEETING.to_string()
    } else {
        name
    };

    let link = row
        .select(&selectors.anchors)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .find(|href| patterns::is_video_link(href))
        .map(str::to_string);

    let (platform, link) = match policy {
        LinkPolicy::RequireLink => (None, link?),
        LinkPolicy::Permissive => (
            Some(cells.get(4).map(|cell| cell_text(*cell)).unwrap_or_default()),
            link.unwrap_or_default(),
        ),
    };

    Some(CanonicalMeeting {
        name,
        weekday,
        start,
        end,
        platform,
        link,
    })
}

pub fn weekday_from_name(name: &str) -> Option<u8> {
    let name = name.trim().to_lowercase();
    WEEKDAYS
        .iter()
        .find(|(label, _)| *label == name)
        .map(|(_, day)| *day)
}

/// Visible text of a cell with any leftover markup removed.
fn cell_text(cell: ElementRef) -> String {
    let text: String = cell.text().collect();
    patterns::strip_tags(&text).trim().to_string()
}

/// Visible text with each text node trimmed and joined by a single space,
/// so `<b>Grupo</b>\n  <i>Esperança</i>` reads "Grupo Esperança".
fn spaced_text(cell: ElementRef) -> String {
    let joined = cell
        .text()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    patterns::strip_tags(&joined).trim().to_string()
}

/// First five characters (`hh:mm`), or midnight for a blank cell.
fn clock_prefix(text: &str) -> String {
    let prefix: String = text.chars().take(5).collect();
    if prefix.is_empty() {
        MIDNIGHT.to_string()
    } else {
        prefix
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;
    use serde_json::json;

    use super::*;
    use crate::http::scripted::ScriptedFetcher;
    use crate::http::FetchError;

    const PAGE_URL: &str = "https://www.na.example/virtual/";

    fn sao_paulo() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    fn page(rows: &str) -> String {
        format!(
            "<html><body><table><thead><tr><th>Dia</th><th>Início</th><th>Fim</th><th>Grupo</th></tr></thead>\
             <tbody>{rows}</tbody></table></body></html>"
        )
    }

    const ESPERANCA: &str = r#"<tr><td>Quarta-feira</td><td>19:30</td><td>20:30</td>
        <td>Grupo Esperança</td><td>Zoom</td><td><a href="https://zoom.us/j/123">Entrar</a></td></tr>"#;

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_from_name("Domingo"), Some(0));
        assert_eq!(weekday_from_name(" Terça-feira "), Some(2));
        assert_eq!(weekday_from_name("SÁBADO"), Some(6));
        assert_eq!(weekday_from_name("sexta"), Some(5));
        assert_eq!(weekday_from_name("Wednesday"), None);
    }

    #[test]
    fn test_strict_row_matches_directory_reference_record() {
        let meetings = parse_listing(&page(ESPERANCA), LinkPolicy::RequireLink, sao_paulo());
        assert_eq!(
            serde_json::to_value(&meetings).unwrap(),
            json!([{
                "name": "Grupo Esperança",
                "weekday": 3,
                "start": "19:30:00-03:00",
                "end": "20:30:00-03:00",
                "link": "https://zoom.us/j/123"
            }])
        );
    }

    #[test]
    fn test_permissive_row_carries_platform_and_optional_link() {
        let rows = format!(
            "{ESPERANCA}<tr><td>Domingo</td><td>08:00:00</td><td>09:00</td><td>Grupo Aurora</td></tr>"
        );
        let meetings = parse_listing(&page(&rows), LinkPolicy::Permissive, sao_paulo());

        assert_eq!(meetings.len(), 2);
        assert_eq!(meetings[0].platform.as_deref(), Some("Zoom"));
        assert_eq!(meetings[0].link, "https://zoom.us/j/123");
        assert_eq!(meetings[1].name, "Grupo Aurora");
        assert_eq!(meetings[1].platform.as_deref(), Some(""));
        assert_eq!(meetings[1].link, "");
    }

    #[test]
    fn test_strict_policy_skips_rows_without_video_anchor() {
        let rows = format!(
            "<tr><td>Segunda-feira</td><td>20:00</td><td>21:00</td><td>Grupo Sem Sala</td>\
             <td><a href=\"https://www.na.org.br/\">site</a></td></tr>{ESPERANCA}"
        );
        let meetings = parse_listing(&page(&rows), LinkPolicy::RequireLink, sao_paulo());
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].name, "Grupo Esperança");
    }

    #[test]
    fn test_rows_with_unknown_weekday_or_few_cells_are_skipped() {
        let rows = format!(
            "<tr><td>Feriado</td><td>10:00</td><td>11:00</td><td>Grupo X</td></tr>\
             <tr><td>Quarta-feira</td><td>10:00</td><td>11:00</td></tr>{ESPERANCA}"
        );
        let meetings = parse_listing(&page(&rows), LinkPolicy::Permissive, sao_paulo());
        assert_eq!(meetings.len(), 1);
    }

    #[test]
    fn test_markup_is_stripped_and_blanks_default() {
        let rows = "<tr><td><strong>Sábado</strong></td><td></td><td> </td>\
                    <td>  <b>Grupo</b>\n   <i>Vida Nova</i> </td><td>&lt;em&gt;Meet&lt;/em&gt;</td></tr>\
                    <tr><td>Quinta-feira</td><td>21:00</td><td>22:00</td><td></td></tr>";
        let meetings = parse_listing(&page(rows), LinkPolicy::Permissive, sao_paulo());

        assert_eq!(meetings.len(), 2);
        assert_eq!(meetings[0].weekday, 6);
        assert_eq!(meetings[0].name, "Grupo Vida Nova");
        assert_eq!(meetings[0].platform.as_deref(), Some("Meet"));
        assert_eq!(meetings[0].start.time, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(meetings[0].end.time, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(meetings[1].name, UNNAMED_MEETING);
    }

    #[test]
    fn test_page_without_table_rows_is_empty() {
        let meetings = parse_listing(
            "<html><body><p>Em manutenção</p></body></html>",
            LinkPolicy::Permissive,
            sao_paulo(),
        );
        assert!(meetings.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_nothing_without_retry() {
        let fetcher = Arc::new(
            ScriptedFetcher::new().respond(PAGE_URL, Err(FetchError::Tls("bad certificate".into()))),
        );
        let shared: Arc<dyn PageFetcher> = fetcher.clone();
        let source = HtmlSource::new(shared, PAGE_URL.to_string(), LinkPolicy::Permissive, sao_paulo());

        assert_eq!(source.fetch().await, None);
        assert_eq!(fetcher.calls(), vec![(PAGE_URL.to_string(), TlsMode::Verify)]);
    }

    #[tokio::test]
    async fn test_fetch_parses_page() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond(PAGE_URL, Ok(page(ESPERANCA))));
        let shared: Arc<dyn PageFetcher> = fetcher.clone();
        let source = HtmlSource::new(shared, PAGE_URL.to_string(), LinkPolicy::RequireLink, sao_paulo());

        let meetings = source.fetch().await.unwrap();
        assert_eq!(meetings.len(), 1);
        assert_eq!(meetings[0].weekday, 3);
    }
}
