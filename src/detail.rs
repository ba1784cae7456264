use crate::constants::DETAIL_READY_SELECTOR;
use crate::error::{Result, ScraperError};
use crate::fetcher::{FetchRequest, PageSession};
use crate::resolver::resolve_href;
use crate::types::DetailFragments;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Declarative fragment-name → CSS-selector map for a detail page.
///
/// Injected into the collector so a markup revision is a data change, not a
/// code change. Defaults target the current ticketing-site markup.
#[derive(Debug, Clone)]
pub struct FragmentSelectors {
    pub poster: String,
    pub info: String,
    pub summary: String,
    pub description: String,
    pub booking: String,
}

impl Default for FragmentSelectors {
    fn default() -> Self {
        Self {
            poster: r#"div[class^="DetailSummary_imageContainer"] img"#.to_string(),
            info: r#"div[class^="DetailInfo_infoWrap"]"#.to_string(),
            summary: r#"article[class^="DetailSummary_infoBox"]"#.to_string(),
            description: r#"div[class^="DetailInfo_contents"]"#.to_string(),
            booking: r#"button[class^="DetailBooking_bookingBtn"]"#.to_string(),
        }
    }
}

/// Fetches one detail page and pulls its named fragments.
///
/// Never lets a fetch or parse problem escape: a failed page collapses to an
/// all-absent fragment set and bumps the error tally. The orchestrator reads
/// the tally once the run is over.
pub struct DetailCollector {
    poster: Selector,
    info: Selector,
    summary: Selector,
    description: Selector,
    booking: Selector,
    error_tally: usize,
}

impl DetailCollector {
    pub fn new(selectors: &FragmentSelectors) -> Result<Self> {
        Ok(Self {
            poster: compile(&selectors.poster)?,
            info: compile(&selectors.info)?,
            summary: compile(&selectors.summary)?,
            description: compile(&selectors.description)?,
            booking: compile(&selectors.booking)?,
            error_tally: 0,
        })
    }

    /// Fetch and parse failures recovered into empty fragment sets so far.
    pub fn error_tally(&self) -> usize {
        self.error_tally
    }

    /// Collects the fragment set for one absolute detail URL.
    pub async fn collect(&mut self, session: &mut dyn PageSession, url: &str) -> DetailFragments {
        let request = FetchRequest::new(url)
            .wait_for(DETAIL_READY_SELECTOR)
            .header("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64)")
            .bypass_cache();

        let page = match session.fetch(request).await {
            Ok(page) if page.success() => page,
            Ok(page) => {
                warn!(url, status = page.status, "Detail fetch returned non-success status");
                self.error_tally += 1;
                return DetailFragments::default();
            }
            Err(e) => {
                warn!(url, error = %e, "Detail fetch failed");
                self.error_tally += 1;
                return DetailFragments::default();
            }
        };

        let mut fragments = self.parse(&page.html, &page.final_url);
        fragments.final_url = Some(page.final_url);

        if fragments.summary.is_none() && fragments.description.is_none() {
            // The expected containers were missing outright; count it even
            // though the partial fragment set is still forwarded.
            warn!(url, "Detail page carried none of the expected containers");
            self.error_tally += 1;
        } else {
            debug!(url, booking = fragments.booking_present, "Collected detail fragments");
        }

        fragments
    }

    fn parse(&self, html: &str, base_url: &str) -> DetailFragments {
        let document = Html::parse_document(html);

        let poster = document
            .select(&self.poster)
            .next()
            .and_then(|img| img.value().attr("src"))
            .and_then(|src| resolve_href(base_url, src));

        DetailFragments {
            poster,
            info: document.select(&self.info).next().and_then(block_text),
            summary: document.select(&self.summary).next().and_then(block_text),
            description: document.select(&self.description).next().and_then(block_text),
            booking_present: document.select(&self.booking).next().is_some(),
            final_url: None,
        }
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|_| ScraperError::Config(format!("Bad fragment selector '{selector}'")))
}

fn block_text(element: ElementRef) -> Option<String> {
    let text = element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedPage;
    use async_trait::async_trait;

    const DETAIL_HTML: &str = r#"<html><body>
        <div class="DetailSummary_imageContainer__OmWus">
            <img src="//ticketimage.example.com/Play/image/large/25/25001426_p.gif"/>
        </div>
        <article class="DetailSummary_infoBox__5we4P">
            장소: KSPO DOME
            관람연령: 만 7세 이상
        </article>
        <div class="DetailInfo_infoWrap__1BtFi">티켓오픈: 2025-02-10 20:00</div>
        <div class="DetailInfo_contents__grsx5">
            2NE1이 앵콜 콘서트로 돌아옵니다.
        </div>
        <button class="DetailBooking_bookingBtn__uvSid">예매하기</button>
    </body></html>"#;

    struct OnePageSession {
        page: Option<FetchedPage>,
    }

    #[async_trait]
    impl PageSession for OnePageSession {
        async fn fetch(&mut self, request: FetchRequest) -> crate::error::Result<FetchedPage> {
            match self.page.take() {
                Some(page) => Ok(page),
                None => Err(ScraperError::Fetch(format!("no page for {}", request.url))),
            }
        }

        async fn scroll_more(&mut self) -> crate::error::Result<FetchedPage> {
            Err(ScraperError::Fetch("not a listing session".to_string()))
        }
    }

    #[tokio::test]
    async fn collects_all_fragments_from_detail_markup() {
        let mut session = OnePageSession {
            page: Some(FetchedPage {
                html: DETAIL_HTML.to_string(),
                final_url: "https://tickets.example.com/goods/25001426".to_string(),
                status: 200,
            }),
        };
        let mut collector = DetailCollector::new(&FragmentSelectors::default()).unwrap();

        let fragments = collector
            .collect(&mut session, "https://tickets.example.com/goods/25001426")
            .await;

        assert_eq!(
            fragments.poster.as_deref(),
            Some("https://ticketimage.example.com/Play/image/large/25/25001426_p.gif")
        );
        assert!(fragments.summary.unwrap().contains("KSPO DOME"));
        assert!(fragments.info.unwrap().contains("티켓오픈"));
        assert!(fragments.description.unwrap().contains("앵콜 콘서트"));
        assert!(fragments.booking_present);
        assert_eq!(collector.error_tally(), 0);
    }

    #[tokio::test]
    async fn missing_booking_control_reads_as_closed() {
        let html = DETAIL_HTML.replace("button class=\"DetailBooking_bookingBtn__uvSid\"", "div");
        let mut session = OnePageSession {
            page: Some(FetchedPage {
                html,
                final_url: "https://tickets.example.com/goods/1".to_string(),
                status: 200,
            }),
        };
        let mut collector = DetailCollector::new(&FragmentSelectors::default()).unwrap();

        let fragments = collector.collect(&mut session, "https://tickets.example.com/goods/1").await;
        assert!(!fragments.booking_present);
        assert_eq!(collector.error_tally(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_collapses_to_empty_fragments() {
        let mut session = OnePageSession { page: None };
        let mut collector = DetailCollector::new(&FragmentSelectors::default()).unwrap();

        let fragments = collector.collect(&mut session, "https://tickets.example.com/gone").await;
        assert!(fragments.poster.is_none());
        assert!(fragments.summary.is_none());
        assert!(!fragments.booking_present);
        assert_eq!(collector.error_tally(), 1);
    }

    #[tokio::test]
    async fn non_success_status_is_tallied() {
        let mut session = OnePageSession {
            page: Some(FetchedPage {
                html: String::new(),
                final_url: "https://tickets.example.com/goods/404".to_string(),
                status: 404,
            }),
        };
        let mut collector = DetailCollector::new(&FragmentSelectors::default()).unwrap();

        let fragments = collector.collect(&mut session, "https://tickets.example.com/goods/404").await;
        assert!(fragments.info.is_none());
        assert_eq!(collector.error_tally(), 1);
    }

    #[test]
    fn bad_selector_fails_construction() {
        let selectors = FragmentSelectors {
            poster: "div[[broken".to_string(),
            ..FragmentSelectors::default()
        };
        assert!(DetailCollector::new(&selectors).is_err());
    }
}
