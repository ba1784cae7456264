use crate::constants::{
    DISCOVERY_GENRES, LISTING_READY_SELECTOR, NOTICE_BOARD_PAGE_PARAM, NOTICE_GENRE_SELECTOR,
    NOTICE_IFRAME_SELECTOR, NOTICE_NEW_FLAG_SELECTOR, NOTICE_ROW_SELECTOR,
    NOTICE_SUBJECT_SELECTOR, TICKET_ITEM_INFO_SELECTOR, TICKET_ITEM_LABEL_ATTR,
    TICKET_ITEM_SELECTOR,
};
use crate::error::{Result, ScraperError};
use crate::fetcher::{FetchRequest, PageSession};
use crate::resolver::resolve_href;
use crate::types::ListingItem;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

static TICKET_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(TICKET_ITEM_SELECTOR).unwrap());
static TICKET_ITEM_INFO: Lazy<Selector> =
    Lazy::new(|| Selector::parse(TICKET_ITEM_INFO_SELECTOR).unwrap());
static NOTICE_IFRAME: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NOTICE_IFRAME_SELECTOR).unwrap());
static NOTICE_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse(NOTICE_ROW_SELECTOR).unwrap());
static NOTICE_SUBJECT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NOTICE_SUBJECT_SELECTOR).unwrap());
static NOTICE_GENRE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NOTICE_GENRE_SELECTOR).unwrap());
static NOTICE_NEW_FLAG: Lazy<Selector> =
    Lazy::new(|| Selector::parse(NOTICE_NEW_FLAG_SELECTOR).unwrap());

/// Which listing shape a run walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSource {
    /// Infinite-scroll notice listing.
    Scroll,
    /// Paginated notice board (rows served inside an iframe).
    Board,
}

/// Walks a listing page and yields each notice row exactly once per run.
///
/// Owns the SeenSet and the scroll stall counter; nothing else reads or
/// mutates them. Reset by constructing a fresh discoverer.
pub struct ListingDiscoverer {
    seen: HashSet<String>,
    stall_threshold: u32,
    genre_filter: Vec<String>,
    skipped_rows: usize,
}

impl ListingDiscoverer {
    pub fn new(stall_threshold: u32) -> Self {
        Self {
            seen: HashSet::new(),
            stall_threshold,
            genre_filter: DISCOVERY_GENRES.iter().map(|g| g.to_string()).collect(),
            skipped_rows: 0,
        }
    }

    pub fn with_genre_filter(mut self, genres: Vec<String>) -> Self {
        self.genre_filter = genres;
        self
    }

    /// Rows dropped because their identifying attribute was unreadable.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Appends newly discovered rows to `out`. Items yielded by earlier
    /// calls (or earlier attempts of the same run) are never yielded again.
    pub async fn discover(
        &mut self,
        session: &mut dyn PageSession,
        source: ListingSource,
        listing_url: &str,
        out: &mut Vec<ListingItem>,
    ) -> Result<()> {
        match source {
            ListingSource::Scroll => self.discover_scroll(session, listing_url, out).await,
            ListingSource::Board => self.discover_paginated(session, listing_url, out).await,
        }
    }

    /// Infinite-scroll walk: re-read the rendered row set after every scroll
    /// step and stop once `stall_threshold` consecutive reads yield nothing
    /// new. A single empty read can be transient render lag, so it never
    /// terminates on its own.
    async fn discover_scroll(
        &mut self,
        session: &mut dyn PageSession,
        listing_url: &str,
        out: &mut Vec<ListingItem>,
    ) -> Result<()> {
        info!("Discovering notices from scroll listing");

        let request = FetchRequest::new(listing_url)
            .wait_for(LISTING_READY_SELECTOR)
            .bypass_cache();
        let mut page = session.fetch(request).await?;

        let mut stall = 0u32;
        loop {
            let fresh = self.collect_scroll_rows(&page.html, &page.final_url);
            debug!(new_items = fresh.len(), stall, "Listing read");

            if fresh.is_empty() {
                stall += 1;
                if stall >= self.stall_threshold {
                    info!(total = out.len(), "Listing flat after {} empty reads", stall);
                    break;
                }
            } else {
                stall = 0;
                out.extend(fresh);
            }

            page = session.scroll_more().await?;
        }

        Ok(())
    }

    /// Paginated walk: bump the page-number parameter until a page has zero
    /// matching rows. The board page only carries an iframe; the rows live
    /// at its resolved `src`.
    async fn discover_paginated(
        &mut self,
        session: &mut dyn PageSession,
        board_url: &str,
        out: &mut Vec<ListingItem>,
    ) -> Result<()> {
        info!("Discovering notices from paginated board");

        let mut page_no = 1u32;
        loop {
            let page_url = with_page_param(board_url, page_no)?;
            let board = session
                .fetch(FetchRequest::new(&page_url).bypass_cache())
                .await?;

            let Some(frame_url) = self.locate_frame(&board.html, &board.final_url) else {
                warn!(page_no, "Notice board carried no row frame; treating as end of list");
                break;
            };

            let rows_page = session
                .fetch(
                    FetchRequest::new(&frame_url)
                        .wait_for(NOTICE_SUBJECT_SELECTOR)
                        .bypass_cache(),
                )
                .await?;

            let (matching, fresh) = self.collect_board_rows(&rows_page.html, &rows_page.final_url);
            info!(page_no, matching, new_items = fresh.len(), "Board page read");

            // Termination keys on rows passing the filter, not on rows being
            // new: a re-walked page full of already-seen rows must not end
            // the sequence early.
            if matching == 0 {
                break;
            }
            out.extend(fresh);
            page_no += 1;
        }

        Ok(())
    }

    fn locate_frame(&self, html: &str, base: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let frame = document.select(&NOTICE_IFRAME).next()?;
        let src = frame.value().attr("src")?;
        resolve_href(base, src)
    }

    /// Parses the currently rendered scroll items, admitting only rows whose
    /// label has not been seen this run. Rows without a readable label are
    /// dropped and tallied; they do not reset the stall counter.
    fn collect_scroll_rows(&mut self, html: &str, page_url: &str) -> Vec<ListingItem> {
        let document = Html::parse_document(html);
        let mut fresh = Vec::new();

        for anchor in document.select(&TICKET_ITEM) {
            let Some(label) = anchor.value().attr(TICKET_ITEM_LABEL_ATTR) else {
                self.skipped_rows += 1;
                continue;
            };
            let label = label.trim();
            if label.is_empty() {
                self.skipped_rows += 1;
                continue;
            }
            if !self.seen.insert(label.to_string()) {
                continue;
            }

            let info_lines: Vec<String> = anchor
                .select(&TICKET_ITEM_INFO)
                .map(|li| li.text().collect::<String>().trim().to_string())
                .filter(|line| !line.is_empty())
                .collect();

            fresh.push(ListingItem {
                label: label.to_string(),
                title: label.to_string(),
                genre: "콘서트".to_string(),
                is_new: false,
                href: anchor.value().attr("href").map(|h| h.to_string()),
                source_url: page_url.to_string(),
                info: if info_lines.is_empty() {
                    None
                } else {
                    Some(info_lines.join(", "))
                },
            });
        }

        fresh
    }

    /// Parses one board page worth of rows, applying the genre filter.
    /// Filtered rows are neither yielded nor counted as matching. Returns
    /// the matching-row count alongside the newly admitted items.
    fn collect_board_rows(&mut self, html: &str, page_url: &str) -> (usize, Vec<ListingItem>) {
        let document = Html::parse_document(html);
        let mut matching = 0usize;
        let mut fresh = Vec::new();

        for row in document.select(&NOTICE_ROW) {
            let Some(genre) = row
                .select(&NOTICE_GENRE)
                .next()
                .map(|td| td.text().collect::<String>().trim().to_string())
            else {
                continue;
            };
            if !self.genre_filter.iter().any(|g| g == &genre) {
                continue;
            }
            matching += 1;

            let Some(subject) = row.select(&NOTICE_SUBJECT).next() else {
                continue;
            };
            let title = subject.text().collect::<String>().trim().to_string();
            let Some(href) = subject.value().attr("href").map(str::trim).filter(|h| !h.is_empty())
            else {
                self.skipped_rows += 1;
                continue;
            };
            if !self.seen.insert(href.to_string()) {
                continue;
            }

            fresh.push(ListingItem {
                label: href.to_string(),
                title,
                genre,
                is_new: row.select(&NOTICE_NEW_FLAG).next().is_some(),
                href: Some(href.to_string()),
                source_url: page_url.to_string(),
                info: None,
            });
        }

        (matching, fresh)
    }
}

/// Sets (or replaces) the board's page-number query parameter.
fn with_page_param(board_url: &str, page_no: u32) -> Result<String> {
    let mut url = Url::parse(board_url)
        .map_err(|e| ScraperError::Config(format!("Bad listing URL '{board_url}': {e}")))?;

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != NOTICE_BOARD_PAGE_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (name, value) in &retained {
            pairs.append_pair(name, value);
        }
        pairs.append_pair(NOTICE_BOARD_PAGE_PARAM, &page_no.to_string());
    }

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchedPage;
    use async_trait::async_trait;

    /// Scripted session replaying a fixed sequence of pages for any
    /// fetch or scroll, tracking how many reads happened.
    struct ScriptedSession {
        pages: Vec<String>,
        cursor: usize,
        pub scrolls: usize,
    }

    impl ScriptedSession {
        fn new(pages: Vec<String>) -> Self {
            Self {
                pages,
                cursor: 0,
                scrolls: 0,
            }
        }

        fn next_page(&mut self, url: String) -> FetchedPage {
            let html = if self.cursor < self.pages.len() {
                self.pages[self.cursor].clone()
            } else {
                self.pages.last().cloned().unwrap_or_default()
            };
            self.cursor += 1;
            FetchedPage {
                html,
                final_url: url,
                status: 200,
            }
        }
    }

    #[async_trait]
    impl PageSession for ScriptedSession {
        async fn fetch(&mut self, request: FetchRequest) -> Result<FetchedPage> {
            Ok(self.next_page(request.url))
        }

        async fn scroll_more(&mut self) -> Result<FetchedPage> {
            self.scrolls += 1;
            Ok(self.next_page("scroll://current".to_string()))
        }
    }

    fn scroll_page(labels: &[&str]) -> String {
        let items: String = labels
            .iter()
            .map(|label| {
                format!(
                    r#"<a class="TicketItem_ticketItem__abc12" gtm-label="{label}" href="/goods/{label}">
                         <ul class="NoticeItem_contentsWrap__y1tdg"><li>단독판매</li><li>2025.09.01</li></ul>
                       </a>"#
                )
            })
            .collect();
        format!("<html><body>{items}</body></html>")
    }

    #[tokio::test]
    async fn repeated_labels_are_yielded_exactly_once() {
        let mut session = ScriptedSession::new(vec![
            scroll_page(&["concert-a", "concert-b"]),
            scroll_page(&["concert-a", "concert-b", "concert-c"]),
            scroll_page(&["concert-b", "concert-c"]),
        ]);
        let mut discoverer = ListingDiscoverer::new(3);
        let mut out = Vec::new();
        discoverer
            .discover(&mut session, ListingSource::Scroll, "https://l.example/notice", &mut out)
            .await
            .unwrap();

        let labels: Vec<&str> = out.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["concert-a", "concert-b", "concert-c"]);
    }

    #[tokio::test]
    async fn terminates_after_exactly_threshold_empty_reads() {
        // One productive read, then identical pages forever.
        let mut session = ScriptedSession::new(vec![scroll_page(&["concert-a"])]);
        let threshold = 3;
        let mut discoverer = ListingDiscoverer::new(threshold);
        let mut out = Vec::new();
        discoverer
            .discover(&mut session, ListingSource::Scroll, "https://l.example/notice", &mut out)
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        // Every scroll after the first read returned zero new items; the
        // walk stops after exactly `threshold` of them, not fewer.
        assert_eq!(session.scrolls, threshold as usize);
    }

    #[tokio::test]
    async fn unreadable_rows_do_not_reset_the_stall_counter() {
        let broken = r#"<html><body>
            <a class="TicketItem_ticketItem__abc12" href="/goods/no-label">no label</a>
        </body></html>"#;
        let mut session = ScriptedSession::new(vec![
            scroll_page(&["concert-a"]),
            broken.to_string(),
        ]);
        let mut discoverer = ListingDiscoverer::new(2);
        let mut out = Vec::new();
        discoverer
            .discover(&mut session, ListingSource::Scroll, "https://l.example/notice", &mut out)
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        // The broken page is read twice (the second scroll replays it), and
        // neither read resets the stall counter.
        assert_eq!(discoverer.skipped_rows(), 2);
        assert_eq!(session.scrolls, 2);
    }

    fn board_frame_page() -> String {
        r#"<html><body><iframe id="iFrmNotice" src="TPNoticeListView.asp?bbsno=34"></iframe></body></html>"#
            .to_string()
    }

    fn board_rows_page(rows: &[(&str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .map(|(title, genre, href)| {
                format!(
                    r#"<tr>
                         <td class="type">{genre}</td>
                         <td class="subject"><a href="{href}">{title}</a><img class="ico_new" alt="new"/></td>
                       </tr>"#
                )
            })
            .collect();
        format!("<html><body><table><tbody>{body}</tbody></table></body></html>")
    }

    #[tokio::test]
    async fn board_walk_filters_genres_and_stops_on_empty_page() {
        let mut session = ScriptedSession::new(vec![
            board_frame_page(),
            board_rows_page(&[
                ("성시경 연말 콘서트", "콘서트", "view.asp?no=1"),
                ("뮤지컬 시카고", "뮤지컬", "view.asp?no=2"),
                ("HOT 오픈공지", "HOT", "view.asp?no=3"),
            ]),
            board_frame_page(),
            board_rows_page(&[]),
        ]);
        let mut discoverer = ListingDiscoverer::new(3);
        let mut out = Vec::new();
        discoverer
            .discover(
                &mut session,
                ListingSource::Board,
                "https://t.example/TPNoticeList.asp?tid1=in_scroll",
                &mut out,
            )
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "성시경 연말 콘서트");
        assert!(out[0].is_new);
        assert_eq!(out[1].genre, "HOT");
    }

    #[tokio::test]
    async fn board_walk_survives_a_page_of_already_seen_rows() {
        let row = ("성시경 연말 콘서트", "콘서트", "view.asp?no=1");
        let fresh_row = ("아이유 콘서트", "콘서트", "view.asp?no=2");
        let mut session = ScriptedSession::new(vec![
            board_frame_page(),
            board_rows_page(&[row]),
            board_frame_page(),
            // Every row here was already admitted; the walk must continue.
            board_rows_page(&[row]),
            board_frame_page(),
            board_rows_page(&[fresh_row]),
            board_frame_page(),
            board_rows_page(&[]),
        ]);
        let mut discoverer = ListingDiscoverer::new(3);
        let mut out = Vec::new();
        discoverer
            .discover(
                &mut session,
                ListingSource::Board,
                "https://t.example/TPNoticeList.asp",
                &mut out,
            )
            .await
            .unwrap();

        let titles: Vec<&str> = out.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["성시경 연말 콘서트", "아이유 콘서트"]);
    }

    #[test]
    fn page_param_is_replaced_not_duplicated() {
        let first = with_page_param("https://t.example/list.asp?bbsno=10", 1).unwrap();
        assert!(first.contains("pageno=1"));
        let second = with_page_param(&first, 2).unwrap();
        assert!(second.contains("pageno=2"));
        assert!(!second.contains("pageno=1"));
    }
}
