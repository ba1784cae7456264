/// Source-site endpoints and structural selectors shared across the crawler.
///
/// The CSS-module class names on the ticketing site carry build hashes, so
/// every class-based selector matches on the stable prefix instead of the
/// full token.

// Listing endpoints
pub const SCROLL_LISTING_URL: &str =
    "https://tickets.interpark.com/contents/notice?Genre=CONCERT";
pub const NOTICE_BOARD_URL: &str =
    "https://ticket.interpark.com/webzine/paper/TPNoticeList.asp?tid1=in_scroll&tid2=ticketopen&tid3=board_main&tid4=board_main";
pub const NOTICE_BOARD_PAGE_PARAM: &str = "pageno";

/// Listing-level category labels that pass the discovery filter.
pub const DISCOVERY_GENRES: [&str; 2] = ["콘서트", "HOT"];

// Infinite-scroll listing rows
pub const TICKET_ITEM_SELECTOR: &str = r#"a[class^="TicketItem_ticketItem"]"#;
pub const TICKET_ITEM_LABEL_ATTR: &str = "gtm-label";
pub const TICKET_ITEM_INFO_SELECTOR: &str = r#"ul[class^="NoticeItem_contentsWrap"] li"#;

// Notice-board rows (rendered inside an iframe on the board page)
pub const NOTICE_IFRAME_SELECTOR: &str = "iframe#iFrmNotice";
pub const NOTICE_ROW_SELECTOR: &str = "tr";
pub const NOTICE_SUBJECT_SELECTOR: &str = "td.subject a";
pub const NOTICE_GENRE_SELECTOR: &str = "td.type";
pub const NOTICE_NEW_FLAG_SELECTOR: &str = "td.subject img.ico_new";

/// Marker element awaited after navigating to a detail page.
pub const DETAIL_READY_SELECTOR: &str = r#"article[class^="DetailSummary_infoBox"]"#;

/// Marker element awaited after navigating back to the scroll listing.
pub const LISTING_READY_SELECTOR: &str = TICKET_ITEM_SELECTOR;

/// Fixed selling platform stamped on every extracted record.
pub const SELLING_PLATFORM: &str = "INTERPARK";
