use crate::types::{DetailFragments, ListingItem};

/// Fixed section labels, in render order. The extraction prompt relies on
/// every block carrying the same sections in the same order.
pub const SECTION_LABELS: [&str; 8] = [
    "공연명",
    "공연 포스터",
    "장르",
    "티켓상태",
    "공연정보",
    "공연요약",
    "공연설명",
    "예매링크",
];

/// Flattens one event's listing row and detail fragments into the canonical
/// labeled text block handed to extraction.
///
/// Absent values render as empty sections; the template never drops a label.
/// Pure function of its inputs.
pub fn assemble_text(item: &ListingItem, fragments: &DetailFragments) -> String {
    let ticket_status = if fragments.booking_present { "True" } else { "False" };
    let booking_link = if fragments.booking_present {
        fragments.final_url.as_deref().unwrap_or("")
    } else {
        ""
    };
    // The scroll listing carries row-level info lines; they stand in when
    // the detail page had no info block.
    let info = fragments
        .info
        .as_deref()
        .or(item.info.as_deref())
        .unwrap_or("");

    let values = [
        item.title.as_str(),
        fragments.poster.as_deref().unwrap_or(""),
        item.genre.as_str(),
        ticket_status,
        info,
        fragments.summary.as_deref().unwrap_or(""),
        fragments.description.as_deref().unwrap_or(""),
        booking_link,
    ];

    SECTION_LABELS
        .iter()
        .zip(values)
        .map(|(label, value)| format!("{label}: {value}\n"))
        .collect()
}
