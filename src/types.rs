use crate::constants::SELLING_PLATFORM;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row captured from a listing page before navigating away.
///
/// `label` is the dedup identity for the run; the rest is the minimal
/// listing-level text kept until the detail record supersedes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingItem {
    pub label: String,
    pub title: String,
    /// Listing-level category text, e.g. "콘서트".
    pub genre: String,
    /// The row carried the "new notice" icon.
    pub is_new: bool,
    /// Raw href exactly as captured from the DOM; resolved downstream.
    pub href: Option<String>,
    /// URL of the page the row was captured from, the base for resolution.
    pub source_url: String,
    /// Listing-row content lines, when the listing exposes them.
    pub info: Option<String>,
}

/// Named fragments pulled from a detail page.
///
/// Absent fragments are recorded as `None` so assembly can tell "field
/// absent" from "field never scraped". A failed fetch produces
/// `DetailFragments::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailFragments {
    pub poster: Option<String>,
    pub info: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Structural proxy for ticket availability: the booking control
    /// exists in the rendered page.
    pub booking_present: bool,
    /// Absolute URL the detail navigation resolved to.
    pub final_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genre {
    #[serde(rename = "발라드")]
    Ballad,
    #[serde(rename = "댄스")]
    Dance,
    #[serde(rename = "랩/힙합")]
    HipHop,
    #[serde(rename = "아이돌")]
    Idol,
    #[serde(rename = "R&B/Soul")]
    RnbSoul,
    #[serde(rename = "인디음악")]
    Indie,
    #[serde(rename = "록/메탈")]
    RockMetal,
    #[serde(rename = "성인가요/트로트")]
    Trot,
    #[serde(rename = "포크/블루스")]
    FolkBlues,
    #[serde(rename = "일렉트로니카")]
    Electronica,
    #[serde(rename = "클래식")]
    Classic,
    #[serde(rename = "재즈")]
    Jazz,
    #[serde(rename = "J-POP")]
    JPop,
    #[serde(rename = "POP")]
    Pop,
    #[serde(rename = "키즈")]
    Kids,
    #[serde(rename = "CCM")]
    Ccm,
    #[serde(rename = "국악")]
    Gugak,
}

impl Genre {
    pub const VALUES: [&'static str; 17] = [
        "발라드",
        "댄스",
        "랩/힙합",
        "아이돌",
        "R&B/Soul",
        "인디음악",
        "록/메탈",
        "성인가요/트로트",
        "포크/블루스",
        "일렉트로니카",
        "클래식",
        "재즈",
        "J-POP",
        "POP",
        "키즈",
        "CCM",
        "국악",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcertMood {
    Emotional,
    Energetic,
    Dreamy,
    Grand,
    Calm,
    Fun,
    Intense,
}

impl ConcertMood {
    pub const VALUES: [&'static str; 7] = [
        "Emotional",
        "Energetic",
        "Dreamy",
        "Grand",
        "Calm",
        "Fun",
        "Intense",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcertStyle {
    #[serde(rename = "Live Band")]
    LiveBand,
    Acoustic,
    Orchestra,
    #[serde(rename = "Solo Performance")]
    SoloPerformance,
    #[serde(rename = "Dance Performance")]
    DancePerformance,
    #[serde(rename = "Theatrical Concert")]
    TheatricalConcert,
}

impl ConcertStyle {
    pub const VALUES: [&'static str; 6] = [
        "Live Band",
        "Acoustic",
        "Orchestra",
        "Solo Performance",
        "Dance Performance",
        "Theatrical Concert",
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcertType {
    Festival,
    Concert,
    #[serde(rename = "Music Show")]
    MusicShow,
    #[serde(rename = "Fan Meeting")]
    FanMeeting,
    #[serde(rename = "Talk Concert")]
    TalkConcert,
}

impl ConcertType {
    pub const VALUES: [&'static str; 5] = [
        "Festival",
        "Concert",
        "Music Show",
        "Fan Meeting",
        "Talk Concert",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Casting {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRound {
    pub round: u32,
    pub datetime: NaiveDateTime,
}

/// The canonical structured record produced by extraction.
///
/// Enum fields are closed sets: deserialization rejects any value outside
/// them, so a record that exists is schema-valid. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcertRecord {
    pub concert_name: String,
    #[serde(default)]
    pub concert_poster: Option<String>,
    pub genre: Genre,
    pub concert_mood: ConcertMood,
    pub concert_style: ConcertStyle,
    pub concert_type: ConcertType,
    #[serde(default)]
    pub casting: Vec<Casting>,
    #[serde(default)]
    pub performance_rounds: Vec<PerformanceRound>,
    #[serde(default)]
    pub venue: Option<String>,
    /// Running time in minutes.
    #[serde(default)]
    pub running_time: Option<u32>,
    /// Seat grade (e.g. "VIP", "R") to integer price.
    #[serde(default)]
    pub price: BTreeMap<String, Option<i64>>,
    #[serde(default)]
    pub age_limit: Option<String>,
    #[serde(default)]
    pub booking_limit: Option<String>,
    #[serde(default = "default_selling_platform")]
    pub selling_platform: String,
    pub ticket_status: bool,
    /// Sale-window key (round or booking type) to open timestamp.
    #[serde(default)]
    pub ticket_open_dates: BTreeMap<String, Option<NaiveDateTime>>,
    #[serde(default)]
    pub booking_link: Option<String>,
    #[serde(default)]
    pub additional_info: Option<String>,
}

fn default_selling_platform() -> String {
    SELLING_PLATFORM.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_deserializes_from_extraction_output() {
        let raw = json!({
            "concert_name": "2025 2NE1 CONCERT [WELCOME BACK] ENCORE IN SEOUL",
            "concert_poster": "https://ticketimage.interpark.com/Play/image/large/25/25001426_p.gif",
            "genre": "아이돌",
            "concert_mood": "Energetic",
            "concert_style": "Live Band",
            "concert_type": "Concert",
            "casting": [{"name": "2NE1"}],
            "performance_rounds": [
                {"round": 1, "datetime": "2025-04-12T18:00:00"},
                {"round": 2, "datetime": "2025-04-13T17:00:00"}
            ],
            "venue": "KSPO DOME",
            "running_time": null,
            "price": {"VIP": 176000, "R": 154000},
            "age_limit": null,
            "booking_limit": "회차당 1인 2매까지 예매 가능",
            "selling_platform": "INTERPARK",
            "ticket_status": true,
            "ticket_open_dates": {"round": "2025-02-10T20:00:00"},
            "booking_link": "http://tickets.interpark.com/contents/bridge/25001426",
            "additional_info": null
        });

        let record: ConcertRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.genre, Genre::Idol);
        assert_eq!(record.performance_rounds.len(), 2);
        assert_eq!(record.price["VIP"], Some(176000));
        assert!(record.ticket_status);
    }

    #[test]
    fn out_of_set_genre_is_rejected() {
        let raw = json!({
            "concert_name": "test",
            "genre": "뮤지컬",
            "concert_mood": "Calm",
            "concert_style": "Acoustic",
            "concert_type": "Concert",
            "ticket_status": false
        });

        assert!(serde_json::from_value::<ConcertRecord>(raw).is_err());
    }

    #[test]
    fn out_of_set_mood_is_rejected() {
        let raw = json!({
            "concert_name": "test",
            "genre": "POP",
            "concert_mood": "Chill",
            "concert_style": "Acoustic",
            "concert_type": "Concert",
            "ticket_status": false
        });

        assert!(serde_json::from_value::<ConcertRecord>(raw).is_err());
    }

    #[test]
    fn selling_platform_defaults_when_omitted() {
        let raw = json!({
            "concert_name": "test",
            "genre": "재즈",
            "concert_mood": "Calm",
            "concert_style": "Acoustic",
            "concert_type": "Concert",
            "ticket_status": false
        });

        let record: ConcertRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.selling_platform, "INTERPARK");
        assert!(record.casting.is_empty());
        assert!(record.booking_link.is_none());
    }

    #[test]
    fn enum_values_round_trip_through_serde() {
        for value in Genre::VALUES {
            let genre: Genre = serde_json::from_value(json!(value)).unwrap();
            assert_eq!(serde_json::to_value(genre).unwrap(), json!(value));
        }
        for value in ConcertStyle::VALUES {
            let style: ConcertStyle = serde_json::from_value(json!(value)).unwrap();
            assert_eq!(serde_json::to_value(style).unwrap(), json!(value));
        }
    }
}
