use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{listing, utils};

pub const DEFAULT_CIRCLE_COLOR: &str = "DEDDED";
pub const PREVIEW_CHARS: usize = 100;
pub const MAX_RATING: u8 = 5;

static HEX_COLOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]{6}$").expect("valid color regex"));

/// Anything kept in a [`crate::store::LocalRecordStore`] is addressed by a string id.
pub trait Keyed {
    fn key(&self) -> &str;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConcertRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle_color: Option<String>,
    // older records carried the colour under this name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_at: Option<String>,
}

impl ConcertRecord {
    pub fn new(id: &str, title: &str, date: &str, venue: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            date: date.to_string(),
            venue: venue.to_string(),
            circle_color: None,
            color: None,
            scanned_at: None,
        }
    }

    pub fn with_circle_color(mut self, color: Option<&str>) -> Self {
        self.circle_color = color.and_then(normalize_color);
        self
    }

    pub fn display_color(&self) -> String {
        self.circle_color
            .as_deref()
            .or(self.color.as_deref())
            .and_then(normalize_color)
            .unwrap_or_else(|| DEFAULT_CIRCLE_COLOR.to_string())
    }
}

impl Keyed for ConcertRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Accepts `DEDDED` or `#dedded`, returns the bare upper-case form.
pub fn normalize_color(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_start_matches('#');
    if HEX_COLOR_RE.is_match(trimmed) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct JournalEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub venue: String,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub content: String,
}

impl Keyed for JournalEntry {
    fn key(&self) -> &str {
        &self.id
    }
}

/// User input for a journal entry before an id and preview are attached.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JournalDraft {
    pub title: String,
    pub date: String,
    pub venue: String,
    pub rating: u8,
    pub content: String,
}

impl JournalDraft {
    /// Prefill from a concert, like opening "new entry" from a concert page.
    /// Dates that parse are rewritten in `YYYY-MM-DDTHH:MM` local form.
    pub fn for_concert(record: &ConcertRecord, tz: Tz) -> Self {
        let date = listing::parse_concert_date(&record.date, tz)
            .map(|at| at.with_timezone(&tz).format("%Y-%m-%dT%H:%M").to_string())
            .unwrap_or_else(|| record.date.clone());
        Self {
            title: record.title.clone(),
            date,
            venue: record.venue.clone(),
            ..Self::default()
        }
    }

    pub fn into_entry(self, id: String) -> JournalEntry {
        let preview = utils::truncate_with_ellipsis(&self.content, PREVIEW_CHARS);
        JournalEntry {
            id,
            title: utils::clean_text(&self.title),
            date: self.date.trim().to_string(),
            venue: utils::clean_text(&self.venue),
            rating: self.rating.min(MAX_RATING),
            preview,
            content: self.content,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Performer {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgramPiece {
    pub composer: String,
    pub piece: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A concert document as published in the remote store.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Concert {
    pub concert_type: String,
    pub date: String,
    pub location: String,
    pub title: String,
    pub color: Option<String>,
    pub circle_color: Option<String>,
    pub create_by: Option<String>,
    pub performance_group: Option<String>,
    pub performance_group_bio: Option<String>,
    pub sponsor_text: Option<String>,
    pub performers: Vec<Performer>,
    pub programs: Vec<ProgramPiece>,
    pub custom_sections: BTreeMap<String, serde_json::Value>,
    pub duration: Option<String>,
}

impl Concert {
    pub fn to_record(&self, id: &str, now: DateTime<Utc>) -> ConcertRecord {
        let color = self.circle_color.as_deref().or(self.color.as_deref());
        let mut record = ConcertRecord::new(id, &self.title, &self.date, &self.location)
            .with_circle_color(color);
        record.scanned_at = Some(now.to_rfc3339());
        record
    }

    pub fn has_sponsors(&self) -> bool {
        self.sponsor_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
    }
}
