//! Browsing helpers for concert lists: upcoming/past split, search, month badges.

use std::cmp::Ordering;

use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::ConcertRecord;
use crate::utils::clean_text;

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})(?::(\d{2}))?\s*(am|pm)").expect("valid time regex"));

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Parses the date strings concerts and journal entries carry around.
///
/// Zoned values (RFC 3339) are taken as-is; everything else is read as a
/// wall-clock time in `tz`. A date without a time lands at midnight.
pub fn parse_concert_date(text: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let cleaned = clean_text(text);
    if cleaned.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&cleaned) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&cleaned, fmt) {
            return to_utc(naive, tz);
        }
    }

    let (date_part, time) = split_time(&cleaned);
    let date = parse_naive_date(&date_part)?;
    to_utc(NaiveDateTime::new(date, time.unwrap_or(NaiveTime::MIN)), tz)
}

fn split_time(text: &str) -> (String, Option<NaiveTime>) {
    let Some(caps) = TIME_RE.captures(text) else {
        return (text.to_string(), None);
    };
    let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
    let hour = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0);
    let minute = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .unwrap_or(0);
    let period = caps
        .get(3)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_default();
    let normalized = format!("{:02}:{:02} {}", hour, minute, period);
    let time = NaiveTime::parse_from_str(&normalized, "%I:%M %p").ok();

    let mut rest = String::with_capacity(text.len());
    rest.push_str(&text[..whole.start]);
    rest.push_str(&text[whole.end..]);
    let rest = clean_text(&rest)
        .trim_end_matches(|c: char| c == ',' || c == '@' || c.is_whitespace())
        .to_string();
    (rest, time)
}

fn parse_naive_date(input: &str) -> Option<NaiveDate> {
    let formats = [
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%A %m/%d/%Y",
        "%B %d, %Y",
        "%b %d, %Y",
        "%A, %B %d, %Y",
    ];
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

fn to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// Three-letter upper-case month for the timeline badge, e.g. `MAR`.
pub fn month_badge(date: &str, tz: Tz) -> Option<&'static str> {
    let dt = parse_concert_date(date, tz)?.with_timezone(&tz);
    MONTHS.get(dt.month0() as usize).copied()
}

/// Soonest first; records whose date cannot be read sort last.
pub fn sort_soonest_first(records: &mut [ConcertRecord], tz: Tz) {
    records.sort_by(|a, b| {
        compare_dates(
            parse_concert_date(&a.date, tz),
            parse_concert_date(&b.date, tz),
        )
    });
}

fn compare_dates(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Splits into `(upcoming, past)`. Upcoming is soonest first, past is most
/// recent first. A concert happening right now still counts as upcoming.
pub fn partition(
    records: Vec<ConcertRecord>,
    now: DateTime<Utc>,
    tz: Tz,
) -> (Vec<ConcertRecord>, Vec<ConcertRecord>) {
    let (mut past, mut upcoming): (Vec<_>, Vec<_>) = records.into_iter().partition(|record| {
        parse_concert_date(&record.date, tz)
            .map(|dt| dt < now)
            .unwrap_or(false)
    });
    sort_soonest_first(&mut upcoming, tz);
    sort_soonest_first(&mut past, tz);
    past.reverse();
    (upcoming, past)
}

pub fn search(records: Vec<ConcertRecord>, query: &str) -> Vec<ConcertRecord> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records;
    }
    records
        .into_iter()
        .filter(|record| {
            record.title.to_lowercase().contains(&needle)
                || record.venue.to_lowercase().contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::New_York;

    fn record(id: &str, title: &str, date: &str, venue: &str) -> ConcertRecord {
        ConcertRecord::new(id, title, date, venue)
    }

    #[test]
    fn parses_program_style_dates() {
        let dt = parse_concert_date("3/30/2025 7:30pm", New_York).expect("parse");
        let local = dt.with_timezone(&New_York);
        assert_eq!((local.month(), local.day(), local.hour(), local.minute()), (3, 30, 19, 30));

        let iso = parse_concert_date("2025-04-20T19:30", New_York).expect("parse datetime-local");
        assert_eq!(iso.with_timezone(&New_York).hour(), 19);

        let zoned = parse_concert_date("2025-04-20T23:30:00Z", New_York).expect("parse rfc3339");
        assert_eq!(zoned.hour(), 23);

        let long = parse_concert_date("April 20, 2025 7:30 PM", New_York).expect("parse long");
        assert_eq!(long.with_timezone(&New_York).day(), 20);

        assert!(parse_concert_date("", New_York).is_none());
        assert!(parse_concert_date("someday", New_York).is_none());
    }

    #[test]
    fn month_badges() {
        assert_eq!(month_badge("3/30/2025 7:30pm", New_York), Some("MAR"));
        assert_eq!(month_badge("2025-12-01", New_York), Some("DEC"));
        assert_eq!(month_badge("tbd", New_York), None);
    }

    #[test]
    fn partitions_and_orders_concerts() {
        let now = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();
        let records = vec![
            record("late", "Debussy's La Mer", "4/20/2025 7:30pm", "Duke Hall"),
            record("old", "Winter Gala", "1/10/2025 7:30pm", "Tyler-Tallman Hall"),
            record("tbd", "Pop-up Recital", "TBA", "Lobby"),
            record("soon", "Czech Chamber Music", "2025-04-02", "Tyler-Tallman Hall"),
            record("older", "New Year", "2024-12-31", "Duke Hall"),
        ];
        let (upcoming, past) = partition(records, now, New_York);
        let ids = |list: &[ConcertRecord]| list.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&upcoming), vec!["soon", "late", "tbd"]);
        assert_eq!(ids(&past), vec!["old", "older"]);
    }

    #[test]
    fn search_matches_title_or_venue_case_insensitively() {
        let records = vec![
            record("1", "Czech Chamber Music", "", "Tyler-Tallman Hall"),
            record("2", "Debussy's La Mer", "", "Duke Family Performance Hall"),
        ];
        assert_eq!(search(records.clone(), "czech").len(), 1);
        assert_eq!(search(records.clone(), "HALL").len(), 2);
        assert_eq!(search(records.clone(), "  ").len(), 2);
        assert!(search(records, "brahms").is_empty());
    }
}
