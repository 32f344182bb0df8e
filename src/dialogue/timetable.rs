//! Plain-text course timetable parsing.
//!
//! Lines look like `Physics Mon 9am - 11am` or `MCE321 Thursday 14:00 to 16:00`
//! and are separated by newlines or `;`.

use super::text::normalize_title;
use super::time::{days_until, localize, parse_weekday, TimeContext};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;

static COURSE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(.+?)[\s,]+(mon|monday|tue|tues|tuesday|wed|weds|wednesday|thu|thur|thurs|thursday|fri|friday|sat|saturday|sun|sunday)\.?,?\s+(\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\s*(?:-|–|to)\s*(\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\s*$",
    )
    .expect("course line regex")
});
static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$").expect("timetable clock regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimetableEntry {
    pub title: String,
    pub weekday: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimetableEntry {
    pub fn duration_minutes(&self) -> u32 {
        u32::try_from((self.end - self.start).num_minutes()).unwrap_or(0)
    }

    /// Next local start of this class at or after `ctx.now`.
    pub fn next_occurrence(&self, ctx: &TimeContext) -> Option<DateTime<Utc>> {
        let today = ctx.today();
        let mut offset = days_until(today.weekday(), self.weekday);
        if offset == 0 && ctx.local_now().time() >= self.start {
            offset = 7;
        }
        localize(
            ctx.timezone,
            (today + Duration::days(offset)).and_time(self.start),
        )
    }
}

/// Bare hours up to 6 without AM/PM are afternoon classes.
fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let caps = CLOCK.captures(raw.trim())?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let hour = match caps.get(3).map(|m| m.as_str().to_lowercase()) {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            hour % 12 + if meridiem == "pm" { 12 } else { 0 }
        }
        None if (1..=6).contains(&hour) => hour + 12,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_line(line: &str) -> Option<TimetableEntry> {
    // drop a lead-in like "here is my timetable:"
    let line = match line.split_once(':') {
        Some((head, tail)) if !head.chars().any(|ch| ch.is_ascii_digit()) => tail,
        _ => line,
    };
    let caps = COURSE_LINE.captures(line.trim())?;
    let title = caps[1].trim().trim_matches(|ch: char| ch == '-' || ch == ',').trim();
    if title.is_empty() {
        return None;
    }
    let entry = TimetableEntry {
        title: title.to_string(),
        weekday: parse_weekday(&caps[2])?,
        start: parse_clock(&caps[3])?,
        end: parse_clock(&caps[4])?,
    };
    (entry.end > entry.start).then_some(entry)
}

pub fn parse_courses(text: &str) -> Vec<TimetableEntry> {
    text.split(['\n', ';'])
        .filter_map(parse_line)
        .collect()
}

/// Entries whose title contains any of `wanted` (normalized).
pub fn select_entries(entries: &[TimetableEntry], wanted: &[String]) -> Vec<TimetableEntry> {
    let wanted: Vec<String> = wanted
        .iter()
        .map(|name| normalize_title(name))
        .filter(|name| !name.is_empty())
        .collect();
    entries
        .iter()
        .filter(|entry| {
            let title = normalize_title(&entry.title);
            wanted.iter().any(|name| title.contains(name.as_str()))
        })
        .cloned()
        .collect()
}

pub fn summarize(entries: &[TimetableEntry]) -> String {
    let mut out = String::new();
    for (index, entry) in entries.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{}. {} ({} {} - {})",
            index + 1,
            entry.title,
            entry.weekday,
            entry.start.format("%-I:%M %p"),
            entry.end.format("%-I:%M %p"),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::time::parse_timezone;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_lines_and_semicolons() {
        let entries = parse_courses(
            "Here is my timetable: Physics Mon 9am - 11am\nMCE321 Thursday 14:00 to 16:00; Chem lab fri 2-4",
        );
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "Physics");
        assert_eq!(entries[0].weekday, Weekday::Mon);
        assert_eq!((entries[0].start, entries[0].end), (t(9, 0), t(11, 0)));
        assert_eq!(entries[1].title, "MCE321");
        assert_eq!(entries[1].start, t(14, 0));
        assert_eq!((entries[2].start, entries[2].end), (t(14, 0), t(16, 0)));
        assert_eq!(entries[2].duration_minutes(), 120);
    }

    #[test]
    fn ignores_noise_and_inverted_ranges() {
        assert!(parse_courses("upload my timetable").is_empty());
        assert!(parse_courses("History Tue 11am - 9am").is_empty());
    }

    #[test]
    fn next_occurrence_skips_a_class_already_started() {
        let ctx = TimeContext::new(
            parse_timezone("UTC"),
            Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
        );
        let monday = TimetableEntry {
            title: "Physics".into(),
            weekday: Weekday::Mon,
            start: t(9, 0),
            end: t(11, 0),
        };
        assert_eq!(
            monday.next_occurrence(&ctx).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap()
        );
        let wednesday = TimetableEntry { weekday: Weekday::Wed, ..monday };
        assert_eq!(
            wednesday.next_occurrence(&ctx).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 7, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn selects_by_title_fragment() {
        let entries = parse_courses("Physics Mon 9am-11am; Chemistry Tue 9am-11am");
        let picked = select_entries(&entries, &["chem".to_string()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].title, "Chemistry");
    }

    #[test]
    fn summary_is_numbered() {
        let entries = parse_courses("Physics Mon 9am-11am");
        assert_eq!(summarize(&entries), "1. Physics (Mon 9:00 AM - 11:00 AM)");
    }
}
