//! Natural-language time, date and recurrence extraction.
//!
//! Every function takes the caller's clock through [`TimeContext`]; nothing in
//! this module reads the system time. Returned instants are UTC.

use super::text::{collapse_whitespace, word_number};
use crate::ledger::Recurrence;
use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::warn;

static MERIDIEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?::([0-5]\d))?\s*([ap])\.?m\b\.?").expect("meridiem regex")
});
static TWENTY_FOUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("24h regex"));
static AT_HOUR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bat\s+(\d{1,2})\b").expect("at-hour regex"));
static NOON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(noon|midday|midnight)\b").expect("noon regex"));
static LEAD_IN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(at|by)\s*$").expect("lead-in regex"));
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bin\s+(\d+|[a-z]+(?:[\s-][a-z]+)?)\s+(minutes?|mins?|hours?|hrs?)\b")
        .expect("relative regex")
});
static DATE_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(day after tomorrow)|(tomorrow|tmrw|tmr)|(today)|(tonight)|this\s+(morning|afternoon|evening)|(?:(on|next|this)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b",
    )
    .expect("date word regex")
});
static DATE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(day after tomorrow|tomorrow|tmrw|tmr|today|tonight|yesterday|this\s+week|next\s+week|this\s+weekend|weekend|(?:(next|this|on)\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday))\b",
    )
    .expect("date reference regex")
});
static NEXT_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:next|coming)\s+(\d{1,2}|[a-z]+)\s+days\b").expect("next-days regex")
});
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"));
static RECURRENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(every\s+day|each\s+day|everyday|daily)|(every\s+weekday|on\s+weekdays|weekdays)|(every\s+week|each\s+week|weekly)|(every\s+weekend|on\s+weekends|weekends))\b",
    )
    .expect("recurrence regex")
});

/// The user's timezone and the instant the message is handled at.
#[derive(Debug, Clone, Copy)]
pub struct TimeContext {
    pub timezone: Tz,
    pub now: DateTime<Utc>,
}

impl TimeContext {
    pub fn new(timezone: Tz, now: DateTime<Utc>) -> Self {
        Self { timezone, now }
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.timezone)
    }

    pub fn today(&self) -> NaiveDate {
        self.local_now().date_naive()
    }
}

/// Parse an IANA timezone name, falling back to UTC.
pub fn parse_timezone(name: &str) -> Tz {
    let name = name.trim();
    if name.is_empty() {
        return Tz::UTC;
    }
    name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(timezone = name, "unknown timezone, falling back to UTC");
        Tz::UTC
    })
}

/// Resolve a local wall-clock time to UTC. Ambiguous times take the earlier
/// instant; times inside a DST gap move forward one hour.
pub fn localize(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|at| at.with_timezone(&Utc))
}

/// UTC bounds of `days` local days starting at `date`.
pub fn local_day_bounds(
    date: NaiveDate,
    days: u32,
    tz: Tz,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = localize(tz, date.and_time(NaiveTime::MIN))?;
    let end = localize(
        tz,
        (date + Duration::days(i64::from(days.max(1)))).and_time(NaiveTime::MIN),
    )?;
    Some((start, end))
}

pub fn format_local_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%I:%M %p").to_string()
}

pub fn day_label(date: NaiveDate) -> String {
    date.format("%A, %b %-d").to_string()
}

pub fn parse_weekday(token: &str) -> Option<Weekday> {
    match token.trim().trim_end_matches('.').to_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "wed" | "weds" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Days from `from` forward to the next `target`, `0` when they coincide.
pub fn days_until(from: Weekday, target: Weekday) -> i64 {
    (i64::from(target.num_days_from_monday()) - i64::from(from.num_days_from_monday()))
        .rem_euclid(7)
}

/// A resolved time expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeMatch {
    pub at: DateTime<Utc>,
    /// Byte ranges of the input that made up the expression.
    pub spans: Vec<Range<usize>>,
    /// `false` when only a date word ("tomorrow") was found.
    pub explicit_hour: bool,
}

struct Clock {
    span: Range<usize>,
    hour: u32,
    minute: u32,
    meridiem: bool,
    deadline: bool,
}

struct DateWord {
    span: Range<usize>,
    offset_days: i64,
    default_time: Option<NaiveTime>,
    evening: bool,
}

fn overlaps(found: &[Clock], span: &Range<usize>) -> bool {
    found
        .iter()
        .any(|clock| clock.span.start < span.end && span.start < clock.span.end)
}

fn clock_candidates(text: &str) -> Vec<Clock> {
    let mut found: Vec<Clock> = Vec::new();

    for caps in MERIDIEM.captures_iter(text) {
        let (Some(whole), Ok(hour)) = (caps.get(0), caps[1].parse::<u32>()) else {
            continue;
        };
        if !(1..=12).contains(&hour) {
            continue;
        }
        let minute = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let pm = caps[3].eq_ignore_ascii_case("p");
        found.push(Clock {
            span: whole.range(),
            hour: hour % 12 + if pm { 12 } else { 0 },
            minute,
            meridiem: true,
            deadline: false,
        });
    }

    for caps in TWENTY_FOUR.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if overlaps(&found, &whole.range()) {
            continue;
        }
        let (Ok(hour), Ok(minute)) = (caps[1].parse(), caps[2].parse()) else {
            continue;
        };
        found.push(Clock {
            span: whole.range(),
            hour,
            minute,
            meridiem: false,
            deadline: false,
        });
    }

    for caps in AT_HOUR.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if overlaps(&found, &whole.range()) || text[whole.end()..].starts_with(':') {
            continue;
        }
        let Ok(hour) = caps[1].parse::<u32>() else {
            continue;
        };
        if hour > 23 {
            continue;
        }
        // "at 3" means the afternoon
        let hour = if (1..=6).contains(&hour) { hour + 12 } else { hour };
        found.push(Clock {
            span: whole.range(),
            hour,
            minute: 0,
            meridiem: false,
            deadline: false,
        });
    }

    for caps in NOON.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if overlaps(&found, &whole.range()) {
            continue;
        }
        let hour = if caps[1].eq_ignore_ascii_case("midnight") { 0 } else { 12 };
        found.push(Clock {
            span: whole.range(),
            hour,
            minute: 0,
            meridiem: true,
            deadline: false,
        });
    }

    for clock in &mut found {
        if let Some(lead) = LEAD_IN.captures(&text[..clock.span.start]) {
            if let Some(word) = lead.get(1) {
                clock.deadline = word.as_str().eq_ignore_ascii_case("by");
                clock.span.start = word.start();
            }
        }
    }

    found.sort_by_key(|clock| clock.span.start);
    found
}

fn date_word(text: &str, today: NaiveDate) -> Option<DateWord> {
    let caps = DATE_WORD.captures(text)?;
    let span = caps.get(0)?.range();
    let at = |hour| NaiveTime::from_hms_opt(hour, 0, 0);

    let word = if caps.get(1).is_some() {
        DateWord { span, offset_days: 2, default_time: None, evening: false }
    } else if caps.get(2).is_some() {
        DateWord { span, offset_days: 1, default_time: None, evening: false }
    } else if caps.get(3).is_some() {
        DateWord { span, offset_days: 0, default_time: None, evening: false }
    } else if caps.get(4).is_some() {
        DateWord { span, offset_days: 0, default_time: at(20), evening: true }
    } else if let Some(part) = caps.get(5) {
        let (hour, evening) = match part.as_str().to_lowercase().as_str() {
            "morning" => (9, false),
            "afternoon" => (15, true),
            _ => (18, true),
        };
        DateWord { span, offset_days: 0, default_time: at(hour), evening }
    } else {
        let target = parse_weekday(caps.get(7)?.as_str())?;
        let next = caps
            .get(6)
            .is_some_and(|prefix| prefix.as_str().eq_ignore_ascii_case("next"));
        let mut offset = days_until(today.weekday(), target);
        if offset == 0 && next {
            offset = 7;
        }
        DateWord { span, offset_days: offset, default_time: None, evening: false }
    };
    Some(word)
}

fn relative_time(text: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, Range<usize>)> {
    RELATIVE.captures_iter(text).find_map(|caps| {
        let amount_text = caps[1].to_lowercase();
        let amount: u32 = amount_text
            .parse()
            .ok()
            .or_else(|| word_number(&amount_text))?;
        let delta = if caps[2].to_lowercase().starts_with('h') {
            Duration::hours(i64::from(amount))
        } else {
            Duration::minutes(i64::from(amount))
        };
        Some((now.checked_add_signed(delta)?, caps.get(0)?.range()))
    })
}

/// Find the time a message refers to.
///
/// A `by <clock>` deadline wins over any other clock; otherwise the earliest
/// explicit clock is used, then a relative offset, then a bare date word. A
/// clock with no date word that has already passed today rolls to tomorrow.
pub fn extract_time(text: &str, ctx: &TimeContext) -> Option<TimeMatch> {
    let local_now = ctx.local_now();
    let today = local_now.date_naive();
    let date = date_word(text, today);
    let clocks = clock_candidates(text);

    if let Some(clock) = clocks.iter().find(|c| c.deadline).or_else(|| clocks.first()) {
        let mut hour = clock.hour;
        if !clock.meridiem && hour < 12 && date.as_ref().is_some_and(|d| d.evening) {
            hour += 12;
        }
        let day = today + Duration::days(date.as_ref().map_or(0, |d| d.offset_days));
        let naive = day.and_hms_opt(hour, clock.minute, 0)?;
        let mut at = localize(ctx.timezone, naive)?;
        if date.is_none() && at <= ctx.now {
            at = localize(ctx.timezone, naive + Duration::days(1))?;
        }
        let mut spans = vec![clock.span.clone()];
        if let Some(date) = date {
            spans.push(date.span);
        }
        return Some(TimeMatch { at, spans, explicit_hour: true });
    }

    if let Some((at, span)) = relative_time(text, ctx.now) {
        return Some(TimeMatch { at, spans: vec![span], explicit_hour: true });
    }

    let date = date?;
    let day = today + Duration::days(date.offset_days);
    let time = date.default_time.or_else(|| {
        NaiveTime::from_hms_opt(local_now.hour(), local_now.minute(), 0)
    })?;
    let at = localize(ctx.timezone, day.and_time(time))?;
    Some(TimeMatch { at, spans: vec![date.span], explicit_hour: false })
}

/// Recurrence phrase and its byte range.
pub fn detect_recurrence(text: &str) -> Option<(Recurrence, Range<usize>)> {
    let caps = RECURRENCE.captures(text)?;
    let span = caps.get(0)?.range();
    let recurrence = if caps.get(1).is_some() {
        Recurrence::Daily
    } else if caps.get(2).is_some() {
        Recurrence::Weekdays
    } else if caps.get(3).is_some() {
        Recurrence::Weekly
    } else {
        Recurrence::Weekend
    };
    Some((recurrence, span))
}

/// A span of local days a schedule question refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    /// Days from today to `start`; negative for the past.
    pub day_offset: i64,
    pub range_days: u32,
}

pub fn parse_date_reference(text: &str, ctx: &TimeContext) -> Option<DateRange> {
    let today = ctx.today();
    let range = |offset: i64, days: u32| DateRange {
        start: today + Duration::days(offset),
        day_offset: offset,
        range_days: days.max(1),
    };

    if let Some(caps) = ISO_DATE.captures(text) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;
        return Some(range((date - today).num_days(), 1));
    }

    if let Some(caps) = NEXT_DAYS.captures(text) {
        let amount = caps[1].to_lowercase();
        let days = amount.parse().ok().or_else(|| word_number(&amount))?;
        return Some(range(0, days.clamp(1, 31)));
    }

    let caps = DATE_REF.captures(text)?;
    let phrase = collapse_whitespace(&caps[1].to_lowercase());
    let weekday = today.weekday();
    let resolved = match phrase.as_str() {
        "today" | "tonight" => range(0, 1),
        "tomorrow" | "tmrw" | "tmr" => range(1, 1),
        "day after tomorrow" => range(2, 1),
        "yesterday" => range(-1, 1),
        "this week" => range(0, 7),
        "next week" => {
            let offset = days_until(weekday, Weekday::Mon);
            range(if offset == 0 { 7 } else { offset }, 7)
        }
        "this weekend" | "weekend" => match weekday {
            Weekday::Sat => range(0, 2),
            Weekday::Sun => range(0, 1),
            _ => range(days_until(weekday, Weekday::Sat), 2),
        },
        _ => {
            let target = parse_weekday(caps.get(3)?.as_str())?;
            let next = caps
                .get(2)
                .is_some_and(|prefix| prefix.as_str().eq_ignore_ascii_case("next"));
            let offset = days_until(weekday, target);
            range(if offset == 0 && next { 7 } else { offset }, 1)
        }
    };
    Some(resolved)
}
