//! Per-user reminder preferences. Delivery lives elsewhere; this only tracks
//! when reminders may resume.

use crate::dialogue::intent::MAX_SNOOZE_MINUTES;
use crate::dialogue::time::localize;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, Default)]
struct ReminderState {
    snoozed_until: Option<DateTime<Utc>>,
    paused_until: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct ReminderPreferences {
    users: Mutex<HashMap<String, ReminderState>>,
}

impl ReminderPreferences {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ReminderState>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold reminders for `minutes`. Returns when they resume.
    pub fn snooze(&self, user_id: &str, minutes: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let minutes = minutes.clamp(1, MAX_SNOOZE_MINUTES);
        let until = now + Duration::minutes(i64::from(minutes));
        self.lock().entry(user_id.to_string()).or_default().snoozed_until = Some(until);
        until
    }

    /// Hold reminders until the next local midnight.
    pub fn pause_for_today(&self, user_id: &str, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        let tomorrow = now.with_timezone(&tz).date_naive() + Duration::days(1);
        let until = localize(tz, tomorrow.and_time(NaiveTime::MIN))
            .unwrap_or_else(|| now + Duration::hours(24));
        self.lock().entry(user_id.to_string()).or_default().paused_until = Some(until);
        until
    }

    /// When reminders resume, or `None` if they are not held.
    pub fn resume_at(&self, user_id: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let state = self.lock().get(user_id).copied()?;
        [state.snoozed_until, state.paused_until]
            .into_iter()
            .flatten()
            .filter(|until| *until > now)
            .max()
    }

    pub fn is_paused(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        self.resume_at(user_id, now).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
    }

    #[test]
    fn snooze_expires() {
        let prefs = ReminderPreferences::new();
        let until = prefs.snooze("u1", 15, now());
        assert_eq!(until, now() + Duration::minutes(15));
        assert!(prefs.is_paused("u1", now() + Duration::minutes(10)));
        assert!(!prefs.is_paused("u1", now() + Duration::minutes(16)));
        assert!(!prefs.is_paused("u2", now()));
    }

    #[test]
    fn snooze_never_exceeds_a_day() {
        let prefs = ReminderPreferences::new();
        let until = prefs.snooze("u1", u32::MAX, now());
        assert_eq!(until, now() + Duration::days(1));
    }

    #[test]
    fn pause_lasts_until_local_midnight() {
        let prefs = ReminderPreferences::new();
        let tz: Tz = "America/New_York".parse().unwrap();
        let until = prefs.pause_for_today("u1", now(), tz);
        // 2026-01-06 00:00 in New York is 05:00 UTC
        assert_eq!(until, Utc.with_ymd_and_hms(2026, 1, 6, 5, 0, 0).unwrap());
        assert!(prefs.is_paused("u1", now() + Duration::hours(12)));
        assert!(!prefs.is_paused("u1", until + Duration::minutes(1)));
    }

    #[test]
    fn longest_hold_wins() {
        let prefs = ReminderPreferences::new();
        let paused = prefs.pause_for_today("u1", now(), Tz::UTC);
        prefs.snooze("u1", 30, now());
        assert_eq!(prefs.resume_at("u1", now()), Some(paused));
    }
}
