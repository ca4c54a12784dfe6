//! Time-slot allocation.
//!
//! A slot is a preferred local `(hour, minute)`. Candidates are tried day by
//! day from the caller's `from`, preferences in the order given, and the
//! first one that is not in the past and not within [`PROXIMITY_MINUTES`] of
//! an already scheduled post on the same local day wins.
//!
//! Calendar days are taken in an explicit zone. Local times that fall into a
//! DST gap are skipped; times repeated at fall-back resolve to the earlier
//! instant.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use fore_core::config::{default_preferred_slots, SlotsConfig};
use fore_core::TimeOfDay;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Days searched (today included) before falling back.
pub const HORIZON_DAYS: i64 = 7;
/// A candidate this close to an existing post (inclusive) is taken.
pub const PROXIMITY_MINUTES: i64 = 30;

/// Next free slot at or after `from`.
///
/// Never fails: when every candidate in the horizon is taken, the first
/// preference on the day after the horizon is returned. An empty preference
/// list means the default morning/noon/evening slots.
pub fn next_slot<Z: TimeZone>(
    existing: &[DateTime<Utc>],
    preferences: &[TimeOfDay],
    from: DateTime<Utc>,
    zone: &Z,
) -> DateTime<Utc> {
    let defaults;
    let prefs = if preferences.is_empty() {
        defaults = default_preferred_slots();
        &defaults[..]
    } else {
        preferences
    };

    if let Some(slot) = search(existing, prefs, from, zone, HORIZON_DAYS) {
        return slot;
    }

    let day = local_date(from, zone) + Duration::days(HORIZON_DAYS);
    prefs
        .iter()
        .find_map(|p| localize(zone, day, *p))
        .unwrap_or_else(|| from + Duration::days(HORIZON_DAYS))
}

/// Free instant for a single `slot`, today or tomorrow only.
pub fn quick_pick<Z: TimeZone>(
    existing: &[DateTime<Utc>],
    slot: TimeOfDay,
    from: DateTime<Utc>,
    zone: &Z,
) -> Option<DateTime<Utc>> {
    search(existing, &[slot], from, zone, 2)
}

fn search<Z: TimeZone>(
    existing: &[DateTime<Utc>],
    prefs: &[TimeOfDay],
    from: DateTime<Utc>,
    zone: &Z,
    days: i64,
) -> Option<DateTime<Utc>> {
    let start = local_date(from, zone);
    (0..days)
        .map(|offset| start + Duration::days(offset))
        .flat_map(|day| prefs.iter().map(move |p| (day, *p)))
        .filter_map(|(day, p)| localize(zone, day, p).map(|at| (day, at)))
        .find(|(day, at)| *at >= from && !conflicts(*at, *day, existing, zone))
        .map(|(_, at)| at)
}

fn conflicts<Z: TimeZone>(candidate: DateTime<Utc>, day: NaiveDate, existing: &[DateTime<Utc>], zone: &Z) -> bool {
    existing
        .iter()
        .filter(|t| local_date(**t, zone) == day)
        .any(|t| (*t - candidate).num_seconds().abs() <= PROXIMITY_MINUTES * 60)
}

fn local_date<Z: TimeZone>(t: DateTime<Utc>, zone: &Z) -> NaiveDate {
    t.with_timezone(zone).date_naive()
}

fn localize<Z: TimeZone>(zone: &Z, day: NaiveDate, slot: TimeOfDay) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(u32::from(slot.hour), u32::from(slot.minute), 0)?;
    zone.from_local_datetime(&day.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Named shortcut for one of the configured slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickPick {
    Morning,
    Noon,
    Evening,
}

impl QuickPick {
    fn index(self) -> usize {
        match self {
            QuickPick::Morning => 0,
            QuickPick::Noon => 1,
            QuickPick::Evening => 2,
        }
    }

    /// The slot this pick refers to. Falls back to the default slot when the
    /// configured list is too short.
    pub fn slot(self, preferences: &[TimeOfDay]) -> TimeOfDay {
        let i = self.index();
        preferences
            .get(i)
            .copied()
            .unwrap_or_else(|| default_preferred_slots()[i])
    }
}

impl FromStr for QuickPick {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "morning" => Ok(QuickPick::Morning),
            "noon" => Ok(QuickPick::Noon),
            "evening" => Ok(QuickPick::Evening),
            _ => Err(SchedulerError::UnknownQuickPick(s.to_string())),
        }
    }
}

/// The allocator bound to the configured zone and preferences.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    zone: Tz,
    preferred: Vec<TimeOfDay>,
}

impl SlotAllocator {
    pub fn new(zone: Tz, preferred: Vec<TimeOfDay>) -> Self {
        Self { zone, preferred }
    }

    pub fn from_config(cfg: &SlotsConfig) -> Result<Self> {
        Ok(Self::new(cfg.zone()?, cfg.preferred.clone()))
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    pub fn preferred(&self) -> &[TimeOfDay] {
        &self.preferred
    }

    pub fn next(&self, existing: &[DateTime<Utc>], from: DateTime<Utc>) -> DateTime<Utc> {
        next_slot(existing, &self.preferred, from, &self.zone)
    }

    pub fn quick(&self, pick: QuickPick, existing: &[DateTime<Utc>], from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        quick_pick(existing, pick.slot(&self.preferred), from, &self.zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::New_York;

    fn tod(h: u8, m: u8) -> TimeOfDay {
        TimeOfDay::new(h, m).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn prefs() -> Vec<TimeOfDay> {
        vec![tod(7, 0), tod(11, 0), tod(18, 0)]
    }

    #[test]
    fn picks_first_free_preference_today() {
        let from = utc(2026, 3, 2, 12, 0);
        assert_eq!(next_slot(&[], &prefs(), from, &Utc), utc(2026, 3, 2, 18, 0));
    }

    #[test]
    fn nearby_post_pushes_to_tomorrow() {
        let from = utc(2026, 3, 2, 12, 0);
        let existing = [utc(2026, 3, 2, 18, 5)];
        assert_eq!(next_slot(&existing, &prefs(), from, &Utc), utc(2026, 3, 3, 7, 0));
    }

    #[test]
    fn proximity_is_inclusive_at_thirty_minutes() {
        let from = utc(2026, 3, 2, 0, 0);
        let at_edge = [utc(2026, 3, 2, 7, 30)];
        assert_eq!(next_slot(&at_edge, &prefs(), from, &Utc), utc(2026, 3, 2, 11, 0));

        let past_edge = [utc(2026, 3, 2, 7, 31)];
        assert_eq!(next_slot(&past_edge, &prefs(), from, &Utc), utc(2026, 3, 2, 7, 0));
    }

    #[test]
    fn existing_post_on_another_day_does_not_conflict() {
        // 20 minutes apart, but on different days
        let from = utc(2026, 3, 2, 0, 0);
        let existing = [utc(2026, 3, 1, 23, 50)];
        let prefs = vec![tod(0, 10)];
        assert_eq!(next_slot(&existing, &prefs, from, &Utc), utc(2026, 3, 2, 0, 10));
    }

    #[test]
    fn slot_equal_to_from_is_allowed() {
        let from = utc(2026, 3, 2, 11, 0);
        assert_eq!(next_slot(&[], &prefs(), from, &Utc), from);
    }

    #[test]
    fn result_is_never_before_from_and_matches_a_preference() {
        let prefs = prefs();
        let mut existing = Vec::new();
        let mut from = utc(2026, 3, 2, 9, 17);
        for _ in 0..12 {
            let slot = next_slot(&existing, &prefs, from, &New_York);
            assert!(slot >= from);
            let local = slot.with_timezone(&New_York);
            assert!(prefs.contains(&tod(local.hour() as u8, local.minute() as u8)));
            existing.push(slot);
            from += Duration::hours(5);
        }
    }

    #[test]
    fn full_horizon_falls_back_to_first_preference_after_it() {
        let from = utc(2026, 3, 2, 0, 0);
        let existing: Vec<_> = (0..HORIZON_DAYS)
            .flat_map(|d| prefs().into_iter().map(move |p| (d, p)))
            .map(|(d, p)| utc(2026, 3, 2, u32::from(p.hour), 0) + Duration::days(d))
            .collect();
        assert_eq!(next_slot(&existing, &prefs(), from, &Utc), utc(2026, 3, 9, 7, 0));
    }

    #[test]
    fn empty_preferences_use_defaults() {
        let from = utc(2026, 3, 2, 10, 0);
        assert_eq!(next_slot(&[], &[], from, &Utc), utc(2026, 3, 2, 12, 0));
    }

    #[test]
    fn day_boundary_follows_the_zone() {
        // 03:30 UTC on the 10th is still 23:30 on the 9th in New York (EDT).
        let from = utc(2026, 3, 10, 3, 30);
        let prefs = vec![tod(9, 0)];
        assert_eq!(next_slot(&[], &prefs, from, &Utc), utc(2026, 3, 10, 9, 0));
        assert_eq!(next_slot(&[], &prefs, from, &New_York), utc(2026, 3, 10, 13, 0));
    }

    #[test]
    fn same_day_check_uses_local_calendar() {
        // 04:45 UTC on the 3rd is 23:45 on the 2nd in New York (EST), so it
        // does not block 00:00 on the 3rd there. In UTC it blocks 05:00 on the 3rd.
        let from = utc(2026, 3, 2, 12, 0);
        let existing = [utc(2026, 3, 3, 4, 45)];
        let prefs = vec![tod(0, 0)];
        assert_eq!(next_slot(&existing, &prefs, from, &New_York), utc(2026, 3, 3, 5, 0));
        assert_eq!(next_slot(&existing, &[tod(5, 0)], from, &Utc), utc(2026, 3, 4, 5, 0));
    }

    #[test]
    fn spring_forward_gap_is_skipped() {
        // 2026-03-08 02:30 does not exist in New York.
        let from = utc(2026, 3, 8, 5, 0); // 00:00 EST
        let prefs = vec![tod(2, 30)];
        assert_eq!(next_slot(&[], &prefs, from, &New_York), utc(2026, 3, 9, 6, 30));
    }

    #[test]
    fn fall_back_overlap_takes_earliest() {
        // 2026-11-01 01:30 happens twice in New York; EDT comes first.
        let from = utc(2026, 11, 1, 4, 0); // 00:00 EDT
        let prefs = vec![tod(1, 30)];
        assert_eq!(next_slot(&[], &prefs, from, &New_York), utc(2026, 11, 1, 5, 30));
    }

    #[test]
    fn quick_pick_searches_today_and_tomorrow_only() {
        let from = utc(2026, 3, 2, 12, 0);
        let evening = QuickPick::Evening.slot(&prefs());
        assert_eq!(quick_pick(&[], evening, from, &Utc), Some(utc(2026, 3, 2, 18, 0)));

        let morning = QuickPick::Morning.slot(&prefs());
        assert_eq!(quick_pick(&[], morning, from, &Utc), Some(utc(2026, 3, 3, 7, 0)));

        let taken = [utc(2026, 3, 3, 7, 0)];
        assert_eq!(quick_pick(&taken, morning, from, &Utc), None);
    }

    #[test]
    fn quick_pick_parsing_and_short_lists() {
        assert_eq!("Noon".parse::<QuickPick>().unwrap(), QuickPick::Noon);
        assert!("midnight".parse::<QuickPick>().is_err());
        assert_eq!(QuickPick::Evening.slot(&[tod(6, 0)]), tod(17, 0));
    }

    #[test]
    fn allocator_uses_configured_zone() {
        let cfg = SlotsConfig {
            timezone: "UTC".to_string(),
            preferred: prefs(),
        };
        let alloc = SlotAllocator::from_config(&cfg).unwrap();
        assert_eq!(alloc.next(&[], utc(2026, 3, 2, 12, 0)), utc(2026, 3, 2, 18, 0));
        assert_eq!(
            alloc.quick(QuickPick::Noon, &[], utc(2026, 3, 2, 12, 0)),
            Some(utc(2026, 3, 3, 11, 0))
        );
    }
}
