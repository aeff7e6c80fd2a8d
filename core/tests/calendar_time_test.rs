use chrono::{Datelike, Local, TimeZone};
use domotimer::datetime::{CalendarTime, DateField, Resolution, WeekdaySet};
use pretty_assertions::assert_eq;

fn local(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> chrono::DateTime<Local> {
    Local
        .with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap()
}

fn resolve(
    candidate: &mut CalendarTime,
    reference: &chrono::DateTime<Local>,
) -> Resolution {
    let current = CalendarTime::reference(reference);
    candidate.try_resolve(&current, DateField::Year, DateField::Minute)
}

fn fields(ct: &CalendarTime) -> (i32, u32, u32, u32, u32) {
    (ct.year(), ct.month(), ct.day(), ct.hour(), ct.minute())
}

#[test]
fn noon_spec_resolves_same_day_before_noon() {
    let now = local(2024, 6, 10, 11, 59);
    let mut candidate =
        CalendarTime::constrained(&now, None, None, None, Some(12), Some(0), WeekdaySet::ANY);
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2024, 6, 10, 12, 0));
}

#[test]
fn noon_spec_rolls_to_next_day_on_equality() {
    let now = local(2024, 6, 10, 12, 0);
    let mut candidate =
        CalendarTime::constrained(&now, None, None, None, Some(12), Some(0), WeekdaySet::ANY);
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2024, 6, 11, 12, 0));
}

#[test]
fn weekday_constraint_skips_to_next_monday() {
    // 2024-06-10 is a Monday, the 08:30 slot has already passed
    let now = local(2024, 6, 10, 9, 0);
    let mut candidate = CalendarTime::constrained(
        &now,
        None,
        None,
        None,
        Some(8),
        Some(30),
        WeekdaySet::MON,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2024, 6, 17, 8, 30));
}

#[test]
fn leap_day_resolves_to_next_leap_year() {
    let now = local(2023, 3, 1, 0, 0);
    let mut candidate = CalendarTime::constrained(
        &now,
        None,
        Some(2),
        Some(29),
        None,
        None,
        WeekdaySet::ANY,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(candidate.year(), 2024);
    assert_eq!(candidate.month(), 2);
    assert_eq!(candidate.day(), 29);
}

#[test]
fn day_31_in_february_is_impossible() {
    let now = local(2024, 1, 1, 0, 0);
    let mut candidate = CalendarTime::constrained(
        &now,
        None,
        Some(2),
        Some(31),
        Some(0),
        Some(0),
        WeekdaySet::ANY,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Impossible);
}

#[test]
fn leap_day_with_pinned_common_year_is_impossible() {
    let now = local(2022, 1, 1, 0, 0);
    let mut candidate = CalendarTime::constrained(
        &now,
        Some(2023),
        Some(2),
        Some(29),
        Some(0),
        Some(0),
        WeekdaySet::ANY,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Impossible);
}

#[test]
fn pinned_fields_survive_resolution() {
    let now = local(2024, 6, 10, 14, 45);
    let mut candidate = CalendarTime::constrained(
        &now,
        None,
        Some(3),
        Some(15),
        Some(6),
        Some(30),
        WeekdaySet::ANY,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(candidate.month(), 3);
    assert_eq!(candidate.day(), 15);
    assert_eq!(candidate.hour(), 6);
    assert_eq!(candidate.minute(), 30);
    assert_eq!(candidate.year(), 2025);
    assert!(candidate.is_field_fixed(DateField::Day));
    assert!(!candidate.is_field_fixed(DateField::Year));
}

#[test]
fn month_rollover_resets_free_time_fields() {
    // day is pinned behind the reference, the month escalation must zero the
    // free time-of-day fields instead of dragging 10:30 along
    let now = local(2024, 12, 20, 10, 30);
    let mut candidate = CalendarTime::constrained(
        &now,
        None,
        None,
        Some(5),
        None,
        None,
        WeekdaySet::ANY,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2025, 1, 5, 0, 0));
}

#[test]
fn free_minute_advances_within_the_hour() {
    let now = local(2024, 6, 10, 12, 0);
    let mut candidate =
        CalendarTime::constrained(&now, None, None, None, Some(12), None, WeekdaySet::ANY);
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2024, 6, 10, 12, 1));
}

#[test]
fn untouched_free_fields_keep_reference_values() {
    // the pinned day lies ahead, nothing forces the free time fields away from
    // the reference snapshot
    let now = local(2024, 6, 10, 11, 45);
    let mut candidate =
        CalendarTime::constrained(&now, None, None, Some(15), None, None, WeekdaySet::ANY);
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2024, 6, 15, 11, 45));
}

#[test]
fn weekday_mask_bit_always_set_on_resolution() {
    let mask = WeekdaySet::TUE.with(WeekdaySet::THU);
    for start_day in 1..=14 {
        let now = local(2024, 6, start_day, 13, 37);
        let mut candidate =
            CalendarTime::constrained(&now, None, None, None, Some(7), Some(0), mask);
        assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
        let date = candidate.date().unwrap();
        assert!(mask.contains(date.weekday()), "landed on {date}");
    }
}

#[test]
fn weekday_incompatible_with_pinned_month_end_is_unresolved() {
    // 2024-06-29 is a Saturday, the 30th a Sunday; with day, month and year all
    // pinned there is no Monday left to advance into
    let now = local(2024, 6, 1, 0, 0);
    let mut candidate = CalendarTime::constrained(
        &now,
        Some(2024),
        Some(6),
        Some(29),
        Some(0),
        Some(0),
        WeekdaySet::MON,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Unresolved);
}

#[test]
fn day_31_slides_over_short_months() {
    let now = local(2024, 4, 2, 0, 0);
    let mut candidate = CalendarTime::constrained(
        &now,
        None,
        None,
        Some(31),
        Some(0),
        Some(0),
        WeekdaySet::ANY,
    );
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    // April has 30 days, the next 31st is in May
    assert_eq!(fields(&candidate), (2024, 5, 31, 0, 0));
}

#[test]
fn resolution_is_strictly_greater_even_at_year_boundary() {
    let now = local(2024, 12, 31, 23, 59);
    let mut candidate =
        CalendarTime::constrained(&now, None, None, None, Some(0), Some(0), WeekdaySet::ANY);
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    assert_eq!(fields(&candidate), (2025, 1, 1, 0, 0));
}

#[test]
fn epoch_conversion_matches_chrono() {
    let now = local(2024, 6, 10, 11, 0);
    let mut candidate =
        CalendarTime::constrained(&now, None, None, None, Some(12), Some(0), WeekdaySet::ANY);
    assert_eq!(resolve(&mut candidate, &now), Resolution::Resolved);
    let expected = local(2024, 6, 10, 12, 0);
    assert_eq!(candidate.to_local().unwrap(), expected);
    assert_eq!(candidate.epoch_secs().unwrap(), expected.timestamp());
}

#[test]
fn reference_comparison_is_lexicographic() {
    let earlier = CalendarTime::reference(&local(2024, 6, 10, 11, 59));
    let later = CalendarTime::reference(&local(2024, 6, 10, 12, 0));
    assert!(later > earlier);
    let next_year = CalendarTime::reference(&local(2025, 1, 1, 0, 0));
    assert!(next_year > later);
}

#[test]
fn weekday_names_roundtrip() {
    let mask = WeekdaySet::from_names("Mon,Wed,Fri").unwrap();
    assert_eq!(mask.names(), "Mon,Wed,Fri");
    assert!(WeekdaySet::from_names("Mon,Nope").is_err());
    assert!(WeekdaySet::from_names("").unwrap().is_any());
}
