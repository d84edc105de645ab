use super::*;
use std::time::{Duration, UNIX_EPOCH};

/// 2026-06-15T00:00:00Z
fn mid_2026() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_781_481_600)
}

#[test]
fn first_id_starts_before_count_one() {
    let first = IncreaseId::first(mid_2026());
    assert_eq!(first, IncreaseId { year: 2026, count: 0 });
    assert_eq!(first.increase(2026), IncreaseId { year: 2026, count: 1 });
}

#[test]
fn increase_within_year() {
    let id = IncreaseId { year: 2026, count: 41 };
    assert_eq!(id.increase(2026), IncreaseId { year: 2026, count: 42 });
}

#[test]
fn increase_rolls_over_year() {
    let id = IncreaseId { year: 2026, count: 7 };
    assert_eq!(id.increase(2027), IncreaseId { year: 2027, count: 1 });
}

#[test]
fn increase_ignores_clock_going_backwards() {
    let id = IncreaseId { year: 2027, count: 3 };
    assert_eq!(id.increase(2026), IncreaseId { year: 2027, count: 4 });
}

#[test]
fn display_pads_year_and_uses_base36() {
    assert_eq!(IncreaseId { year: 2026, count: 1 }.to_string(), "1ka1");
    assert_eq!(IncreaseId { year: 2026, count: 36 }.to_string(), "1ka10");
    assert_eq!(IncreaseId { year: 35, count: 0 }.to_string(), "00z0");
}

#[test]
fn parse_display_form() {
    let parsed: IncreaseId = "1ka10".parse().unwrap();
    assert_eq!(parsed, IncreaseId { year: 2026, count: 36 });
}

#[test]
fn parse_rejects_year_only() {
    assert_eq!(
        "1ka".parse::<IncreaseId>(),
        Err(IncreaseIdError::TooShort("1ka".to_string()))
    );
}

#[test]
fn parse_rejects_non_base36() {
    assert!(matches!(
        "1ka-1".parse::<IncreaseId>(),
        Err(IncreaseIdError::InvalidDigits(_))
    ));
}

#[test]
fn ordering_follows_year_then_count() {
    let a = IncreaseId { year: 2026, count: 999 };
    let b = IncreaseId { year: 2027, count: 1 };
    assert!(a < b);
    assert!(a.increase(2026) > a);
}

#[test]
fn year_of_is_utc_calendar_year() {
    assert_eq!(year_of(mid_2026()), 2026);
}
