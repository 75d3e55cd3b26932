//! Time arithmetic shared by the card decoders.
//!
//! Card times are milliseconds since the zero hour, the midnight the whole
//! event is anchored to. SiCard 5 stores times modulo twelve hours and the
//! newer series modulo a day, so every decoded time has to be pushed forward
//! past a running reference to become unambiguous.

/// A time the card does not carry.
pub const NO_TIME: i64 = -1;
/// Raw value written by the station when no time was recorded.
pub const NO_SI_TIME: i64 = 1000 * 0xEEEE;
pub const TWELVE_HOURS: i64 = 12 * 3600 * 1000;
pub const ONE_DAY: i64 = 2 * TWELVE_HOURS;

/// Slack for punches recorded slightly out of order.
const ONE_HOUR: i64 = 3600 * 1000;

/// Resolves a raw card time against a running reference.
///
/// The raw value is advanced by `step` until it lands no more than one hour
/// before `reference`.
pub fn advance_time_past(raw: i64, reference: i64, step: i64) -> i64 {
    if raw == NO_SI_TIME {
        return NO_TIME;
    }
    if reference == NO_TIME {
        return raw;
    }
    let mut time = raw;
    while time < reference - ONE_HOUR {
        time += step;
    }
    time
}

/// Renders a time of day as `HH:MM:SS`, or `--:--:--` when missing.
pub fn format_time_of_day(time: i64) -> String {
    if time < 0 {
        return "--:--:--".to_string();
    }
    let secs = time / 1000;
    format!("{:02}:{:02}:{:02}", secs / 3600 % 24, secs / 60 % 60, secs % 60)
}

#[cfg(test)]
mod test_time {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert_eq!(advance_time_past(NO_SI_TIME, 0, TWELVE_HOURS), NO_TIME);
        assert_eq!(advance_time_past(NO_SI_TIME, NO_TIME, ONE_DAY), NO_TIME);
        assert_eq!(advance_time_past(5000, NO_TIME, TWELVE_HOURS), 5000);
    }

    #[test]
    fn test_advances_past_reference() {
        // 10:00 raw, reference in the afternoon: must be PM.
        let raw = 10 * 3600 * 1000;
        let reference = 13 * 3600 * 1000;
        let resolved = advance_time_past(raw, reference, TWELVE_HOURS);
        assert_eq!(resolved, raw + TWELVE_HOURS);
        assert!(resolved >= reference - 3600 * 1000);
        assert_eq!((resolved - raw) % TWELVE_HOURS, 0);
    }

    #[test]
    fn test_out_of_order_slack() {
        // Half an hour before the reference is close enough.
        let reference = 10 * 3600 * 1000;
        let raw = reference - 30 * 60 * 1000;
        assert_eq!(advance_time_past(raw, reference, TWELVE_HOURS), raw);
    }

    #[test]
    fn test_day_rollover() {
        let raw = 3600 * 1000;
        let reference = 23 * 3600 * 1000;
        assert_eq!(advance_time_past(raw, reference, ONE_DAY), raw + ONE_DAY);
    }

    #[test]
    fn test_format_time_of_day() {
        assert_eq!(format_time_of_day(NO_TIME), "--:--:--");
        assert_eq!(format_time_of_day(0), "00:00:00");
        assert_eq!(format_time_of_day(36_003_000), "10:00:03");
        // A time that rolled past midnight wraps in the display.
        assert_eq!(format_time_of_day(25 * 3600 * 1000), "01:00:00");
    }
}
