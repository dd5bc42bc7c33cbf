//! Text form of [`Value::Timestamp`](crate::Value::Timestamp).
//!
//! Timestamps are held as microseconds since the Unix epoch (UTC) and stored
//! as `YYYY-MM-DD HH:MM:SS[.ffffff]`. Parsing also accepts a bare date and
//! the ISO `T` separator.

use regex::Regex;
use std::sync::OnceLock;

const MICROS_PER_SECOND: i64 = 1_000_000;
const SECONDS_PER_DAY: i64 = 86_400;

fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(-?\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,6}))?)?)?Z?$",
        )
        .expect("timestamp pattern compiles")
    })
}

/// Format microseconds since the epoch as `YYYY-MM-DD HH:MM:SS[.ffffff]`.
pub fn format(micros: i64) -> String {
    let seconds = micros.div_euclid(MICROS_PER_SECOND);
    let fraction = micros.rem_euclid(MICROS_PER_SECOND);
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    let of_day = seconds.rem_euclid(SECONDS_PER_DAY);
    let (year, month, day) = civil_from_days(days);

    let mut out = format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        of_day / 3600,
        (of_day % 3600) / 60,
        of_day % 60
    );
    if fraction != 0 {
        out.push_str(&format!(".{fraction:06}"));
    }
    out
}

/// Parse the text form back into microseconds since the epoch.
///
/// Returns `None` for anything that is not a valid calendar date and time.
pub fn parse(text: &str) -> Option<i64> {
    let caps = pattern().captures(text.trim())?;
    let number = |i: usize| -> Option<i64> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };

    let year = number(1)?;
    let month = u32::try_from(number(2)?).ok()?;
    let day = u32::try_from(number(3)?).ok()?;
    let (hour, minute, second) = (number(4)?, number(5)?, number(6)?);

    if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
        return None;
    }
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    let fraction = match caps.get(7) {
        Some(m) => {
            let digits = m.as_str();
            let scale = 10_i64.pow(6 - u32::try_from(digits.len()).ok()?);
            digits.parse::<i64>().ok()? * scale
        }
        None => 0,
    };

    let days = days_from_civil(year, month, day);
    let seconds = days * SECONDS_PER_DAY + hour * 3600 + minute * 60 + second;
    seconds
        .checked_mul(MICROS_PER_SECOND)?
        .checked_add(fraction)
}

fn is_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap(year) => 29,
        _ => 28,
    }
}

// Howard Hinnant's civil calendar algorithms.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = i64::from(month);
    let shifted = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * shifted + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_epoch() {
        assert_eq!(format(0), "1970-01-01 00:00:00");
        assert_eq!(format(1_500_000), "1970-01-01 00:00:01.500000");
        assert_eq!(format(-MICROS_PER_SECOND), "1969-12-31 23:59:59");
    }

    #[test]
    fn parses_common_forms() {
        assert_eq!(parse("1970-01-02"), Some(SECONDS_PER_DAY * MICROS_PER_SECOND));
        assert_eq!(parse("2000-02-29T12:00:00"), parse("2000-02-29 12:00:00"));
        assert_eq!(parse("1970-01-01 00:00:00.25"), Some(250_000));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert_eq!(parse("2001-02-29"), None);
        assert_eq!(parse("2001-13-01"), None);
        assert_eq!(parse("2001-01-01 24:00:00"), None);
        assert_eq!(parse("yesterday"), None);
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(micros in -62_135_596_800_000_000_i64..253_402_300_799_000_000) {
            prop_assert_eq!(parse(&format(micros)), Some(micros));
        }
    }
}
