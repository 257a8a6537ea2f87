//! Directory generalized-time parsing and the date arithmetic built on it.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use cshldap_core::Error;

use crate::Result;

/// Only the `YYYYmmddHHMM` prefix of a generalized-time value is significant.
const TIMESTAMP_PREFIX_LEN: usize = "YYYYmmddHHMM".len();

/// Parses the date portion of a directory timestamp such as `19900315000000Z`.
///
/// # Errors
///
/// Returns [`Error::InvalidTimestamp`] when the first twelve characters are not a valid
/// `YYYYmmddHHMM` value.
pub fn date_from_ldap_timestamp(timestamp: &str) -> Result<NaiveDate> {
    let prefix = timestamp
        .get(..TIMESTAMP_PREFIX_LEN)
        .ok_or_else(|| Error::InvalidTimestamp(format!("`{timestamp}` is too short")))?;
    let parsed = NaiveDateTime::parse_from_str(prefix, "%Y%m%d%H%M")?;
    Ok(parsed.date())
}

/// Whole years between `birthdate` and `today`.
///
/// One year is taken off while this year's birthday is still ahead.
#[must_use]
pub fn age_on(birthdate: NaiveDate, today: NaiveDate) -> i32 {
    let years = today.year() - birthdate.year();
    if (today.month(), today.day()) < (birthdate.month(), birthdate.day()) {
        years - 1
    } else {
        years
    }
}

/// True when `today` shares the month and day of `birthdate`.
#[must_use]
pub fn is_birthday_on(birthdate: NaiveDate, today: NaiveDate) -> bool {
    birthdate.month() == today.month() && birthdate.day() == today.day()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn parses_generalized_time() {
        assert_eq!(
            date_from_ldap_timestamp("19900315000000Z").unwrap(),
            date(1990, 3, 15)
        );
        assert_eq!(
            date_from_ldap_timestamp("201208271342").unwrap(),
            date(2012, 8, 27)
        );
    }

    #[test]
    fn rejects_short_or_garbage_timestamps() {
        assert!(matches!(
            date_from_ldap_timestamp("1990"),
            Err(Error::InvalidTimestamp(_))
        ));
        assert!(matches!(
            date_from_ldap_timestamp("19901315000000Z"),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn age_before_and_after_birthday() {
        let birth = date(1990, 3, 15);
        assert_eq!(age_on(birth, date(2024, 3, 10)), 33);
        assert_eq!(age_on(birth, date(2024, 3, 20)), 34);
        assert_eq!(age_on(birth, date(2024, 3, 15)), 34);
        assert_eq!(age_on(birth, date(2024, 1, 31)), 33);
        assert_eq!(age_on(birth, date(2024, 11, 1)), 34);
    }

    #[test]
    fn birthday_ignores_year() {
        let birth = date(1990, 7, 4);
        assert!(is_birthday_on(birth, date(2024, 7, 4)));
        assert!(is_birthday_on(birth, date(1776, 7, 4)));
        assert!(!is_birthday_on(birth, date(2024, 7, 5)));
        assert!(!is_birthday_on(birth, date(2024, 4, 7)));
    }
}
