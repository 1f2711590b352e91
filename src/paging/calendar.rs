//! Mapping between day offsets and calendar dates.
//!
//! Dates are pure calendar arithmetic on the epoch, so an offset always maps to
//! the same date no matter which zone the process runs in. The zone only
//! matters when asking which offset is "today".

use chrono::{Days, Local, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};

use crate::config::TimeZoneSetting;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy)]
pub struct DayCalendar {
  epoch: NaiveDate,
}

impl DayCalendar {
  pub fn new(epoch: NaiveDate) -> Self {
    Self { epoch }
  }

  pub fn date_for_offset(&self, offset: i64) -> Result<String> {
    let days = u64::try_from(offset).map_err(|_| eyre!("Day offset {} is before the epoch", offset))?;
    let date = self
      .epoch
      .checked_add_days(Days::new(days))
      .ok_or_else(|| eyre!("Day offset {} is out of range", offset))?;
    Ok(date.format(DATE_FORMAT).to_string())
  }

  pub fn offset_for_date(&self, date: &str) -> Result<i64> {
    let parsed = NaiveDate::parse_from_str(date, DATE_FORMAT)
      .map_err(|e| eyre!("Invalid date '{}': {}", date, e))?;
    Ok(self.offset_of(parsed))
  }

  pub fn offset_of(&self, date: NaiveDate) -> i64 {
    (date - self.epoch).num_days()
  }

  /// Offset of the current date in `zone`. Negative before the epoch.
  pub fn today_offset(&self, zone: TimeZoneSetting) -> i64 {
    let today = match zone {
      TimeZoneSetting::Local => Local::now().date_naive(),
      TimeZoneSetting::Utc => Utc::now().date_naive(),
    };
    self.offset_of(today)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn calendar() -> DayCalendar {
    DayCalendar::new(NaiveDate::from_ymd_opt(2024, 11, 1).unwrap())
  }

  #[test]
  fn test_offset_zero_is_epoch() {
    assert_eq!(calendar().date_for_offset(0).unwrap(), "2024-11-01");
  }

  #[test]
  fn test_crosses_month_and_year() {
    assert_eq!(calendar().date_for_offset(30).unwrap(), "2024-12-01");
    assert_eq!(calendar().date_for_offset(61).unwrap(), "2025-01-01");
    // 2028 is a leap year
    assert_eq!(
      calendar().offset_for_date("2028-03-01").unwrap()
        - calendar().offset_for_date("2028-02-28").unwrap(),
      2
    );
  }

  #[test]
  fn test_round_trip_offset() {
    let cal = calendar();
    let date = cal.date_for_offset(400).unwrap();
    assert_eq!(cal.offset_for_date(&date).unwrap(), 400);
  }

  #[test]
  fn test_negative_offset_is_error() {
    assert!(calendar().date_for_offset(-1).is_err());
  }

  #[test]
  fn test_bad_date_is_error() {
    assert!(calendar().offset_for_date("2024-13-01").is_err());
    assert!(calendar().offset_for_date("yesterday").is_err());
  }

  #[test]
  fn test_today_is_after_epoch() {
    assert!(calendar().today_offset(TimeZoneSetting::Utc) > 0);
  }
}
