//! Civil-date handling.
//!
//! Every date in the pipeline is a `NaiveDate` in one configured civil
//! timezone (a fixed UTC offset). Dates are formatted as `YYYY-MM-DD` for both
//! the store and the upstream, so the stored date and the queried date can
//! never drift apart.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset as _, Utc};

use crate::{Error, Result};

/// The canonical wire and storage format.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A fixed-offset civil timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilZone {
  offset: FixedOffset,
}

impl CivilZone {
  pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
    let offset = minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .ok_or(Error::InvalidOffset(minutes))?;
    Ok(Self { offset })
  }

  pub fn utc() -> Self {
    Self { offset: Utc.fix() }
  }

  /// The civil date of `instant` in this zone.
  pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
    instant.with_timezone(&self.offset).date_naive()
  }

  pub fn today(&self) -> NaiveDate { self.date_of(Utc::now()) }

  /// Use `explicit` when given, otherwise today in this zone.
  pub fn resolve(&self, explicit: Option<NaiveDate>) -> NaiveDate {
    explicit.unwrap_or_else(|| self.today())
  }
}

pub fn format_date(date: NaiveDate) -> String {
  date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
    .map_err(|_| Error::InvalidDate(s.to_owned()))
}
