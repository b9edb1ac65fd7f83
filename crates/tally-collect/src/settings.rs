//! Collector tuning.

use std::time::Duration;

use serde::Deserialize;
use tally_core::date::CivilZone;

use crate::Result;

/// The `[collect]` configuration section. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectSettings {
  /// Spacing between Phase 1 upstream calls.
  pub activity_delay_ms:  u64,
  /// Spacing between Phase 2 upstream calls.
  pub homework_delay_ms:  u64,
  /// Spacing between Phase 3 upstream calls.
  pub detail_delay_ms:    u64,
  /// Wall-clock budget of one Phase 3 invocation, measured from loop entry.
  pub time_budget_secs:   u64,
  /// Soft cap on the summed wrong count of one Phase 3 batch.
  pub wrong_count_cap:    u32,
  /// Problem results written per insert statement batch.
  pub insert_chunk:       usize,
  pub max_chain_depth:    u32,
  /// Offset of the civil timezone all dates are expressed in.
  pub utc_offset_minutes: i32,
}

impl Default for CollectSettings {
  fn default() -> Self {
    Self {
      activity_delay_ms:  300,
      homework_delay_ms:  300,
      detail_delay_ms:    200,
      time_budget_secs:   120,
      wrong_count_cap:    100,
      insert_chunk:       100,
      max_chain_depth:    15,
      utc_offset_minutes: 0,
    }
  }
}

impl CollectSettings {
  pub fn zone(&self) -> Result<CivilZone> {
    Ok(CivilZone::from_offset_minutes(self.utc_offset_minutes)?)
  }

  pub fn time_budget(&self) -> Duration { Duration::from_secs(self.time_budget_secs) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_section_keeps_defaults() {
    let settings: CollectSettings =
      serde_json::from_value(serde_json::json!({ "wrong_count_cap": 40 })).unwrap();
    assert_eq!(settings.wrong_count_cap, 40);
    assert_eq!(settings.max_chain_depth, 15);
    assert_eq!(settings.time_budget(), Duration::from_secs(120));
  }
}
