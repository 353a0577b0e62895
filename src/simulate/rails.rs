//! Rail selection and maintenance-window detection.

use crate::store::transfer::Rail;
use chrono::{DateTime, Timelike, Utc};

pub use crate::store::transfer::Rail as SelectedRail;

/// Re-exports the rail/timing selection rule so callers in this module tree
/// don't need to reach into `store::transfer` directly.
pub fn select(source: crate::money::Currency, destination: crate::money::Currency) -> Rail {
    Rail::select(source, destination)
}

/// Whether `rail` is inside its scheduled maintenance window at `now`.
/// Only SPEI has a known window (22:00-06:00); since rail timezone isn't
/// otherwise pinned down and LATAM rails span several timezones, this
/// assumes UTC throughout.
pub fn in_maintenance_window(rail: Rail, now: DateTime<Utc>) -> bool {
    match rail {
        Rail::Spei => {
            let hour = now.hour();
            !(6..22).contains(&hour)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn spei_maintenance_window_spans_overnight_utc() {
        let late = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(in_maintenance_window(Rail::Spei, late));
        assert!(!in_maintenance_window(Rail::Spei, midday));
    }

    #[test]
    fn other_rails_have_no_maintenance_window() {
        assert!(!in_maintenance_window(Rail::Pix, Utc::now()));
    }
}
