use crate::config::HarvestSettings;
use crate::models::CropProfile;
use chrono::{Days, NaiveDate};

/// Growing degree days still needed to reach maturity, never negative.
pub fn gdd_remaining(profile: &CropProfile, accumulated_gdd: f64) -> f64 {
    (profile.gdd_to_maturity - accumulated_gdd).max(0.0)
}

/// Days until maturity at the profile's assumed daily accumulation rate.
pub fn days_remaining(profile: &CropProfile, accumulated_gdd: f64) -> f64 {
    gdd_remaining(profile, accumulated_gdd) / profile.daily_gdd_rate_assumption
}

/// Percent of the maturity target already accumulated, capped at 100.
pub fn progress_pct(profile: &CropProfile, accumulated_gdd: f64) -> f64 {
    (accumulated_gdd / profile.gdd_to_maturity * 100.0).clamp(0.0, 100.0)
}

/// Calendar date `days` after `anchor`. Fractional days round up: a crop
/// needing 0.2 more days is not ready on the anchor date.
pub fn project_date(anchor: NaiveDate, days: f64) -> Option<NaiveDate> {
    if !days.is_finite() || days < 0.0 {
        return None;
    }
    let whole = days.ceil();
    if whole > u32::MAX as f64 {
        return None;
    }
    anchor.checked_add_days(Days::new(whole as u64))
}

/// Two-tier projection confidence: the GDD signal is more reliable once the
/// crop is well into its cycle. Accumulated GDD exactly at the floor already
/// counts as the high tier.
pub fn projection_confidence(settings: &HarvestSettings, accumulated_gdd: f64) -> f64 {
    if accumulated_gdd >= settings.confidence_floor_gdd {
        settings.high_confidence
    } else {
        settings.low_confidence
    }
}
