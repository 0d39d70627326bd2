// Great-circle distance and start-time labelling shared by the nearby and
// recommendation paths.

use chrono::{DateTime, Utc};

/// Mean Earth radius in kilometers, matching the constant used by the
/// storage-side haversine in the original platform.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine great-circle distance in kilometers between two lat/lng pairs.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Whole days until the event starts, floored; 0 once the event has started.
pub fn days_until(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if start <= now {
        return 0;
    }
    (start - now).num_days()
}

/// Human-readable countdown label shown on event cards.
pub fn days_left_label(days: i64) -> String {
    match days {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        n => format!("{} days left", n),
    }
}
