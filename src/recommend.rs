use crate::dataset::is_rush_hour;
use crate::types::PredictionInput;

pub const REDUCE_SPEED: &str = "Reduce speed and increase following distance.";
pub const ALTERNATE_ROUTE: &str = "Consider an alternate route if possible.";
pub const AVOID_INCIDENT: &str = "Avoid the reported incident area (detour recommended).";
pub const RAIN_BRAKING: &str = "Rain: allow longer braking distances.";
pub const SNOW_CAUTION: &str = "Snow: drive cautiously and avoid sudden maneuvers.";
pub const FLOWING: &str = "Traffic is flowing: maintain defensive driving.";
pub const RUSH_HOUR: &str = "Rush hour: watch for sudden slowdowns.";
pub const LONG_TRIP: &str = "Long trip: plan a break if needed.";

/// Probability at or above which high-risk advice is given even for label 0.
pub const CAUTION_PROBABILITY: f64 = 0.6;
pub const LONG_TRIP_KM: f64 = 10.0;

/// Advisory strings for one prediction, in a fixed order.
///
/// `distance_km` is the distance the caller supplied explicitly. A distance
/// derived from coordinates does not count here.
pub fn recommendations(
    input: &PredictionInput,
    distance_km: Option<f64>,
    probability: f64,
    label: u8,
) -> Vec<String> {
    let mut rec = Vec::new();

    if label == 1 || probability >= CAUTION_PROBABILITY {
        rec.push(REDUCE_SPEED);
        rec.push(ALTERNATE_ROUTE);
        if input.incident == 1 {
            rec.push(AVOID_INCIDENT);
        }
        match input.weather {
            1 => rec.push(RAIN_BRAKING),
            2 => rec.push(SNOW_CAUTION),
            _ => {}
        }
    } else {
        rec.push(FLOWING);
    }

    if is_rush_hour(input.hour) {
        rec.push(RUSH_HOUR);
    }
    if distance_km.is_some_and(|d| d > LONG_TRIP_KM) {
        rec.push(LONG_TRIP);
    }

    rec.into_iter().map(String::from).collect()
}
