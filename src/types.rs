use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of columns the classifier is fitted on.
pub const N_FEATURES: usize = 7;

/// Column names, in the order the fitted pipeline expects them.
pub const FEATURE_NAMES: [&str; N_FEATURES] =
    ["hour", "weekday", "weather", "incident", "speed", "flow", "distance"];

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PredictionInput {
    pub hour: u8,             // 0..=23
    pub weekday: u8,          // 0=Mon .. 6=Sun
    pub weather: u8,          // 0=clear, 1=rain, 2=snow
    pub incident: u8,         // 0/1
    pub average_speed: f64,   // km/h
    pub vehicle_flow: f64,    // veh/min
    #[serde(default)]
    pub lat_a: Option<f64>,
    #[serde(default)]
    pub lon_a: Option<f64>,
    #[serde(default)]
    pub lat_b: Option<f64>,
    #[serde(default)]
    pub lon_b: Option<f64>,
    #[serde(default)]
    pub distance_km: Option<f64>,
}

impl PredictionInput {
    /// Both endpoints, when all four coordinates were supplied.
    pub fn endpoints(&self) -> Option<((f64, f64), (f64, f64))> {
        match (self.lat_a, self.lon_a, self.lat_b, self.lon_b) {
            (Some(la), Some(oa), Some(lb), Some(ob)) => Some(((la, oa), (lb, ob))),
            _ => None,
        }
    }

    /// Range checks performed before the input reaches the model.
    pub fn validate(&self) -> Result<(), String> {
        if self.hour > 23 {
            return Err(format!("hour must be in 0..=23, got {}", self.hour));
        }
        if self.weekday > 6 {
            return Err(format!("weekday must be in 0..=6, got {}", self.weekday));
        }
        if self.weather > 2 {
            return Err(format!("weather must be 0, 1 or 2, got {}", self.weather));
        }
        if self.incident > 1 {
            return Err(format!("incident must be 0 or 1, got {}", self.incident));
        }
        if !(self.average_speed.is_finite() && self.average_speed > 0.0) {
            return Err("average_speed must be > 0".to_string());
        }
        if !(self.vehicle_flow.is_finite() && self.vehicle_flow > 0.0) {
            return Err("vehicle_flow must be > 0".to_string());
        }
        for (name, lat) in [("lat_a", self.lat_a), ("lat_b", self.lat_b)] {
            if let Some(v) = lat {
                if !v.is_finite() || v.abs() > 90.0 {
                    return Err(format!("{} must be within [-90, 90]", name));
                }
            }
        }
        for (name, lon) in [("lon_a", self.lon_a), ("lon_b", self.lon_b)] {
            if let Some(v) = lon {
                if !v.is_finite() || v.abs() > 180.0 {
                    return Err(format!("{} must be within [-180, 180]", name));
                }
            }
        }
        if let Some(d) = self.distance_km {
            if !d.is_finite() || d < 0.0 {
                return Err("distance_km must be >= 0".to_string());
            }
        }
        Ok(())
    }
}

/// `[hour, weekday, weather, incident, speed, flow, distance]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; N_FEATURES]);

impl FeatureVector {
    pub fn from_input(input: &PredictionInput, distance_km: f64) -> Self {
        Self([
            input.hour as f64,
            input.weekday as f64,
            input.weather as f64,
            input.incident as f64,
            input.average_speed,
            input.vehicle_flow,
            distance_km,
        ])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Low,
}

impl RiskLevel {
    pub fn from_label(label: u8) -> Self {
        if label == 1 {
            RiskLevel::High
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "high",
            RiskLevel::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub risk: RiskLevel,
    /// Positive-class score, rounded to 3 decimals.
    pub probability: f64,
    pub recommendations: Vec<String>,
}

/// A prediction about to be persisted. `created_at` is set by the caller,
/// the identifier by the store.
#[derive(Debug, Clone)]
pub struct NewPrediction {
    pub input: PredictionInput,
    pub distance_km: f64,
    pub risk: RiskLevel,
    pub probability: f64,
    pub predicted_speed: f64,
    pub predicted_travel_time_minutes: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: i64,
    pub lat_a: Option<f64>,
    pub lon_a: Option<f64>,
    pub lat_b: Option<f64>,
    pub lon_b: Option<f64>,
    pub distance_km: f64,
    pub hour: u8,
    pub weekday: u8,
    pub weather: u8,
    pub incident: u8,
    pub average_speed: f64,
    pub vehicle_flow: f64,
    pub risk: RiskLevel,
    pub probability: f64,
    pub predicted_speed: f64,
    pub predicted_travel_time_minutes: f64,
    pub created_at: DateTime<Utc>,
}

fn default_limit() -> u32 {
    100
}

/// Paging and time window for listing stored predictions.
///
/// Timestamps are compared at microsecond resolution: `created_at`,
/// `start_time` and `end_time` are all truncated to whole microseconds, so
/// two instants within the same microsecond compare equal.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: default_limit(),
            start_time: None,
            end_time: None,
        }
    }
}

impl ListQuery {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn page(skip: u32, limit: u32) -> Self {
        Self {
            skip,
            limit,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(format!("limit must be in 1..={}", Self::MAX_LIMIT));
        }
        if let (Some(s), Some(e)) = (self.start_time, self.end_time) {
            if s > e {
                return Err("start_time must not be after end_time".to_string());
            }
        }
        Ok(())
    }
}
