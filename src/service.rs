use chrono::Utc;
use std::sync::Arc;

use crate::error::ServiceError;
use crate::geo;
use crate::model::{TrafficModel, TrainReport};
use crate::recommend::recommendations;
use crate::store::PredictionStore;
use crate::types::{
    FeatureVector, ListQuery, NewPrediction, PredictionInput, PredictionResult, RiskLevel,
    StoredPrediction,
};

/// Slowest speed the travel-time estimate will assume, km/h.
const MIN_PREDICTED_SPEED: f64 = 5.0;
/// Fraction of the observed speed lost at probability 1.
const RISK_SLOWDOWN: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct PredictionOutcome {
    pub result: PredictionResult,
    pub record: StoredPrediction,
}

/// Glue between the model, the recommendation rules and the store.
#[derive(Clone)]
pub struct TrafficService {
    model: Arc<TrafficModel>,
    store: Arc<dyn PredictionStore>,
    default_seed: u64,
}

impl TrafficService {
    pub fn new(model: Arc<TrafficModel>, store: Arc<dyn PredictionStore>, default_seed: u64) -> Self {
        Self {
            model,
            store,
            default_seed,
        }
    }

    pub fn model(&self) -> &TrafficModel {
        &self.model
    }

    pub fn predict(&self, input: &PredictionInput) -> Result<PredictionOutcome, ServiceError> {
        input.validate().map_err(ServiceError::Validation)?;

        let distance = resolve_distance(input);
        let features = FeatureVector::from_input(input, distance.unwrap_or(0.0));

        if std::env::var("LOG_PRED").ok().as_deref() == Some("1") {
            tracing::info!("features {:?}", features.as_slice());
        }

        let pred = self
            .model
            .predict(&[features])?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Internal("model returned no rows".to_string()))?;

        let risk = RiskLevel::from_label(pred.label);
        let recs = recommendations(input, input.distance_km, pred.probability, pred.label);

        let distance_km = distance.unwrap_or(0.0);
        let speed = predicted_speed(input.average_speed, pred.probability);
        let record = self.store.save(&NewPrediction {
            input: input.clone(),
            distance_km,
            risk,
            probability: pred.probability,
            predicted_speed: speed,
            predicted_travel_time_minutes: travel_time_minutes(distance_km, speed),
            created_at: Utc::now(),
        })?;

        tracing::debug!(
            "prediction id={} risk={} p={:.3} dist={:.2}km",
            record.id,
            risk.as_str(),
            pred.probability,
            distance_km
        );

        Ok(PredictionOutcome {
            result: PredictionResult {
                risk,
                probability: round3(pred.probability),
                recommendations: recs,
            },
            record,
        })
    }

    /// Retrains with `seed`, or the configured default. On failure the
    /// previous model keeps serving.
    pub fn retrain(&self, seed: Option<u64>) -> Result<TrainReport, ServiceError> {
        let seed = seed.unwrap_or(self.default_seed);
        tracing::info!("retrain requested with seed {}", seed);
        Ok(self.model.train(seed)?)
    }

    pub fn list(&self, query: &ListQuery) -> Result<Vec<StoredPrediction>, ServiceError> {
        query.validate().map_err(ServiceError::Validation)?;
        Ok(self.store.list(query)?)
    }

    pub fn get(&self, id: i64) -> Result<StoredPrediction, ServiceError> {
        Ok(self.store.get(id)?)
    }
}

/// Explicit distance wins; otherwise derived from both endpoints. A failed
/// computation counts as unknown.
pub fn resolve_distance(input: &PredictionInput) -> Option<f64> {
    if let Some(d) = input.distance_km {
        return Some(d);
    }
    let (a, b) = input.endpoints()?;
    match geo::distance_km(a, b) {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!("distance unavailable, using 0 km: {}", e);
            None
        }
    }
}

pub fn predicted_speed(average_speed: f64, probability: f64) -> f64 {
    (average_speed * (1.0 - RISK_SLOWDOWN * probability)).max(MIN_PREDICTED_SPEED)
}

pub fn travel_time_minutes(distance_km: f64, speed_kmh: f64) -> f64 {
    if distance_km <= 0.0 || speed_kmh <= 0.0 {
        0.0
    } else {
        distance_km / speed_kmh * 60.0
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
