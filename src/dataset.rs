//! Seeded synthetic training data.
//!
//! Samples are drawn column by column from a single `StdRng`, so the same
//! seed always yields the same matrix and labels.

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Gamma, Normal};

use crate::error::ModelError;
use crate::types::N_FEATURES;

pub const DEFAULT_ROWS: usize = 3000;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticDataset {
    /// `rows x N_FEATURES`, same column order as `FeatureVector`.
    pub features: Array2<f64>,
    /// 0/1 per row.
    pub labels: Array1<u8>,
}

impl SyntheticDataset {
    pub fn rows(&self) -> usize {
        self.labels.len()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&y| y == 1).count()
    }
}

/// Hours [7,9] and [16,18].
pub fn is_rush_hour(hour: u8) -> bool {
    (7..=9).contains(&hour) || (16..=18).contains(&hour)
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Linear risk score used to label synthetic rows.
pub fn risk_score(
    hour: u8,
    weekday: u8,
    weather: u8,
    incident: u8,
    speed: f64,
    flow: f64,
    distance: f64,
) -> f64 {
    let rush = if is_rush_hour(hour) { 1.0 } else { 0.0 };
    let workday = if (1..=5).contains(&weekday) { 1.0 } else { 0.0 };
    let rain = if weather == 1 { 1.0 } else { 0.0 };
    let snow = if weather == 2 { 1.0 } else { 0.0 };

    0.08 * flow - 0.04 * speed
        + 0.6 * incident as f64
        + 0.3 * rain
        + 0.6 * snow
        + 0.15 * workday
        + 0.25 * rush
        + 0.02 * (distance - 3.0).max(0.0)
}

pub fn generate(n: usize, seed: u64) -> Result<SyntheticDataset, ModelError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let hours: Vec<u8> = (0..n).map(|_| rng.random_range(0..24u8)).collect();
    let weekdays: Vec<u8> = (0..n).map(|_| rng.random_range(0..7u8)).collect();
    let weather: Vec<u8> = (0..n).map(|_| rng.random_range(0..3u8)).collect();
    let incidents: Vec<u8> = (0..n).map(|_| rng.random_range(0..2u8)).collect();

    let mut flow = Vec::with_capacity(n);
    for i in 0..n {
        let (rush, bad_weather, inc) = indicators(hours[i], weather[i], incidents[i]);
        let mean = 20.0 + 30.0 * rush + 10.0 * bad_weather + 25.0 * inc;
        let dist = Normal::new(mean, 5.0).map_err(|e| ModelError::InvalidData(e.to_string()))?;
        flow.push(dist.sample(&mut rng).clamp(5.0, 120.0));
    }

    let mut speed = Vec::with_capacity(n);
    for i in 0..n {
        let (rush, bad_weather, inc) = indicators(hours[i], weather[i], incidents[i]);
        let mean = 60.0 - 20.0 * rush - 10.0 * bad_weather - 25.0 * inc;
        let dist = Normal::new(mean, 8.0).map_err(|e| ModelError::InvalidData(e.to_string()))?;
        speed.push(dist.sample(&mut rng).clamp(5.0, 130.0));
    }

    let gamma = Gamma::<f64>::new(2.0, 2.0).map_err(|e| ModelError::InvalidData(e.to_string()))?;
    let distance: Vec<f64> = (0..n)
        .map(|_| gamma.sample(&mut rng).clamp(0.1, 50.0))
        .collect();

    let mut cells = Vec::with_capacity(n * N_FEATURES);
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let z = risk_score(
            hours[i],
            weekdays[i],
            weather[i],
            incidents[i],
            speed[i],
            flow[i],
            distance[i],
        );
        labels.push(u8::from(sigmoid(z) > 0.5));
        cells.extend_from_slice(&[
            hours[i] as f64,
            weekdays[i] as f64,
            weather[i] as f64,
            incidents[i] as f64,
            speed[i],
            flow[i],
            distance[i],
        ]);
    }

    let features = Array2::from_shape_vec((n, N_FEATURES), cells)
        .map_err(|e| ModelError::InvalidData(e.to_string()))?;
    Ok(SyntheticDataset {
        features,
        labels: Array1::from_vec(labels),
    })
}

fn indicators(hour: u8, weather: u8, incident: u8) -> (f64, f64, f64) {
    (
        if is_rush_hour(hour) { 1.0 } else { 0.0 },
        if weather > 0 { 1.0 } else { 0.0 },
        incident as f64,
    )
}
