use ndarray::{Array1, Array2, ArrayView1, Axis};
use parking_lot::Mutex;

use crate::dataset::{self, sigmoid, SyntheticDataset, DEFAULT_ROWS};
use crate::error::ModelError;
use crate::types::{FeatureVector, N_FEATURES};

/// Fitting options for the logistic regression stage.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub rows: usize,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Inverse of sklearn's `C`: penalty is `l2 / (2n) * |w|^2`.
    pub l2: f64,
    /// Stop once the gradient's max-norm drops below this.
    pub tol: f64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            max_iter: 200,
            learning_rate: 0.5,
            l2: 1.0,
            tol: 1e-4,
        }
    }
}

/// Per-column standardisation (zero mean, unit population variance).
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Result<Self, ModelError> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ModelError::InvalidData("empty feature matrix".to_string()))?;
        // constant columns are left unscaled
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > f64::EPSILON { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    pub fn scale(&self) -> ArrayView1<'_, f64> {
        self.scale.view()
    }
}

/// Binary logistic regression fitted by full-batch gradient descent.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    weights: Array1<f64>,
    bias: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct FitStats {
    pub iterations: usize,
    pub final_loss: f64,
}

impl LogisticRegression {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<u8>,
        options: &TrainOptions,
    ) -> Result<(Self, FitStats), ModelError> {
        let n = x.nrows();
        if n == 0 || n != y.len() {
            return Err(ModelError::InvalidData(format!(
                "mismatched training inputs/labels: {} rows, {} labels",
                n,
                y.len()
            )));
        }
        let yf = y.mapv(f64::from);
        let inv_n = 1.0 / n as f64;
        let lr = options.learning_rate;
        let l2 = options.l2.max(0.0);

        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut iterations = 0;

        for _ in 0..options.max_iter {
            iterations += 1;
            let p = (x.dot(&weights) + bias).mapv(sigmoid);
            let diff = &p - &yf;
            let grad_w = x.t().dot(&diff) * inv_n + &weights * (l2 * inv_n);
            let grad_b = diff.sum() * inv_n;

            weights.scaled_add(-lr, &grad_w);
            bias -= lr * grad_b;

            let max_grad = grad_w
                .iter()
                .fold(grad_b.abs(), |acc, g| acc.max(g.abs()));
            if max_grad < options.tol {
                break;
            }
        }

        let model = Self { weights, bias };
        let final_loss = model.log_loss(x, &yf);
        Ok((model, FitStats { iterations, final_loss }))
    }

    pub fn decision_function(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        self.decision_function(x).mapv(sigmoid)
    }

    pub fn weights(&self) -> ArrayView1<'_, f64> {
        self.weights.view()
    }

    fn log_loss(&self, x: &Array2<f64>, y: &Array1<f64>) -> f64 {
        let p = self.predict_proba(x);
        let eps = 1e-12;
        let total: f64 = p
            .iter()
            .zip(y.iter())
            .map(|(&p, &y)| {
                let p = p.clamp(eps, 1.0 - eps);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum();
        total / y.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainReport {
    pub seed: u64,
    pub rows: usize,
    pub positives: usize,
    pub iterations: usize,
    pub final_loss: f64,
}

/// Scaler followed by classifier, fitted together on one dataset.
#[derive(Debug, Clone)]
pub struct FittedPipeline {
    scaler: StandardScaler,
    classifier: LogisticRegression,
    report: TrainReport,
}

impl FittedPipeline {
    pub fn fit(
        data: &SyntheticDataset,
        seed: u64,
        options: &TrainOptions,
    ) -> Result<Self, ModelError> {
        let rows = data.rows();
        let positives = data.positives();
        if positives == 0 || positives == rows {
            return Err(ModelError::DegenerateTraining { seed, positives, rows });
        }
        if data.features.ncols() != N_FEATURES {
            return Err(ModelError::FeatureMismatch {
                got: data.features.ncols(),
                expected: N_FEATURES,
            });
        }

        let scaler = StandardScaler::fit(&data.features)?;
        let scaled = scaler.transform(&data.features);
        let (classifier, stats) = LogisticRegression::fit(&scaled, &data.labels, options)?;

        Ok(Self {
            scaler,
            classifier,
            report: TrainReport {
                seed,
                rows,
                positives,
                iterations: stats.iterations,
                final_loss: stats.final_loss,
            },
        })
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        self.classifier.predict_proba(&self.scaler.transform(x))
    }

    pub fn report(&self) -> &TrainReport {
        &self.report
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: u8,
    pub probability: f64,
}

/// Process-wide model handle. Train and predict share one lock; a failed
/// train leaves the previous pipeline in place.
pub struct TrafficModel {
    state: Mutex<Option<FittedPipeline>>,
    options: TrainOptions,
}

impl TrafficModel {
    pub fn untrained(options: TrainOptions) -> Self {
        Self {
            state: Mutex::new(None),
            options,
        }
    }

    /// Builds and trains with `seed`.
    pub fn new(seed: u64) -> Result<Self, ModelError> {
        let model = Self::untrained(TrainOptions::default());
        model.train(seed)?;
        Ok(model)
    }

    pub fn train(&self, seed: u64) -> Result<TrainReport, ModelError> {
        let data = dataset::generate(self.options.rows, seed)?;
        self.train_on(seed, &data)
    }

    /// Fits on a caller-supplied dataset. The new pipeline replaces the old
    /// one only once the fit succeeded.
    pub fn train_on(&self, seed: u64, data: &SyntheticDataset) -> Result<TrainReport, ModelError> {
        let mut state = self.state.lock();
        let fitted = match FittedPipeline::fit(data, seed, &self.options) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("training with seed {} failed: {}", seed, e);
                return Err(e);
            }
        };
        let report = *fitted.report();
        *state = Some(fitted);
        drop(state);

        tracing::info!(
            "trained model seed={} rows={} positives={} iters={} loss={:.4}",
            report.seed,
            report.rows,
            report.positives,
            report.iterations,
            report.final_loss
        );
        Ok(report)
    }

    pub fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<Prediction>, ModelError> {
        let mut cells = Vec::with_capacity(rows.len() * N_FEATURES);
        for r in rows {
            cells.extend_from_slice(r.as_slice());
        }
        let x = Array2::from_shape_vec((rows.len(), N_FEATURES), cells)
            .map_err(|e| ModelError::InvalidData(e.to_string()))?;
        self.predict_matrix(&x)
    }

    pub fn predict_matrix(&self, x: &Array2<f64>) -> Result<Vec<Prediction>, ModelError> {
        if x.ncols() != N_FEATURES {
            return Err(ModelError::FeatureMismatch {
                got: x.ncols(),
                expected: N_FEATURES,
            });
        }
        let proba = {
            let state = self.state.lock();
            let pipeline = state.as_ref().ok_or(ModelError::NotTrained)?;
            pipeline.predict_proba(x)
        };
        Ok(proba
            .iter()
            .map(|&p| Prediction {
                label: u8::from(p >= 0.5),
                probability: p,
            })
            .collect())
    }

    pub fn report(&self) -> Option<TrainReport> {
        self.state.lock().as_ref().map(|p| *p.report())
    }

    pub fn is_trained(&self) -> bool {
        self.state.lock().is_some()
    }
}
