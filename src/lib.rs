//! Traffic risk prediction service: a seeded logistic model over
//! time/weather/flow features, advisory rules, and a SQLite prediction log.

pub mod api;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geo;
pub mod model;
pub mod rate_limit;
pub mod recommend;
pub mod service;
pub mod store;
pub mod types;

pub use error::{ModelError, ServiceError, StoreError};
pub use model::TrafficModel;
pub use service::TrafficService;
pub use store::{PredictionStore, SqliteStore};
