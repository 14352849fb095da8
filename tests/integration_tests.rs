/// Integration tests for the prediction service
///
/// Run with: cargo test --test integration_tests -- --nocapture

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    time::Duration,
};

use traffic_risk::{
    api::{self, AppState, RetrainParams},
    dataset,
    model::TrainOptions,
    rate_limit::RateLimiter,
    recommend,
    types::{FeatureVector, ListQuery, NewPrediction, PredictionInput, RiskLevel, StoredPrediction},
    PredictionStore, ServiceError, SqliteStore, StoreError, TrafficModel, TrafficService,
};

fn scenario_a() -> PredictionInput {
    PredictionInput {
        hour: 8,
        weekday: 1,
        weather: 0,
        incident: 0,
        average_speed: 60.0,
        vehicle_flow: 50.0,
        lat_a: Some(45.5017),
        lon_a: Some(-73.5673),
        lat_b: Some(45.5088),
        lon_b: Some(-73.5540),
        distance_km: None,
    }
}

fn service() -> TrafficService {
    let model = TrafficModel::untrained(TrainOptions::default());
    model.train(42).expect("initial training");
    let store = SqliteStore::open_in_memory().expect("in-memory store");
    TrafficService::new(Arc::new(model), Arc::new(store), 42)
}

fn app_state(limit: u32) -> AppState {
    AppState {
        service: service(),
        limiter: Arc::new(RateLimiter::new(limit)),
        app_name: Arc::from("test server"),
    }
}

fn peer() -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
}

#[test]
fn test_scenario_a_predict_and_persist() {
    println!("\n=== Test: Scenario A ===");
    let svc = service();
    assert!(svc.list(&ListQuery::default()).unwrap().is_empty());

    let outcome = svc.predict(&scenario_a()).unwrap();
    let rec = &outcome.record;
    println!(
        "✓ risk={} p={} dist={:.3}km recs={}",
        outcome.result.risk.as_str(),
        outcome.result.probability,
        rec.distance_km,
        outcome.result.recommendations.len()
    );

    assert!(rec.distance_km > 1.0 && rec.distance_km < 1.5);
    assert!((0.0..=1.0).contains(&outcome.result.probability));
    assert!(!outcome.result.recommendations.is_empty());
    assert!(outcome
        .result
        .recommendations
        .iter()
        .any(|r| r == recommend::RUSH_HOUR));

    let all = svc.list(&ListQuery::default()).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].hour, 8);
    assert_eq!(all[0].weekday, 1);
    assert_eq!(all[0].risk, outcome.result.risk);
    assert_eq!(svc.get(rec.id).unwrap(), *rec);
    println!("✓ exactly one record stored");
}

#[test]
fn test_scenario_b_retrain_boundary() {
    println!("\n=== Test: Scenario B ===");
    let svc = service();
    let row = [FeatureVector([8.0, 1.0, 0.0, 0.0, 60.0, 50.0, 10.0])];

    let before = svc.model().predict(&row).unwrap();
    let report = svc.retrain(Some(123)).unwrap();
    assert_eq!(report.seed, 123);
    let after = svc.model().predict(&row).unwrap();

    for p in before.iter().chain(after.iter()) {
        assert!(p.label <= 1);
        assert!((0.0..=1.0).contains(&p.probability));
    }
    println!("✓ p before={:.3} after={:.3}", before[0].probability, after[0].probability);

    // no seed falls back to the configured default
    assert_eq!(svc.retrain(None).unwrap().seed, 42);
}

#[test]
fn test_explicit_distance_and_long_trip() {
    let svc = service();
    let input = PredictionInput {
        hour: 17,
        weekday: 4,
        weather: 1,
        incident: 1,
        average_speed: 40.0,
        vehicle_flow: 80.0,
        lat_a: None,
        lon_a: None,
        lat_b: None,
        lon_b: None,
        distance_km: Some(15.5),
    };
    let outcome = svc.predict(&input).unwrap();
    assert_eq!(outcome.record.distance_km, 15.5);
    assert_eq!(outcome.result.risk, RiskLevel::High);
    assert_eq!(
        outcome.result.recommendations,
        vec![
            recommend::REDUCE_SPEED,
            recommend::ALTERNATE_ROUTE,
            recommend::AVOID_INCIDENT,
            recommend::RAIN_BRAKING,
            recommend::RUSH_HOUR,
            recommend::LONG_TRIP,
        ]
    );
    let expected_time = 15.5 / outcome.record.predicted_speed * 60.0;
    assert!((outcome.record.predicted_travel_time_minutes - expected_time).abs() < 1e-9);
    println!("✓ high-risk golden recommendations");
}

#[test]
fn test_derived_distance_is_not_a_long_trip() {
    let svc = service();
    let mut input = scenario_a();
    input.lat_b = Some(45.6066);
    input.lon_b = Some(-73.7124);
    let outcome = svc.predict(&input).unwrap();
    println!("✓ derived distance {:.2}km", outcome.record.distance_km);
    assert!(outcome.record.distance_km > 10.0);
    // only an explicit distance_km triggers the long-trip advice
    assert!(!outcome
        .result
        .recommendations
        .iter()
        .any(|r| r == recommend::LONG_TRIP));
}

#[test]
fn test_no_location_means_zero_distance() {
    let svc = service();
    let mut input = scenario_a();
    input.lat_b = None;
    let outcome = svc.predict(&input).unwrap();
    assert_eq!(outcome.record.distance_km, 0.0);
    assert_eq!(outcome.record.predicted_travel_time_minutes, 0.0);
}

#[test]
fn test_invalid_input_is_not_persisted() {
    let svc = service();
    let mut input = scenario_a();
    input.hour = 25;
    let err = svc.predict(&input).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(svc.list(&ListQuery::default()).unwrap().is_empty());
}

#[test]
fn test_untrained_model_is_reported() {
    let model = TrafficModel::untrained(TrainOptions::default());
    let store = SqliteStore::open_in_memory().unwrap();
    let svc = TrafficService::new(Arc::new(model), Arc::new(store), 42);
    let err = svc.predict(&scenario_a()).unwrap_err();
    assert!(matches!(err, ServiceError::Model(traffic_risk::ModelError::NotTrained)));
    assert!(svc.list(&ListQuery::default()).unwrap().is_empty());
}

#[test]
fn test_generator_is_deterministic() {
    let a = dataset::generate(dataset::DEFAULT_ROWS, 42).unwrap();
    let b = dataset::generate(dataset::DEFAULT_ROWS, 42).unwrap();
    assert_eq!(a.features, b.features);
    assert_eq!(a.labels, b.labels);
    println!("✓ {} rows, {} positives", a.rows(), a.positives());
}

#[test]
fn test_paging_over_predictions() {
    let svc = service();
    for hour in 0..5u8 {
        let mut input = scenario_a();
        input.hour = hour;
        svc.predict(&input).unwrap();
    }
    let all = svc.list(&ListQuery::default()).unwrap();
    assert_eq!(all.len(), 5);
    for pair in all.windows(2) {
        assert!(pair[0].created_at >= pair[1].created_at);
    }

    let page = svc.list(&ListQuery::page(2, 2)).unwrap();
    assert_eq!(page, all[2..4].to_vec());

    assert!(matches!(
        svc.list(&ListQuery::page(0, 0)),
        Err(ServiceError::Validation(_))
    ));
    assert!(matches!(
        svc.get(9999),
        Err(ServiceError::Store(StoreError::NotFound(9999)))
    ));
}

#[tokio::test]
async fn test_handlers_end_to_end() {
    println!("\n=== Test: HTTP handlers ===");
    let state = app_state(100);

    let Json(h) = api::health(State(state.clone()), peer()).await.unwrap();
    assert!(h.ok);
    assert_eq!(h.name, "test server");

    let Json(result) = api::predict(State(state.clone()), peer(), Json(scenario_a()))
        .await
        .unwrap();
    assert!((0.0..=1.0).contains(&result.probability));

    let body = serde_json::to_value(&result).unwrap();
    assert!(body["risk"] == "high" || body["risk"] == "low");
    assert!(body["recommendations"].is_array());

    let Json(listed) = api::list_predictions(State(state.clone()), peer(), Query(ListQuery::default()))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    let Json(one) = api::get_prediction(State(state.clone()), peer(), Path(listed[0].id))
        .await
        .unwrap();
    assert_eq!(one.id, listed[0].id);

    let missing = api::get_prediction(State(state.clone()), peer(), Path(9999))
        .await
        .unwrap_err();
    assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

    let Json(out) = api::retrain(
        State(state.clone()),
        peer(),
        Query(RetrainParams { seed: Some(123) }),
    )
    .await
    .unwrap();
    assert!(out.ok);
    assert_eq!(out.seed, 123);

    let Json(after) = api::predict(State(state), peer(), Json(scenario_a()))
        .await
        .unwrap();
    assert!((0.0..=1.0).contains(&after.probability));
    println!("✓ handlers ok");
}

#[tokio::test]
async fn test_handler_validation_and_rate_limit() {
    let state = app_state(2);

    let mut bad = scenario_a();
    bad.weather = 3;
    let err = api::predict(State(state.clone()), peer(), Json(bad))
        .await
        .unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

    // second request still inside the limit
    api::health(State(state.clone()), peer()).await.unwrap();
    let limited = api::health(State(state), peer()).await.unwrap_err();
    let resp = limited.into_response();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key("retry-after"));
}

#[test]
fn test_router_builds_with_prefixes() {
    let _ = api::router(app_state(10), "/api/v1");
    let _ = api::router(app_state(10), "api/v2/");
    let _ = api::router(app_state(10), "");
}

/// Holds every save until the test releases it.
struct GatedStore {
    inner: SqliteStore,
    gate: parking_lot::Mutex<mpsc::Receiver<()>>,
    released: AtomicBool,
}

impl PredictionStore for GatedStore {
    fn save(&self, record: &NewPrediction) -> Result<StoredPrediction, StoreError> {
        let opened = self.gate.lock().recv_timeout(Duration::from_secs(5)).is_ok();
        self.released.store(opened, Ordering::SeqCst);
        self.inner.save(record)
    }

    fn list(&self, query: &ListQuery) -> Result<Vec<StoredPrediction>, StoreError> {
        self.inner.list(query)
    }

    fn get(&self, id: i64) -> Result<StoredPrediction, StoreError> {
        self.inner.get(id)
    }
}

#[tokio::test(flavor = "current_thread")]
async fn test_slow_store_does_not_stall_runtime() {
    let (tx, rx) = mpsc::channel();
    let store = Arc::new(GatedStore {
        inner: SqliteStore::open_in_memory().unwrap(),
        gate: parking_lot::Mutex::new(rx),
        released: AtomicBool::new(false),
    });
    let model = TrafficModel::untrained(TrainOptions::default());
    model.train(42).unwrap();
    let state = AppState {
        service: TrafficService::new(Arc::new(model), store.clone(), 42),
        limiter: Arc::new(RateLimiter::new(100)),
        app_name: Arc::from("test server"),
    };

    let pending = tokio::spawn(api::predict(State(state.clone()), peer(), Json(scenario_a())));
    tokio::task::yield_now().await;

    // the single runtime thread must still serve other requests
    api::health(State(state), peer()).await.unwrap();
    tx.send(()).unwrap();

    let Json(out) = pending.await.unwrap().unwrap();
    assert!((0.0..=1.0).contains(&out.probability));
    assert!(store.released.load(Ordering::SeqCst));
    println!("✓ predict ran off the runtime thread");
}
