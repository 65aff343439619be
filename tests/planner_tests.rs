//! Planner and sampler behaviour under concurrency, partial failure and bad input.

mod fixtures;

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::Duration;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use mission_planner::cost::{Cost, CostMatrix, VehicleKind};
use mission_planner::geometry::generate_paths;
use mission_planner::path::{CandidatePath, Coordinate, PathId};
use mission_planner::planner::{PlanError, PlanOptions, PlanRequest, Planner};
use mission_planner::sampler::{PathSampler, SamplerOptions, SamplingStrategy};
use mission_planner::terrain::{CategoryTable, TerrainClassifier};
use mission_planner::traits::{ForecastSource, LandUseLookup};
use mission_planner::weather::{Objective, Strategy, WeatherTables, WindowSelection};

use fixtures::*;

// ============================================================================
// Helpers
// ============================================================================

fn sampler(workers: usize) -> PathSampler {
    PathSampler::new(SamplerOptions {
        workers,
        strategy: SamplingStrategy::VerticesAndMidpoints,
    })
    .unwrap()
}

fn grid_paths() -> Vec<CandidatePath> {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    generate_paths(Coordinate::new(48.0, 2.0), Coordinate::new(48.3, 2.6), 6, 4, 0.2, &mut rng)
}

fn matrix() -> CostMatrix {
    let mut matrix = CostMatrix::new()
        .with("forest", VehicleKind::Foot, 8.0)
        .unwrap()
        .with("forest", VehicleKind::Helicopter, 2.0)
        .unwrap()
        .with("water", VehicleKind::Helicopter, 1.0)
        .unwrap()
        .with("water", VehicleKind::Boat, 1.0)
        .unwrap()
        .with("urban", VehicleKind::Car, 3.0)
        .unwrap();
    matrix.set_infeasible("water", VehicleKind::Foot);
    matrix
}

fn request(vehicles: Vec<VehicleKind>) -> PlanRequest {
    let mut request = PlanRequest::new(
        Coordinate::new(0.0, 0.0),
        Coordinate::new(0.0, 1.0),
        vehicles,
        Strategy::Aggressive,
        Objective::Defensive,
        3,
        base_time(),
        base_time() + Duration::days(3),
    );
    request.path_count = 3;
    request.recursion_depth = 2;
    request.deviation_factor = Some(0.05);
    request
}

fn planner<L: LandUseLookup, F: ForecastSource>(lookup: L, forecast: F) -> Planner<L, F> {
    Planner::new(
        TerrainClassifier::new(lookup, CategoryTable::standard()),
        sampler(4),
        forecast,
        matrix(),
        WeatherTables::standard(),
        PlanOptions::default(),
    )
}

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(5)
}

// ============================================================================
// Sampler concurrency
// ============================================================================

#[test]
fn worker_count_does_not_change_histograms() {
    let paths = grid_paths();
    let classifier = TerrainClassifier::new(GridLookup, CategoryTable::standard());

    let serial = sampler(1).sample(&classifier, &paths);
    let parallel = sampler(10).sample(&classifier, &paths);

    assert_eq!(serial, parallel);
    assert_eq!(serial.len(), 6);
    assert!(serial.values().any(|h| !h.is_empty()));
}

#[test]
fn in_flight_lookups_never_exceed_workers() {
    let paths = grid_paths();
    let lookup = CountingLookup::new(GridLookup, 5);
    let classifier = TerrainClassifier::new(&lookup, CategoryTable::standard());

    sampler(3).sample(&classifier, &paths);

    // 6 paths × (17 vertices + 16 midpoints)
    assert_eq!(lookup.calls(), 6 * 33);
    assert!(lookup.peak() <= 3, "peak in-flight {} exceeds 3 workers", lookup.peak());
    assert!(lookup.peak() >= 1);
}

#[test]
fn histograms_never_contain_unknown() {
    let paths = grid_paths();
    let classifier = TerrainClassifier::new(GridLookup, CategoryTable::standard());
    for histogram in sampler(4).sample(&classifier, &paths).values() {
        assert_eq!(histogram.count_of("unknown"), 0);
        assert!(histogram.iter().all(|(category, _)| !category.is_unknown()));
    }
}

#[test]
fn every_lookup_failing_yields_empty_histograms() {
    let paths = grid_paths();
    let classifier = TerrainClassifier::new(FailingLookup, CategoryTable::standard());
    let histograms = sampler(4).sample(&classifier, &paths);
    assert_eq!(histograms.len(), paths.len());
    assert!(histograms.values().all(|h| h.is_empty()));
}

#[test]
fn cancelling_stops_dispatch_and_discards_results() {
    let mut rng = rng();
    let paths = generate_paths(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0), 4, 5, 0.1, &mut rng);
    let lookup = CountingLookup::new(ConstantLookup(vec!["forest"]), 10);
    let classifier = TerrainClassifier::new(&lookup, CategoryTable::standard());
    let cancel = AtomicBool::new(false);
    let sampler = sampler(1);

    let result = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(StdDuration::from_millis(50));
            cancel.store(true, Ordering::SeqCst);
        });
        sampler.sample_cancellable(&classifier, &paths, &cancel)
    });

    assert!(result.is_none());
    // 4 paths × 65 samples at 10ms each would take well over the 50ms cancel delay
    assert!(lookup.calls() < 4 * 65);
}

// ============================================================================
// Planner
// ============================================================================

#[test]
fn invalid_requests_are_rejected_before_any_lookup() {
    let lookup = CountingLookup::new(ConstantLookup(vec!["forest"]), 0);
    let planner = planner(&lookup, StubForecast(forecast_every_3h(&["clear", "clear"])));

    let mut bad = request(vec![VehicleKind::Foot]);
    bad.path_count = 0;
    assert_eq!(planner.plan(&bad, &mut rng()).unwrap_err(), PlanError::NoPaths);

    let bad = request(vec![]);
    assert_eq!(planner.plan(&bad, &mut rng()).unwrap_err(), PlanError::NoVehicles);

    let mut bad = request(vec![VehicleKind::Foot]);
    bad.target = Coordinate::new(0.0, 200.0);
    assert!(matches!(planner.plan(&bad, &mut rng()), Err(PlanError::InvalidCoordinate(_))));

    let mut bad = request(vec![VehicleKind::Foot]);
    bad.recursion_depth = PlanOptions::default().max_recursion_depth + 1;
    assert!(matches!(planner.plan(&bad, &mut rng()), Err(PlanError::DepthTooLarge { .. })));

    let mut bad = request(vec![VehicleKind::Foot]);
    bad.mission_hours = u32::MAX;
    assert!(matches!(planner.plan(&bad, &mut rng()), Err(PlanError::MissionTooLong { .. })));

    assert_eq!(lookup.calls(), 0);
}

#[test]
fn lookup_failures_degrade_to_empty_terrain() {
    let planner = planner(FailingLookup, StubForecast(forecast_every_3h(&["clear", "clear"])));
    let outcome = planner.plan(&request(vec![VehicleKind::Foot]), &mut rng()).unwrap();

    assert!(outcome.paths.iter().all(|p| p.terrain.is_empty()));
    // No terrain means nothing to pay for.
    assert!(outcome.ranking.evaluations().iter().all(|e| e.cost == Cost::Feasible(0.0)));
    assert_eq!(outcome.selection.path, Some(PathId(0)));
}

#[test]
fn infeasible_terrain_gives_no_route() {
    let planner = planner(ConstantLookup(vec!["water"]), StubForecast(forecast_every_3h(&["clear", "clear"])));
    let outcome = planner.plan(&request(vec![VehicleKind::Foot, VehicleKind::Car]), &mut rng()).unwrap();

    assert!(outcome.ranking.evaluations().iter().all(|e| e.cost == Cost::Infeasible));
    assert!(outcome.selection.route.is_none());
    assert!(outcome.selection.path.is_none());
    assert!(outcome.globally_cheapest.is_none());
    // Weather branch is independent of terrain feasibility.
    assert!(outcome.selection.window_found);
}

#[test]
fn preferred_vehicle_overrides_default_selection() {
    let planner = planner(ConstantLookup(vec!["forest"]), StubForecast(forecast_every_3h(&["clear", "clear"])));
    let mut req = request(vec![VehicleKind::Helicopter, VehicleKind::Foot]);

    let outcome = planner.plan(&req, &mut rng()).unwrap();
    let route = outcome.selection.route.unwrap();
    assert_eq!(route.vehicle, VehicleKind::Helicopter);

    req.preferred_vehicle = Some(VehicleKind::Foot);
    let outcome = planner.plan(&req, &mut rng()).unwrap();
    let route = outcome.selection.route.unwrap();
    assert_eq!(route.vehicle, VehicleKind::Foot);
    // 5 vertices + 4 midpoints of forest at 8 each
    assert_eq!(route.cost, Cost::Feasible(72.0));
    // reported alongside the preferred route, not replaced by it
    assert_eq!(outcome.globally_cheapest, outcome.ranking.globally_cheapest());
    assert_eq!(outcome.globally_cheapest, Some(PathId(0)));
}

#[test]
fn forecast_failure_is_reported_as_no_data() {
    let planner = planner(ConstantLookup(vec!["forest"]), FailingForecast);
    let outcome = planner.plan(&request(vec![VehicleKind::Foot]), &mut rng()).unwrap();

    assert_eq!(outcome.weather, WindowSelection::NoData);
    assert!(!outcome.selection.window_found);
    assert!(outcome.selection.time_window.is_none());
    assert!(outcome.selection.route.is_some());
}

#[test]
fn gapped_forecast_falls_back_to_first_sample() {
    let mut samples = forecast_every_3h(&["fog", "clear", "clear", "clear"]);
    samples.remove(2); // hours 0, 3, 9
    let planner = planner(ConstantLookup(vec!["forest"]), StubForecast(samples));
    let mut req = request(vec![VehicleKind::Foot]);
    req.mission_hours = 6;

    let outcome = planner.plan(&req, &mut rng()).unwrap();
    match &outcome.weather {
        WindowSelection::Fallback { window } => assert_eq!(window.start, base_time()),
        other => panic!("expected fallback, got {:?}", other),
    }
    assert_eq!(outcome.selection.window_cost, None);
    assert!(!outcome.selection.window_found);
}

#[test]
fn cancelled_plan_returns_error() {
    let planner = planner(ConstantLookup(vec!["forest"]), StubForecast(forecast_every_3h(&["clear"])));
    let cancel = AtomicBool::new(true);
    let result = planner.plan_cancellable(&request(vec![VehicleKind::Foot]), &mut rng(), &cancel);
    assert_eq!(result.unwrap_err(), PlanError::Cancelled);
}

#[test]
fn random_deviation_is_drawn_when_absent() {
    let planner = planner(ConstantLookup(vec!["forest"]), StubForecast(forecast_every_3h(&["clear"])));
    let mut req = request(vec![VehicleKind::Foot]);
    req.deviation_factor = None;

    let outcome = planner.plan(&req, &mut rng()).unwrap();
    assert!((0.0..=1.0).contains(&outcome.deviation_factor));
    assert_eq!((outcome.deviation_factor * 10.0).round() / 10.0, outcome.deviation_factor);
    for planned in &outcome.paths {
        assert_eq!(planned.path.start(), req.start);
        assert_eq!(planned.path.end(), req.target);
    }
}

#[test]
fn outcome_serializes_to_json() {
    let planner = planner(ConstantLookup(vec!["forest", "water"]), StubForecast(forecast_every_3h(&["rain", "rain"])));
    let outcome = planner.plan(&request(vec![VehicleKind::Helicopter]), &mut rng()).unwrap();
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["paths"][0]["terrain"]["forest"], 9);
    assert_eq!(json["weather"]["status"], "found");
    assert_eq!(json["selection"]["route"]["vehicle"], "helicopter");
}
