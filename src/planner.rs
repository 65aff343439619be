//! Route/vehicle/time planner.
//!
//! Validates a request at the boundary, then runs two branches in parallel:
//! paths → terrain sampling → cost ranking, and the weather window search.
//! The two results are combined into one [`OptimalSelection`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;
use crate::cost::{self, CostEvaluation, CostMatrix, Ranking, VehicleKind};
use crate::geometry::generate_paths;
use crate::haversine::{haversine_km, polyline_km};
use crate::openweather::OpenWeatherClient;
use crate::overpass::OverpassClient;
use crate::path::{CandidatePath, Coordinate, PathId};
use crate::sampler::{PathSampler, TerrainHistogram};
use crate::terrain::{CategoryTable, TerrainClassifier};
use crate::traits::{ForecastSource, LandUseLookup};
use crate::weather::{
    self, Objective, Strategy, TimeWindow, WeatherCondition, WeatherTables, WindowQuery, WindowSelection,
};

pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 12;

/// The weather search never looks further ahead than this.
pub const FORECAST_HORIZON_DAYS: i64 = 10;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Requests deeper than this are rejected; path size grows as 2^depth.
    pub max_recursion_depth: u32,
    pub forecast_horizon: Duration,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            forecast_horizon: Duration::days(FORECAST_HORIZON_DAYS),
        }
    }
}

/// One planning request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub start: Coordinate,
    pub target: Coordinate,
    pub path_count: usize,
    pub recursion_depth: u32,
    /// Drawn from the planner's random source (0.0 to 1.0 in steps of 0.1) when absent.
    pub deviation_factor: Option<f64>,
    pub vehicles: Vec<VehicleKind>,
    /// Recommend the cheapest pair for this vehicle instead of the globally cheapest path.
    pub preferred_vehicle: Option<VehicleKind>,
    pub strategy: Strategy,
    pub objective: Objective,
    /// Time needed on the objective, in hours.
    pub mission_hours: u32,
    pub earliest: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl PlanRequest {
    /// A request with the default search shape: 5 paths of depth 4 and a random deviation.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        start: Coordinate,
        target: Coordinate,
        vehicles: Vec<VehicleKind>,
        strategy: Strategy,
        objective: Objective,
        mission_hours: u32,
        earliest: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            start,
            target,
            path_count: 5,
            recursion_depth: 4,
            deviation_factor: None,
            vehicles,
            preferred_vehicle: None,
            strategy,
            objective,
            mission_hours,
            earliest,
            deadline,
        }
    }

    pub fn validate(&self, options: &PlanOptions) -> Result<(), PlanError> {
        for coordinate in [self.start, self.target] {
            if !coordinate.is_valid() {
                return Err(PlanError::InvalidCoordinate(coordinate));
            }
        }
        if self.path_count == 0 {
            return Err(PlanError::NoPaths);
        }
        if self.recursion_depth > options.max_recursion_depth {
            return Err(PlanError::DepthTooLarge {
                depth: self.recursion_depth,
                max: options.max_recursion_depth,
            });
        }
        if let Some(deviation) = self.deviation_factor {
            if !deviation.is_finite() || deviation < 0.0 {
                return Err(PlanError::InvalidDeviation(deviation));
            }
        }
        if self.vehicles.is_empty() {
            return Err(PlanError::NoVehicles);
        }
        if let Some(preferred) = self.preferred_vehicle {
            if !self.vehicles.contains(&preferred) {
                return Err(PlanError::PreferredVehicleNotOffered(preferred));
            }
        }
        if self.deadline < self.earliest {
            return Err(PlanError::EmptyTimeRange);
        }
        let max_hours = options.forecast_horizon.num_hours();
        if i64::from(self.mission_hours) > max_hours {
            return Err(PlanError::MissionTooLong {
                hours: self.mission_hours,
                max_hours,
            });
        }
        Ok(())
    }

    fn window_query(&self, options: &PlanOptions) -> WindowQuery {
        WindowQuery {
            duration: Duration::hours(i64::from(self.mission_hours)),
            vehicles: self.vehicles.clone(),
            strategy: self.strategy,
            objective: self.objective,
            earliest: self.earliest,
            latest: self.deadline.min(self.earliest + options.forecast_horizon),
        }
    }
}

/// Contract violations detected before any stage runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    InvalidCoordinate(Coordinate),
    NoPaths,
    DepthTooLarge { depth: u32, max: u32 },
    InvalidDeviation(f64),
    NoVehicles,
    PreferredVehicleNotOffered(VehicleKind),
    EmptyTimeRange,
    MissionTooLong { hours: u32, max_hours: i64 },
    Cancelled,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::InvalidCoordinate(c) => write!(f, "invalid coordinate ({}, {})", c.lat, c.lon),
            PlanError::NoPaths => f.write_str("path count must be positive"),
            PlanError::DepthTooLarge { depth, max } => {
                write!(f, "recursion depth {} exceeds maximum {}", depth, max)
            }
            PlanError::InvalidDeviation(d) => write!(f, "deviation factor {} must be finite and non-negative", d),
            PlanError::NoVehicles => f.write_str("at least one vehicle is required"),
            PlanError::PreferredVehicleNotOffered(v) => {
                write!(f, "preferred vehicle {} is not among the candidates", v)
            }
            PlanError::EmptyTimeRange => f.write_str("deadline is before the earliest start"),
            PlanError::MissionTooLong { hours, max_hours } => {
                write!(f, "mission of {}h exceeds the {}h forecast horizon", hours, max_hours)
            }
            PlanError::Cancelled => f.write_str("planning was cancelled"),
        }
    }
}

impl std::error::Error for PlanError {}

/// Failure to build the HTTP-backed planner.
#[derive(Debug)]
pub enum PlannerBuildError {
    Http(reqwest::Error),
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl fmt::Display for PlannerBuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannerBuildError::Http(err) => write!(f, "cannot build HTTP client: {}", err),
            PlannerBuildError::ThreadPool(err) => write!(f, "cannot build sampler pool: {}", err),
        }
    }
}

impl std::error::Error for PlannerBuildError {}

impl From<reqwest::Error> for PlannerBuildError {
    fn from(err: reqwest::Error) -> Self {
        PlannerBuildError::Http(err)
    }
}

impl From<rayon::ThreadPoolBuildError> for PlannerBuildError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        PlannerBuildError::ThreadPool(err)
    }
}

/// A generated path with its sampled terrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedPath {
    pub id: PathId,
    pub path: CandidatePath,
    pub length_km: f64,
    pub terrain: TerrainHistogram,
}

/// The final recommendation: best route and best time to move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimalSelection {
    pub path: Option<PathId>,
    /// The recommended (path, vehicle) evaluation; `None` when every pair is infeasible.
    pub route: Option<CostEvaluation>,
    pub time_window: Option<TimeWindow>,
    pub window_vehicle: Option<VehicleKind>,
    /// Distinct conditions seen in the chosen window.
    pub weather: Vec<WeatherCondition>,
    /// `None` when no suitable window was found (unbounded cost).
    pub window_cost: Option<f64>,
    pub window_found: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub deviation_factor: f64,
    pub straight_distance_km: f64,
    pub paths: Vec<PlannedPath>,
    pub ranking: Ranking,
    pub top_five: Vec<CostEvaluation>,
    /// Lowest total feasible cost across vehicles, independent of any preferred vehicle.
    pub globally_cheapest: Option<PathId>,
    pub weather: WindowSelection,
    pub selection: OptimalSelection,
}

/// Combine the route ranking and the weather search into one selection.
///
/// Without a preferred vehicle the route is the cheapest pair on the globally
/// cheapest path; with one, it is the cheapest feasible pair for that vehicle.
pub fn aggregate(ranking: &Ranking, weather: &WindowSelection, preferred: Option<VehicleKind>) -> OptimalSelection {
    let route = match preferred {
        Some(vehicle) => ranking.cheapest_for(vehicle).cloned(),
        None => ranking.globally_cheapest().and_then(|path| {
            ranking
                .evaluations()
                .iter()
                .find(|e| e.path == path && e.cost.is_feasible())
                .cloned()
        }),
    };

    let mut conditions: Vec<WeatherCondition> = weather
        .window()
        .map(|window| window.conditions.clone())
        .unwrap_or_default();
    conditions.sort();
    conditions.dedup();

    OptimalSelection {
        path: route.as_ref().map(|r| r.path),
        route,
        time_window: weather.window().cloned(),
        window_vehicle: weather.vehicle(),
        weather: conditions,
        window_cost: weather.cost(),
        window_found: weather.is_found(),
    }
}

/// Reference tables handed to the planner by the application.
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    pub categories: CategoryTable,
    pub cost_matrix: CostMatrix,
    pub weather: WeatherTables,
}

impl ReferenceTables {
    /// Standard category and weather tables around an application cost matrix.
    pub fn with_cost_matrix(cost_matrix: CostMatrix) -> Self {
        Self {
            categories: CategoryTable::standard(),
            cost_matrix,
            weather: WeatherTables::standard(),
        }
    }
}

pub struct Planner<L, F> {
    classifier: TerrainClassifier<L>,
    sampler: PathSampler,
    forecast: F,
    cost_matrix: CostMatrix,
    weather_tables: WeatherTables,
    options: PlanOptions,
}

impl Planner<OverpassClient, OpenWeatherClient> {
    /// A planner backed by Overpass and OpenWeatherMap.
    pub fn from_config(config: &PlannerConfig, tables: ReferenceTables) -> Result<Self, PlannerBuildError> {
        let lookup = OverpassClient::new(config.overpass.clone())?;
        let forecast = OpenWeatherClient::new(config.openweather.clone())?;
        let classifier = TerrainClassifier::new(lookup, tables.categories).with_radius(config.lookup_radius_m);
        let sampler = PathSampler::new(config.sampler_options())?;

        Ok(Planner::new(
            classifier,
            sampler,
            forecast,
            tables.cost_matrix,
            tables.weather,
            config.plan_options(),
        ))
    }
}

impl<L, F> Planner<L, F>
where
    L: LandUseLookup,
    F: ForecastSource,
{
    pub fn new(
        classifier: TerrainClassifier<L>,
        sampler: PathSampler,
        forecast: F,
        cost_matrix: CostMatrix,
        weather_tables: WeatherTables,
        options: PlanOptions,
    ) -> Self {
        Self {
            classifier,
            sampler,
            forecast,
            cost_matrix,
            weather_tables,
            options,
        }
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    pub fn plan<R: Rng + ?Sized>(&self, request: &PlanRequest, rng: &mut R) -> Result<PlanOutcome, PlanError> {
        let never = AtomicBool::new(false);
        self.plan_cancellable(request, rng, &never)
    }

    /// Like [`plan`](Self::plan); setting `cancel` abandons terrain sampling
    /// and yields [`PlanError::Cancelled`].
    pub fn plan_cancellable<R: Rng + ?Sized>(
        &self,
        request: &PlanRequest,
        rng: &mut R,
        cancel: &AtomicBool,
    ) -> Result<PlanOutcome, PlanError> {
        request.validate(&self.options)?;

        let deviation_factor = request
            .deviation_factor
            .unwrap_or_else(|| (rng.gen_range(0.0..=1.0_f64) * 10.0).round() / 10.0);
        let paths = generate_paths(
            request.start,
            request.target,
            request.path_count,
            request.recursion_depth,
            deviation_factor,
            rng,
        );
        tracing::info!(
            paths = paths.len(),
            depth = request.recursion_depth,
            deviation = deviation_factor,
            "generated candidate paths"
        );

        let query = request.window_query(&self.options);
        let (histograms, weather) = rayon::join(
            || self.sampler.sample_cancellable(&self.classifier, &paths, cancel),
            || weather::find_best_window(&self.forecast, request.target, &query, &self.weather_tables),
        );

        let histograms = match histograms {
            Some(histograms) if !cancel.load(Ordering::Relaxed) => histograms,
            _ => return Err(PlanError::Cancelled),
        };

        let ranking = cost::rank(&histograms, &self.cost_matrix, &request.vehicles);
        let selection = aggregate(&ranking, &weather, request.preferred_vehicle);

        match &selection.route {
            Some(route) => tracing::info!(
                path = %route.path,
                vehicle = %route.vehicle,
                cost = ?route.cost,
                window_found = selection.window_found,
                "plan selected"
            ),
            None => tracing::info!(window_found = selection.window_found, "no feasible route"),
        }

        let paths = paths
            .into_iter()
            .zip(histograms)
            .map(|(path, (id, terrain))| PlannedPath {
                id,
                length_km: polyline_km(path.points()),
                path,
                terrain,
            })
            .collect();

        Ok(PlanOutcome {
            deviation_factor,
            straight_distance_km: haversine_km(request.start, request.target),
            paths,
            top_five: ranking.top_five().to_vec(),
            globally_cheapest: ranking.globally_cheapest(),
            ranking,
            weather,
            selection,
        })
    }
}
