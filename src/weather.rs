//! Weather-aware search for the cheapest execution window.
//!
//! A forecast is a series of 3-hourly samples. A candidate window starts at a
//! forecast sample and needs every 3-hour bucket up to and including
//! `start + duration` to be present; gapped windows are skipped, never
//! partially scored.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::VehicleKind;
use crate::path::Coordinate;
use crate::traits::ForecastSource;

/// Forecast cadence.
pub const BUCKET_HOURS: i64 = 3;

/// Weather conditions the cost tables understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherCondition {
    Rain,
    Clouds,
    Clear,
    Fog,
}

impl WeatherCondition {
    pub const ALL: [WeatherCondition; 4] = [
        WeatherCondition::Rain,
        WeatherCondition::Clouds,
        WeatherCondition::Clear,
        WeatherCondition::Fog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherCondition::Rain => "rain",
            WeatherCondition::Clouds => "clouds",
            WeatherCondition::Clear => "clear",
            WeatherCondition::Fog => "fog",
        }
    }
}

impl fmt::Display for WeatherCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WeatherCondition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rain" => Ok(WeatherCondition::Rain),
            "clouds" => Ok(WeatherCondition::Clouds),
            "clear" => Ok(WeatherCondition::Clear),
            "fog" => Ok(WeatherCondition::Fog),
            _ => Err(format!("Unrecognized weather condition: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Aggressive,
    Stealth,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Ok(Strategy::Aggressive),
            "stealth" => Ok(Strategy::Stealth),
            _ => Err(format!("Unknown strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Hold position.
    Defensive,
    CaptureExtractHvt,
    InfiltrateTarget,
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "def" | "defensive" => Ok(Objective::Defensive),
            "hvt" | "capture/extract hvt" | "capture_extract_hvt" => Ok(Objective::CaptureExtractHvt),
            "inf" | "infiltrate target" | "infiltrate_target" => Ok(Objective::InfiltrateTarget),
            _ => Err(format!("Unknown objective: {}", s)),
        }
    }
}

/// One forecast bucket as delivered by the source. `tag` is the raw condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSample {
    pub timestamp: DateTime<Utc>,
    pub tag: String,
}

impl ForecastSample {
    pub fn new(timestamp: DateTime<Utc>, tag: impl Into<String>) -> Self {
        Self {
            timestamp,
            tag: tag.into(),
        }
    }

    pub fn condition(&self) -> Option<WeatherCondition> {
        self.tag.parse().ok()
    }
}

/// A contiguous run of forecast buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// One condition per bucket, in time order.
    pub conditions: Vec<WeatherCondition>,
}

impl TimeWindow {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCostEvaluation {
    pub window: TimeWindow,
    pub vehicle: VehicleKind,
    pub cost: f64,
}

/// Outcome of a window search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowSelection {
    Found(WeatherCostEvaluation),
    /// No valid window in range; the first forecast sample is offered as a
    /// best-effort window with unbounded cost. Its conditions are whichever
    /// buckets the forecast holds between its start and end.
    Fallback { window: TimeWindow },
    /// The forecast was unavailable or carried no recognised condition.
    NoData,
}

impl WindowSelection {
    pub fn is_found(&self) -> bool {
        matches!(self, WindowSelection::Found(_))
    }

    pub fn window(&self) -> Option<&TimeWindow> {
        match self {
            WindowSelection::Found(evaluation) => Some(&evaluation.window),
            WindowSelection::Fallback { window } => Some(window),
            WindowSelection::NoData => None,
        }
    }

    pub fn vehicle(&self) -> Option<VehicleKind> {
        match self {
            WindowSelection::Found(evaluation) => Some(evaluation.vehicle),
            _ => None,
        }
    }

    /// `None` means unbounded: no suitable window was found.
    pub fn cost(&self) -> Option<f64> {
        match self {
            WindowSelection::Found(evaluation) => Some(evaluation.cost),
            _ => None,
        }
    }
}

/// Reference tables for weather costing.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherTables {
    unit_costs: HashMap<(VehicleKind, WeatherCondition), f64>,
    modifiers: HashMap<(Strategy, Objective), f64>,
    adjustments: HashMap<(Strategy, WeatherCondition), f64>,
}

impl Default for WeatherTables {
    fn default() -> Self {
        Self::standard()
    }
}

impl WeatherTables {
    pub fn empty() -> Self {
        Self {
            unit_costs: HashMap::new(),
            modifiers: HashMap::new(),
            adjustments: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        use Objective::*;
        use Strategy::*;
        use WeatherCondition::*;

        let mut tables = Self::empty();
        let rows: [(VehicleKind, [f64; 4]); 4] = [
            (VehicleKind::Car, [7.0, 6.0, 5.0, 9.0]),
            (VehicleKind::Boat, [8.0, 7.0, 6.0, 12.0]),
            (VehicleKind::Helicopter, [14.0, 8.0, 4.0, 11.0]),
            (VehicleKind::Foot, [9.0, 7.0, 5.0, 14.0]),
        ];
        for (vehicle, costs) in rows {
            for (condition, cost) in WeatherCondition::ALL.into_iter().zip(costs) {
                tables.unit_costs.insert((vehicle, condition), cost);
            }
        }

        tables.modifiers.extend([
            ((Aggressive, Defensive), 2.0),
            ((Aggressive, CaptureExtractHvt), 5.0),
            ((Aggressive, InfiltrateTarget), 6.0),
            ((Stealth, Defensive), 6.0),
            ((Stealth, CaptureExtractHvt), 4.0),
            ((Stealth, InfiltrateTarget), 2.0),
        ]);

        tables.adjustments.extend([
            ((Stealth, Rain), 0.85),
            ((Stealth, Clouds), 0.90),
            ((Stealth, Clear), 1.2),
            ((Aggressive, Rain), 1.15),
            ((Aggressive, Clouds), 1.1),
        ]);

        tables
    }

    pub fn with_unit_cost(mut self, vehicle: VehicleKind, condition: WeatherCondition, cost: f64) -> Self {
        self.unit_costs.insert((vehicle, condition), cost);
        self
    }

    pub fn with_modifier(mut self, strategy: Strategy, objective: Objective, modifier: f64) -> Self {
        self.modifiers.insert((strategy, objective), modifier);
        self
    }

    pub fn with_adjustment(mut self, strategy: Strategy, condition: WeatherCondition, factor: f64) -> Self {
        self.adjustments.insert((strategy, condition), factor);
        self
    }

    pub fn unit_cost(&self, vehicle: VehicleKind, condition: WeatherCondition) -> Option<f64> {
        self.unit_costs.get(&(vehicle, condition)).copied()
    }

    /// Missing modifiers contribute nothing.
    pub fn modifier(&self, strategy: Strategy, objective: Objective) -> f64 {
        self.modifiers.get(&(strategy, objective)).copied().unwrap_or(0.0)
    }

    /// Product of the strategy's factors for every distinct condition present.
    pub fn adjustment(&self, strategy: Strategy, conditions: &[WeatherCondition]) -> f64 {
        WeatherCondition::ALL
            .into_iter()
            .filter(|condition| conditions.contains(condition))
            .filter_map(|condition| self.adjustments.get(&(strategy, condition)))
            .product()
    }

    /// Weather cost of running `vehicle` through `conditions`.
    ///
    /// `None` when the list is empty or any bucket has no unit cost for the
    /// vehicle.
    pub fn window_cost(
        &self,
        vehicle: VehicleKind,
        conditions: &[WeatherCondition],
        strategy: Strategy,
        objective: Objective,
    ) -> Option<f64> {
        if conditions.is_empty() {
            return None;
        }
        let mut sum = 0.0;
        for condition in conditions {
            sum += self.unit_cost(vehicle, *condition)?;
        }
        let average = sum / conditions.len() as f64;
        Some(average * self.adjustment(strategy, conditions) + self.modifier(strategy, objective))
    }
}

/// Parameters of a window search.
#[derive(Debug, Clone)]
pub struct WindowQuery {
    pub duration: Duration,
    pub vehicles: Vec<VehicleKind>,
    pub strategy: Strategy,
    pub objective: Objective,
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl WindowQuery {
    /// Number of buckets a window spans, both ends included.
    pub fn bucket_count(&self) -> usize {
        let bucket_secs = BUCKET_HOURS * 3600;
        let secs = self.duration.num_seconds().max(0);
        ((secs + bucket_secs - 1) / bucket_secs) as usize + 1
    }
}

/// Find the cheapest (window, vehicle) pair in the forecast.
///
/// Unrecognised tags are dropped before windowing. A window must start no
/// earlier than `earliest` and end no later than `latest`. Ties keep the first
/// pair found, scanning vehicles in query order and windows in time order.
pub fn search(forecast: &[ForecastSample], query: &WindowQuery, tables: &WeatherTables) -> WindowSelection {
    let recognised: Vec<(DateTime<Utc>, WeatherCondition)> = forecast
        .iter()
        .filter_map(|sample| sample.condition().map(|condition| (sample.timestamp, condition)))
        .collect();

    let Some(&(first_time, _)) = recognised.first() else {
        tracing::info!("no recognised weather in forecast");
        return WindowSelection::NoData;
    };

    let mut by_time: BTreeMap<DateTime<Utc>, WeatherCondition> = BTreeMap::new();
    for (timestamp, condition) in &recognised {
        by_time.entry(*timestamp).or_insert(*condition);
    }

    let windows: Vec<TimeWindow> = if query.earliest <= query.latest {
        by_time
            .range(query.earliest..=query.latest)
            .filter(|(start, _)| **start + query.duration <= query.latest)
            .filter_map(|(start, _)| contiguous_window(&by_time, *start, query))
            .collect()
    } else {
        Vec::new()
    };

    let mut best: Option<WeatherCostEvaluation> = None;
    for vehicle in &query.vehicles {
        for window in &windows {
            let Some(cost) = tables.window_cost(*vehicle, &window.conditions, query.strategy, query.objective)
            else {
                continue;
            };
            if best.as_ref().is_none_or(|b| cost < b.cost) {
                best = Some(WeatherCostEvaluation {
                    window: window.clone(),
                    vehicle: *vehicle,
                    cost,
                });
            }
        }
    }

    match best {
        Some(evaluation) => {
            tracing::debug!(
                start = %evaluation.window.start,
                vehicle = %evaluation.vehicle,
                cost = evaluation.cost,
                candidates = windows.len(),
                "selected weather window"
            );
            WindowSelection::Found(evaluation)
        }
        None => {
            tracing::info!(candidates = windows.len(), "no suitable weather window, using fallback");
            let end = first_time + query.duration;
            WindowSelection::Fallback {
                window: TimeWindow {
                    start: first_time,
                    end,
                    conditions: by_time.range(first_time..=end).map(|(_, condition)| *condition).collect(),
                },
            }
        }
    }
}

/// Fetch the forecast at `at` and search it. A failed fetch is `NoData`.
pub fn find_best_window<F: ForecastSource>(
    source: &F,
    at: Coordinate,
    query: &WindowQuery,
    tables: &WeatherTables,
) -> WindowSelection {
    match source.forecast(at) {
        Ok(forecast) => search(&forecast, query, tables),
        Err(err) => {
            tracing::warn!(lat = at.lat, lon = at.lon, error = %err, "forecast fetch failed");
            WindowSelection::NoData
        }
    }
}

fn contiguous_window(
    by_time: &BTreeMap<DateTime<Utc>, WeatherCondition>,
    start: DateTime<Utc>,
    query: &WindowQuery,
) -> Option<TimeWindow> {
    let step = Duration::hours(BUCKET_HOURS);
    let mut conditions = Vec::with_capacity(query.bucket_count());
    let mut current = start;
    for _ in 0..query.bucket_count() {
        conditions.push(*by_time.get(&current)?);
        current += step;
    }
    Some(TimeWindow {
        start,
        end: start + query.duration,
        conditions,
    })
}
