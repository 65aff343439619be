//! Terrain × vehicle cost model and ranking of (path, vehicle) pairs.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::path::PathId;
use crate::sampler::{PathHistograms, TerrainHistogram};
use crate::terrain::{TableError, TerrainCategory};

/// Size of the short list returned by [`Ranking::top_five`].
pub const TOP_K: usize = 5;

/// The closed set of vehicles the planner can cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleKind {
    Helicopter,
    Boat,
    #[serde(alias = "land vehicle", alias = "land_vehicle")]
    Car,
    Foot,
}

impl VehicleKind {
    pub const ALL: [VehicleKind; 4] = [
        VehicleKind::Helicopter,
        VehicleKind::Boat,
        VehicleKind::Car,
        VehicleKind::Foot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleKind::Helicopter => "helicopter",
            VehicleKind::Boat => "boat",
            VehicleKind::Car => "car",
            VehicleKind::Foot => "foot",
        }
    }
}

impl fmt::Display for VehicleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "helicopter" => Ok(VehicleKind::Helicopter),
            "boat" => Ok(VehicleKind::Boat),
            "car" | "land vehicle" | "land_vehicle" => Ok(VehicleKind::Car),
            "foot" => Ok(VehicleKind::Foot),
            _ => Err(format!("Unknown vehicle: {}", s)),
        }
    }
}

/// A single cell of the cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitCost {
    Feasible(f64),
    Infeasible,
}

impl UnitCost {
    /// Finite non-negative values are feasible; infinity and NaN are infeasible.
    /// Returns `None` for negative costs.
    pub fn from_f64(value: f64) -> Option<Self> {
        if value.is_nan() || value == f64::INFINITY {
            Some(UnitCost::Infeasible)
        } else if value < 0.0 {
            None
        } else {
            Some(UnitCost::Feasible(value))
        }
    }
}

/// Unit traversal costs keyed by terrain category and vehicle.
///
/// [`unit_cost`](Self::unit_cost) is total: a missing entry reads as
/// [`UnitCost::Infeasible`], same as an explicit marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostMatrix {
    cells: HashMap<(TerrainCategory, VehicleKind), UnitCost>,
}

impl CostMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        terrain: impl Into<TerrainCategory>,
        vehicle: VehicleKind,
        cost: f64,
    ) -> Result<(), TableError> {
        let terrain = terrain.into();
        let unit = UnitCost::from_f64(cost).ok_or_else(|| TableError::NegativeCost {
            terrain: terrain.to_string(),
            vehicle: vehicle.to_string(),
            cost,
        })?;
        self.cells.insert((terrain, vehicle), unit);
        Ok(())
    }

    pub fn set_infeasible(&mut self, terrain: impl Into<TerrainCategory>, vehicle: VehicleKind) {
        self.cells.insert((terrain.into(), vehicle), UnitCost::Infeasible);
    }

    pub fn with(mut self, terrain: &str, vehicle: VehicleKind, cost: f64) -> Result<Self, TableError> {
        self.set(terrain, vehicle, cost)?;
        Ok(self)
    }

    pub fn unit_cost(&self, terrain: &TerrainCategory, vehicle: VehicleKind) -> UnitCost {
        self.cells
            .get(&(terrain.clone(), vehicle))
            .copied()
            .unwrap_or(UnitCost::Infeasible)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Parse a nested JSON object of unit costs.
    ///
    /// Either orientation is accepted: `{terrain: {vehicle: cost}}` or
    /// `{vehicle: {terrain: cost}}`; it is vehicle-major when every outer key
    /// names a vehicle. A cost is a number, `"inf"`, or `null`.
    pub fn from_json_str(json: &str) -> Result<Self, TableError> {
        let document: BTreeMap<String, BTreeMap<String, serde_json::Value>> = serde_json::from_str(json)?;
        let vehicle_major = !document.is_empty()
            && document.keys().all(|key| key.parse::<VehicleKind>().is_ok());

        let mut matrix = CostMatrix::new();
        for (outer, row) in &document {
            for (inner, value) in row {
                let (terrain, vehicle_name) = if vehicle_major { (inner, outer) } else { (outer, inner) };
                let vehicle = vehicle_name
                    .parse::<VehicleKind>()
                    .map_err(|_| TableError::UnknownVehicle(vehicle_name.clone()))?;
                let cost = json_cost(value).ok_or_else(|| TableError::InvalidCost {
                    terrain: terrain.clone(),
                    vehicle: vehicle_name.clone(),
                })?;
                matrix.set(terrain.as_str(), vehicle, cost)?;
            }
        }
        Ok(matrix)
    }
}

fn json_cost(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Null => Some(f64::INFINITY),
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(text) => {
            let text = text.trim().to_lowercase();
            if text == "inf" || text == "infinity" {
                Some(f64::INFINITY)
            } else {
                text.parse().ok()
            }
        }
        _ => None,
    }
}

/// Total traversal cost of one (path, vehicle) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cost {
    Feasible(f64),
    Infeasible,
}

impl Cost {
    pub fn value(&self) -> Option<f64> {
        match self {
            Cost::Feasible(value) => Some(*value),
            Cost::Infeasible => None,
        }
    }

    pub fn is_feasible(&self) -> bool {
        matches!(self, Cost::Feasible(_))
    }

    /// Ascending by value, every infeasible cost after every feasible one.
    pub fn rank_cmp(&self, other: &Cost) -> Ordering {
        match (self, other) {
            (Cost::Feasible(a), Cost::Feasible(b)) => a.total_cmp(b),
            (Cost::Feasible(_), Cost::Infeasible) => Ordering::Less,
            (Cost::Infeasible, Cost::Feasible(_)) => Ordering::Greater,
            (Cost::Infeasible, Cost::Infeasible) => Ordering::Equal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEvaluation {
    pub path: PathId,
    pub vehicle: VehicleKind,
    pub cost: Cost,
}

/// Weighted sum of `count × unit cost` over the histogram.
///
/// A single category with no feasible entry makes the whole pair infeasible.
pub fn evaluate(histogram: &TerrainHistogram, vehicle: VehicleKind, matrix: &CostMatrix) -> Cost {
    let mut total = 0.0;
    for (category, count) in histogram.iter() {
        if count == 0 {
            continue;
        }
        match matrix.unit_cost(category, vehicle) {
            UnitCost::Feasible(unit) => total += unit * f64::from(count),
            UnitCost::Infeasible => return Cost::Infeasible,
        }
    }
    Cost::Feasible(total)
}

/// Evaluate every (path, vehicle) pair and sort them.
///
/// Input order is vehicle-major, then path id; the sort is stable so equal
/// costs keep that order.
pub fn rank(histograms: &PathHistograms, matrix: &CostMatrix, vehicles: &[VehicleKind]) -> Ranking {
    let mut evaluations = Vec::with_capacity(histograms.len() * vehicles.len());
    for vehicle in vehicles {
        for (path, histogram) in histograms {
            evaluations.push(CostEvaluation {
                path: *path,
                vehicle: *vehicle,
                cost: evaluate(histogram, *vehicle, matrix),
            });
        }
    }
    evaluations.sort_by(|a, b| a.cost.rank_cmp(&b.cost));

    tracing::debug!(
        evaluations = evaluations.len(),
        feasible = evaluations.iter().filter(|e| e.cost.is_feasible()).count(),
        "ranked path/vehicle pairs"
    );

    Ranking { evaluations }
}

/// Ranked (path, vehicle) evaluations, cheapest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ranking {
    evaluations: Vec<CostEvaluation>,
}

impl Ranking {
    pub fn evaluations(&self) -> &[CostEvaluation] {
        &self.evaluations
    }

    pub fn top(&self, k: usize) -> &[CostEvaluation] {
        &self.evaluations[..k.min(self.evaluations.len())]
    }

    pub fn top_five(&self) -> &[CostEvaluation] {
        self.top(TOP_K)
    }

    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }

    /// The cheapest feasible pair overall.
    pub fn cheapest(&self) -> Option<&CostEvaluation> {
        self.evaluations.first().filter(|e| e.cost.is_feasible())
    }

    /// The cheapest feasible pair for one vehicle.
    pub fn cheapest_for(&self, vehicle: VehicleKind) -> Option<&CostEvaluation> {
        self.evaluations
            .iter()
            .find(|e| e.vehicle == vehicle && e.cost.is_feasible())
    }

    /// Per-path sum of the feasible evaluation costs. Paths with no feasible
    /// vehicle are absent.
    pub fn path_totals(&self) -> BTreeMap<PathId, f64> {
        let mut totals = BTreeMap::new();
        for evaluation in &self.evaluations {
            if let Cost::Feasible(value) = evaluation.cost {
                *totals.entry(evaluation.path).or_insert(0.0) += value;
            }
        }
        totals
    }

    /// The path whose feasible evaluations sum to the lowest total.
    /// Ties go to the lowest path id.
    pub fn globally_cheapest(&self) -> Option<PathId> {
        let mut best: Option<(PathId, f64)> = None;
        for (path, total) in self.path_totals() {
            match best {
                Some((_, best_total)) if total >= best_total => {}
                _ => best = Some((path, total)),
            }
        }
        best.map(|(path, _)| path)
    }
}
