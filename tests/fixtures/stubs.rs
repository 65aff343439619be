use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};

use mission_planner::path::Coordinate;
use mission_planner::traits::{ForecastSource, LandUseLookup, LookupError};
use mission_planner::weather::ForecastSample;

/// Central Paris; dense urban with parks and the Seine nearby.
pub const PARIS: Coordinate = Coordinate::new(48.8566, 2.3522);
/// Fontainebleau forest, south-east of Paris.
pub const FONTAINEBLEAU: Coordinate = Coordinate::new(48.4047, 2.7016);

/// Returns the same tags for every coordinate.
pub struct ConstantLookup(pub Vec<&'static str>);

impl LandUseLookup for ConstantLookup {
    fn land_use(&self, _at: Coordinate, _radius_m: f64) -> Result<BTreeSet<String>, LookupError> {
        Ok(self.0.iter().map(|tag| tag.to_string()).collect())
    }
}

/// Picks tags from a coarse longitude grid and fails on a sparse latitude grid.
///
/// Deterministic in the coordinate only, so any worker count sees the same answers.
pub struct GridLookup;

impl LandUseLookup for GridLookup {
    fn land_use(&self, at: Coordinate, _radius_m: f64) -> Result<BTreeSet<String>, LookupError> {
        let lat_cell = (at.lat * 1000.0).round() as i64;
        if lat_cell.rem_euclid(7) == 0 && lat_cell != 0 {
            return Err(LookupError::Status(429));
        }
        let lon_cell = (at.lon * 10.0).floor() as i64;
        let tags: &[&str] = match lon_cell.rem_euclid(4) {
            0 => &["forest"],
            1 => &["water", "meadow"],
            2 => &[],
            _ => &["industrial", "wood"],
        };
        Ok(tags.iter().map(|tag| tag.to_string()).collect())
    }
}

/// Always fails.
pub struct FailingLookup;

impl LandUseLookup for FailingLookup {
    fn land_use(&self, _at: Coordinate, _radius_m: f64) -> Result<BTreeSet<String>, LookupError> {
        Err(LookupError::Parse("unexpected end of input".to_string()))
    }
}

/// Wraps a lookup, sleeping on every call and recording peak concurrency.
pub struct CountingLookup<L> {
    inner: L,
    delay: StdDuration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl<L> CountingLookup<L> {
    pub fn new(inner: L, delay_ms: u64) -> Self {
        Self {
            inner,
            delay: StdDuration::from_millis(delay_ms),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<L: LandUseLookup> LandUseLookup for CountingLookup<L> {
    fn land_use(&self, at: Coordinate, radius_m: f64) -> Result<BTreeSet<String>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        thread::sleep(self.delay);
        let result = self.inner.land_use(at, radius_m);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Serves a fixed forecast.
pub struct StubForecast(pub Vec<ForecastSample>);

impl ForecastSource for StubForecast {
    fn forecast(&self, _at: Coordinate) -> Result<Vec<ForecastSample>, LookupError> {
        Ok(self.0.clone())
    }
}

pub struct FailingForecast;

impl ForecastSource for FailingForecast {
    fn forecast(&self, _at: Coordinate) -> Result<Vec<ForecastSample>, LookupError> {
        Err(LookupError::Status(401))
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 15, 0, 0, 0).unwrap()
}

/// One sample every 3 hours from `base_time()`, in the given order.
pub fn forecast_every_3h(tags: &[&str]) -> Vec<ForecastSample> {
    tags.iter()
        .enumerate()
        .map(|(i, tag)| ForecastSample::new(base_time() + Duration::hours(3 * i as i64), *tag))
        .collect()
}
