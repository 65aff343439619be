//! Provider traits for the external collaborators of the planner.
//!
//! These are intentionally minimal. The HTTP adapters in `overpass` and
//! `openweather` implement them; tests implement them with stubs.

use std::collections::BTreeSet;
use std::fmt;

use crate::path::Coordinate;
use crate::weather::ForecastSample;

/// Failure of an upstream lookup.
#[derive(Debug)]
pub enum LookupError {
    Http(reqwest::Error),
    Status(u16),
    Parse(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Http(err) => write!(f, "transport error: {}", err),
            LookupError::Status(code) => write!(f, "upstream returned status {}", code),
            LookupError::Parse(msg) => write!(f, "malformed upstream response: {}", msg),
        }
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LookupError::Http(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LookupError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            LookupError::Status(status.as_u16())
        } else {
            LookupError::Http(err)
        }
    }
}

/// Returns the raw land-use tags observed within `radius_m` meters of a point.
///
/// Called concurrently from the sampler's worker pool.
pub trait LandUseLookup: Send + Sync {
    fn land_use(&self, at: Coordinate, radius_m: f64) -> Result<BTreeSet<String>, LookupError>;
}

/// Provides a 3-hourly weather forecast for a location.
pub trait ForecastSource: Send + Sync {
    fn forecast(&self, at: Coordinate) -> Result<Vec<ForecastSample>, LookupError>;
}

impl<T: LandUseLookup + ?Sized> LandUseLookup for &T {
    fn land_use(&self, at: Coordinate, radius_m: f64) -> Result<BTreeSet<String>, LookupError> {
        (**self).land_use(at, radius_m)
    }
}

impl<T: ForecastSource + ?Sized> ForecastSource for &T {
    fn forecast(&self, at: Coordinate) -> Result<Vec<ForecastSample>, LookupError> {
        (**self).forecast(at)
    }
}
