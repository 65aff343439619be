//! mission-planner core
//!
//! Generates synthetic candidate paths between two coordinates, samples the
//! terrain along them, ranks path/vehicle combinations by traversal cost and
//! picks the cheapest weather window for the move.

pub mod path;
pub mod haversine;
pub mod traits;
pub mod geometry;
pub mod terrain;
pub mod sampler;
pub mod cost;
pub mod weather;
pub mod overpass;
pub mod openweather;
pub mod planner;
pub mod config;
