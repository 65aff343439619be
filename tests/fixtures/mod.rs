//! Test fixtures for mission-planner.
//!
//! Provides:
//! - Deterministic land-use lookups (constant, grid-based, failing, counting)
//! - Canned forecast sources
//! - A few real coordinates for the live adapter tests

#![allow(dead_code, unused_imports)]

pub mod stubs;

pub use stubs::*;
