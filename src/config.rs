//! Planner configuration from environment.

use std::env;
use std::str::FromStr;

use crate::openweather::OpenWeatherConfig;
use crate::overpass::OverpassConfig;
use crate::planner::{DEFAULT_MAX_RECURSION_DEPTH, PlanOptions};
use crate::sampler::{DEFAULT_WORKERS, SamplerOptions, SamplingStrategy};
use crate::terrain::DEFAULT_RADIUS_M;

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub overpass: OverpassConfig,
    pub openweather: OpenWeatherConfig,
    pub lookup_radius_m: f64,
    pub sampler_workers: usize,
    pub max_recursion_depth: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            overpass: OverpassConfig::default(),
            openweather: OpenWeatherConfig::default(),
            lookup_radius_m: DEFAULT_RADIUS_M,
            sampler_workers: DEFAULT_WORKERS,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing or unparsable values keep
    /// their defaults.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            overpass: OverpassConfig {
                base_url: get("OVERPASS_URL").unwrap_or(defaults.overpass.base_url),
                timeout_secs: parse_var(&get, "LOOKUP_TIMEOUT_SECS")
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(defaults.overpass.timeout_secs),
            },
            openweather: OpenWeatherConfig {
                base_url: get("OPENWEATHER_URL").unwrap_or(defaults.openweather.base_url),
                api_key: get("OPENWEATHER_API_KEY").unwrap_or(defaults.openweather.api_key),
                timeout_secs: defaults.openweather.timeout_secs,
            },
            lookup_radius_m: parse_var(&get, "LOOKUP_RADIUS_M")
                .filter(|radius: &f64| radius.is_finite() && *radius > 0.0)
                .unwrap_or(defaults.lookup_radius_m),
            sampler_workers: parse_var(&get, "SAMPLER_WORKERS")
                .filter(|workers: &usize| *workers > 0)
                .unwrap_or(defaults.sampler_workers),
            max_recursion_depth: parse_var(&get, "MAX_RECURSION_DEPTH").unwrap_or(defaults.max_recursion_depth),
        }
    }

    pub fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            workers: self.sampler_workers,
            strategy: SamplingStrategy::default(),
        }
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            max_recursion_depth: self.max_recursion_depth,
            ..PlanOptions::default()
        }
    }
}

fn parse_var<T, F>(get: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key).and_then(|value| value.trim().parse().ok())
}
