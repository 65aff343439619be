//! Overpass API adapter for land-use lookups.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::path::Coordinate;
use crate::traits::{LandUseLookup, LookupError};

#[derive(Debug, Clone)]
pub struct OverpassConfig {
    pub base_url: String,
    /// Client-side timeout per request; also sent as the query's server-side timeout.
    pub timeout_secs: u64,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            base_url: "https://overpass-api.de/api/interpreter".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverpassClient {
    config: OverpassConfig,
    client: reqwest::blocking::Client,
}

impl OverpassClient {
    pub fn new(config: OverpassConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OverpassConfig {
        &self.config
    }

    fn query_for(&self, at: Coordinate, radius_m: f64) -> String {
        let around = format!("around:{:.0},{:.6},{:.6}", radius_m, at.lat, at.lon);
        format!(
            "[out:json][timeout:{}];(node({around});way({around});relation({around}););out tags;",
            self.config.timeout_secs,
            around = around
        )
    }
}

impl LandUseLookup for OverpassClient {
    fn land_use(&self, at: Coordinate, radius_m: f64) -> Result<BTreeSet<String>, LookupError> {
        let body = self
            .client
            .get(&self.config.base_url)
            .query(&[("data", self.query_for(at, radius_m))])
            .send()?
            .error_for_status()?
            .json::<OverpassResponse>()?;

        Ok(land_use_tags(&body))
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(default)]
    tags: Option<OverpassTags>,
}

#[derive(Debug, Deserialize)]
struct OverpassTags {
    landuse: Option<String>,
    natural: Option<String>,
}

/// `landuse` of every tagged element, falling back to `natural`.
fn land_use_tags(response: &OverpassResponse) -> BTreeSet<String> {
    response
        .elements
        .iter()
        .filter_map(|element| element.tags.as_ref())
        .filter_map(|tags| tags.landuse.as_ref().or(tags.natural.as_ref()))
        .cloned()
        .collect()
}
