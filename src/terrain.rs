//! Terrain classification of single coordinates.
//!
//! A point's raw land-use tags (from a [`LandUseLookup`]) are mapped through a
//! many-to-one [`CategoryTable`] onto canonical [`TerrainCategory`] labels.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::Coordinate;
use crate::traits::LandUseLookup;

const UNKNOWN: &str = "unknown";

/// Default radius around a sample point searched for land-use features.
pub const DEFAULT_RADIUS_M: f64 = 500.0;

/// A canonical terrain label, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TerrainCategory(String);

impl TerrainCategory {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerrainCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TerrainCategory {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for TerrainCategory {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<TerrainCategory> for String {
    fn from(category: TerrainCategory) -> Self {
        category.0
    }
}

/// Malformed reference table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableError {
    /// A raw tag was assigned to two different categories.
    ConflictingTag {
        tag: String,
        existing: TerrainCategory,
        requested: TerrainCategory,
    },
    UnknownVehicle(String),
    NegativeCost { terrain: String, vehicle: String, cost: f64 },
    InvalidCost { terrain: String, vehicle: String },
    Json(String),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableError::ConflictingTag { tag, existing, requested } => write!(
                f,
                "raw tag '{}' already maps to '{}', cannot also map to '{}'",
                tag, existing, requested
            ),
            TableError::UnknownVehicle(name) => write!(f, "unknown vehicle '{}'", name),
            TableError::NegativeCost { terrain, vehicle, cost } => {
                write!(f, "negative cost {} for {}/{}", cost, terrain, vehicle)
            }
            TableError::InvalidCost { terrain, vehicle } => {
                write!(f, "cost for {}/{} is neither a number nor \"inf\"", terrain, vehicle)
            }
            TableError::Json(msg) => write!(f, "invalid table document: {}", msg),
        }
    }
}

impl std::error::Error for TableError {}

impl From<serde_json::Error> for TableError {
    fn from(err: serde_json::Error) -> Self {
        TableError::Json(err.to_string())
    }
}

/// Many-to-one mapping from raw land-use tags to terrain categories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryTable {
    by_tag: HashMap<String, TerrainCategory>,
}

impl CategoryTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The table used when the application supplies none.
    pub fn standard() -> Self {
        let groups: [(&str, &[&str]); 6] = [
            ("forest", &["forest", "wood", "scrub"]),
            ("water", &["water"]),
            ("flatlands", &["meadow", "grass", "farmyard", "farmland", "orchard"]),
            (
                "urban",
                &["retail", "commercial", "industrial", "brownfield", "recreation_ground", "cemetery"],
            ),
            ("transport", &["railway"]),
            ("military", &["military"]),
        ];

        let mut by_tag = HashMap::new();
        for (category, tags) in groups {
            for tag in tags {
                by_tag.insert(tag.to_string(), TerrainCategory::new(category));
            }
        }
        Self { by_tag }
    }

    /// Map `tag` onto `category`. Re-adding the same pair is a no-op.
    pub fn insert(
        &mut self,
        tag: impl Into<String>,
        category: impl Into<TerrainCategory>,
    ) -> Result<(), TableError> {
        let tag = tag.into().trim().to_lowercase();
        let category = category.into();
        if let Some(existing) = self.by_tag.get(&tag) {
            if *existing != category {
                return Err(TableError::ConflictingTag {
                    tag,
                    existing: existing.clone(),
                    requested: category,
                });
            }
            return Ok(());
        }
        self.by_tag.insert(tag, category);
        Ok(())
    }

    pub fn with_category(mut self, category: &str, tags: &[&str]) -> Result<Self, TableError> {
        for tag in tags {
            self.insert(*tag, category)?;
        }
        Ok(self)
    }

    pub fn category_for(&self, tag: &str) -> Option<&TerrainCategory> {
        self.by_tag.get(&tag.trim().to_lowercase())
    }

    /// All categories reachable through the table.
    pub fn categories(&self) -> BTreeSet<TerrainCategory> {
        self.by_tag.values().cloned().collect()
    }

    /// Union of the categories of every recognised tag. Unmapped tags are ignored.
    pub fn categorize<'a, I>(&self, tags: I) -> BTreeSet<TerrainCategory>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tags.into_iter()
            .filter_map(|tag| self.category_for(tag))
            .cloned()
            .collect()
    }
}

/// Outcome of classifying one coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Classification {
    /// One or more recognised categories.
    Categories(BTreeSet<TerrainCategory>),
    /// No recognised land use around the point.
    Unknown,
    /// The upstream lookup failed; carries the error text.
    Failed(String),
}

impl Classification {
    /// Categories that count towards a histogram. Empty for `Unknown` and `Failed`.
    pub fn countable(&self) -> impl Iterator<Item = &TerrainCategory> {
        let set = match self {
            Classification::Categories(set) => Some(set),
            _ => None,
        };
        set.into_iter().flatten().filter(|category| !category.is_unknown())
    }

    /// The category set as a plain set; `Unknown` becomes `{unknown}`.
    pub fn categories(&self) -> BTreeSet<TerrainCategory> {
        match self {
            Classification::Categories(set) => set.clone(),
            Classification::Unknown => BTreeSet::from([TerrainCategory::unknown()]),
            Classification::Failed(_) => BTreeSet::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Classification::Failed(_))
    }
}

/// Classifies coordinates through a land-use lookup and a category table.
///
/// Never propagates lookup failures: they come back as
/// [`Classification::Failed`].
#[derive(Debug, Clone)]
pub struct TerrainClassifier<L> {
    lookup: L,
    table: CategoryTable,
    radius_m: f64,
}

impl<L: LandUseLookup> TerrainClassifier<L> {
    pub fn new(lookup: L, table: CategoryTable) -> Self {
        Self {
            lookup,
            table,
            radius_m: DEFAULT_RADIUS_M,
        }
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn classify(&self, at: Coordinate) -> Classification {
        match self.lookup.land_use(at, self.radius_m) {
            Ok(tags) => {
                let mut categories = self.table.categorize(tags.iter().map(String::as_str));
                categories.remove(&TerrainCategory::unknown());
                if categories.is_empty() {
                    Classification::Unknown
                } else {
                    Classification::Categories(categories)
                }
            }
            Err(err) => {
                tracing::warn!(lat = at.lat, lon = at.lon, error = %err, "land-use lookup failed");
                Classification::Failed(err.to_string())
            }
        }
    }
}
