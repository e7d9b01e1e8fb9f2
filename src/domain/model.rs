use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// (city, region) pair identifying one pricing target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MunicipalityKey {
    pub city: String,
    pub region: String,
}

impl MunicipalityKey {
    pub fn new(city: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            region: region.into(),
        }
    }
}

impl fmt::Display for MunicipalityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.city, self.region)
    }
}

/// A price as delivered by a collector: already numeric, or free text like "$1,250".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrice {
    Amount(f64),
    Text(String),
}

/// One entry of the municipality reference list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityRecord {
    pub city: Option<String>,
    #[serde(alias = "region")]
    pub state: Option<String>,
}

/// One raw price sample for a (municipality, service) pair.
///
/// `price: None` still registers the municipality, without a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub city: Option<String>,
    #[serde(alias = "region")]
    pub state: Option<String>,
    pub service: Option<String>,
    #[serde(default)]
    pub price: Option<RawPrice>,
}

/// Rows a source could decode, plus the number it had to skip.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRows<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

impl<T> SourceRows<T> {
    pub fn new(rows: Vec<T>, skipped: usize) -> Self {
        Self { rows, skipped }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> Default for SourceRows<T> {
    fn default() -> Self {
        Self::new(Vec::new(), 0)
    }
}

/// Everything the collector handed over for one run.
#[derive(Debug, Clone, Default)]
pub struct CollectedData {
    pub municipalities: Vec<MunicipalityRecord>,
    pub observations: Vec<ObservationRecord>,
    /// Rows the sources could not decode; they count as rejected.
    pub rows_skipped: usize,
}

/// Observed and interpolated value of one (municipality, service) cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceCell {
    pub observed: Option<f64>,
    pub interpolated: Option<f64>,
}

impl PriceCell {
    pub fn observed(value: Option<f64>) -> Self {
        Self {
            observed: value,
            interpolated: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.observed.is_none()
    }

    /// Observed wins; interpolation only ever fills an absent observation.
    pub fn published(&self) -> Option<f64> {
        self.observed.or(self.interpolated)
    }

    pub fn interpolation_used(&self) -> bool {
        self.observed.is_none() && self.interpolated.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub price: Option<f64>,
    pub interpolation_used: bool,
}

impl From<PriceCell> for PriceEntry {
    fn from(cell: PriceCell) -> Self {
        Self {
            price: cell.published(),
            interpolation_used: cell.interpolation_used(),
        }
    }
}

/// Per-service prices of one municipality, in catalog order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MunicipalityPricing {
    pub services: Vec<(String, PriceEntry)>,
}

impl MunicipalityPricing {
    pub fn get(&self, service: &str) -> Option<&PriceEntry> {
        self.services
            .iter()
            .find(|(name, _)| name == service)
            .map(|(_, entry)| entry)
    }
}

struct OrderedServices<'a>(&'a [(String, PriceEntry)]);

impl Serialize for OrderedServices<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, entry) in self.0 {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

impl Serialize for MunicipalityPricing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("services", &OrderedServices(&self.services))?;
        map.end()
    }
}

pub type RegionPricing = BTreeMap<String, MunicipalityPricing>;

/// Final region → municipality → service structure handed to persistence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PricingDocument {
    country: Option<String>,
    regions: BTreeMap<String, RegionPricing>,
}

impl PricingDocument {
    pub fn new(regions: BTreeMap<String, RegionPricing>) -> Self {
        Self {
            country: None,
            regions,
        }
    }

    /// Nest the regions under a top-level country key, e.g. "United States".
    pub fn with_country(mut self, country: Option<String>) -> Self {
        self.country = country;
        self
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn regions(&self) -> &BTreeMap<String, RegionPricing> {
        &self.regions
    }

    pub fn get(&self, region: &str, city: &str) -> Option<&MunicipalityPricing> {
        self.regions.get(region).and_then(|cities| cities.get(city))
    }

    pub fn municipality_count(&self) -> usize {
        self.regions.values().map(|cities| cities.len()).sum()
    }

    /// One document per region, each keeping the country wrapper.
    pub fn split_by_region(&self) -> Vec<(String, PricingDocument)> {
        self.regions
            .iter()
            .map(|(region, cities)| {
                let mut regions = BTreeMap::new();
                regions.insert(region.clone(), cities.clone());
                (
                    region.clone(),
                    PricingDocument {
                        country: self.country.clone(),
                        regions,
                    },
                )
            })
            .collect()
    }
}

impl Serialize for PricingDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.country {
            Some(country) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(country, &self.regions)?;
                map.end()
            }
            None => self.regions.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationStats {
    pub municipalities: usize,
    pub samples_accepted: usize,
    pub rows_rejected: usize,
    pub duplicate_municipalities: usize,
    pub observed_cells: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterpolationStats {
    pub rows_interpolated: usize,
    pub cells_filled: usize,
    pub cells_unfilled: usize,
    pub regional_samples: usize,
    pub national_samples: usize,
    pub rows_without_neighbors: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub aggregation: AggregationStats,
    pub interpolation: InterpolationStats,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub document: PricingDocument,
    pub stats: RunStats,
}
