//! Indexed municipality × service price table.

use crate::domain::model::{MunicipalityKey, PriceCell};
use crate::domain::services::{ServiceCatalog, ServiceId};
use crate::utils::error::{EtlError, Result};
use std::collections::{BTreeMap, HashMap};

/// Position of a row inside a [`MunicipalityTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(usize);

impl RowId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityRow {
    pub key: MunicipalityKey,
    cells: Vec<PriceCell>,
}

impl MunicipalityRow {
    pub fn region(&self) -> &str {
        &self.key.region
    }

    pub fn cell(&self, service: ServiceId) -> &PriceCell {
        &self.cells[service.index()]
    }

    pub fn observed(&self, service: ServiceId) -> Option<f64> {
        self.cells[service.index()].observed
    }

    pub fn cells(&self) -> &[PriceCell] {
        &self.cells
    }

    pub fn has_missing(&self) -> bool {
        self.cells.iter().any(PriceCell::is_missing)
    }
}

/// Arena of municipality rows with key and region indexes.
///
/// Rows keep their first-seen order; a (city, region) pair appears once.
#[derive(Debug, Clone)]
pub struct MunicipalityTable {
    catalog: ServiceCatalog,
    rows: Vec<MunicipalityRow>,
    by_key: HashMap<MunicipalityKey, RowId>,
    by_region: BTreeMap<String, Vec<RowId>>,
}

impl MunicipalityTable {
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            rows: Vec::new(),
            by_key: HashMap::new(),
            by_region: BTreeMap::new(),
        }
    }

    /// Builds a table from pre-aggregated rows (one optional observed price per
    /// service, in catalog order). Later duplicates of a key are dropped.
    pub fn from_rows<I>(catalog: ServiceCatalog, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (MunicipalityKey, Vec<Option<f64>>)>,
    {
        let mut table = Self::new(catalog);
        for (key, observed) in rows {
            table.insert(key, observed)?;
        }
        Ok(table)
    }

    /// Adds a row unless its key is already present. Returns the row's id and
    /// whether it was newly inserted.
    pub fn insert(
        &mut self,
        key: MunicipalityKey,
        observed: Vec<Option<f64>>,
    ) -> Result<(RowId, bool)> {
        if observed.len() != self.catalog.len() {
            return Err(EtlError::ValidationError {
                message: format!(
                    "Row for {} has {} price columns, expected {}",
                    key,
                    observed.len(),
                    self.catalog.len()
                ),
            });
        }

        if let Some(id) = self.by_key.get(&key) {
            tracing::debug!("Dropping duplicate municipality row: {}", key);
            return Ok((*id, false));
        }

        let id = RowId(self.rows.len());
        self.by_region
            .entry(key.region.clone())
            .or_default()
            .push(id);
        self.by_key.insert(key.clone(), id);
        self.rows.push(MunicipalityRow {
            key,
            cells: observed.into_iter().map(PriceCell::observed).collect(),
        });
        Ok((id, true))
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, id: RowId) -> &MunicipalityRow {
        &self.rows[id.0]
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowId, &MunicipalityRow)> + '_ {
        self.rows.iter().enumerate().map(|(i, row)| (RowId(i), row))
    }

    pub fn row_id(&self, key: &MunicipalityKey) -> Option<RowId> {
        self.by_key.get(key).copied()
    }

    pub fn get_row(&self, key: &MunicipalityKey) -> Result<&MunicipalityRow> {
        self.row_id(key)
            .map(|id| self.row(id))
            .ok_or_else(|| EtlError::MunicipalityNotFound {
                city: key.city.clone(),
                region: key.region.clone(),
            })
    }

    /// Rows of `region`, minus `excluding` when given.
    pub fn rows_in_region(&self, region: &str, excluding: Option<RowId>) -> Vec<RowId> {
        self.by_region
            .get(region)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| Some(*id) != excluding)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_rows(&self, excluding: Option<RowId>) -> Vec<RowId> {
        (0..self.rows.len())
            .map(RowId)
            .filter(|id| Some(*id) != excluding)
            .collect()
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> + '_ {
        self.by_region.keys().map(String::as_str)
    }

    /// Stores an estimate for an absent observation. Returns `false` (and
    /// leaves the cell alone) when the cell already has an observed value.
    pub fn fill_interpolated(&mut self, id: RowId, service: ServiceId, value: f64) -> bool {
        let cell = &mut self.rows[id.0].cells[service.index()];
        if cell.observed.is_some() {
            return false;
        }
        cell.interpolated = Some(value);
        true
    }
}
