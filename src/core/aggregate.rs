//! Groups collector records into raw observation sets and builds the table.

use crate::core::outlier::representative_price;
use crate::core::table::MunicipalityTable;
use crate::domain::model::{
    AggregationStats, CollectedData, MunicipalityKey, MunicipalityRecord, ObservationRecord,
    RawPrice,
};
use crate::domain::services::ServiceCatalog;
use crate::utils::error::{EtlError, Result};
use crate::utils::price_text::parse_price;
use std::collections::HashMap;

fn invalid(message: String) -> EtlError {
    EtlError::ValidationError { message }
}

/// Trimmed (city, region) key; either part missing or blank is a malformed row.
pub fn municipality_key(city: Option<&str>, region: Option<&str>) -> Result<MunicipalityKey> {
    let city = city.map(str::trim).unwrap_or_default();
    let region = region.map(str::trim).unwrap_or_default();
    if city.is_empty() || region.is_empty() {
        return Err(invalid(format!(
            "Missing municipality identifier (city: '{}', state: '{}')",
            city, region
        )));
    }
    Ok(MunicipalityKey::new(city, region))
}

/// Numeric value of a raw price; must be finite and non-negative, and inside
/// `range` when one is given.
pub fn sample_value(price: &RawPrice, range: Option<(f64, f64)>) -> Result<f64> {
    let value = match price {
        RawPrice::Amount(value) => *value,
        RawPrice::Text(text) => parse_price(text)
            .ok_or_else(|| invalid(format!("No numeric price in '{}'", text)))?,
    };
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("Price {} is not a valid amount", value)));
    }
    if let Some((min, max)) = range {
        if value < min || value > max {
            return Err(invalid(format!(
                "Price {} outside plausible range {}..={}",
                value, min, max
            )));
        }
    }
    Ok(value)
}

pub struct ObservationAggregator {
    catalog: ServiceCatalog,
    keys: Vec<MunicipalityKey>,
    index: HashMap<MunicipalityKey, usize>,
    // [municipality][service] → raw samples
    samples: Vec<Vec<Vec<f64>>>,
    plausible_range: Option<(f64, f64)>,
    stats: AggregationStats,
}

impl ObservationAggregator {
    pub fn new(catalog: ServiceCatalog) -> Self {
        Self {
            catalog,
            keys: Vec::new(),
            index: HashMap::new(),
            samples: Vec::new(),
            plausible_range: None,
            stats: AggregationStats::default(),
        }
    }

    /// 超出範圍的樣本視為壞列
    pub fn with_plausible_range(mut self, range: Option<(f64, f64)>) -> Self {
        self.plausible_range = range;
        self
    }

    fn slot(&mut self, key: MunicipalityKey) -> (usize, bool) {
        if let Some(slot) = self.index.get(&key) {
            return (*slot, false);
        }
        let slot = self.keys.len();
        self.index.insert(key.clone(), slot);
        self.keys.push(key);
        self.samples.push(vec![Vec::new(); self.catalog.len()]);
        (slot, true)
    }

    pub fn add_municipality(&mut self, record: &MunicipalityRecord) -> Result<()> {
        let key = municipality_key(record.city.as_deref(), record.state.as_deref())?;
        let (_, inserted) = self.slot(key);
        if !inserted {
            self.stats.duplicate_municipalities += 1;
        }
        Ok(())
    }

    pub fn add_observation(&mut self, record: &ObservationRecord) -> Result<()> {
        let key = municipality_key(record.city.as_deref(), record.state.as_deref())?;
        let service_name = record.service.as_deref().unwrap_or_default();
        let service = self
            .catalog
            .id_of(service_name)
            .ok_or_else(|| invalid(format!("Unknown service '{}' for {}", service_name, key)))?;
        let value = record
            .price
            .as_ref()
            .map(|price| sample_value(price, self.plausible_range))
            .transpose()?;

        let (slot, _) = self.slot(key);
        if let Some(value) = value {
            self.samples[slot][service.index()].push(value);
            self.stats.samples_accepted += 1;
        }
        Ok(())
    }

    /// Feeds every record; malformed rows are logged, counted and skipped.
    /// Rows the sources already failed to decode are counted as rejected too.
    pub fn add_all(&mut self, data: &CollectedData) {
        self.stats.rows_rejected += data.rows_skipped;
        for record in &data.municipalities {
            if let Err(e) = self.add_municipality(record) {
                tracing::warn!("⚠️ Skipping municipality row: {}", e);
                self.stats.rows_rejected += 1;
            }
        }
        for record in &data.observations {
            if let Err(e) = self.add_observation(record) {
                tracing::warn!("⚠️ Skipping observation row: {}", e);
                self.stats.rows_rejected += 1;
            }
        }
    }

    /// Runs the outlier filter on every observation set and builds the table.
    pub fn finish(mut self) -> Result<(MunicipalityTable, AggregationStats)> {
        let rows: Vec<(MunicipalityKey, Vec<Option<f64>>)> = self
            .keys
            .into_iter()
            .zip(self.samples)
            .map(|(key, sets)| {
                let observed: Vec<Option<f64>> = sets
                    .iter()
                    .map(|samples| representative_price(samples))
                    .collect();
                (key, observed)
            })
            .collect();

        self.stats.observed_cells = rows
            .iter()
            .map(|(_, observed)| observed.iter().filter(|v| v.is_some()).count())
            .sum();

        let table = MunicipalityTable::from_rows(self.catalog, rows)?;
        self.stats.municipalities = table.len();

        tracing::info!(
            "📋 Built table: {} municipalities, {} samples, {} observed cells, {} rows rejected",
            self.stats.municipalities,
            self.stats.samples_accepted,
            self.stats.observed_cells,
            self.stats.rows_rejected
        );
        Ok((table, self.stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(city: Option<&str>, state: Option<&str>, service: &str, price: Option<RawPrice>) -> ObservationRecord {
        ObservationRecord {
            city: city.map(String::from),
            state: state.map(String::from),
            service: Some(service.to_string()),
            price,
        }
    }

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::new(["A", "B"]).unwrap()
    }

    #[test]
    fn test_samples_reduced_through_outlier_filter() {
        let mut agg = ObservationAggregator::new(catalog());
        for price in [100.0, 100.0, 1000.0] {
            agg.add_observation(&obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(price))))
                .unwrap();
        }
        agg.add_observation(&obs(Some("X"), Some("R1"), "B", Some(RawPrice::Text("$1,250".into()))))
            .unwrap();

        let (table, stats) = agg.finish().unwrap();
        let row = table.get_row(&MunicipalityKey::new("X", "R1")).unwrap();
        assert_eq!(row.cells()[0].observed, Some(400.0));
        assert_eq!(row.cells()[1].observed, Some(1250.0));
        assert_eq!(stats.samples_accepted, 4);
        assert_eq!(stats.observed_cells, 2);
    }

    #[test]
    fn test_bad_rows_are_rejected_without_aborting() {
        let data = CollectedData {
            municipalities: vec![
                MunicipalityRecord {
                    city: Some("Listed".into()),
                    state: Some("R2".into()),
                },
                MunicipalityRecord {
                    city: None,
                    state: Some("R2".into()),
                },
                MunicipalityRecord {
                    city: Some(" Listed ".into()),
                    state: Some("R2".into()),
                },
            ],
            observations: vec![
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(10.0))),
                obs(Some("  "), Some("R1"), "A", Some(RawPrice::Amount(10.0))),
                obs(Some("X"), Some("R1"), "Unknown", Some(RawPrice::Amount(10.0))),
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(-5.0))),
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(f64::NAN))),
                obs(Some("X"), Some("R1"), "B", Some(RawPrice::Text("call us".into()))),
                obs(Some("Y"), Some("R1"), "B", None),
            ],
            rows_skipped: 2,
        };

        let mut agg = ObservationAggregator::new(catalog());
        agg.add_all(&data);
        let (table, stats) = agg.finish().unwrap();

        // 6 rejected here plus 2 the source could not decode
        assert_eq!(stats.rows_rejected, 8);
        assert_eq!(stats.duplicate_municipalities, 1);
        assert_eq!(table.len(), 3);

        let names: Vec<&str> = table.rows().map(|(_, r)| r.key.city.as_str()).collect();
        assert_eq!(names, vec!["Listed", "X", "Y"]);

        let listed = table.get_row(&MunicipalityKey::new("Listed", "R2")).unwrap();
        assert!(listed.cells().iter().all(|c| c.observed.is_none()));
        let x = table.get_row(&MunicipalityKey::new("X", "R1")).unwrap();
        assert_eq!(x.cells()[0].observed, Some(10.0));
    }

    #[test]
    fn test_plausible_range_rejects_far_samples() {
        let mut agg =
            ObservationAggregator::new(catalog()).with_plausible_range(Some((50.0, 5000.0)));
        let data = CollectedData {
            observations: vec![
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(49.99))),
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Text("$5,001".into()))),
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(50.0))),
                obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(5000.0))),
            ],
            ..Default::default()
        };
        agg.add_all(&data);
        let (table, stats) = agg.finish().unwrap();

        assert_eq!(stats.rows_rejected, 2);
        assert_eq!(stats.samples_accepted, 2);
        let x = table.get_row(&MunicipalityKey::new("X", "R1")).unwrap();
        assert_eq!(x.cells()[0].observed, Some(2525.0));
    }

    #[test]
    fn test_no_range_keeps_small_prices() {
        assert_eq!(sample_value(&RawPrice::Amount(5.0), None).unwrap(), 5.0);
        assert!(sample_value(&RawPrice::Amount(5.0), Some((50.0, 5000.0))).is_err());
    }

    #[test]
    fn test_zero_price_is_an_observation() {
        let mut agg = ObservationAggregator::new(catalog());
        agg.add_observation(&obs(Some("X"), Some("R1"), "A", Some(RawPrice::Amount(0.0))))
            .unwrap();
        let (table, _) = agg.finish().unwrap();
        let row = table.get_row(&MunicipalityKey::new("X", "R1")).unwrap();
        assert_eq!(row.cells()[0].observed, Some(0.0));
        assert_eq!(row.cells()[1].observed, None);
    }
}
