//! Fills absent observations from a neighbor sample.

use crate::core::neighbors::{NeighborSample, NeighborSelector, RandomSource};
use crate::core::outlier::mean;
use crate::core::table::{MunicipalityTable, RowId};
use crate::domain::model::InterpolationStats;
use crate::domain::services::ServiceId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

/// Rounds to cents.
pub fn round_currency(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimates for one target row. Only services without an observed value are listed.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEstimate {
    pub row: RowId,
    pub sample: NeighborSample,
    pub estimates: Vec<(ServiceId, Option<f64>)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationEngine {
    selector: NeighborSelector,
    adjustment_factor: f64,
}

impl InterpolationEngine {
    pub fn new(nearest_k: usize, adjustment_factor: f64) -> Self {
        Self {
            selector: NeighborSelector::new(nearest_k),
            adjustment_factor,
        }
    }

    pub fn selector(&self) -> &NeighborSelector {
        &self.selector
    }

    pub fn adjustment_factor(&self) -> f64 {
        self.adjustment_factor
    }

    /// Mean of the neighbors' observed values × adjustment factor, per missing
    /// service. Neighbors lacking the service are skipped; no values → `None`.
    pub fn estimate(
        &self,
        table: &MunicipalityTable,
        target: RowId,
        neighbors: &[RowId],
    ) -> Vec<(ServiceId, Option<f64>)> {
        let row = table.row(target);
        table
            .catalog()
            .ids()
            .filter(|service| row.cell(*service).is_missing())
            .map(|service| {
                let values: Vec<f64> = neighbors
                    .iter()
                    .filter_map(|id| table.row(*id).observed(service))
                    .collect();
                let estimate =
                    mean(&values).map(|avg| round_currency(avg * self.adjustment_factor));
                (service, estimate)
            })
            .collect()
    }

    pub fn interpolate_row<R>(
        &self,
        table: &MunicipalityTable,
        target: RowId,
        rng: &mut R,
    ) -> RowEstimate
    where
        R: RandomSource + ?Sized,
    {
        let sample = self.selector.select(table, target, rng);
        let estimates = self.estimate(table, target, sample.rows());
        RowEstimate {
            row: target,
            sample,
            estimates,
        }
    }

    /// Interpolates every row with a missing service.
    ///
    /// Rows are processed in parallel against the read-only table, each with
    /// its own generator (`seed + row index` when seeded), then applied.
    pub fn interpolate_table(
        &self,
        table: &mut MunicipalityTable,
        seed: Option<u64>,
    ) -> InterpolationStats {
        let targets: Vec<RowId> = table
            .rows()
            .filter(|(_, row)| row.has_missing())
            .map(|(id, _)| id)
            .collect();

        let shared: &MunicipalityTable = table;
        let results: Vec<RowEstimate> = targets
            .par_iter()
            .map(|&target| {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(target.index() as u64)),
                    None => StdRng::from_entropy(),
                };
                self.interpolate_row(shared, target, &mut rng)
            })
            .collect();

        let mut stats = InterpolationStats::default();
        for result in results {
            stats.rows_interpolated += 1;
            match &result.sample {
                NeighborSample::Regional(_) => stats.regional_samples += 1,
                NeighborSample::National(_) => stats.national_samples += 1,
                NeighborSample::Empty => {
                    stats.rows_without_neighbors += 1;
                    tracing::warn!(
                        "No neighbors available for {}, leaving its gaps empty",
                        table.row(result.row).key
                    );
                }
            }

            for (service, estimate) in result.estimates {
                match estimate {
                    Some(value) if table.fill_interpolated(result.row, service, value) => {
                        stats.cells_filled += 1;
                    }
                    _ => stats.cells_unfilled += 1,
                }
            }
        }

        tracing::info!(
            "🧮 Interpolated {} rows: {} cells filled, {} left empty ({} regional, {} national samples)",
            stats.rows_interpolated,
            stats.cells_filled,
            stats.cells_unfilled,
            stats.regional_samples,
            stats.national_samples
        );
        stats
    }
}
