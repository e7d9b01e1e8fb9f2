//! Peer selection for interpolation: same region first, national pool as fallback.

use crate::core::table::{MunicipalityTable, RowId};
use rand::Rng;

/// Source of uniform draws without replacement.
///
/// Every `rand::Rng` is one, so production code passes an entropy-seeded
/// generator and tests pass a seeded `StdRng`.
pub trait RandomSource {
    /// `amount` distinct indices from `0..len`. Callers guarantee `amount <= len`.
    fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize>;
}

impl<R: Rng + ?Sized> RandomSource for R {
    fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(self, len, amount).into_vec()
    }
}

/// Which pool a neighbor sample was drawn from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeighborSample {
    Regional(Vec<RowId>),
    National(Vec<RowId>),
    /// No other municipality to learn from.
    Empty,
}

impl NeighborSample {
    pub fn rows(&self) -> &[RowId] {
        match self {
            NeighborSample::Regional(rows) | NeighborSample::National(rows) => rows,
            NeighborSample::Empty => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborSelector {
    nearest_k: usize,
}

impl NeighborSelector {
    pub fn new(nearest_k: usize) -> Self {
        Self { nearest_k }
    }

    pub fn nearest_k(&self) -> usize {
        self.nearest_k
    }

    pub fn select<R>(&self, table: &MunicipalityTable, target: RowId, rng: &mut R) -> NeighborSample
    where
        R: RandomSource + ?Sized,
    {
        let others = table.len().saturating_sub(1);
        let k = self.nearest_k.min(others);
        if k == 0 {
            return NeighborSample::Empty;
        }

        let regional = table.rows_in_region(table.row(target).region(), Some(target));
        if regional.len() >= k {
            return NeighborSample::Regional(draw(&regional, k, rng));
        }

        let national = table.all_rows(Some(target));
        let k_national = k.min(national.len());
        if k_national == 0 {
            return NeighborSample::Empty;
        }

        tracing::debug!(
            "Region {} has {} peers for {}, falling back to national pool of {}",
            table.row(target).region(),
            regional.len(),
            table.row(target).key,
            national.len()
        );
        NeighborSample::National(draw(&national, k_national, rng))
    }
}

fn draw<R>(pool: &[RowId], amount: usize, rng: &mut R) -> Vec<RowId>
where
    R: RandomSource + ?Sized,
{
    rng.sample_indices(pool.len(), amount)
        .into_iter()
        .map(|i| pool[i])
        .collect()
}
