use crate::{Real, histogram::Histogram, response::ResponseModel};
use std::{collections::HashMap, sync::Arc};
use tracing::debug;
use ucn_common::Microseconds;

/// Once more geometries than this are cached the whole cache is dropped.
pub const MAX_CACHED_GEOMETRIES: usize = 500;

/// Histogram geometry a shift matrix depends on. The bin width is held in
/// whole micro-units so that widths equal to 1e-6 share a key.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LookupKey {
    pub num_bins: usize,
    pub bin_width_micro: i64,
}

impl LookupKey {
    pub fn new(num_bins: usize, bin_width: Microseconds) -> Self {
        Self {
            num_bins,
            bin_width_micro: (bin_width * 1e6).round() as i64,
        }
    }
}

/// The discretised response for every whole-bin shift of a histogram.
/// Row `k` is the response of a pulse starting in bin `k`.
#[derive(Clone, Debug, PartialEq)]
pub struct ShiftMatrix {
    rows: Vec<Vec<Real>>,
}

impl ShiftMatrix {
    pub fn build(model: &ResponseModel, offsets: &[Microseconds]) -> Self {
        let base = model.discretise(offsets);
        let rows = (0..offsets.len())
            .map(|shift| crate::response::shift_right(&base, shift))
            .collect();
        Self { rows }
    }

    pub fn num_bins(&self) -> usize {
        self.rows.len()
    }

    /// Shifts past the last bin give the last row.
    pub fn row(&self, shift: usize) -> &[Real] {
        self.rows
            .get(shift)
            .or_else(|| self.rows.last())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Memoised shift matrices keyed by histogram geometry.
#[derive(Default)]
pub struct PdfLookup {
    cache: HashMap<LookupKey, Arc<ShiftMatrix>>,
    resets: usize,
}

impl PdfLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shift matrix for the histogram's geometry, building it on
    /// first use.
    pub fn get(&mut self, model: &ResponseModel, histogram: &Histogram) -> Arc<ShiftMatrix> {
        let key = LookupKey::new(histogram.num_bins(), histogram.bin_width());
        if let Some(matrix) = self.cache.get(&key) {
            return matrix.clone();
        }

        let matrix = Arc::new(ShiftMatrix::build(model, histogram.offsets()));
        self.cache.insert(key, matrix.clone());
        if self.cache.len() > MAX_CACHED_GEOMETRIES {
            debug!("Clearing {} cached shift matrices", self.cache.len());
            self.cache.clear();
            self.resets += 1;
        }
        matrix
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of times the cache has been cleared.
    pub fn resets(&self) -> usize {
        self.resets
    }
}
