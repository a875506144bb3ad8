use crate::{Real, window::Window};
use thiserror::Error;
use ucn_common::Microseconds;

#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum HistogramError {
    #[error("Window width {width} is narrower than one bin of {bin_width}")]
    TooNarrow {
        width: Microseconds,
        bin_width: Microseconds,
    },
    #[error("Only {num_bins} bin(s) at the fine bin width {bin_width}")]
    TooFewBins {
        num_bins: usize,
        bin_width: Microseconds,
    },
}

/// Hit counts of one window, binned from the window's first hit.
#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    counts: Vec<u32>,
    offsets: Vec<Microseconds>,
    bin_width: Microseconds,
}

impl Histogram {
    pub const MIN_BINS: usize = 2;

    /// Bins the hits of `window` at `bin_width`.
    /// Each hit lands in `floor((t - start) / bin_width)`, clamped into range,
    /// so the last hit of a window whose width is a whole number of bins is
    /// counted in the final bin.
    pub fn build(
        times: &[Microseconds],
        window: &Window,
        bin_width: Microseconds,
    ) -> Result<Self, HistogramError> {
        let too_narrow = HistogramError::TooNarrow {
            width: window.width,
            bin_width,
        };
        if !(window.width >= bin_width) {
            return Err(too_narrow);
        }
        let num_bins = (window.width / bin_width).ceil() as usize;
        if num_bins < 1 {
            return Err(too_narrow);
        }

        let mut counts = vec![0; num_bins];
        for &t in window.times(times) {
            let bin = (((t - window.start_time) / bin_width).floor().max(0.0) as usize)
                .min(num_bins - 1);
            if let Some(count) = counts.get_mut(bin) {
                *count += 1;
            }
        }
        Ok(Self {
            counts,
            offsets: (0..num_bins).map(|b| b as Real * bin_width).collect(),
            bin_width,
        })
    }

    /// Bins at `bin_width`, retrying once at `fine_bin_width` when that gives
    /// fewer than two bins. A window narrower than one primary bin is not
    /// retried.
    pub fn build_with_fallback(
        times: &[Microseconds],
        window: &Window,
        bin_width: Microseconds,
        fine_bin_width: Microseconds,
    ) -> Result<Self, HistogramError> {
        let histogram = Self::build(times, window, bin_width)?;
        if histogram.num_bins() >= Self::MIN_BINS {
            return Ok(histogram);
        }
        let histogram = Self::build(times, window, fine_bin_width)?;
        if histogram.num_bins() < Self::MIN_BINS {
            return Err(HistogramError::TooFewBins {
                num_bins: histogram.num_bins(),
                bin_width: fine_bin_width,
            });
        }
        Ok(histogram)
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Offset of each bin from the window start, strictly increasing.
    pub fn offsets(&self) -> &[Microseconds] {
        &self.offsets
    }

    pub fn bin_width(&self) -> Microseconds {
        self.bin_width
    }

    pub fn num_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::moving_window;

    #[test]
    fn bins_relative_to_window_start() {
        let times = [100.0, 100.2, 101.5, 102.9, 103.0, 104.5];
        let window = moving_window(&times, 0, 10.0).unwrap();
        let histogram = Histogram::build(&times, &window, 1.0).unwrap();
        assert_eq!(histogram.num_bins(), 5);
        assert_eq!(histogram.counts(), &[2, 1, 1, 1, 1]);
        assert_eq!(histogram.offsets(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(histogram.total(), times.len() as u32);
    }

    #[test]
    fn last_hit_on_bin_edge_is_clamped() {
        let times = [0.0, 1.0, 2.0, 3.0];
        let window = moving_window(&times, 0, 10.0).unwrap();
        let histogram = Histogram::build(&times, &window, 1.0).unwrap();
        assert_eq!(histogram.counts(), &[1, 1, 2]);
    }

    #[test]
    fn narrower_than_one_bin() {
        let times = [5.0, 5.5];
        let window = moving_window(&times, 0, 10.0).unwrap();
        assert_eq!(
            Histogram::build_with_fallback(&times, &window, 1.0, 0.25),
            Err(HistogramError::TooNarrow {
                width: 0.5,
                bin_width: 1.0
            })
        );
    }

    #[test]
    fn single_hit_window_is_too_narrow() {
        let times = [5.0];
        let window = moving_window(&times, 0, 10.0).unwrap();
        assert!(matches!(
            Histogram::build(&times, &window, 0.25),
            Err(HistogramError::TooNarrow { .. })
        ));
    }

    #[test]
    fn falls_back_to_fine_bins() {
        let times = [0.0, 0.3, 0.6, 1.0];
        let window = moving_window(&times, 0, 10.0).unwrap();
        let histogram = Histogram::build_with_fallback(&times, &window, 1.0, 0.25).unwrap();
        assert_eq!(histogram.bin_width(), 0.25);
        assert_eq!(histogram.num_bins(), 4);
        assert_eq!(histogram.counts(), &[1, 1, 1, 1]);
    }

    #[test]
    fn primary_bins_kept_when_sufficient() {
        let times = [0.0, 0.3, 1.7];
        let window = moving_window(&times, 0, 10.0).unwrap();
        let histogram = Histogram::build_with_fallback(&times, &window, 1.0, 0.25).unwrap();
        assert_eq!(histogram.bin_width(), 1.0);
        assert_eq!(histogram.counts(), &[2, 1]);
    }

    #[test]
    fn offsets_strictly_increase() {
        let times: Vec<_> = (0..50).map(|i| i as Real * 0.7).collect();
        let window = moving_window(&times, 0, 10.0).unwrap();
        let histogram = Histogram::build(&times, &window, 0.25).unwrap();
        assert!(histogram.offsets().windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(histogram.total(), 50);
    }
}
