use crate::{
    FitError, FitterConfig, Hit, Real,
    histogram::Histogram,
    hit::hit_times_us,
    lookup::PdfLookup,
    optimizer::PulseOptimiser,
    seeder::seed_pulses,
    window::{GapWindows, Window},
};
use tracing::{Span, debug, info, instrument};
use ucn_common::{MICROSECONDS_PER_SECOND, Microseconds};

/// Length of the background region following its start.
pub const BACKGROUND_WINDOW_LENGTH: Microseconds = 60.0 * MICROSECONDS_PER_SECOND;
/// Rates are quoted per this many seconds, for the signal and background
/// regions alike.
const RATE_PERIOD: Real = 60.0;

/// One fitted photon pulse.
#[derive(Clone, Debug, PartialEq)]
pub struct Pulse {
    pub time: Microseconds,
    /// In photoelectrons.
    pub amplitude: Real,
    /// Running index, within its region, of the window the pulse was fitted in.
    pub window_index: usize,
    pub window_width: Microseconds,
    /// Whether the window held more than one pulse.
    pub pileup: bool,
}

/// Counts of how windows in a region were resolved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WindowStatistics {
    pub windows: usize,
    pub too_narrow: usize,
    pub no_seeds: usize,
    pub optimiser_failed: usize,
    pub all_pruned: usize,
    pub emitted: usize,
}

impl WindowStatistics {
    fn record(&mut self, error: &FitError) {
        match error {
            FitError::Histogram(_) => self.too_narrow += 1,
            FitError::NoSeeds => self.no_seeds += 1,
            FitError::AllPruned { .. } => self.all_pruned += 1,
            FitError::Optimiser(_)
            | FitError::NoBestParameters
            | FitError::DimensionMismatch { .. } => self.optimiser_failed += 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionFit {
    pub pulses: Vec<Pulse>,
    pub statistics: WindowStatistics,
    /// Number of hits in the region.
    pub hits: usize,
}

/// Half-open interval of absolute times.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionBounds {
    pub start: Microseconds,
    pub stop: Microseconds,
}

impl RegionBounds {
    pub fn new(start: Microseconds, stop: Microseconds) -> Self {
        Self { start, stop }
    }

    pub fn contains(&self, time: Microseconds) -> bool {
        self.start <= time && time < self.stop
    }

    /// The sub-slice of sorted `times` inside the bounds.
    pub fn select<'a>(&self, times: &'a [Microseconds]) -> &'a [Microseconds] {
        let first = times.partition_point(|&t| t < self.start);
        let last = times.partition_point(|&t| t < self.stop).max(first);
        times.get(first..last).unwrap_or_default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalysisWindows {
    pub signal: RegionBounds,
    /// Start of the background region, which has no background when `None`
    /// or not positive.
    pub background_start: Option<Microseconds>,
}

impl AnalysisWindows {
    pub fn background(&self) -> Option<RegionBounds> {
        self.background_start
            .filter(|&start| start > 0.0)
            .map(|start| RegionBounds::new(start, start + BACKGROUND_WINDOW_LENGTH))
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitResult {
    pub signal: RegionFit,
    pub background: RegionFit,
    /// Background hits per second.
    pub pe_background_rate: Real,
    /// Background pulses per second.
    pub event_background_rate: Real,
}

/// Fits the hits of one detector segment. Each fitter owns its lookup cache
/// so fitters for different segments can run on different threads.
pub struct PulseFitter<'a> {
    config: &'a FitterConfig,
    lookup: PdfLookup,
}

impl<'a> PulseFitter<'a> {
    pub fn new(config: &'a FitterConfig) -> Self {
        Self {
            config,
            lookup: PdfLookup::new(),
        }
    }

    pub fn lookup(&self) -> &PdfLookup {
        &self.lookup
    }

    /// Fits the signal region and, if configured, the background region of
    /// `hits`, which must be sorted by time.
    #[instrument(skip_all, fields(num_hits = hits.len(), signal_pulses, background_pulses))]
    pub fn analyse(&mut self, hits: &[Hit], windows: &AnalysisWindows) -> FitResult {
        let times = hit_times_us(hits);
        let signal_times = windows.signal.select(&times);
        let background_times = windows
            .background()
            .map(|bounds| bounds.select(&times))
            .unwrap_or_default();
        info!(
            "Signal hits: {}, background hits: {}",
            signal_times.len(),
            background_times.len()
        );

        let signal = self.fit_region(signal_times);
        let background = self.fit_region(background_times);
        info!(
            "Signal pulses: {}, background pulses: {}",
            signal.pulses.len(),
            background.pulses.len()
        );
        Span::current().record("signal_pulses", signal.pulses.len());
        Span::current().record("background_pulses", background.pulses.len());

        FitResult {
            pe_background_rate: background.hits as Real / RATE_PERIOD,
            event_background_rate: background.pulses.len() as Real / RATE_PERIOD,
            signal,
            background,
        }
    }

    /// Walks `times` window by window, fitting each. Windows that cannot be
    /// fitted are counted and skipped.
    #[instrument(skip_all, level = "debug", fields(num_hits = times.len()))]
    pub fn fit_region(&mut self, times: &[Microseconds]) -> RegionFit {
        let mut region = RegionFit {
            hits: times.len(),
            ..Default::default()
        };
        for window in times.gap_windows(self.config.settings().min_gap) {
            region.statistics.windows += 1;
            match self.fit_window(times, &window) {
                Ok(fitted) => {
                    let window_index = region.statistics.emitted;
                    let pileup = fitted.len() > 1;
                    region
                        .pulses
                        .extend(fitted.into_iter().map(|(time, amplitude)| Pulse {
                            time,
                            amplitude,
                            window_index,
                            window_width: window.width,
                            pileup,
                        }));
                    region.statistics.emitted += 1;
                }
                Err(error) => {
                    debug!(start = window.start_time, width = window.width, "Window skipped: {error}");
                    region.statistics.record(&error);
                }
            }
        }
        region
    }

    /// Returns the absolute time and amplitude of each pulse in the window.
    pub fn fit_window(
        &mut self,
        times: &[Microseconds],
        window: &Window,
    ) -> Result<Vec<(Microseconds, Real)>, FitError> {
        let settings = self.config.settings();
        let histogram = Histogram::build_with_fallback(
            times,
            window,
            settings.bin_width,
            settings.fine_bin_width,
        )?;
        let lookup = self.lookup.get(self.config.response(), &histogram);

        let seeds = seed_pulses(histogram.counts(), &settings.seeder);
        let pulses = PulseOptimiser::new(
            histogram.counts(),
            &lookup,
            self.config.log_factorials(),
            &settings.optimiser,
        )
        .fit(&seeds)?
        .pulses;

        Ok(pulses
            .into_iter()
            .map(|pulse| {
                (
                    window.start_time + pulse.offset * histogram.bin_width(),
                    pulse.amplitude,
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lookup::ShiftMatrix,
        response::{ResponseModel, ResponseParameters},
    };

    /// Hits reproducing the rounded response of each `(amplitude, shift)`
    /// pulse in 1us bins from `start`. Hits sit mid-bin, apart from the
    /// first which marks the start of the window.
    fn synthetic_times(
        start: Microseconds,
        num_bins: usize,
        pulses: &[(Real, usize)],
    ) -> Vec<Microseconds> {
        let offsets: Vec<Real> = (0..num_bins).map(|b| b as Real).collect();
        let matrix =
            ShiftMatrix::build(&ResponseModel::new(&ResponseParameters::default()), &offsets);
        let mut times: Vec<Microseconds> = (0..num_bins)
            .flat_map(|b| {
                let count = pulses
                    .iter()
                    .map(|&(amplitude, shift)| amplitude * matrix.row(shift)[b])
                    .sum::<Real>()
                    .round() as usize;
                std::iter::repeat_n(start + b as Real + 0.5, count)
            })
            .collect();
        if let Some(first) = times.first_mut() {
            *first = start;
        }
        times
    }

    fn hits_at(times: &[Microseconds]) -> Vec<Hit> {
        times
            .iter()
            .map(|&t| Hit::new(t / MICROSECONDS_PER_SECOND, 1))
            .collect()
    }

    #[test]
    fn region_bounds_select() {
        let times = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(RegionBounds::new(2.0, 4.0).select(&times), &[2.0, 3.0]);
        assert_eq!(RegionBounds::new(0.0, 10.0).select(&times), &times);
        assert!(RegionBounds::new(6.0, 10.0).select(&times).is_empty());
        assert!(RegionBounds::new(4.0, 2.0).select(&times).is_empty());
        assert!(RegionBounds::new(2.0, 4.0).contains(2.0));
        assert!(!RegionBounds::new(2.0, 4.0).contains(4.0));
    }

    #[test]
    fn background_requires_positive_start() {
        let mut windows = AnalysisWindows {
            signal: RegionBounds::new(0.0, 1.0),
            background_start: None,
        };
        assert_eq!(windows.background(), None);
        windows.background_start = Some(0.0);
        assert_eq!(windows.background(), None);
        windows.background_start = Some(5.0);
        assert_eq!(
            windows.background(),
            Some(RegionBounds::new(5.0, 5.0 + 60e6))
        );
    }

    #[test]
    fn recovers_single_pulse() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);
        let times = synthetic_times(1000.0, 40, &[(100.0, 0)]);
        let region = fitter.fit_region(&times);

        assert_eq!(region.statistics.windows, 1);
        assert_eq!(region.statistics.emitted, 1);
        assert_eq!(region.pulses.len(), 1);
        let pulse = &region.pulses[0];
        assert!((pulse.amplitude - 100.0).abs() < 10.0, "amplitude {}", pulse.amplitude);
        assert!((pulse.time - 1000.0).abs() < 1.0, "time {}", pulse.time);
        assert!(!pulse.pileup);
        assert_eq!(pulse.window_index, 0);
        assert_eq!(pulse.window_width, times[times.len() - 1] - times[0]);
    }

    fn assert_resolves(region: &RegionFit, truth: &[(Real, Microseconds)]) {
        assert_eq!(region.statistics.emitted, 1);
        assert_eq!(region.pulses.len(), truth.len(), "{:?}", region.pulses);
        assert!(region.pulses.iter().all(|p| p.pileup));
        let mut pulses = region.pulses.clone();
        pulses.sort_by(|a, b| a.time.total_cmp(&b.time));
        for (pulse, &(amplitude, time)) in pulses.iter().zip(truth) {
            assert!(
                (pulse.amplitude - amplitude).abs() <= 0.1 * amplitude,
                "amplitude {} for {amplitude}",
                pulse.amplitude
            );
            assert!(
                (pulse.time - time).abs() <= 1.0,
                "time {} for {time}",
                pulse.time
            );
        }
    }

    #[test]
    fn recovers_overlapping_pulses_as_pileup() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);
        let times = synthetic_times(5000.0, 60, &[(100.0, 0), (100.0, 25)]);
        let region = fitter.fit_region(&times);
        assert_resolves(&region, &[(100.0, 5000.0), (100.0, 5025.0)]);
    }

    #[test]
    fn recovers_unequal_overlapping_pulses() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);
        let times = synthetic_times(5000.0, 80, &[(150.0, 0), (50.0, 40)]);
        let region = fitter.fit_region(&times);
        assert_resolves(&region, &[(150.0, 5000.0), (50.0, 5040.0)]);
    }

    #[test]
    fn narrow_windows_are_skipped() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);
        let mut times = vec![10.0, 100.0, 100.1];
        times.extend(synthetic_times(1000.0, 40, &[(100.0, 0)]));
        let region = fitter.fit_region(&times);

        assert_eq!(region.statistics.windows, 3);
        assert_eq!(region.statistics.too_narrow, 2);
        assert_eq!(region.statistics.emitted, 1);
        assert!(region.pulses.iter().all(|p| p.window_index == 0));
    }

    #[test]
    fn window_indices_count_emitted_windows() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);
        let mut times = synthetic_times(1000.0, 40, &[(100.0, 0)]);
        times.push(2000.0);
        times.extend(synthetic_times(3000.0, 40, &[(100.0, 0)]));
        let region = fitter.fit_region(&times);

        assert_eq!(region.statistics.windows, 3);
        assert_eq!(region.statistics.emitted, 2);
        let indices: Vec<_> = region.pulses.iter().map(|p| p.window_index).collect();
        assert_eq!(indices.first(), Some(&0));
        assert_eq!(indices.last(), Some(&1));
        assert_eq!(fitter.lookup().len(), 1);
    }

    #[test]
    fn background_rates() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);

        let signal_start = 100e6;
        let background_start = 300e6;
        let mut times = synthetic_times(signal_start + 1e6, 40, &[(100.0, 0)]);
        times.extend(synthetic_times(background_start + 1e6, 40, &[(100.0, 0)]));
        times.extend(synthetic_times(background_start + 2e6, 40, &[(60.0, 0)]));
        times.push(background_start + 3e6);
        // Past the end of the background region.
        times.extend(synthetic_times(background_start + 61e6, 40, &[(100.0, 0)]));

        let windows = AnalysisWindows {
            signal: RegionBounds::new(signal_start, signal_start + 60e6),
            background_start: Some(background_start),
        };
        let result = fitter.analyse(&hits_at(&times), &windows);

        assert_eq!(result.signal.pulses.len(), 1);
        assert!(result.signal.hits > 0);
        let background_hits = result.background.hits;
        assert_eq!(
            background_hits,
            synthetic_times(0.0, 40, &[(100.0, 0)]).len()
                + synthetic_times(0.0, 40, &[(60.0, 0)]).len()
                + 1
        );
        assert_eq!(result.background.pulses.len(), 2);
        assert_eq!(result.pe_background_rate, background_hits as Real / 60.0);
        assert_eq!(
            result.event_background_rate,
            result.background.pulses.len() as Real / 60.0
        );
    }

    #[test]
    fn no_background_without_start() {
        let config = FitterConfig::default();
        let mut fitter = PulseFitter::new(&config);
        let times = synthetic_times(1e6, 40, &[(100.0, 0)]);
        let windows = AnalysisWindows {
            signal: RegionBounds::new(0.0, 60e6),
            background_start: None,
        };
        let result = fitter.analyse(&hits_at(&times), &windows);
        assert_eq!(result.signal.pulses.len(), 1);
        assert_eq!(result.background, RegionFit::default());
        assert_eq!(result.pe_background_rate, 0.0);
        assert_eq!(result.event_background_rate, 0.0);
    }
}
