use crate::{loader::RunHits, metrics};
use rayon::prelude::*;
use strum::IntoEnumIterator;
use tracing::{Span, info, info_span, instrument};
use ucn_common::{RunNumber, Segment};
use ucn_pulse_fitting::{AnalysisWindows, FitResult, FitterConfig, PulseFitter};

pub(crate) struct SegmentResult {
    pub(crate) segment: Segment,
    pub(crate) result: FitResult,
}

/// Fits every segment of a run in parallel. Each segment gets its own fitter,
/// and so its own lookup cache, while `config` is shared.
#[instrument(skip_all, fields(run = run, num_hits = hits.len(), num_pulses))]
pub(crate) fn fit_segments(
    run: RunNumber,
    hits: &RunHits,
    config: &FitterConfig,
    windows: &AnalysisWindows,
) -> Vec<SegmentResult> {
    let parent = Span::current();
    let results: Vec<SegmentResult> = Segment::iter()
        .collect::<Vec<_>>()
        .par_iter()
        .map(|&segment| {
            info_span!(parent: &parent, "segment", segment = %segment).in_scope(|| {
                let result = PulseFitter::new(config).analyse(hits.segment(segment), windows);
                SegmentResult { segment, result }
            })
        })
        .collect();

    for SegmentResult { segment, result } in &results {
        info!(
            "Segment {segment}: {} signal pulses, {} background pulses, {:.3} PE/s, {:.3} events/s",
            result.signal.pulses.len(),
            result.background.pulses.len(),
            result.pe_background_rate,
            result.event_background_rate
        );
        metrics::record_segment(*segment, result);
    }
    Span::current().record(
        "num_pulses",
        results
            .iter()
            .map(|r| r.result.signal.pulses.len() + r.result.background.pulses.len())
            .sum::<usize>(),
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use ucn_pulse_fitting::{Hit, RegionBounds};

    fn burst(start: f64, channel: i32) -> Vec<Hit> {
        // A decaying burst of 60 hits over about 30us.
        (0..60)
            .map(|i| {
                let offset = (i as f64 / 60.0).powi(2) * 30.0;
                Hit::new((start + offset) * 1e-6, channel)
            })
            .collect()
    }

    #[test]
    fn segments_are_fitted_independently() {
        let mut hits = burst(1e6, 1);
        hits.extend(burst(2e6, 13));
        hits.extend(burst(3e6, 14));
        let hits = RunHits::from_hits(hits);
        let windows = AnalysisWindows {
            signal: RegionBounds::new(0.0, 60e6),
            background_start: None,
        };
        let config = FitterConfig::default();
        let results = fit_segments(1, &hits, &config, &windows);

        assert_eq!(results.len(), 4);
        let segments: Vec<_> = results.iter().map(|r| r.segment).collect();
        assert_eq!(segments, Segment::iter().collect::<Vec<_>>());
        for SegmentResult { segment, result } in &results {
            assert_eq!(result.signal.hits, hits.segment(*segment).len());
            assert!(result.signal.pulses.iter().all(|p| p.amplitude >= 5.0));
        }
        assert_eq!(results[1].result.signal.statistics.windows, 0);
        assert_eq!(results[3].result.signal.statistics.windows, 2);
    }

    #[test]
    fn simulated_photoelectrons_are_recovered() {
        use crate::simulate::{SimulationConfig, simulate};
        use rand::{SeedableRng, rngs::StdRng};
        use ucn_pulse_fitting::{ResponseModel, ResponseParameters};

        let simulation = SimulationConfig {
            duration: 5.0,
            pulse_rate: 4.0,
            amplitude_mean: 40.0,
            amplitude_sd: 5.0,
            dark_rate: 0.0,
        };
        let model = ResponseModel::new(&ResponseParameters::default());
        let (hits, pulses) = simulate(&mut StdRng::seed_from_u64(2024), &simulation, &model).unwrap();
        let windows = AnalysisWindows {
            signal: RegionBounds::new(0.0, 6e6),
            background_start: None,
        };
        let results = fit_segments(7, &hits, &FitterConfig::default(), &windows);

        let simulated: f64 = pulses.iter().map(|p| p.photoelectrons as f64).sum();
        let fitted: f64 = results
            .iter()
            .flat_map(|r| &r.result.signal.pulses)
            .map(|p| p.amplitude)
            .sum();
        assert!(
            (0.7..1.2).contains(&(fitted / simulated)),
            "fitted {fitted} of {simulated} photoelectrons"
        );
    }
}
