use crate::Real;

/// Initial guess for one pulse, offset in bins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Seed {
    pub amplitude: Real,
    pub offset: Real,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeederSettings {
    /// Leading bins excluded from the gradient scan.
    pub skip_bins: usize,
    /// Gradient threshold in units of the gradient's root mean square.
    pub threshold_factor: Real,
    /// Bins summed from a candidate to form its amplitude guess.
    pub sum_bins: usize,
    pub min_amplitude: Real,
    /// Always tried first, whatever the gradient shows.
    pub default_seed: Seed,
}

impl Default for SeederSettings {
    fn default() -> Self {
        Self {
            skip_bins: 3,
            threshold_factor: 2.0,
            sum_bins: 5,
            min_amplitude: 5.0,
            default_seed: Seed {
                amplitude: 20.0,
                offset: 0.0,
            },
        }
    }
}

/// Bins at which the central-difference gradient of `counts` exceeds
/// `threshold_factor` times its root mean square.
///
/// The gradient is taken from bin `skip_bins` onwards into a buffer of
/// `counts.len() - skip_bins` slots, the last of which stays zero. Peaks are
/// looked for in the buffer's interior only.
pub fn gradient_peaks(counts: &[u32], threshold_factor: Real, skip_bins: usize) -> Vec<usize> {
    if counts.len() <= skip_bins + 2 {
        return Vec::new();
    }

    let mut gradient = vec![0.0; counts.len() - skip_bins];
    for i in skip_bins.max(1)..counts.len() - 1 {
        gradient[i - skip_bins] = (counts[i + 1] as Real - counts[i - 1] as Real) / 2.0;
    }

    let rms = (gradient.iter().map(|g| g * g).sum::<Real>() / gradient.len() as Real).sqrt();
    let threshold = threshold_factor * rms;

    (1..gradient.len() - 1)
        .filter(|&p| gradient[p] > threshold)
        .map(|p| p + skip_bins)
        .collect()
}

/// Proposes seeds for a histogram: the default seed followed by every
/// gradient peak whose summed counts reach the minimum amplitude.
pub fn seed_pulses(counts: &[u32], settings: &SeederSettings) -> Vec<Seed> {
    let peaks = gradient_peaks(counts, settings.threshold_factor, settings.skip_bins);
    std::iter::once(settings.default_seed)
        .chain(peaks.into_iter().map(|bin| {
            let end = (bin + settings.sum_bins).min(counts.len());
            Seed {
                amplitude: counts[bin..end].iter().sum::<u32>() as Real,
                offset: bin as Real,
            }
        }))
        .filter(|seed| seed.amplitude >= settings.min_amplitude)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_histograms_have_no_peaks() {
        assert!(gradient_peaks(&[], 2.0, 3).is_empty());
        assert!(gradient_peaks(&[0, 9, 0, 9, 0], 2.0, 3).is_empty());
    }

    #[test]
    fn single_spike() {
        let mut counts = vec![1; 30];
        counts[15] = 40;
        // The gradient peaks one bin before the spike.
        assert_eq!(gradient_peaks(&counts, 2.0, 3), vec![14]);
    }

    #[test]
    fn broad_rise_gives_adjacent_peaks() {
        let mut counts = vec![1; 30];
        counts[15] = 40;
        counts[16] = 30;
        counts[17] = 20;
        assert_eq!(gradient_peaks(&counts, 2.0, 3), vec![14, 15]);
    }

    #[test]
    fn peaks_before_skip_are_ignored() {
        let mut counts = vec![0; 30];
        counts[2] = 50;
        assert!(gradient_peaks(&counts, 2.0, 3).is_empty());
    }

    #[test]
    fn flat_histogram_has_no_peaks() {
        assert!(gradient_peaks(&[7; 40], 2.0, 3).is_empty());
    }

    #[test]
    fn default_seed_comes_first() {
        let mut counts = vec![1; 30];
        counts[15] = 40;
        let seeds = seed_pulses(&counts, &SeederSettings::default());
        assert_eq!(
            seeds,
            vec![
                Seed {
                    amplitude: 20.0,
                    offset: 0.0
                },
                Seed {
                    amplitude: 1.0 + 40.0 + 1.0 + 1.0 + 1.0,
                    offset: 14.0
                },
            ]
        );
    }

    #[test]
    fn weak_candidates_are_discarded() {
        let mut counts = vec![0; 30];
        counts[15] = 4;
        assert_eq!(gradient_peaks(&counts, 2.0, 3), vec![14]);
        let seeds = seed_pulses(&counts, &SeederSettings::default());
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].offset, 0.0);
    }

    #[test]
    fn candidate_sum_truncated_at_end() {
        let mut counts = vec![0; 12];
        counts[10] = 30;
        counts[11] = 30;
        let seeds = seed_pulses(&counts, &SeederSettings::default());
        let last = seeds.last().unwrap();
        assert_eq!(seeds.len(), 3);
        assert_eq!(last.offset, 10.0);
        assert_eq!(last.amplitude, 60.0);
    }
}
