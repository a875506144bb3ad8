use crate::{loader::RunHits, processing::SegmentResult};
use itertools::Itertools;
use std::io::Write;
use strum::IntoEnumIterator;
use ucn_common::{Microseconds, NUM_SEGMENTS, Segment};
use ucn_pulse_fitting::{Pulse, hit::hit_times_us};

/// Histogram of hit times following isolated pulses, showing the shape of
/// the detector response beyond the fitted window.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TailHistogram {
    bin_width: Microseconds,
    max_time: Microseconds,
    counts: Vec<f64>,
}

impl TailHistogram {
    pub(crate) fn new(bin_width: Microseconds, max_time: Microseconds) -> Self {
        let num_bins = (max_time / bin_width).ceil().max(0.0) as usize;
        Self {
            bin_width,
            max_time,
            counts: vec![0.0; num_bins],
        }
    }

    /// Adds every hit in `times` falling within `max_time` after each
    /// non-pileup pulse. `times` must be sorted.
    pub(crate) fn accumulate(&mut self, pulses: &[Pulse], times: &[Microseconds]) {
        let Some(last_bin) = self.counts.len().checked_sub(1) else {
            return;
        };
        for pulse in pulses.iter().filter(|pulse| !pulse.pileup) {
            let first = times.partition_point(|&t| t < pulse.time);
            let last = times.partition_point(|&t| t - pulse.time < self.max_time);
            for &t in times.get(first..last).unwrap_or_default() {
                let bin = (((t - pulse.time) / self.bin_width) as usize).min(last_bin);
                self.counts[bin] += 1.0;
            }
        }
    }

    pub(crate) fn add(&mut self, other: &TailHistogram) {
        for (count, other) in self.counts.iter_mut().zip(&other.counts) {
            *count += other;
        }
    }

    pub(crate) fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub(crate) fn total(&self) -> f64 {
        self.counts.iter().sum()
    }
}

/// One tail histogram per segment.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct TailResponse {
    bin_width: Microseconds,
    segments: [TailHistogram; NUM_SEGMENTS],
}

impl TailResponse {
    pub(crate) fn new(bin_width: Microseconds, max_time: Microseconds) -> Self {
        Self {
            bin_width,
            segments: std::array::from_fn(|_| TailHistogram::new(bin_width, max_time)),
        }
    }

    pub(crate) fn segment(&self, segment: Segment) -> &TailHistogram {
        &self.segments[segment.index()]
    }

    pub(crate) fn segment_mut(&mut self, segment: Segment) -> &mut TailHistogram {
        &mut self.segments[segment.index()]
    }

    /// Adds the tails following the signal pulses of one run.
    pub(crate) fn accumulate_run(&mut self, hits: &RunHits, results: &[SegmentResult]) {
        for SegmentResult { segment, result } in results {
            let times = hit_times_us(hits.segment(*segment));
            self.segment_mut(*segment)
                .accumulate(&result.signal.pulses, &times);
        }
    }

    /// Hits accumulated over all segments.
    pub(crate) fn total(&self) -> f64 {
        self.segments.iter().map(TailHistogram::total).sum()
    }

    pub(crate) fn add(&mut self, other: &TailResponse) {
        for (tail, other) in self.segments.iter_mut().zip(&other.segments) {
            tail.add(other);
        }
    }

    pub(crate) fn write_csv<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(
            writer,
            "Time(us),{}",
            Segment::iter().map(|segment| format!("Segment_{segment}")).join(",")
        )?;
        let num_bins = self.segments[0].counts.len();
        for bin in 0..num_bins {
            writeln!(
                writer,
                "{},{}",
                bin as f64 * self.bin_width,
                self.segments.iter().map(|tail| tail.counts[bin]).join(",")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(time: Microseconds, pileup: bool) -> Pulse {
        Pulse {
            time,
            amplitude: 20.0,
            window_index: 0,
            window_width: 10.0,
            pileup,
        }
    }

    #[test]
    fn default_binning() {
        assert_eq!(TailHistogram::new(0.1, 75.0).counts().len(), 750);
        assert_eq!(TailHistogram::new(0.5, 2.0).counts().len(), 4);
    }

    #[test]
    fn accumulates_hits_after_isolated_pulses() {
        let mut tail = TailHistogram::new(0.5, 2.0);
        let times = [99.0, 100.0, 100.25, 100.5, 101.75, 102.0, 110.0, 110.5];
        tail.accumulate(&[pulse(100.0, false), pulse(110.0, true)], &times);
        assert_eq!(tail.counts(), &[2.0, 1.0, 0.0, 1.0]);
        assert_eq!(tail.total(), 4.0);
    }

    #[test]
    fn overlapping_tails_count_twice() {
        let mut tail = TailHistogram::new(0.5, 2.0);
        let times = [100.0, 101.0, 101.25];
        tail.accumulate(&[pulse(100.0, false), pulse(101.0, false)], &times);
        assert_eq!(tail.counts(), &[3.0, 0.0, 2.0, 0.0]);
    }

    #[test]
    fn responses_sum() {
        let mut first = TailResponse::new(0.5, 2.0);
        first
            .segment_mut(Segment::Pmt34)
            .accumulate(&[pulse(0.0, false)], &[0.0, 1.0]);
        let mut total = TailResponse::new(0.5, 2.0);
        total.add(&first);
        total.add(&first);
        assert_eq!(total.segment(Segment::Pmt34).counts(), &[2.0, 0.0, 2.0, 0.0]);
        assert_eq!(total.segment(Segment::Pmt12).total(), 0.0);
        assert_eq!(first.total(), 2.0);
        assert_eq!(total.total(), 4.0);
    }

    #[test]
    fn run_uses_signal_pulses_of_each_segment() {
        use ucn_pulse_fitting::{FitResult, Hit, RegionFit};

        let hits = RunHits::from_hits([
            Hit::new(0.000_100, 3),
            Hit::new(0.000_101, 4),
            Hit::new(0.000_100, 1),
            Hit::new(0.000_200, 4),
        ]);
        let results = vec![SegmentResult {
            segment: Segment::Pmt34,
            result: FitResult {
                signal: RegionFit {
                    pulses: vec![pulse(99.75, false)],
                    ..Default::default()
                },
                background: RegionFit {
                    pulses: vec![pulse(200.0, false)],
                    ..Default::default()
                },
                ..Default::default()
            },
        }];
        let mut response = TailResponse::new(0.5, 2.0);
        response.accumulate_run(&hits, &results);
        assert_eq!(response.segment(Segment::Pmt34).counts(), &[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(response.segment(Segment::Pmt12).total(), 0.0);
    }

    #[test]
    fn csv_layout() {
        let mut response = TailResponse::new(0.5, 1.0);
        response
            .segment_mut(Segment::Pmt1314)
            .accumulate(&[pulse(0.0, false)], &[0.0, 0.75]);
        let mut buffer = Vec::new();
        response.write_csv(&mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "Time(us),Segment_12,Segment_34,Segment_56,Segment_78\n0,0,0,0,1\n0.5,0,0,0,1\n"
        );
    }
}
