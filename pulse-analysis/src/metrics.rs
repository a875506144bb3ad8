use metrics::{Unit, counter, describe_counter, describe_gauge, gauge};
use ucn_common::{
    Segment,
    metrics::{
        names::{
            EVENT_BACKGROUND_RATE, FAILURES, HITS_LOADED, PE_BACKGROUND_RATE, PULSES_EMITTED,
            RUNS_PROCESSED, WINDOWS_FITTED, WINDOWS_SKIPPED,
        },
        windows_skipped::{self, SkipReason},
    },
};
use ucn_pulse_fitting::{FitResult, WindowStatistics};

pub(crate) fn describe() {
    describe_counter!(RUNS_PROCESSED, Unit::Count, "Number of runs analysed");
    describe_counter!(HITS_LOADED, Unit::Count, "Number of hits loaded from hit files");
    describe_counter!(
        WINDOWS_FITTED,
        Unit::Count,
        "Number of windows which yielded pulses"
    );
    describe_counter!(
        WINDOWS_SKIPPED,
        Unit::Count,
        "Number of windows which yielded no pulses"
    );
    describe_counter!(PULSES_EMITTED, Unit::Count, "Number of pulses fitted");
    describe_counter!(FAILURES, Unit::Count, "Number of failures encountered");
    describe_gauge!(
        PE_BACKGROUND_RATE,
        "Background photoelectron hits per second of the last run"
    );
    describe_gauge!(
        EVENT_BACKGROUND_RATE,
        "Background pulses per second of the last run"
    );
}

fn record_windows(segment: &'static str, region: &'static str, statistics: &WindowStatistics) {
    let labels = [("segment", segment), ("region", region)];
    counter!(WINDOWS_FITTED, &labels).increment(statistics.emitted as u64);
    for (reason, count) in [
        (SkipReason::TooNarrow, statistics.too_narrow),
        (SkipReason::NoSeeds, statistics.no_seeds),
        (SkipReason::OptimiserFailed, statistics.optimiser_failed),
        (SkipReason::AllPruned, statistics.all_pruned),
    ] {
        counter!(
            WINDOWS_SKIPPED,
            &[labels[0], labels[1], windows_skipped::get_label(reason)]
        )
        .increment(count as u64);
    }
}

pub(crate) fn record_segment(segment: Segment, result: &FitResult) {
    let label: &'static str = segment.into();
    record_windows(label, "signal", &result.signal.statistics);
    record_windows(label, "background", &result.background.statistics);
    counter!(PULSES_EMITTED, &[("segment", label), ("region", "signal")])
        .increment(result.signal.pulses.len() as u64);
    counter!(PULSES_EMITTED, &[("segment", label), ("region", "background")])
        .increment(result.background.pulses.len() as u64);
    gauge!(PE_BACKGROUND_RATE, &[("segment", label)]).set(result.pe_background_rate);
    gauge!(EVENT_BACKGROUND_RATE, &[("segment", label)]).set(result.event_background_rate);
}
