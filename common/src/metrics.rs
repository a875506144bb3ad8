use metrics::{describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "ucn_pulse_analysis_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub mod names {
    use const_format::concatcp;

    pub const METRIC_NAME_PREFIX: &str = "ucn_pulse_analysis_";

    pub const FAILURES: &str = concatcp!(METRIC_NAME_PREFIX, "failures");
    pub const RUNS_PROCESSED: &str = concatcp!(METRIC_NAME_PREFIX, "runs_processed");
    pub const HITS_LOADED: &str = concatcp!(METRIC_NAME_PREFIX, "hits_loaded");
    pub const WINDOWS_FITTED: &str = concatcp!(METRIC_NAME_PREFIX, "windows_fitted");
    pub const WINDOWS_SKIPPED: &str = concatcp!(METRIC_NAME_PREFIX, "windows_skipped");
    pub const PULSES_EMITTED: &str = concatcp!(METRIC_NAME_PREFIX, "pulses_emitted");
    pub const PE_BACKGROUND_RATE: &str = concatcp!(METRIC_NAME_PREFIX, "pe_background_rate");
    pub const EVENT_BACKGROUND_RATE: &str =
        concatcp!(METRIC_NAME_PREFIX, "event_background_rate");
}

pub mod windows_skipped {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum SkipReason {
        TooNarrow,
        NoSeeds,
        OptimiserFailed,
        AllPruned,
    }

    // Label building function
    pub fn get_label(reason: SkipReason) -> (&'static str, &'static str) {
        (
            "skip_reason",
            match reason {
                SkipReason::TooNarrow => "too_narrow",
                SkipReason::NoSeeds => "no_seeds",
                SkipReason::OptimiserFailed => "optimiser_failed",
                SkipReason::AllPruned => "all_pruned",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        FileWriteFailed,
        HitFileMissing,
        HitFileInvalid,
        RunNotSelected,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::FileWriteFailed => "file_write_failed",
                FailureKind::HitFileMissing => "hit_file_missing",
                FailureKind::HitFileInvalid => "hit_file_invalid",
                FailureKind::RunNotSelected => "run_not_selected",
            },
        )
    }
}
