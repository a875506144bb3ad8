use serde::Deserialize;
use std::{
    collections::{HashMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use ucn_common::{MICROSECONDS_PER_SECOND, RunNumber, Seconds};
use ucn_pulse_fitting::{AnalysisWindows, RegionBounds};

/// Length of the counting period following the delay.
const SIGNAL_LENGTH: Seconds = 60.0;
/// Gap between the end of the counting period and the start of the
/// background period.
const BACKGROUND_GAP: Seconds = 50.0;

#[derive(Debug, Error)]
pub(crate) enum RunInfoError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid run info: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid run number '{value}' on line {line}")]
    InvalidRunNumber { line: usize, value: String },
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RunType {
    Production,
    #[default]
    #[serde(other)]
    Other,
}

/// Cycle timing of one run, in seconds from the start of the run.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub(crate) struct RunInfo {
    pub(crate) fill_time: Seconds,
    pub(crate) hold_time: Seconds,
    pub(crate) clean_time: Seconds,
    #[serde(default)]
    pub(crate) run_type: RunType,
}

impl RunInfo {
    pub(crate) fn is_production(&self) -> bool {
        self.run_type == RunType::Production
    }

    /// The counting period starts `delay` seconds after cleaning ends, and
    /// the background period starts shortly after it finishes.
    pub(crate) fn analysis_windows(&self, delay: Seconds) -> AnalysisWindows {
        let start = self.fill_time + self.hold_time + self.clean_time + delay;
        let stop = start + SIGNAL_LENGTH;
        let background_start = stop + BACKGROUND_GAP;
        AnalysisWindows {
            signal: RegionBounds::new(
                start * MICROSECONDS_PER_SECOND,
                stop * MICROSECONDS_PER_SECOND,
            ),
            background_start: Some(background_start * MICROSECONDS_PER_SECOND),
        }
    }
}

/// Run info keyed by run number.
#[derive(Debug, Default)]
pub(crate) struct RunInfoTable(HashMap<String, RunInfo>);

impl RunInfoTable {
    pub(crate) fn parse(json: &str) -> Result<Self, RunInfoError> {
        Ok(Self(serde_json::from_str(json)?))
    }

    pub(crate) fn load(path: &Path) -> Result<Self, RunInfoError> {
        let json = fs::read_to_string(path).map_err(|source| RunInfoError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&json)
    }

    pub(crate) fn get(&self, run: RunNumber) -> Option<&RunInfo> {
        self.0.get(&run.to_string())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Runs which passed data-quality checks.
#[derive(Debug, Default)]
pub(crate) struct GoodRuns(HashSet<RunNumber>);

impl GoodRuns {
    /// One run number per line. Blank lines and anything after a `#` are
    /// ignored.
    pub(crate) fn parse(text: &str) -> Result<Self, RunInfoError> {
        let mut runs = HashSet::new();
        for (index, line) in text.lines().enumerate() {
            let value = line.split('#').next().unwrap_or_default().trim();
            if value.is_empty() {
                continue;
            }
            let run = value
                .parse()
                .map_err(|_| RunInfoError::InvalidRunNumber {
                    line: index + 1,
                    value: value.to_owned(),
                })?;
            runs.insert(run);
        }
        Ok(Self(runs))
    }

    pub(crate) fn load(path: &Path) -> Result<Self, RunInfoError> {
        let text = fs::read_to_string(path).map_err(|source| RunInfoError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&text)
    }

    pub(crate) fn contains(&self, run: RunNumber) -> bool {
        self.0.contains(&run)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}
