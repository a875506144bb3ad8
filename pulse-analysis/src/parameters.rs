use crate::simulate::SimulationConfig;
use clap::{Args, Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf};
use ucn_common::{Microseconds, RunNumber, Seconds};
use ucn_pulse_fitting::{FitterSettings, optimizer::OptimiserSettings};

#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub(crate) struct Cli {
    /// Address to serve prometheus metrics on, metrics are not exported if omitted
    #[clap(long, env)]
    pub(crate) observability_address: Option<SocketAddr>,

    #[command(subcommand)]
    pub(crate) mode: Mode,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Mode {
    /// Fit the signal and background regions of each run and write the pulses
    /// as CSV. The `Time (s)` column holds pulse times in seconds from the
    /// start of the run.
    Analyse(AnalyseParameters),

    /// Accumulate the response following each isolated pulse
    Tail(TailParameters),

    /// Write a synthetic hit file
    Simulate(SimulateParameters),
}

#[derive(Clone, Debug, Args)]
pub(crate) struct RunSelection {
    /// Folder containing the `PECountsRun<run>.txt` hit files
    #[clap(long, env)]
    pub(crate) data_folder: PathBuf,

    /// Folder the results are written under
    #[clap(long, env, default_value = ".")]
    pub(crate) output_folder: PathBuf,

    /// JSON file of fill, hold and clean times keyed by run number
    #[clap(long, env)]
    pub(crate) run_info: PathBuf,

    /// Text file listing the runs to analyse, one per line
    #[clap(long, env)]
    pub(crate) good_runs: Option<PathBuf>,

    /// First run to analyse
    #[clap(long, env)]
    pub(crate) start_run: RunNumber,

    /// Run after the last run to analyse
    #[clap(long, env)]
    pub(crate) end_run: RunNumber,
}

impl RunSelection {
    pub(crate) fn runs(&self) -> std::ops::Range<RunNumber> {
        self.start_run..self.end_run
    }
}

#[derive(Clone, Debug, Args)]
pub(crate) struct FitParameters {
    /// Histogram bin width in microseconds
    #[clap(long, env, default_value = "1.0")]
    pub(crate) bin_width: Microseconds,

    /// Bin width used when a window gives fewer than two bins
    #[clap(long, env, default_value = "0.25")]
    pub(crate) fine_bin_width: Microseconds,

    /// Largest gap between consecutive hits of the same window, in microseconds
    #[clap(long, env, default_value = "10.0")]
    pub(crate) min_gap: Microseconds,

    /// Likelihood evaluation budget of each minimisation
    #[clap(long, env, default_value = "200")]
    pub(crate) max_evaluations: usize,

    /// Fitted pulses with fewer photoelectrons than this are discarded
    #[clap(long, env, default_value = "5.0")]
    pub(crate) acceptance_threshold: f64,
}

impl FitParameters {
    pub(crate) fn settings(&self) -> FitterSettings {
        let defaults = FitterSettings::default();
        FitterSettings {
            bin_width: self.bin_width,
            fine_bin_width: self.fine_bin_width,
            min_gap: self.min_gap,
            optimiser: OptimiserSettings {
                max_evaluations: self.max_evaluations,
                acceptance_threshold: self.acceptance_threshold,
                ..defaults.optimiser
            },
            ..defaults
        }
    }
}

#[derive(Clone, Debug, Args)]
pub(crate) struct AnalyseParameters {
    #[command(flatten)]
    pub(crate) runs: RunSelection,

    #[command(flatten)]
    pub(crate) fit: FitParameters,

    /// Time after the end of cleaning at which the signal region begins
    #[clap(long, env, default_value = "40.0")]
    pub(crate) delay: Seconds,
}

#[derive(Clone, Debug, Args)]
pub(crate) struct TailParameters {
    #[command(flatten)]
    pub(crate) runs: RunSelection,

    #[command(flatten)]
    pub(crate) fit: FitParameters,

    /// Time after the end of cleaning at which the signal region begins
    #[clap(long, env, default_value = "70.0")]
    pub(crate) delay: Seconds,

    /// Tail histogram bin width in microseconds
    #[clap(long, env, default_value = "0.1", value_parser = positive_time)]
    pub(crate) tail_bin_width: Microseconds,

    /// Extent of the tail after each pulse, in microseconds
    #[clap(long, env, default_value = "75.0", value_parser = positive_time)]
    pub(crate) tail_max_time: Microseconds,
}

fn positive_time(value: &str) -> Result<Microseconds, String> {
    let time: Microseconds = value.parse().map_err(|e| format!("{e}"))?;
    if time.is_finite() && time > 0.0 {
        Ok(time)
    } else {
        Err(format!("{value} is not a positive, finite time"))
    }
}

#[derive(Clone, Debug, Args)]
pub(crate) struct SimulateParameters {
    /// Folder the hit file is written to
    #[clap(long, env)]
    pub(crate) data_folder: PathBuf,

    /// Run number the hit file is named after
    #[clap(long)]
    pub(crate) run: RunNumber,

    /// Length of the run in seconds
    #[clap(long, default_value = "300.0")]
    pub(crate) duration: Seconds,

    /// Mean pulses per second in each segment
    #[clap(long, default_value = "2.0")]
    pub(crate) pulse_rate: f64,

    /// Mean photoelectrons per pulse
    #[clap(long, default_value = "40.0")]
    pub(crate) amplitude_mean: f64,

    /// Standard deviation of the photoelectrons per pulse
    #[clap(long, default_value = "10.0")]
    pub(crate) amplitude_sd: f64,

    /// Mean uncorrelated hits per second in each segment
    #[clap(long, default_value = "20.0")]
    pub(crate) dark_rate: f64,

    /// Seed of the random number generator, drawn from entropy if omitted
    #[clap(long)]
    pub(crate) seed: Option<u64>,
}

impl SimulateParameters {
    pub(crate) fn config(&self) -> SimulationConfig {
        SimulationConfig {
            duration: self.duration,
            pulse_rate: self.pulse_rate,
            amplitude_mean: self.amplitude_mean,
            amplitude_sd: self.amplitude_sd,
            dark_rate: self.dark_rate,
        }
    }
}
