mod loader;
mod metrics;
mod output;
mod parameters;
mod processing;
mod run_info;
mod simulate;
mod tail;

use anyhow::Result;
use clap::Parser;
use loader::{LoaderError, RunHits};
use metrics_exporter_prometheus::PrometheusBuilder;
use parameters::{AnalyseParameters, Cli, Mode, RunSelection, SimulateParameters, TailParameters};
use rand::{SeedableRng, rngs::StdRng};
use run_info::{GoodRuns, RunInfoTable};
use tail::TailResponse;
use tracing::{error, info, info_span, level_filters::LevelFilter, warn};
use ucn_common::{
    RunNumber, Seconds,
    init_tracer,
    metrics::{
        component_info_metric,
        failures::{self, FailureKind},
        names::{FAILURES, HITS_LOADED, RUNS_PROCESSED},
    },
    tracer::TracerOptions,
};
use ucn_pulse_fitting::{AnalysisWindows, FitterConfig, ResponseModel, ResponseParameters};

fn main() -> Result<()> {
    let _tracer = init_tracer!(TracerOptions::new(LevelFilter::INFO));

    let args = Cli::parse();

    if let Some(address) = args.observability_address {
        PrometheusBuilder::new()
            .with_http_listener(address)
            .install()?;
        info!("Serving metrics on {address}");
    }
    metrics::describe();
    component_info_metric("ucn-pulse-analysis");

    match args.mode {
        Mode::Analyse(parameters) => run_analysis(&parameters),
        Mode::Tail(parameters) => run_tail(&parameters),
        Mode::Simulate(parameters) => run_simulation(&parameters),
    }
}

fn count_failure(kind: FailureKind) {
    ::metrics::counter!(FAILURES, &[failures::get_label(kind)]).increment(1);
}

/// The run metadata shared by every run of a selection.
struct RunCatalogue<'a> {
    selection: &'a RunSelection,
    run_info: RunInfoTable,
    good_runs: Option<GoodRuns>,
}

impl<'a> RunCatalogue<'a> {
    fn load(selection: &'a RunSelection) -> Result<Self> {
        let run_info = RunInfoTable::load(&selection.run_info)?;
        info!("Loaded run info for {} runs", run_info.len());
        let good_runs = selection
            .good_runs
            .as_deref()
            .map(GoodRuns::load)
            .transpose()?;
        if let Some(good_runs) = &good_runs {
            info!("Loaded {} good runs", good_runs.len());
        }
        Ok(Self {
            selection,
            run_info,
            good_runs,
        })
    }

    /// Loads the hits of `run` and works out its analysis windows, or logs
    /// why the run is skipped.
    fn prepare(&self, run: RunNumber, delay: Seconds) -> Option<(RunHits, AnalysisWindows)> {
        if self.good_runs.as_ref().is_some_and(|good| !good.contains(run)) {
            warn!("Run {run} is not a good run, skipping");
            count_failure(FailureKind::RunNotSelected);
            return None;
        }
        let Some(info) = self.run_info.get(run) else {
            warn!("No run info for run {run}, skipping");
            count_failure(FailureKind::RunNotSelected);
            return None;
        };
        if !info.is_production() {
            info!("Run {run} is not a production run, skipping");
            return None;
        }

        let path = loader::hit_file_path(&self.selection.data_folder, run);
        let hits = match loader::load_hits(&path) {
            Ok(hits) if hits.is_empty() => {
                warn!("Hit file {} is empty, skipping", path.display());
                count_failure(FailureKind::HitFileMissing);
                return None;
            }
            Ok(hits) => hits,
            Err(LoaderError::IO(e)) => {
                warn!("Cannot read hit file {}: {e}", path.display());
                count_failure(FailureKind::HitFileMissing);
                return None;
            }
            Err(e) => {
                error!("Invalid hit file {}: {e}", path.display());
                count_failure(FailureKind::HitFileInvalid);
                return None;
            }
        };
        ::metrics::counter!(RUNS_PROCESSED).increment(1);
        ::metrics::counter!(HITS_LOADED).increment(hits.len() as u64);
        Some((hits, info.analysis_windows(delay)))
    }
}

fn run_analysis(parameters: &AnalyseParameters) -> Result<()> {
    let config = FitterConfig::new(&ResponseParameters::default(), parameters.fit.settings())?;
    let catalogue = RunCatalogue::load(&parameters.runs)?;

    for run in parameters.runs.runs() {
        let _guard = info_span!("run", run).entered();
        let Some((hits, windows)) = catalogue.prepare(run, parameters.delay) else {
            continue;
        };
        let results = processing::fit_segments(run, &hits, &config, &windows);
        if let Err(e) = output::write_run_results(&parameters.runs.output_folder, run, &results) {
            error!("Failed to write results of run {run}: {e}");
            count_failure(FailureKind::FileWriteFailed);
        }
    }
    Ok(())
}

fn run_tail(parameters: &TailParameters) -> Result<()> {
    let config = FitterConfig::new(&ResponseParameters::default(), parameters.fit.settings())?;
    let catalogue = RunCatalogue::load(&parameters.runs)?;
    let output_folder = &parameters.runs.output_folder;

    let mut summed = TailResponse::new(parameters.tail_bin_width, parameters.tail_max_time);
    for run in parameters.runs.runs() {
        let _guard = info_span!("run", run).entered();
        let Some((hits, windows)) = catalogue.prepare(run, parameters.delay) else {
            continue;
        };
        let results = processing::fit_segments(run, &hits, &config, &windows);

        let mut response = TailResponse::new(parameters.tail_bin_width, parameters.tail_max_time);
        response.accumulate_run(&hits, &results);
        info!("Tail of run {run} holds {} hits", response.total());
        summed.add(&response);
        if let Err(e) =
            output::write_tail_response(output_folder, &format!("tail_response_{run}"), &response)
        {
            error!("Failed to write tail response of run {run}: {e}");
            count_failure(FailureKind::FileWriteFailed);
        }
    }

    let runs = parameters.runs.runs();
    let name = format!("summed_tail_response_{}_{}", runs.start, runs.end);
    output::write_tail_response(output_folder, &name, &summed)?;
    info!("Summed tail holds {} hits", summed.total());
    Ok(())
}

fn run_simulation(parameters: &SimulateParameters) -> Result<()> {
    let mut rng = match parameters.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let model = ResponseModel::new(&ResponseParameters::default());
    let (hits, pulses) = simulate::simulate(&mut rng, &parameters.config(), &model)?;
    info!(
        "Simulated {} pulses with {} hits for run {}",
        pulses.len(),
        hits.len(),
        parameters.run
    );
    output::write_hit_file(&parameters.data_folder, parameters.run, &hits)?;
    Ok(())
}
