use crate::{
    loader::{self, RunHits},
    processing::SegmentResult,
    tail::TailResponse,
};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::info;
use ucn_common::{MICROSECONDS_PER_SECOND, RunNumber};

const PULSE_HEADER: &str = "Segment, Time (s), PE, Event";
const RATE_HEADER: &str =
    "Segment, PE Background Rate, Event Background Rate, Signal Pulses, Background Pulses";

pub(crate) fn results_folder(output_folder: &Path) -> PathBuf {
    output_folder.join("results")
}

pub(crate) fn tail_folder(output_folder: &Path) -> PathBuf {
    output_folder.join("tail")
}

/// One line per pulse, signal pulses flagged with event 1 and background
/// pulses with event 0.
pub(crate) fn write_pulses<W: Write>(mut writer: W, results: &[SegmentResult]) -> std::io::Result<()> {
    writeln!(writer, "{PULSE_HEADER}")?;
    for SegmentResult { segment, result } in results {
        for (pulses, event) in [
            (result.signal.pulses.as_slice(), 1),
            (result.background.pulses.as_slice(), 0),
        ] {
            for pulse in pulses {
                writeln!(
                    writer,
                    "{segment}, {}, {}, {event}",
                    pulse.time / MICROSECONDS_PER_SECOND,
                    pulse.amplitude
                )?;
            }
        }
    }
    Ok(())
}

pub(crate) fn write_rates<W: Write>(mut writer: W, results: &[SegmentResult]) -> std::io::Result<()> {
    writeln!(writer, "{RATE_HEADER}")?;
    for SegmentResult { segment, result } in results {
        writeln!(
            writer,
            "{segment}, {}, {}, {}, {}",
            result.pe_background_rate,
            result.event_background_rate,
            result.signal.pulses.len(),
            result.background.pulses.len()
        )?;
    }
    Ok(())
}

fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.flush()?;
    info!("Written {}", path.display());
    Ok(())
}

/// Writes `PulseAnalysis_<run>.csv` and `PulseRates_<run>.csv` to the
/// results folder.
pub(crate) fn write_run_results(
    output_folder: &Path,
    run: RunNumber,
    results: &[SegmentResult],
) -> std::io::Result<()> {
    let folder = results_folder(output_folder);
    fs::create_dir_all(&folder)?;
    write_file(&folder.join(format!("PulseAnalysis_{run}.csv")), |w| {
        write_pulses(w, results)
    })?;
    write_file(&folder.join(format!("PulseRates_{run}.csv")), |w| {
        write_rates(w, results)
    })
}

/// Writes `tail/<name>.csv`.
pub(crate) fn write_tail_response(
    output_folder: &Path,
    name: &str,
    response: &TailResponse,
) -> std::io::Result<()> {
    let folder = tail_folder(output_folder);
    fs::create_dir_all(&folder)?;
    write_file(&folder.join(format!("{name}.csv")), |w| response.write_csv(w))
}

/// Writes a hit file readable by [loader::load_hits].
pub(crate) fn write_hit_file(
    data_folder: &Path,
    run: RunNumber,
    hits: &RunHits,
) -> std::io::Result<()> {
    fs::create_dir_all(data_folder)?;
    write_file(&loader::hit_file_path(data_folder, run), |w| {
        loader::write_hits(w, hits)
    })
}
