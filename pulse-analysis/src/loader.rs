use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};
use strum::IntoEnumIterator;
use thiserror::Error;
use tracing::{debug, instrument};
use ucn_common::{NUM_SEGMENTS, RunNumber, Segment};
use ucn_pulse_fitting::Hit;

#[derive(Debug, Error)]
pub(crate) enum LoaderError {
    #[error("IO Error: {0}")]
    IO(#[from] std::io::Error),
    #[error("Line {line}: expected at least 3 fields, found {found}")]
    MissingFields { line: usize, found: usize },
    #[error("Line {line}: invalid {field} '{value}'")]
    InvalidField {
        line: usize,
        field: &'static str,
        value: String,
    },
}

pub(crate) fn hit_file_path(folder: &Path, run: RunNumber) -> PathBuf {
    folder.join(format!("PECountsRun{run}.txt"))
}

/// The hits of one run, split by segment and sorted by time.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct RunHits {
    segments: [Vec<Hit>; NUM_SEGMENTS],
}

impl RunHits {
    /// Assigns each hit to the segment its channel is wired to, dropping hits
    /// on other channels.
    pub(crate) fn from_hits(hits: impl IntoIterator<Item = Hit>) -> Self {
        let mut run = Self::default();
        for hit in hits {
            if let Some(segment) = Segment::from_channel(hit.channel) {
                run.segments[segment.index()].push(hit);
            }
        }
        for hits in &mut run.segments {
            hits.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
        run
    }

    pub(crate) fn segment(&self, segment: Segment) -> &[Hit] {
        &self.segments[segment.index()]
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Segment, &[Hit])> {
        Segment::iter().map(|segment| (segment, self.segment(segment)))
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_field<T: std::str::FromStr>(
    line: usize,
    field: &'static str,
    value: &str,
) -> Result<T, LoaderError> {
    value.parse().map_err(|_| LoaderError::InvalidField {
        line,
        field,
        value: value.to_owned(),
    })
}

/// Parses one line of a hit file:
/// `<segment>, <time (s)>, <channel>[, <edge>, <tag>, <full>, <raw ticks>]`.
/// The segment label is informational, the channel decides the segment.
fn parse_hit(line: usize, text: &str) -> Result<Hit, LoaderError> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() < 3 {
        return Err(LoaderError::MissingFields {
            line,
            found: fields.len(),
        });
    }
    let optional = |index: usize, name: &'static str| -> Result<Option<i64>, LoaderError> {
        fields
            .get(index)
            .map(|value| parse_field(line, name, value))
            .transpose()
    };
    let time: f64 = parse_field(line, "time", fields[1])?;
    if !time.is_finite() {
        return Err(LoaderError::InvalidField {
            line,
            field: "time",
            value: fields[1].to_owned(),
        });
    }
    Ok(Hit {
        time,
        channel: parse_field(line, "channel", fields[2])?,
        edge: optional(3, "edge")?.unwrap_or_default() as i32,
        tag: optional(4, "tag")?.unwrap_or_default() as i32,
        full: optional(5, "full")?.unwrap_or_default() as i32,
        raw_ticks: optional(6, "raw ticks")?.unwrap_or_default() as u64,
    })
}

pub(crate) fn read_hits<R: BufRead>(reader: R) -> Result<RunHits, LoaderError> {
    let mut hits = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        hits.push(parse_hit(index + 1, &line)?);
    }
    Ok(RunHits::from_hits(hits))
}

#[instrument(skip_all, fields(path = %path.display()))]
pub(crate) fn load_hits(path: &Path) -> Result<RunHits, LoaderError> {
    let hits = read_hits(BufReader::new(File::open(path)?))?;
    debug!("Loaded {} hits", hits.len());
    Ok(hits)
}

/// Writes hits in the format read by [read_hits], segment by segment.
pub(crate) fn write_hits<W: Write>(mut writer: W, hits: &RunHits) -> std::io::Result<()> {
    for (segment, hits) in hits.iter() {
        for hit in hits {
            writeln!(
                writer,
                "{segment}, {}, {}, {}, {}, {}, {}",
                hit.time, hit.channel, hit.edge, hit.tag, hit.full, hit.raw_ticks
            )?;
        }
    }
    Ok(())
}
