use ucn_common::{Channel, MICROSECONDS_PER_SECOND, Microseconds, Seconds};

/// A single photoelectron hit as recorded by the multichannel scaler.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Hit {
    /// Time since the start of the run.
    pub time: Seconds,
    pub channel: Channel,
    pub edge: i32,
    pub tag: i32,
    pub full: i32,
    /// Undecoded timestamp, in scaler ticks.
    pub raw_ticks: u64,
}

impl Hit {
    pub fn new(time: Seconds, channel: Channel) -> Self {
        Self {
            time,
            channel,
            ..Default::default()
        }
    }

    pub fn time_us(&self) -> Microseconds {
        self.time * MICROSECONDS_PER_SECOND
    }
}

/// Linearises hit times into microseconds, preserving order.
pub fn hit_times_us(hits: &[Hit]) -> Vec<Microseconds> {
    hits.iter().map(Hit::time_us).collect()
}
