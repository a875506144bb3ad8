pub mod metrics;
pub mod tracer;

use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Hit times as recorded by the time-to-digital converter, in seconds.
pub type Seconds = f64;
/// Times used throughout pulse fitting.
pub type Microseconds = f64;

pub type Channel = i32;
pub type RunNumber = u32;

pub const MICROSECONDS_PER_SECOND: f64 = 1e6;

/// The detector is read out as four pairs of photomultiplier tubes.
/// Each pair is fitted independently.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, IntoStaticStr, Ord, PartialEq, PartialOrd,
)]
pub enum Segment {
    #[strum(serialize = "12")]
    Pmt12,
    #[strum(serialize = "34")]
    Pmt34,
    #[strum(serialize = "56")]
    Pmt1112,
    #[strum(serialize = "78")]
    Pmt1314,
}

impl Segment {
    /// Returns the segment a channel is wired to, or `None` for channels
    /// which are not part of the light-collection readout.
    pub fn from_channel(channel: Channel) -> Option<Self> {
        match channel {
            1 | 2 => Some(Self::Pmt12),
            3 | 4 => Some(Self::Pmt34),
            11 | 12 => Some(Self::Pmt1112),
            13 | 14 => Some(Self::Pmt1314),
            _ => None,
        }
    }

    /// The two channels of the pair.
    pub fn channels(self) -> [Channel; 2] {
        match self {
            Self::Pmt12 => [1, 2],
            Self::Pmt34 => [3, 4],
            Self::Pmt1112 => [11, 12],
            Self::Pmt1314 => [13, 14],
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Pmt12 => 0,
            Self::Pmt34 => 1,
            Self::Pmt1112 => 2,
            Self::Pmt1314 => 3,
        }
    }
}

pub const NUM_SEGMENTS: usize = 4;
