use std::ops::Range;
use ucn_common::Microseconds;

/// A burst of hits in which no two consecutive hits are separated by more
/// than the minimum gap.
#[derive(Clone, Debug, PartialEq)]
pub struct Window {
    pub start_time: Microseconds,
    pub end_time: Microseconds,
    pub width: Microseconds,
    /// Indices of the hits belonging to the window.
    pub hits: Range<usize>,
}

impl Window {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// The hit times of this window, taken from the sequence it was cut from.
    pub fn times<'a>(&self, times: &'a [Microseconds]) -> &'a [Microseconds] {
        times.get(self.hits.clone()).unwrap_or_default()
    }
}

/// Grows a window from `start` while consecutive gaps are at most `min_gap`.
///
/// Returns `None` only when `start` is past the end of `times`, otherwise the
/// returned window holds at least the hit at `start`, so repeatedly calling
/// this from `window.hits.end` always makes progress.
pub fn moving_window(times: &[Microseconds], start: usize, min_gap: Microseconds) -> Option<Window> {
    let start_time = *times.get(start)?;
    let mut end = start + 1;
    let mut end_time = start_time;
    while let Some(&next) = times.get(end) {
        if next - end_time > min_gap {
            break;
        }
        end_time = next;
        end += 1;
    }
    Some(Window {
        start_time,
        end_time,
        width: end_time - start_time,
        hits: start..end,
    })
}

#[derive(Clone)]
pub struct GapWindowIter<'a> {
    times: &'a [Microseconds],
    min_gap: Microseconds,
    next: usize,
}

impl Iterator for GapWindowIter<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let window = moving_window(self.times, self.next, self.min_gap)?;
        self.next = window.hits.end;
        Some(window)
    }
}

pub trait GapWindows {
    /// Splits a sorted sequence of times into consecutive maximal windows.
    fn gap_windows(&self, min_gap: Microseconds) -> GapWindowIter<'_>;
}

impl GapWindows for [Microseconds] {
    fn gap_windows(&self, min_gap: Microseconds) -> GapWindowIter<'_> {
        GapWindowIter {
            times: self,
            min_gap,
            next: 0,
        }
    }
}
