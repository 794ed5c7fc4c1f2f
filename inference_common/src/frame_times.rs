use std::time::Duration;

/// Wall-clock time spent in each stage of a single frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameTimes {
    pub read: Duration,
    pub detect: Duration,
    pub annotate: Duration,
    pub write: Duration,
}

impl FrameTimes {
    pub fn total(&self) -> Duration {
        self.read + self.detect + self.annotate + self.write
    }

    fn map(&self, f: impl Fn(Duration) -> Duration) -> Self {
        Self {
            read: f(self.read),
            detect: f(self.detect),
            annotate: f(self.annotate),
            write: f(self.write),
        }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(Duration, Duration) -> Duration) -> Self {
        Self {
            read: f(self.read, other.read),
            detect: f(self.detect, other.detect),
            annotate: f(self.annotate, other.annotate),
            write: f(self.write, other.write),
        }
    }
}

/// Running per-stage statistics over a video, in constant memory.
///
/// The first frame is tracked apart from the rest: it carries lazy backend
/// initialization and would skew averages.
#[derive(Debug, Default)]
pub struct AggregatedTimes {
    first: Option<FrameTimes>,
    count: u32,
    sum: FrameTimes,
    min: Option<FrameTimes>,
    max: FrameTimes,
}

impl AggregatedTimes {
    pub fn push(&mut self, times: FrameTimes) {
        if self.first.is_none() {
            self.first = Some(times);
            return;
        }
        self.count += 1;
        self.sum = self.sum.zip_with(&times, |a, b| a + b);
        self.max = self.max.zip_with(&times, Duration::max);
        self.min = Some(match self.min {
            Some(min) => min.zip_with(&times, Duration::min),
            None => times,
        });
    }

    /// Frames seen so far, the first one included.
    pub fn len(&self) -> u32 {
        self.count + u32::from(self.first.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// Average over all frames after the first; the first frame alone if it is the only one.
    pub fn avg(&self) -> Option<FrameTimes> {
        if self.count == 0 {
            return self.first;
        }
        let n = self.count;
        Some(self.sum.map(|d| d / n))
    }

    pub fn min(&self) -> Option<FrameTimes> {
        self.min.or(self.first)
    }

    pub fn max(&self) -> Option<FrameTimes> {
        if self.count == 0 {
            self.first
        } else {
            Some(self.max)
        }
    }
}
