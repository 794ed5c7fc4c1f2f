use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "[{bar:30}] {percent:>3}% ({pos}/{len}) {per_sec}";
const COUNTER_TEMPLATE: &str = "{spinner} Frames processed: {pos}";

/// Per-video frame progress: a bounded bar when the expected frame count is known,
/// a raw counter otherwise.
#[derive(Debug)]
pub struct FrameProgress {
    bar: ProgressBar,
    expected: u64,
}

impl FrameProgress {
    pub fn new(expected_frames: u64, visible: bool) -> Self {
        let bar = if !visible {
            ProgressBar::hidden()
        } else if expected_frames > 0 {
            let style = ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#-");
            ProgressBar::new(expected_frames).with_style(style)
        } else {
            let style = ProgressStyle::with_template(COUNTER_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            ProgressBar::new_spinner().with_style(style)
        };
        Self {
            bar,
            expected: expected_frames,
        }
    }

    /// Reports `current` processed frames; never shows more than 100%.
    pub fn update(&self, current: u64) {
        let position = if self.expected > 0 {
            current.min(self.expected)
        } else {
            current
        };
        self.bar.set_position(position);
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Leaves the bar where it stopped, for failed runs.
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}
