//! Progress bar for download batches.

use indicatif::{ProgressBar, ProgressStyle};
use skycache_core::download::{FetchReport, ProgressSink};

/// Terminal progress bar fed by the orchestrator's side channel.
#[derive(Debug)]
pub(crate) struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn start(&self, total: usize) {
        self.bar.reset();
        self.bar.set_length(u64::try_from(total).unwrap_or(u64::MAX));
    }

    fn advance(&self, report: &FetchReport) {
        let name = report
            .local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.bar.set_message(name);
        self.bar.inc(1);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
