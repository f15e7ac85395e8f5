// src/progress/display.rs

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::progress::tracker::ProgressSnapshot;

const BAR_SCALE: f64 = 10.0;

/// Render the batch aggregate as a terminal progress bar.
///
/// This is the only consumer of the tracker's snapshots. The task ends once
/// every tracker handle has been dropped.
pub fn spawn_progress_display(mut rx: watch::Receiver<ProgressSnapshot>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new((100.0 * BAR_SCALE) as u64);
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        bar.set_prefix("Simulation Progress");

        render(&bar, &rx.borrow_and_update());
        while rx.changed().await.is_ok() {
            let snapshot = *rx.borrow_and_update();
            render(&bar, &snapshot);
        }

        bar.finish();
    })
}

fn render(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    bar.set_position((snapshot.percent * BAR_SCALE).round() as u64);
    bar.set_message(format!(
        "{:5.1}% ({}/{} datapoints)",
        snapshot.percent, snapshot.finished, snapshot.task_count
    ));
}
