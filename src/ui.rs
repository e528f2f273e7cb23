use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::status::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal presentation of the status readout.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Mirror status changes to stderr until a terminal status (or the board
    /// goes away).
    pub fn follow(&self, mut status: watch::Receiver<Status>) -> JoinHandle<()> {
        let mut view = StatusView::new(self.use_pretty());
        tokio::spawn(async move {
            loop {
                let current = *status.borrow_and_update();
                view.show(current);
                let terminal = matches!(current, Status::Stopped | Status::CameraDenied);
                if terminal || status.changed().await.is_err() {
                    break;
                }
            }
            view.finish();
        })
    }
}

struct StatusView {
    start: Instant,
    spinner: Option<ProgressBar>,
    last: Option<Status>,
}

impl StatusView {
    fn new(pretty: bool) -> Self {
        let spinner = pretty.then(|| {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner
        });
        Self {
            start: Instant::now(),
            spinner,
            last: None,
        }
    }

    fn show(&mut self, status: Status) {
        if self.last == Some(status) {
            return;
        }
        self.last = Some(status);
        match &self.spinner {
            Some(spinner) => spinner.set_message(status.readout()),
            None => eprintln!("==> {}", status),
        }
    }

    fn finish(&mut self) {
        let readout = self.last.map(Status::readout).unwrap_or("Stopped");
        let message = format!("✔ {} ({})", readout, format_duration(self.start.elapsed()));
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
