//! Progress reporting

use crate::transport::ProgressFn;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Progress reporter for a monitoring session
///
/// Owns one status spinner (countdown to the next check) and creates one bar
/// per transfer. Every method takes `&self`, so a single reporter can be
/// shared by the loop that drives transfers.
pub struct ProgressReporter {
    multi: MultiProgress,
    status_bar: ProgressBar,
    transferred_files: AtomicU64,
    transferred_bytes: AtomicU64,
}

impl ProgressReporter {
    /// Create a reporter drawing to stderr
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    /// Create a reporter that draws nothing (tests, `--quiet`)
    pub fn hidden() -> Self {
        Self::with_target(ProgressDrawTarget::hidden())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);

        let status_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            status_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }

        Self {
            multi,
            status_bar,
            transferred_files: AtomicU64::new(0),
            transferred_bytes: AtomicU64::new(0),
        }
    }

    /// Start a bar for one file transfer
    pub fn start_transfer(&self, action: &str, name: &str) -> TransferBar {
        let bar = self.multi.insert_before(&self.status_bar, ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::with_template(
            "{msg:30} {bar:30.cyan/blue} {bytes}/{total_bytes} {bytes_per_sec}",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar.set_message(format!("{} {}", action, name));
        TransferBar { bar }
    }

    /// Record a finished transfer
    pub fn complete_transfer(&self, bar: TransferBar, bytes: u64) {
        self.transferred_files.fetch_add(1, Ordering::Relaxed);
        self.transferred_bytes.fetch_add(bytes, Ordering::Relaxed);
        bar.bar.finish_and_clear();
    }

    /// Drop a bar whose transfer failed
    pub fn abandon_transfer(&self, bar: TransferBar) {
        bar.bar.abandon();
        self.multi.remove(&bar.bar);
    }

    /// Show the time left before the next check
    pub fn countdown(&self, remaining_secs: u64) {
        self.status_bar
            .set_message(format!("Next check in {}s", remaining_secs));
        self.status_bar.tick();
    }

    /// Show a free-form status line
    pub fn status(&self, message: impl Into<String>) {
        self.status_bar.set_message(message.into());
        self.status_bar.tick();
    }

    /// Writer for console log lines that clears the bars while it prints
    pub fn console_writer(&self) -> ConsoleWriter {
        ConsoleWriter {
            multi: self.multi.clone(),
        }
    }

    /// Clear the status line at the end of a session
    pub fn finish(&self) {
        self.status_bar.finish_with_message(format!(
            "Session finished: {} transfers | {}",
            self.transferred_files(),
            HumanBytes(self.transferred_bytes())
        ));
    }

    pub fn transferred_files(&self) -> u64 {
        self.transferred_files.load(Ordering::Relaxed)
    }

    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn status_message(&self) -> String {
        self.status_bar.message()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Bar for one in-flight transfer
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Callback handed to the transport
    pub fn callback(&self) -> ProgressFn {
        let bar = self.bar.clone();
        Arc::new(move |done, total| {
            if bar.length() != Some(total) {
                bar.set_length(total);
            }
            bar.set_position(done);
        })
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// stderr writer that suspends the progress display around each write
///
/// Handed to the console `fmt` layer so log lines land above the bars
/// instead of being drawn through them.
#[derive(Clone)]
pub struct ConsoleWriter {
    multi: MultiProgress,
}

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().lock().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.multi.suspend(|| io::stderr().lock().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
