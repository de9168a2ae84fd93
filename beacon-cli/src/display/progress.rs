//! Run progress bar with tracing integration.
//!
//! While a run is active, tracing output and result lines are printed through
//! the progress bar so neither tears the bar.

use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use beacon_core::RunCounters;
use indicatif::{ProgressBar, ProgressStyle};

/// Bar of the run in progress, if any. Log lines are routed through it.
static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

fn active_bar() -> MutexGuard<'static, Option<ProgressBar>> {
    ACTIVE_BAR.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current_bar() -> Option<ProgressBar> {
    active_bar().clone()
}

fn release(bar: &ProgressBar) {
    bar.finish_and_clear();
    *active_bar() = None;
}

/// Spinner shown while a target list is read.
pub struct LoadingSpinner {
    bar: ProgressBar,
}

impl LoadingSpinner {
    pub fn start(file: &Path) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} Reading {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(file.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        *active_bar() = Some(bar.clone());
        Self { bar }
    }
}

impl Drop for LoadingSpinner {
    fn drop(&mut self) {
        release(&self.bar);
    }
}

/// Progress display for one bulk run.
pub struct RunProgress {
    bar: ProgressBar,
    line_end: &'static str,
}

impl RunProgress {
    pub fn new(counters: &RunCounters) -> Self {
        let bar = ProgressBar::new(counters.total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        bar.set_position(counters.completed as u64);
        *active_bar() = Some(bar.clone());

        Self {
            bar,
            line_end: "\n",
        }
    }

    /// Terminates printed lines with `\r\n`, needed while the terminal is in raw mode.
    pub fn set_raw_mode(&mut self, raw: bool) {
        self.line_end = if raw { "\r\n" } else { "\n" };
    }

    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    /// Prints a result line to stdout above the bar.
    pub fn println(&self, line: &str) {
        self.bar.suspend(|| {
            let mut out = std::io::stdout().lock();
            let _ = write!(out, "{}{}", line, self.line_end);
            let _ = out.flush();
        });
    }

    pub fn update(&self, counters: &RunCounters) {
        self.bar.set_position(counters.completed as u64);
        self.bar.set_message(format!(
            "{} working, {} not working",
            counters.working_count, counters.not_working_count
        ));
    }

    pub fn finish(&self) {
        release(&self.bar);
    }
}

impl Drop for RunProgress {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.finish();
        }
    }
}

/// A writer that routes output through the active progress bar.
pub struct ProgressWriter {
    buffer: Vec<u8>,
}

impl ProgressWriter {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    fn emit(line: &str) -> std::io::Result<()> {
        if let Some(bar) = current_bar() {
            bar.println(line);
            Ok(())
        } else {
            let mut stderr = std::io::stderr();
            stderr.write_all(line.as_bytes())?;
            stderr.write_all(b"\n")
        }
    }
}

impl Default for ProgressWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line);
            Self::emit(line.trim_end_matches(['\r', '\n']))?;
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).trim_end().to_string();
            self.buffer.clear();
            if !line.is_empty() {
                Self::emit(&line)?;
            }
        }
        Ok(())
    }
}

impl Drop for ProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// A `MakeWriter` for tracing-subscriber that creates [`ProgressWriter`]s.
pub struct ProgressWriterFactory;

impl ProgressWriterFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProgressWriterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for ProgressWriterFactory {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressWriter::new()
    }
}
