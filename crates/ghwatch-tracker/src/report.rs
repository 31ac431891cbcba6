//! Event sinks. A failed write is logged and otherwise ignored: the report
//! stream must never take the watcher down.

use std::io::Write;
use std::sync::{Arc, Mutex};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::event::{Event, JobInfo, RunInfo, StepInfo};

pub trait Reporter {
    fn report(&mut self, event: &Event);

    fn flush(&mut self) {}
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, event: &Event) {
        (**self).report(event)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

// ── Text ──

/// Line-oriented human-readable report.
pub struct TextReporter<W: Write> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn report(&mut self, event: &Event) {
        let line = render_line(event);
        if let Err(e) = writeln!(self.out, "{line}") {
            tracing::warn!(error = %e, "cannot write report line");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(error = %e, "cannot flush report");
        }
    }
}

/// Render one event as a single report line.
pub fn render_line(event: &Event) -> String {
    match event {
        Event::RunQueued(r) | Event::RunStarted(r) | Event::RunCompleted(r) => {
            format!("[{}] {} {}", fmt_ts(Some(r.timestamp)), run_label(r), outcome(r))
        }
        Event::ApprovalRequired(r) => format!(
            "[{}] {} needs approval: {}",
            fmt_ts(Some(r.timestamp)),
            run_label(r),
            r.html_url
        ),
        Event::JobChanged(j) => format!("    job {}: {}", j.name, job_outcome(j)),
        Event::JobFailed(j) => match &j.html_url {
            Some(url) => format!("    failed job {}: {} {url}", j.name, job_outcome(j)),
            None => format!("    failed job {}: {}", j.name, job_outcome(j)),
        },
        Event::StepChanged(s) => format!(
            "      [{}] step {} {}: {}",
            s.job_name,
            s.number,
            s.name,
            step_outcome(s)
        ),
    }
}

fn run_label(r: &RunInfo) -> String {
    let mut label = format!("{} #{}", r.workflow, r.run_number);
    if r.run_attempt > 1 {
        label.push_str(&format!(" (attempt {})", r.run_attempt));
    }
    if !r.title.is_empty() && r.title != r.workflow {
        label.push_str(&format!(" \"{}\"", r.title));
    }
    match &r.branch {
        Some(branch) => label.push_str(&format!(" ({branch} @ {})", r.short_sha())),
        None => label.push_str(&format!(" ({})", r.short_sha())),
    }
    label
}

fn outcome(r: &RunInfo) -> String {
    match &r.conclusion {
        Some(c) => format!("{} ({c})", r.status.label()),
        None => r.status.label(),
    }
}

fn job_outcome(j: &JobInfo) -> String {
    match &j.conclusion {
        Some(c) => format!("{} ({c})", j.status.label()),
        None => j.status.label(),
    }
}

fn step_outcome(s: &StepInfo) -> String {
    match &s.conclusion {
        Some(c) => format!("{} ({c})", s.status.label()),
        None => s.status.label(),
    }
}

fn fmt_ts(ts: Option<OffsetDateTime>) -> String {
    ts.and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

// ── JSON ──

/// One JSON object per line, tagged by `type`.
pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn report(&mut self, event: &Event) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"));
        if let Err(e) = written {
            tracing::warn!(error = %e, "cannot write report event");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            tracing::warn!(error = %e, "cannot flush report");
        }
    }
}

// ── Collect ──

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectReporter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CollectReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Remove and return everything collected so far.
    pub fn take(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl Reporter for CollectReporter {
    fn report(&mut self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
