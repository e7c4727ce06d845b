//! Pipeline progress reporting.
//!
//! Reports observable progress during `tabman capture` so users see which
//! stage is running and how many tabs are left. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event emitted by the write path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineProgressEvent {
    /// Listing targets on the debugging endpoint.
    Capturing { endpoint: String },
    /// `n` of `total` tabs fetched (completion order, not tab order).
    Fetching { n: u64, total: u64 },
    /// `n` of `total` tabs categorized.
    Categorizing { n: u64, total: u64 },
    /// Writing snapshot, markdown mirror, and ledger.
    Saving { tabs: u64 },
}

/// Receives progress events. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: PipelineProgressEvent);
}

/// Human-friendly progress on stderr: "fetching  12 / 40 tabs".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: PipelineProgressEvent) {
        let line = match &event {
            PipelineProgressEvent::Capturing { endpoint } => {
                format!("capturing tabs from {}...\n", endpoint)
            }
            PipelineProgressEvent::Fetching { n, total } => {
                format!(
                    "fetching  {} / {} tabs\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            PipelineProgressEvent::Categorizing { n, total } => {
                format!(
                    "categorizing  {} / {} tabs\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            PipelineProgressEvent::Saving { tabs } => {
                format!("saving {} tabs\n", format_number(*tabs))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PipelineProgressEvent) {
        let obj = match &event {
            PipelineProgressEvent::Capturing { endpoint } => serde_json::json!({
                "event": "progress",
                "phase": "capturing",
                "endpoint": endpoint
            }),
            PipelineProgressEvent::Fetching { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "fetching",
                "n": n,
                "total": total
            }),
            PipelineProgressEvent::Categorizing { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "categorizing",
                "n": n,
                "total": total
            }),
            PipelineProgressEvent::Saving { tabs } => serde_json::json!({
                "event": "progress",
                "phase": "saving",
                "tabs": tabs
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PipelineProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
