//! Transfer progress reporting.
//!
//! Fetchers emit [`TransferEvent`]s while downloading manifest, snapshot,
//! and chunk resources so users see what is being fetched and how much is
//! left. Progress goes to **stderr** so stdout stays parseable for scripts.
//! Listeners only observe; they never influence the update.

use std::io::Write;
use std::sync::Arc;

/// A single transfer event for one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferEvent {
    /// Request issued. `total` is known when the server sent a length.
    Started { resource: String, total: Option<u64> },
    /// `received` bytes so far.
    Progress {
        resource: String,
        received: u64,
        total: Option<u64>,
    },
    Completed { resource: String, bytes: u64 },
    Failed { resource: String, reason: String },
}

/// Receives transfer events. Implementations must not block.
pub trait TransferListener: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

/// Shared listener handle held by fetchers.
pub type SharedListener = Arc<dyn TransferListener>;

/// Human-friendly progress on stderr: "fetch index-manifest.json  1,234 / 5,000 bytes".
pub struct StderrProgress;

impl TransferListener for StderrProgress {
    fn on_event(&self, event: &TransferEvent) {
        let line = match event {
            TransferEvent::Started { resource, total } => match total {
                Some(t) => format!("fetch {}  started  {} bytes\n", resource, format_number(*t)),
                None => format!("fetch {}  started\n", resource),
            },
            TransferEvent::Progress {
                resource,
                received,
                total,
            } => match total {
                Some(t) => format!(
                    "fetch {}  {} / {} bytes\n",
                    resource,
                    format_number(*received),
                    format_number(*t)
                ),
                None => format!("fetch {}  {} bytes\n", resource, format_number(*received)),
            },
            TransferEvent::Completed { resource, bytes } => {
                format!("fetch {}  done  {} bytes\n", resource, format_number(*bytes))
            }
            TransferEvent::Failed { resource, reason } => {
                format!("fetch {}  failed: {}\n", resource, reason)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl TransferListener for JsonProgress {
    fn on_event(&self, event: &TransferEvent) {
        let obj = match event {
            TransferEvent::Started { resource, total } => serde_json::json!({
                "event": "transfer",
                "phase": "started",
                "resource": resource,
                "total": total
            }),
            TransferEvent::Progress {
                resource,
                received,
                total,
            } => serde_json::json!({
                "event": "transfer",
                "phase": "progress",
                "resource": resource,
                "received": received,
                "total": total
            }),
            TransferEvent::Completed { resource, bytes } => serde_json::json!({
                "event": "transfer",
                "phase": "completed",
                "resource": resource,
                "bytes": bytes
            }),
            TransferEvent::Failed { resource, reason } => serde_json::json!({
                "event": "transfer",
                "phase": "failed",
                "resource": resource,
                "reason": reason
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op listener when progress is disabled.
pub struct NoProgress;

impl TransferListener for NoProgress {
    fn on_event(&self, _event: &TransferEvent) {}
}

pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
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

    pub fn listener(&self) -> SharedListener {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
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
