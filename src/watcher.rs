//! Code change debouncing.
//!
//! Raw edit events are noisy: a typing burst produces dozens of events per
//! second. The debouncer buffers edits per document and arms a trailing
//! quiet-period deadline that the event loop sleeps on; only the last edit
//! in a burst schedules the evaluation. When the deadline fires, the batch
//! is summarized and tested for significance, subject to a minimum spacing
//! between tips. The buffer is cleared unconditionally on every flush,
//! fired or suppressed.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Edits reported per document before an overflow line is emitted.
const MAX_EDITS_PER_DOCUMENT: usize = 5;

/// Edit text is truncated to this many characters in the summary.
const MAX_EDIT_TEXT_CHARS: usize = 200;

/// A summary spanning fewer lines than this is not worth a tip.
const MIN_SIGNIFICANT_LINES: usize = 3;

/// One raw edit record from the editor integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    /// Document path (workspace-relative or absolute).
    pub path: String,
    /// 1-based line of the edit start.
    pub line: u32,
    /// Inserted text.
    pub text: String,
}

/// Trailing-edge debouncer over per-document edit buffers.
#[derive(Debug)]
pub struct ChangeDebouncer {
    quiet_period: Duration,
    min_tip_interval: Duration,
    buffer: BTreeMap<String, Vec<EditRecord>>,
    deadline: Option<Instant>,
    last_tip_at: Option<Instant>,
}

impl ChangeDebouncer {
    /// Create a debouncer with the given quiet period and minimum spacing
    /// between tips.
    #[must_use]
    pub fn new(quiet_period: Duration, min_tip_interval: Duration) -> Self {
        Self {
            quiet_period,
            min_tip_interval,
            buffer: BTreeMap::new(),
            deadline: None,
            last_tip_at: None,
        }
    }

    /// Record an edit and (re)arm the quiet-period deadline.
    pub fn record_change(&mut self, edit: EditRecord, now: Instant) {
        self.buffer.entry(edit.path.clone()).or_default().push(edit);
        self.deadline = Some(now + self.quiet_period);
    }

    /// The deadline the event loop should sleep until, if a batch is armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Number of buffered edits across all documents.
    #[must_use]
    pub fn pending_edits(&self) -> usize {
        self.buffer.values().map(Vec::len).sum()
    }

    /// Evaluate the buffered batch.
    ///
    /// The buffer and deadline are cleared unconditionally. Returns a
    /// summary only when the batch survives the minimum-spacing throttle
    /// and the significance predicate; `last_tip_at` is stamped only then.
    pub fn flush(&mut self, now: Instant) -> Option<String> {
        self.deadline = None;
        let buffer = std::mem::take(&mut self.buffer);
        if buffer.is_empty() {
            return None;
        }

        // Rate limit takes priority over significance.
        if let Some(last) = self.last_tip_at {
            if now.duration_since(last) < self.min_tip_interval {
                debug!("code tip suppressed inside minimum spacing window");
                return None;
            }
        }

        let summary = summarize(&buffer)?;
        if summary.lines().count() < MIN_SIGNIFICANT_LINES {
            debug!("code change batch below significance threshold");
            return None;
        }

        self.last_tip_at = Some(now);
        Some(summary)
    }

    /// Drop any buffered edits and disarm the deadline.
    pub fn stop(&mut self) {
        self.buffer.clear();
        self.deadline = None;
    }
}

/// Compose a human-readable per-document summary of an edit batch.
///
/// Whitespace-only edits are skipped; returns `None` when nothing of
/// substance remains.
fn summarize(buffer: &BTreeMap<String, Vec<EditRecord>>) -> Option<String> {
    let mut sections = Vec::new();

    for (path, edits) in buffer {
        let lines: Vec<&EditRecord> = edits.iter().filter(|e| !e.text.trim().is_empty()).collect();
        if lines.is_empty() {
            continue;
        }

        let lo = lines.iter().map(|e| e.line).min().unwrap_or(0);
        let hi = lines.iter().map(|e| e.line).max().unwrap_or(0);

        let mut section = format!("{path} (lines {lo}-{hi}):");
        for edit in lines.iter().take(MAX_EDITS_PER_DOCUMENT) {
            let text: String = edit
                .text
                .chars()
                .take(MAX_EDIT_TEXT_CHARS)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            section.push_str(&format!("\n  line {}: {}", edit.line, text.trim_end()));
        }
        if lines.len() > MAX_EDITS_PER_DOCUMENT {
            section.push_str(&format!(
                "\n  … and {} more edits",
                lines.len() - MAX_EDITS_PER_DOCUMENT
            ));
        }
        sections.push(section);
    }

    if sections.is_empty() {
        None
    } else {
        Some(format!("Recent code changes:\n{}", sections.join("\n")))
    }
}
