//! Progress reporting for archive extraction.

/// Event emitted once per archive entry while extracting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Archive being extracted.
    pub archive: String,
    /// Entries handled so far, including this one.
    pub current: u64,
    pub total: u64,
    /// Archive-internal name of the entry just handled.
    pub entry: String,
}

/// Receives progress updates. Implement this to drive progress bars or
/// status displays in a front end.
pub trait ProgressHandler {
    fn on_progress(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoopProgress;

impl ProgressHandler for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Emit an event if a handler is installed.
pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    archive: &str,
    current: u64,
    total: u64,
    entry: &str,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            archive: archive.to_string(),
            current,
            total,
            entry: entry.to_string(),
        });
    }
}
