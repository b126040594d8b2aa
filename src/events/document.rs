#[derive(Debug, Clone, PartialEq)]
pub enum DocumentEvent {
    Opened(i64),
    /// accepted mutation: operation name and the new version
    Mutated(String, i64),
    Closed,
}

impl DocumentEvent {
    pub fn str(&self) -> &str {
        match self {
            DocumentEvent::Opened(_) => "Opened",
            DocumentEvent::Mutated(..) => "Mutated",
            DocumentEvent::Closed => "Closed",
        }
    }
}

/// Autosave progress. Versions are the document's `updatedAt`.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveEvent {
    Scheduled(i64),
    Saving(i64),
    Saved(i64),
    /// the store already held a newer version
    Discarded(i64),
    Retry(SaveRetryEvent),
    Failed(String),
}

impl SaveEvent {
    pub fn str(&self) -> &str {
        match self {
            SaveEvent::Scheduled(_) => "Scheduled",
            SaveEvent::Saving(_) => "Saving",
            SaveEvent::Saved(_) => "Saved",
            SaveEvent::Discarded(_) => "Discarded",
            SaveEvent::Retry(_) => "Retry",
            SaveEvent::Failed(_) => "Failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveRetryEvent {
    pub version: i64,
    pub attempt: u64,
    pub error: String,
}
