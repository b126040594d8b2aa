//! Event types for editing sessions.
//!
//! Events are emitted while a document is edited, saved and generated so
//! subscribers can follow mutations, variant changes, save status, uploads
//! and generation jobs.

mod document;
mod node;

pub use document::*;
pub use node::*;

use crate::model::{DocumentId, NodeId};

/// Generic event wrapper.
#[derive(Debug, Clone)]
pub struct Event<T> {
    inner: T,
}

/// Top-level event type for editor events.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// Document-level events (opened, mutated, closed).
    Document(DocumentEvent),
    /// Node-level events (added, removed, variant changed).
    Node(NodeEvent),
    /// Autosave progress of the document.
    Save(SaveEvent),
    /// Media upload progress of a node.
    Upload(UploadEvent),
    /// Generation job progress of a node.
    Job(JobEvent),
}

/// Event message containing document and node context.
#[derive(Debug, Clone)]
pub struct Message {
    /// Document the event belongs to.
    pub doc: DocumentId,
    /// Node the event belongs to (empty for document and save events).
    pub nid: NodeId,
    /// The actual event data.
    pub event: EditorEvent,
}

impl Message {
    pub fn document(
        doc: &str,
        event: EditorEvent,
    ) -> Self {
        Self {
            doc: doc.to_string(),
            nid: NodeId::new(),
            event,
        }
    }

    pub fn node(
        doc: &str,
        nid: &str,
        event: EditorEvent,
    ) -> Self {
        Self {
            doc: doc.to_string(),
            nid: nid.to_string(),
            event,
        }
    }
}

impl<T> std::ops::Deref for Event<T>
where
    T: std::fmt::Debug + Clone,
{
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> Event<T>
where
    T: std::fmt::Debug + Clone,
{
    pub fn new(inner: &T) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl EditorEvent {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            EditorEvent::Save(SaveEvent::Failed(_)) | EditorEvent::Upload(UploadEvent::Fallback(_)) | EditorEvent::Job(JobEvent::Failed(..))
        )
    }

    pub fn is_save(&self) -> bool {
        matches!(self, EditorEvent::Save(_))
    }

    pub fn str(&self) -> &str {
        match self {
            EditorEvent::Document(e) => e.str(),
            EditorEvent::Node(e) => e.str(),
            EditorEvent::Save(e) => e.str(),
            EditorEvent::Upload(e) => e.str(),
            EditorEvent::Job(e) => e.str(),
        }
    }
}
