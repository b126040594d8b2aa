use crate::{jobs::JobId, registry::Variant};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Added,
    Removed,
    DataChanged,
    VariantChanged(VariantChangedEvent),
}

impl NodeEvent {
    pub fn str(&self) -> &str {
        match self {
            NodeEvent::Added => "Added",
            NodeEvent::Removed => "Removed",
            NodeEvent::DataChanged => "DataChanged",
            NodeEvent::VariantChanged(_) => "VariantChanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantChangedEvent {
    pub from: Variant,
    pub to: Variant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// durable url
    Uploaded(String),
    /// gateway failed; a local reference is in use until a retry succeeds
    Fallback(String),
    /// a fallback reference was replaced by this durable url
    Recovered(String),
}

impl UploadEvent {
    pub fn str(&self) -> &str {
        match self {
            UploadEvent::Uploaded(_) => "Uploaded",
            UploadEvent::Fallback(_) => "Fallback",
            UploadEvent::Recovered(_) => "Recovered",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Pending(JobId),
    Running(JobId),
    Succeeded(JobId),
    Failed(JobId, String),
}

impl JobEvent {
    pub fn str(&self) -> &str {
        match self {
            JobEvent::Pending(_) => "Pending",
            JobEvent::Running(_) => "Running",
            JobEvent::Succeeded(_) => "Succeeded",
            JobEvent::Failed(..) => "Failed",
        }
    }

    pub fn job(&self) -> &JobId {
        match self {
            JobEvent::Pending(id) | JobEvent::Running(id) | JobEvent::Succeeded(id) | JobEvent::Failed(id, _) => id,
        }
    }
}
