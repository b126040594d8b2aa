//! Generation jobs.
//!
//! Running a node's generator is asynchronous: a job is submitted, stays
//! pending until a worker picks it up, runs, and ends up succeeded or failed.
//! Results are applied to the document by the session, never by the job.

mod runner;

use serde::Serialize;

use crate::model::{DocumentId, NodeId};

pub use runner::JobRunner;
pub(crate) use runner::prepare;

/// job id
pub type JobId = String;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Snapshot of one generation job.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub doc: DocumentId,
    pub node: NodeId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}
