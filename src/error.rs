//! Error types for flowgen.
//!
//! All errors are represented by the `FlowError` enum. Mutation errors are
//! raised synchronously and never leave a document partially modified;
//! persistence and upload errors come from the async gateways and are retried
//! before they reach the caller.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all flowgen operations.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// The node type tag is not registered.
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    /// No node with this id exists in the document.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge with this id exists in the document.
    #[error("edge not found: {0}")]
    EdgeNotFound(String),

    /// An edge would connect a node to itself.
    #[error("self-loop not allowed on node {0}")]
    SelfLoop(String),

    /// An identical edge already exists (holds the existing edge id).
    #[error("duplicate edge: {0}")]
    DuplicateEdge(String),

    /// Node payload does not match the node type.
    #[error("invalid node data: {0}")]
    InvalidData(String),

    /// Document not found in the persistence gateway.
    #[error("document not found: {0}")]
    NotFound(String),

    /// The current identity may view but not mutate.
    #[error("read-only session: sign in to edit")]
    ReadOnly,

    /// The graph contains a cycle through the given node.
    #[error("graph contains a cycle through node {0}")]
    Cycle(String),

    /// Saving or loading a document failed.
    #[error("{0}")]
    Persistence(String),

    /// Uploading a file failed.
    #[error("{0}")]
    Upload(String),

    /// Generation job errors.
    #[error("{0}")]
    Job(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors (JSON, base64, etc.).
    #[error("{0}")]
    Convert(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<FlowError> for String {
    fn from(val: FlowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for FlowError {
    fn from(error: std::io::Error) -> Self {
        FlowError::IoError(error.to_string())
    }
}

impl From<FlowError> for std::io::Error {
    fn from(val: FlowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for FlowError {
    fn from(_: FromUtf8Error) -> Self {
        FlowError::Convert("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(error: serde_json::Error) -> Self {
        FlowError::Convert(error.to_string())
    }
}

impl From<base64::DecodeError> for FlowError {
    fn from(error: base64::DecodeError) -> Self {
        FlowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for FlowError {
    fn from(error: toml::de::Error) -> Self {
        FlowError::Config(error.to_string())
    }
}
