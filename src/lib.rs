//! # Flowgen
//!
//! Flowgen is the headless core of a node-graph flow editor. Users place typed
//! nodes (text, image, audio, video, code and registered custom types) on a
//! canvas and connect them; a node's behavior follows from its connections.
//!
//! ## Core Features
//!
//! - **Open Node Registry**: node types are descriptors; new types register without touching existing ones
//! - **Atomic Mutations**: every edit is a `Mutation` value that is either fully applied or rejected
//! - **Connection-Driven Variants**: a node with incoming edges is a transform, without them a primitive
//! - **Debounced Autosave**: bursts of edits coalesce into one ordered, retried save
//! - **Upload Fallback**: failed uploads keep a local reference until a retry succeeds
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowgen::{AddNodeOptions, EditorBuilder, StaticIdentity, User, Variant};
//!
//! let editor = EditorBuilder::new().identity(StaticIdentity::user(User::new("u1", "Ada"))).build()?;
//! editor.launch();
//!
//! let mut session = editor.create("My flow").await?;
//! let a = session.add_node("text", AddNodeOptions::default())?;
//! let b = session.add_node("text", AddNodeOptions::default())?;
//! session.connect(&a, None, &b, None)?;
//! assert_eq!(session.variant(&b)?, Variant::Transform);
//! if let Err(kept) = session.close().await {
//!     // saving failed; the session is still open and its changes are kept
//!     kept.session.flush().await?;
//! }
//! ```

mod builder;
mod common;
pub mod config;
mod editor;
mod error;
pub mod events;
pub mod graph;
pub mod identity;
pub mod jobs;
pub mod model;
pub mod persist;
pub mod registry;
mod runtime;
mod session;
pub mod upload;
mod utils;

use std::sync::{Arc, RwLock};

pub use builder::EditorBuilder;
pub use config::Config;
pub use editor::Editor;
pub use error::FlowError;
pub use graph::{AddNodeOptions, Applied, Mutation, VariantResolver};
pub use identity::{IdentityProvider, StaticIdentity, User};
pub use model::*;
pub use persist::{MemStore, PersistenceGateway, SaveState, SaveStatus};
pub use registry::{NodeDescriptor, NodeRegistry, Variant};
pub use runtime::{Channel, ChannelEvent, ChannelOptions};
pub use session::{CloseError, Session};
pub use upload::{MemUploader, UploadFile, UploadGateway, Uploaded, Uploader};

/// Result type alias for flowgen operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Thread-safe shared lock wrapper using Arc<RwLock<T>>.
pub(crate) type ShareLock<T> = Arc<RwLock<T>>;
