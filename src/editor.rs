//! Editor - the main entry point for flowgen.
//!
//! The editor owns the shared pieces every session uses:
//! - the node registry and editing policy
//! - the persistence and upload gateways
//! - the identity provider
//! - the event channel and the tokio runtime handle

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::runtime::{Handle, Runtime};
use tracing::info;

use crate::{
    ChannelEvent, ChannelOptions, Config, FlowError, Result,
    graph::EditPolicy,
    identity::{IdentityProvider, User},
    jobs::JobRunner,
    model::GraphDocument,
    persist::{Autosave, PersistenceGateway},
    registry::NodeRegistry,
    runtime::Channel,
    session::{CloseError, Session, SessionParts},
    upload::Uploader,
    utils,
};

/// The editor.
///
/// # Example
///
/// ```rust,ignore
/// let editor = EditorBuilder::new().identity(StaticIdentity::user(user)).build()?;
/// editor.launch();
///
/// let mut session = editor.create("My flow").await?;
/// let a = session.add_node("text", AddNodeOptions::default())?;
/// let b = session.add_node("text", AddNodeOptions::default())?;
/// session.connect(&a, None, &b, None)?;
///
/// // Switch to another workspace; pending changes are flushed first
/// let session = match editor.switch(session, "other-doc").await {
///     Ok(next) => next,
///     // the save failed: keep editing the old document
///     Err(kept) => kept.session,
/// };
/// ```
pub struct Editor {
    config: Config,
    registry: Arc<NodeRegistry>,
    store: Arc<dyn PersistenceGateway>,
    uploader: Uploader,
    identity: Arc<dyn IdentityProvider>,
    channel: Arc<Channel>,

    /// Flag indicating if the channel is dispatching to handlers.
    running: Arc<AtomicBool>,
    handle: Handle,
    /// Runtime built by the editor when none was running at build time.
    _runtime: Option<Arc<Runtime>>,
}

impl Editor {
    pub(crate) fn new(
        config: Config,
        registry: Arc<NodeRegistry>,
        store: Arc<dyn PersistenceGateway>,
        uploader: Uploader,
        identity: Arc<dyn IdentityProvider>,
        handle: Handle,
        runtime: Option<Arc<Runtime>>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            uploader,
            identity,
            channel: Arc::new(Channel::new(handle.clone())),
            running: Arc::new(AtomicBool::new(false)),
            handle,
            _runtime: runtime,
        }
    }

    /// Starts dispatching events to registered handlers.
    pub fn launch(&self) {
        if self.running.swap(true, Ordering::Relaxed) {
            return;
        }
        self.channel.listen();
    }

    /// Stops event dispatching. Open sessions keep working but handlers no
    /// longer run.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }
        self.channel.shutdown();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    pub fn store(&self) -> Arc<dyn PersistenceGateway> {
        self.store.clone()
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn current_user(&self) -> Option<User> {
        self.identity.current_user()
    }

    /// Returns a reference to the event channel.
    pub fn channel(&self) -> Arc<Channel> {
        self.channel.clone()
    }

    /// Handler registration scoped by document and node patterns.
    pub fn events(
        &self,
        options: ChannelOptions,
    ) -> Result<ChannelEvent> {
        ChannelEvent::channel(self.channel.clone(), options)
    }

    /// Create a document owned by the current user and open it.
    ///
    /// The empty document is saved before the session is returned, so it can
    /// be reopened right away.
    pub async fn create(
        &self,
        name: &str,
    ) -> Result<Session> {
        let user = self.current_user().ok_or(FlowError::ReadOnly)?;
        let doc = GraphDocument::new(utils::document_id(), user.id.clone(), name);
        self.store.save(&doc).await?;
        info!(doc = %doc.id(), owner = %user.id, "document created");
        Ok(self.session(doc, Some(user)))
    }

    /// Load a document and open a session over it. Anonymous users get a
    /// read-only session.
    pub async fn open(
        &self,
        id: &str,
    ) -> Result<Session> {
        let doc = self.store.load(id).await?;
        Ok(self.session(doc, self.current_user()))
    }

    /// Close `current` (flushing its pending changes) and open `id`.
    ///
    /// The previous session's autosave is stopped before the new session is
    /// returned, so no save for it can start afterwards. When the flush or the
    /// load fails `current` is handed back still open, with its unsaved
    /// changes and its autosave intact.
    pub async fn switch(
        &self,
        current: Session,
        id: &str,
    ) -> std::result::Result<Session, Box<CloseError>> {
        info!(from = %current.id(), to = %id, "switching workspace");
        if let Err(error) = current.flush().await {
            return Err(CloseError::retain(current, error));
        }
        let doc = match self.store.load(id).await {
            Ok(doc) => doc,
            Err(error) => return Err(CloseError::retain(current, error)),
        };
        current.stop().await;
        Ok(self.session(doc, self.current_user()))
    }

    fn session(
        &self,
        doc: GraphDocument,
        user: Option<User>,
    ) -> Session {
        let events = self.channel.event_queue();
        let autosave = Autosave::start(&self.handle, self.store.clone(), self.config.autosave.clone(), doc.id().clone(), doc.updated_at(), events.clone());
        let parts = SessionParts {
            registry: self.registry.clone(),
            policy: EditPolicy::from_config(&self.config),
            user,
            autosave,
            uploader: self.uploader.clone(),
            jobs: JobRunner::new(self.handle.clone(), events),
            channel: self.channel.clone(),
        };
        Session::new(doc, parts)
    }
}
