//! Editing session over one graph document.
//!
//! A session owns the in-memory document and is the only place it changes.
//! Every accepted mutation re-evaluates the variants of the nodes whose
//! incoming edges changed, publishes events and schedules an autosave.

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    FlowError, Result,
    events::{DocumentEvent, EditorEvent, Message, NodeEvent, UploadEvent, VariantChangedEvent},
    graph::{AddNodeOptions, Applied, EditPolicy, Mutation, VariantResolver},
    identity::User,
    jobs::{self, Job, JobId, JobRunner, JobStatus},
    model::{DocumentId, Edge, EdgeId, GraphDocument, MediaRef, NodeData, NodeId, NodeType, Position},
    persist::{Autosave, SaveState},
    registry::{NodeRegistry, Variant},
    runtime::Channel,
    upload::{UploadFile, Uploader},
};

/// Everything a session needs from the editor that opened it.
pub(crate) struct SessionParts {
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) policy: EditPolicy,
    pub(crate) user: Option<User>,
    pub(crate) autosave: Autosave,
    pub(crate) uploader: Uploader,
    pub(crate) jobs: JobRunner,
    pub(crate) channel: Arc<Channel>,
}

/// A session that could not be closed, handed back with the reason.
#[derive(Debug, thiserror::Error)]
#[error("session {} kept open: {error}", .session.id())]
pub struct CloseError {
    pub session: Session,
    pub error: FlowError,
}

impl CloseError {
    pub(crate) fn retain(
        session: Session,
        error: FlowError,
    ) -> Box<Self> {
        warn!(doc = %session.id(), error = %error, "unsaved changes kept, session stays open");
        Box::new(Self {
            session,
            error,
        })
    }
}

pub struct Session {
    doc: GraphDocument,
    registry: Arc<NodeRegistry>,
    resolver: VariantResolver,
    policy: EditPolicy,
    user: Option<User>,
    autosave: Autosave,
    uploader: Uploader,
    jobs: JobRunner,
    channel: Arc<Channel>,
    log: Vec<Mutation>,
}

impl Session {
    pub(crate) fn new(
        doc: GraphDocument,
        parts: SessionParts,
    ) -> Self {
        info!(doc = %doc.id(), read_only = parts.user.is_none(), "session opened");
        parts.channel.emit(Message::document(doc.id(), EditorEvent::Document(DocumentEvent::Opened(doc.updated_at()))));
        Self {
            resolver: VariantResolver::new(parts.registry.clone()),
            registry: parts.registry,
            policy: parts.policy,
            user: parts.user,
            autosave: parts.autosave,
            uploader: parts.uploader,
            jobs: parts.jobs,
            channel: parts.channel,
            log: Vec::new(),
            doc,
        }
    }

    pub fn id(&self) -> &DocumentId {
        self.doc.id()
    }

    pub fn document(&self) -> &GraphDocument {
        &self.doc
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Anonymous sessions can read and resolve but not mutate.
    pub fn is_read_only(&self) -> bool {
        self.user.is_none()
    }

    /// Accepted mutations since the session opened, with generated ids filled in.
    pub fn mutation_log(&self) -> &[Mutation] {
        &self.log
    }

    pub fn resolver(&self) -> &VariantResolver {
        &self.resolver
    }

    pub fn variant(
        &self,
        id: &str,
    ) -> Result<Variant> {
        self.resolver.resolve(self.doc.content(), id)
    }

    pub fn variants(&self) -> Vec<(NodeId, Variant)> {
        self.resolver.resolve_all(self.doc.content())
    }

    pub fn incoming(
        &self,
        id: &str,
    ) -> Result<Vec<&Edge>> {
        self.resolver.incoming(self.doc.content(), id)
    }

    pub fn add_node(
        &mut self,
        node_type: impl Into<NodeType>,
        options: AddNodeOptions,
    ) -> Result<NodeId> {
        let applied = self.apply(Mutation::add_node(node_type, options))?;
        created(applied)
    }

    pub fn duplicate_node(
        &mut self,
        id: &str,
    ) -> Result<NodeId> {
        let applied = self.apply(Mutation::DuplicateNode {
            id: id.to_string(),
            new_id: None,
        })?;
        created(applied)
    }

    pub fn delete_node(
        &mut self,
        id: &str,
    ) -> Result<()> {
        self.apply(Mutation::DeleteNode {
            id: id.to_string(),
        })
        .map(|_| ())
    }

    pub fn connect(
        &mut self,
        source: &str,
        source_handle: Option<&str>,
        target: &str,
        target_handle: Option<&str>,
    ) -> Result<EdgeId> {
        let applied = self.apply(Mutation::connect(source, source_handle, target, target_handle))?;
        created(applied)
    }

    pub fn disconnect(
        &mut self,
        id: &str,
    ) -> Result<()> {
        self.apply(Mutation::Disconnect {
            id: id.to_string(),
        })
        .map(|_| ())
    }

    pub fn update_data(
        &mut self,
        id: &str,
        data: NodeData,
    ) -> Result<()> {
        self.apply(Mutation::UpdateData {
            id: id.to_string(),
            data,
        })
        .map(|_| ())
    }

    pub fn move_node(
        &mut self,
        id: &str,
        position: Position,
    ) -> Result<()> {
        self.apply(Mutation::MoveNode {
            id: id.to_string(),
            position,
        })
        .map(|_| ())
    }

    pub fn rename(
        &mut self,
        name: impl Into<String>,
    ) -> Result<()> {
        self.apply(Mutation::Rename {
            name: name.into(),
        })
        .map(|_| ())
    }

    /// Point a media node at `media`, typically the result of an upload that
    /// ran while editing continued.
    pub fn attach_media(
        &mut self,
        id: &str,
        media: MediaRef,
    ) -> Result<()> {
        let url = media.url.clone();
        let durable = media.durable;
        self.apply(Mutation::SetMedia {
            id: id.to_string(),
            media,
        })?;
        let event = if durable { UploadEvent::Uploaded(url) } else { UploadEvent::Fallback(url) };
        self.emit_node(id, EditorEvent::Upload(event));
        Ok(())
    }

    /// Apply one mutation atomically.
    pub fn apply(
        &mut self,
        mutation: Mutation,
    ) -> Result<Applied> {
        self.apply_batch(vec![mutation])?.pop().ok_or_else(|| FlowError::InvalidData("empty mutation batch".into()))
    }

    /// Apply several mutations; either all are applied or none.
    pub fn apply_batch(
        &mut self,
        mutations: Vec<Mutation>,
    ) -> Result<Vec<Applied>> {
        self.ensure_writable()?;
        let before: HashMap<NodeId, Variant> = self.variants().into_iter().collect();
        let applied = self.doc.apply_batch(&self.registry, &self.policy, mutations)?;
        self.publish(&applied, &before);
        Ok(applied)
    }

    /// Upload `file` and attach it to the media node `id`.
    ///
    /// When the gateway keeps failing the node gets a non-durable local
    /// reference; [`Session::retry_uploads`] replaces it later.
    pub async fn upload_media(
        &mut self,
        id: &str,
        file: UploadFile,
    ) -> Result<MediaRef> {
        self.ensure_writable()?;
        self.ensure_media_node(id)?;
        let media = self.uploader.upload(file).await?;
        self.attach_media(id, media.clone())?;
        Ok(media)
    }

    /// A handle for uploading without holding the session.
    pub fn uploader(&self) -> Uploader {
        self.uploader.clone()
    }

    /// Media nodes still holding a fallback reference.
    pub fn pending_uploads(&self) -> Vec<NodeId> {
        self.doc
            .content()
            .nodes()
            .iter()
            .filter(|node| node.data().media().is_some_and(MediaRef::is_retry_pending))
            .map(|node| node.id().clone())
            .collect()
    }

    /// Retry every pending upload. Returns the nodes that now hold a durable
    /// reference; failures stay pending.
    pub async fn retry_uploads(&mut self) -> Result<Vec<NodeId>> {
        self.ensure_writable()?;
        let mut recovered = Vec::new();
        for id in self.pending_uploads() {
            let Some(media) = self.doc.content().node(&id).and_then(|node| node.data().media()).cloned() else {
                continue;
            };
            match self.uploader.retry(&media).await {
                Ok(durable) => {
                    let url = durable.url.clone();
                    self.apply(Mutation::SetMedia {
                        id: id.clone(),
                        media: durable,
                    })?;
                    self.emit_node(&id, EditorEvent::Upload(UploadEvent::Recovered(url)));
                    recovered.push(id);
                }
                Err(err) => warn!(node = %id, error = %err, "upload retry failed"),
            }
        }
        Ok(recovered)
    }

    /// Submit the generation action of one node.
    pub fn generate(
        &mut self,
        id: &str,
    ) -> Result<JobId> {
        self.ensure_writable()?;
        let (request, generator) = jobs::prepare(self.doc.content(), &self.resolver, id, &HashMap::new())?;
        self.jobs.submit(self.doc.id(), request, generator)
    }

    /// Generate every node, upstream before downstream. Fails with `Cycle`
    /// when the graph is not a DAG.
    pub fn generate_all(&mut self) -> Result<Vec<JobId>> {
        self.ensure_writable()?;
        self.jobs.submit_flow(self.doc.id(), self.doc.content().clone(), self.resolver.clone())
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    /// Store the outputs of finished jobs on their nodes. Jobs whose node was
    /// deleted meanwhile are skipped.
    pub fn apply_finished_jobs(&mut self) -> Result<Vec<Job>> {
        let finished = self.jobs.take_finished();
        for job in finished.iter() {
            let Some(output) = job.output.clone().filter(|_| job.status == JobStatus::Succeeded) else {
                continue;
            };
            if !self.doc.content().contains_node(&job.node) {
                debug!(job = %job.id, node = %job.node, "node removed before its job finished");
                continue;
            }
            self.apply(Mutation::SetOutput {
                id: job.node.clone(),
                output,
            })?;
        }
        Ok(finished)
    }

    /// Whether the in-memory document is newer than the last confirmed save.
    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty(self.doc.updated_at())
    }

    pub fn save_status(&self) -> SaveState {
        self.autosave.state()
    }

    /// Save now and wait for the result.
    pub async fn flush(&self) -> Result<()> {
        if !self.is_dirty() {
            return Ok(());
        }
        self.autosave.flush(self.doc.clone()).await
    }

    /// Flush pending changes, then stop the autosave worker and cancel jobs.
    ///
    /// When the flush fails nothing is stopped: the session comes back inside
    /// the error, still dirty and with its autosave running.
    pub async fn close(self) -> std::result::Result<(), Box<CloseError>> {
        if let Err(error) = self.flush().await {
            return Err(CloseError::retain(self, error));
        }
        self.stop().await;
        Ok(())
    }

    /// Stop without saving. Pending and in-flight saves are dropped.
    pub async fn abandon(self) {
        if self.is_dirty() {
            warn!(doc = %self.doc.id(), "abandoning unsaved changes");
        }
        self.stop().await;
    }

    pub(crate) async fn stop(&self) {
        self.jobs.shutdown();
        self.autosave.shutdown().await;
        info!(doc = %self.doc.id(), "session closed");
        self.channel.emit(Message::document(self.doc.id(), EditorEvent::Document(DocumentEvent::Closed)));
    }

    fn publish(
        &mut self,
        applied: &[Applied],
        before: &HashMap<NodeId, Variant>,
    ) {
        let mut affected: Vec<&NodeId> = Vec::new();
        let mut changed = false;
        for entry in applied {
            if !entry.changed {
                continue;
            }
            changed = true;
            self.log.push(entry.mutation.clone());
            self.channel.emit(Message::document(
                self.doc.id(),
                EditorEvent::Document(DocumentEvent::Mutated(entry.mutation.name().to_string(), self.doc.updated_at())),
            ));
            if let Some(event) = node_event(&entry.mutation) {
                let node = match &entry.mutation {
                    Mutation::AddNode {
                        ..
                    }
                    | Mutation::DuplicateNode {
                        ..
                    } => entry.created.clone(),
                    Mutation::DeleteNode {
                        id,
                    }
                    | Mutation::UpdateData {
                        id,
                        ..
                    }
                    | Mutation::SetMedia {
                        id,
                        ..
                    }
                    | Mutation::SetOutput {
                        id,
                        ..
                    } => Some(id.clone()),
                    _ => None,
                };
                if let Some(node) = node {
                    self.emit_node(&node, EditorEvent::Node(event));
                }
            }
            for id in entry.affected.iter() {
                if !affected.contains(&id) {
                    affected.push(id);
                }
            }
        }

        for id in affected {
            let (Some(from), Ok(to)) = (before.get(id), self.resolver.resolve(self.doc.content(), id)) else {
                continue;
            };
            if *from != to {
                debug!(node = %id, from = from.as_ref(), to = to.as_ref(), "variant changed");
                self.emit_node(
                    id,
                    EditorEvent::Node(NodeEvent::VariantChanged(VariantChangedEvent {
                        from: *from,
                        to,
                    })),
                );
            }
        }

        if changed && let Err(err) = self.autosave.schedule(self.doc.clone()) {
            warn!(doc = %self.doc.id(), error = %err, "autosave not scheduled");
        }
    }

    fn emit_node(
        &self,
        id: &str,
        event: EditorEvent,
    ) {
        self.channel.emit(Message::node(self.doc.id(), id, event));
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.user.is_none() {
            return Err(FlowError::ReadOnly);
        }
        Ok(())
    }

    fn ensure_media_node(
        &self,
        id: &str,
    ) -> Result<()> {
        let node = self.doc.content().node(id).ok_or_else(|| FlowError::NodeNotFound(id.to_string()))?;
        if !node.data().is_media() {
            return Err(FlowError::InvalidData(format!("node {} does not hold media", id)));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("doc", self.doc.id())
            .field("version", &self.doc.updated_at())
            .field("read_only", &self.is_read_only())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

fn created(applied: Applied) -> Result<String> {
    applied.created.ok_or_else(|| FlowError::InvalidData(format!("{} created nothing", applied.mutation.name())))
}

fn node_event(mutation: &Mutation) -> Option<NodeEvent> {
    match mutation {
        Mutation::AddNode {
            ..
        }
        | Mutation::DuplicateNode {
            ..
        } => Some(NodeEvent::Added),
        Mutation::DeleteNode {
            ..
        } => Some(NodeEvent::Removed),
        Mutation::UpdateData {
            ..
        }
        | Mutation::SetMedia {
            ..
        }
        | Mutation::SetOutput {
            ..
        } => Some(NodeEvent::DataChanged),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;
    use crate::{
        EditorBuilder, StaticIdentity,
        events::{Event, SaveEvent},
        model::TextData,
        persist::{PersistenceGateway, SaveStatus, testing::RecordingGateway},
        upload::MemUploader,
    };

    fn user() -> User {
        User::new("u1", "Ada")
    }

    fn editor(gateway: Arc<RecordingGateway>) -> crate::Editor {
        EditorBuilder::new().store(gateway).identity(StaticIdentity::user(user())).build().unwrap()
    }

    fn drain(rx: &mut broadcast::Receiver<Event<Message>>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            messages.push(event.inner().clone());
        }
        messages
    }

    fn variant_changes(messages: &[Message]) -> Vec<(NodeId, Variant, Variant)> {
        messages
            .iter()
            .filter_map(|m| match &m.event {
                EditorEvent::Node(NodeEvent::VariantChanged(changed)) => Some((m.nid.clone(), changed.from, changed.to)),
                _ => None,
            })
            .collect()
    }

    fn text(value: &str) -> AddNodeOptions {
        AddNodeOptions::default().with_data(NodeData::Text(TextData {
            text: value.into(),
            ..Default::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_stamps_owner_and_saves() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());

        let session = editor.create("My flow").await.unwrap();
        assert_eq!(session.document().owner_id(), "u1");
        assert!(!session.is_dirty());
        assert!(gateway.exists(session.id()).await.unwrap());
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_delete_change_variants() {
        let editor = editor(Arc::new(RecordingGateway::new()));
        let mut session = editor.create("Flow").await.unwrap();
        let mut rx = editor.channel().subscribe();

        let a = session.add_node("text", text("a")).unwrap();
        let b = session.add_node("text", text("b")).unwrap();
        assert_eq!(session.variant(&a).unwrap(), Variant::Primitive);
        assert_eq!(session.variant(&b).unwrap(), Variant::Primitive);

        session.connect(&a, None, &b, None).unwrap();
        assert_eq!(session.variant(&a).unwrap(), Variant::Primitive);
        assert_eq!(session.variant(&b).unwrap(), Variant::Transform);

        session.delete_node(&a).unwrap();
        assert_eq!(session.variant(&b).unwrap(), Variant::Primitive);
        assert_eq!(session.document().content().edge_count(), 0);

        let changes = variant_changes(&drain(&mut rx));
        assert_eq!(
            changes,
            vec![(b.clone(), Variant::Primitive, Variant::Transform), (b.clone(), Variant::Transform, Variant::Primitive)]
        );
        session.abandon().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_type_is_rejected_without_side_effects() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());
        let mut session = editor.create("Flow").await.unwrap();
        session.add_node("text", AddNodeOptions::default()).unwrap();
        let count = session.document().content().node_count();
        let log = session.mutation_log().len();

        let err = session.add_node("unknown-type", AddNodeOptions::default()).unwrap_err();

        assert_eq!(err, FlowError::UnknownNodeType("unknown-type".into()));
        assert_eq!(session.document().content().node_count(), count);
        assert_eq!(session.mutation_log().len(), log);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_edits_saves_once() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());
        let mut session = editor.create("Flow").await.unwrap();
        let created = gateway.saved().len();

        let a = session.add_node("text", text("a")).unwrap();
        let b = session.add_node("text", text("b")).unwrap();
        session.connect(&a, None, &b, None).unwrap();
        session.move_node(&a, Position::new(10.0, 10.0)).unwrap();
        session.rename("Renamed").unwrap();
        assert!(session.is_dirty());
        assert_eq!(session.save_status().status, SaveStatus::Pending);

        tokio::time::sleep(Duration::from_millis(1500)).await;

        let saved = gateway.saved();
        assert_eq!(saved.len(), created + 1);
        assert_eq!(saved.last(), Some(session.document()));
        assert!(!session.is_dirty());
        assert_eq!(session.save_status().status, SaveStatus::Saved);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_saves_keep_the_session_dirty() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());
        let mut session = editor.create("Flow").await.unwrap();
        let mut rx = editor.channel().subscribe();
        gateway.fail_next(usize::MAX);

        session.add_node("text", AddNodeOptions::default()).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(session.is_dirty());
        assert_eq!(session.save_status().status, SaveStatus::Failed);
        let messages = drain(&mut rx);
        assert!(messages.iter().any(|m| matches!(m.event, EditorEvent::Save(SaveEvent::Retry(_)))));
        assert!(messages.iter().any(|m| matches!(m.event, EditorEvent::Save(SaveEvent::Failed(_)))));

        let kept = session.close().await.unwrap_err();
        assert!(matches!(kept.error, FlowError::Persistence(_)));
        let session = kept.session;
        assert!(session.is_dirty());
        assert!(!session.autosave.is_stopped());

        gateway.fail_next(0);
        let id = session.id().clone();
        let version = session.document().updated_at();
        session.close().await.unwrap();
        let stored = gateway.store.load(&id).await.unwrap();
        assert_eq!(stored.updated_at(), version);
        assert_eq!(stored.content().node_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_switch_keeps_the_current_session() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());
        let other = editor.create("Other").await.unwrap();
        let other_id = other.id().clone();
        other.close().await.unwrap();

        let mut session = editor.create("First").await.unwrap();
        let first_id = session.id().clone();
        let node = session.add_node("text", text("keep me")).unwrap();
        gateway.fail_next(usize::MAX);

        let kept = editor.switch(session, &other_id).await.unwrap_err();
        let mut session = kept.session;
        assert_eq!(session.id(), &first_id);
        assert!(session.is_dirty());
        assert!(session.document().content().contains_node(&node));
        assert_eq!(gateway.store.load(&first_id).await.unwrap().content().node_count(), 0);

        session.rename("Still editing").unwrap();
        gateway.fail_next(0);
        let version = session.document().updated_at();
        let session = editor.switch(session, &other_id).await.unwrap();
        assert_eq!(session.id(), &other_id);

        let stored = gateway.store.load(&first_id).await.unwrap();
        assert_eq!(stored.updated_at(), version);
        assert!(stored.content().contains_node(&node));
        assert_eq!(stored.name(), "Still editing");
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_to_missing_document_keeps_the_current_session() {
        let editor = editor(Arc::new(RecordingGateway::new()));
        let mut session = editor.create("First").await.unwrap();
        let node = session.add_node("text", AddNodeOptions::default()).unwrap();

        let kept = editor.switch(session, "missing").await.unwrap_err();
        assert_eq!(kept.error, FlowError::NotFound("missing".into()));
        let mut session = kept.session;
        assert!(!session.autosave.is_stopped());
        session.delete_node(&node).unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_anonymous_session_is_read_only() {
        let gateway = Arc::new(RecordingGateway::new());
        let owner = editor(gateway.clone());
        let mut session = owner.create("Shared").await.unwrap();
        let a = session.add_node("text", text("a")).unwrap();
        let b = session.add_node("text", text("b")).unwrap();
        session.connect(&a, None, &b, None).unwrap();
        let id = session.id().clone();
        session.close().await.unwrap();

        let anonymous = EditorBuilder::new().store(gateway.clone()).build().unwrap();
        assert_eq!(anonymous.create("Nope").await.err(), Some(FlowError::ReadOnly));

        let mut viewer = anonymous.open(&id).await.unwrap();
        assert!(viewer.is_read_only());
        assert_eq!(viewer.variant(&b).unwrap(), Variant::Transform);
        assert_eq!(viewer.add_node("text", AddNodeOptions::default()).unwrap_err(), FlowError::ReadOnly);
        assert_eq!(viewer.delete_node(&a).unwrap_err(), FlowError::ReadOnly);
        assert_eq!(viewer.generate(&a).unwrap_err(), FlowError::ReadOnly);
        assert_eq!(viewer.document().content().node_count(), 2);
        viewer.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_missing_document_is_not_found() {
        let editor = editor(Arc::new(RecordingGateway::new()));
        assert_eq!(editor.open("missing").await.err(), Some(FlowError::NotFound("missing".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_flushes_and_stops_previous_worker() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());
        let other = editor.create("Other").await.unwrap();
        let other_id = other.id().clone();
        other.close().await.unwrap();

        let mut session = editor.create("First").await.unwrap();
        let first_id = session.id().clone();
        session.add_node("text", AddNodeOptions::default()).unwrap();
        let version = session.document().updated_at();

        let session = editor.switch(session, &other_id).await.unwrap();
        assert_eq!(session.id(), &other_id);
        assert_eq!(gateway.store.load(&first_id).await.unwrap().updated_at(), version);

        let saves = gateway.attempts();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gateway.attempts(), saves);
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_drops_pending_changes() {
        let gateway = Arc::new(RecordingGateway::new());
        let editor = editor(gateway.clone());
        let mut session = editor.create("Flow").await.unwrap();
        let id = session.id().clone();
        let stored = gateway.store.load(&id).await.unwrap();

        session.add_node("text", AddNodeOptions::default()).unwrap();
        session.abandon().await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(gateway.store.load(&id).await.unwrap(), stored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_fallback_and_retry() {
        let uploads = MemUploader::new();
        let editor = EditorBuilder::new()
            .store(Arc::new(RecordingGateway::new()))
            .upload_gateway(Arc::new(uploads.clone()))
            .identity(StaticIdentity::user(user()))
            .build()
            .unwrap();
        let mut session = editor.create("Flow").await.unwrap();
        let image = session.add_node("image", AddNodeOptions::default()).unwrap();
        let file = UploadFile::new(vec![1, 2, 3], "image/png");

        uploads.set_online(false);
        let media = session.upload_media(&image, file.clone()).await.unwrap();
        assert!(media.is_retry_pending());
        assert_eq!(session.pending_uploads(), vec![image.clone()]);
        assert_eq!(session.document().content().node(&image).unwrap().data().media(), Some(&media));

        assert!(session.retry_uploads().await.unwrap().is_empty());
        assert_eq!(session.pending_uploads(), vec![image.clone()]);

        uploads.set_online(true);
        assert_eq!(session.retry_uploads().await.unwrap(), vec![image.clone()]);
        assert!(session.pending_uploads().is_empty());
        let durable = session.document().content().node(&image).unwrap().data().media().unwrap().clone();
        assert!(durable.durable);
        assert_eq!(uploads.get(&durable.url).unwrap().bytes, file.bytes);

        let text = session.add_node("text", AddNodeOptions::default()).unwrap();
        assert!(matches!(session.upload_media(&text, file).await, Err(FlowError::InvalidData(_))));
        session.close().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_editing_continues_while_an_upload_runs() {
        let uploads = MemUploader::new();
        let editor = EditorBuilder::new()
            .store(Arc::new(RecordingGateway::new()))
            .upload_gateway(Arc::new(uploads.clone()))
            .identity(StaticIdentity::user(user()))
            .build()
            .unwrap();
        let mut session = editor.create("Flow").await.unwrap();
        let image = session.add_node("image", AddNodeOptions::default()).unwrap();
        let doomed = session.add_node("video", AddNodeOptions::default()).unwrap();

        let uploader = session.uploader();
        let upload = tokio::spawn(async move { uploader.upload(UploadFile::new(vec![7, 7], "image/png")).await });
        let uploader = session.uploader();
        let late = tokio::spawn(async move { uploader.upload(UploadFile::new(vec![8], "video/mp4")).await });

        let prompt = session.add_node("text", text("a red fox")).unwrap();
        session.connect(&prompt, None, &image, Some("prompt")).unwrap();
        session.delete_node(&doomed).unwrap();

        let media = upload.await.unwrap().unwrap();
        assert!(media.durable);
        session.attach_media(&image, media.clone()).unwrap();
        let node = session.document().content().node(&image).unwrap();
        assert_eq!(node.data().media(), Some(&media));
        assert_eq!(session.variant(&image).unwrap(), Variant::Transform);
        assert_eq!(session.document().content().edge_count(), 1);

        let before = session.document().clone();
        let log = session.mutation_log().len();
        let media = late.await.unwrap().unwrap();
        assert_eq!(session.attach_media(&doomed, media).unwrap_err(), FlowError::NodeNotFound(doomed.clone()));
        assert_eq!(session.document(), &before);
        assert_eq!(session.mutation_log().len(), log);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_generation_output_is_applied_by_the_session() {
        let editor = editor(Arc::new(RecordingGateway::new()));
        let mut session = editor.create("Flow").await.unwrap();
        let a = session.add_node("text", text("hello")).unwrap();
        let b = session.add_node("text", text("")).unwrap();
        session.connect(&a, None, &b, None).unwrap();

        let jobs = session.generate_all().unwrap();
        let finished = session.jobs().wait_all(&jobs).await.unwrap();
        assert!(finished.iter().all(|job| job.status == JobStatus::Succeeded));

        let applied = session.apply_finished_jobs().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(session.document().content().node(&b).unwrap().data().output_value().as_deref(), Some("hello"));
        assert!(session.mutation_log().iter().any(|m| matches!(m, Mutation::SetOutput { .. })));
        session.abandon().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_through_session() {
        let editor = editor(Arc::new(RecordingGateway::new()));
        let mut session = editor.create("Flow").await.unwrap();
        let a = session.add_node("text", text("a")).unwrap();
        let b = session.add_node("text", text("b")).unwrap();
        session.connect(&a, None, &b, None).unwrap();

        let copy = session.duplicate_node(&b).unwrap();
        assert_eq!(session.variant(&copy).unwrap(), Variant::Primitive);
        assert_eq!(session.document().content().node(&copy).unwrap().data(), session.document().content().node(&b).unwrap().data());
        assert_eq!(session.connect(&a, None, &b, None).unwrap(), session.document().content().edges()[0].id);
        session.abandon().await;
    }
}
