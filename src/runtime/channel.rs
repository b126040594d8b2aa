use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use tokio::{runtime::Handle, sync::broadcast};

use crate::{
    FlowError, Result, ShareLock,
    common::{BroadcastQueue, Shutdown},
    events::{EditorEvent, Event, Message, NodeEvent, SaveEvent, VariantChangedEvent},
};

macro_rules! dispatch_event {
    ($handles:expr, $(&$item:ident), +) => {
        let handlers = $handles.read().unwrap();
        for handle in handlers.iter() {
            (handle)($(&$item),+);
        }
    };
}

macro_rules! dispatch_event_async {
    ($handles:expr, $(&$item:ident), +) => {
        let handles = $handles.clone();

        tokio::spawn(async move {
            let handlers = handles.read().unwrap().clone();
            for handle in handlers.iter() {
                (handle)($(&$item),+).await;
            }
        });
    };
}

const EVENT_QUEUE_SIZE: usize = 2048;

pub type EditorEventHandle = Arc<dyn Fn(&Event<Message>) + Send + Sync>;
pub type EditorEventHandleAsync = Arc<dyn Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// use the glob pattern to match the document id
    /// eg. doc1*
    pub doc: String,

    /// use the glob pattern to match the node id
    /// eg. nid1*
    pub nid: String,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            doc: "*".to_string(),
            nid: "*".to_string(),
        }
    }
}

#[allow(unused)]
impl ChannelOptions {
    pub fn new(
        doc: String,
        nid: String,
    ) -> Self {
        Self {
            doc,
            nid,
        }
    }

    pub fn with_doc(doc: String) -> Self {
        Self {
            doc,
            nid: "*".to_string(),
        }
    }

    pub fn with_nid(nid: String) -> Self {
        Self {
            doc: "*".to_string(),
            nid,
        }
    }
}

/// Broadcasts editor events to registered handlers.
#[derive(Clone)]
pub struct Channel {
    event_queue: Arc<BroadcastQueue<Event<Message>>>,

    events: ShareLock<Vec<EditorEventHandle>>,
    events_async: ShareLock<Vec<EditorEventHandleAsync>>,

    handle: Handle,
    shutdown: Arc<Shutdown>,
}

impl Channel {
    pub(crate) fn new(handle: Handle) -> Self {
        Self {
            event_queue: BroadcastQueue::new(EVENT_QUEUE_SIZE),
            events: Arc::new(RwLock::new(Vec::new())),
            events_async: Arc::new(RwLock::new(Vec::new())),
            handle,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub(crate) fn event_queue(&self) -> Arc<BroadcastQueue<Event<Message>>> {
        self.event_queue.clone()
    }

    pub(crate) fn emit(
        &self,
        message: Message,
    ) {
        self.event_queue.send(Event::new(&message));
    }

    /// A raw receiver of every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event<Message>> {
        self.event_queue.subscribe()
    }

    pub(crate) fn listen(&self) {
        let mut event_queue = self.event_queue.subscribe();
        let events = self.events.clone();
        let events_async = self.events_async.clone();

        let shutdown = self.shutdown.clone();
        self.handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    received = event_queue.recv() => match received {
                        Ok(e) => {
                            let evt = e.clone();
                            dispatch_event!(events, &evt);
                            dispatch_event_async!(events_async, &e);
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }

    pub(crate) fn shutdown(&self) {
        self.shutdown.shutdown();
    }
}

/// Handler registration scoped by document and node glob patterns.
#[derive(Clone)]
pub struct ChannelEvent {
    channel: Arc<Channel>,

    glob: (globset::GlobMatcher, globset::GlobMatcher),
}

#[allow(unused)]
impl ChannelEvent {
    pub fn channel(
        channel: Arc<Channel>,
        options: ChannelOptions,
    ) -> Result<Self> {
        Ok(Self {
            channel,
            glob: (compile(&options.doc)?, compile(&options.nid)?),
        })
    }

    pub fn on_variant_changed(
        &self,
        f: impl Fn(&str, &VariantChangedEvent) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if let EditorEvent::Node(NodeEvent::VariantChanged(changed)) = &e.event
                && is_match(&glob, e)
            {
                f(&e.nid, changed);
            }
        }));
    }

    pub fn on_save(
        &self,
        f: impl Fn(&SaveEvent) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if let EditorEvent::Save(save) = &e.event
                && is_match(&glob, e)
            {
                f(save);
            }
        }));
    }

    pub fn on_error(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if e.event.is_error() && is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event(
        &self,
        f: impl Fn(&Event<Message>) + Send + Sync + 'static,
    ) {
        let glob = self.glob.clone();

        self.channel.events.write().unwrap().push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e);
            }
        }));
    }

    pub fn on_event_async<F>(
        &self,
        f: F,
    ) where
        F: Fn(&Event<Message>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        let glob = self.glob.clone();

        self.channel.events_async.write().unwrap().push(Arc::new(move |e| {
            if is_match(&glob, e) {
                f(e)
            } else {
                Box::pin(async {})
            }
        }));
    }
}

fn compile(pattern: &str) -> Result<globset::GlobMatcher> {
    globset::Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| FlowError::Config(format!("invalid channel pattern {}: {}", pattern, e)))
}

fn is_match(
    glob: &(globset::GlobMatcher, globset::GlobMatcher),
    e: &Event<Message>,
) -> bool {
    let (pat_doc, pat_nid) = glob;
    pat_doc.is_match(&e.doc) && pat_nid.is_match(&e.nid)
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use super::*;
    use crate::{events::DocumentEvent, registry::Variant};

    fn variant_changed(
        doc: &str,
        nid: &str,
    ) -> Message {
        Message::node(
            doc,
            nid,
            EditorEvent::Node(NodeEvent::VariantChanged(VariantChangedEvent {
                from: Variant::Primitive,
                to: Variant::Transform,
            })),
        )
    }

    #[tokio::test]
    async fn test_handlers_filter_by_glob() {
        let channel = Arc::new(Channel::new(Handle::current()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        ChannelEvent::channel(channel.clone(), ChannelOptions::with_doc("doc-a*".into())).unwrap().on_variant_changed(move |nid, changed| {
            sink.lock().unwrap().push((nid.to_string(), changed.to));
        });
        channel.listen();

        channel.emit(variant_changed("doc-b", "n1"));
        channel.emit(variant_changed("doc-a1", "n2"));
        channel.emit(Message::document("doc-a1", EditorEvent::Document(DocumentEvent::Closed)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*seen.lock().unwrap(), vec![("n2".to_string(), Variant::Transform)]);
        channel.shutdown();
    }

    #[tokio::test]
    async fn test_subscribe_receives_raw_events() {
        let channel = Channel::new(Handle::current());
        let mut rx = channel.subscribe();
        channel.emit(Message::document("doc", EditorEvent::Save(SaveEvent::Saved(3))));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, EditorEvent::Save(SaveEvent::Saved(3)));
        assert!(event.event.is_save());
    }

    #[test]
    fn test_invalid_pattern_is_a_config_error() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let channel = Arc::new(Channel::new(runtime.handle().clone()));
        let err = ChannelEvent::channel(channel, ChannelOptions::with_nid("[".into())).err().unwrap();
        assert!(matches!(err, FlowError::Config(_)));
    }
}
