use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use futures::future::join_all;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::{
    FlowError, Result, ShareLock,
    common::{BroadcastQueue, Queue, Shutdown},
    events::{EditorEvent, Event, JobEvent, Message},
    graph::{VariantResolver, execution_order},
    jobs::{Job, JobId, JobStatus},
    model::{DocumentId, GraphContent, NodeId},
    registry::{GenerateOutput, GenerateRequest, Generator, Variant},
    utils,
};

struct JobEntry {
    job: Job,
    done: Arc<Shutdown>,
}

/// Shared job table updated by running tasks.
#[derive(Clone)]
struct Tracker {
    jobs: ShareLock<HashMap<JobId, JobEntry>>,
    finished: Arc<Queue<JobId>>,
    events: Arc<BroadcastQueue<Event<Message>>>,
}

impl Tracker {
    fn create(
        &self,
        doc: &str,
        node: &str,
    ) -> JobId {
        let id = utils::longid();
        let job = Job {
            id: id.clone(),
            doc: doc.to_string(),
            node: node.to_string(),
            status: JobStatus::Pending,
            output: None,
            error: None,
            created_at: utils::time::time_millis(),
            finished_at: None,
        };
        self.jobs.write().unwrap().insert(
            id.clone(),
            JobEntry {
                job,
                done: Arc::new(Shutdown::new()),
            },
        );
        self.emit(doc, node, JobEvent::Pending(id.clone()));
        id
    }

    fn running(
        &self,
        id: &str,
    ) {
        let Some((doc, node)) = self.update(id, |job| job.status = JobStatus::Running) else {
            return;
        };
        self.emit(&doc, &node, JobEvent::Running(id.to_string()));
    }

    fn finish(
        &self,
        id: &str,
        result: Result<GenerateOutput>,
    ) {
        let now = utils::time::time_millis();
        let (status, output, error) = match result {
            Ok(generated) => (JobStatus::Succeeded, generated.output, None),
            Err(err) => (JobStatus::Failed, None, Some(err.to_string())),
        };
        let event_error = error.clone();
        let Some((doc, node)) = self.update(id, |job| {
            job.status = status;
            job.output = output;
            job.error = error;
            job.finished_at = Some(now);
        }) else {
            return;
        };

        let done = self.jobs.read().unwrap().get(id).map(|entry| entry.done.clone());
        let _ = self.finished.send(id.to_string());
        match event_error {
            None => self.emit(&doc, &node, JobEvent::Succeeded(id.to_string())),
            Some(error) => {
                warn!(job = %id, node = %node, error = %error, "generation failed");
                self.emit(&doc, &node, JobEvent::Failed(id.to_string(), error));
            }
        }
        if let Some(done) = done {
            done.shutdown();
        }
    }

    /// Apply `f` to a job that has not finished; returns its document and node.
    fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut Job),
    ) -> Option<(DocumentId, NodeId)> {
        let mut jobs = self.jobs.write().unwrap();
        let entry = jobs.get_mut(id)?;
        if entry.job.status.is_terminal() {
            return None;
        }
        f(&mut entry.job);
        Some((entry.job.doc.clone(), entry.job.node.clone()))
    }

    fn emit(
        &self,
        doc: &str,
        node: &str,
        event: JobEvent,
    ) {
        self.events.send(Event::new(&Message::node(doc, node, EditorEvent::Job(event))));
    }

    async fn run(
        &self,
        id: &str,
        generator: Arc<dyn Generator>,
        request: GenerateRequest,
    ) -> Option<String> {
        self.running(id);
        let result = generator.generate(request).await;
        let output = result.as_ref().ok().and_then(|generated| generated.output.clone());
        self.finish(id, result);
        output
    }

    fn cancel(
        &self,
        ids: &[JobId],
    ) {
        for id in ids {
            self.finish(id, Err(FlowError::Job("cancelled".into())));
        }
    }
}

/// Runs generation jobs on the editor's runtime.
pub struct JobRunner {
    handle: Handle,
    tracker: Tracker,
    shutdown: Arc<Shutdown>,
}

impl JobRunner {
    pub(crate) fn new(
        handle: Handle,
        events: Arc<BroadcastQueue<Event<Message>>>,
    ) -> Self {
        Self {
            handle,
            tracker: Tracker {
                jobs: Arc::new(RwLock::new(HashMap::new())),
                finished: Queue::new(),
                events,
            },
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    /// Submit one node generation. Returns immediately with the pending job id.
    pub fn submit(
        &self,
        doc: &str,
        request: GenerateRequest,
        generator: Arc<dyn Generator>,
    ) -> Result<JobId> {
        self.ensure_running()?;
        let id = self.tracker.create(doc, request.node.id());
        let tracker = self.tracker.clone();
        let shutdown = self.shutdown.clone();
        let job = id.clone();
        self.handle.spawn(async move {
            tokio::select! {
                _ = shutdown.wait() => tracker.cancel(std::slice::from_ref(&job)),
                _ = tracker.run(&job, generator, request) => {}
            }
        });
        Ok(id)
    }

    /// Generate every node of `content`, upstream before downstream.
    ///
    /// Outputs produced earlier in the run feed the inputs of later nodes.
    /// Fails with `Cycle` before any job is created if the graph has a cycle.
    pub fn submit_flow(
        &self,
        doc: &str,
        content: GraphContent,
        resolver: VariantResolver,
    ) -> Result<Vec<JobId>> {
        self.ensure_running()?;
        let order = execution_order(&content)?;
        info!(doc = %doc, nodes = order.len(), "flow generation submitted");

        let jobs: Vec<(JobId, NodeId)> = order.into_iter().map(|node| (self.tracker.create(doc, &node), node)).collect();
        let ids: Vec<JobId> = jobs.iter().map(|(id, _)| id.clone()).collect();

        let tracker = self.tracker.clone();
        let shutdown = self.shutdown.clone();
        let all = ids.clone();
        self.handle.spawn(async move {
            let work = async {
                let mut outputs: HashMap<NodeId, String> = HashMap::new();
                for (id, node) in jobs.iter() {
                    let prepared = prepare(&content, &resolver, node, &outputs);
                    let (request, generator) = match prepared {
                        Ok(prepared) => prepared,
                        Err(err) => {
                            tracker.finish(id, Err(err));
                            continue;
                        }
                    };
                    if let Some(output) = tracker.run(id, generator, request).await {
                        outputs.insert(node.clone(), output);
                    }
                }
            };
            tokio::select! {
                _ = shutdown.wait() => tracker.cancel(&all),
                _ = work => debug!("flow generation finished"),
            }
        });
        Ok(ids)
    }

    pub fn get(
        &self,
        id: &str,
    ) -> Option<Job> {
        self.tracker.jobs.read().unwrap().get(id).map(|entry| entry.job.clone())
    }

    pub fn status(
        &self,
        id: &str,
    ) -> Option<JobStatus> {
        self.get(id).map(|job| job.status)
    }

    /// Wait until the job succeeds or fails.
    pub async fn wait(
        &self,
        id: &str,
    ) -> Result<Job> {
        let done = self.tracker.jobs.read().unwrap().get(id).map(|entry| entry.done.clone());
        let done = done.ok_or_else(|| FlowError::Job(format!("unknown job {}", id)))?;
        done.wait().await;
        self.get(id).ok_or_else(|| FlowError::Job(format!("unknown job {}", id)))
    }

    pub async fn wait_all(
        &self,
        ids: &[JobId],
    ) -> Result<Vec<Job>> {
        join_all(ids.iter().map(|id| self.wait(id))).await.into_iter().collect()
    }

    /// Jobs that finished since the last call, in completion order.
    ///
    /// Taken jobs leave the job table: `get` and `wait` no longer know them.
    pub fn take_finished(&self) -> Vec<Job> {
        let mut finished = Vec::new();
        while let Some(id) = self.tracker.finished.try_next() {
            if let Some(entry) = self.tracker.jobs.write().unwrap().remove(&id) {
                finished.push(entry.job);
            }
        }
        finished
    }

    /// Cancel every unfinished job. Cancelled jobs end as failed.
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_terminated() {
            return Err(FlowError::Job("job runner is stopped".into()));
        }
        Ok(())
    }
}

/// Build the request for `node` from the current content and earlier outputs.
pub(crate) fn prepare(
    content: &GraphContent,
    resolver: &VariantResolver,
    node: &str,
    outputs: &HashMap<NodeId, String>,
) -> Result<(GenerateRequest, Arc<dyn Generator>)> {
    let snapshot = content.node(node).ok_or_else(|| FlowError::NodeNotFound(node.to_string()))?;
    let descriptor = resolver.registry().lookup(snapshot.node_type())?;
    let variant = resolver.resolve(content, node)?;
    let input = match variant {
        Variant::Primitive => None,
        Variant::Transform => resolver.gather_input(content, node, outputs)?,
    };
    let request = GenerateRequest {
        node: snapshot.clone(),
        variant,
        input,
    };
    Ok((request, descriptor.generator()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        graph::{AddNodeOptions, EditPolicy, Mutation},
        model::{GraphDocument, NodeData, TextData},
        registry::{NodeDescriptor, NodeRegistry},
    };

    struct SlowGenerator;

    #[async_trait]
    impl Generator for SlowGenerator {
        async fn generate(
            &self,
            _: GenerateRequest,
        ) -> Result<GenerateOutput> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GenerateOutput::default())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(
            &self,
            _: GenerateRequest,
        ) -> Result<GenerateOutput> {
            Err(FlowError::Job("model offline".into()))
        }
    }

    fn runner() -> JobRunner {
        JobRunner::new(Handle::current(), BroadcastQueue::new(64))
    }

    fn text_doc(
        registry: &NodeRegistry,
        texts: &[&str],
        edges: &[(usize, usize)],
    ) -> (GraphDocument, Vec<NodeId>) {
        let policy = EditPolicy::default();
        let mut doc = GraphDocument::new("doc", "owner", "Flow");
        let ids: Vec<NodeId> = texts
            .iter()
            .map(|text| {
                let data = NodeData::Text(TextData {
                    text: text.to_string(),
                    ..Default::default()
                });
                doc.apply(registry, &policy, Mutation::add_node("text", AddNodeOptions::default().with_data(data))).unwrap().created.unwrap()
            })
            .collect();
        for (from, to) in edges {
            doc.apply(registry, &policy, Mutation::connect(ids[*from].as_str(), None, ids[*to].as_str(), None)).unwrap();
        }
        (doc, ids)
    }

    #[tokio::test]
    async fn test_submit_runs_to_success() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let resolver = VariantResolver::new(registry.clone());
        let (doc, ids) = text_doc(&registry, &["hello"], &[]);
        let runner = runner();

        let (request, generator) = prepare(doc.content(), &resolver, &ids[0], &HashMap::new()).unwrap();
        let job = runner.submit(doc.id(), request, generator).unwrap();
        assert!(runner.status(&job).is_some());

        let finished = runner.wait(&job).await.unwrap();
        assert_eq!(finished.status, JobStatus::Succeeded);
        assert_eq!(finished.output.as_deref(), Some("hello"));
        assert!(finished.finished_at.is_some());
        assert_eq!(runner.take_finished(), vec![finished]);
        assert!(runner.take_finished().is_empty());
    }

    #[tokio::test]
    async fn test_taken_jobs_leave_the_table() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let resolver = VariantResolver::new(registry.clone());
        let (doc, ids) = text_doc(&registry, &["a", "b"], &[]);
        let runner = runner();

        let mut jobs = Vec::new();
        for node in ids.iter() {
            let (request, generator) = prepare(doc.content(), &resolver, node, &HashMap::new()).unwrap();
            jobs.push(runner.submit(doc.id(), request, generator).unwrap());
        }
        runner.wait_all(&jobs).await.unwrap();

        assert_eq!(runner.take_finished().len(), 2);
        assert!(runner.tracker.jobs.read().unwrap().is_empty());
        assert!(runner.get(&jobs[0]).is_none());
        assert!(matches!(runner.wait(&jobs[1]).await, Err(FlowError::Job(_))));
    }

    #[tokio::test]
    async fn test_failed_generation_is_reported() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let resolver = VariantResolver::new(registry.clone());
        let (doc, ids) = text_doc(&registry, &["hello"], &[]);
        let runner = runner();

        let (request, _) = prepare(doc.content(), &resolver, &ids[0], &HashMap::new()).unwrap();
        let job = runner.submit(doc.id(), request, Arc::new(FailingGenerator)).unwrap();
        let finished = runner.wait(&job).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert_eq!(finished.error.as_deref(), Some("model offline"));
    }

    #[tokio::test]
    async fn test_flow_feeds_outputs_downstream() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let resolver = VariantResolver::new(registry.clone());
        let (mut doc, ids) = text_doc(&registry, &["", "", "root"], &[(2, 1), (1, 0)]);
        doc.apply(
            &registry,
            &EditPolicy::default(),
            Mutation::UpdateData {
                id: ids[1].clone(),
                data: NodeData::Text(TextData {
                    instructions: "shout".into(),
                    ..Default::default()
                }),
            },
        )
        .unwrap();
        let runner = runner();

        let jobs = runner.submit_flow(doc.id(), doc.content().clone(), resolver).unwrap();
        let finished = runner.wait_all(&jobs).await.unwrap();

        let nodes: Vec<&str> = finished.iter().map(|job| job.node.as_str()).collect();
        assert_eq!(nodes, vec![ids[2].as_str(), ids[1].as_str(), ids[0].as_str()]);
        assert!(finished.iter().all(|job| job.status == JobStatus::Succeeded));
        assert_eq!(finished[2].output.as_deref(), Some("shout\n\nroot"));
    }

    #[tokio::test]
    async fn test_flow_with_cycle_is_rejected() {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let (doc, _) = text_doc(&registry, &["a", "b"], &[(0, 1), (1, 0)]);
        let runner = runner();

        let err = runner.submit_flow(doc.id(), doc.content().clone(), VariantResolver::new(registry)).unwrap_err();
        assert!(matches!(err, FlowError::Cycle(_)));
        assert!(runner.take_finished().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_running_jobs() {
        let mut registry = NodeRegistry::with_builtins();
        registry.register(NodeDescriptor::new("slow".into(), "Slow", Arc::new(SlowGenerator)));
        let registry = Arc::new(registry);
        let resolver = VariantResolver::new(registry.clone());
        let mut doc = GraphDocument::new("doc", "owner", "Flow");
        let id = doc
            .apply(&registry, &EditPolicy::default(), Mutation::add_node("slow", AddNodeOptions::default()))
            .unwrap()
            .created
            .unwrap();
        let runner = runner();

        let (request, generator) = prepare(doc.content(), &resolver, &id, &HashMap::new()).unwrap();
        let job = runner.submit(doc.id(), request, generator).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runner.status(&job), Some(JobStatus::Running));

        runner.shutdown();
        let finished = runner.wait(&job).await.unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(runner.submit(doc.id(), prepare(doc.content(), &resolver, &id, &HashMap::new()).unwrap().0, Arc::new(SlowGenerator)).is_err());
    }
}
