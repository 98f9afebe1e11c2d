//! Agent record and lifecycle controller.
//!
//! An agent moves through `Created -> Running -> Terminated`. Identity fields
//! are fixed at creation; mutable fields sit behind the record's own lock so
//! that one agent never waits on another.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OnceCell;

use crate::adapters::{AgentAdapters, Service};
use crate::core::routing::{Delivery, Router};
use crate::error::{Error, Result};
use crate::protocol::{
    ACLMessage, AgentId, AgentIdentity, AgentInfo, AgentSpec, Inbox, Mailbox, Status, StatusCode,
};
use crate::task::AgentTask;

#[derive(Debug)]
struct AgentState {
    custom: String,
    status: Status,
    active: bool,
}

/// One hosted agent.
pub struct Agent {
    id: AgentId,
    node_id: u64,
    mas_id: u64,
    name: String,
    a_type: String,
    a_subtype: String,
    state: Mutex<AgentState>,
    mailbox: Mailbox,
    inbox: Mutex<Option<Inbox>>,
    adapters: AgentAdapters,
    router: Router,
    teardown: OnceCell<()>,
}

impl Agent {
    pub(crate) fn new(
        info: &AgentInfo,
        adapters: AgentAdapters,
        router: Router,
        inbox_capacity: usize,
    ) -> Arc<Self> {
        let (mailbox, inbox) = Mailbox::channel(info.id, inbox_capacity);
        Arc::new(Self {
            id: info.id,
            node_id: info.spec.node_id,
            mas_id: info.mas_id,
            name: info.spec.name.clone(),
            a_type: info.spec.a_type.clone(),
            a_subtype: info.spec.a_subtype.clone(),
            state: Mutex::new(AgentState {
                custom: info.spec.custom.clone(),
                status: Status::new(StatusCode::Created),
                active: true,
            }),
            mailbox,
            inbox: Mutex::new(Some(inbox)),
            adapters,
            router,
            teardown: OnceCell::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run the agent's task as an independent tokio task and mark it running.
    ///
    /// Starting twice is a programming error and is reported as `Internal`.
    pub fn start(self: &Arc<Self>, task: Arc<dyn AgentTask>) -> Result<()> {
        let inbox = self
            .inbox
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| {
                tracing::error!(agent_id = self.id, "Agent started twice");
                Error::internal(format!("agent {} was already started", self.id))
            })?;

        {
            let mut state = self.lock_state();
            if !state.active {
                return Err(Error::internal(format!(
                    "agent {} was terminated before it started",
                    self.id
                )));
            }
            state.status = Status::new(StatusCode::Running);
        }

        let agent = Arc::clone(self);
        let id = self.id;
        let handle = tokio::spawn(async move { task.run(agent, inbox).await });

        // Supervisor: reports how the task ended. Termination happens through
        // the mailbox closing, never by aborting the task.
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(())) => tracing::info!(agent_id = id, "Agent task finished"),
                Ok(Err(e)) => tracing::error!(agent_id = id, "Agent task failed: {}", e),
                Err(e) if e.is_panic() => tracing::error!(agent_id = id, "Agent task panicked"),
                Err(e) => tracing::warn!(agent_id = id, "Agent task cancelled: {}", e),
            }
        });

        tracing::info!(agent_id = id, "Started agent");
        Ok(())
    }

    /// Deactivate the agent and release its resources.
    ///
    /// Resources are released in order: mailbox, logger, pub/sub, directory.
    /// Each release is attempted even if an earlier one failed; failures are
    /// logged only. Concurrent and repeated calls wait for the first one and
    /// release nothing twice.
    pub async fn terminate(&self) {
        self.teardown
            .get_or_init(|| async {
                {
                    let mut state = self.lock_state();
                    state.active = false;
                    state.status = Status::new(StatusCode::Terminated);
                }
                tracing::info!(agent_id = self.id, "Terminating agent");

                if !self.mailbox.close() {
                    tracing::warn!(agent_id = self.id, "Mailbox was already closed");
                }
                if let Err(e) = self.adapters.logger.close().await {
                    tracing::error!(agent_id = self.id, "Failed to close logger: {}", e);
                }
                if let Err(e) = self.adapters.pubsub.close().await {
                    tracing::error!(agent_id = self.id, "Failed to close pub/sub client: {}", e);
                }
                if let Err(e) = self.adapters.directory.close().await {
                    tracing::error!(agent_id = self.id, "Failed to close directory client: {}", e);
                }
            })
            .await;
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity {
            agent_id: self.id,
            node_id: self.node_id,
            mas_id: self.mas_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type and subtype.
    pub fn agent_type(&self) -> (&str, &str) {
        (&self.a_type, &self.a_subtype)
    }

    pub fn custom_data(&self) -> String {
        self.lock_state().custom.clone()
    }

    /// Replace the custom payload. Last writer wins.
    pub fn update_custom_data(&self, value: impl Into<String>) -> Result<()> {
        let mut state = self.lock_state();
        if !state.active {
            return Err(Error::NotFound(format!("agent {} is terminated", self.id)));
        }
        state.custom = value.into();
        state.status.last_update = chrono::Utc::now();
        Ok(())
    }

    pub fn status(&self) -> Status {
        self.lock_state().status.clone()
    }

    pub fn is_active(&self) -> bool {
        self.lock_state().active
    }

    /// Snapshot in wire form.
    pub fn info(&self) -> AgentInfo {
        let state = self.lock_state();
        AgentInfo {
            spec: AgentSpec {
                node_id: self.node_id,
                name: self.name.clone(),
                a_type: self.a_type.clone(),
                a_subtype: self.a_subtype.clone(),
                custom: state.custom.clone(),
            },
            mas_id: self.mas_id,
            id: self.id,
            status: Some(state.status.code),
        }
    }

    /// Put a message on this agent's inbound queue without waiting.
    pub fn deliver(&self, msg: ACLMessage) -> Result<()> {
        self.mailbox.try_deliver(msg)
    }

    /// Messages queued but not yet read by the task.
    pub fn pending_messages(&self) -> usize {
        self.mailbox.pending()
    }

    /// Send a message on behalf of this agent. The sender field is forced to
    /// this agent's id.
    pub async fn send(&self, mut msg: ACLMessage) -> Result<Delivery> {
        if !self.is_active() {
            return Err(Error::internal(format!(
                "agent {} is terminated and cannot send",
                self.id
            )));
        }
        msg.sender = self.id;
        self.router.dispatch(msg).await
    }

    pub fn log_info(&self, msg: &str) {
        self.adapters.logger.info(msg);
    }

    pub fn log_error(&self, msg: &str) {
        self.adapters.logger.error(msg);
    }

    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.adapters.pubsub.publish(topic, payload).await
    }

    pub async fn register_service(&self, desc: &str) -> Result<String> {
        self.adapters.directory.register(desc).await
    }

    pub async fn deregister_service(&self, service_id: &str) -> Result<()> {
        self.adapters.directory.deregister(service_id).await
    }

    pub async fn search_services(&self, desc: &str) -> Result<Vec<Service>> {
        self.adapters.directory.search(desc).await
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("mas_id", &self.mas_id)
            .field("name", &self.name)
            .field("type", &self.a_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::{AgentLogger, DirectoryClient, PubSubClient};
    use crate::core::peers::StaticPeers;
    use crate::core::remote::RemoteClient;
    use crate::core::AgentTable;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Close counters shared by the counting adapters of one agent.
    #[derive(Default)]
    pub(crate) struct CloseCounts {
        pub logger: AtomicUsize,
        pub pubsub: AtomicUsize,
        pub directory: AtomicUsize,
    }

    struct CountingLogger(Arc<CloseCounts>);
    struct CountingPubSub(Arc<CloseCounts>, bool);
    struct CountingDirectory(Arc<CloseCounts>);

    #[async_trait]
    impl AgentLogger for CountingLogger {
        fn info(&self, _msg: &str) {}
        fn error(&self, _msg: &str) {}
        async fn close(&self) -> Result<()> {
            self.0.logger.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl PubSubClient for CountingPubSub {
        async fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            self.0.pubsub.fetch_add(1, Ordering::SeqCst);
            if self.1 {
                return Err(Error::internal("broker unreachable"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DirectoryClient for CountingDirectory {
        async fn register(&self, _desc: &str) -> Result<String> {
            Ok("svc".to_string())
        }
        async fn deregister(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn search(&self, _desc: &str) -> Result<Vec<Service>> {
            Ok(Vec::new())
        }
        async fn close(&self) -> Result<()> {
            self.0.directory.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    pub(crate) fn counting_adapters(counts: &Arc<CloseCounts>, failing_pubsub: bool) -> AgentAdapters {
        AgentAdapters {
            logger: Box::new(CountingLogger(Arc::clone(counts))),
            pubsub: Box::new(CountingPubSub(Arc::clone(counts), failing_pubsub)),
            directory: Box::new(CountingDirectory(Arc::clone(counts))),
        }
    }

    fn test_router() -> Router {
        Router::new(
            Arc::new(AgentTable::default()),
            Arc::new(StaticPeers::new()),
            RemoteClient::new(Duration::from_millis(200)).unwrap(),
            "http://127.0.0.1:1".to_string(),
        )
    }

    fn test_agent(counts: &Arc<CloseCounts>, failing_pubsub: bool) -> Arc<Agent> {
        let info = AgentInfo::new(1, "pump", "device")
            .with_node(5)
            .with_custom("initial");
        Agent::new(&info, counting_adapters(counts, failing_pubsub), test_router(), 4)
    }

    fn idle_task() -> Arc<dyn AgentTask> {
        Arc::new(|_agent: Arc<Agent>, mut inbox: Inbox| async move {
            while inbox.recv().await.is_some() {}
            Ok::<(), Error>(())
        })
    }

    #[tokio::test]
    async fn test_start_sets_running() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, false);
        assert_eq!(agent.status().code, StatusCode::Created);

        agent.start(idle_task()).unwrap();
        assert_eq!(agent.status().code, StatusCode::Running);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, false);
        agent.start(idle_task()).unwrap();

        let err = agent.start(idle_task()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, false);
        agent.start(idle_task()).unwrap();

        agent.terminate().await;
        agent.terminate().await;

        assert!(!agent.is_active());
        assert_eq!(agent.status().code, StatusCode::Terminated);
        assert_eq!(counts.logger.load(Ordering::SeqCst), 1);
        assert_eq!(counts.pubsub.load(Ordering::SeqCst), 1);
        assert_eq!(counts.directory.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_release_does_not_block_others() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, true);

        agent.terminate().await;

        assert_eq!(counts.pubsub.load(Ordering::SeqCst), 1);
        assert_eq!(counts.directory.load(Ordering::SeqCst), 1);
        let err = agent.deliver(ACLMessage::new(2, 1, "late")).unwrap_err();
        assert!(matches!(err, Error::Undeliverable(_)));
    }

    #[tokio::test]
    async fn test_accessors_survive_termination() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, false);
        agent.update_custom_data("updated").unwrap();

        agent.terminate().await;

        assert_eq!(agent.id(), 1);
        assert_eq!(agent.name(), "pump");
        assert_eq!(agent.agent_type(), ("device", ""));
        assert_eq!(agent.custom_data(), "updated");
        assert_eq!(agent.identity().node_id, 5);
        assert!(agent.update_custom_data("too late").is_err());
        assert_eq!(agent.custom_data(), "updated");
    }

    #[tokio::test]
    async fn test_concurrent_custom_updates() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, false);

        let mut handles = Vec::new();
        for i in 0..16 {
            let agent = Arc::clone(&agent);
            handles.push(tokio::spawn(async move {
                agent.update_custom_data(format!("v{}", i)).unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let value = agent.custom_data();
        assert!(value.starts_with('v'));
        assert_eq!(agent.info().spec.custom, value);
    }

    #[tokio::test]
    async fn test_start_after_terminate_fails() {
        let counts = Arc::new(CloseCounts::default());
        let agent = test_agent(&counts, false);
        agent.terminate().await;
        assert!(agent.start(idle_task()).is_err());
        assert_eq!(agent.status().code, StatusCode::Terminated);
    }

    #[tokio::test]
    async fn test_adapters_usable_until_terminated() {
        use crate::adapters::{AdapterFactory, LocalAdapters};

        let local = LocalAdapters::new();
        let mut events = local.broker().subscribe();
        let info = AgentInfo::new(1, "pump", "device").with_mas(2);
        let agent = Agent::new(
            &info,
            local.build(&info.identity()).unwrap(),
            test_router(),
            4,
        );

        agent.publish("telemetry", b"42").await.unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.topic, "telemetry");
        assert_eq!(event.publisher, 1);
        assert_eq!(event.payload, b"42".to_vec());

        let service_id = agent.register_service("pumping").await.unwrap();
        let found = agent.search_services("pumping").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, service_id);

        let spare = agent.register_service("spare").await.unwrap();
        agent.deregister_service(&spare).await.unwrap();
        assert_eq!(local.directory().len(), 1);

        agent.terminate().await;
        assert!(agent.publish("telemetry", b"43").await.is_err());
        assert!(agent.register_service("pumping").await.is_err());
        assert!(agent.search_services("pumping").await.is_err());
        assert!(local.directory().is_empty());
    }
}
