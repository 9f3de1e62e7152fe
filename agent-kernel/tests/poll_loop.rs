use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_kernel::{
    ActionError, AgentError, AgentState, ExecutionContext, HandlerError, PollConfig, StopHandle,
    TaskAgent,
};
use agent_primitives::{
    ActionKind, ActionSubmission, AgentEvent, AgentIdentity, AgentToken, ApiKey, ExecutionId,
    ExecutionRecord,
};
use agent_transport::{ActionAck, PlatformTransport, PollFilters, TransportError, TransportResult};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

#[derive(Default)]
struct MockTransport {
    register_script: Mutex<VecDeque<TransportResult<AgentToken>>>,
    fetch_script: Mutex<VecDeque<TransportResult<Vec<ExecutionRecord>>>>,
    action_script: Mutex<VecDeque<TransportResult<ActionAck>>>,
    registrations: Mutex<Vec<Vec<AgentEvent>>>,
    fetches: AtomicUsize,
    filters: Mutex<Vec<PollFilters>>,
    submissions: Mutex<Vec<ActionSubmission>>,
    stop_after_fetches: Mutex<Option<(usize, StopHandle)>>,
}

impl MockTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script_register(&self, result: TransportResult<AgentToken>) {
        self.register_script.lock().unwrap().push_back(result);
    }

    fn script_fetch(&self, result: TransportResult<Vec<ExecutionRecord>>) {
        self.fetch_script.lock().unwrap().push_back(result);
    }

    fn script_action(&self, result: TransportResult<ActionAck>) {
        self.action_script.lock().unwrap().push_back(result);
    }

    fn stop_after(&self, fetches: usize, handle: StopHandle) {
        *self.stop_after_fetches.lock().unwrap() = Some((fetches, handle));
    }

    fn registrations(&self) -> Vec<Vec<AgentEvent>> {
        self.registrations.lock().unwrap().clone()
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn submissions(&self) -> Vec<ActionSubmission> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlatformTransport for MockTransport {
    async fn register(
        &self,
        _identity: &AgentIdentity,
        events: &[AgentEvent],
    ) -> TransportResult<AgentToken> {
        self.registrations.lock().unwrap().push(events.to_vec());
        self.register_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(AgentToken::new("agent-1").unwrap()))
    }

    async fn fetch_pending(
        &self,
        _token: &AgentToken,
        filters: &PollFilters,
    ) -> TransportResult<Vec<ExecutionRecord>> {
        let count = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.filters.lock().unwrap().push(filters.clone());
        if let Some((limit, handle)) = self.stop_after_fetches.lock().unwrap().as_ref() {
            if count >= *limit {
                handle.stop();
            }
        }
        self.fetch_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn post_action(&self, submission: &ActionSubmission) -> TransportResult<ActionAck> {
        self.submissions.lock().unwrap().push(submission.clone());
        self.action_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ActionAck::Accepted))
    }
}

fn identity() -> AgentIdentity {
    AgentIdentity::builder(ApiKey::new("avk_test").unwrap())
        .name("quality-checker")
        .unwrap()
        .project("proj-1")
        .add_task_type("polygon")
        .unwrap()
        .build()
        .unwrap()
}

fn agent(transport: &Arc<MockTransport>) -> TaskAgent {
    let transport: Arc<dyn PlatformTransport> = transport.clone();
    TaskAgent::new(identity(), transport)
        .with_poll_config(PollConfig::new(Duration::from_millis(10)))
        .unwrap()
}

fn record(id: &str, event: &str, payload: Value) -> ExecutionRecord {
    let payload = match payload {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ExecutionRecord::new(ExecutionId::new(id).unwrap(), event, payload)
}

fn poll_failure() -> TransportError {
    TransportError::Poll {
        attempts: 3,
        reason: "HTTP 503 Service Unavailable".into(),
    }
}

async fn reject_when_empty(ctx: ExecutionContext) -> Result<(), HandlerError> {
    let empty = ctx.as_result().is_some_and(|result| result.is_empty());
    if empty {
        ctx.reject("empty").await?;
    } else {
        ctx.approve("").await?;
    }
    Ok(())
}

#[tokio::test]
async fn empty_queue_processes_nothing() {
    let transport = MockTransport::new();
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 0);
    assert!(transport.submissions().is_empty());
    assert_eq!(transport.fetch_count(), 1);
    assert_eq!(agent.state(), AgentState::Registered);
}

#[tokio::test]
async fn empty_result_is_rejected() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![record(
        "E1",
        "result.submitted",
        json!({"task_uid": "T1", "result_data": []}),
    )]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 1);
    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].execution_id().as_str(), "E1");
    assert_eq!(submissions[0].action(), ActionKind::Reject);
    assert_eq!(submissions[0].reason(), Some("empty"));
}

#[tokio::test]
async fn registration_carries_subscribed_events_and_filters() {
    let transport = MockTransport::new();
    let mut agent = agent(&transport);
    agent
        .on("task.completed", |ctx| async move {
            ctx.skip().await?;
            Ok(())
        })
        .unwrap()
        .on("result.submitted", reject_when_empty)
        .unwrap();

    agent.run_once().await.expect("run_once");

    assert_eq!(
        transport.registrations(),
        [vec![AgentEvent::ResultSubmitted, AgentEvent::TaskCompleted]]
    );
    let filters = transport.filters.lock().unwrap().clone();
    assert_eq!(filters[0].project(), Some("proj-1"));
    assert!(filters[0].task_types().contains("polygon"));
    assert_eq!(agent.agent_token().map(AgentToken::as_str), Some("agent-1"));
}

#[tokio::test]
async fn invalid_event_registration_stores_nothing() {
    let transport = MockTransport::new();
    let mut agent = agent(&transport);

    let err = agent
        .on("bogus.event", reject_when_empty)
        .expect_err("unknown event");
    assert!(matches!(err, AgentError::InvalidEvent { .. }));
    assert!(agent.registry().is_empty());
}

#[tokio::test]
async fn second_action_in_handler_is_refused() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![record("E1", "task.completed", json!({}))]));
    let refused = Arc::new(AtomicUsize::new(0));
    let mut agent = agent(&transport);
    let counter = Arc::clone(&refused);
    agent
        .on("task.completed", move |ctx| {
            let counter = Arc::clone(&counter);
            async move {
                ctx.approve("").await?;
                if let Err(ActionError::AlreadyTaken { .. }) = ctx.reject("too late").await {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        })
        .unwrap();

    agent.run_once().await.expect("run_once");

    assert_eq!(refused.load(Ordering::SeqCst), 1);
    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].action(), ActionKind::Approve);
}

#[tokio::test]
async fn failing_handler_does_not_block_the_next() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![record("E1", "result.accepted", json!({}))]));
    let mut agent = agent(&transport);
    agent
        .on("result.accepted", |_ctx| async {
            Err(HandlerError::custom("model unavailable"))
        })
        .unwrap()
        .on("result.accepted", |ctx| async move {
            ctx.flag("needs review").await?;
            Ok(())
        })
        .unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 1);
    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].action(), ActionKind::Flag);
}

#[tokio::test]
async fn unhandled_execution_is_skipped_with_reason() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![
        record("E1", "result.rejected", json!({})),
        record("E2", "result.submitted", json!({"result_data": [{"label": "car"}]})),
    ]));
    let mut agent = agent(&transport);
    agent
        .on("result.submitted", |_ctx| async { Ok(()) })
        .unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 2);
    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 2);
    assert!(submissions.iter().all(|s| s.action() == ActionKind::Skip));
    assert!(submissions[0].reason().unwrap().contains("no handler registered"));
    assert!(submissions[1].reason().unwrap().contains("without taking an action"));
}

#[tokio::test]
async fn unknown_and_malformed_executions_do_not_stop_the_batch() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![
        record("E1", "dataset.created", json!({})),
        record("E2", "result.submitted", json!({"result_metadata": "oops"})),
        record("E3", "result.submitted", json!({})),
    ]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 3);
    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 3);
    assert!(submissions.iter().take(2).all(|s| s.action() == ActionKind::Skip));
    assert_eq!(submissions[0].execution_id().as_str(), "E1");
    assert_eq!(submissions[0].reason(), Some("unsupported event 'dataset.created'"));
    assert_eq!(submissions[1].execution_id().as_str(), "E2");
    assert!(submissions[1].reason().unwrap().starts_with("malformed payload: "));
    assert_eq!(submissions[2].execution_id().as_str(), "E3");
    assert_eq!(submissions[2].action(), ActionKind::Reject);
}

#[tokio::test]
async fn unknown_event_is_skipped_once_and_not_refetched() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![record("E1", "dataset.created", json!({}))]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    assert_eq!(agent.run_once().await.expect("first cycle"), 1);
    assert_eq!(agent.run_once().await.expect("second cycle"), 0);

    let submissions = transport.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].action(), ActionKind::Skip);
}

#[tokio::test]
async fn failed_registration_never_polls() {
    let transport = MockTransport::new();
    transport.script_register(Err(TransportError::registration(
        Some(401),
        "Invalid API key",
    )));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let err = agent.run_once().await.expect_err("registration fails");

    assert!(matches!(err, AgentError::Registration { status: Some(401), .. }));
    assert_eq!(transport.fetch_count(), 0);
    assert_eq!(agent.state(), AgentState::Unregistered);
    assert!(agent.agent_token().is_none());
}

#[tokio::test]
async fn run_surfaces_registration_failure() {
    let transport = MockTransport::new();
    transport.script_register(Err(TransportError::registration(None, "connection refused")));
    let mut agent = agent(&transport);

    let err = agent.run().await.expect_err("registration fails");
    assert!(err.is_fatal());
    assert_eq!(transport.fetch_count(), 0);
}

#[tokio::test]
async fn repeated_run_once_calls_are_independent() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![record("E1", "result.submitted", json!({}))]));
    transport.script_fetch(Ok(vec![record("E2", "result.submitted", json!({}))]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    assert_eq!(agent.run_once().await.unwrap(), 1);
    assert_eq!(agent.run_once().await.unwrap(), 1);
    assert_eq!(agent.run_once().await.unwrap(), 0);

    assert_eq!(transport.registrations().len(), 1);
    let ids: Vec<_> = transport
        .submissions()
        .iter()
        .map(|s| s.execution_id().as_str().to_owned())
        .collect();
    assert_eq!(ids, ["E1", "E2"]);
}

#[tokio::test]
async fn exhausted_poll_is_retryable() {
    let transport = MockTransport::new();
    transport.script_fetch(Err(poll_failure()));
    transport.script_fetch(Ok(vec![record("E1", "result.submitted", json!({}))]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let err = agent.run_once().await.expect_err("poll fails");
    assert!(matches!(err, AgentError::Poll { attempts: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(agent.state(), AgentState::Registered);

    assert_eq!(agent.run_once().await.unwrap(), 1);
}

#[tokio::test]
async fn expired_token_triggers_one_reregistration() {
    let transport = MockTransport::new();
    transport.script_register(Ok(AgentToken::new("agent-1").unwrap()));
    transport.script_register(Ok(AgentToken::new("agent-2").unwrap()));
    transport.script_fetch(Err(TransportError::Unauthorized { status: 401 }));
    transport.script_fetch(Ok(vec![record("E1", "result.submitted", json!({}))]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    assert_eq!(agent.run_once().await.unwrap(), 1);
    assert_eq!(transport.registrations().len(), 2);
    assert_eq!(agent.agent_token().map(AgentToken::as_str), Some("agent-2"));
}

#[tokio::test]
async fn repeated_rejection_is_fatal() {
    let transport = MockTransport::new();
    transport.script_fetch(Err(TransportError::Unauthorized { status: 403 }));
    transport.script_fetch(Err(TransportError::Unauthorized { status: 403 }));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let err = agent.run_once().await.expect_err("fatal");
    assert!(matches!(err, AgentError::Api { status: Some(403), .. }));
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[tokio::test]
async fn run_continues_after_poll_failure_until_stopped() {
    let transport = MockTransport::new();
    transport.script_fetch(Err(poll_failure()));
    transport.script_fetch(Ok(vec![record("E1", "result.submitted", json!({}))]));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();
    transport.stop_after(3, agent.stop_handle());

    tokio::time::timeout(Duration::from_secs(5), agent.run())
        .await
        .expect("loop should stop")
        .expect("clean stop");

    assert_eq!(transport.fetch_count(), 3);
    assert_eq!(transport.submissions().len(), 1);
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[tokio::test]
async fn run_stops_on_fatal_error() {
    let transport = MockTransport::new();
    transport.script_fetch(Err(TransportError::api(Some(400), "Invalid task_types")));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), agent.run())
        .await
        .expect("loop should stop")
        .expect_err("fatal error");

    assert!(matches!(err, AgentError::Api { status: Some(400), .. }));
    assert_eq!(transport.fetch_count(), 1);
    assert_eq!(agent.state(), AgentState::Stopped);
}

#[tokio::test]
async fn stop_handle_interrupts_sleep() {
    let transport = MockTransport::new();
    let transport_dyn: Arc<dyn PlatformTransport> = transport.clone();
    let mut agent = TaskAgent::new(identity(), transport_dyn)
        .with_poll_config(PollConfig::new(Duration::from_secs(3600)))
        .unwrap();
    let handle = agent.stop_handle();

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
    });

    tokio::time::timeout(Duration::from_secs(5), agent.run())
        .await
        .expect("stop should interrupt the sleep")
        .expect("clean stop");
    stopper.await.unwrap();

    assert_eq!(transport.fetch_count(), 1);
}

#[tokio::test]
async fn failed_delivery_is_not_resubmitted() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![record("E1", "result.submitted", json!({}))]));
    transport.script_action(Err(TransportError::Action {
        status: Some(500),
        attempts: 3,
        reason: "HTTP 500".into(),
    }));
    let mut agent = agent(&transport);
    agent.on("result.submitted", reject_when_empty).unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 1);
    assert_eq!(transport.submissions().len(), 1);
}

#[tokio::test]
async fn concurrent_batch_drops_duplicates() {
    let transport = MockTransport::new();
    transport.script_fetch(Ok(vec![
        record("E1", "result.submitted", json!({})),
        record("E2", "result.submitted", json!({})),
        record("E1", "result.submitted", json!({})),
        record("E3", "task.completed", json!({})),
    ]));
    let transport_dyn: Arc<dyn PlatformTransport> = transport.clone();
    let mut agent = TaskAgent::new(identity(), transport_dyn)
        .with_poll_config(
            PollConfig::new(Duration::from_millis(10))
                .with_max_concurrency(NonZeroUsize::new(4).unwrap()),
        )
        .unwrap();
    agent.on("result.submitted", reject_when_empty).unwrap();
    agent
        .on("task.completed", |ctx| async move {
            ctx.approve("done").await?;
            Ok(())
        })
        .unwrap();

    let processed = agent.run_once().await.expect("run_once");

    assert_eq!(processed, 3);
    let mut ids: Vec<_> = transport
        .submissions()
        .iter()
        .map(|s| s.execution_id().as_str().to_owned())
        .collect();
    ids.sort();
    assert_eq!(ids, ["E1", "E2", "E3"]);
}
