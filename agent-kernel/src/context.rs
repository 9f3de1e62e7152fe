//! Per-execution contexts handed to event handlers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use agent_primitives::{
    ActionKind, ActionSubmission, AgentEvent, EventFamily, ExecutionId, ExecutionRecord,
};
use agent_transport::ActionAck;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::dispatcher::ActionDispatcher;
use crate::error::{ActionError, ActionResult, AgentError, AgentResult};

/// Read-only view of a result-level event.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultContext {
    task_id: String,
    result_id: String,
    result_data: Value,
    result_metadata: Map<String, Value>,
    task_name: Option<String>,
    task_type: Option<String>,
    project_id: Option<String>,
}

impl ResultContext {
    /// Task the result belongs to.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Identifier of the submitted result.
    #[must_use]
    pub fn result_id(&self) -> &str {
        &self.result_id
    }

    /// Opaque annotation payload; an empty array when the platform sent none.
    #[must_use]
    pub fn result_data(&self) -> &Value {
        &self.result_data
    }

    /// Returns `true` when the result carries no annotations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match &self.result_data {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            _ => false,
        }
    }

    /// Free-form metadata attached to the result.
    #[must_use]
    pub fn result_metadata(&self) -> &Map<String, Value> {
        &self.result_metadata
    }

    /// Human-readable task name.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    /// Annotation task type, e.g. `polygon`.
    #[must_use]
    pub fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    /// Project the task belongs to.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

/// Read-only view of a task-level event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskContext {
    task_id: String,
    task_name: Option<String>,
    task_type: Option<String>,
    task_status: Option<String>,
    project_id: Option<String>,
}

impl TaskContext {
    /// Task identifier.
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Human-readable task name.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        self.task_name.as_deref()
    }

    /// Annotation task type.
    #[must_use]
    pub fn task_type(&self) -> Option<&str> {
        self.task_type.as_deref()
    }

    /// Workflow status reported with the event.
    #[must_use]
    pub fn task_status(&self) -> Option<&str> {
        self.task_status.as_deref()
    }

    /// Project the task belongs to.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

#[derive(Deserialize)]
struct ResultPayload {
    task_uid: Option<String>,
    result_uid: Option<String>,
    result_data: Option<Value>,
    result_metadata: Option<Map<String, Value>>,
    task_name: Option<String>,
    task_type: Option<String>,
    project_uid: Option<String>,
}

impl From<ResultPayload> for ResultContext {
    fn from(payload: ResultPayload) -> Self {
        Self {
            task_id: payload.task_uid.unwrap_or_default(),
            result_id: payload.result_uid.unwrap_or_default(),
            result_data: payload
                .result_data
                .unwrap_or_else(|| Value::Array(Vec::new())),
            result_metadata: payload.result_metadata.unwrap_or_default(),
            task_name: payload.task_name,
            task_type: payload.task_type,
            project_id: payload.project_uid,
        }
    }
}

#[derive(Deserialize)]
struct TaskPayload {
    task_uid: Option<String>,
    task_name: Option<String>,
    task_type: Option<String>,
    task_status: Option<String>,
    project_uid: Option<String>,
}

impl From<TaskPayload> for TaskContext {
    fn from(payload: TaskPayload) -> Self {
        Self {
            task_id: payload.task_uid.unwrap_or_default(),
            task_name: payload.task_name,
            task_type: payload.task_type,
            task_status: payload.task_status,
            project_id: payload.project_uid,
        }
    }
}

/// Event-specific projection carried by an [`ExecutionContext`].
#[derive(Clone, Debug, PartialEq)]
pub enum ContextView {
    /// `result.*` events.
    Result(ResultContext),
    /// `task.*` events.
    Task(TaskContext),
}

/// Whether an execution has been resolved by an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// No action taken yet.
    Pending,
    /// An action won; later attempts are refused.
    Resolved(ActionKind),
}

const PENDING: u8 = 0;

const fn encode(action: ActionKind) -> u8 {
    match action {
        ActionKind::Approve => 1,
        ActionKind::Reject => 2,
        ActionKind::Flag => 3,
        ActionKind::Skip => 4,
    }
}

const fn decode(state: u8) -> Resolution {
    match state {
        PENDING => Resolution::Pending,
        1 => Resolution::Resolved(ActionKind::Approve),
        2 => Resolution::Resolved(ActionKind::Reject),
        3 => Resolution::Resolved(ActionKind::Flag),
        _ => Resolution::Resolved(ActionKind::Skip),
    }
}

struct ContextInner {
    record: ExecutionRecord,
    event: AgentEvent,
    view: ContextView,
    resolution: AtomicU8,
    delivered: AtomicBool,
    dispatcher: ActionDispatcher,
}

/// Handle to one pending execution.
///
/// Clones share resolution state, so at most one action is ever submitted per
/// execution no matter how many handlers or tasks hold the context.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", self.execution_id())
            .field("event", &self.inner.event)
            .field("view", &self.inner.view)
            .field("resolution", &self.resolution())
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Execution identifier.
    #[must_use]
    pub fn execution_id(&self) -> &ExecutionId {
        self.inner.record.execution_id()
    }

    /// Event that produced the execution.
    #[must_use]
    pub fn event(&self) -> AgentEvent {
        self.inner.event
    }

    /// Raw record as returned by the platform.
    #[must_use]
    pub fn record(&self) -> &ExecutionRecord {
        &self.inner.record
    }

    /// Event-specific projection.
    #[must_use]
    pub fn view(&self) -> &ContextView {
        &self.inner.view
    }

    /// Result projection, for `result.*` events.
    #[must_use]
    pub fn as_result(&self) -> Option<&ResultContext> {
        match &self.inner.view {
            ContextView::Result(result) => Some(result),
            ContextView::Task(_) => None,
        }
    }

    /// Task projection, for `task.*` events.
    #[must_use]
    pub fn as_task(&self) -> Option<&TaskContext> {
        match &self.inner.view {
            ContextView::Task(task) => Some(task),
            ContextView::Result(_) => None,
        }
    }

    /// Task identifier, whichever projection is carried.
    #[must_use]
    pub fn task_id(&self) -> &str {
        match &self.inner.view {
            ContextView::Result(result) => result.task_id(),
            ContextView::Task(task) => task.task_id(),
        }
    }

    /// Project identifier, whichever projection is carried.
    #[must_use]
    pub fn project_id(&self) -> Option<&str> {
        match &self.inner.view {
            ContextView::Result(result) => result.project_id(),
            ContextView::Task(task) => task.project_id(),
        }
    }

    /// Current resolution state.
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        decode(self.inner.resolution.load(Ordering::Acquire))
    }

    /// Returns `true` once the platform acknowledged the resolving action.
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.inner.delivered.load(Ordering::Acquire)
    }

    /// Approves the execution.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::AlreadyTaken`] if any action was already taken, or
    /// [`ActionError::Submission`] when the platform call fails.
    pub async fn approve(&self, reason: impl Into<String>) -> ActionResult<ActionAck> {
        self.submit(ActionKind::Approve, reason.into()).await
    }

    /// Rejects the execution, returning the work to the annotator.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionContext::approve`].
    pub async fn reject(&self, reason: impl Into<String>) -> ActionResult<ActionAck> {
        self.submit(ActionKind::Reject, reason.into()).await
    }

    /// Flags the execution for manual review.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionContext::approve`].
    pub async fn flag(&self, reason: impl Into<String>) -> ActionResult<ActionAck> {
        self.submit(ActionKind::Flag, reason.into()).await
    }

    /// Acknowledges the execution without a workflow decision.
    ///
    /// # Errors
    ///
    /// Same as [`ExecutionContext::approve`].
    pub async fn skip(&self) -> ActionResult<ActionAck> {
        self.submit(ActionKind::Skip, String::new()).await
    }

    pub(crate) async fn skip_implicitly(&self, reason: String) -> ActionResult<ActionAck> {
        self.submit(ActionKind::Skip, reason).await
    }

    async fn submit(&self, action: ActionKind, reason: String) -> ActionResult<ActionAck> {
        let inner = &self.inner;
        if let Err(previous) = inner.resolution.compare_exchange(
            PENDING,
            encode(action),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            let previous = match decode(previous) {
                Resolution::Resolved(previous) => previous,
                Resolution::Pending => action,
            };
            debug!(
                execution_id = %self.execution_id(),
                %previous,
                attempted = %action,
                "refusing second action"
            );
            return Err(ActionError::AlreadyTaken {
                execution_id: self.execution_id().clone(),
                previous,
                attempted: action,
            });
        }

        let submission = ActionSubmission::new(self.execution_id().clone(), action, reason);
        match inner.dispatcher.submit(&submission).await {
            Ok(ack) => {
                inner.delivered.store(true, Ordering::Release);
                Ok(ack)
            }
            Err(source) => Err(ActionError::Submission {
                execution_id: self.execution_id().clone(),
                action,
                source,
            }),
        }
    }
}

/// Builds [`ExecutionContext`]s from raw platform records.
#[derive(Clone, Debug)]
pub struct ContextFactory {
    dispatcher: ActionDispatcher,
}

impl ContextFactory {
    /// Creates a factory whose contexts submit through `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: ActionDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Projects a record into a context. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::UnknownEvent`] for event names outside the supported
    /// set and [`AgentError::MalformedExecution`] when the payload fields have the
    /// wrong shape.
    pub fn build(&self, record: &ExecutionRecord) -> AgentResult<ExecutionContext> {
        let event: AgentEvent =
            record
                .event_type()
                .parse()
                .map_err(|_| AgentError::UnknownEvent {
                    execution_id: record.execution_id().clone(),
                    name: record.event_type().to_owned(),
                })?;

        let view = match event.family() {
            EventFamily::Result => {
                ContextView::Result(project::<ResultPayload>(record)?.into())
            }
            EventFamily::Task => ContextView::Task(project::<TaskPayload>(record)?.into()),
        };

        Ok(ExecutionContext {
            inner: Arc::new(ContextInner {
                record: record.clone(),
                event,
                view,
                resolution: AtomicU8::new(PENDING),
                delivered: AtomicBool::new(false),
                dispatcher: self.dispatcher.clone(),
            }),
        })
    }

    /// Skips a record that [`Self::build`] refused, so it does not stay pending.
    pub(crate) async fn skip_unbuildable(
        &self,
        record: &ExecutionRecord,
        reason: String,
    ) -> ActionResult<ActionAck> {
        let execution_id = record.execution_id().clone();
        let submission = ActionSubmission::new(execution_id.clone(), ActionKind::Skip, reason);
        self.dispatcher
            .submit(&submission)
            .await
            .map_err(|source| ActionError::Submission {
                execution_id,
                action: ActionKind::Skip,
                source,
            })
    }
}

fn project<T: DeserializeOwned>(record: &ExecutionRecord) -> AgentResult<T> {
    serde_json::from_value(Value::Object(record.payload().clone())).map_err(|err| {
        AgentError::MalformedExecution {
            execution_id: record.execution_id().clone(),
            reason: err.to_string(),
        }
    })
}
