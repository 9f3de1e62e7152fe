//! Polling agent: registration, batch processing, and the run loop.

use std::collections::HashSet;
use std::fmt;
use std::future::{Future, ready};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use agent_primitives::{AgentEvent, AgentIdentity, AgentToken, ExecutionRecord};
use agent_transport::{
    HttpTransport, PlatformTransport, PollFilters, TransportConfig, TransportError,
};
use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{ContextFactory, ExecutionContext, Resolution};
use crate::dispatcher::ActionDispatcher;
use crate::error::{ActionError, AgentError, AgentResult};
use crate::handler::{EventHandler, HandlerResult};
use crate::lifecycle::{AgentState, Lifecycle, LifecycleEvent};
use crate::registry::HandlerRegistry;

/// Default delay between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    poll_interval: Duration,
    max_concurrency: NonZeroUsize,
}

impl PollConfig {
    /// Creates a configuration with the supplied poll interval and sequential processing.
    #[must_use]
    pub const fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_concurrency: NonZeroUsize::MIN,
        }
    }

    /// Allows up to `limit` executions of one batch in flight.
    #[must_use]
    pub const fn with_max_concurrency(mut self, limit: NonZeroUsize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Returns the delay between poll cycles.
    #[must_use]
    pub const fn poll_interval(self) -> Duration {
        self.poll_interval
    }

    /// Returns the number of executions processed concurrently.
    #[must_use]
    pub const fn max_concurrency(self) -> NonZeroUsize {
        self.max_concurrency
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] when the poll interval is zero.
    pub fn validate(self) -> AgentResult<()> {
        if self.poll_interval.is_zero() {
            return Err(AgentError::configuration(
                "poll interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

/// Cloneable handle that stops a running agent from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Requests a stop. The current batch finishes; the sleep is interrupted.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Agent that polls the platform for pending executions and dispatches them to
/// registered handlers.
pub struct TaskAgent {
    identity: AgentIdentity,
    transport: Arc<dyn PlatformTransport>,
    registry: HandlerRegistry,
    factory: ContextFactory,
    filters: PollFilters,
    config: PollConfig,
    lifecycle: Lifecycle,
    token: Option<AgentToken>,
    stop: CancellationToken,
}

impl fmt::Debug for TaskAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskAgent")
            .field("identity", &self.identity)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("state", &self.lifecycle.state())
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl TaskAgent {
    /// Creates an agent over an arbitrary transport.
    #[must_use]
    pub fn new(identity: AgentIdentity, transport: Arc<dyn PlatformTransport>) -> Self {
        let filters = PollFilters::from_identity(&identity);
        let factory = ContextFactory::new(ActionDispatcher::new(Arc::clone(&transport)));
        Self {
            identity,
            transport,
            registry: HandlerRegistry::new(),
            factory,
            filters,
            config: PollConfig::default(),
            lifecycle: Lifecycle::new(),
            token: None,
            stop: CancellationToken::new(),
        }
    }

    /// Creates an agent that talks to the platform over HTTPS.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] when the transport settings are invalid.
    pub fn connect(identity: AgentIdentity, config: TransportConfig) -> AgentResult<Self> {
        let transport = HttpTransport::new(config)?;
        Ok(Self::new(identity, Arc::new(transport)))
    }

    /// Replaces the poll loop configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Configuration`] when the configuration is invalid.
    pub fn with_poll_config(mut self, config: PollConfig) -> AgentResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Registers an async closure for the named event.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidEvent`] when `event` is not a supported event name.
    pub fn on<F, Fut>(&mut self, event: &str, handler: F) -> AgentResult<&mut Self>
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.registry.register(event, handler)?;
        Ok(self)
    }

    /// Registers a handler object for a typed event.
    pub fn subscribe(&mut self, event: AgentEvent, handler: Arc<dyn EventHandler>) -> &mut Self {
        self.registry.subscribe(event, handler);
        self
    }

    /// Returns the agent identity.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// Returns the handler registry.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Returns the poll loop configuration.
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        self.config
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.lifecycle.state()
    }

    /// Returns the token issued at registration, if registered.
    #[must_use]
    pub fn agent_token(&self) -> Option<&AgentToken> {
        self.token.as_ref()
    }

    /// Returns a handle that stops [`TaskAgent::run`].
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    /// Registers, then polls until stopped or a fatal error occurs.
    ///
    /// Poll failures that exhausted their retries are logged and the loop
    /// continues with the next cycle.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Registration`] when registration fails (no poll is
    /// made) and any other fatal error that stopped the loop.
    pub async fn run(&mut self) -> AgentResult<()> {
        self.ensure_registered().await?;
        info!(
            agent = %self.identity.name(),
            poll_interval = ?self.config.poll_interval(),
            "agent started polling"
        );

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            match self.poll_cycle().await {
                Ok(processed) => debug!(processed, "poll cycle complete"),
                Err(err) if err.is_fatal() => {
                    error!(error = %err, "agent stopping on fatal error");
                    self.lifecycle.transition(LifecycleEvent::Stop)?;
                    return Err(err);
                }
                Err(err) => warn!(error = %err, "poll cycle failed; will retry next cycle"),
            }

            self.lifecycle.transition(LifecycleEvent::Sleep)?;
            tokio::select! {
                () = self.stop.cancelled() => break,
                () = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        self.lifecycle.transition(LifecycleEvent::Stop)?;
        info!(agent = %self.identity.name(), "agent stopped");
        Ok(())
    }

    /// Registers if needed, processes the currently pending executions once, and
    /// returns how many were resolved. Never sleeps.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Registration`] when registration fails,
    /// [`AgentError::Poll`] when fetching exhausted its retries, and any fatal
    /// error, after which the agent is stopped.
    pub async fn run_once(&mut self) -> AgentResult<usize> {
        self.ensure_registered().await?;

        match self.poll_cycle().await {
            Ok(processed) => {
                self.lifecycle.transition(LifecycleEvent::Idle)?;
                Ok(processed)
            }
            Err(err) if err.is_fatal() => {
                error!(error = %err, "agent stopping on fatal error");
                self.lifecycle.transition(LifecycleEvent::Stop)?;
                Err(err)
            }
            Err(err) => {
                self.lifecycle.transition(LifecycleEvent::Idle)?;
                Err(err)
            }
        }
    }

    async fn ensure_registered(&mut self) -> AgentResult<()> {
        if self.token.is_some() {
            return Ok(());
        }

        let events = self.registry.events();
        if events.is_empty() {
            warn!(agent = %self.identity.name(), "registering agent without handlers");
        }

        let token = self
            .transport
            .register(&self.identity, &events)
            .await
            .map_err(registration_error)?;
        self.lifecycle.transition(LifecycleEvent::Register)?;
        info!(
            agent = %self.identity.name(),
            agent_uid = %token,
            events = ?events,
            "agent registered"
        );
        self.token = Some(token);
        Ok(())
    }

    async fn poll_cycle(&mut self) -> AgentResult<usize> {
        self.lifecycle.transition(LifecycleEvent::Poll)?;
        let records = self.fetch_pending().await?;
        if records.is_empty() {
            return Ok(0);
        }
        debug!(count = records.len(), "dispatching batch");
        Ok(self.process_batch(records).await)
    }

    async fn fetch_pending(&mut self) -> AgentResult<Vec<ExecutionRecord>> {
        let token = self.current_token()?;
        match self.transport.fetch_pending(&token, &self.filters).await {
            Err(TransportError::Unauthorized { status }) => {
                warn!(status, agent_uid = %token, "platform rejected agent token; re-registering");
                self.token = None;
                self.lifecycle.transition(LifecycleEvent::Expire)?;
                self.ensure_registered().await?;
                self.lifecycle.transition(LifecycleEvent::Poll)?;

                let token = self.current_token()?;
                Ok(self.transport.fetch_pending(&token, &self.filters).await?)
            }
            other => Ok(other?),
        }
    }

    fn current_token(&self) -> AgentResult<AgentToken> {
        self.token
            .clone()
            .ok_or_else(|| AgentError::configuration("agent is not registered"))
    }

    async fn process_batch(&self, records: Vec<ExecutionRecord>) -> usize {
        let mut seen = HashSet::new();
        let unique: Vec<_> = records
            .into_iter()
            .filter(|record| {
                let fresh = seen.insert(record.execution_id().clone());
                if !fresh {
                    warn!(
                        execution_id = %record.execution_id(),
                        "duplicate execution in batch; ignoring"
                    );
                }
                fresh
            })
            .collect();

        stream::iter(unique)
            .map(|record| self.process_execution(record))
            .buffer_unordered(self.config.max_concurrency().get())
            .filter(|resolved| ready(*resolved))
            .count()
            .await
    }

    /// Returns `true` when the execution ended resolved.
    async fn process_execution(&self, record: ExecutionRecord) -> bool {
        let ctx = match self.factory.build(&record) {
            Ok(ctx) => ctx,
            Err(err) => return self.skip_unbuildable(&record, &err).await,
        };

        let event = ctx.event();
        let handlers = self.registry.handler_count(event);
        let succeeded = self.registry.dispatch(&ctx).await;

        if let Resolution::Resolved(action) = ctx.resolution() {
            if ctx.is_delivered() {
                info!(execution_id = %ctx.execution_id(), %event, %action, "execution resolved");
            } else {
                error!(
                    execution_id = %ctx.execution_id(),
                    %event,
                    %action,
                    "action was taken but not delivered; it will not be resubmitted"
                );
            }
            return true;
        }

        let reason = if handlers == 0 {
            format!("no handler registered for event '{event}'")
        } else if succeeded < handlers {
            format!("handler for event '{event}' failed before taking an action")
        } else {
            format!("handler for event '{event}' completed without taking an action")
        };
        warn!(execution_id = %ctx.execution_id(), %event, %reason, "skipping execution implicitly");

        match ctx.skip_implicitly(reason).await {
            Ok(_) | Err(ActionError::AlreadyTaken { .. }) => {}
            Err(err) => error!(
                execution_id = %ctx.execution_id(),
                error = %err,
                "implicit skip was not delivered"
            ),
        }
        true
    }

    async fn skip_unbuildable(&self, record: &ExecutionRecord, err: &AgentError) -> bool {
        let reason = match err {
            AgentError::UnknownEvent { name, .. } => format!("unsupported event '{name}'"),
            AgentError::MalformedExecution { reason, .. } => format!("malformed payload: {reason}"),
            other => other.to_string(),
        };
        warn!(
            execution_id = %record.execution_id(),
            event = %record.event_type(),
            %reason,
            "skipping execution that cannot be handled"
        );

        if let Err(err) = self.factory.skip_unbuildable(record, reason).await {
            error!(
                execution_id = %record.execution_id(),
                error = %err,
                "skip was not delivered"
            );
        }
        true
    }
}

fn registration_error(err: TransportError) -> AgentError {
    match err {
        TransportError::Registration { .. } => err.into(),
        other => AgentError::Registration {
            status: other.status(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_config_defaults() {
        let config = PollConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.max_concurrency().get(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = PollConfig::new(Duration::ZERO)
            .validate()
            .expect_err("zero interval");
        assert!(matches!(err, AgentError::Configuration { .. }));
    }

    #[test]
    fn stop_handle_is_shared() {
        let handle = StopHandle {
            token: CancellationToken::new(),
        };
        let clone = handle.clone();
        clone.stop();
        assert!(handle.is_stopped());
    }
}
