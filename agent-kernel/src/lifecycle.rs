//! Poll loop state machine.

use thiserror::Error;
use tracing::debug;

/// States the poll loop can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// No agent token yet.
    Unregistered,
    /// Registered with the platform, not currently polling.
    Registered,
    /// Fetching and dispatching a batch.
    Polling,
    /// Waiting for the next poll cycle.
    Sleeping,
    /// Stopped by request or by a fatal error; no further work is done.
    Stopped,
}

impl AgentState {
    /// Returns `true` while the agent holds a platform token.
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Registered | Self::Polling | Self::Sleeping)
    }

    /// Returns `true` once the agent has stopped.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

/// Events that trigger state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Registration succeeded.
    Register,
    /// Start a poll cycle.
    Poll,
    /// Batch done, wait for the next cycle.
    Sleep,
    /// Batch done, return control to the caller without sleeping.
    Idle,
    /// The platform no longer accepts the agent token.
    Expire,
    /// Stop the agent.
    Stop,
}

/// Lifecycle state manager.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    state: AgentState,
}

impl Lifecycle {
    /// Constructs a lifecycle in the [`AgentState::Unregistered`] state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AgentState::Unregistered,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Applies a lifecycle event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidTransition`] when the supplied event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: LifecycleEvent) -> LifecycleResult<AgentState> {
        let next = match (self.state, event) {
            (AgentState::Unregistered, LifecycleEvent::Register)
            | (AgentState::Polling, LifecycleEvent::Idle) => Some(AgentState::Registered),
            (AgentState::Registered | AgentState::Sleeping, LifecycleEvent::Poll) => {
                Some(AgentState::Polling)
            }
            (AgentState::Polling, LifecycleEvent::Sleep) => Some(AgentState::Sleeping),
            (
                AgentState::Registered | AgentState::Polling | AgentState::Sleeping,
                LifecycleEvent::Expire,
            ) => Some(AgentState::Unregistered),
            (_, LifecycleEvent::Stop) => Some(AgentState::Stopped),
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                event,
            });
        };

        if next_state != self.state {
            debug!(?self.state, ?next_state, ?event, "agent lifecycle transition");
            self.state = next_state;
        }

        Ok(self.state)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors emitted by the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Transition was not permitted from the current state.
    #[error("invalid agent state transition from {from:?} via {event:?}")]
    InvalidTransition {
        /// State prior to the attempted transition.
        from: AgentState,
        /// Event that triggered the failure.
        event: LifecycleEvent,
    },
}

/// Result alias used for lifecycle operations.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
