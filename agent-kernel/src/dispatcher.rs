//! Relays resolved actions to the platform.

use std::fmt;
use std::sync::Arc;

use agent_primitives::ActionSubmission;
use agent_transport::{ActionAck, PlatformTransport, TransportResult};
use tracing::{debug, warn};

/// Thin wrapper over the transport used by execution contexts to submit decisions.
#[derive(Clone)]
pub struct ActionDispatcher {
    transport: Arc<dyn PlatformTransport>,
}

impl fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcher").finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    /// Creates a dispatcher backed by the supplied transport.
    #[must_use]
    pub fn new(transport: Arc<dyn PlatformTransport>) -> Self {
        Self { transport }
    }

    /// Submits one action. The caller owns the at-most-once guarantee.
    ///
    /// # Errors
    ///
    /// Propagates the transport failure unchanged; nothing is resubmitted.
    pub async fn submit(&self, submission: &ActionSubmission) -> TransportResult<ActionAck> {
        debug!(
            execution_id = %submission.execution_id(),
            action = %submission.action(),
            submission_id = %submission.submission_id(),
            "submitting action"
        );

        match self.transport.post_action(submission).await {
            Ok(ack) => Ok(ack),
            Err(err) => {
                warn!(
                    execution_id = %submission.execution_id(),
                    action = %submission.action(),
                    error = %err,
                    "action submission failed"
                );
                Err(err)
            }
        }
    }
}
