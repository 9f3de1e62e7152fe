//! Build agents that review and route work on the Avala annotation platform.
//!
//! Depend on this crate via `cargo add avala-agents`. It bundles the internal
//! runtime crates behind feature flags so downstream users can enable only the
//! pieces they need.
//!
//! ```no_run
//! use avala_agents::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut agent = AgentConfig::from_env()?.with_name("quality-checker").build_agent()?;
//! agent.on("result.submitted", |ctx: ExecutionContext| async move {
//!     let empty = ctx.as_result().is_some_and(ResultContext::is_empty);
//!     if empty {
//!         ctx.reject("No annotations provided").await?;
//!     } else {
//!         ctx.approve("").await?;
//!     }
//!     Ok(())
//! })?;
//! agent.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::pedantic)]

/// Re-export shared primitives for convenience.
pub use agent_primitives as primitives;

/// Handler registry, execution contexts, and the poll loop (enabled by `kernel` feature).
#[cfg(feature = "kernel")]
pub use agent_kernel as kernel;

/// HTTPS transport to the platform API (enabled by `transport` feature).
#[cfg(feature = "transport")]
pub use agent_transport as transport;

/// Configuration sourced from code or the environment (enabled by `config` feature).
#[cfg(feature = "config")]
pub use agent_config as config;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use agent_telemetry as telemetry;

/// Commonly used types.
pub mod prelude {
    pub use agent_primitives::{ActionKind, AgentEvent, AgentIdentity, ApiKey, ExecutionId};

    #[cfg(feature = "kernel")]
    pub use agent_kernel::{
        ActionError, AgentError, AgentState, EventHandler, ExecutionContext, HandlerError,
        HandlerResult, PollConfig, ResultContext, StopHandle, TaskAgent, TaskContext,
    };

    #[cfg(feature = "transport")]
    pub use agent_transport::{ActionAck, TransportConfig};

    #[cfg(feature = "config")]
    pub use agent_config::{AgentConfig, ConfigError};
}
