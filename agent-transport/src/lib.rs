//! Transport layer between an agent and the Avala platform.
//!
//! [`traits::PlatformTransport`] is the seam the kernel talks to; [`http`]
//! provides the production implementation over HTTPS with retry and timeout
//! handling.

#![warn(missing_docs, clippy::pedantic)]

pub mod error;
pub mod http;
pub mod retry;
pub mod traits;
pub mod wire;

mod http_client;

pub use error::{TransportError, TransportResult};
pub use http::{HttpTransport, TransportConfig};
pub use retry::RetryPolicy;
pub use traits::{ActionAck, PlatformTransport, PollFilters};
