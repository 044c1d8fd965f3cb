//! credgate library
//!
//! A local credential-isolating proxy. Sandbox-side wrappers re-emit CLI
//! invocations as HTTP requests; the proxy selects the credential for the
//! target resource, injects it into a subprocess environment or an outbound
//! Authorization header, and never lets the raw secret reach the sandbox,
//! the logs, or a response body.

pub mod cli;
pub mod config;
pub mod exec;
pub mod logging;
pub mod plugins;
pub mod policy;
pub mod server;
