//! # hypercore-proxy: The ingress service proxy
//!
//! Terminates inbound TCP on every host port any registered workload
//! exposes. Each HTTP request's Host header is demultiplexed on its
//! leftmost dot-separated label (the service key, which equals the
//! workload id) and the connection is spliced to the address registered
//! for that (key, port) pair.
//!
//! - One listener per host port; first registration binds it
//! - Re-registering a (key, port) pair replaces the target address
//! - Malformed Host, unknown key, or unknown port close the connection
//!   with no response body
//! - With a TLS config, listeners terminate TLS before routing

mod error;
mod host;
mod proxy;
mod tls;

pub use error::{ProxyError, Result};
pub use proxy::ServiceProxy;
pub use tls::TlsConfig;
