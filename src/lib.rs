//! Routing control plane for hipache-compatible data planes.
//!
//! Keeps per-application route records, CNAME aliases, health checks and TLS
//! material in Redis, where the proxies read them.

pub mod config;
pub mod core;
pub mod logging;
pub mod router;
pub mod store;
