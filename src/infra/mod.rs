//! Runtime adapters: HTTP routers, telemetry bootstrap.

pub mod error;
pub mod http;
pub mod telemetry;
