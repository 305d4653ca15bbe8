//! HTTP forwarding gateway

mod handler;
pub mod server;

pub use handler::{GatewayError, GatewayHandler};
pub use server::{build_http_client, build_router, run_server, GatewayState};
