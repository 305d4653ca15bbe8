//! llm-gateway: streaming HTTP forwarding gateway for LLM provider APIs
//!
//! Features:
//! - Single stable local mount (`/api/<provider>/`) rewritten to the real upstream
//! - Access-code authorization with optional user API key passthrough
//! - Model-allowlist gate with fail-open body inspection
//! - Streaming request/response passthrough bounded by a hard timeout

pub mod auth;
pub mod config;
pub mod gateway;
pub mod models;

pub use config::AppConfig;
pub use gateway::{build_router, run_server, GatewayState};
