//! prompt-relay: HTTP relay for the Gemini generateContent API
//!
//! Features:
//! - `{"prompt": ...}` in, `{"generatedText": ...}` out, per configured route
//! - Retry with exponential backoff for transient upstream failures
//! - Raw relay mode returning the upstream document unchanged
//! - Per-request stats logging

pub mod api;
pub mod config;
pub mod invoker;
pub mod proxy;
pub mod stats;
pub mod upstream;

pub use config::AppConfig;
pub use invoker::{ResilientInvoker, RetryPolicy};
pub use proxy::{build_router, run_server, ProxyState};
pub use upstream::{build_generation_client, GenerationClient};
