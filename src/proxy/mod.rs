//! HTTP relay server

mod error;
mod handler;
pub mod server;

pub use error::ApiError;
pub use handler::{GenerateHandler, RouteTarget};
pub use server::{build_router, run_server, ProxyState};
