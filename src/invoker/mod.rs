//! Resilient upstream invocation
//!
//! A request is described once (`RequestDescriptor`), then sent through a
//! `Transport` by `ResilientInvoker` under a `RetryPolicy`. Transient
//! failures are retried with exponential backoff; structural mismatches and
//! non-retryable client errors end the call immediately.

mod descriptor;
mod policy;
mod resilient;
mod transport;

pub use descriptor::RequestDescriptor;
pub use policy::{PolicyError, RetryPolicy};
pub use resilient::{
    AttemptError, FailureKind, InvocationFailure, InvocationResult, InvocationState,
    ResilientInvoker,
};
pub use transport::{HttpTransport, Transport, TransportError, UpstreamResponse};
