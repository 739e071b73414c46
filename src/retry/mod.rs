//! Retry policies and the invocation retry orchestrator.

pub mod orchestrator;
pub mod policy;

pub use orchestrator::{InvocationRetryOrchestrator, ResilientOperation, RetryOutcome};
pub use policy::{ChannelPolicy, RetryConfig, RetryPolicyRegistry};
