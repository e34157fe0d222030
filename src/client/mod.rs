//! # Service Client Components
//!
//! ## Envelopes ([`envelope`])
//! Wire shapes of the cloaking and verification responses and their
//! normalisation into domain values or a [`ServiceError`](crate::error::ServiceError).
//!
//! ## Service ([`service`])
//! The [`ServiceClient`] seam and its HTTP implementation.
//!
//! ## Metrics ([`metrics`])
//! Per-call latency and outcome tracking, exportable to JSON.

pub mod envelope;
pub mod metrics;
pub mod service;

// Re-export for convenience
pub use envelope::{ProtectionLevel, ProtectionResult};
pub use metrics::{Operation, ServiceMetrics};
pub use service::{HttpServiceClient, ServiceClient};
