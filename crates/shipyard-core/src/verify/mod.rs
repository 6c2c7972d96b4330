//! Post-deployment verification against HTTP health endpoints.

pub mod probe;

pub use probe::{EndpointResult, EndpointStatus, ProbeReport, VerificationProbe};
