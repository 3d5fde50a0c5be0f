//! Notebook controller - reconciles `Notebook` resources into running Jupyter workloads
//!
//! Each Notebook owns a workspace claim, a single-replica StatefulSet with an
//! OIDC gatekeeper side-car, a Service, a TLS Ingress, a cert-manager
//! Certificate and, when Istio integration is on, a VirtualService. Idle
//! notebooks are scaled to zero, and events emitted for their pods are relayed
//! onto the Notebook itself.
//!
//! # Modules
//!
//! - [`crd`] - the Notebook Custom Resource Definition
//! - [`config`] - controller settings parsed at startup
//! - [`compiler`] - pure desired-state synthesis of every child object
//! - [`sync`] - create-or-update of children against the cluster
//! - [`status`] - Notebook status and condition history from pod observations
//! - [`culler`] - idle detection and scale-to-zero
//! - [`relay`] - re-emission of pod and StatefulSet events on their Notebook
//! - [`retry`] - backoff for transient API failures
//! - [`controller`] - reconcile loop and controller wiring
//! - [`events`] - Kubernetes event publishing
//! - [`metrics`] - OpenTelemetry instruments
//! - [`telemetry`] - logging, tracing and metrics export setup
//! - [`unstructured`] - nested field access for dynamic objects
//! - [`error`] - error types for the controller

#![deny(missing_docs)]

pub mod compiler;
pub mod config;
pub mod controller;
pub mod crd;
pub mod culler;
pub mod error;
pub mod events;
pub mod metrics;
pub mod relay;
pub mod retry;
pub mod status;
pub mod sync;
pub mod telemetry;
pub mod unstructured;

#[cfg(test)]
pub(crate) mod testing;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
