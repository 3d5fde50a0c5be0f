//! Notebook controller
//!
//! The reconciler, its cluster access trait and the wiring that runs it
//! under a kube-rs [`Controller`](kube::runtime::Controller) alongside the
//! event relay.

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod notebook;
mod runner;

#[cfg(test)]
pub use client::MockNotebookKubeClient;
pub use client::{KubeClientImpl, NotebookKubeClient, FIELD_MANAGER};
pub use notebook::{
    error_policy, reconcile, Context, CONFLICT_REQUEUE, CONTROLLER_NAME, ERROR_REQUEUE,
};
pub use runner::build_controllers;
