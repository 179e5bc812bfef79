//! Core traits for the dockproxy system
//!
//! This module defines the seams between the controller and the outside world.
//!
//! - [`ContainerRuntime`]: Enumerate containers and watch lifecycle events
//! - [`ProxyEngine`]: Validate and reload the proxy process
//! - [`DocumentStore`]: Content-addressed commit of rendered documents

pub mod container_runtime;
pub mod document_store;
pub mod proxy_engine;

pub use container_runtime::{
    ContainerEvent, ContainerEventKind, ContainerEventStream, ContainerRuntime,
    ContainerSnapshot, SHORT_ID_LEN, short_id,
};
pub use document_store::{CommitResult, DocumentKind, DocumentStore};
pub use proxy_engine::ProxyEngine;
