// # dockproxy-core
//
// Core library for the label-driven nginx proxy configurator.
//
// ## Architecture Overview
//
// This library turns the live set of containers into nginx configuration:
// - **ContainerRuntime**: Trait for enumerating containers and watching lifecycle events
// - **ProxyEngine**: Trait for checking and reloading the proxy process
// - **DocumentStore**: Trait for content-addressed commits of rendered documents
// - **intent / conflict / render**: Pure pipeline from labels to document text
// - **ReconcileController**: Debounced event loop that drives one pass per burst
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Runtime and proxy specifics live in plugin crates
// 2. **Event-Driven**: Lifecycle events arrive as an async stream
// 3. **All-or-Nothing Passes**: A conflict aborts the pass before anything is written
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Unchanged documents are never rewritten and never trigger a reload

pub mod config;
pub mod conflict;
pub mod controller;
pub mod error;
pub mod fingerprint;
pub mod intent;
pub mod render;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use config::{ControllerConfig, EngineConfig, OutputConfig, ProxyConfig, RuntimeConfig};
pub use conflict::{ConflictError, ValidatedIntents, validate_conflicts};
pub use controller::{ControllerEvent, ControllerState, ReconcileController, SyncOutcome};
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use intent::{HostClaim, PortClaim, Protocol, ResolveError, RoutingIntent, resolve};
pub use render::{RenderedDocument, RenderedSet, render};
pub use store::{FileDocumentStore, MemoryDocumentStore};
pub use traits::{ContainerRuntime, DocumentStore, ProxyEngine};
