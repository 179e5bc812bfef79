// # Proxy Engine Trait
//
// Defines the interface to the external proxy process: a configuration
// self-check and a reload.
//
// ## Implementations
//
// - nginx via shell commands: `dockproxy-nginx` crate

use async_trait::async_trait;

/// Trait for proxy engine implementations
///
/// # Contract
///
/// - [`ProxyEngine::validate`] is a pure pass/fail gate over whatever is on
///   disk. It compares nothing and writes nothing.
/// - [`ProxyEngine::reload`] asks the running proxy to pick up the files on
///   disk. Implementations own reload throttling: a call that arrives too
///   soon after the previous reload waits instead of firing immediately.
/// - Failures carry the engine's combined output verbatim so the operator
///   sees exactly what the proxy reported.
/// - Neither operation reverts files. The controller owns sequencing.
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    /// Run the engine's configuration self-check
    async fn validate(&self) -> crate::Result<()>;

    /// Reload the engine
    async fn reload(&self) -> crate::Result<()>;

    /// Engine name for logs and errors
    fn engine_name(&self) -> &'static str;
}
