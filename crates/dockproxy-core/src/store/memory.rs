// # Memory Document Store
//
// In-memory implementation of DocumentStore.
//
// ## Purpose
//
// Holds committed documents in a HashMap instead of on disk. Used by the
// contract tests, and by anything that wants to inspect what a pass would
// commit without touching the proxy's config directory.
//
// ## Semantics
//
// Identical to the file store: a missing document counts as empty, and an
// unchanged fingerprint performs no write. Every real write bumps a counter
// so tests can assert that idempotent passes do no I/O.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::Error;
use crate::fingerprint::Fingerprint;
use crate::render::RenderedDocument;
use crate::traits::document_store::{CommitResult, DocumentKind, DocumentStore};

/// In-memory document store implementation
///
/// Clones share the same underlying documents, so a test can keep one
/// handle while the controller owns another.
///
/// # Example
///
/// ```rust,no_run
/// use dockproxy_core::render::RenderedDocument;
/// use dockproxy_core::store::MemoryDocumentStore;
/// use dockproxy_core::traits::{DocumentKind, DocumentStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryDocumentStore::new();
///
///     store
///         .commit(DocumentKind::Http, &RenderedDocument::new("# http\n"))
///         .await?;
///     assert_eq!(store.writes(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    inner: Arc<RwLock<HashMap<DocumentKind, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryDocumentStore {
    /// Create a new empty memory document store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of commits that replaced a document
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Committed text of a document, if any
    pub async fn text(&self, kind: DocumentKind) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .get(&kind)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn commit(
        &self,
        kind: DocumentKind,
        document: &RenderedDocument,
    ) -> Result<CommitResult, Error> {
        let mut guard = self.inner.write().await;

        let committed = guard
            .get(&kind)
            .map(|bytes| Fingerprint::of(bytes))
            .unwrap_or_else(Fingerprint::empty);
        let fingerprint = document.fingerprint();

        if committed == fingerprint {
            return Ok(CommitResult::unchanged(fingerprint));
        }

        guard.insert(kind, document.as_bytes().to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(CommitResult::changed(fingerprint))
    }

    async fn load(&self, kind: DocumentKind) -> Result<Option<Vec<u8>>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(&kind).cloned())
    }

    fn location(&self, kind: DocumentKind) -> String {
        format!("memory:{kind}")
    }
}
