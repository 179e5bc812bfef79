// # Document Store Trait
//
// Defines the interface for committing rendered configuration documents.
//
// ## Purpose
//
// The committed documents are the only state that outlives a pass. The
// store decides whether a freshly rendered document differs from what is
// committed (by content fingerprint) and replaces it atomically when it
// does. Nothing else writes these files.
//
// ## Implementations
//
// - File-based: [`crate::store::FileDocumentStore`]
// - In-memory (tests, dry runs): [`crate::store::MemoryDocumentStore`]

use async_trait::async_trait;
use std::fmt;

use crate::fingerprint::Fingerprint;
use crate::render::RenderedDocument;

/// Which routing module a document configures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    /// Raw TCP/UDP forwarding keyed by port
    Stream,
    /// Hostname-routed HTTP forwarding
    Http,
}

impl DocumentKind {
    /// Both kinds, in commit order
    pub const ALL: [DocumentKind; 2] = [Self::Stream, Self::Http];
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => f.write_str("stream"),
            Self::Http => f.write_str("http"),
        }
    }
}

/// Outcome of a commit
///
/// `changed` only reports whether the bytes differed. It says nothing about
/// whether the proxy will accept them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitResult {
    /// Whether the committed document was replaced
    pub changed: bool,
    /// Fingerprint of the document now committed
    pub fingerprint: Fingerprint,
}

impl CommitResult {
    /// A commit that replaced the document
    pub fn changed(fingerprint: Fingerprint) -> Self {
        Self {
            changed: true,
            fingerprint,
        }
    }

    /// A commit that found identical content and did nothing
    pub fn unchanged(fingerprint: Fingerprint) -> Self {
        Self {
            changed: false,
            fingerprint,
        }
    }
}

/// Trait for document store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Commit a document if its fingerprint differs from the committed one
    ///
    /// A missing committed document counts as the empty byte string. When
    /// the fingerprints match, no write happens.
    async fn commit(
        &self,
        kind: DocumentKind,
        document: &RenderedDocument,
    ) -> crate::Result<CommitResult>;

    /// Read the currently committed bytes, if any
    async fn load(&self, kind: DocumentKind) -> crate::Result<Option<Vec<u8>>>;

    /// Human-readable location of a document, for logs
    fn location(&self, kind: DocumentKind) -> String;
}
