// # File Document Store
//
// Content-addressed writer for the two nginx documents.
//
// ## Commit Protocol
//
// 1. Fingerprint the freshly rendered bytes
// 2. Read the committed file; a missing file counts as empty
// 3. Equal fingerprints: report unchanged, touch nothing
// 4. Otherwise write `<path>.tmp`, flush and sync it, then rename it over
//    `<path>`
//
// The rename is the only step that makes new bytes visible under the real
// path, so a failure anywhere before it leaves the committed document
// untouched. A failed rename removes the temp file.
//
// ## No Backups
//
// Only the current document is kept. A document that later fails engine
// validation stays on disk until the next successful commit.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::fingerprint::Fingerprint;
use crate::render::RenderedDocument;
use crate::traits::document_store::{CommitResult, DocumentKind, DocumentStore};

/// File-based document store
///
/// # Example
///
/// ```rust,no_run
/// use dockproxy_core::render::RenderedDocument;
/// use dockproxy_core::store::FileDocumentStore;
/// use dockproxy_core::traits::{DocumentKind, DocumentStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileDocumentStore::new(
///         "/etc/nginx/conf.d/proxy.conf",
///         "/etc/nginx/conf.d/http-proxy.conf",
///     )
///     .await?;
///
///     let doc = RenderedDocument::new("# empty\n");
///     let first = store.commit(DocumentKind::Stream, &doc).await?;
///     let second = store.commit(DocumentKind::Stream, &doc).await?;
///     assert!(!second.changed || !first.changed);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    stream_path: PathBuf,
    http_path: PathBuf,
}

impl FileDocumentStore {
    /// Create a store for the two document paths
    ///
    /// Parent directories are created if they do not exist yet.
    pub async fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        stream_path: P,
        http_path: Q,
    ) -> Result<Self, Error> {
        let stream_path = stream_path.as_ref().to_path_buf();
        let http_path = http_path.as_ref().to_path_buf();

        if stream_path == http_path {
            return Err(Error::config(format!(
                "stream and HTTP documents must use different paths, both are {}",
                stream_path.display()
            )));
        }

        for path in [&stream_path, &http_path] {
            let Some(parent) = path.parent() else { continue };
            if parent.as_os_str().is_empty() || parent.exists() {
                continue;
            }
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        Ok(Self {
            stream_path,
            http_path,
        })
    }

    /// Path a document kind is committed to
    pub fn path(&self, kind: DocumentKind) -> &Path {
        match kind {
            DocumentKind::Stream => &self.stream_path,
            DocumentKind::Http => &self.http_path,
        }
    }

    /// Sibling temp path used for atomic replacement
    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        path.with_file_name(name)
    }

    /// Write bytes to `path` through a sibling temp file and rename
    async fn atomic_write(path: &Path, data: &[u8]) -> Result<(), Error> {
        let temp_path = Self::temp_path(path);

        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            let written = async {
                file.write_all(data).await?;
                file.flush().await?;
                file.sync_all().await
            }
            .await;

            if let Err(e) = written {
                drop(file);
                Self::discard_temp(&temp_path).await;
                return Err(Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                )));
            }
        }

        if let Err(e) = fs::rename(&temp_path, path).await {
            Self::discard_temp(&temp_path).await;
            return Err(Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            )));
        }

        Ok(())
    }

    async fn discard_temp(temp_path: &Path) {
        if let Err(e) = fs::remove_file(temp_path).await {
            tracing::warn!(
                "Failed to clean up temp file {}: {}",
                temp_path.display(),
                e
            );
        }
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn commit(
        &self,
        kind: DocumentKind,
        document: &RenderedDocument,
    ) -> Result<CommitResult, Error> {
        let path = self.path(kind);
        let new_fingerprint = document.fingerprint();
        // A missing file counts as empty
        let old_fingerprint = self
            .load(kind)
            .await?
            .map_or_else(Fingerprint::empty, |bytes| Fingerprint::of(&bytes));

        if new_fingerprint == old_fingerprint {
            tracing::debug!(
                "config unchanged path={} checksum={}",
                path.display(),
                new_fingerprint.short()
            );
            return Ok(CommitResult::unchanged(new_fingerprint));
        }

        Self::atomic_write(path, document.as_bytes()).await?;

        tracing::info!(
            "config written path={} checksum={} size={}",
            path.display(),
            new_fingerprint.short(),
            document.as_bytes().len()
        );
        Ok(CommitResult::changed(new_fingerprint))
    }

    async fn load(&self, kind: DocumentKind) -> Result<Option<Vec<u8>>, Error> {
        let path = self.path(kind);
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::store(format!(
                "Failed to read existing config {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn location(&self, kind: DocumentKind) -> String {
        self.path(kind).display().to_string()
    }
}
