//! Page persistence
//!
//! Pages are title-keyed blobs. The file-backed store keeps each page in
//! `{root}/{title}.txt` and replaces it atomically on save.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// A named page and its raw contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: String,
    pub body: Vec<u8>,
}

impl Page {
    pub fn new(title: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// An empty page, used when editing a title that has never been saved
    pub fn empty(title: impl Into<String>) -> Self {
        Self::new(title, Vec::new())
    }

    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to read page {title}: {source}")]
    Read {
        title: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write page {title}: {source}")]
    Write {
        title: String,
        #[source]
        source: io::Error,
    },
}

/// Backing store for pages
///
/// `load` returns `Ok(None)` when the page does not exist; only genuine I/O
/// failures are errors.
#[async_trait]
pub trait PageStore: Send + Sync + 'static {
    async fn load(&self, title: &str) -> Result<Option<Page>, StorageError>;

    async fn save(&self, page: &Page) -> Result<(), StorageError>;
}

/// Stores each page as `{title}.txt` under a root directory
#[derive(Debug, Clone)]
pub struct FilePageStore {
    root: PathBuf,
}

impl FilePageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, title: &str) -> PathBuf {
        self.root.join(format!("{}.txt", title))
    }

    async fn write_atomically(&self, page: &Page) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let target = self.page_path(&page.title);
        let staging = self
            .root
            .join(format!(".{}.{}.tmp", page.title, uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut options = tokio::fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(0o600);

            let mut file = options.open(&staging).await?;
            file.write_all(&page.body).await?;
            file.sync_all().await?;
            drop(file);

            tokio::fs::rename(&staging, &target).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&staging).await;
        }
        result
    }
}

#[async_trait]
impl PageStore for FilePageStore {
    async fn load(&self, title: &str) -> Result<Option<Page>, StorageError> {
        match tokio::fs::read(self.page_path(title)).await {
            Ok(body) => Ok(Some(Page::new(title, body))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                title: title.to_string(),
                source,
            }),
        }
    }

    async fn save(&self, page: &Page) -> Result<(), StorageError> {
        self.write_atomically(page)
            .await
            .map_err(|source| StorageError::Write {
                title: page.title.clone(),
                source,
            })
    }
}
