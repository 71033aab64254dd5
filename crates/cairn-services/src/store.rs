//! Shared file store — one directory, one guard.
//!
//! Every operation (read, create, delete, list) holds the store's single
//! lock for its whole duration, so no session can observe a listing torn
//! by a concurrent delete or race a create against another writer. The
//! lock is released on every exit path, error paths included.

use std::path::PathBuf;

use tokio::sync::Mutex;

/// The server-side file depot all sessions share.
pub struct FileStore {
    root: PathBuf,
    /// Serializes all store operations across sessions.
    guard: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if missing.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            guard: Mutex::new(()),
        })
    }

    /// Resolve a client-supplied name to a path inside the root.
    ///
    /// Names are plain entries, never paths: separators, parent
    /// components, NULs, and empty names are all rejected before the
    /// filesystem is touched.
    fn entry_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let invalid = name.is_empty()
            || name.contains(['/', '\\', '\0'])
            || name == "."
            || name == "..";
        if invalid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    /// Whether `name` currently exists in the store.
    pub async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(name)?;
        let _guard = self.guard.lock().await;
        Ok(path.is_file())
    }

    /// Read a file's full contents.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.entry_path(name)?;
        let _guard = self.guard.lock().await;
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(std::fs::read(&path)?)
    }

    /// Create a new file with the given contents. Fails if it exists.
    pub async fn create(&self, name: &str, contents: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(name)?;
        let _guard = self.guard.lock().await;

        // create_new is the exclusivity check and the create in one step.
        let result = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path);
        match result {
            Ok(mut file) => {
                use std::io::Write as _;
                file.write_all(contents)?;
                tracing::info!(name, bytes = contents.len(), "file created");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(name.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Delete a file.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let path = self.entry_path(name)?;
        let _guard = self.guard.lock().await;
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        tracing::info!(name, "file deleted");
        Ok(())
    }

    /// List entry names, sorted. Subdirectories are not part of the store.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.guard.lock().await;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
