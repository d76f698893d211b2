//! Project persistence behind a storage port.

pub mod project;

pub use project::*;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    StorageUnavailable,
    Corrupt(String),
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::StorageUnavailable => write!(f, "project storage unavailable"),
            StoreError::Corrupt(msg) => write!(f, "project snapshot corrupt: {msg}"),
            StoreError::Io(msg) => write!(f, "project storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// One slot holding the current project.
pub trait ProjectStore: Send {
    fn load(&self) -> Result<Option<ProjectSnapshot>, StoreError>;
    fn save(&mut self, project: &ProjectSnapshot) -> Result<(), StoreError>;
    fn clear(&mut self) -> Result<(), StoreError>;
}

fn decode(raw: &str) -> Result<Option<ProjectSnapshot>, StoreError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn encode(project: &ProjectSnapshot) -> Result<String, StoreError> {
    serde_json::to_string_pretty(project).map_err(|e| StoreError::Io(e.to_string()))
}

/// The stored project, if there is a usable one.
pub fn load_saved(store: &dyn ProjectStore) -> Option<ProjectSnapshot> {
    match store.load() {
        Ok(Some(project)) => {
            info!(project = %project.id, layers = project.layers.len(), "project loaded");
            Some(project)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("discarding saved project: {e}");
            None
        }
    }
}

/// Absent, unreadable or corrupt storage yields a fresh project.
pub fn load_or_default(store: &dyn ProjectStore, name: &str) -> ProjectSnapshot {
    load_saved(store).unwrap_or_else(|| {
        info!(name, "no saved project, starting fresh");
        ProjectSnapshot::new(name)
    })
}

/// Keeps the serialized document in memory.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    raw: Option<String>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the slot with an arbitrary document, valid or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
        }
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }
}

impl ProjectStore for InMemoryProjectStore {
    fn load(&self) -> Result<Option<ProjectSnapshot>, StoreError> {
        self.raw.as_deref().map_or(Ok(None), decode)
    }

    fn save(&mut self, project: &ProjectSnapshot) -> Result<(), StoreError> {
        self.raw = Some(encode(project)?);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.raw = None;
        Ok(())
    }
}

/// JSON file on disk, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileProjectStore {
    path: PathBuf,
}

impl FileProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ProjectStore for FileProjectStore {
    fn load(&self) -> Result<Option<ProjectSnapshot>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => decode(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        }
    }

    fn save(&mut self, project: &ProjectSnapshot) -> Result<(), StoreError> {
        let raw = encode(project)?;
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Io(format!("{}: {e}", dir.display())))?;
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, raw).map_err(|e| StoreError::Io(format!("{}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Io(format!("{}: {e}", self.path.display())))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        }
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm_storage {
    use super::{ProjectSnapshot, ProjectStore, StoreError, decode, encode};

    /// Browser `localStorage`, one key per project slot.
    #[derive(Debug)]
    pub struct LocalStorageProjectStore {
        key: String,
    }

    impl LocalStorageProjectStore {
        pub fn new(key: impl Into<String>) -> Result<Self, StoreError> {
            window_local_storage()?;
            Ok(Self { key: key.into() })
        }
    }

    impl ProjectStore for LocalStorageProjectStore {
        fn load(&self) -> Result<Option<ProjectSnapshot>, StoreError> {
            let storage = window_local_storage()?;
            let raw = storage
                .get_item(&self.key)
                .map_err(|e| StoreError::Io(format!("get_item failed: {:?}", e)))?;
            raw.as_deref().map_or(Ok(None), decode)
        }

        fn save(&mut self, project: &ProjectSnapshot) -> Result<(), StoreError> {
            let raw = encode(project)?;
            window_local_storage()?
                .set_item(&self.key, &raw)
                .map_err(|e| StoreError::Io(format!("set_item failed: {:?}", e)))
        }

        fn clear(&mut self) -> Result<(), StoreError> {
            window_local_storage()?
                .remove_item(&self.key)
                .map_err(|e| StoreError::Io(format!("remove_item failed: {:?}", e)))
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, StoreError> {
        let win = web_sys::window().ok_or(StoreError::StorageUnavailable)?;
        win.local_storage()
            .map_err(|e| StoreError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(StoreError::StorageUnavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use wasm_storage::LocalStorageProjectStore;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageProjectStore;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageProjectStore {
    pub fn new(_key: impl Into<String>) -> Result<Self, StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl ProjectStore for LocalStorageProjectStore {
    fn load(&self) -> Result<Option<ProjectSnapshot>, StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn save(&mut self, _project: &ProjectSnapshot) -> Result<(), StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}
