//! Client-side services the dispatcher touches besides the hosted store:
//! key/value storage, the active theme, navigation and file downloads.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::types::Theme;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid file name: {0}")]
    InvalidFileName(String),
    #[error("local storage lock poisoned")]
    Poisoned,
}

pub const THEME_KEY: &str = "theme";
pub const ROUTE_KEY: &str = "last_route";

/// JSON key/value store. File-backed when opened with a path, otherwise in
/// memory only. Every `set` rewrites the whole file.
#[derive(Debug)]
pub struct LocalStorage {
    path: Option<PathBuf>,
    values: Mutex<Map<String, Value>>,
}

impl LocalStorage {
    pub fn in_memory() -> Self {
        Self { path: None, values: Mutex::new(Map::new()) }
    }

    /// Open (or lazily create) a storage file. A corrupt file is logged and
    /// replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "local storage unreadable, starting empty");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self { path: Some(path), values: Mutex::new(values) }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().ok().and_then(|m| m.get(key).cloned())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<(), PlatformError> {
        let snapshot = {
            let mut map = self.values.lock().map_err(|_| PlatformError::Poisoned)?;
            map.insert(key.to_owned(), value);
            map.clone()
        };
        self.persist(&snapshot)
    }

    pub fn remove(&self, key: &str) -> Result<(), PlatformError> {
        let snapshot = {
            let mut map = self.values.lock().map_err(|_| PlatformError::Poisoned)?;
            map.remove(key);
            map.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, map: &Map<String, Value>) -> Result<(), PlatformError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(map)?)?;
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    fn storage(&self) -> &LocalStorage;

    /// Switch the visible theme (the DOM class toggle in a browser client).
    /// Persisting the choice is the caller's job.
    fn apply_theme(&self, theme: Theme) -> Result<(), PlatformError>;

    fn navigate(&self, route: &str) -> Result<(), PlatformError>;

    /// Hand a generated file to the user. Returns where it ended up.
    async fn download(&self, filename: &str, contents: Vec<u8>) -> Result<PathBuf, PlatformError>;
}

/// Terminal-client platform rooted at a data directory:
/// `storage.json` for key/value state, `exports/` for downloads.
#[derive(Debug)]
pub struct LocalPlatform {
    data_dir: PathBuf,
    storage: LocalStorage,
    theme: Mutex<Theme>,
    route: Mutex<String>,
}

impl LocalPlatform {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let storage = LocalStorage::open(data_dir.join("storage.json"));
        let theme = match storage.get_str(THEME_KEY).as_deref() {
            Some("light") => Theme::Light,
            Some("system") => Theme::System,
            _ => Theme::Dark,
        };
        let route = storage.get_str(ROUTE_KEY).unwrap_or_else(|| "/dashboard".into());
        Self {
            data_dir,
            storage,
            theme: Mutex::new(theme),
            route: Mutex::new(route),
        }
    }

    pub fn active_theme(&self) -> Theme {
        self.theme.lock().map(|t| *t).unwrap_or_default()
    }

    pub fn current_route(&self) -> String {
        self.route.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Platform for LocalPlatform {
    fn storage(&self) -> &LocalStorage {
        &self.storage
    }

    fn apply_theme(&self, theme: Theme) -> Result<(), PlatformError> {
        if let Ok(mut t) = self.theme.lock() {
            *t = theme;
        }
        tracing::debug!(theme = theme.as_str(), "theme applied");
        Ok(())
    }

    fn navigate(&self, route: &str) -> Result<(), PlatformError> {
        if let Ok(mut r) = self.route.lock() {
            *r = route.to_owned();
        }
        self.storage.set(ROUTE_KEY, Value::from(route))
    }

    async fn download(&self, filename: &str, contents: Vec<u8>) -> Result<PathBuf, PlatformError> {
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(PlatformError::InvalidFileName(filename.to_owned()));
        }
        let dir = self.data_dir.join("exports");
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(filename);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");
        let storage = LocalStorage::open(&path);
        storage.set("theme", Value::from("light")).unwrap();

        let reopened = LocalStorage::open(&path);
        assert_eq!(reopened.get_str("theme").as_deref(), Some("light"));
        reopened.remove("theme").unwrap();
        assert!(LocalStorage::open(&path).get("theme").is_none());
    }

    #[test]
    fn corrupt_storage_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(LocalStorage::open(&path).get("anything").is_none());
    }

    #[test]
    fn stored_theme_is_applied_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let platform = LocalPlatform::new(dir.path());
        assert_eq!(platform.active_theme(), Theme::Dark);
        platform.apply_theme(Theme::System).unwrap();
        assert_eq!(platform.active_theme(), Theme::System);
        platform.storage().set(THEME_KEY, Value::from("light")).unwrap();
        assert_eq!(LocalPlatform::new(dir.path()).active_theme(), Theme::Light);
    }

    #[test]
    fn navigate_remembers_route() {
        let dir = tempfile::tempdir().unwrap();
        let platform = LocalPlatform::new(dir.path());
        assert_eq!(platform.current_route(), "/dashboard");
        platform.navigate("/habits").unwrap();
        assert_eq!(LocalPlatform::new(dir.path()).current_route(), "/habits");
    }

    #[test]
    fn poisoned_storage_reports_lost_write() {
        let storage = std::sync::Arc::new(LocalStorage::in_memory());
        let holder = storage.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.values.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(matches!(storage.set("theme", Value::from("light")), Err(PlatformError::Poisoned)));
        assert!(matches!(storage.remove("theme"), Err(PlatformError::Poisoned)));
    }

    #[tokio::test]
    async fn download_writes_into_exports() {
        let dir = tempfile::tempdir().unwrap();
        let platform = LocalPlatform::new(dir.path());
        let path = platform.download("data.json", b"{}".to_vec()).await.unwrap();
        assert_eq!(path, dir.path().join("exports").join("data.json"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }

    #[tokio::test]
    async fn download_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let platform = LocalPlatform::new(dir.path());
        let err = platform.download("../escape.json", vec![]).await.unwrap_err();
        assert!(matches!(err, PlatformError::InvalidFileName(_)));
    }
}
