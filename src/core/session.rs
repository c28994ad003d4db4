use anyhow::Result;
use std::sync::Mutex;

#[cfg(target_arch = "wasm32")]
pub trait SessionBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> SessionBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait SessionBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> SessionBounds for T {}

/// Holder of the access token handed out by `/login/`.
///
/// Every network call receives the session explicitly; nothing reads the
/// token from ambient state. An empty token counts as no token.
pub trait Session: SessionBounds {
    fn token(&self) -> Option<String>;
    fn set_token(&self, token: &str) -> Result<()>;
    fn clear_token(&self) -> Result<()>;
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

// --- In-memory ---

#[derive(Debug, Default)]
pub struct MemorySession {
    token: Mutex<Option<String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl Session for MemorySession {
    fn token(&self) -> Option<String> {
        let guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        non_empty(guard.clone())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        let mut guard = self.token.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
        Ok(())
    }
}

// --- Native Implementation ---

#[cfg(not(target_arch = "wasm32"))]
use anyhow::Context;
#[cfg(not(target_arch = "wasm32"))]
use serde::{Deserialize, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Serialize, Deserialize)]
struct SessionFile {
    token: String,
}

/// Token persisted as `{"token": "..."}` in a JSON file.
#[cfg(not(target_arch = "wasm32"))]
pub struct FileSession {
    path: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileSession {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Session for FileSession {
    fn token(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<SessionFile>(&content) {
            Ok(file) => non_empty(Some(file.token)),
            Err(e) => {
                log::warn!("Ignoring unreadable session file {:?}: {}", self.path, e);
                None
            }
        }
    }

    fn set_token(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string(&SessionFile {
            token: token.to_string(),
        })?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write session file {:?}", self.path))?;
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove session file {:?}", self.path))?;
        }
        Ok(())
    }
}

// --- Web Implementation ---

#[cfg(target_arch = "wasm32")]
use anyhow::anyhow;

#[cfg(target_arch = "wasm32")]
const TOKEN_KEY: &str = "token";

/// Token kept in the browser's `localStorage` under `token`.
#[cfg(target_arch = "wasm32")]
pub struct LocalStorageSession;

#[cfg(target_arch = "wasm32")]
impl LocalStorageSession {
    pub fn new() -> Self {
        Self
    }

    fn storage() -> Result<web_sys::Storage> {
        let window = web_sys::window().ok_or_else(|| anyhow!("No window available"))?;
        window
            .local_storage()
            .map_err(|e| anyhow!("localStorage error: {:?}", e))?
            .ok_or_else(|| anyhow!("localStorage unavailable"))
    }
}

#[cfg(target_arch = "wasm32")]
impl Session for LocalStorageSession {
    fn token(&self) -> Option<String> {
        let storage = Self::storage().ok()?;
        non_empty(storage.get_item(TOKEN_KEY).ok().flatten())
    }

    fn set_token(&self, token: &str) -> Result<()> {
        Self::storage()?
            .set_item(TOKEN_KEY, token)
            .map_err(|e| anyhow!("Failed to store token: {:?}", e))
    }

    fn clear_token(&self) -> Result<()> {
        Self::storage()?
            .remove_item(TOKEN_KEY)
            .map_err(|e| anyhow!("Failed to remove token: {:?}", e))
    }
}
