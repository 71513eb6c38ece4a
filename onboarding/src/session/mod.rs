// Session context
//
// The only state that outlives the wizard: auth token, user id, role and the user object the
// backend returned at registration. One JSON file on disk, one in-memory copy behind a mutex.
// Created once at startup, handed to whatever needs it, torn down on logout.

use crate::error::{ClientError, ClientResult};
use crate::utils::logging::mask_sensitive;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const SESSION_FILE_NAME: &str = "session.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    #[serde(rename = "authToken")]
    pub auth_token: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userRole")]
    pub user_role: String,
    #[serde(rename = "userData", default)]
    pub user_data: Value,
}

#[derive(Debug)]
pub struct SessionContext {
    path: PathBuf,
    inner: Mutex<Option<SessionData>>,
}

impl SessionContext {
    pub fn new(folder: &Path) -> Self {
        Self {
            path: folder.join(SESSION_FILE_NAME),
            inner: Mutex::new(None),
        }
    }

    /// Load whatever session is on disk. A missing or corrupt file leaves the context empty.
    pub async fn init(&self) -> Option<SessionData> {
        let loaded = match tokio::fs::read_to_string(&self.path).await {
            Ok(body) => match serde_json::from_str::<SessionData>(&body) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(
                        "[PHASE: session] [STEP: init] Ignoring unreadable session file {:?}: {}",
                        self.path, e
                    );
                    None
                }
            },
            Err(_) => None,
        };
        if let Some(s) = &loaded {
            info!(
                "[PHASE: session] [STEP: init] Restored session for user {} ({})",
                s.user_id, s.user_role
            );
        }
        *self.inner.lock().await = loaded.clone();
        loaded
    }

    /// Write the session to disk, then make it current.
    pub async fn persist(&self, data: SessionData) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::Session(format!("Failed to create session folder: {}", e))
            })?;
        }
        let body = serde_json::to_string_pretty(&data)
            .map_err(|e| ClientError::Session(format!("Failed to serialize session: {}", e)))?;
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| ClientError::Session(format!("Failed to write session: {}", e)))?;
        info!(
            "[PHASE: session] [STEP: persist] Session stored for user {} (token={})",
            data.user_id,
            mask_sensitive(&data.auth_token)
        );
        *self.inner.lock().await = Some(data);
        Ok(())
    }

    pub async fn current(&self) -> Option<SessionData> {
        self.inner.lock().await.clone()
    }

    /// Current session or a "please register" error, for screens that require one.
    pub async fn require(&self) -> ClientResult<SessionData> {
        self.current().await.ok_or_else(|| {
            ClientError::Session("No active session. Please register or log in first.".to_string())
        })
    }

    /// Clear memory and remove the file.
    pub async fn teardown(&self) -> ClientResult<()> {
        *self.inner.lock().await = None;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("[PHASE: session] [STEP: teardown] Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Session(format!(
                "Failed to remove session file: {}",
                e
            ))),
        }
    }
}
