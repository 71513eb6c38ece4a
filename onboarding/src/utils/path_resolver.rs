use anyhow::Result;
use std::path::PathBuf;

const APP_DIR_NAME: &str = "coop-onboarding";
const LOG_DIR_NAME: &str = "Onboarding_Log";

/// Resolve deployment folder (absolute path)
pub fn resolve_deployment_folder() -> Result<PathBuf> {
    // Prefer the folder where the executable lives
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(dir) = exe_path.parent() {
            return Ok(dir.to_path_buf());
        }
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    Ok(cwd)
}

/// Per-user application folder, e.g. `~/.local/share/coop-onboarding` on Linux.
pub fn resolve_app_data_folder() -> Result<PathBuf> {
    let base = match dirs::data_local_dir() {
        Some(d) => d,
        None => resolve_deployment_folder()?,
    };
    Ok(base.join(APP_DIR_NAME))
}

/// Per-user config folder, e.g. `~/.config/coop-onboarding`.
pub fn resolve_config_folder() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Resolve log folder (absolute path). An explicit override wins; otherwise walk up from CWD
/// looking for an existing `Onboarding_Log/`, then fall back to the app data folder.
pub fn resolve_log_folder(override_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = override_dir.map(str::trim).filter(|d| !d.is_empty()) {
        let dir = PathBuf::from(dir);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
        return Ok(dir);
    }

    if let Ok(mut dir) = std::env::current_dir() {
        for _ in 0..8 {
            let candidate = dir.join(LOG_DIR_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if let Some(parent) = dir.parent() {
                dir = parent.to_path_buf();
            } else {
                break;
            }
        }
    }

    let log_dir = resolve_app_data_folder()?.join("logs");
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create log folder: {}", e))?;
    Ok(log_dir)
}

/// Resolve the folder holding the persisted session file.
pub fn resolve_session_folder(override_dir: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = override_dir.map(str::trim).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    Ok(resolve_app_data_folder()?.join("session"))
}
