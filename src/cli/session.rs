use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::security::jwt::TokenPair;

/// Tokens of the signed-in user, kept between CLI invocations
pub struct SessionFile {
    path: PathBuf,
}

impl SessionFile {
    /// Session file kept beside the database
    pub fn beside(database_path: &str) -> Self {
        let dir = Path::new(database_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Self { path: dir.join("session.json") }
    }

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, tokens: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("Failed to create session directory")?;
            }
        }
        let json = serde_json::to_string_pretty(tokens).context("Failed to serialize session")?;
        fs::write(&self.path, json).context("Failed to write session file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .context("Failed to restrict session file permissions")?;
        }

        debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<Option<TokenPair>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.path).context("Failed to read session file")?;
        let tokens = serde_json::from_str(&json).context("Session file is corrupted")?;
        Ok(Some(tokens))
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}
