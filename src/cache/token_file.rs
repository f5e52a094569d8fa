use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::cache::token::Token;
use crate::error::{TokenError, TokenResult};

// distinguishes concurrent writes to the same path within one process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// On-disk shape of the token record.
#[derive(Debug, Serialize, Deserialize)]
pub struct PersistedToken {
    pub token: String,
    pub expired_timestamp: u64,
    #[serde(default)]
    pub last_update: u64,
}

impl From<&Token> for PersistedToken {
    fn from(token: &Token) -> Self {
        Self {
            token: token.value.clone(),
            expired_timestamp: token.expires_at,
            last_update: token.last_update,
        }
    }
}

impl From<PersistedToken> for Token {
    fn from(p: PersistedToken) -> Self {
        Token::new(p.token, p.expired_timestamp, p.last_update)
    }
}

/// Durable mirror of the in-memory token.
///
/// Writes go to a sibling temp file which is flushed, restricted to `0600`
/// and renamed over the target, so readers never observe a partial record.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `Ok(None)` when no file exists; corrupt or unreadable content is an error
    /// the caller is expected to treat as a cache miss.
    pub async fn load(&self) -> TokenResult<Option<Token>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted token");
                return Ok(None);
            }
            Err(e) => return Err(self.read_error(e)),
        };

        let persisted: PersistedToken =
            serde_json::from_slice(&content).map_err(|e| self.read_error(e))?;
        if persisted.token.is_empty() {
            return Err(self.read_error("empty token value"));
        }
        Ok(Some(persisted.into()))
    }

    pub async fn store(&self, token: &Token) -> TokenResult<()> {
        let body = serde_json::to_vec_pretty(&PersistedToken::from(token))
            .map_err(|e| self.write_error(e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = write_restricted(&tmp, &body).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.write_error(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(self.write_error(e));
        }

        info!(path = %self.path.display(), expires_at = token.expires_at, "token persisted");
        Ok(())
    }

    pub async fn remove(&self) -> TokenResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(_) => {
                info!(path = %self.path.display(), "persisted token removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.write_error(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "token".to_owned());
        self.path
            .with_file_name(format!(
                ".{}.{}.{}.tmp",
                file_name,
                std::process::id(),
                TMP_SEQ.fetch_add(1, Ordering::Relaxed)
            ))
    }

    fn read_error(&self, reason: impl ToString) -> TokenError {
        TokenError::PersistenceRead {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn write_error(&self, reason: impl ToString) -> TokenError {
        TokenError::PersistenceWrite {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

async fn write_restricted(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body).await?;
    file.sync_all().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}
