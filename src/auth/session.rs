use chrono::{Local, NaiveDateTime};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::auth::access::AccessPolicy;
use crate::utils::error::ConsoleError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    Operator,
    Viewer,
    Other(String),
}

impl From<String> for Role {
    fn from(role: String) -> Self {
        match role.as_str() {
            "admin" => Role::Admin,
            "operator" => Role::Operator,
            "viewer" => Role::Viewer,
            _ => Role::Other(role),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Operator => "operator",
            Role::Viewer => "viewer",
            Role::Other(name) => name,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record as reported by the API (never carries the password).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub last_login: Option<NaiveDateTime>,
}

/// Credential for every authenticated API call.
///
/// Created by a successful login, refreshed when the server validates it,
/// and torn down on logout or when the server answers 401. It is passed
/// explicitly to whatever issues requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    token: String,
    pub user: UserInfo,
    #[serde(default)]
    pub expires_at: Option<NaiveDateTime>,
}

impl SessionContext {
    pub fn new(token: String, user: UserInfo, expires_at: Option<NaiveDateTime>) -> Self {
        Self {
            token,
            user,
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Short token prefix, safe to log.
    pub fn token_prefix(&self) -> &str {
        self.token.get(..8).unwrap_or(self.token.as_str())
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn role(&self) -> &Role {
        &self.user.role
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.user.permissions.iter().any(|p| p == permission)
    }

    pub fn access(&self) -> AccessPolicy {
        AccessPolicy::for_role(&self.user.role)
    }

    /// Server timestamps are naive local time.
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at.map(|expires| now >= expires).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Local::now().naive_local())
    }

    /// Applies the user and expiry returned by a successful validation.
    pub fn refresh(&mut self, user: UserInfo, expires_at: Option<NaiveDateTime>) {
        debug!("🔄 Refreshing session {}... for '{}'", self.token_prefix(), user.username);
        self.user = user;
        if expires_at.is_some() {
            self.expires_at = expires_at;
        }
    }
}

/// Ephemeral storage for the current session, the console's equivalent of
/// browser session storage.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<SessionContext>, ConsoleError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let session: SessionContext = serde_json::from_str(&content)?;
        debug!("📂 Loaded session for '{}' from {}", session.username(), self.path.display());
        Ok(Some(session))
    }

    /// Writes the session readable by the owner only (0600 on unix), replacing
    /// any previous file in one rename.
    pub fn save(&self, session: &SessionContext) -> Result<(), ConsoleError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, session)?;
        file.persist(&self.path).map_err(|e| ConsoleError::Io(e.error))?;
        debug!("💾 Session for '{}' saved to {}", session.username(), self.path.display());
        Ok(())
    }

    /// Removes the stored session. Returns whether one existed.
    pub fn clear(&self) -> Result<bool, ConsoleError> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        info!("🧹 Cleared stored session at {}", self.path.display());
        Ok(true)
    }
}
