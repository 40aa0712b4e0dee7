use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEFAULT_SESSION_DIR: &str = "~/.jackpot";
const SESSION_FILE: &str = "session.json";

/// Whether a wallet was connected when the dashboard last ran, and which.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub connected: bool,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl SessionRecord {
    /// The address to reconnect with, if the last transition was a connect.
    pub fn reconnect_address(&self) -> Option<&str> {
        if self.connected {
            self.address.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    path: PathBuf,
}

impl SessionStore {
    /// Creates the directory if needed. `dir` may start with `~`.
    pub fn open(dir: Option<&str>) -> Result<Self> {
        let dir = resolve_session_dir(dir.unwrap_or(DEFAULT_SESSION_DIR));
        if !dir.exists() {
            fs::create_dir_all(&dir).with_context(|| {
                format!("Failed to create session directory {}", dir.display())
            })?;
        }
        let path = dir.join(SESSION_FILE);
        Ok(Self { dir, path })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or empty file is a fresh, disconnected session.
    pub fn load(&self) -> Result<SessionRecord> {
        if !self.path.exists() {
            return Ok(SessionRecord::default());
        }
        let data = fs::read(&self.path).context("Failed to read wallet session")?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(SessionRecord::default());
        }
        serde_json::from_slice(&data).map_err(|err| {
            anyhow!(
                "Failed to parse wallet session at {}: {err}",
                self.path.display()
            )
        })
    }

    pub fn record_connect(&self, address: &str) -> Result<SessionRecord> {
        if address.trim().is_empty() {
            return Err(anyhow!("Cannot record a connection without an address"));
        }
        self.save(SessionRecord {
            connected: true,
            address: Some(address.trim().to_owned()),
            updated_at: Some(Utc::now().to_rfc3339()),
        })
    }

    /// Keeps the last-known address for display.
    pub fn record_disconnect(&self) -> Result<SessionRecord> {
        let previous = self.load().unwrap_or_default();
        self.save(SessionRecord {
            connected: false,
            address: previous.address,
            updated_at: Some(Utc::now().to_rfc3339()),
        })
    }

    fn save(&self, record: SessionRecord) -> Result<SessionRecord> {
        let json =
            serde_json::to_vec_pretty(&record).context("Failed to serialize wallet session")?;
        fs::write(&self.path, json).with_context(|| {
            format!("Failed to write wallet session to {}", self.path.display())
        })?;
        Ok(record)
    }
}

pub fn resolve_session_dir(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use tempdir::TempDir;

    fn store(temp_dir: &TempDir) -> SessionStore {
        let dir = temp_dir.path().join("session");
        SessionStore::open(dir.to_str()).unwrap()
    }

    #[test]
    fn load__fresh_directory_is_disconnected() {
        // given
        let temp_dir = TempDir::new("wallet_session").unwrap();
        let store = store(&temp_dir);

        // when
        let record = store.load().unwrap();

        // then
        assert_eq!(record, SessionRecord::default());
        assert_eq!(record.reconnect_address(), None);
        assert!(store.dir().exists());
    }

    #[test]
    fn record_connect__is_read_back_on_next_start() {
        // given
        let temp_dir = TempDir::new("wallet_session").unwrap();
        store(&temp_dir).record_connect("0xabc").unwrap();

        // when
        let record = store(&temp_dir).load().unwrap();

        // then
        assert!(record.connected);
        assert_eq!(record.reconnect_address(), Some("0xabc"));
        assert!(record.updated_at.is_some());
    }

    #[test]
    fn record_disconnect__keeps_last_known_address() {
        // given
        let temp_dir = TempDir::new("wallet_session").unwrap();
        let store = store(&temp_dir);
        store.record_connect("0xabc").unwrap();

        // when
        store.record_disconnect().unwrap();

        // then
        let record = store.load().unwrap();
        assert!(!record.connected);
        assert_eq!(record.address.as_deref(), Some("0xabc"));
        assert_eq!(record.reconnect_address(), None);
    }

    #[test]
    fn load__corrupt_file_is_an_error() {
        // given
        let temp_dir = TempDir::new("wallet_session").unwrap();
        let store = store(&temp_dir);
        fs::write(store.path(), b"{not json").unwrap();

        // when
        let result = store.load();

        // then
        assert!(result.is_err());
    }

    #[test]
    fn resolve_session_dir__expands_home() {
        // given
        let home = std::env::var("HOME").unwrap();

        // when
        let dir = resolve_session_dir("~/.jackpot");

        // then
        assert_eq!(dir, PathBuf::from(home).join(".jackpot"));
    }
}
