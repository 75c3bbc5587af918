//! Local persistence of the profile store

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use crate::error::Error;
use crate::store::SessionState;
use crate::users::AppUser;

/// The whitelisted store fields written to local storage.
///
/// `is_admin` is not persisted; [`restore_session`] rebuilds it from the role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(rename = "userDataStore", default)]
    pub user_data: Option<AppUser>,
    #[serde(rename = "isLoginStore", default)]
    pub is_login: bool,
}

impl From<&SessionState> for PersistedSession {
    fn from(state: &SessionState) -> Self {
        Self {
            user_data: state.user_data().cloned(),
            is_login: state.is_login(),
        }
    }
}

/// Rebuild the full session state from what was persisted.
///
/// Recomputes every derived field and marks the state hydrated. A login flag
/// without a user record does not survive.
pub fn restore_session(persisted: PersistedSession) -> SessionState {
    let mut state = SessionState::empty();
    let is_login = persisted.is_login && persisted.user_data.is_some();
    state.set_user_data(persisted.user_data);
    state.is_login = is_login;
    state.is_hydrated = true;
    state
}

/// Key-value storage for serialized store snapshots
pub trait SessionStorage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, Error>;

    fn save(&self, key: &str, value: &str) -> Result<(), Error>;

    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// Storage kept in process memory
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, Error> {
        let entries = self.entries.read().map_err(Error::storage)?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().map_err(Error::storage)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.write().map_err(Error::storage)?;
        entries.remove(key);
        Ok(())
    }
}

/// Storage with one JSON file per key
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SessionStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, Error> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::storage(err)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), Error> {
        fs::create_dir_all(&self.dir).map_err(Error::storage)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value).map_err(Error::storage)?;
        fs::rename(&tmp, self.path(key)).map_err(Error::storage)
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::storage(err)),
        }
    }
}
