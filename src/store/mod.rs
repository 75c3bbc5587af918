//! The client-local profile store

mod persist;

use log::{debug, warn};
use std::sync::{Arc, PoisonError, RwLock};

use crate::auth::UserId;
use crate::config::RenderMode;
use crate::error::Error;
use crate::users::AppUser;

pub use persist::*;

/// Login and admin status mirrored for guards and UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    user_data: Option<AppUser>,
    is_login: bool,
    is_admin: bool,
    is_hydrated: bool,
}

impl SessionState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn user_data(&self) -> Option<&AppUser> {
        self.user_data.as_ref()
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user_data.as_ref().map(|user| &user.id)
    }

    pub fn is_login(&self) -> bool {
        self.is_login
    }

    /// Always `user_data.role == ADMIN`
    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_hydrated(&self) -> bool {
        self.is_hydrated
    }

    /// A logged-in flag backed by a user record
    pub fn has_valid_session(&self) -> bool {
        self.is_login && self.user_data.is_some()
    }

    /// The only place `is_admin` is written
    fn set_user_data(&mut self, user: Option<AppUser>) {
        self.is_admin = user.as_ref().map_or(false, AppUser::is_admin);
        self.user_data = user;
    }

    fn clear(&mut self) {
        self.set_user_data(None);
        self.is_login = false;
    }
}

/// Shared handle on the session state, written through to local storage
#[derive(Clone)]
pub struct ProfileStore {
    state: Arc<RwLock<SessionState>>,
    storage: Option<Arc<dyn SessionStorage>>,
    key: String,
}

impl ProfileStore {
    /// Create an empty store.
    ///
    /// Server-rendered stores are hydrated at once and never touch storage.
    pub fn new(render: RenderMode, storage: Option<Arc<dyn SessionStorage>>, key: &str) -> Self {
        let mut state = SessionState::empty();
        let storage = match render {
            RenderMode::Server => {
                state.is_hydrated = true;
                None
            }
            RenderMode::Client => storage,
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            storage,
            key: key.to_string(),
        }
    }

    /// Client store without persistence
    pub fn in_memory() -> Self {
        Self::new(RenderMode::Client, None, "userStore")
    }

    fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut state);
        let persisted = PersistedSession::from(&*state);
        drop(state);
        self.persist(&persisted);
        result
    }

    fn persist(&self, persisted: &PersistedSession) {
        let Some(storage) = &self.storage else {
            return;
        };
        let saved = serde_json::to_string(persisted)
            .map_err(Error::from)
            .and_then(|json| storage.save(&self.key, &json));
        if let Err(err) = saved {
            warn!("failed to persist profile store: {}", err);
        }
    }

    /// Load the persisted fields, once per store, and mark it hydrated.
    ///
    /// Unreadable storage still hydrates the store, empty.
    pub fn restore(&self) -> Result<(), Error> {
        if self.is_hydrated() {
            return Ok(());
        }

        let loaded = match &self.storage {
            Some(storage) => storage.load(&self.key).and_then(|raw| {
                raw.map(|json| serde_json::from_str::<PersistedSession>(&json))
                    .transpose()
                    .map_err(Error::from)
            }),
            None => Ok(None),
        };

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match loaded {
            Ok(persisted) => {
                *state = restore_session(persisted.unwrap_or_default());
                debug!("profile store restored, user {:?}", state.user_id());
                Ok(())
            }
            Err(err) => {
                *state = restore_session(PersistedSession::default());
                Err(err)
            }
        }
    }

    pub fn mark_hydrated(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.is_hydrated = true;
    }

    pub fn snapshot(&self) -> SessionState {
        self.read(Clone::clone)
    }

    pub fn user_data(&self) -> Option<AppUser> {
        self.read(|s| s.user_data.clone())
    }

    pub fn is_login(&self) -> bool {
        self.read(|s| s.is_login)
    }

    pub fn is_admin(&self) -> bool {
        self.read(|s| s.is_admin)
    }

    pub fn is_hydrated(&self) -> bool {
        self.read(|s| s.is_hydrated)
    }

    pub fn has_valid_session(&self) -> bool {
        self.read(SessionState::has_valid_session)
    }

    /// Whether the store already holds a valid session for `id`
    pub fn is_synced_with(&self, id: &UserId) -> bool {
        self.read(|s| s.has_valid_session() && s.user_id() == Some(id))
    }

    /// Replace the user record; `is_admin` follows its role
    pub fn set_user_data(&self, user: Option<AppUser>) {
        self.write(|s| s.set_user_data(user));
    }

    /// Record a successful reconciliation, or clear the store on `None`
    pub fn sync_profile(&self, user: Option<AppUser>) {
        self.write(|s| match user {
            Some(user) => {
                s.set_user_data(Some(user));
                s.is_login = true;
                s.is_hydrated = true;
            }
            None => s.clear(),
        });
    }

    /// Recompute the derived fields from the stored record
    pub fn refresh_derived(&self) {
        self.write(|s| {
            let user = s.user_data.take();
            s.set_user_data(user);
        });
    }

    /// Back to the empty, hydrated state
    pub fn reset(&self) {
        self.write(|s| {
            s.clear();
            s.is_hydrated = true;
        });
    }
}
