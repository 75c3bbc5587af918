//! Profile reconciliation: identity handle -> user record -> store

use log::{debug, error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::auth::IdentityHandle;
use crate::config::ClientOptions;
use crate::store::ProfileStore;
use crate::users::{create_or_update_user, UserRepository};

/// Brings the profile store in line with the current identity handle
pub struct ProfileReconciler {
    store: ProfileStore,
    repo: Arc<dyn UserRepository>,
    options: Arc<ClientOptions>,
    syncing: AtomicBool,
    sync_error: RwLock<Option<String>>,
    /// Held from the lookup to the store write
    sync_lock: Mutex<()>,
}

/// Clears the syncing flag however the sync ends
struct SyncingGuard<'a>(&'a AtomicBool);

impl<'a> SyncingGuard<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ProfileReconciler {
    pub fn new(store: ProfileStore, repo: Arc<dyn UserRepository>, options: Arc<ClientOptions>) -> Self {
        Self {
            store,
            repo,
            options,
            syncing: AtomicBool::new(false),
            sync_error: RwLock::new(None),
            sync_lock: Mutex::new(()),
        }
    }

    /// A lookup or upsert is in flight
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    /// Message of the last failed reconciliation
    pub fn sync_error(&self) -> Option<String> {
        self.sync_error
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_sync_error(&self, message: Option<String>) {
        *self.sync_error.write().unwrap_or_else(PoisonError::into_inner) = message;
    }

    /// Make the store reflect `handle`.
    ///
    /// Returns `true` when the store holds the record of the handle's user.
    /// A handle without id never reaches the database: the store is cleared
    /// unless it holds a valid persisted session, and `false` is returned.
    ///
    /// Concurrent calls are serialized; a caller that finds the store already
    /// synced with its handle's user once it holds the lock returns at once.
    pub async fn ensure_user_profile(&self, handle: Option<&IdentityHandle>) -> bool {
        if let Some(identity) = handle.and_then(IdentityHandle::identity) {
            if self.store.is_synced_with(&identity.id) {
                return true;
            }
        }

        let _sync = self.sync_lock.lock().await;

        let Some(identity) = handle.and_then(IdentityHandle::identity) else {
            if self.store.has_valid_session() {
                debug!("no identity id, keeping the persisted session");
            } else {
                self.store.reset();
            }
            return false;
        };

        if self.store.is_synced_with(&identity.id) {
            return true;
        }

        let _syncing = SyncingGuard::start(&self.syncing);
        self.set_sync_error(None);

        match create_or_update_user(self.repo.as_ref(), identity, &self.options).await {
            Ok(user) => {
                debug!("profile synced for {} ({})", user.id, user.role.as_str());
                self.store.sync_profile(Some(user));
                true
            }
            Err(err) => {
                error!("profile sync failed for {}: {}", identity.id, err);
                self.set_sync_error(Some(err.to_string()));
                self.store.reset();
                false
            }
        }
    }
}
