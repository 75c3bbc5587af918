//! Session reconciliation between the identity provider and the profile store

mod gate;
mod reconcile;
mod watcher;

use log::{debug, error};
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

use crate::auth::{IdentityHandle, IdentityProvider, OAuthProvider};
use crate::config::ClientOptions;
use crate::error::Error;
use crate::store::ProfileStore;
use crate::users::{AppUser, UserRepository};

pub use gate::*;
pub use reconcile::*;
pub use watcher::*;

/// Auth operations of the application, one instance per page load
/// (or per request when rendering on the server)
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    store: ProfileStore,
    repo: Arc<dyn UserRepository>,
    reconciler: Arc<ProfileReconciler>,
    gate: AuthGate,
    options: Arc<ClientOptions>,
    watcher: Mutex<Option<AuthWatcher>>,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        repo: Arc<dyn UserRepository>,
        store: ProfileStore,
        options: ClientOptions,
    ) -> Self {
        let options = Arc::new(options);
        let reconciler = Arc::new(ProfileReconciler::new(
            store.clone(),
            repo.clone(),
            options.clone(),
        ));
        let gate = AuthGate::new(
            provider.clone(),
            store.clone(),
            reconciler.clone(),
            options.render,
        );

        Self {
            provider,
            store,
            repo,
            reconciler,
            gate,
            options,
            watcher: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// The live identity handle
    pub fn current_user(&self) -> Option<IdentityHandle> {
        self.provider.current_user()
    }

    pub fn user_data(&self) -> Option<AppUser> {
        self.store.user_data()
    }

    pub fn is_login(&self) -> bool {
        self.store.is_login()
    }

    pub fn is_admin(&self) -> bool {
        self.store.is_admin()
    }

    pub fn is_syncing(&self) -> bool {
        self.reconciler.is_syncing()
    }

    pub fn sync_error(&self) -> Option<String> {
        self.reconciler.sync_error()
    }

    /// A live identity with an id, or a restored session
    pub fn is_authenticated(&self) -> bool {
        let live = self
            .provider
            .current_user()
            .as_ref()
            .and_then(IdentityHandle::id)
            .is_some();
        live || self.store.has_valid_session()
    }

    /// See [`AuthGate::ensure_initialized`]
    pub async fn ensure_auth_initialized(&self) -> bool {
        self.gate.ensure_initialized().await
    }

    /// See [`AuthGate::initialize_auth`]
    pub async fn initialize_auth(&self) -> bool {
        self.gate.initialize_auth().await
    }

    /// Reconcile the store with the live identity handle
    pub async fn ensure_user_profile(&self) -> bool {
        let handle = self.provider.current_user();
        self.reconciler.ensure_user_profile(handle.as_ref()).await
    }

    /// Look up then insert or refresh the record of `handle`.
    ///
    /// A pending handle yields `Ok(None)` without touching the backend.
    pub async fn create_or_update_user(
        &self,
        handle: &IdentityHandle,
    ) -> Result<Option<AppUser>, Error> {
        let Some(identity) = handle.identity() else {
            return Ok(None);
        };
        crate::users::create_or_update_user(self.repo.as_ref(), identity, &self.options)
            .await
            .map(Some)
    }

    /// Start the background watcher; a second call keeps the running one
    pub fn watch(&self) {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.as_ref().map_or(false, AuthWatcher::is_running) {
            return;
        }
        *watcher = Some(AuthWatcher::spawn(
            self.provider.clone(),
            self.gate.clone(),
            self.reconciler.clone(),
            self.store.clone(),
        ));
    }

    /// Stop the background watcher, if any
    pub fn unwatch(&self) {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Where to send the browser for an OAuth sign-in.
    ///
    /// `origin` is the application origin; the provider redirects back to
    /// its callback path.
    pub async fn login_with_provider(
        &self,
        provider: OAuthProvider,
        origin: &str,
    ) -> Result<Url, Error> {
        let redirect_to = Url::parse(origin)?.join(&self.options.callback_path)?;
        self.provider
            .sign_in_with_provider(provider, redirect_to.as_str())
            .await
            .map_err(|err| {
                error!("OAuth sign-in with {} failed: {}", provider.as_str(), err);
                err
            })
    }

    /// Finish the OAuth round trip.
    ///
    /// Returns the path to navigate to once a user is known, or `None`
    /// while the provider has not reported one.
    pub async fn handle_auth_callback(&self) -> Option<String> {
        let handle = self.provider.current_user();
        if handle.as_ref().and_then(IdentityHandle::id).is_none() {
            return None;
        }

        if !self.reconciler.ensure_user_profile(handle.as_ref()).await {
            debug!("profile sync failed during callback: {:?}", self.sync_error());
        }
        Some(self.options.home_path.clone())
    }

    /// Sign out and clear the store; returns the login path
    pub async fn logout(&self) -> Result<String, Error> {
        if let Err(err) = self.provider.sign_out().await {
            error!("sign-out failed: {}", err);
            return Err(err);
        }
        self.store.reset();
        Ok(self.options.login_path.clone())
    }
}
