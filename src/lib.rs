//! Comeback client library
//!
//! Session and profile reconciliation for the Comeback application on top of
//! Supabase: the identity provider (GoTrue) reports who is signed in, the
//! `users` table (PostgREST) holds the application record, and a local
//! profile store mirrors it for route guards and UI.

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod guard;
pub mod postgrest;
pub mod session;
pub mod stats;
pub mod store;
pub mod users;

#[cfg(test)]
mod testing;

use log::warn;
use reqwest::Client;
use std::sync::Arc;

use crate::auth::{GoTrueProvider, IdentityProvider};
use crate::config::ClientOptions;
use crate::guard::{AdminGuard, AuthGuard};
use crate::postgrest::PostgrestClient;
use crate::session::AuthService;
use crate::stats::StatisticsClient;
use crate::store::{ProfileStore, SessionStorage};
use crate::users::PostgrestUserRepository;

/// The main entry point for the Comeback client
pub struct Comeback {
    /// The base URL for the Supabase project
    pub url: String,
    /// The anonymous API key for the Supabase project
    pub key: String,
    /// HTTP client used for requests
    pub http_client: Client,
    /// Client options
    pub options: ClientOptions,
    identity: Arc<GoTrueProvider>,
    auth: Arc<AuthService>,
}

impl Comeback {
    /// Create a new client without local persistence
    ///
    /// # Example
    ///
    /// ```
    /// use comeback::Comeback;
    ///
    /// let comeback = Comeback::new("https://your-project-url.supabase.co", "your-anon-key");
    /// assert!(!comeback.auth().is_login());
    /// ```
    pub fn new(supabase_url: &str, supabase_key: &str) -> Self {
        Self::new_with_options(supabase_url, supabase_key, ClientOptions::default())
    }

    /// Create a new client with custom options
    ///
    /// # Example
    ///
    /// ```
    /// use comeback::{Comeback, config::{ClientOptions, ExecutionMode}};
    ///
    /// let options = ClientOptions::default().with_mode(ExecutionMode::Development);
    /// let comeback = Comeback::new_with_options(
    ///     "https://your-project-url.supabase.co",
    ///     "your-anon-key",
    ///     options
    /// );
    /// ```
    pub fn new_with_options(supabase_url: &str, supabase_key: &str, options: ClientOptions) -> Self {
        Self::build(supabase_url, supabase_key, options, None)
    }

    /// Create a new client whose profile store persists to `storage`.
    ///
    /// The persisted fields are restored here, before anything can ask the
    /// auth gate for the session.
    pub fn new_with_storage(
        supabase_url: &str,
        supabase_key: &str,
        options: ClientOptions,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        Self::build(supabase_url, supabase_key, options, Some(storage))
    }

    fn build(
        supabase_url: &str,
        supabase_key: &str,
        options: ClientOptions,
        storage: Option<Arc<dyn SessionStorage>>,
    ) -> Self {
        let url = supabase_url.trim_end_matches('/').to_string();
        let http_client = Client::new();

        let identity = Arc::new(GoTrueProvider::new(
            &url,
            supabase_key,
            http_client.clone(),
            options.request_timeout,
        ));

        let store = ProfileStore::new(options.render, storage, &options.storage_key);
        if let Err(err) = store.restore() {
            warn!("could not restore the profile store: {}", err);
        }

        let users = table_client(&url, supabase_key, &http_client, &options, &options.users_table);
        let repo = Arc::new(PostgrestUserRepository::new(users).with_session(identity.clone()));
        let provider: Arc<dyn IdentityProvider> = identity.clone();
        let auth = Arc::new(AuthService::new(provider, repo, store, options.clone()));

        Self {
            url,
            key: supabase_key.to_string(),
            http_client,
            options,
            identity,
            auth,
        }
    }

    /// Session operations: initialization, reconciliation, login and logout
    pub fn auth(&self) -> &Arc<AuthService> {
        &self.auth
    }

    /// The Supabase identity provider, for installing tokens and cookies
    pub fn identity(&self) -> &Arc<GoTrueProvider> {
        &self.identity
    }

    /// Create a new PostgrestClient for database operations on a specific table or view.
    ///
    /// Requests carry the signed-in user's token when there is one.
    ///
    /// # Example
    ///
    /// ```
    /// use comeback::Comeback;
    ///
    /// let comeback = Comeback::new("https://your-project-url.supabase.co", "your-anon-key");
    /// let query = comeback.from("artists");
    /// ```
    pub fn from(&self, table: &str) -> PostgrestClient {
        let client = table_client(&self.url, &self.key, &self.http_client, &self.options, table);
        match self.identity.access_token() {
            Some(token) => client.with_auth(&token),
            None => client,
        }
    }

    /// Dashboard statistics
    pub fn statistics(&self) -> StatisticsClient {
        StatisticsClient::new(self.from(&self.options.users_table))
    }

    /// The `auth` route guard
    pub fn auth_guard(&self) -> AuthGuard {
        AuthGuard::new(self.auth.clone())
    }

    /// The `admin` route guard
    pub fn admin_guard(&self) -> AdminGuard {
        AdminGuard::new(self.auth.clone())
    }
}

fn table_client(
    url: &str,
    key: &str,
    http_client: &Client,
    options: &ClientOptions,
    table: &str,
) -> PostgrestClient {
    PostgrestClient::new(url, key, table, http_client.clone())
        .with_timeout(options.request_timeout)
        .with_schema(&options.db_schema)
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{IdentityHandle, IdentityProvider, OAuthProvider};
    pub use crate::config::{ClientOptions, ExecutionMode, RenderMode};
    pub use crate::error::Error;
    pub use crate::guard::{GuardOutcome, NavigationRequest, RouteGuard};
    pub use crate::session::AuthService;
    pub use crate::store::ProfileStore;
    pub use crate::users::{AppUser, Role};
    pub use crate::Comeback;
}
