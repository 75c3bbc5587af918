//! Lookup and upsert of application user records

mod types;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};

use std::sync::Arc;

use crate::auth::{GoTrueProvider, Identity, UserId};
use crate::config::{ClientOptions, ExecutionMode};
use crate::error::Error;
use crate::postgrest::PostgrestClient;

pub use types::*;

/// Storage of application user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// The record with this id; `Ok(None)` when there is none yet
    async fn find_by_id(&self, id: &UserId) -> Result<Option<AppUser>, Error>;

    /// Insert a new record and return it as stored
    async fn insert(&self, user: &NewUser) -> Result<AppUser, Error>;

    /// Update a record and return it as stored
    async fn update(&self, id: &UserId, changes: &UserChanges) -> Result<AppUser, Error>;
}

/// [`UserRepository`] over the PostgREST `users` table
pub struct PostgrestUserRepository {
    client: PostgrestClient,
    session: Option<Arc<GoTrueProvider>>,
}

impl PostgrestUserRepository {
    pub fn new(client: PostgrestClient) -> Self {
        Self {
            client,
            session: None,
        }
    }

    /// Send requests with the signed-in user's token, so row level
    /// security applies to them
    pub fn with_session(mut self, provider: Arc<GoTrueProvider>) -> Self {
        self.session = Some(provider);
        self
    }

    fn client(&self) -> PostgrestClient {
        let token = self.session.as_ref().and_then(|p| p.access_token());
        match token {
            Some(token) => self.client.clone().with_auth(&token),
            None => self.client.clone(),
        }
    }
}

#[async_trait]
impl UserRepository for PostgrestUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<AppUser>, Error> {
        match self
            .client()
            .select("*")
            .eq("id", id)
            .single::<AppUser>()
            .await
        {
            Ok(user) => Ok(Some(user)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn insert(&self, user: &NewUser) -> Result<AppUser, Error> {
        self.client().insert(user).single::<AppUser>().await
    }

    async fn update(&self, id: &UserId, changes: &UserChanges) -> Result<AppUser, Error> {
        self.client()
            .update(changes)
            .eq("id", id)
            .single::<AppUser>()
            .await
    }
}

async fn lookup(
    repo: &dyn UserRepository,
    id: &UserId,
    options: &ClientOptions,
) -> Result<Option<AppUser>, Error> {
    match options.mode {
        ExecutionMode::Production => repo.find_by_id(id).await,
        // Dropping the timed-out future cancels the request. A stalled local
        // database is then treated as "no record", which inserts a fresh row.
        ExecutionMode::Development => {
            match tokio::time::timeout(options.dev_lookup_timeout, repo.find_by_id(id)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        "user lookup for {} exceeded {:?}, treating as not found",
                        id, options.dev_lookup_timeout
                    );
                    Ok(None)
                }
            }
        }
    }
}

/// Find the record for `identity`, then insert or refresh it.
///
/// A new record gets role `USER`. An existing record keeps its role and
/// `created_at`; name, photo and email fall back to the stored values when
/// the provider sent none.
pub async fn create_or_update_user(
    repo: &dyn UserRepository,
    identity: &Identity,
    options: &ClientOptions,
) -> Result<AppUser, Error> {
    let existing = lookup(repo, &identity.id, options).await.map_err(|err| {
        error!("failed to fetch user {}: {}", identity.id, err);
        err
    })?;

    let now = Utc::now().to_rfc3339();
    let metadata = &identity.metadata;
    let email = identity.email.clone().filter(|e| !e.is_empty());

    match existing {
        None => {
            let user = NewUser {
                id: identity.id.clone(),
                email: email.unwrap_or_default(),
                name: metadata
                    .display_name()
                    .unwrap_or(DEFAULT_DISPLAY_NAME)
                    .to_string(),
                photo_url: metadata.avatar().unwrap_or_default().to_string(),
                role: Role::User,
                created_at: now.clone(),
                updated_at: now,
            };
            debug!("creating user record {}", user.id);
            repo.insert(&user).await.map_err(|err| {
                error!("failed to create user {}: {}", identity.id, err);
                err
            })
        }
        Some(stored) => {
            let name = match metadata.display_name() {
                Some(name) => name.to_string(),
                None if !stored.name.is_empty() => stored.name.clone(),
                None => DEFAULT_DISPLAY_NAME.to_string(),
            };
            let changes = UserChanges {
                email: email.unwrap_or(stored.email),
                name,
                photo_url: metadata
                    .avatar()
                    .map(str::to_string)
                    .unwrap_or(stored.photo_url),
                role: stored.role,
                updated_at: now,
            };
            debug!("refreshing user record {}", identity.id);
            repo.update(&identity.id, &changes).await.map_err(|err| {
                error!("failed to update user {}: {}", identity.id, err);
                err
            })
        }
    }
}
