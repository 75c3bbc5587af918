//! In-memory collaborators for unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use crate::auth::{Identity, IdentityHandle, IdentityProvider, OAuthProvider, PendingIdentity, UserId};
use crate::error::{DatabaseError, Error};
use crate::users::{AppUser, NewUser, UserChanges, UserRepository};

fn db_error(code: &str) -> Error {
    Error::Database(DatabaseError {
        code: Some(code.to_string()),
        message: Some(format!("simulated {}", code)),
        ..Default::default()
    })
}

#[derive(Default)]
pub struct MemoryUserRepository {
    rows: Mutex<HashMap<UserId, AppUser>>,
    lookups: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    lookup_failure: Mutex<Option<String>>,
    write_failure: Mutex<Option<String>>,
    lookup_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, user: AppUser) {
        self.rows.lock().unwrap().insert(user.id.clone(), user);
    }

    pub fn get(&self, id: &str) -> Option<AppUser> {
        let id = UserId::new(id)?;
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn fail_lookups_with(&self, code: &str) {
        *self.lookup_failure.lock().unwrap() = Some(code.to_string());
    }

    pub fn fail_writes_with(&self, code: &str) {
        *self.write_failure.lock().unwrap() = Some(code.to_string());
    }

    pub fn clear_write_failure(&self) {
        *self.write_failure.lock().unwrap() = None;
    }

    pub fn delay_lookups(&self, delay: Duration) {
        *self.lookup_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_writes(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    async fn write_pause(&self) {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<AppUser>, Error> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = *self.lookup_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(code) = self.lookup_failure.lock().unwrap().as_deref() {
            return Err(db_error(code));
        }
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn insert(&self, user: &NewUser) -> Result<AppUser, Error> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.write_pause().await;
        if let Some(code) = self.write_failure.lock().unwrap().as_deref() {
            return Err(db_error(code));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(&user.id) {
            return Err(db_error("23505"));
        }
        let row = AppUser {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            photo_url: user.photo_url.clone(),
            role: user.role,
            created_at: Some(user.created_at.clone()),
            updated_at: Some(user.updated_at.clone()),
        };
        rows.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update(&self, id: &UserId, changes: &UserChanges) -> Result<AppUser, Error> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.write_pause().await;
        if let Some(code) = self.write_failure.lock().unwrap().as_deref() {
            return Err(db_error(code));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| db_error("PGRST116"))?;
        row.email = changes.email.clone();
        row.name = changes.name.clone();
        row.photo_url = changes.photo_url.clone();
        row.role = changes.role;
        row.updated_at = Some(changes.updated_at.clone());
        Ok(row.clone())
    }
}

/// Identity provider whose handle the test sets by hand
pub struct StaticIdentityProvider {
    user: watch::Sender<Option<IdentityHandle>>,
    sign_outs: AtomicUsize,
}

impl StaticIdentityProvider {
    pub fn new(handle: Option<IdentityHandle>) -> Self {
        let (user, _) = watch::channel(handle);
        Self {
            user,
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, handle: Option<IdentityHandle>) {
        self.user.send_replace(handle);
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    fn current_user(&self) -> Option<IdentityHandle> {
        self.user.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<IdentityHandle>> {
        self.user.subscribe()
    }

    async fn sign_in_with_provider(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<Url, Error> {
        let mut url = Url::parse("https://auth.test/authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.user.send_replace(None);
        Ok(())
    }
}

pub fn handle(id: &str) -> IdentityHandle {
    Identity::new(UserId::new(id).unwrap())
        .with_email("a@x.com")
        .into()
}

pub fn pending() -> IdentityHandle {
    IdentityHandle::Pending(PendingIdentity::default())
}

pub fn user(id: &str, role: crate::users::Role) -> AppUser {
    AppUser {
        id: UserId::new(id).unwrap(),
        email: format!("{}@x.com", id),
        name: id.to_string(),
        photo_url: String::new(),
        role,
        created_at: None,
        updated_at: None,
    }
}
