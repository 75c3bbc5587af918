//! Route guards deciding whether a navigation may proceed

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{identity_from_cookie, IdentityHandle, UserId};
use crate::config::RenderMode;
use crate::error::Error;
use crate::session::AuthService;

/// A navigation about to happen
#[derive(Debug, Clone, Default)]
pub struct NavigationRequest {
    /// Target path
    pub path: String,

    /// Value of the auth cookie sent with the request (server render)
    pub auth_cookie: Option<String>,
}

impl NavigationRequest {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            auth_cookie: None,
        }
    }

    pub fn with_auth_cookie(mut self, value: &str) -> Self {
        self.auth_cookie = Some(value.to_string());
        self
    }
}

/// What a guard decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    Redirect(String),
}

/// A named check attached to routes.
///
/// "Not logged in" is a [`GuardOutcome::Redirect`]; "logged in but not
/// allowed" is an [`Error::Forbidden`].
#[async_trait]
pub trait RouteGuard: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, request: &NavigationRequest) -> Result<GuardOutcome, Error>;
}

/// Run `guards` in order and stop at the first one that does not proceed
pub async fn run_guards(
    guards: &[Arc<dyn RouteGuard>],
    request: &NavigationRequest,
) -> Result<GuardOutcome, Error> {
    for guard in guards {
        match guard.check(request).await? {
            GuardOutcome::Proceed => continue,
            redirect => {
                debug!("guard {} redirected {}", guard.name(), request.path);
                return Ok(redirect);
            }
        }
    }
    Ok(GuardOutcome::Proceed)
}

fn redirect_to_login(service: &AuthService) -> GuardOutcome {
    GuardOutcome::Redirect(service.options().login_path.clone())
}

/// Cheap server-side check: any identity handle in the request passes
fn server_check(service: &AuthService, request: &NavigationRequest) -> GuardOutcome {
    let handle = match request.auth_cookie.as_deref() {
        Some(cookie) => identity_from_cookie(cookie).unwrap_or_else(|err| {
            warn!("unreadable auth cookie on {}: {}", request.path, err);
            None
        }),
        None => service.current_user(),
    };

    if handle.is_some() {
        GuardOutcome::Proceed
    } else {
        redirect_to_login(service)
    }
}

/// Wait for the gate at most `limit`; running out of time is not fatal
async fn wait_for_gate(service: &AuthService, limit: Duration) {
    let waited = tokio::time::timeout(limit, service.ensure_auth_initialized())
        .await
        .map_err(|_| Error::Timeout("auth initialization"));

    match waited {
        Ok(authenticated) => debug!("auth initialized, authenticated: {}", authenticated),
        Err(err) => warn!("{} after {:?}, checking current state", err, limit),
    }
}

/// Lets authenticated users through, redirects the rest to the login page
pub struct AuthGuard {
    service: Arc<AuthService>,
}

impl AuthGuard {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RouteGuard for AuthGuard {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn check(&self, request: &NavigationRequest) -> Result<GuardOutcome, Error> {
        let service = self.service.as_ref();
        if service.options().render == RenderMode::Server {
            return Ok(server_check(service, request));
        }

        wait_for_gate(service, service.options().auth_init_timeout).await;

        if service.is_authenticated() {
            Ok(GuardOutcome::Proceed)
        } else {
            Ok(redirect_to_login(service))
        }
    }
}

/// Requires an authenticated user whose record has the `ADMIN` role
pub struct AdminGuard {
    service: Arc<AuthService>,
}

impl AdminGuard {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self { service }
    }

    /// Poll the store until it holds the live user's record, or any record
    /// when there is no live id, or the attempts run out
    async fn wait_for_profile(&self, live: Option<&UserId>) -> bool {
        let options = self.service.options();
        let store = self.service.store();
        let ready = || match live {
            Some(id) => store.is_synced_with(id),
            None => store.user_data().is_some(),
        };

        for _ in 0..options.max_retry_attempts {
            if ready() {
                return true;
            }
            tokio::time::sleep(options.retry_delay).await;
        }
        ready()
    }
}

#[async_trait]
impl RouteGuard for AdminGuard {
    fn name(&self) -> &'static str {
        "admin"
    }

    async fn check(&self, request: &NavigationRequest) -> Result<GuardOutcome, Error> {
        let service = self.service.as_ref();
        if service.options().render == RenderMode::Server {
            // role checks need the client store
            return Ok(server_check(service, request));
        }

        wait_for_gate(service, service.options().admin_init_timeout).await;

        if !service.is_authenticated() {
            return Ok(redirect_to_login(service));
        }

        let current = service.current_user();
        let live = current.as_ref().and_then(IdentityHandle::id);
        let ready = self.wait_for_profile(live).await;
        if !ready {
            // never decide on a record left over from another user
            warn!(
                "no user record for {:?} after {:?}",
                live,
                service.options().max_wait_time()
            );
        }

        if ready && service.is_admin() {
            Ok(GuardOutcome::Proceed)
        } else {
            Err(Error::forbidden())
        }
    }
}
