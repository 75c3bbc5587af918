//! Identity provider access (Supabase GoTrue)

mod identity;
mod session;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use crate::error::Error;
use crate::fetch::Fetch;

pub use identity::*;
pub use session::*;

/// OAuth providers the application offers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
    Discord,
    Apple,
    Spotify,
}

impl OAuthProvider {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Discord => "discord",
            Self::Apple => "apple",
            Self::Spotify => "spotify",
        }
    }
}

/// The external identity provider as seen by the session layer
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The current handle, `None` when nobody is signed in
    fn current_user(&self) -> Option<IdentityHandle>;

    /// Observe handle changes
    fn subscribe(&self) -> watch::Receiver<Option<IdentityHandle>>;

    /// URL to send the browser to for an OAuth sign-in
    async fn sign_in_with_provider(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<Url, Error>;

    /// End the provider session
    async fn sign_out(&self) -> Result<(), Error>;
}

/// [`IdentityProvider`] backed by the Supabase auth API
pub struct GoTrueProvider {
    /// The base URL for the Supabase project
    url: String,

    /// The anonymous API key for the Supabase project
    key: String,

    /// HTTP client used for requests
    client: Client,

    /// The current token session
    session: Arc<RwLock<Option<Session>>>,

    user: watch::Sender<Option<IdentityHandle>>,

    timeout: Option<Duration>,
}

impl GoTrueProvider {
    /// Create a new provider client
    pub fn new(url: &str, key: &str, client: Client, timeout: Option<Duration>) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            client,
            session: Arc::new(RwLock::new(None)),
            user,
            timeout,
        }
    }

    fn get_auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    fn publish(&self, handle: Option<IdentityHandle>) {
        self.user.send_if_modified(|current| {
            if *current == handle {
                false
            } else {
                *current = handle;
                true
            }
        });
    }

    /// Get the current token session
    pub fn get_session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Install a token session (e.g. after the OAuth callback) and
    /// publish the user it carries, if any
    pub fn set_session(&self, session: Session) {
        let user = session.user.clone();
        if let Ok(mut current) = self.session.write() {
            *current = Some(session);
        }
        if user.is_some() {
            self.publish(user);
        }
    }

    /// Install the session found in the request's auth cookie
    pub fn set_session_from_cookie(&self, value: &str) -> Result<(), Error> {
        let mut session = Session::from_cookie(value)?;
        if session.user.is_none() {
            session.user = identity_from_access_token(&session.access_token)?;
        }
        self.set_session(session);
        Ok(())
    }

    /// Access token of the current session, unless it has expired
    pub fn access_token(&self) -> Option<String> {
        self.get_session()
            .filter(|s| !s.is_expired())
            .map(|s| s.access_token)
    }

    /// Ask the provider who the session belongs to and publish the answer
    pub async fn refresh_user(&self) -> Result<Option<IdentityHandle>, Error> {
        let Some(token) = self.access_token() else {
            self.publish(None);
            return Ok(None);
        };

        let handle = Fetch::get(&self.client, &self.get_auth_url("/user"))
            .header("apikey", &self.key)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .execute::<IdentityHandle>()
            .await?;

        debug!("identity provider reported user {:?}", handle.id());
        self.publish(Some(handle.clone()));
        Ok(Some(handle))
    }
}

#[async_trait]
impl IdentityProvider for GoTrueProvider {
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
        let mut url = Url::parse(&self.get_auth_url("/authorize"))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to);
        Ok(url)
    }

    async fn sign_out(&self) -> Result<(), Error> {
        if let Some(token) = self.access_token() {
            Fetch::post(&self.client, &self.get_auth_url("/logout"))
                .header("apikey", &self.key)
                .bearer_auth(&token)
                .timeout(self.timeout)
                .execute_checked()
                .await?;
        }

        if let Ok(mut current) = self.session.write() {
            *current = None;
        }
        self.publish(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(uri: &str) -> GoTrueProvider {
        GoTrueProvider::new(uri, "anon", Client::new(), None)
    }

    #[tokio::test]
    async fn test_refresh_user_publishes_handle() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u1",
                "email": "a@x.com",
                "user_metadata": { "full_name": "Lisa" }
            })))
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server.uri());
        let mut rx = provider.subscribe();
        provider.set_session(Session::new("access".to_string(), "refresh".to_string(), 3600));

        let handle = provider.refresh_user().await.unwrap().unwrap();
        assert_eq!(handle.id().unwrap().as_str(), "u1");
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow_and_update().as_ref().and_then(|h| h.id()).map(|id| id.as_str()),
            Some("u1")
        );
    }

    #[tokio::test]
    async fn test_sign_out_clears_user() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/v1/logout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider(&mock_server.uri());
        let mut session = Session::new("access".to_string(), "refresh".to_string(), 3600);
        session.user = Some(Identity::new(UserId::new("u1").unwrap()).into());
        provider.set_session(session);
        assert!(provider.current_user().is_some());

        provider.sign_out().await.unwrap();
        assert!(provider.current_user().is_none());
        assert!(provider.get_session().is_none());
    }

    #[tokio::test]
    async fn test_authorize_url() {
        let provider = provider("https://project.supabase.co");
        let url = provider
            .sign_in_with_provider(OAuthProvider::Google, "https://comeback.app/auth/callback")
            .await
            .unwrap();

        assert_eq!(url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("provider".to_string(), "google".to_string())));
        assert!(pairs.contains(&(
            "redirect_to".to_string(),
            "https://comeback.app/auth/callback".to_string()
        )));
    }
}
