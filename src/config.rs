//! Configuration options for the Comeback client

use std::time::Duration;

/// Whether the process runs as a development build or in production
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    Development,
    #[default]
    Production,
}

impl ExecutionMode {
    /// Parse the value of `COMEBACK_ENV`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => ExecutionMode::Development,
            _ => ExecutionMode::Production,
        }
    }
}

/// Which side of the rendering boundary the code runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Server-side rendering: no local storage, no database lookups in guards
    Server,
    #[default]
    Client,
}

/// Configuration options for the Comeback client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Development or production behavior
    pub mode: ExecutionMode,

    /// Server or client rendering
    pub render: RenderMode,

    /// Bound on the user lookup, applied in development mode only
    pub dev_lookup_timeout: Duration,

    /// Bound on auth initialization in the `auth` guard
    pub auth_init_timeout: Duration,

    /// Bound on auth initialization in the `admin` guard
    pub admin_init_timeout: Duration,

    /// Number of polls for the user profile in the `admin` guard
    pub max_retry_attempts: u32,

    /// Delay between two polls
    pub retry_delay: Duration,

    /// Where unauthenticated navigations are sent
    pub login_path: String,

    /// Where a completed OAuth callback lands
    pub home_path: String,

    /// OAuth redirect target
    pub callback_path: String,

    /// Key of the persisted profile store
    pub storage_key: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// The database schema
    pub db_schema: String,

    /// Table holding application users
    pub users_table: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Production,
            render: RenderMode::Client,
            dev_lookup_timeout: Duration::from_millis(2000),
            auth_init_timeout: Duration::from_millis(2000),
            admin_init_timeout: Duration::from_millis(3000),
            max_retry_attempts: 15,
            retry_delay: Duration::from_millis(100),
            login_path: "/authentification".to_string(),
            home_path: "/".to_string(),
            callback_path: "/auth/callback".to_string(),
            storage_key: "userStore".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            db_schema: "public".to_string(),
            users_table: "users".to_string(),
        }
    }
}

impl ClientOptions {
    /// Default options with the execution mode taken from `COMEBACK_ENV`
    pub fn from_env() -> Self {
        let mode = std::env::var("COMEBACK_ENV")
            .map(|v| ExecutionMode::parse(&v))
            .unwrap_or_default();
        Self::default().with_mode(mode)
    }

    /// Longest time the admin guard polls for the profile
    pub fn max_wait_time(&self) -> Duration {
        self.retry_delay * self.max_retry_attempts
    }

    /// Set the execution mode
    pub fn with_mode(mut self, value: ExecutionMode) -> Self {
        self.mode = value;
        self
    }

    /// Set the render mode
    pub fn with_render(mut self, value: RenderMode) -> Self {
        self.render = value;
        self
    }

    /// Set the development lookup timeout
    pub fn with_dev_lookup_timeout(mut self, value: Duration) -> Self {
        self.dev_lookup_timeout = value;
        self
    }

    /// Set the `auth` guard initialization timeout
    pub fn with_auth_init_timeout(mut self, value: Duration) -> Self {
        self.auth_init_timeout = value;
        self
    }

    /// Set the `admin` guard initialization timeout
    pub fn with_admin_init_timeout(mut self, value: Duration) -> Self {
        self.admin_init_timeout = value;
        self
    }

    /// Set the admin guard polling schedule
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.max_retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Set the login path
    pub fn with_login_path(mut self, value: &str) -> Self {
        self.login_path = value.to_string();
        self
    }

    /// Set the persisted store key
    pub fn with_storage_key(mut self, value: &str) -> Self {
        self.storage_key = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    /// Set the users table
    pub fn with_users_table(mut self, value: &str) -> Self {
        self.users_table = value.to_string();
        self
    }
}
