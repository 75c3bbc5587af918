//! Database operations through the PostgREST API

mod filter;
mod query;
mod types;

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub use filter::*;
pub use query::*;
pub use types::*;

/// Client for database operations on one table or view
#[derive(Debug, Clone)]
pub struct PostgrestClient {
    /// The base URL for the Supabase project
    url: String,

    /// The table or view name
    table: String,

    endpoint: Endpoint,
}

impl PostgrestClient {
    /// Create a new PostgrestClient
    pub fn new(url: &str, key: &str, table: &str, client: Client) -> Self {
        let url = url.trim_end_matches('/').to_string();
        Self {
            endpoint: Endpoint {
                url: format!("{}/rest/v1/{}", url, table),
                key: key.to_string(),
                client,
                token: None,
                timeout: None,
                schema: None,
            },
            url,
            table: table.to_string(),
        }
    }

    /// The table this client targets
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Send requests on behalf of a signed-in user
    pub fn with_auth(mut self, token: &str) -> Self {
        self.endpoint.token = Some(token.to_string());
        self
    }

    /// Bound every request issued by this client
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.endpoint.timeout = timeout;
        self
    }

    /// Target a schema other than the default one
    pub fn with_schema(mut self, schema: &str) -> Self {
        self.endpoint.schema = Some(schema.to_string());
        self
    }

    /// Select specific columns from the table
    pub fn select(&self, columns: &str) -> SelectBuilder {
        SelectBuilder::new(self.endpoint.clone(), columns)
    }

    /// Insert data into the table
    pub fn insert<T: Serialize>(&self, values: T) -> InsertBuilder<T> {
        InsertBuilder::new(self.endpoint.clone(), values)
    }

    /// Update data in the table
    pub fn update<T: Serialize>(&self, values: T) -> UpdateBuilder<T> {
        UpdateBuilder::new(self.endpoint.clone(), values)
    }

    /// Delete rows from the table
    pub fn delete(&self) -> DeleteBuilder {
        DeleteBuilder::new(self.endpoint.clone())
    }

    /// Call a stored procedure or function
    pub fn rpc<T: Serialize>(&self, function: &str, params: T) -> RpcBuilder<T> {
        let endpoint = Endpoint {
            url: format!("{}/rest/v1/rpc/{}", self.url, function),
            ..self.endpoint.clone()
        };
        RpcBuilder::new(endpoint, params)
    }
}
