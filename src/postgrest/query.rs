//! Query builders for PostgrestClient

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::fetch::{Fetch, FetchBuilder};
use crate::postgrest::filter::*;
use crate::postgrest::types::*;

/// Everything a request against one PostgREST endpoint needs
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub(crate) url: String,
    pub(crate) key: String,
    pub(crate) client: Client,
    pub(crate) token: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) schema: Option<String>,
}

impl Endpoint {
    fn prepare<'a>(&self, fetch: FetchBuilder<'a>) -> FetchBuilder<'a> {
        let token = self.token.as_deref().unwrap_or(&self.key);
        let fetch = fetch
            .header("apikey", &self.key)
            .bearer_auth(token)
            .timeout(self.timeout);
        match &self.schema {
            Some(schema) => fetch
                .header("accept-profile", schema)
                .header("content-profile", schema),
            None => fetch,
        }
    }
}

/// Ordered query parameters
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    params: Vec<(String, String)>,
}

impl QueryBuilder {
    /// Create a new QueryBuilder
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter, replacing an earlier one with the same key
    pub fn set_param(&mut self, key: &str, value: &str) {
        self.params.retain(|(k, _)| k != key);
        self.params.push((key.to_string(), value.to_string()));
    }

    /// Add a filter; the same column may be filtered more than once
    pub fn add_filter(&mut self, column: &str, operator: FilterOperator, value: &str) {
        self.params.push((column.to_string(), operator.apply(value)));
    }

    /// Get the query parameters
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

macro_rules! filter_methods {
    () => {
        /// Filter rows with an arbitrary operator
        pub fn filter<V: ToString>(mut self, column: &str, operator: FilterOperator, value: V) -> Self {
            self.query.add_filter(column, operator, &value.to_string());
            self
        }

        /// Filter rows where column equals a value
        pub fn eq<V: ToString>(self, column: &str, value: V) -> Self {
            self.filter(column, FilterOperator::Eq, value)
        }

        /// Filter rows where column does not equal a value
        pub fn neq<V: ToString>(self, column: &str, value: V) -> Self {
            self.filter(column, FilterOperator::Neq, value)
        }

        /// Filter rows where column is greater than a value
        pub fn gt<V: ToString>(self, column: &str, value: V) -> Self {
            self.filter(column, FilterOperator::Gt, value)
        }

        /// Filter rows where column is greater than or equal to a value
        pub fn gte<V: ToString>(self, column: &str, value: V) -> Self {
            self.filter(column, FilterOperator::Gte, value)
        }

        /// Filter rows where column is less than a value
        pub fn lt<V: ToString>(self, column: &str, value: V) -> Self {
            self.filter(column, FilterOperator::Lt, value)
        }

        /// Filter rows where column is less than or equal to a value
        pub fn lte<V: ToString>(self, column: &str, value: V) -> Self {
            self.filter(column, FilterOperator::Lte, value)
        }

        /// Filter rows where column matches a pattern (case sensitive)
        pub fn like(self, column: &str, pattern: &str) -> Self {
            self.filter(column, FilterOperator::Like, pattern)
        }

        /// Filter rows where column matches a pattern (case insensitive)
        pub fn ilike(self, column: &str, pattern: &str) -> Self {
            self.filter(column, FilterOperator::ILike, pattern)
        }

        /// Filter rows where column is null, true or false
        pub fn is(self, column: &str, value: IsValue) -> Self {
            self.filter(column, FilterOperator::Is, value.as_str())
        }

        /// Filter rows where column is in a list of values
        pub fn in_list<V: ToString>(self, column: &str, values: &[V]) -> Self {
            let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            self.filter(column, FilterOperator::In, values.join(","))
        }
    };
}

/// Builder for SELECT queries
pub struct SelectBuilder {
    endpoint: Endpoint,
    query: QueryBuilder,
}

impl SelectBuilder {
    /// Create a new SelectBuilder
    pub fn new(endpoint: Endpoint, columns: &str) -> Self {
        let mut query = QueryBuilder::new();
        query.set_param("select", columns);
        Self { endpoint, query }
    }

    filter_methods!();

    /// Limit the number of rows returned
    pub fn limit(mut self, count: u32) -> Self {
        self.query.set_param("limit", &count.to_string());
        self
    }

    /// Skip a number of rows
    pub fn offset(mut self, count: u32) -> Self {
        self.query.set_param("offset", &count.to_string());
        self
    }

    /// Order the results by a column
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.query
            .set_param("order", &format!("{}.{}", column, order.as_str()));
        self
    }

    /// Execute the query and return the results
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<Vec<T>, Error> {
        let fetch = Fetch::get(&self.endpoint.client, &self.endpoint.url)
            .query(self.query.params());
        self.endpoint.prepare(fetch).execute::<Vec<T>>().await
    }

    /// Execute the query and return exactly one row.
    ///
    /// No matching row is reported by PostgREST as `PGRST116`, which
    /// `Error::is_not_found` recognizes.
    pub async fn single<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let fetch = Fetch::get(&self.endpoint.client, &self.endpoint.url)
            .header("accept", SINGLE_OBJECT)
            .query(self.query.params());
        self.endpoint.prepare(fetch).execute::<T>().await
    }

    /// Execute the query and return the first row, if any
    pub async fn maybe_single<T: DeserializeOwned>(self) -> Result<Option<T>, Error> {
        let rows = self.limit(1).execute::<T>().await?;
        Ok(rows.into_iter().next())
    }
}

/// Builder for INSERT queries
pub struct InsertBuilder<T: Serialize> {
    endpoint: Endpoint,
    values: T,
}

impl<T: Serialize> InsertBuilder<T> {
    /// Create a new InsertBuilder
    pub fn new(endpoint: Endpoint, values: T) -> Self {
        Self { endpoint, values }
    }

    /// Execute the insert and return the inserted rows
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        let fetch = Fetch::post(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Representation.prefer())
            .json(&self.values)?;
        self.endpoint.prepare(fetch).execute::<Vec<R>>().await
    }

    /// Execute the insert and return the single inserted row
    pub async fn single<R: DeserializeOwned>(&self) -> Result<R, Error> {
        let fetch = Fetch::post(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Representation.prefer())
            .header("accept", SINGLE_OBJECT)
            .json(&self.values)?;
        self.endpoint.prepare(fetch).execute::<R>().await
    }

    /// Execute the insert without reading the inserted data
    pub async fn execute_no_return(&self) -> Result<(), Error> {
        let fetch = Fetch::post(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Minimal.prefer())
            .json(&self.values)?;
        self.endpoint.prepare(fetch).execute_checked().await?;
        Ok(())
    }
}

/// Builder for UPDATE queries
pub struct UpdateBuilder<T: Serialize> {
    endpoint: Endpoint,
    values: T,
    query: QueryBuilder,
}

impl<T: Serialize> UpdateBuilder<T> {
    /// Create a new UpdateBuilder
    pub fn new(endpoint: Endpoint, values: T) -> Self {
        Self {
            endpoint,
            values,
            query: QueryBuilder::new(),
        }
    }

    filter_methods!();

    /// Execute the update and return the updated rows
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        let fetch = Fetch::patch(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Representation.prefer())
            .query(self.query.params())
            .json(&self.values)?;
        self.endpoint.prepare(fetch).execute::<Vec<R>>().await
    }

    /// Execute the update and return the single updated row
    pub async fn single<R: DeserializeOwned>(&self) -> Result<R, Error> {
        let fetch = Fetch::patch(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Representation.prefer())
            .header("accept", SINGLE_OBJECT)
            .query(self.query.params())
            .json(&self.values)?;
        self.endpoint.prepare(fetch).execute::<R>().await
    }
}

/// Builder for DELETE queries.
///
/// PostgREST refuses a delete without any filter, so build one with at
/// least an `eq` on the key.
pub struct DeleteBuilder {
    endpoint: Endpoint,
    query: QueryBuilder,
}

impl DeleteBuilder {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            query: QueryBuilder::new(),
        }
    }

    filter_methods!();

    /// Delete the matching rows and return them
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<Vec<R>, Error> {
        let fetch = Fetch::delete(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Representation.prefer())
            .query(self.query.params());
        self.endpoint.prepare(fetch).execute::<Vec<R>>().await
    }

    /// Delete the matching rows without reading them back
    pub async fn execute_no_return(&self) -> Result<(), Error> {
        let fetch = Fetch::delete(&self.endpoint.client, &self.endpoint.url)
            .header("prefer", ReturnOption::Minimal.prefer())
            .query(self.query.params());
        self.endpoint.prepare(fetch).execute_checked().await?;
        Ok(())
    }
}

/// Builder for RPC (stored procedure) calls
pub struct RpcBuilder<T: Serialize> {
    endpoint: Endpoint,
    params: T,
}

impl<T: Serialize> RpcBuilder<T> {
    /// Create a new RpcBuilder
    pub fn new(endpoint: Endpoint, params: T) -> Self {
        Self { endpoint, params }
    }

    /// Execute the RPC call and return the results
    pub async fn execute<R: DeserializeOwned>(&self) -> Result<R, Error> {
        let fetch = Fetch::post(&self.endpoint.client, &self.endpoint.url).json(&self.params)?;
        self.endpoint.prepare(fetch).execute::<R>().await
    }
}
