//! REST API Client
//!
//! Thin JSON client for the dashboard's resource endpoints. Failed
//! responses carry `{"messages": [...]}`; every error converts to a list of
//! user-displayable messages so widgets can show it next to their last data.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::application::ports::RefreshSource;
use crate::domain::refresh::RefreshError;
use crate::domain::table::TableKind;
use crate::infrastructure::config::ApiSettings;

// =============================================================================
// Resources
// =============================================================================

/// REST resources consumed by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Listed symbols.
    Symbols,
    /// Reported orders.
    Orders,
    /// Best bid and offer quotes.
    Bbo,
    /// Last-sale reports.
    LastSale,
    /// Member firms.
    Firms,
    /// Firm bank accounts.
    BankAccounts,
    /// Fee schedules.
    Fees,
    /// Market data feed providers.
    DataFeedProviders,
}

impl Resource {
    /// Collection path relative to the API base URL.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Symbols => "/symbols",
            Self::Orders => "/orders",
            Self::Bbo => "/bbo",
            Self::LastSale => "/last-sale",
            Self::Firms => "/firms",
            Self::BankAccounts => "/bank-accounts",
            Self::Fees => "/fees",
            Self::DataFeedProviders => "/data-feed-providers",
        }
    }

    /// Table showing this resource, if any.
    #[must_use]
    pub const fn table_kind(&self) -> Option<TableKind> {
        match self {
            Self::Symbols => Some(TableKind::Symbols),
            Self::Orders => Some(TableKind::Orders),
            Self::Bbo => Some(TableKind::Bbo),
            Self::LastSale => Some(TableKind::LastSale),
            Self::Firms => Some(TableKind::Firms),
            Self::BankAccounts => Some(TableKind::BankAccounts),
            Self::Fees => Some(TableKind::Fees),
            Self::DataFeedProviders => None,
        }
    }
}

impl From<TableKind> for Resource {
    fn from(kind: TableKind) -> Self {
        match kind {
            TableKind::Symbols => Self::Symbols,
            TableKind::Orders => Self::Orders,
            TableKind::Bbo => Self::Bbo,
            TableKind::LastSale => Self::LastSale,
            TableKind::Firms => Self::Firms,
            TableKind::BankAccounts => Self::BankAccounts,
            TableKind::Fees => Self::Fees,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path().trim_start_matches('/'))
    }
}

// =============================================================================
// Errors
// =============================================================================

/// REST client errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be sent or the response not read.
    #[error("network error: {0}")]
    Network(String),

    /// Server answered with a non-success status.
    #[error("API error ({status}): {}", .messages.join("; "))]
    Api {
        /// HTTP status code.
        status: u16,
        /// Messages returned by the server.
        messages: Vec<String>,
    },

    /// Response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Client could not be built.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Messages suitable for display.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        match self {
            Self::Api { messages, .. } if !messages.is_empty() => messages.clone(),
            other => vec![other.to_string()],
        }
    }

    /// HTTP status, for API errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}

impl From<ApiError> for RefreshError {
    fn from(e: ApiError) -> Self {
        Self::new(e.messages())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    messages: Vec<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// JSON client for the resource endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is empty or the HTTP client cannot
    /// be built.
    pub fn new(settings: &ApiSettings) -> Result<Self, ApiError> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::InvalidConfig("base URL is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ApiError::InvalidConfig(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List a collection.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unexpected body.
    pub async fn list<T: DeserializeOwned>(&self, resource: Resource) -> Result<Vec<T>, ApiError> {
        self.list_with_query(resource, &[] as &[(&str, &str)]).await
    }

    /// List a collection with query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unexpected body.
    pub async fn list_with_query<T, Q>(&self, resource: Resource, query: &Q) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized + Sync,
    {
        let request = self.client.get(self.collection_url(resource)).query(query);
        let body: Option<ListBody<T>> = self.send(request).await?;
        Ok(body.map(ListBody::into_vec).unwrap_or_default())
    }

    /// Fetch one item.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unexpected body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        resource: Resource,
        id: impl fmt::Display + Send,
    ) -> Result<T, ApiError> {
        let request = self.client.get(self.item_url(resource, &id));
        self.send(request).await
    }

    /// Create an item.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unexpected body.
    pub async fn create<T, B>(&self, resource: Resource, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let request = self.client.post(self.collection_url(resource)).json(body);
        self.send(request).await
    }

    /// Replace an item.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unexpected body.
    pub async fn update<T, B>(
        &self,
        resource: Resource,
        id: impl fmt::Display + Send,
        body: &B,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized + Sync,
    {
        let request = self.client.put(self.item_url(resource, &id)).json(body);
        self.send(request).await
    }

    /// Delete an item.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or non-success status.
    pub async fn delete(&self, resource: Resource, id: impl fmt::Display + Send) -> Result<(), ApiError> {
        let request = self.client.delete(self.item_url(resource, &id));
        let _: serde_json::Value = self.send(request).await?;
        Ok(())
    }

    fn collection_url(&self, resource: Resource) -> String {
        format!("{}{}", self.base_url, resource.path())
    }

    fn item_url(&self, resource: Resource, id: &impl fmt::Display) -> String {
        format!("{}{}/{id}", self.base_url, resource.path())
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            let text = if text.trim().is_empty() { "null" } else { text.as_str() };
            return serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()));
        }

        let messages = error_messages(status, &text);
        tracing::debug!(status = status.as_u16(), ?messages, "API request failed");
        Err(ApiError::Api {
            status: status.as_u16(),
            messages,
        })
    }
}

fn error_messages(status: StatusCode, body: &str) -> Vec<String> {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();

    let mut messages = parsed.messages;
    if let Some(message) = parsed.message {
        messages.push(message);
    }
    messages.retain(|m| !m.trim().is_empty());

    if messages.is_empty() {
        let reason = status.canonical_reason().unwrap_or("request failed");
        messages.push(format!("{} {reason}", status.as_u16()));
    }
    messages
}

// =============================================================================
// Refresh Source Adapter
// =============================================================================

/// A list endpoint used as a widget's refresh source.
pub struct ResourceSource<T> {
    client: ApiClient,
    resource: Resource,
    query: Vec<(String, String)>,
    _item: PhantomData<fn() -> T>,
}

impl<T> ResourceSource<T> {
    /// Source listing `resource`.
    #[must_use]
    pub const fn new(client: ApiClient, resource: Resource) -> Self {
        Self {
            client,
            resource,
            query: Vec::new(),
            _item: PhantomData,
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Listed resource.
    #[must_use]
    pub const fn resource(&self) -> Resource {
        self.resource
    }
}

impl<T> fmt::Debug for ResourceSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSource")
            .field("resource", &self.resource)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T> RefreshSource for ResourceSource<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    type Snapshot = Vec<T>;

    async fn fetch(&self) -> Result<Vec<T>, RefreshError> {
        Ok(self
            .client
            .list_with_query(self.resource, self.query.as_slice())
            .await?)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_paths() {
        assert_eq!(Resource::LastSale.path(), "/last-sale");
        assert_eq!(Resource::BankAccounts.to_string(), "bank-accounts");
        assert_eq!(Resource::Fees.table_kind(), Some(TableKind::Fees));
        assert_eq!(Resource::DataFeedProviders.table_kind(), None);
        assert_eq!(Resource::from(TableKind::LastSale), Resource::LastSale);
    }

    #[test]
    fn error_messages_from_body() {
        let messages = error_messages(
            StatusCode::BAD_REQUEST,
            r#"{"messages": ["symbol is required", " "]}"#,
        );
        assert_eq!(messages, vec!["symbol is required".to_string()]);
    }

    #[test]
    fn error_messages_fallback_to_status() {
        let messages = error_messages(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(messages, vec!["502 Bad Gateway".to_string()]);
    }

    #[test]
    fn api_error_converts_to_refresh_error() {
        let err = ApiError::Api {
            status: 422,
            messages: vec!["lot size must be positive".to_string()],
        };
        assert_eq!(err.status(), Some(422));

        let refresh: RefreshError = err.into();
        assert_eq!(refresh.messages, vec!["lot size must be positive".to_string()]);

        let refresh: RefreshError = ApiError::Network("connection refused".to_string()).into();
        assert_eq!(
            refresh.messages,
            vec!["network error: connection refused".to_string()]
        );
    }

    #[test]
    fn empty_base_url_rejected() {
        let settings = ApiSettings {
            base_url: "/".to_string(),
            request_timeout: std::time::Duration::from_secs(1),
        };
        assert!(matches!(
            ApiClient::new(&settings),
            Err(ApiError::InvalidConfig(_))
        ));
    }
}
