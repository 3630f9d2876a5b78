//! Typed HTTP client for the VolunteerHub API
//!
//! [`ApiClient`] attaches the stored access token to every request. When
//! a request comes back 401 it joins a single in-flight token refresh and
//! replays the request once with the new token. If the refresh fails,
//! every waiting request fails with [`ClientError::SessionExpired`], the
//! token store is cleared and the failure is reported once.
//!
//! ```ignore
//! use std::sync::Arc;
//! use volunteerhub::client::{ApiClient, FileTokenStore};
//!
//! let client = ApiClient::new(
//!     "http://127.0.0.1:8080/api",
//!     Arc::new(FileTokenStore::open("session.json")),
//! )?;
//! client.auth().login("vera@example.com", "secret123").await?;
//! let events = client.events().list(&Default::default()).await?;
//! ```

mod endpoints;
mod error;
mod store;

#[cfg(test)]
mod tests;

pub use endpoints::{
    AdminApi, AuthApi, EventQuery, EventsApi, NotificationsApi, PostsApi, PushApi,
    RegistrationsApi, UserQuery,
};
pub use error::{ClientError, ErrorCategory, ErrorReporter, TracingReporter};
pub use store::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore};

/// Roles as seen by role-gated views; `Role::allows` checks an allow-list
pub use crate::models::UserRole as Role;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::services::AuthTokens;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a refresh shared by every request waiting on it.
/// The error side carries the reason as text so it can be cloned.
type RefreshFlight = Shared<BoxFuture<'static, Result<String, String>>>;

/// A request that can be dispatched more than once
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
    refresh_on_unauthorized: bool,
}

impl ApiRequest {
    pub(crate) fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            refresh_on_unauthorized: true,
        }
    }

    pub(crate) fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub(crate) fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub(crate) fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub(crate) fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add a query parameter; `None` values are skipped
    pub(crate) fn param(mut self, key: &str, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.query.push((key.to_string(), value.to_string()));
        }
        self
    }

    pub(crate) fn json(mut self, body: &impl Serialize) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Credential exchanges answer 401 for bad input, not for stale tokens
    pub(crate) fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }
}

/// Authenticated client for the `/api` surface
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    reporter: Arc<dyn ErrorReporter>,
    refresh: Mutex<Option<RefreshFlight>>,
}

impl ApiClient {
    /// `base_url` points at the API root, e.g. `http://host:8080/api`
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            reporter: Arc::new(TracingReporter),
            refresh: Mutex::new(None),
        })
    }

    /// Replace the default logging reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Whether a session is stored
    pub fn is_logged_in(&self) -> bool {
        self.tokens.access_token().is_some()
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn events(&self) -> EventsApi<'_> {
        EventsApi::new(self)
    }

    pub fn registrations(&self) -> RegistrationsApi<'_> {
        RegistrationsApi::new(self)
    }

    pub fn posts(&self) -> PostsApi<'_> {
        PostsApi::new(self)
    }

    pub fn notifications(&self) -> NotificationsApi<'_> {
        NotificationsApi::new(self)
    }

    pub fn push(&self) -> PushApi<'_> {
        PushApi::new(self)
    }

    pub fn admin(&self) -> AdminApi<'_> {
        AdminApi::new(self)
    }

    // ========================================================================
    // Request pipeline
    // ========================================================================

    /// Send and decode a JSON response
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ClientError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }

    /// Send, discarding the response body
    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<(), ClientError> {
        self.send(request).await.map(|_| ())
    }

    /// Send and return the raw body
    pub(crate) async fn fetch_bytes(&self, request: ApiRequest) -> Result<Vec<u8>, ClientError> {
        let response = self.send(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub(crate) async fn send(&self, request: ApiRequest) -> Result<reqwest::Response, ClientError> {
        let used = self.tokens.access_token();
        let response = self.dispatch(&request, used.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED || !request.refresh_on_unauthorized {
            return self.check(response).await;
        }

        if self.tokens.refresh_token().is_none() {
            let err = ClientError::from_response(response).await;
            self.reporter.report(ErrorCategory::NotLoggedIn, &err.to_string());
            return Err(err);
        }

        let access_token = self.refreshed_access_token(used.as_deref()).await?;
        let replay = self.dispatch(&request, Some(&access_token)).await?;
        self.check(replay).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(|e| {
            self.reporter
                .report(ErrorCategory::ConnectionFailed, &e.to_string());
            ClientError::Connection(e)
        })
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let err = ClientError::from_response(response).await;
        if let Some(category) = ErrorCategory::for_status(status) {
            self.reporter.report(category, &err.to_string());
        }
        Err(err)
    }

    // ========================================================================
    // Refresh coordination
    // ========================================================================

    /// Join the in-flight refresh, starting one if none is running.
    ///
    /// `rejected` is the access token the server just refused. If the store
    /// already holds a different one, a refresh finished while the request
    /// was in flight and that token is used as is.
    async fn refreshed_access_token(&self, rejected: Option<&str>) -> Result<String, ClientError> {
        let flight = {
            let mut slot = lock(&self.refresh);
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    if let Some(current) = self
                        .tokens
                        .access_token()
                        .filter(|t| Some(t.as_str()) != rejected)
                    {
                        return Ok(current);
                    }
                    let flight = self.start_refresh();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        {
            let mut slot = lock(&self.refresh);
            if slot.as_ref().is_some_and(|current| current.ptr_eq(&flight)) {
                *slot = None;
            }
        }

        outcome.map_err(|_| ClientError::SessionExpired)
    }

    fn start_refresh(&self) -> RefreshFlight {
        let http = self.http.clone();
        let url = format!("{}/auth/refresh", self.base_url);
        let tokens = self.tokens.clone();
        let reporter = self.reporter.clone();

        async move {
            let outcome = rotate_tokens(&http, &url, tokens.as_ref()).await;
            if let Err(reason) = &outcome {
                tracing::info!("Token refresh failed: {}", reason);
                if let Err(e) = tokens.clear() {
                    tracing::warn!("Failed to clear tokens: {}", e);
                }
                reporter.report(ErrorCategory::SessionExpired, reason);
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

async fn rotate_tokens(
    http: &reqwest::Client,
    url: &str,
    tokens: &dyn TokenStore,
) -> Result<String, String> {
    let refresh_token = tokens
        .refresh_token()
        .ok_or_else(|| "No refresh token stored".to_string())?;

    let response = http
        .post(url)
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .map_err(|e| format!("Refresh request failed: {}", e))?;
    if !response.status().is_success() {
        return Err(format!("Refresh rejected with status {}", response.status()));
    }

    let issued: AuthTokens = response
        .json()
        .await
        .map_err(|e| format!("Malformed refresh response: {}", e))?;
    tokens
        .set_tokens(&issued.access_token, &issued.refresh_token)
        .map_err(|e| e.to_string())?;
    Ok(issued.access_token)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
