//! HTTP collaborator for token endpoints and feeds
//!
//! Every call resolves to one of three outcomes: the request never completed
//! ([`Error::Transport`]), the endpoint answered with a non-success status, or
//! it answered successfully with a body that does not parse. The last two
//! surface as [`Error::ExchangeFailed`].

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::Result;
use crate::config::HttpConfig;
use crate::error::Error;

/// Longest error body kept in [`crate::error::ExchangeFailure::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Thin JSON client over `reqwest`
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let inner = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { inner })
    }

    /// Wrap an existing `reqwest` client
    pub fn from_client(inner: Client) -> Self {
        Self { inner }
    }

    /// GET `url` with query parameters
    pub async fn get_json<T, Q>(&self, step: &'static str, url: &str, query: &Q, bearer: Option<&str>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self.inner.get(url).query(query).header("Accept", "application/json");
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        self.send(step, request).await
    }

    /// POST `url` with query parameters and an empty body
    pub async fn post_json<T, Q>(&self, step: &'static str, url: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.send(step, self.inner.post(url).query(query)).await
    }

    /// POST an `application/x-www-form-urlencoded` body
    ///
    /// `authorization` is sent verbatim as the `Authorization` header.
    pub async fn post_form_json<T, F>(
        &self,
        step: &'static str,
        url: &str,
        form: &F,
        authorization: Option<&str>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        F: Serialize + ?Sized,
    {
        let mut request = self.inner.post(url).form(form);
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }
        self.send(step, request).await
    }

    /// POST a `multipart/form-data` body built from text fields
    pub async fn post_multipart_json<T>(&self, step: &'static str, url: &str, fields: &[(&str, &str)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let form = fields
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name.to_string(), value.to_string())
            });
        self.send(step, self.inner.post(url).multipart(form)).await
    }

    async fn send<T: DeserializeOwned>(&self, step: &'static str, request: RequestBuilder) -> Result<T> {
        let response = request
            .send()
            .await
            .map_err(|source| Error::Transport { step, source })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| Error::Transport { step, source })?;

        if !status.is_success() {
            tracing::debug!(step, status = status.as_u16(), "Endpoint returned an error status");
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(Error::exchange_status(step, status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| Error::exchange_body(step, e.to_string()))
    }
}
