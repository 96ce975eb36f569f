//! Connector contract and the shared flow core
//!
//! Every provider adapter implements [`Connector`] and holds an
//! `Arc<ConnectorCore>` for the provider-agnostic parts of the flow:
//!
//! ```text
//! Initiated -> CallbackReceived -> Validated -> TokensExchanged
//!                     \________________\______-> Rejected
//! ```
//!
//! [`ConnectorCore::begin`] covers `Initiated`, [`ConnectorCore::check_auth_response`]
//! takes a callback to `Validated` or `Rejected`, and the adapter performs
//! the token exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use crate::Result;
use crate::auth::pkce::{generate_verifier_code, DEFAULT_VERIFIER_SOURCE_LENGTH};
use crate::auth::{
    truncate_state, Credentials, InMemoryStateStore, StateCipher, StateFields, StateStore,
    StateVerifier, Tokens,
};
use crate::config::Config;
use crate::error::{CallbackError, Error};
use crate::http::HttpClient;
use crate::providers::ProviderKind;

/// Result of starting an authorization flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInit {
    pub url: String,
    pub state: String,
    pub verifier: String,
}

/// Parameters the provider redirected back with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCallback {
    pub code: String,

    /// State echoed by the provider
    pub given_state: String,

    /// Caller override for the stored state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_state: Option<String>,

    /// Caller override for the stored verifier; with `saved_state` set too,
    /// the store is not consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}

impl AuthCallback {
    pub fn new(code: impl Into<String>, given_state: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            given_state: given_state.into(),
            ..Self::default()
        }
    }

    /// Parse `code` and `state` from the redirect URL's query string
    ///
    /// A provider-reported `error` parameter rejects the callback with
    /// [`CallbackError::ProviderDenied`], carrying `error_description` when
    /// the provider sent one.
    pub fn from_redirect_url(redirect: &str) -> Result<Self> {
        let url = Url::parse(redirect)?;

        let mut callback = Self::default();
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => callback.code = value.into_owned(),
                "state" => callback.given_state = value.into_owned(),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error {
            tracing::warn!(error = %err, "Provider reported an authorization error");
            let reason = match description.filter(|d| !d.is_empty()) {
                Some(description) => format!("{}: {}", err, description),
                None => err,
            };
            return Err(CallbackError::ProviderDenied(reason).into());
        }

        Ok(callback)
    }
}

/// A callback that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCallback {
    pub state: String,
    pub verifier: String,
    pub code: String,
}

/// Capability contract implemented by every provider adapter
#[async_trait]
pub trait Connector: Send + Sync {
    /// Which provider this connector talks to
    fn kind(&self) -> ProviderKind;

    /// Build the provider authorize URL, sealing `fields` into the state
    async fn authorize_url(&self, fields: &StateFields) -> Result<AuthInit>;

    /// Validate the callback and exchange its code for tokens
    async fn auth_tokens(&self, callback: &AuthCallback) -> Result<Tokens>;

    /// Trade previously issued tokens for fresh ones
    async fn refresh_auth_tokens(&self, old_tokens: &Tokens) -> Result<Tokens>;
}

/// Shared state, cipher, storage and HTTP plumbing for adapters
pub struct ConnectorCore {
    pub creds: Credentials,
    pub scope: Option<Vec<String>>,
    cipher: Arc<StateCipher>,
    store: Arc<dyn StateStore>,
    http: HttpClient,
}

impl ConnectorCore {
    pub fn new(
        creds: Credentials,
        cipher: Arc<StateCipher>,
        store: Arc<dyn StateStore>,
        http: HttpClient,
    ) -> Self {
        Self {
            creds,
            scope: None,
            cipher,
            store,
            http,
        }
    }

    /// Build a core with the default in-memory store
    pub fn from_config(creds: Credentials, config: &Config) -> Result<Self> {
        if creds.client_id.is_empty() || creds.redirect_uri.is_empty() {
            return Err(Error::Config(
                "client_id and redirect_uri are required".to_string(),
            ));
        }

        Ok(Self::new(
            creds,
            Arc::new(StateCipher::new(&config.state_cipher)?),
            Arc::new(InMemoryStateStore::new(&config.store)),
            HttpClient::new(&config.http)?,
        ))
    }

    pub fn with_scope(mut self, scope: Vec<String>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn cipher(&self) -> &StateCipher {
        &self.cipher
    }

    /// Configured scope, or the provider default, joined with `separator`
    pub fn scope_or(&self, defaults: &[&str], separator: &str) -> String {
        match &self.scope {
            Some(scope) => scope.join(separator),
            None => defaults.join(separator),
        }
    }

    /// Append URL-encoded query parameters to `base`
    pub fn build_url(&self, base: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(base)?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url.to_string())
    }

    /// Seal `fields`, generate a verifier and persist the pair
    ///
    /// Returns `(state, verifier)` for the adapter to place in its URL.
    pub async fn begin(&self, fields: &StateFields) -> Result<(String, String)> {
        let state = self.cipher.cipher_state(fields)?;
        let verifier = generate_verifier_code(DEFAULT_VERIFIER_SOURCE_LENGTH);

        self.store
            .save_state(StateVerifier::new(state.clone(), Some(verifier.clone())))
            .await?;

        tracing::debug!(state = %truncate_state(&state), "Issued authorization state");
        Ok((state, verifier))
    }

    /// Validate a callback against the stored state and verifier
    ///
    /// Checks, in order: a code is present, a verifier is known, and the
    /// echoed state matches the saved one. The stored record is removed on
    /// success so the same state cannot validate twice.
    pub async fn check_auth_response(&self, callback: &AuthCallback) -> Result<ValidatedCallback> {
        let result = self.validate(callback).await;

        match &result {
            Ok(_) => {
                self.store.remove_state(&callback.given_state).await?;
            }
            Err(err) => {
                tracing::warn!(
                    state = %truncate_state(&callback.given_state),
                    reason = %err,
                    "Rejected authorization callback"
                );
            }
        }

        result
    }

    async fn validate(&self, callback: &AuthCallback) -> Result<ValidatedCallback> {
        let record = match (&callback.saved_state, &callback.verifier) {
            (Some(state), Some(verifier)) => StateVerifier::new(state.clone(), Some(verifier.clone())),
            (saved_state, verifier_override) => {
                let stored = self
                    .store
                    .get_state(&callback.given_state)
                    .await
                    .map_err(|err| match err {
                        Error::StateNotFound(_) => Error::Callback(CallbackError::UnknownState),
                        other => other,
                    })?;
                StateVerifier::new(
                    saved_state.clone().unwrap_or(stored.state),
                    verifier_override.clone().or(stored.verifier),
                )
            }
        };

        if callback.code.is_empty() {
            return Err(CallbackError::MissingCode.into());
        }

        let verifier = match record.verifier {
            Some(v) if !v.is_empty() => v,
            _ => return Err(CallbackError::MissingVerifier.into()),
        };

        if callback.given_state != record.state {
            return Err(CallbackError::StateMismatch.into());
        }

        Ok(ValidatedCallback {
            state: record.state,
            verifier,
            code: callback.code.clone(),
        })
    }

    /// Decode the caller context sealed into a state token
    pub fn decipher_state(&self, state: &str) -> Result<StateFields> {
        self.cipher.decipher_state(state)
    }

    /// Attach credential-derived fields and the decoded context
    pub fn finish_tokens(&self, mut tokens: Tokens, state: &str) -> Result<Tokens> {
        tokens.user_id = self.creds.user_id.clone();
        tokens.context = self.decipher_state(state)?;
        Ok(tokens)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::HttpConfig;

    pub fn test_cipher() -> Arc<StateCipher> {
        Arc::new(StateCipher::from_bytes(
            *b"0123456789abcdef0123456789abcdef",
            *b"abcdefghijklmnop",
        ))
    }

    pub fn test_core(store: Arc<dyn StateStore>) -> ConnectorCore {
        ConnectorCore::new(
            Credentials::new("client-id", "client-secret", "https://app.example/callback"),
            test_cipher(),
            store,
            HttpClient::new(&HttpConfig::default()).unwrap(),
        )
    }

    pub fn fields(pairs: &[(&str, &str)]) -> StateFields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    async fn core_with_record(state: &str, verifier: &str) -> (ConnectorCore, Arc<InMemoryStateStore>) {
        let store = Arc::new(InMemoryStateStore::default());
        store
            .save_state(StateVerifier::new(state, Some(verifier.to_string())))
            .await
            .unwrap();
        (test_core(store.clone()), store)
    }

    #[tokio::test]
    async fn test_valid_callback() {
        let (core, _) = core_with_record("S", "V").await;

        let validated = core.check_auth_response(&AuthCallback::new("c", "S")).await.unwrap();
        assert_eq!(
            validated,
            ValidatedCallback {
                state: "S".to_string(),
                verifier: "V".to_string(),
                code: "c".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_state() {
        let (core, _) = core_with_record("S", "V").await;

        let err = core.check_auth_response(&AuthCallback::new("c", "X")).await.unwrap_err();
        assert!(matches!(err, Error::Callback(CallbackError::UnknownState)));
        assert!(err.requires_new_flow());
    }

    #[tokio::test]
    async fn test_missing_code() {
        let (core, _) = core_with_record("S", "V").await;

        let err = core.check_auth_response(&AuthCallback::new("", "S")).await.unwrap_err();
        assert!(matches!(err, Error::Callback(CallbackError::MissingCode)));
    }

    #[tokio::test]
    async fn test_missing_verifier() {
        let store = Arc::new(InMemoryStateStore::default());
        store.save_state(StateVerifier::new("S", None)).await.unwrap();
        let core = test_core(store);

        let err = core.check_auth_response(&AuthCallback::new("c", "S")).await.unwrap_err();
        assert!(matches!(err, Error::Callback(CallbackError::MissingVerifier)));
    }

    #[tokio::test]
    async fn test_state_mismatch_with_saved_state_override() {
        let (core, _) = core_with_record("S", "V").await;
        let callback = AuthCallback {
            saved_state: Some("OTHER".to_string()),
            ..AuthCallback::new("c", "S")
        };

        let err = core.check_auth_response(&callback).await.unwrap_err();
        assert!(matches!(err, Error::Callback(CallbackError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_full_override_skips_store() {
        let core = test_core(Arc::new(InMemoryStateStore::default()));
        let callback = AuthCallback {
            saved_state: Some("S".to_string()),
            verifier: Some("V".to_string()),
            ..AuthCallback::new("c", "S")
        };

        let validated = core.check_auth_response(&callback).await.unwrap();
        assert_eq!(validated.verifier, "V");
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let (core, store) = core_with_record("S", "V").await;

        core.check_auth_response(&AuthCallback::new("c", "S")).await.unwrap();
        assert!(store.get_state("S").await.is_err());

        let err = core.check_auth_response(&AuthCallback::new("c", "S")).await.unwrap_err();
        assert!(matches!(err, Error::Callback(CallbackError::UnknownState)));
    }

    #[tokio::test]
    async fn test_rejected_callback_keeps_record() {
        let (core, store) = core_with_record("S", "V").await;

        assert!(core.check_auth_response(&AuthCallback::new("", "S")).await.is_err());
        assert!(store.get_state("S").await.is_ok());
    }

    #[tokio::test]
    async fn test_begin_persists_state_and_verifier() {
        let store = Arc::new(InMemoryStateStore::default());
        let core = test_core(store.clone());

        let (state, verifier) = core.begin(&fields(&[("foo", "bar")])).await.unwrap();

        let record = store.get_state(&state).await.unwrap();
        assert_eq!(record.verifier.as_deref(), Some(verifier.as_str()));
        assert_eq!(core.decipher_state(&state).unwrap(), fields(&[("foo", "bar")]));
    }

    #[test]
    fn test_build_url_encodes_params() {
        let core = test_core(Arc::new(InMemoryStateStore::default()));

        let url = core
            .build_url("https://example.com/auth", &[("scope", "a b"), ("redirect_uri", "https://x/y?z=1")])
            .unwrap();
        assert_eq!(
            url,
            "https://example.com/auth?scope=a+b&redirect_uri=https%3A%2F%2Fx%2Fy%3Fz%3D1"
        );
        assert_eq!(core.build_url("https://example.com/auth", &[]).unwrap(), "https://example.com/auth");
    }

    #[test]
    fn test_scope_defaults_and_override() {
        let core = test_core(Arc::new(InMemoryStateStore::default()));
        assert_eq!(core.scope_or(&["a", "b"], ","), "a,b");

        let core = core.with_scope(vec!["x".to_string(), "y".to_string()]);
        assert_eq!(core.scope_or(&["a", "b"], " "), "x y");
    }

    #[test]
    fn test_callback_from_redirect_url() {
        let callback = AuthCallback::from_redirect_url("https://app.example/callback?code=abc&state=0f1e").unwrap();
        assert_eq!(callback, AuthCallback::new("abc", "0f1e"));

        let err = AuthCallback::from_redirect_url("https://app.example/callback?error=access_denied").unwrap_err();
        assert!(matches!(
            &err,
            Error::Callback(CallbackError::ProviderDenied(reason)) if reason == "access_denied"
        ));
        assert!(err.requires_new_flow());
    }

    #[test]
    fn test_callback_error_keeps_provider_description() {
        let err = AuthCallback::from_redirect_url(
            "https://app.example/callback?error=access_denied&error_description=User+denied+access&state=0f1e",
        )
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Callback rejected: provider denied authorization: access_denied: User denied access"
        );
    }

    #[test]
    fn test_from_config_requires_client_id() {
        let creds = Credentials::new("", "secret", "https://app.example/cb");
        let result = ConnectorCore::from_config(creds, &Config::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
