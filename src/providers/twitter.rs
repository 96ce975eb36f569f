//! Twitter OAuth 2.0 connector
//!
//! The only adapter that sends a PKCE challenge. It uses method `plain`, so
//! the verifier saved with the state is exactly the challenge in the URL.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use crate::Result;
use crate::auth::pkce::{to_base64, CODE_CHALLENGE_METHOD};
use crate::auth::{StateFields, Tokens};
use crate::connector::{AuthCallback, AuthInit, Connector, ConnectorCore};
use crate::error::Error;
use super::{
    fetch_listing, post_date, require_access_token, FetchOptions, NormalizedPost, PostSource,
    PostType, ProviderKind, TokenResponse,
};

const DEFAULT_SCOPES: &[&str] = &["tweet.read", "users.read", "offline.access"];
const TWEET_FIELDS: &str = "lang,author_id,created_at";

#[derive(Debug, Clone)]
pub struct TwitterEndpoints {
    pub authorize: String,
    pub token: String,
    /// Base for `/{user_id}/tweets`
    pub users: String,
}

impl Default for TwitterEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://twitter.com/i/oauth2/authorize".to_string(),
            token: "https://api.twitter.com/2/oauth2/token".to_string(),
            users: "https://api.twitter.com/2/users".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<Tweet> for NormalizedPost {
    fn from(tweet: Tweet) -> Self {
        Self {
            date: post_date(tweet.created_at.as_deref()),
            ext_id: tweet.id,
            photo_url: String::new(),
            kind: PostType::Text,
            post_url: String::new(),
            text: tweet.text,
        }
    }
}

#[derive(Clone)]
pub struct TwitterConnector {
    core: Arc<ConnectorCore>,
    endpoints: TwitterEndpoints,
}

impl TwitterConnector {
    pub fn new(core: Arc<ConnectorCore>) -> Self {
        Self::with_endpoints(core, TwitterEndpoints::default())
    }

    pub fn with_endpoints(core: Arc<ConnectorCore>, endpoints: TwitterEndpoints) -> Self {
        Self { core, endpoints }
    }

    /// `Authorization` header for the confidential-client token endpoint
    fn basic_auth(&self) -> String {
        let creds = &self.core.creds;
        format!("Basic {}", to_base64(&[creds.client_id.as_str(), creds.client_secret.as_str()]))
    }
}

#[async_trait]
impl Connector for TwitterConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twitter
    }

    async fn authorize_url(&self, fields: &StateFields) -> Result<AuthInit> {
        let (state, verifier) = self.core.begin(fields).await?;
        let creds = &self.core.creds;
        let scope = self.core.scope_or(DEFAULT_SCOPES, " ");

        let url = self.core.build_url(
            &self.endpoints.authorize,
            &[
                ("client_id", creds.client_id.as_str()),
                ("redirect_uri", creds.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
                ("code_challenge", verifier.as_str()),
                ("code_challenge_method", CODE_CHALLENGE_METHOD),
                ("state", state.as_str()),
            ],
        )?;

        Ok(AuthInit { url, state, verifier })
    }

    async fn auth_tokens(&self, callback: &AuthCallback) -> Result<Tokens> {
        let validated = self.core.check_auth_response(callback).await?;
        let creds = &self.core.creds;

        let basic = self.basic_auth();
        let step = "token exchange";
        let tokens = self
            .core
            .http()
            .post_form_json::<TokenResponse, _>(
                step,
                &self.endpoints.token,
                &[
                    ("client_id", creds.client_id.as_str()),
                    ("client_secret", creds.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", creds.redirect_uri.as_str()),
                    ("code", validated.code.as_str()),
                    ("code_verifier", validated.verifier.as_str()),
                ],
                Some(basic.as_str()),
            )
            .await?
            .into_tokens(step)?;

        tracing::info!("Twitter authorization completed");
        self.core.finish_tokens(tokens, &validated.state)
    }

    async fn refresh_auth_tokens(&self, old_tokens: &Tokens) -> Result<Tokens> {
        let refresh_token = match old_tokens.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => return Err(Error::MissingCredential("refresh_token")),
        };

        let basic = self.basic_auth();
        let step = "token refresh";
        let mut tokens = self
            .core
            .http()
            .post_form_json::<TokenResponse, _>(
                step,
                &self.endpoints.token,
                &[
                    ("client_id", self.core.creds.client_id.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
                Some(basic.as_str()),
            )
            .await?
            .into_tokens(step)?;

        tokens.refreshed_at = Some(Utc::now());
        Ok(tokens)
    }
}

#[async_trait]
impl PostSource for TwitterConnector {
    async fn fetch_posts(&self, tokens: &Tokens, opts: &FetchOptions) -> Result<Vec<NormalizedPost>> {
        let access_token = require_access_token(tokens)?;
        let user_id = opts
            .user_id
            .as_deref()
            .or(self.core.creds.user_id.as_deref())
            .filter(|id| !id.is_empty())
            .ok_or(Error::MissingCredential("user_id"))?;

        let mut query = vec![("max_results", "100"), ("tweet.fields", TWEET_FIELDS)];
        if let Some(since) = opts.since.as_deref() {
            query.push(("start_time", since));
        }

        let url = format!(
            "{}/{}/tweets",
            self.endpoints.users.trim_end_matches('/'),
            urlencoding::encode(user_id)
        );
        let tweets: Vec<Tweet> =
            fetch_listing(&self.core, "twitter timeline", &url, &query, Some(access_token)).await;

        Ok(tweets.into_iter().map(NormalizedPost::from).collect())
    }
}
