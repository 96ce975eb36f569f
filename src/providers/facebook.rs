//! Facebook Login connector
//!
//! Facebook issues no refresh token: the short-lived code token is traded for
//! a long-lived one, and refreshing means exchanging that again.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use crate::Result;
use crate::auth::{StateFields, Tokens};
use crate::connector::{AuthCallback, AuthInit, Connector, ConnectorCore};
use super::{
    fetch_listing, post_date, require_access_token, FetchOptions, NormalizedPost, PostSource,
    PostType, ProviderKind, TokenResponse,
};

const DEFAULT_SCOPES: &[&str] = &["email", "public_profile", "user_posts"];
const POST_FIELDS: &str = "full_picture,permalink_url,created_time,message";

/// Facebook Graph endpoints
#[derive(Debug, Clone)]
pub struct FacebookEndpoints {
    pub authorize: String,
    pub access_token: String,
    pub posts: String,
}

impl Default for FacebookEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://www.facebook.com/v16.0/dialog/oauth".to_string(),
            access_token: "https://graph.facebook.com/v16.0/oauth/access_token".to_string(),
            posts: "https://graph.facebook.com/v16.0/me/posts".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FacebookPost {
    id: String,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    permalink_url: Option<String>,
    #[serde(default)]
    full_picture: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<FacebookPost> for NormalizedPost {
    fn from(post: FacebookPost) -> Self {
        let kind = if post.full_picture.is_some() {
            PostType::Image
        } else {
            PostType::Text
        };

        Self {
            date: post_date(post.created_time.as_deref()),
            ext_id: post.id,
            photo_url: post.full_picture.unwrap_or_default(),
            kind,
            post_url: post.permalink_url.unwrap_or_default(),
            text: post.message.unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct FacebookConnector {
    core: Arc<ConnectorCore>,
    endpoints: FacebookEndpoints,
}

impl FacebookConnector {
    pub fn new(core: Arc<ConnectorCore>) -> Self {
        Self::with_endpoints(core, FacebookEndpoints::default())
    }

    pub fn with_endpoints(core: Arc<ConnectorCore>, endpoints: FacebookEndpoints) -> Self {
        Self { core, endpoints }
    }

    /// Trade an access token for a long-lived one
    async fn exchange_long_lived(&self, step: &'static str, access_token: &str) -> Result<Tokens> {
        let creds = &self.core.creds;
        let params = [
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("grant_type", "fb_exchange_token"),
            ("fb_exchange_token", access_token),
        ];

        self.core
            .http()
            .get_json::<TokenResponse, _>(step, &self.endpoints.access_token, &params, None)
            .await?
            .into_tokens(step)
    }
}

#[async_trait]
impl Connector for FacebookConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Facebook
    }

    async fn authorize_url(&self, fields: &StateFields) -> Result<AuthInit> {
        let (state, verifier) = self.core.begin(fields).await?;
        let creds = &self.core.creds;
        let scope = self.core.scope_or(DEFAULT_SCOPES, ",");

        let url = self.core.build_url(
            &self.endpoints.authorize,
            &[
                ("client_id", creds.client_id.as_str()),
                ("redirect_uri", creds.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("response_type", "code"),
                ("state", state.as_str()),
            ],
        )?;

        Ok(AuthInit { url, state, verifier })
    }

    async fn auth_tokens(&self, callback: &AuthCallback) -> Result<Tokens> {
        let validated = self.core.check_auth_response(callback).await?;
        let creds = &self.core.creds;

        let step = "short-lived token exchange";
        let short_lived = self
            .core
            .http()
            .get_json::<TokenResponse, _>(
                step,
                &self.endpoints.access_token,
                &[
                    ("client_id", creds.client_id.as_str()),
                    ("client_secret", creds.client_secret.as_str()),
                    ("redirect_uri", creds.redirect_uri.as_str()),
                    ("code", validated.code.as_str()),
                ],
                None,
            )
            .await?
            .into_tokens(step)?;

        let long_lived = self
            .exchange_long_lived("long-lived token exchange", &short_lived.access_token)
            .await?;

        tracing::info!("Facebook authorization completed");
        self.core.finish_tokens(long_lived, &validated.state)
    }

    async fn refresh_auth_tokens(&self, old_tokens: &Tokens) -> Result<Tokens> {
        let access_token = require_access_token(old_tokens)?;
        let creds = &self.core.creds;

        let step = "token refresh";
        let mut tokens = self
            .core
            .http()
            .post_json::<TokenResponse, _>(
                step,
                &self.endpoints.access_token,
                &[
                    ("client_id", creds.client_id.as_str()),
                    ("client_secret", creds.client_secret.as_str()),
                    ("redirect_uri", creds.redirect_uri.as_str()),
                    ("grant_type", "fb_exchange_token"),
                    ("fb_exchange_token", access_token),
                ],
            )
            .await?
            .into_tokens(step)?;

        tokens.refreshed_at = Some(Utc::now());
        Ok(tokens)
    }
}

#[async_trait]
impl PostSource for FacebookConnector {
    async fn fetch_posts(&self, tokens: &Tokens, opts: &FetchOptions) -> Result<Vec<NormalizedPost>> {
        let access_token = require_access_token(tokens)?;

        let mut query = vec![
            ("access_token", access_token),
            ("fields", POST_FIELDS),
            ("limit", "100"),
        ];
        if let Some(since) = opts.since.as_deref() {
            query.push(("since", since));
        }

        let posts: Vec<FacebookPost> = fetch_listing(
            &self.core,
            "facebook posts",
            &self.endpoints.posts,
            &query,
            Some(access_token),
        )
        .await;

        Ok(posts.into_iter().map(NormalizedPost::from).collect())
    }
}
