//! Instagram Basic Display connector

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

const DEFAULT_SCOPES: &[&str] = &["user_profile", "user_media"];
const MEDIA_FIELDS: &str = "media_type,permalink,media_url,caption,timestamp";

#[derive(Debug, Clone)]
pub struct InstagramEndpoints {
    pub authorize: String,
    /// Code exchange for a short-lived token
    pub access_token: String,
    /// Short-lived to long-lived exchange
    pub long_lived_token: String,
    pub refresh_token: String,
    pub media: String,
}

impl Default for InstagramEndpoints {
    fn default() -> Self {
        Self {
            authorize: "https://api.instagram.com/oauth/authorize".to_string(),
            access_token: "https://api.instagram.com/oauth/access_token".to_string(),
            long_lived_token: "https://graph.instagram.com/access_token".to_string(),
            refresh_token: "https://graph.instagram.com/refresh_access_token".to_string(),
            media: "https://graph.instagram.com/me/media".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstagramMedia {
    id: String,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    media_url: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

impl From<InstagramMedia> for NormalizedPost {
    fn from(media: InstagramMedia) -> Self {
        Self {
            date: post_date(media.timestamp.as_deref()),
            kind: media
                .media_type
                .as_deref()
                .map(PostType::from_media_type)
                .unwrap_or(PostType::Unknown),
            ext_id: media.id,
            photo_url: media.media_url.unwrap_or_default(),
            post_url: media.permalink.unwrap_or_default(),
            text: media.caption.unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct InstagramConnector {
    core: Arc<ConnectorCore>,
    endpoints: InstagramEndpoints,
}

impl InstagramConnector {
    pub fn new(core: Arc<ConnectorCore>) -> Self {
        Self::with_endpoints(core, InstagramEndpoints::default())
    }

    pub fn with_endpoints(core: Arc<ConnectorCore>, endpoints: InstagramEndpoints) -> Self {
        Self { core, endpoints }
    }
}

#[async_trait]
impl Connector for InstagramConnector {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Instagram
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
            .post_multipart_json::<TokenResponse>(
                step,
                &self.endpoints.access_token,
                &[
                    ("client_id", creds.client_id.as_str()),
                    ("client_secret", creds.client_secret.as_str()),
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", creds.redirect_uri.as_str()),
                    ("code", validated.code.as_str()),
                ],
            )
            .await?
            .into_tokens(step)?;

        let step = "long-lived token exchange";
        let long_lived = self
            .core
            .http()
            .get_json::<TokenResponse, _>(
                step,
                &self.endpoints.long_lived_token,
                &[
                    ("grant_type", "ig_exchange_token"),
                    ("client_secret", creds.client_secret.as_str()),
                    ("access_token", short_lived.access_token.as_str()),
                ],
                None,
            )
            .await?
            .into_tokens(step)?;

        tracing::info!("Instagram authorization completed");
        self.core.finish_tokens(long_lived, &validated.state)
    }

    async fn refresh_auth_tokens(&self, old_tokens: &Tokens) -> Result<Tokens> {
        let access_token = require_access_token(old_tokens)?;

        let step = "token refresh";
        let mut tokens = self
            .core
            .http()
            .get_json::<TokenResponse, _>(
                step,
                &self.endpoints.refresh_token,
                &[("grant_type", "ig_refresh_token"), ("access_token", access_token)],
                None,
            )
            .await?
            .into_tokens(step)?;

        tokens.refreshed_at = Some(Utc::now());
        Ok(tokens)
    }
}

#[async_trait]
impl PostSource for InstagramConnector {
    async fn fetch_posts(&self, tokens: &Tokens, opts: &FetchOptions) -> Result<Vec<NormalizedPost>> {
        let access_token = require_access_token(tokens)?;

        let mut query = vec![
            ("fields", MEDIA_FIELDS),
            ("access_token", access_token),
            ("limit", "100"),
        ];
        if let Some(since) = opts.since.as_deref() {
            query.push(("since", since));
        }

        let media: Vec<InstagramMedia> =
            fetch_listing(&self.core, "instagram media", &self.endpoints.media, &query, None).await;

        Ok(media.into_iter().map(NormalizedPost::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryStateStore;
    use crate::connector::test_support::{fields, test_core};
    use crate::error::{CallbackError, Error, ExchangeFailure};
    use wiremock::matchers::{header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connector(server: &MockServer) -> InstagramConnector {
        let core = Arc::new(test_core(Arc::new(InMemoryStateStore::default())));
        InstagramConnector::with_endpoints(
            core,
            InstagramEndpoints {
                authorize: "https://api.instagram.com/oauth/authorize".to_string(),
                access_token: format!("{}/oauth/access_token", server.uri()),
                long_lived_token: format!("{}/access_token", server.uri()),
                refresh_token: format!("{}/refresh_access_token", server.uri()),
                media: format!("{}/me/media", server.uri()),
            },
        )
    }

    #[tokio::test]
    async fn test_authorize_url_uses_instagram_scopes() {
        let server = MockServer::start().await;
        let ig = connector(&server);

        let init = ig.authorize_url(&StateFields::new()).await.unwrap();
        assert!(init.url.starts_with("https://api.instagram.com/oauth/authorize?"));
        assert!(init.url.contains("scope=user_profile%2Cuser_media"));
    }

    #[tokio::test]
    async fn test_auth_tokens_multipart_then_long_lived() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .and(header_regex("content-type", "^multipart/form-data"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "short", "user_id": 17841400000000000u64})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/access_token"))
            .and(query_param("grant_type", "ig_exchange_token"))
            .and(query_param("access_token", "short"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "long",
                "token_type": "bearer",
                "expires_in": 5183944
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ig = connector(&server);
        let init = ig.authorize_url(&fields(&[("user", "7")])).await.unwrap();

        let tokens = ig.auth_tokens(&AuthCallback::new("code", init.state)).await.unwrap();
        assert_eq!(tokens.access_token, "long");
        assert_eq!(tokens.context, fields(&[("user", "7")]));
    }

    #[tokio::test]
    async fn test_auth_tokens_long_lived_missing_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "short"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "nope"})))
            .mount(&server)
            .await;

        let ig = connector(&server);
        let init = ig.authorize_url(&StateFields::new()).await.unwrap();

        let err = ig.auth_tokens(&AuthCallback::new("code", init.state)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ExchangeFailed {
                step: "long-lived token exchange",
                failure: ExchangeFailure::Body(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_auth_tokens_missing_code() {
        let server = MockServer::start().await;
        let ig = connector(&server);
        let init = ig.authorize_url(&StateFields::new()).await.unwrap();

        let err = ig.auth_tokens(&AuthCallback::new("", init.state)).await.unwrap_err();
        assert!(matches!(err, Error::Callback(CallbackError::MissingCode)));
    }

    #[tokio::test]
    async fn test_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/refresh_access_token"))
            .and(query_param("grant_type", "ig_refresh_token"))
            .and(query_param("access_token", "old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 5184000
            })))
            .mount(&server)
            .await;

        let ig = connector(&server);
        let tokens = ig.refresh_auth_tokens(&Tokens::from_access_token("old")).await.unwrap();
        assert_eq!(tokens.access_token, "fresh");
        assert!(tokens.refreshed_at.is_some());
        assert!(!tokens.is_expired());
    }

    #[tokio::test]
    async fn test_fetch_posts_maps_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me/media"))
            .and(query_param("access_token", "t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "id": "m1",
                    "media_type": "VIDEO",
                    "permalink": "https://instagram.com/p/m1",
                    "media_url": "https://cdn/m1.mp4",
                    "timestamp": "2023-05-01T12:00:00+0000"
                }]
            })))
            .mount(&server)
            .await;

        let ig = connector(&server);
        let posts = ig
            .fetch_posts(&Tokens::from_access_token("t"), &FetchOptions::default())
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].ext_id, "m1");
        assert_eq!(posts[0].kind, PostType::Video);
        assert_eq!(posts[0].text, "");
        assert_eq!(posts[0].date.to_rfc3339(), "2023-05-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_fetch_posts_without_data_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let ig = connector(&server);
        let posts = ig
            .fetch_posts(&Tokens::from_access_token("t"), &FetchOptions::default())
            .await
            .unwrap();
        assert!(posts.is_empty());
    }
}
