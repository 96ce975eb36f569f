//! Provider adapters
//!
//! Each adapter wraps a shared [`ConnectorCore`] and contributes endpoint
//! URLs, default scopes and response mapping.
//!
//! # Adding a New Provider
//!
//! 1. Create a new file (e.g., `linkedin.rs`)
//! 2. Implement [`Connector`] and [`PostSource`]
//! 3. Add a [`ProviderKind`] variant and wire it into [`ConnectorRegistry::create`]

pub mod facebook;
pub mod instagram;
pub mod twitter;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use crate::Result;
use crate::auth::{expiry_from_now, Tokens};
use crate::connector::{Connector, ConnectorCore};
use crate::error::Error;

pub use facebook::FacebookConnector;
pub use instagram::InstagramConnector;
pub use twitter::TwitterConnector;

/// Supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Facebook,
    Instagram,
    Twitter,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Facebook => "facebook",
            ProviderKind::Instagram => "instagram",
            ProviderKind::Twitter => "twitter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facebook" => Ok(ProviderKind::Facebook),
            "instagram" => Ok(ProviderKind::Instagram),
            "twitter" | "x" => Ok(ProviderKind::Twitter),
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }
}

/// Media classification of a normalized post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostType {
    Image,
    Video,
    CarouselAlbum,
    Text,
    Unknown,
}

impl PostType {
    /// Map a provider `media_type` value
    pub fn from_media_type(media_type: &str) -> Self {
        match media_type {
            "IMAGE" => PostType::Image,
            "VIDEO" => PostType::Video,
            "CAROUSEL_ALBUM" => PostType::CarouselAlbum,
            "TEXT" => PostType::Text,
            _ => PostType::Unknown,
        }
    }
}

/// Provider-independent shape of a listed post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPost {
    pub ext_id: String,
    pub photo_url: String,
    #[serde(rename = "type")]
    pub kind: PostType,
    pub post_url: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

/// Listing filters
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Only posts after this provider-formatted timestamp
    pub since: Option<String>,

    /// Overrides the credentials' user id for timeline lookups
    pub user_id: Option<String>,
}

/// Read-only post listing offered by adapters
///
/// A failed or empty response yields an empty list; a missing access token
/// is still an error.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn fetch_posts(&self, tokens: &Tokens, opts: &FetchOptions) -> Result<Vec<NormalizedPost>>;
}

/// Connector registry: creates connectors by provider.
///
/// # Example
///
/// ```ignore
/// let core = ConnectorCore::from_config(creds, &config)?;
/// let connector = ConnectorRegistry::create("twitter".parse()?, core);
/// let init = connector.authorize_url(&fields).await?;
/// ```
pub struct ConnectorRegistry;

impl ConnectorRegistry {
    /// Create a connector with production endpoints
    pub fn create(kind: ProviderKind, core: ConnectorCore) -> Box<dyn Connector> {
        let core = Arc::new(core);
        match kind {
            ProviderKind::Facebook => Box::new(FacebookConnector::new(core)),
            ProviderKind::Instagram => Box::new(InstagramConnector::new(core)),
            ProviderKind::Twitter => Box::new(TwitterConnector::new(core)),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["facebook", "instagram", "twitter"]
    }
}

/// Token endpoint response shared by all three providers
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    /// Convert to [`Tokens`], requiring a non-empty access token and a
    /// representable `expires_in`
    pub(crate) fn into_tokens(self, step: &'static str) -> Result<Tokens> {
        let access_token = match self.access_token {
            Some(access_token) if !access_token.is_empty() => access_token,
            _ => return Err(Error::exchange_body(step, "response has no access_token")),
        };

        let expires_at = match self.expires_in {
            Some(secs) => Some(
                expiry_from_now(secs)
                    .ok_or_else(|| Error::exchange_body(step, "expires_in out of range"))?,
            ),
            None => None,
        };

        Ok(Tokens {
            expires_at,
            ..Tokens::new(access_token, self.refresh_token, None)
        })
    }
}

/// `{"data": [...]}` listing envelope
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Fetch a listing, degrading to an empty list on any endpoint failure
pub(crate) async fn fetch_listing<T, Q>(
    core: &ConnectorCore,
    step: &'static str,
    url: &str,
    query: &Q,
    bearer: Option<&str>,
) -> Vec<T>
where
    T: DeserializeOwned,
    Q: Serialize + ?Sized,
{
    match core.http().get_json::<Page<T>, Q>(step, url, query, bearer).await {
        Ok(page) => page.data,
        Err(e) => {
            tracing::warn!("{} failed, returning no posts: {}", step, e);
            Vec::new()
        }
    }
}

/// Parse a provider timestamp, falling back to the current time
///
/// Accepts RFC 3339, the Graph API's `+0000` offset form, and unix seconds.
pub(crate) fn post_date(raw: Option<&str>) -> DateTime<Utc> {
    let parsed = raw.and_then(|value| {
        DateTime::parse_from_rfc3339(value)
            .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z"))
            .map(|date| date.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            })
    });

    match parsed {
        Some(date) => date,
        None => {
            tracing::debug!(raw = ?raw, "Unparsable post date, using now");
            Utc::now()
        }
    }
}

/// Require a non-empty access token before calling out
pub(crate) fn require_access_token(tokens: &Tokens) -> Result<&str> {
    if tokens.access_token.is_empty() {
        return Err(Error::MissingCredential("access_token"));
    }
    Ok(&tokens.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryStateStore;
    use crate::connector::test_support::test_core;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("Facebook".parse::<ProviderKind>().unwrap(), ProviderKind::Facebook);
        assert_eq!("x".parse::<ProviderKind>().unwrap(), ProviderKind::Twitter);
        assert!(matches!("myspace".parse::<ProviderKind>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_registry_creates_each_kind() {
        for name in ConnectorRegistry::available() {
            let kind: ProviderKind = name.parse().unwrap();
            let connector = ConnectorRegistry::create(kind, test_core(Arc::new(InMemoryStateStore::default())));
            assert_eq!(connector.kind(), kind);
            assert_eq!(kind.to_string(), *name);
        }
    }

    #[test]
    fn test_token_response_requires_access_token() {
        let response: TokenResponse = serde_json::from_str(r#"{"token_type":"bearer"}"#).unwrap();
        assert!(matches!(
            response.into_tokens("token exchange"),
            Err(Error::ExchangeFailed { step: "token exchange", .. })
        ));

        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","refresh_token":"r","expires_in":3600}"#).unwrap();
        let tokens = response.into_tokens("token exchange").unwrap();
        assert_eq!(tokens.access_token, "a");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
        assert!(tokens.expires_at.is_some());
    }

    #[test]
    fn test_token_response_rejects_out_of_range_expiry() {
        for body in [
            r#"{"access_token":"a","expires_in":9000000000000000000}"#,
            r#"{"access_token":"a","expires_in":-9223372036854775808}"#,
        ] {
            let response: TokenResponse = serde_json::from_str(body).unwrap();
            let err = response.into_tokens("token exchange").unwrap_err();
            assert!(
                err.to_string().contains("expires_in out of range"),
                "unexpected error for {}: {}",
                body,
                err
            );
        }
    }

    #[test]
    fn test_post_type_serialization() {
        assert_eq!(PostType::from_media_type("CAROUSEL_ALBUM"), PostType::CarouselAlbum);
        assert_eq!(serde_json::to_value(PostType::CarouselAlbum).unwrap(), "CAROUSEL_ALBUM");
        assert_eq!(PostType::from_media_type("REEL"), PostType::Unknown);
    }

    #[test]
    fn test_post_date_formats() {
        let expected = DateTime::parse_from_rfc3339("2023-05-01T12:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(post_date(Some("2023-05-01T12:00:00Z")), expected);
        assert_eq!(post_date(Some("2023-05-01T12:00:00+0000")), expected);
        assert_eq!(post_date(Some("1682942400")), expected);

        let before = Utc::now();
        assert!(post_date(None) >= before);
        assert!(post_date(Some("yesterday")) >= before);
    }

    #[test]
    fn test_require_access_token() {
        assert!(matches!(
            require_access_token(&Tokens::default()),
            Err(Error::MissingCredential("access_token"))
        ));
        assert_eq!(require_access_token(&Tokens::from_access_token("t")).unwrap(), "t");
    }
}
