//! social-connect - OAuth2 connectors for social networks
//!
//! This library provides a provider-agnostic authorization-code + PKCE flow
//! with a self-contained encrypted `state` parameter, and adapters for
//! Facebook, Instagram and Twitter built on top of it.

pub mod auth;
pub mod config;
pub mod connector;
pub mod error;
pub mod http;
pub mod providers;

pub use auth::{Credentials, InMemoryStateStore, StateCipher, StateFields, StateStore, StateVerifier, Tokens};
pub use connector::{AuthCallback, AuthInit, Connector, ConnectorCore, ValidatedCallback};
pub use error::{CallbackError, Error, ExchangeFailure, Result};
pub use providers::{ConnectorRegistry, FetchOptions, NormalizedPost, PostSource, PostType, ProviderKind};
