//! Provider-agnostic OAuth2 building blocks
//!
//! This module provides:
//! - PKCE verifier and random string generation
//! - The state token cipher
//! - State/verifier storage
//! - Client credentials and normalized tokens

pub mod pkce;
mod cipher;
mod credentials;
mod store;

pub use cipher::{StateCipher, StateFields, NONCE_LEN};
pub use credentials::{expiry_from_now, Credentials, Tokens};
pub use store::{InMemoryStateStore, StateStore, StateVerifier};

pub(crate) use store::truncate_state;
