//! Entity authentication for fleetd.
//!
//! A connecting caller presents a tag string plus a credential. The
//! [`AuthenticatorRegistry`] resolves the authentication strategy for the
//! tag's kind, rejecting malformed tags and kinds that can never log in,
//! and the strategy verifies the credential against the stored entity.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌────────────────────────┐
//! │   Gateway        │────▶│  AuthenticatorRegistry │
//! │   (login)        │     │  (by tag kind)         │
//! └──────────────────┘     └───────────┬────────────┘
//!                                      │
//!                     ┌────────────────┴───────────────┐
//!                     ▼                                ▼
//!          ┌──────────────────┐             ┌──────────────────┐
//!          │ UserAuthenticator│             │AgentAuthenticator│
//!          │ (password)       │             │(password + nonce)│
//!          └────────┬─────────┘             └────────┬─────────┘
//!                   │          ┌──────────┐          │
//!                   └─────────▶│  State   │◀─────────┘
//!                              │ (finder) │
//!                              └──────────┘
//! ```
//!
//! Every verification failure is the same `invalid entity name or
//! password` error: a caller cannot learn whether the entity exists.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authenticator;
pub mod error;

pub use authenticator::{
    authenticate, AgentAuthenticator, AuthenticatorRegistry, EntityAuthenticator,
    UserAuthenticator,
};
pub use error::{AuthError, Result};

use serde::{Deserialize, Serialize};

/// The credentials carried by a login call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// The caller's identity, e.g. `user-admin` or `machine-0`.
    pub auth_tag: String,
    /// The password or agent secret.
    pub credentials: String,
    /// One-time provisioning nonce, required for machine agents that were
    /// provisioned with one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}
