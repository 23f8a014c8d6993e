//! Authenticator dispatch by tag kind.
//!
//! The registry maps each tag kind to the authentication strategy for that
//! kind of entity. Kinds without a registered strategy (relations, models,
//! applications) fail closed: presenting such a tag as a login identity is
//! rejected exactly like a malformed tag.

use std::collections::HashMap;

use fleetd_core::{Tag, TagKind};
use fleetd_state::{EntityFinder, ModelEntity};

use crate::error::{AuthError, Result};
use crate::LoginRequest;

/// An authentication strategy for one class of entity.
pub trait EntityAuthenticator: Send + Sync {
    /// Look up the entity named by `tag` via `finder` and verify the
    /// credential carried in `request` against it.
    ///
    /// # Errors
    ///
    /// Every verification failure is the uniform
    /// [`AuthError::InvalidCredentials`]; only unexpected state failures
    /// surface as anything else.
    fn authenticate(
        &self,
        finder: &dyn EntityFinder,
        tag: &Tag,
        request: &LoginRequest,
    ) -> Result<ModelEntity>;
}

fn find_for_login(finder: &dyn EntityFinder, tag: &Tag) -> Result<ModelEntity> {
    finder.find_entity(tag).map_err(|e| {
        if e.is_not_found() {
            tracing::debug!(tag = %tag, "login for unknown entity");
            AuthError::InvalidCredentials
        } else {
            AuthError::State(e)
        }
    })
}

/// Authenticates machine and unit agents by password, plus the
/// provisioning nonce for machines that were started with one.
#[derive(Debug, Default)]
pub struct AgentAuthenticator;

impl EntityAuthenticator for AgentAuthenticator {
    fn authenticate(
        &self,
        finder: &dyn EntityFinder,
        tag: &Tag,
        request: &LoginRequest,
    ) -> Result<ModelEntity> {
        let entity = find_for_login(finder, tag)?;
        match &entity {
            ModelEntity::Machine(machine) => {
                if machine.life().is_dead() {
                    tracing::debug!(tag = %tag, "login for dead machine");
                    return Err(AuthError::InvalidCredentials);
                }
                if !machine.password_valid(&request.credentials) {
                    return Err(AuthError::InvalidCredentials);
                }
                if machine.is_provisioned() {
                    let nonce = request.nonce.as_deref().unwrap_or_default();
                    if !machine.check_provisioned(nonce) {
                        tracing::debug!(tag = %tag, "nonce mismatch at login");
                        return Err(AuthError::InvalidCredentials);
                    }
                }
                Ok(entity)
            }
            ModelEntity::Unit(unit) => {
                if unit.life().is_dead() || !unit.password_valid(&request.credentials) {
                    return Err(AuthError::InvalidCredentials);
                }
                Ok(entity)
            }
            ModelEntity::User(_) => Err(AuthError::InvalidCredentials),
        }
    }
}

/// Authenticates users by password.
#[derive(Debug, Default)]
pub struct UserAuthenticator;

impl EntityAuthenticator for UserAuthenticator {
    fn authenticate(
        &self,
        finder: &dyn EntityFinder,
        tag: &Tag,
        request: &LoginRequest,
    ) -> Result<ModelEntity> {
        let entity = find_for_login(finder, tag)?;
        match &entity {
            ModelEntity::User(user) if user.password_valid(&request.credentials) => Ok(entity),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// Maps tag kinds to their authentication strategy.
///
/// Constructed once at startup; adding a new entity kind means adding one
/// mapping entry.
pub struct AuthenticatorRegistry {
    authenticators: HashMap<TagKind, Box<dyn EntityAuthenticator>>,
}

impl Default for AuthenticatorRegistry {
    /// The standard mapping: users by password, machine and unit agents by
    /// password plus nonce. Every other kind is unregistered and fails
    /// closed.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TagKind::User, Box::new(UserAuthenticator));
        registry.register(TagKind::Machine, Box::new(AgentAuthenticator));
        registry.register(TagKind::Unit, Box::new(AgentAuthenticator));
        registry
    }
}

impl AuthenticatorRegistry {
    /// A registry with no strategies; every lookup fails closed.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            authenticators: HashMap::new(),
        }
    }

    /// Register the strategy for a tag kind, replacing any existing entry.
    pub fn register(&mut self, kind: TagKind, authenticator: Box<dyn EntityAuthenticator>) {
        self.authenticators.insert(kind, authenticator);
    }

    /// Resolve the authenticator for a presented identity string.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidTag`] if the string does not parse as a tag or
    /// its kind has no registered authenticator.
    pub fn find_entity_authenticator(
        &self,
        tag_string: &str,
    ) -> Result<(Tag, &dyn EntityAuthenticator)> {
        let tag =
            Tag::parse(tag_string).map_err(|_| AuthError::InvalidTag(tag_string.to_string()))?;
        let authenticator = self
            .authenticators
            .get(&tag.kind())
            .ok_or_else(|| AuthError::InvalidTag(tag_string.to_string()))?;
        Ok((tag, authenticator.as_ref()))
    }
}

/// Authenticate a login request end to end: resolve the authenticator for
/// the presented tag, then verify the credential against the entity.
///
/// # Errors
///
/// [`AuthError::InvalidTag`] for malformed or unsupported identities,
/// [`AuthError::InvalidCredentials`] for any verification failure.
pub fn authenticate(
    registry: &AuthenticatorRegistry,
    finder: &dyn EntityFinder,
    request: &LoginRequest,
) -> Result<ModelEntity> {
    let (tag, authenticator) = registry.find_entity_authenticator(&request.auth_tag)?;
    authenticator.authenticate(finder, &tag, request)
}
