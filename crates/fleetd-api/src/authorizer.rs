//! Capability checks for connected callers.

use fleetd_core::{Tag, TagKind};
use fleetd_state::ModelEntity;

/// Answers capability questions for one authenticated connection.
///
/// Coarse gates (model manager) are checked once at facade construction;
/// fine-grained per-entity gates (`auth_owner`) are re-checked per call.
pub trait Authorizer: Send + Sync {
    /// The authenticated caller's tag.
    fn auth_tag(&self) -> &Tag;

    /// True if the caller is entitled to act as `tag`.
    ///
    /// The default is strict self-identity: an agent may only act as
    /// itself.
    fn auth_owner(&self, tag: &Tag) -> bool {
        self.auth_tag() == tag
    }

    /// True if the caller may manage models on this controller.
    fn auth_model_manager(&self) -> bool;

    /// True if the caller is a machine agent.
    fn auth_machine_agent(&self) -> bool {
        self.auth_tag().kind() == TagKind::Machine
    }

    /// True if the caller is a unit agent.
    fn auth_unit_agent(&self) -> bool {
        self.auth_tag().kind() == TagKind::Unit
    }

    /// True if the caller is a client (human user).
    fn auth_client(&self) -> bool {
        self.auth_tag().kind() == TagKind::User
    }
}

/// The authorization context built at login for a connection.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The authenticated entity's tag.
    pub tag: Tag,
    /// Whether the caller may administer the controller.
    pub controller_admin: bool,
}

impl AuthContext {
    /// Build the context for a freshly authenticated entity.
    #[must_use]
    pub fn for_entity(entity: &ModelEntity) -> Self {
        let controller_admin = match entity {
            ModelEntity::User(user) => user.is_controller_admin(),
            ModelEntity::Machine(_) | ModelEntity::Unit(_) => false,
        };
        Self {
            tag: entity.tag(),
            controller_admin,
        }
    }
}

impl Authorizer for AuthContext {
    fn auth_tag(&self) -> &Tag {
        &self.tag
    }

    fn auth_model_manager(&self) -> bool {
        self.controller_admin
    }
}
