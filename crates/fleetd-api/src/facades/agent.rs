//! The Agent facade: the API surface used by machine and unit agents.
//!
//! Two versions coexist. Version 1 carries the original status-setting
//! behavior, where a unit agent's error status is recorded against its
//! workload. Version 2 composes the same base and adds `SetAgentStatus`,
//! which always writes the agent's own record. Each version is a frozen
//! contract: registering one never alters the other.

use std::sync::Arc;

use serde_json::Value;

use fleetd_core::Tag;
use fleetd_state::status::AliveGuard;
use fleetd_state::{keys, status, Collection, EntityFinder, ModelEntity, State};

use crate::authorizer::Authorizer;
use crate::error::{ApiError, Result};
use crate::facades::{parse_args, to_value};
use crate::params::{
    Entities, EntityStatusArgs, ErrorResult, ErrorResults, LifeResult, LifeResults, SetStatusArgs,
};
use crate::registry::{Facade, FacadeContext};

/// Shared implementation both Agent versions delegate to.
///
/// Versions hold this by composition; none shares mutable state with
/// another.
pub(crate) struct AgentFacadeBase {
    state: State,
    authorizer: Arc<dyn Authorizer>,
}

impl AgentFacadeBase {
    fn new(context: &FacadeContext) -> Result<Self> {
        let authorizer = Arc::clone(&context.authorizer);
        if !(authorizer.auth_machine_agent() || authorizer.auth_unit_agent()) {
            return Err(ApiError::PermissionDenied);
        }
        Ok(Self {
            state: context.state.clone(),
            authorizer,
        })
    }

    fn life(&self, args: &Entities) -> LifeResults {
        let results = args
            .entities
            .iter()
            .map(|entity| match self.owned_entity(&entity.tag) {
                Ok(entity) => LifeResult {
                    life: Some(entity.life().to_string()),
                    error: None,
                },
                Err(err) => LifeResult {
                    life: None,
                    error: Some((&err).into()),
                },
            })
            .collect();
        LifeResults { results }
    }

    fn set_status(&self, args: &SetStatusArgs, direct: bool) -> ErrorResults {
        let results = args
            .entities
            .iter()
            .map(|arg| match self.set_one_status(arg, direct) {
                Ok(()) => ErrorResult::ok(),
                Err(err) => ErrorResult::err(&err),
            })
            .collect();
        ErrorResults { results }
    }

    fn set_one_status(&self, arg: &EntityStatusArgs, direct: bool) -> Result<()> {
        match self.owned_entity(&arg.tag)? {
            ModelEntity::Machine(machine) => {
                machine.set_status(arg.status, &arg.info, arg.data.clone())?;
            }
            ModelEntity::Unit(unit) => {
                if direct {
                    // Always the agent's own record, regardless of value.
                    let guard = AliveGuard {
                        collection: Collection::Units,
                        id: unit.name().to_string(),
                        subject: format!("unit {}", unit.name()),
                    };
                    status::set_status(
                        &self.state,
                        &keys::unit_agent_global_key(unit.name()),
                        arg.status,
                        &arg.info,
                        arg.data.clone(),
                        Some(&guard),
                    )?;
                } else {
                    unit.agent().set_status(arg.status, &arg.info, arg.data.clone())?;
                }
            }
            ModelEntity::User(_) => return Err(ApiError::PermissionDenied),
        }
        Ok(())
    }

    /// Parse a tag and enforce the per-entity gate: an agent may only act
    /// as itself.
    fn owned_entity(&self, tag_string: &str) -> Result<ModelEntity> {
        let tag = Tag::parse(tag_string)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        if !self.authorizer.auth_owner(&tag) {
            return Err(ApiError::PermissionDenied);
        }
        Ok(self.state.find_entity(&tag)?)
    }
}

/// Agent facade, version 1.
pub struct AgentApiV1 {
    base: AgentFacadeBase,
}

impl AgentApiV1 {
    /// Construct the facade; only agents pass the gate.
    ///
    /// # Errors
    ///
    /// `ApiError::PermissionDenied` for non-agent callers.
    pub fn new(context: &FacadeContext) -> Result<Self> {
        Ok(Self {
            base: AgentFacadeBase::new(context)?,
        })
    }
}

impl Facade for AgentApiV1 {
    fn call(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            "Life" => {
                let args: Entities = parse_args(args)?;
                to_value(&self.base.life(&args))
            }
            "SetStatus" => {
                let args: SetStatusArgs = parse_args(args)?;
                to_value(&self.base.set_status(&args, false))
            }
            other => Err(ApiError::NotImplemented(format!(
                "method \"{other}\" on facade \"Agent\" (version 1)"
            ))),
        }
    }
}

/// Agent facade, version 2.
///
/// Everything version 1 does, plus `SetAgentStatus`.
pub struct AgentApiV2 {
    base: AgentFacadeBase,
}

impl AgentApiV2 {
    /// Construct the facade; only agents pass the gate.
    ///
    /// # Errors
    ///
    /// `ApiError::PermissionDenied` for non-agent callers.
    pub fn new(context: &FacadeContext) -> Result<Self> {
        Ok(Self {
            base: AgentFacadeBase::new(context)?,
        })
    }
}

impl Facade for AgentApiV2 {
    fn call(&self, method: &str, args: Value) -> Result<Value> {
        match method {
            "Life" => {
                let args: Entities = parse_args(args)?;
                to_value(&self.base.life(&args))
            }
            "SetStatus" => {
                let args: SetStatusArgs = parse_args(args)?;
                to_value(&self.base.set_status(&args, false))
            }
            "SetAgentStatus" => {
                let args: SetStatusArgs = parse_args(args)?;
                to_value(&self.base.set_status(&args, true))
            }
            other => Err(ApiError::NotImplemented(format!(
                "method \"{other}\" on facade \"Agent\" (version 2)"
            ))),
        }
    }
}
